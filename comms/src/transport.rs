//! The byte-level transports a channel can run over.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType};

/// The reading half of a message-oriented transport.
#[allow(unused)]
#[trait_variant::make(FrameRead: Send)]
pub trait FrameReadTemplate {
    /// Reads the next whole message body into `buf`, replacing its contents.
    ///
    /// # Arguments
    /// * `buf` - Where to put the body.
    /// * `max_frame_len` - The largest body accepted, in bytes.
    ///
    /// # Returns
    /// `false` if the peer closed the connection between two messages, or an error if the
    /// connection broke, possibly partway through a message.
    async fn read_frame(&mut self, buf: &mut Vec<u8>, max_frame_len: usize) -> io::Result<bool>;
}

/// The writing half of a message-oriented transport.
#[allow(unused)]
#[trait_variant::make(FrameWrite: Send)]
pub trait FrameWriteTemplate {
    /// Writes `body` as a single message.
    async fn write_frame(&mut self, body: &[u8]) -> io::Result<()>;

    /// Ends the connection from this side.
    async fn close(&mut self) -> io::Result<()>;
}

/// Plain byte streams carry each message as a big-endian length prefix followed by the body.
impl<R> FrameRead for R
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self, buf: &mut Vec<u8>, max_frame_len: usize) -> io::Result<bool> {
        let mut size_buf = [0; LEN_TYPE_SIZE];

        let n = self.read(&mut size_buf).await?;
        if n == 0 {
            return Ok(false);
        }
        self.read_exact(&mut size_buf[n..])
            .await
            .map_err(truncated)?;

        let len = LenType::from_be_bytes(size_buf);
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= max_frame_len)
            .ok_or_else(|| too_long(len, max_frame_len))?;

        buf.clear();
        buf.resize(len, 0);
        self.read_exact(buf).await.map_err(truncated)?;

        Ok(true)
    }
}

impl<W> FrameWrite for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, body: &[u8]) -> io::Result<()> {
        let header = (body.len() as LenType).to_be_bytes();

        self.write_all(&header).await?;
        self.write_all(body).await?;
        self.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

fn truncated(e: io::Error) -> io::Error {
    if e.kind() != io::ErrorKind::UnexpectedEof {
        return e;
    }

    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed in the middle of a frame",
    )
}

pub(crate) fn too_long<L: std::fmt::Display>(len: L, max_frame_len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("incoming frame of {len} bytes exceeds the {max_frame_len} bytes ceiling"),
    )
}
