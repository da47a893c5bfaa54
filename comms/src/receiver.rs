use std::io;

use serde::de::DeserializeOwned;

use crate::transport::FrameRead;

/// The receiving end handle of the communication.
pub struct FrameReceiver<R: FrameRead> {
    rx: R,
    max_frame_len: usize,
}

impl<R: FrameRead> FrameReceiver<R> {
    /// Creates a new `FrameReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying transport.
    /// * `max_frame_len` - The maximum body length of a single frame.
    pub(super) fn new(rx: R, max_frame_len: usize) -> Self {
        Self { rx, max_frame_len }
    }

    /// Waits to receive the next frame from the inner receiver.
    ///
    /// The frame body is not interpreted, decoding it is left to the caller so
    /// that a malformed body can be told apart from a broken stream.
    ///
    /// # Arguments
    /// * `buf` - The buffer to read the frame into, the returned slice is tied to it.
    ///
    /// # Returns
    /// The frame body, `None` if the peer closed the connection between frames, or an error if
    /// the connection broke, including partway through a frame.
    pub async fn recv_into<'buf>(
        &mut self,
        buf: &'buf mut Vec<u8>,
    ) -> io::Result<Option<&'buf [u8]>> {
        if !self.rx.read_frame(buf, self.max_frame_len).await? {
            return Ok(None);
        }

        Ok(Some(&buf[..]))
    }

    /// Waits to receive the next frame and decodes it as JSON into `T`.
    ///
    /// # Returns
    /// `T` on success, `io::ErrorKind::UnexpectedEof` if the peer closed the connection, or
    /// any other `io::Error` on failure.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        let mut buf = Vec::new();
        let frame = self
            .recv_into(&mut buf)
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))?;

        Ok(serde_json::from_slice(frame)?)
    }
}
