//! The implementation of the sending end of the application layer protocol.

use std::io;

use serde::Serialize;

use crate::transport::FrameWrite;

/// The sending end handle of the communication.
pub struct FrameSender<W: FrameWrite> {
    tx: W,
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl<W: FrameWrite> FrameSender<W> {
    /// Creates a new `FrameSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying transport.
    /// * `max_frame_len` - The maximum body length of a single frame.
    pub(super) fn new(tx: W, max_frame_len: usize) -> Self {
        Self {
            tx,
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Sends `msg` as a single JSON text frame through the inner transport.
    ///
    /// Nothing is written if the encoded message exceeds the frame ceiling.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> io::Result<()> {
        let Self {
            tx,
            buf,
            max_frame_len,
        } = self;

        buf.clear();
        serde_json::to_writer(&mut *buf, msg)?;

        if buf.len() > *max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "frame of {} bytes exceeds the {max_frame_len} bytes ceiling",
                    buf.len()
                ),
            ));
        }

        tx.write_frame(buf).await
    }

    /// Ends the connection from this side, the peer observes it closing.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.close().await
    }
}
