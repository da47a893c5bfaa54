//! WebSocket transport: every message is a single text frame.
//!
//! Pings from the server are answered by the socket itself the next time it's read or written,
//! so a participant that is busy training still keeps the connection alive as soon as it
//! returns to the channel.

use std::{io, str};

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{self, Message, protocol::WebSocketConfig},
};

use crate::transport::{FrameRead, FrameWrite, too_long};

/// The reading half of a WebSocket connection.
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// The writing half of a WebSocket connection.
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// The socket settings for a channel whose messages are at most `max_frame_len` bytes.
pub fn config(max_frame_len: usize) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(max_frame_len))
        .max_frame_size(Some(max_frame_len))
}

/// Splits an established WebSocket into halves usable by `crate::channel`.
pub fn split<S>(ws: WebSocketStream<S>) -> (WsReader<S>, WsWriter<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (WsReader { stream }, WsWriter { sink })
}

/// Opens a WebSocket connection to `url`.
///
/// # Arguments
/// * `url` - A `ws://` address.
/// * `max_frame_len` - The largest message either direction accepts.
///
/// # Returns
/// The connection's reading and writing halves.
pub async fn connect(
    url: &str,
    max_frame_len: usize,
) -> io::Result<(
    WsReader<MaybeTlsStream<TcpStream>>,
    WsWriter<MaybeTlsStream<TcpStream>>,
)> {
    let (ws, _) = tokio_tungstenite::connect_async_with_config(url, Some(config(max_frame_len)), false)
        .await
        .map_err(into_io)?;

    Ok(split(ws))
}

impl<S> FrameRead for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self, buf: &mut Vec<u8>, max_frame_len: usize) -> io::Result<bool> {
        loop {
            let msg = match self.stream.next().await {
                Some(msg) => msg.map_err(into_io)?,
                None => return Ok(false),
            };

            let body: &[u8] = match &msg {
                Message::Text(text) => text.as_str().as_bytes(),
                Message::Binary(bytes) => &bytes[..],
                Message::Close(_) => return Ok(false),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            if body.len() > max_frame_len {
                return Err(too_long(body.len(), max_frame_len));
            }

            buf.clear();
            buf.extend_from_slice(body);
            return Ok(true);
        }
    }
}

impl<S> FrameWrite for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, body: &[u8]) -> io::Result<()> {
        let text = str::from_utf8(body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        self.sink
            .send(Message::text(text.to_owned()))
            .await
            .map_err(into_io)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.sink.close().await.map_err(into_io)
    }
}

fn into_io(e: tungstenite::Error) -> io::Error {
    match e {
        tungstenite::Error::Io(e) => e,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            io::Error::new(io::ErrorKind::BrokenPipe, e)
        }
        tungstenite::Error::Capacity(_) => io::Error::new(io::ErrorKind::InvalidData, e),
        e => io::Error::other(e),
    }
}
