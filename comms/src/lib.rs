mod error;
pub mod msg;
mod receiver;
mod sender;
mod transport;
pub mod ws;

pub use error::ProtocolErr;
pub use receiver::FrameReceiver;
pub use sender::FrameSender;
pub use transport::{FrameRead, FrameWrite};

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The largest frame body, in bytes, either end accepts unless told otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Creates both `FrameReceiver` and `FrameSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication,
/// bounded by `DEFAULT_MAX_FRAME_LEN`. Plain byte streams are length-prefixed, `ws` halves
/// carry one text frame per message.
///
/// # Arguments
/// * `rx` - The reading half of a transport.
/// * `tx` - The writing half of a transport.
///
/// # Returns
/// A communication stream in the form of a frame receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: FrameRead,
    W: FrameWrite,
{
    channel_with_limit(rx, tx, DEFAULT_MAX_FRAME_LEN)
}

/// Creates both channel parts with an explicit message-size ceiling.
///
/// # Arguments
/// * `rx` - The reading half of a transport.
/// * `tx` - The writing half of a transport.
/// * `max_frame_len` - The maximum body length of a single frame, in bytes.
///
/// # Returns
/// A communication stream in the form of a frame receiver and sender.
pub fn channel_with_limit<R, W>(
    rx: R,
    tx: W,
    max_frame_len: usize,
) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: FrameRead,
    W: FrameWrite,
{
    (
        FrameReceiver::new(rx, max_frame_len),
        FrameSender::new(tx, max_frame_len),
    )
}
