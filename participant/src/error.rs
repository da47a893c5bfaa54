use std::{error::Error, fmt, io};

use comms::ProtocolErr;
use machine_learning::MlErr;

use crate::{codec::CodecErr, config::ConfigErr, session::SessionErr};

/// The participant's result type.
pub type Result<T> = std::result::Result<T, ParticipantErr>;

/// Participant runtime failures.
#[derive(Debug)]
pub enum ParticipantErr {
    Io(io::Error),
    Config(ConfigErr),
    Session(SessionErr),
    /// Inbound parameters that don't fit what was sent this round.
    Codec(CodecErr),
    Protocol(ProtocolErr),
    UnexpectedMessage {
        state: &'static str,
        got: &'static str,
    },
    /// The trainer produced parameters that can't be put on the wire.
    Unsendable(CodecErr),
    Trainer(MlErr),
    Metrics(io::Error),
}

impl ParticipantErr {
    /// Whether the error must end the process.
    ///
    /// Everything else is a protocol-level problem with a single message, which is logged and
    /// dropped while the connection stays open.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::Config(_)
            | Self::Unsendable(_)
            | Self::Trainer(_)
            | Self::Metrics(_) => true,
            Self::Session(e) => matches!(e, SessionErr::Persist(_)),
            Self::Codec(_) | Self::Protocol(_) | Self::UnexpectedMessage { .. } => false,
        }
    }
}

impl fmt::Display for ParticipantErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::Session(e) => write!(f, "session error: {e}"),
            Self::Codec(e) => write!(f, "invalid aggregated parameters: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::UnexpectedMessage { state, got } => {
                write!(f, "unexpected message while {state}: got {got}")
            }
            Self::Unsendable(e) => write!(f, "cannot send trained parameters: {e}"),
            Self::Trainer(e) => write!(f, "trainer error: {e}"),
            Self::Metrics(e) => write!(f, "failed to record metrics: {e}"),
        }
    }
}

impl Error for ParticipantErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) | Self::Metrics(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Codec(e) | Self::Unsendable(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Trainer(e) => Some(e),
            Self::UnexpectedMessage { .. } => None,
        }
    }
}

impl From<io::Error> for ParticipantErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigErr> for ParticipantErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<SessionErr> for ParticipantErr {
    fn from(value: SessionErr) -> Self {
        Self::Session(value)
    }
}

impl From<ProtocolErr> for ParticipantErr {
    fn from(value: ProtocolErr) -> Self {
        Self::Protocol(value)
    }
}

impl From<MlErr> for ParticipantErr {
    fn from(value: MlErr) -> Self {
        Self::Trainer(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ParticipantErr> for io::Error {
    fn from(value: ParticipantErr) -> Self {
        match value {
            ParticipantErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
