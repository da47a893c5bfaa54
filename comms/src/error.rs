use std::{
    error::Error,
    fmt::{self, Display},
};

/// Returned whenever an inbound frame can't be turned into a message, either because it's
/// not valid JSON or because it lacks a field its `type` requires.
#[derive(Debug)]
pub struct ProtocolErr(serde_json::Error);

impl Display for ProtocolErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed message: {}", self.0)
    }
}

impl Error for ProtocolErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serde_json::Error> for ProtocolErr {
    fn from(value: serde_json::Error) -> Self {
        Self(value)
    }
}
