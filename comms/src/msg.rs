use serde::{Deserialize, Serialize};

use crate::ProtocolErr;

/// A rectangular array of numbers of arbitrary depth, as it travels in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedArray {
    Scalar(f32),
    List(Vec<NestedArray>),
}

/// The `parameters` field of a `sendParameters` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterPayload {
    /// A single one-dimensional transmission unit.
    Unit(Vec<f32>),
    /// Every tensor of the model, one nested array each.
    Tensors(Vec<NestedArray>),
}

/// The messages a participant sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    HostSession {
        password: String,
        total_clients: usize,
    },
    JoinRequest {
        client_id: String,
        password: String,
    },
    SendParameters {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        parameters: ParameterPayload,
    },
}

impl Outbound {
    /// A short name for the message's kind, used for observability.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::HostSession { .. } => "hostSession",
            Outbound::JoinRequest { .. } => "joinRequest",
            Outbound::SendParameters { .. } => "sendParameters",
        }
    }
}

/// The messages the server sends to a participant.
///
/// Any `type` not listed here decodes into `Inbound::Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    HostRegistered {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    ClientApproved {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    ReceiveAggregatedParameters {
        parameters: Vec<NestedArray>,
    },
    ReceiveAggregatedLayer {
        parameters: Vec<f32>,
    },
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Decodes a received frame into a message.
    ///
    /// # Arguments
    /// * `frame` - The raw body of a received frame.
    ///
    /// # Returns
    /// The decoded message or a `ProtocolErr` if the frame is malformed.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolErr> {
        Ok(serde_json::from_slice(frame)?)
    }

    /// A short name for the message's kind, used for observability.
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::HostRegistered { .. } => "hostRegistered",
            Inbound::ClientApproved { .. } => "clientApproved",
            Inbound::ReceiveAggregatedParameters { .. } => "receiveAggregatedParameters",
            Inbound::ReceiveAggregatedLayer { .. } => "receiveAggregatedLayer",
            Inbound::Unknown => "unknown",
        }
    }
}
