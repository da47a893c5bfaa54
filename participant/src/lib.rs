//! A federated-learning participant.
//!
//! Holds a local model behind the `Trainer` contract, hosts or joins a session on the
//! coordinating server and exchanges parameters with it round by round until the trainer
//! has no more work.

pub mod codec;
pub mod config;
pub mod delay;
pub mod error;
pub mod metrics;
pub mod participant;
pub mod round;
pub mod session;

pub use config::{
    ClientIdentity, IdentityStore, JsonIdentityStore, ParticipantConfig, TransferMode,
};
pub use error::{ParticipantErr, Result};
pub use participant::{Action, Event, Participant};
pub use round::{RoundController, RoundStep};
pub use session::{ConnectionState, SessionManager};
