use std::{error::Error, fmt};

use comms::msg::Outbound;
use log::{debug, info, warn};

use crate::config::{ClientIdentity, ConfigErr, IdentityStore};

/// The lifecycle of the single connection a participant owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingRegistration,
    Active,
    Closing,
    Closed,
}

/// Something that moves the connection from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connect,
    Open,
    Register,
    Close,
    Fail,
    Shutdown,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingRegistration => "awaiting registration",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// The state reached by applying `transition`, or `None` if it is illegal here.
    pub fn next(self, transition: Transition) -> Option<Self> {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (Disconnected, Connect) => Some(Connecting),
            (Connecting, Open) => Some(AwaitingRegistration),
            (AwaitingRegistration, Register) => Some(Active),
            (Connecting | AwaitingRegistration | Active, Close | Fail) => Some(Closing),
            (Closing, Fail) => Some(Closing),
            (_, Shutdown) => Some(Closed),
            _ => None,
        }
    }
}

/// Failures of the session handshake.
#[derive(Debug)]
pub enum SessionErr {
    IllegalTransition {
        from: ConnectionState,
        transition: Transition,
    },
    /// The identity assigned by the server could not be stored.
    Persist(ConfigErr),
}

impl fmt::Display for SessionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalTransition { from, transition } => {
                write!(f, "illegal transition {transition:?} from {from:?}")
            }
            Self::Persist(e) => write!(f, "failed to persist assigned client id: {e}"),
        }
    }
}

impl Error for SessionErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persist(e) => Some(e),
            _ => None,
        }
    }
}

/// Owns the connection state and the participant's identity.
pub struct SessionManager<S: IdentityStore> {
    state: ConnectionState,
    identity: ClientIdentity,
    store: S,
}

impl<S: IdentityStore> SessionManager<S> {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    /// * `identity` - The identity loaded at startup.
    /// * `store` - Where a server-assigned identity gets persisted.
    pub fn new(identity: ClientIdentity, store: S) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identity,
            store,
        }
    }

    fn apply(&mut self, transition: Transition) -> Result<ConnectionState, SessionErr> {
        let from = self.state;
        let to = from
            .next(transition)
            .ok_or(SessionErr::IllegalTransition { from, transition })?;

        self.state = to;
        Ok(to)
    }

    pub fn connecting(&mut self) -> Result<(), SessionErr> {
        self.apply(Transition::Connect).map(drop)
    }

    /// Handles the connection opening.
    ///
    /// # Returns
    /// The handshake message: `hostSession` without a known client id, `joinRequest` otherwise.
    pub fn opened(&mut self) -> Result<Outbound, SessionErr> {
        self.apply(Transition::Open)?;

        let ClientIdentity {
            number_of_clients,
            client_id,
            password,
        } = &self.identity;

        let msg = if client_id.is_empty() {
            info!(total_clients = *number_of_clients; "hosting a new session");
            Outbound::HostSession {
                password: password.clone(),
                total_clients: *number_of_clients,
            }
        } else {
            info!(client_id = client_id.as_str(); "joining session");
            Outbound::JoinRequest {
                client_id: client_id.clone(),
                password: password.clone(),
            }
        };

        Ok(msg)
    }

    /// Handles the server registering this participant as the session's host.
    ///
    /// The assigned id is persisted before the session becomes active.
    pub fn host_registered(&mut self, client_id: &str) -> Result<(), SessionErr> {
        let from = self.state;
        let transition = Transition::Register;
        if from.next(transition).is_none() {
            return Err(SessionErr::IllegalTransition { from, transition });
        }

        self.store
            .persist_assigned_client_id(client_id)
            .map_err(SessionErr::Persist)?;

        self.identity.client_id = client_id.to_string();
        self.apply(transition)?;

        info!(client_id = client_id; "registered as host");
        Ok(())
    }

    /// Handles the server approving this participant's join request.
    pub fn client_approved(&mut self, client_id: &str) -> Result<(), SessionErr> {
        self.apply(Transition::Register)?;

        if client_id != self.identity.client_id {
            warn!(
                got = client_id, expected = self.identity.client_id.as_str();
                "server approved a different client id"
            );
        }

        info!(client_id = client_id; "joined session");
        Ok(())
    }

    /// Starts a local close.
    pub fn closing(&mut self) -> Result<(), SessionErr> {
        self.apply(Transition::Close).map(drop)
    }

    /// Records a transport failure. Never fails; an already closed session stays closed.
    pub fn failed(&mut self) {
        if let Err(e) = self.apply(Transition::Fail) {
            debug!("ignoring transport failure: {e}");
        }
    }

    /// Records the connection being gone, whoever closed it.
    pub fn closed(&mut self) {
        let from = self.state;

        match self.apply(Transition::Shutdown) {
            Ok(_) if from != ConnectionState::Closed => {
                info!(state = from.name(); "connection closed");
            }
            Ok(_) => {}
            Err(e) => warn!("{e}"),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
