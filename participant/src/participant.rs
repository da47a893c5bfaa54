use std::{io, time::Instant};

use comms::{
    FrameRead, FrameReceiver, FrameSender, FrameWrite,
    msg::{Inbound, Outbound},
};
use log::{debug, error, info, warn};
use machine_learning::training::Trainer;
use tokio::runtime::Runtime;

use crate::{
    config::IdentityStore,
    error::{ParticipantErr, Result},
    metrics::MetricsRecorder,
    round::{RoundController, RoundStep},
    session::{ConnectionState, SessionManager},
};

/// Something that happened on the connection.
#[derive(Debug)]
pub enum Event<'a> {
    Open,
    /// The body of one received frame.
    Message(&'a [u8]),
    Close,
    Error(io::Error),
}

/// Something the connection should do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(Outbound),
    Close,
}

/// A federated-learning participant: one session and the rounds it carries.
///
/// Events are handled one at a time and to completion, training included, before the next
/// frame is read.
pub struct Participant<T, S, M>
where
    T: Trainer,
    S: IdentityStore,
    M: MetricsRecorder,
{
    session: SessionManager<S>,
    rounds: RoundController<T, M>,
    max_frame_len: usize,
}

impl<T, S, M> Participant<T, S, M>
where
    T: Trainer,
    S: IdentityStore,
    M: MetricsRecorder,
{
    /// Creates a new `Participant`.
    ///
    /// # Arguments
    /// * `session` - The session manager holding the participant's identity.
    /// * `rounds` - The round controller driving the trainer.
    pub fn new(session: SessionManager<S>, rounds: RoundController<T, M>) -> Self {
        Self {
            session,
            rounds,
            max_frame_len: comms::DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the largest frame body either direction accepts.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn session(&self) -> &SessionManager<S> {
        &self.session
    }

    pub fn rounds(&self) -> &RoundController<T, M> {
        &self.rounds
    }

    /// Handles a single connection event.
    ///
    /// Problems with a single inbound message are logged and the message dropped.
    ///
    /// # Returns
    /// What the connection should do next, or an error that must end the process.
    pub fn on_event(&mut self, event: Event<'_>) -> Result<Vec<Action>> {
        match self.dispatch(event) {
            Err(e) if !e.is_fatal() => {
                warn!("dropping message: {e}");
                Ok(Vec::new())
            }
            ret => ret,
        }
    }

    /// Records that an action's message has been written to the connection.
    pub fn on_sent(&mut self, at: Instant) {
        self.rounds.on_sent(at);
    }

    fn dispatch(&mut self, event: Event<'_>) -> Result<Vec<Action>> {
        match event {
            Event::Open => {
                let msg = self.session.opened()?;
                Ok(vec![Action::Send(msg)])
            }
            Event::Message(frame) => {
                let at = Instant::now();
                let msg = Inbound::parse(frame)?;
                debug!(kind = msg.kind(); "received message");
                self.on_message(msg, at)
            }
            Event::Close => {
                self.session.closed();
                Ok(Vec::new())
            }
            Event::Error(e) => {
                error!("transport error: {e}");
                self.session.failed();
                Ok(Vec::new())
            }
        }
    }

    fn on_message(&mut self, msg: Inbound, at: Instant) -> Result<Vec<Action>> {
        let step = match msg {
            Inbound::HostRegistered { client_id } => {
                self.session.host_registered(&client_id)?;
                self.rounds.prime(&client_id)?
            }
            Inbound::ClientApproved { client_id } => {
                self.session.client_approved(&client_id)?;
                self.rounds.prime(&self.session.identity().client_id)?
            }
            Inbound::ReceiveAggregatedLayer { parameters } => {
                self.require_active("receiveAggregatedLayer")?;
                let client_id = &self.session.identity().client_id;
                self.rounds.on_aggregated_layer(parameters, client_id, at)?
            }
            Inbound::ReceiveAggregatedParameters { parameters } => {
                self.require_active("receiveAggregatedParameters")?;
                let client_id = &self.session.identity().client_id;
                self.rounds.on_aggregated_parameters(&parameters, client_id, at)?
            }
            Inbound::Unknown => {
                debug!("ignoring message of unknown type");
                return Ok(Vec::new());
            }
        };

        match step {
            RoundStep::Send(msg) => Ok(vec![Action::Send(msg)]),
            RoundStep::Finished => {
                self.session.closing()?;
                Ok(vec![Action::Close])
            }
        }
    }

    fn require_active(&self, got: &'static str) -> Result<()> {
        if self.session.is_active() {
            return Ok(());
        }

        Err(ParticipantErr::UnexpectedMessage {
            state: self.session.state().name(),
            got,
        })
    }

    /// Runs the participant over an already open connection until it closes.
    ///
    /// # Arguments
    /// * `rx` - The connection's reading half.
    /// * `tx` - The connection's writing half.
    ///
    /// # Returns
    /// An error only if something fatal happened; transport failures end the run quietly.
    pub async fn run<R, W>(&mut self, rx: R, tx: W) -> Result<()>
    where
        R: FrameRead,
        W: FrameWrite,
    {
        if self.session.state() == ConnectionState::Disconnected {
            self.session.connecting()?;
        }

        let (mut rx, mut tx) = comms::channel_with_limit(rx, tx, self.max_frame_len);
        let ret = self.serve(&mut rx, &mut tx).await;

        self.on_event(Event::Close)?;
        ret
    }

    async fn serve<R, W>(
        &mut self,
        rx: &mut FrameReceiver<R>,
        tx: &mut FrameSender<W>,
    ) -> Result<()>
    where
        R: FrameRead,
        W: FrameWrite,
    {
        let actions = self.on_event(Event::Open)?;
        if !self.perform(actions, tx).await? {
            return Ok(());
        }

        let mut buf = Vec::new();
        loop {
            let frame = match rx.recv_into(&mut buf).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("server closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    self.on_event(Event::Error(e))?;
                    return Ok(());
                }
            };

            let actions = self.on_event(Event::Message(frame))?;
            if !self.perform(actions, tx).await? {
                return Ok(());
            }
        }
    }

    /// Carries out `actions` in order.
    ///
    /// # Returns
    /// Whether the connection is still usable.
    async fn perform<W>(&mut self, actions: Vec<Action>, tx: &mut FrameSender<W>) -> Result<bool>
    where
        W: FrameWrite,
    {
        for action in actions {
            match action {
                Action::Send(msg) => {
                    if let Err(e) = tx.send(&msg).await {
                        self.on_event(Event::Error(e))?;
                        return Ok(false);
                    }

                    debug!(kind = msg.kind(); "sent message");
                    self.on_sent(Instant::now());
                }
                Action::Close => {
                    if let Err(e) = tx.shutdown().await {
                        warn!("failed to shut down the connection: {e}");
                    }
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Opens a WebSocket connection to the server at `url` and runs until it closes.
    pub async fn connect(&mut self, url: &str) -> Result<()> {
        self.session.connecting()?;
        info!(url = url; "connecting to server");

        let (rx, tx) = match comms::ws::connect(url, self.max_frame_len).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("failed to connect: {e}");
                self.session.failed();
                self.session.closed();
                return Err(e.into());
            }
        };

        self.run(rx, tx).await
    }

    /// Like `connect`, but blocks the calling thread until the connection closes.
    pub fn connect_blocking(&mut self, url: &str) -> Result<()> {
        let runtime = Runtime::new()?;
        runtime.block_on(self.connect(url))
    }
}
