use std::{collections::VecDeque, mem, time::Instant};

use comms::msg::{NestedArray, Outbound, ParameterPayload};
use log::{debug, info};
use machine_learning::{
    Tensor,
    training::{TrainResult, Trainer},
};

use crate::{
    codec::{self, CodecErr, Flattened, Reassembler},
    config::TransferMode,
    delay::DelayProbe,
    error::{ParticipantErr, Result},
    metrics::{MetricsRecorder, RoundMetrics},
};

/// What the controller wants done after handling an event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundStep {
    Send(Outbound),
    /// The trainer has no more work; the connection should be closed.
    Finished,
}

struct ChunkedTransfer {
    pending: VecDeque<Vec<f32>>,
    sent: usize,
    reassembler: Reassembler,
}

enum Transfer {
    Chunked(ChunkedTransfer),
    Whole { shapes: Vec<Vec<usize>> },
}

impl Transfer {
    fn all_sent(&self) -> bool {
        match self {
            Transfer::Chunked(chunks) => chunks.pending.is_empty(),
            Transfer::Whole { .. } => true,
        }
    }
}

/// The parameter set currently travelling to the server and back.
struct TrainingRound {
    index: u64,
    transfer: Transfer,
}

/// Sequences calls into the trainer across the lifetime of a connection.
///
/// Each round takes the trainer's parameters to the server and feeds the aggregate back in.
/// In chunked mode only one transmission unit is outstanding at a time.
pub struct RoundController<T: Trainer, M: MetricsRecorder> {
    trainer: T,
    metrics: M,
    mode: TransferMode,
    round: Option<TrainingRound>,
    next_index: u64,
    primed: bool,
    finished: bool,
    delay: DelayProbe,
}

impl<T: Trainer, M: MetricsRecorder> RoundController<T, M> {
    /// Creates a new `RoundController`.
    ///
    /// # Arguments
    /// * `trainer` - The owner of the local model.
    /// * `metrics` - Where per-round results are recorded.
    /// * `mode` - How parameters are put on the wire.
    pub fn new(trainer: T, metrics: M, mode: TransferMode) -> Self {
        Self {
            trainer,
            metrics,
            mode,
            round: None,
            next_index: 0,
            primed: false,
            finished: false,
            delay: DelayProbe::new(),
        }
    }

    /// Obtains the first parameter set from the trainer and starts the first round.
    ///
    /// # Arguments
    /// * `client_id` - The session identity, sent along with whole parameter sets.
    pub fn prime(&mut self, client_id: &str) -> Result<RoundStep> {
        if self.primed {
            return Err(self.unexpected("registration"));
        }

        self.primed = true;
        debug!("priming trainer");

        let result = self.trainer.train(None)?;
        self.advance(result, client_id)
    }

    /// Handles one aggregated transmission unit.
    ///
    /// # Arguments
    /// * `values` - The aggregated unit.
    /// * `client_id` - The session identity.
    /// * `at` - When the unit arrived.
    ///
    /// # Returns
    /// The next unit to send, the first unit of the next round, or `RoundStep::Finished`.
    pub fn on_aggregated_layer(
        &mut self,
        values: Vec<f32>,
        client_id: &str,
        at: Instant,
    ) -> Result<RoundStep> {
        const GOT: &str = "receiveAggregatedLayer";

        let Some(TrainingRound {
            index,
            transfer: Transfer::Chunked(chunks),
        }) = self.round.as_mut()
        else {
            return Err(self.unexpected(GOT));
        };

        if chunks.reassembler.received() == chunks.sent {
            return Err(ParticipantErr::UnexpectedMessage {
                state: "no unit outstanding",
                got: GOT,
            });
        }

        chunks.reassembler.push(values).map_err(ParticipantErr::Codec)?;
        debug!(round = *index, unit = chunks.sent - 1; "received aggregated unit");

        if let Some(unit) = chunks.pending.pop_front() {
            debug!(round = *index, unit = chunks.sent, len = unit.len(); "sending unit");
            chunks.sent += 1;
            return Ok(RoundStep::Send(chunk_message(unit)));
        }

        let index = *index;
        let reassembler = mem::take(&mut chunks.reassembler);
        self.round = None;

        let params = reassembler.finish().map_err(ParticipantErr::Codec)?;
        self.complete(index, params, client_id, at)
    }

    /// Handles the aggregate of a whole parameter set.
    ///
    /// # Arguments
    /// * `parameters` - The aggregated tensors in nested list form.
    /// * `client_id` - The session identity.
    /// * `at` - When the aggregate arrived.
    pub fn on_aggregated_parameters(
        &mut self,
        parameters: &[NestedArray],
        client_id: &str,
        at: Instant,
    ) -> Result<RoundStep> {
        const GOT: &str = "receiveAggregatedParameters";

        let Some(TrainingRound {
            index,
            transfer: Transfer::Whole { shapes },
        }) = self.round.as_ref()
        else {
            return Err(self.unexpected(GOT));
        };

        let params =
            codec::reconstruct_whole(parameters, shapes).map_err(ParticipantErr::Codec)?;
        let index = *index;
        self.round = None;

        self.complete(index, params, client_id, at)
    }

    /// Records that a message produced by this controller has left.
    ///
    /// Once every unit of the current round is out, this starts the round's delay measurement.
    pub fn on_sent(&mut self, at: Instant) {
        let Some(round) = &self.round else {
            return;
        };

        if round.transfer.all_sent() && !self.delay.is_pending() {
            self.delay.mark_sent(at);
        }
    }

    /// The index of the round in flight, if any.
    pub fn round_index(&self) -> Option<u64> {
        self.round.as_ref().map(|round| round.index)
    }

    pub fn completed_rounds(&self) -> u64 {
        self.next_index.saturating_sub(self.round.is_some() as u64)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    fn complete(
        &mut self,
        index: u64,
        params: Vec<Tensor>,
        client_id: &str,
        at: Instant,
    ) -> Result<RoundStep> {
        let delay = self.delay.mark_received(at);
        let result = self.trainer.train(Some(params))?;

        let metrics = RoundMetrics {
            round: index,
            evaluation: result.evaluation,
            delay,
        };
        self.metrics
            .record(&metrics)
            .map_err(ParticipantErr::Metrics)?;

        match result.evaluation {
            Some(eval) => info!(
                round = index,
                cost = eval.loss,
                accuracy = eval.accuracy,
                delay = delay.map(|d| d.as_secs_f64());
                "round completed"
            ),
            None => info!(round = index; "round completed"),
        }

        self.advance(result, client_id)
    }

    fn advance(&mut self, result: TrainResult, client_id: &str) -> Result<RoundStep> {
        let Some(params) = result.params else {
            self.finished = true;
            info!(rounds = self.next_index; "training complete");
            return Ok(RoundStep::Finished);
        };

        let index = self.next_index;
        let (transfer, msg) = match self.mode {
            TransferMode::Chunked => {
                let Flattened { units, map } =
                    codec::flatten(&params).map_err(ParticipantErr::Unsendable)?;

                let mut pending = VecDeque::from(units);
                let first = pending
                    .pop_front()
                    .ok_or(ParticipantErr::Unsendable(CodecErr::Empty))?;

                debug!(round = index, units = map.len(); "starting chunked round");
                debug!(round = index, unit = 0, len = first.len(); "sending unit");

                let transfer = Transfer::Chunked(ChunkedTransfer {
                    pending,
                    sent: 1,
                    reassembler: Reassembler::new(map),
                });
                (transfer, chunk_message(first))
            }
            TransferMode::Whole => {
                let shapes = params.iter().map(|t| t.shape().to_vec()).collect();
                let nested = codec::to_nested_all(&params).map_err(ParticipantErr::Unsendable)?;
                let msg = Outbound::SendParameters {
                    client_id: Some(client_id.to_string()),
                    parameters: ParameterPayload::Tensors(nested),
                };

                debug!(round = index, tensors = params.len(); "sending whole parameter set");
                (Transfer::Whole { shapes }, msg)
            }
        };

        self.next_index += 1;
        self.round = Some(TrainingRound { index, transfer });

        Ok(RoundStep::Send(msg))
    }

    fn unexpected(&self, got: &'static str) -> ParticipantErr {
        let state = if self.finished {
            "finished"
        } else {
            match (&self.round, self.mode) {
                (None, _) if !self.primed => "waiting to start",
                (None, _) => "between rounds",
                (Some(_), TransferMode::Chunked) => "sending chunked parameters",
                (Some(_), TransferMode::Whole) => "sending whole parameters",
            }
        };

        ParticipantErr::UnexpectedMessage { state, got }
    }
}

fn chunk_message(unit: Vec<f32>) -> Outbound {
    Outbound::SendParameters {
        client_id: None,
        parameters: ParameterPayload::Unit(unit),
    }
}
