use crate::{Result, Tensor};

/// The outcome of evaluating the model on its local data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// What a single call to `Trainer::train` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainResult {
    /// The parameters to send for the next round, `None` once there is no more work.
    pub params: Option<Vec<Tensor>>,
    /// The evaluation of the parameters the trainer was given, if it ran one.
    pub evaluation: Option<Evaluation>,
}

impl TrainResult {
    /// A result that asks for another round with `params`.
    pub fn proceed(params: Vec<Tensor>, evaluation: Option<Evaluation>) -> Self {
        Self {
            params: Some(params),
            evaluation,
        }
    }

    /// A result that signals there are no more rounds.
    pub fn finish(evaluation: Option<Evaluation>) -> Self {
        Self {
            params: None,
            evaluation,
        }
    }

    pub fn is_last(&self) -> bool {
        self.params.is_none()
    }
}

/// The model owner's side of a federated session.
///
/// It is first called with `None` to obtain the priming parameters, then once per round with the
/// aggregated parameters returned by the server. It yields `TrainResult::finish` exactly once and
/// must not be called again afterwards.
pub trait Trainer {
    /// Applies `params` (if any), trains locally and returns the parameters to share.
    ///
    /// # Arguments
    /// * `params` - The aggregated parameters of the previous round, `None` on the priming call.
    ///
    /// # Returns
    /// The new parameters and evaluation, or an error if training failed.
    fn train(&mut self, params: Option<Vec<Tensor>>) -> Result<TrainResult>;
}

impl<T: Trainer + ?Sized> Trainer for Box<T> {
    fn train(&mut self, params: Option<Vec<Tensor>>) -> Result<TrainResult> {
        (**self).train(params)
    }
}
