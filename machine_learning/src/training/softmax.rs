use log::{debug, info};
use ndarray::{Array1, Array2, Axis, Ix1, Ix2};

use super::{Evaluation, TrainResult, Trainer};
use crate::{
    MlErr, Result, Tensor,
    dataset::Dataset,
    optimization::{GradientDescent, Optimizer},
};

/// Hyperparameters of a `SoftmaxTrainer`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftmaxConfig {
    /// The amount of aggregated rounds to consume before signaling the end.
    pub max_rounds: usize,
    /// Full passes over the local dataset per round.
    pub epochs_per_round: usize,
    pub learning_rate: f32,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            epochs_per_round: 1,
            learning_rate: 0.01,
        }
    }
}

/// Multinomial logistic regression trained with full-batch gradient descent.
///
/// Its parameters travel as two tensors: the weights, of shape `features x classes`, and the
/// bias, of shape `classes`.
pub struct SoftmaxTrainer<O: Optimizer = GradientDescent> {
    dataset: Dataset,
    weights: Array2<f32>,
    bias: Array1<f32>,
    optimizer: O,
    config: SoftmaxConfig,
    round: usize,
    finished: bool,
}

impl SoftmaxTrainer<GradientDescent> {
    /// Creates a new `SoftmaxTrainer` optimized with plain gradient descent.
    ///
    /// # Arguments
    /// * `dataset` - The local training data.
    /// * `config` - The trainer's hyperparameters.
    pub fn new(dataset: Dataset, config: SoftmaxConfig) -> Result<Self> {
        let optimizer = GradientDescent::new(config.learning_rate);
        Self::with_optimizer(dataset, optimizer, config)
    }
}

impl<O: Optimizer> SoftmaxTrainer<O> {
    /// Creates a new `SoftmaxTrainer` with a custom optimizer.
    ///
    /// # Arguments
    /// * `dataset` - The local training data.
    /// * `optimizer` - The update rule applied after every epoch.
    /// * `config` - The trainer's hyperparameters.
    pub fn with_optimizer(dataset: Dataset, optimizer: O, config: SoftmaxConfig) -> Result<Self> {
        if dataset.is_empty() {
            return Err(MlErr::SizeMismatch {
                what: "dataset samples",
                got: 0,
                expected: 1,
            });
        }

        if !(config.learning_rate.is_finite() && config.learning_rate > 0.0) {
            return Err(MlErr::InvalidHyperparameter {
                name: "learning_rate",
                reason: "must be a positive finite number",
            });
        }

        Ok(Self {
            weights: Array2::zeros((dataset.features(), dataset.classes())),
            bias: Array1::zeros(dataset.classes()),
            dataset,
            optimizer,
            config,
            round: 0,
            finished: false,
        })
    }

    /// Row-wise class probabilities for every sample of the dataset.
    fn probabilities(&self) -> Array2<f32> {
        let mut probs = self.dataset.x().dot(&self.weights) + &self.bias;

        for mut row in probs.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |max, &v| max.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        probs
    }

    fn fit(&mut self) {
        let n = self.dataset.len() as f32;

        for epoch in 0..self.config.epochs_per_round {
            let mut delta = self.probabilities();
            for (mut row, &label) in delta.rows_mut().into_iter().zip(self.dataset.labels()) {
                row[label] -= 1.0;
            }
            delta /= n;

            let grad_w = self.dataset.x().t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));

            self.optimizer
                .update_params(self.weights.view_mut().into_dyn(), grad_w.view().into_dyn());
            self.optimizer
                .update_params(self.bias.view_mut().into_dyn(), grad_b.view().into_dyn());

            debug!(round = self.round, epoch = epoch; "local epoch done");
        }
    }

    fn evaluate(&self) -> Evaluation {
        let probs = self.probabilities();
        let n = self.dataset.len() as f32;

        let mut loss = 0.0;
        let mut hits = 0;

        for (row, &label) in probs.rows().into_iter().zip(self.dataset.labels()) {
            loss -= row[label].max(f32::MIN_POSITIVE).ln();

            let (predicted, _) = row.iter().enumerate().fold(
                (0, f32::NEG_INFINITY),
                |best, (i, &p)| if p > best.1 { (i, p) } else { best },
            );

            if predicted == label {
                hits += 1;
            }
        }

        Evaluation {
            loss: loss / n,
            accuracy: hits as f32 / n,
        }
    }

    fn export(&self) -> Vec<Tensor> {
        vec![
            self.weights.clone().into_dyn(),
            self.bias.clone().into_dyn(),
        ]
    }

    fn load(&mut self, params: Vec<Tensor>) -> Result<()> {
        let [weights, bias]: [Tensor; 2] =
            params.try_into().map_err(|params: Vec<Tensor>| MlErr::SizeMismatch {
                what: "parameter tensors",
                got: params.len(),
                expected: 2,
            })?;

        let features = self.dataset.features();
        let classes = self.dataset.classes();

        let got = weights.shape().to_vec();
        self.weights = weights
            .into_dimensionality::<Ix2>()
            .ok()
            .filter(|w| w.dim() == (features, classes))
            .ok_or(MlErr::ShapeMismatch {
                tensor: 0,
                got,
                expected: vec![features, classes],
            })?;

        let got = bias.shape().to_vec();
        self.bias = bias
            .into_dimensionality::<Ix1>()
            .ok()
            .filter(|b| b.len() == classes)
            .ok_or(MlErr::ShapeMismatch {
                tensor: 1,
                got,
                expected: vec![classes],
            })?;

        Ok(())
    }
}

impl<O: Optimizer> Trainer for SoftmaxTrainer<O> {
    fn train(&mut self, params: Option<Vec<Tensor>>) -> Result<TrainResult> {
        if self.finished {
            return Err(MlErr::TrainingFinished);
        }

        let Some(params) = params else {
            self.round = 1;
            info!(
                round = self.round,
                max_rounds = self.config.max_rounds;
                "starting local training"
            );
            self.fit();
            return Ok(TrainResult::proceed(self.export(), None));
        };

        self.round += 1;
        self.load(params)?;
        let evaluation = self.evaluate();

        if self.round > self.config.max_rounds {
            self.finished = true;
            info!(
                loss = evaluation.loss,
                accuracy = evaluation.accuracy;
                "final model evaluation"
            );
            return Ok(TrainResult::finish(Some(evaluation)));
        }

        info!(
            round = self.round,
            loss = evaluation.loss,
            accuracy = evaluation.accuracy;
            "training local model"
        );
        self.fit();

        Ok(TrainResult::proceed(self.export(), Some(evaluation)))
    }
}
