mod softmax;
mod trainer;

pub use softmax::{SoftmaxConfig, SoftmaxTrainer};
pub use trainer::{Evaluation, TrainResult, Trainer};
