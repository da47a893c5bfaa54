use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        tensor: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    InvalidHyperparameter {
        name: &'static str,
        reason: &'static str,
    },
    TrainingFinished,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                tensor,
                got,
                expected,
            } => write!(
                f,
                "The {tensor}-th parameter tensor has shape {got:?}, expected {expected:?}"
            ),
            MlErr::InvalidHyperparameter { name, reason } => {
                write!(f, "Invalid hyperparameter {name}: {reason}")
            }
            MlErr::TrainingFinished => {
                write!(f, "The trainer was called after it signaled there is no more work")
            }
        }
    }
}

impl Error for MlErr {}
