pub mod dataset;
pub mod error;
pub mod optimization;
pub mod training;

pub use error::{MlErr, Result};

/// An N-dimensional array of parameters with a fixed shape.
pub type Tensor = ndarray::ArrayD<f32>;
