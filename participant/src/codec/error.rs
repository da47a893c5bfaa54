use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for the parameter transport codec.
pub type Result<T> = std::result::Result<T, CodecErr>;

/// Failures while splitting tensors into transmission units or putting them back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecErr {
    /// A zero-dimensional tensor has no axis to split along.
    ScalarTensor { tensor: usize },
    /// The tensors hold no one-dimensional slice at all, so there is nothing to transmit.
    Empty,
    /// A tensor holds NaN or an infinity.
    NonFinite { tensor: usize },
    /// Reconstruction was attempted with fewer units than the chunk map describes.
    Incomplete { got: usize, expected: usize },
    /// More units arrived than the chunk map describes.
    Overflow { expected: usize },
    UnitLengthMismatch {
        unit: usize,
        got: usize,
        expected: usize,
    },
    /// A chunk map entry does not address a one-dimensional slice of its tensor.
    InvalidPosition { unit: usize },
    /// A nested array whose siblings have different lengths or depths.
    RaggedArray,
    TensorCountMismatch { got: usize, expected: usize },
    ShapeMismatch {
        tensor: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl Display for CodecErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecErr::ScalarTensor { tensor } => {
                write!(f, "tensor {tensor} is a scalar and can't be split into units")
            }
            CodecErr::Empty => f.write_str("tensors produce no transmission units"),
            CodecErr::NonFinite { tensor } => {
                write!(f, "tensor {tensor} holds a value that is not finite")
            }
            CodecErr::Incomplete { got, expected } => {
                write!(f, "got {got} of the {expected} units needed to reconstruct")
            }
            CodecErr::Overflow { expected } => {
                write!(f, "received more than the {expected} expected units")
            }
            CodecErr::UnitLengthMismatch {
                unit,
                got,
                expected,
            } => write!(f, "unit {unit} has {got} values, expected {expected}"),
            CodecErr::InvalidPosition { unit } => {
                write!(f, "unit {unit} doesn't address a one-dimensional slice")
            }
            CodecErr::RaggedArray => f.write_str("nested array is not rectangular"),
            CodecErr::TensorCountMismatch { got, expected } => {
                write!(f, "got {got} tensors, expected {expected}")
            }
            CodecErr::ShapeMismatch {
                tensor,
                got,
                expected,
            } => write!(f, "tensor {tensor} has shape {got:?}, expected {expected:?}"),
        }
    }
}

impl Error for CodecErr {}
