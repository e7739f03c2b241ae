use crate::{encoding::EncodingError, rings::RingError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CkksError {
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Ring error: {source}")]
    Ring {
        #[from]
        source: RingError,
    },

    #[error("Encoding failed: {source}")]
    Encoding {
        #[from]
        source: EncodingError,
    },

    #[error("Scale mismatch: expected {expected:.2}, got {actual:.2}")]
    ScaleMismatch { expected: f64, actual: f64 },

    #[error("Level mismatch: expected {expected}, got {actual}")]
    LevelMismatch { expected: usize, actual: usize },

    #[error("Degree mismatch: expected {expected}, got {actual}")]
    DegreeMismatch { expected: usize, actual: usize },

    #[error("No Galois key for element {galois_element}")]
    MissingGaloisKey { galois_element: u64 },

    #[error("No relinearization key")]
    MissingRelinearizationKey,

    #[error("Too many values: got {got}, max {max}")]
    TooManyValues { got: usize, max: usize },
}

pub type CkksResult<T> = Result<T, CkksError>;
