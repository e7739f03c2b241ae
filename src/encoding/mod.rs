//! Canonical-embedding encoder between complex slot vectors and plaintext
//! polynomials.

mod ckks_encoder;

pub use ckks_encoder::CkksEncoder;

use crate::rings::RingError;
use thiserror::Error;

pub type EncodingResult<T> = Result<T, EncodingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Input too long: got {got}, max {max}")]
    InputTooLong { got: usize, max: usize },

    #[error("Coefficient {value} out of range")]
    CoefficientOutOfRange { value: f64 },

    #[error("Ring error: {0}")]
    Ring(#[from] RingError),
}
