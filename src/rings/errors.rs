use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring degree must be a power of two, got {degree}")]
    InvalidDegree { degree: usize },
    #[error("modulus chain must contain at least one modulus")]
    EmptyChain,
    #[error("invalid modulus {modulus}: {reason}")]
    InvalidModulus { modulus: u64, reason: &'static str },
    #[error("level {level} out of range, maximum level is {max_level}")]
    LevelOutOfRange { level: usize, max_level: usize },
    #[error("level mismatch: expected {expected}, got {actual}")]
    LevelMismatch { expected: usize, actual: usize },
    #[error("level {level} too low, at least {required} required")]
    LevelTooLow { level: usize, required: usize },
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

pub type RingResult<T> = Result<T, RingError>;
