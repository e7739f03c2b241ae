//! Secret keys and key-switching material.

pub mod secret_key;
pub mod switching_key;

pub use secret_key::SecretKey;
pub use switching_key::{EvaluationKeySet, KeyGenerator, SwitchingKey, SwitchingKeyDigit};
