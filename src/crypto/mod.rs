//! CKKS primitives the bootstrapping core is built on
//!
//! This module provides parameter sets, encryption and decryption, and the
//! homomorphic evaluator together with its linear-transform and polynomial
//! extensions.

pub mod errors;
pub mod evaluator;
pub mod linear_transform;
pub mod operations;
pub mod params;
pub mod polynomial;
pub mod precision;
pub mod types;

pub use errors::{CkksError, CkksResult};
pub use evaluator::Evaluator;
pub use linear_transform::{Diagonals, LinearTransform, LinearTransformEvaluator, rotation_steps};
pub use operations::{Decryptor, Encryptor};
pub use params::{Parameters, ParametersLiteral};
pub use polynomial::{ChebyshevPolynomial, PolynomialEvaluator};
pub use precision::{PrecisionStats, precision_floor};
pub use types::{Ciphertext, Plaintext};
