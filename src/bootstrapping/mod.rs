//! CKKS bootstrapping: refreshes an exhausted ciphertext to the top of the
//! residual modulus chain.
//!
//! [`BootstrapParameters`] extends a residual parameter set with the levels
//! the pipeline consumes; [`gen_bootstrapping_keys`] derives the matching
//! evaluation keys from the residual secret key; [`Bootstrapper`] runs the
//! pipeline.

pub mod dft;
pub mod errors;
pub mod evaluator;
pub mod keys;
pub mod mod1;
pub mod parameters;

pub use errors::{BootstrapError, BootstrapResult, Stage};
pub use evaluator::Bootstrapper;
pub use keys::{bootstrapping_galois_elements, gen_bootstrapping_keys};
pub use mod1::Mod1Evaluator;
pub use parameters::{
    BootstrapParameters, Mod1Parameters, ParametersLiteral, StageLevels, TestProfile,
};
