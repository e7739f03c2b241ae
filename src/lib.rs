pub mod bootstrapping;
pub mod crypto;
pub mod encoding;
pub mod keys;
pub mod math;
pub mod rings;

pub use bootstrapping::{BootstrapError, BootstrapParameters, Bootstrapper};
pub use crypto::{
    Ciphertext, CkksError, Decryptor, Encryptor, Evaluator, Parameters, ParametersLiteral,
    Plaintext,
};
pub use encoding::CkksEncoder;
pub use keys::{EvaluationKeySet, KeyGenerator, SecretKey};
pub use rings::{BasisExtender, Ring, RingView, RnsPoly};
