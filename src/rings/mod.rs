//! RNS polynomial rings over a chain of word-sized NTT-friendly primes.
//!
//! A [`Ring`] owns the modulus chain and every constant table derived from it.
//! Operations run through a [`RingView`], a copyable `(ring, level)` pair that
//! restricts them to the moduli `q_0..=q_level`.

pub mod basis_extension;
pub mod crt;
pub mod errors;
pub mod ntt;
pub mod poly;
pub mod rescale;
pub mod ring;

mod arithmetic;

pub use basis_extension::{BasisConverter, BasisExtender};
pub use crt::CrtReconstructor;
pub use errors::{RingError, RingResult};
pub use ntt::NttTable;
pub use poly::{PolyQP, RnsPoly};
pub use rescale::RescaleKernelConstants;
pub use ring::{Ring, RingView};
