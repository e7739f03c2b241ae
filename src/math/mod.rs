pub mod modular;
pub mod primes;
pub mod sampling;

pub use modular::Modulus;
pub use primes::{PrimeGenerator, is_ntt_friendly_prime, is_prime};
pub use sampling::{
    gaussian_coefficients, ternary_coefficients, uniform_coefficients,
};
