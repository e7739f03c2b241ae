//! Secret Key (sk): a sparse ternary polynomial s(X) with a fixed number of
//! non-zero coefficients, kept in NTT form over both chains.

use rand::Rng;

use crate::crypto::{CkksError, CkksResult, Parameters};
use crate::math::ternary_coefficients;
use crate::rings::RnsPoly;

#[derive(Debug, Clone)]
pub struct SecretKey {
    coefficients: Vec<i64>,
    /// NTT form over the full Q chain.
    q: RnsPoly,
    /// NTT form over the full P chain.
    p: RnsPoly,
}

impl SecretKey {
    /// Samples a key with the parameters' Hamming weight.
    pub fn generate<R: Rng + ?Sized>(params: &Parameters, rng: &mut R) -> CkksResult<Self> {
        let coefficients = ternary_coefficients(params.degree(), params.hamming_weight(), rng);
        Self::from_coefficients(params, coefficients)
    }

    /// Embeds existing ternary coefficients; used to share one secret between
    /// parameter sets over the same ring degree.
    pub fn from_coefficients(params: &Parameters, coefficients: Vec<i64>) -> CkksResult<Self> {
        if coefficients.len() != params.degree() {
            return Err(CkksError::DegreeMismatch {
                expected: params.degree(),
                actual: coefficients.len(),
            });
        }
        if coefficients.iter().any(|c| c.abs() > 1) {
            return Err(CkksError::InvalidParameter {
                message: "secret key coefficients must be ternary".to_string(),
            });
        }
        let view_q = params.ring_q().view();
        let view_p = params.ring_p().view();
        let mut q = view_q.from_signed(&coefficients)?;
        let mut p = view_p.from_signed(&coefficients)?;
        view_q.ntt_assign(&mut q)?;
        view_p.ntt_assign(&mut p)?;
        Ok(Self { coefficients, q, p })
    }

    pub fn coefficients(&self) -> &[i64] {
        &self.coefficients
    }

    pub fn ntt_q(&self) -> &RnsPoly {
        &self.q
    }

    pub fn ntt_p(&self) -> &RnsPoly {
        &self.p
    }
}
