//! Exact CRT reconstruction of RNS coefficients into multi-precision integers.
//!
//! Kernels never need this: it exists for decoding above level 0 and as the
//! reference against which the word-sized kernels are checked.

use super::{
    errors::{RingError, RingResult},
    poly::RnsPoly,
};
use crate::math::Modulus;
use crypto_bigint::{NonZero, U2048};

/// Wide enough for a 33-modulus chain of 61-bit primes.
pub type WideUint = U2048;

#[derive(Debug, Clone)]
pub struct CrtReconstructor {
    moduli: Vec<Modulus>,
    product: NonZero<WideUint>,
    half_product: WideUint,
    hats: Vec<WideUint>,
    hat_inverses: Vec<u64>,
}

impl CrtReconstructor {
    pub fn new(moduli: &[Modulus]) -> RingResult<Self> {
        if moduli.is_empty() {
            return Err(RingError::EmptyChain);
        }
        let bits: u32 = moduli.iter().map(|q| 64 - q.value().leading_zeros()).sum();
        if bits >= WideUint::BITS - 1 {
            return Err(RingError::InvalidConfiguration {
                reason: format!("modulus product of {bits} bits exceeds CRT width"),
            });
        }

        let product = moduli.iter().fold(WideUint::ONE, |acc, q| {
            acc.wrapping_mul(&WideUint::from_u64(q.value()))
        });
        let mut hats = Vec::with_capacity(moduli.len());
        let mut hat_inverses = Vec::with_capacity(moduli.len());
        for (i, qi) in moduli.iter().enumerate() {
            let hat = moduli
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(WideUint::ONE, |acc, (_, qj)| {
                    acc.wrapping_mul(&WideUint::from_u64(qj.value()))
                });
            let hat_mod_qi = moduli
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(1u64, |acc, (_, qj)| qi.mul(acc, qi.reduce(qj.value())));
            let inverse = qi.inv(hat_mod_qi).ok_or(RingError::InvalidModulus {
                modulus: qi.value(),
                reason: "moduli are not pairwise coprime",
            })?;
            hats.push(hat);
            hat_inverses.push(inverse);
        }

        let product = Option::<NonZero<WideUint>>::from(NonZero::new(product))
            .ok_or(RingError::EmptyChain)?;
        Ok(Self {
            moduli: moduli.to_vec(),
            half_product: product.wrapping_shr(1),
            product,
            hats,
            hat_inverses,
        })
    }

    /// Product of all moduli.
    pub fn product(&self) -> &WideUint {
        &self.product
    }

    /// The unique value in `[0, Q)` with the given residues.
    pub fn reconstruct(&self, residues: &[u64]) -> WideUint {
        debug_assert_eq!(residues.len(), self.moduli.len());
        let mut acc = WideUint::ZERO;
        for (((&r, q), hat), &inv) in residues
            .iter()
            .zip(&self.moduli)
            .zip(&self.hats)
            .zip(&self.hat_inverses)
        {
            let digit = q.mul(q.reduce(r), inv);
            let term = hat.wrapping_mul(&WideUint::from_u64(digit));
            acc = acc.wrapping_add(&term);
            if acc >= *self.product {
                acc = acc.wrapping_sub(&self.product);
            }
        }
        acc
    }

    /// Centered representative in `(-Q/2, Q/2]` as `(magnitude, is_negative)`.
    pub fn reconstruct_centered(&self, residues: &[u64]) -> (WideUint, bool) {
        let value = self.reconstruct(residues);
        if value > self.half_product {
            (self.product.wrapping_sub(&value), true)
        } else {
            (value, false)
        }
    }

    /// Centered representative rounded to the nearest `f64`.
    pub fn reconstruct_centered_f64(&self, residues: &[u64]) -> f64 {
        let (magnitude, negative) = self.reconstruct_centered(residues);
        let value = wide_to_f64(&magnitude);
        if negative { -value } else { value }
    }

    /// Residues of one coefficient column of `poly`, one per modulus.
    pub fn column(&self, poly: &RnsPoly, column: usize) -> Vec<u64> {
        (0..self.moduli.len()).map(|i| poly.row(i)[column]).collect()
    }

    /// Centered coefficients of `poly` as floats.
    pub fn centered_f64_coefficients(&self, poly: &RnsPoly) -> RingResult<Vec<f64>> {
        if poly.level() + 1 < self.moduli.len() {
            return Err(RingError::LevelMismatch {
                expected: self.moduli.len() - 1,
                actual: poly.level(),
            });
        }
        Ok((0..poly.degree())
            .map(|c| self.reconstruct_centered_f64(&self.column(poly, c)))
            .collect())
    }
}

/// Nearest-ish `f64` of a wide unsigned integer.
pub fn wide_to_f64(value: &WideUint) -> f64 {
    value
        .as_words()
        .iter()
        .rev()
        .fold(0.0, |acc, &word| acc * 18_446_744_073_709_551_616.0 + word as f64)
}

/// Residue of a wide integer modulo a word-sized modulus.
pub fn wide_mod(value: &WideUint, modulus: &Modulus) -> u64 {
    let two_64 = modulus.reduce(u64::MAX) + 1;
    value.as_words().iter().rev().fold(0u64, |acc, &word| {
        modulus.add(modulus.mul(acc, modulus.reduce(two_64)), modulus.reduce(word))
    })
}
