//! Homomorphic reduction modulo 1.
//!
//! The input `u = w / K` lies in `[-1, 1]`, with `w = I + ε` for an integer
//! `I` and a small `ε`. A Chebyshev polynomial approximates
//!
//! ```text
//! h(u) = cos(2π (K u - 1/4) / 2^R)
//! ```
//!
//! and `R` double-angle steps `y -> 2y^2 - 1` turn it into
//! `cos(2π w - π/2) = sin(2π w) ≈ 2π ε`.

use std::f64::consts::PI;

use num_complex::Complex64;

use super::parameters::Mod1Parameters;
use crate::crypto::{
    ChebyshevPolynomial, Ciphertext, CkksResult, Evaluator, PolynomialEvaluator,
};
use crate::rings::Ring;

#[derive(Debug, Clone)]
pub struct Mod1Evaluator {
    params: Mod1Parameters,
    poly: ChebyshevPolynomial,
}

impl Mod1Evaluator {
    pub fn new(params: Mod1Parameters) -> CkksResult<Self> {
        let k = params.interval as f64;
        let folds = 2f64.powi(params.double_angle as i32);
        let poly = ChebyshevPolynomial::interpolate(
            move |u| (2.0 * PI * (k * u - 0.25) / folds).cos(),
            params.degree,
            -1.0,
            1.0,
        )?;
        Ok(Self { params, poly })
    }

    pub fn params(&self) -> &Mod1Parameters {
        &self.params
    }

    pub fn polynomial(&self) -> &ChebyshevPolynomial {
        &self.poly
    }

    pub fn depth(&self) -> usize {
        self.poly.depth() + self.params.double_angle as usize
    }

    /// Plain counterpart of [`Mod1Evaluator::evaluate`] at `u`.
    pub fn evaluate_plain(&self, u: f64) -> f64 {
        let mut y = self.poly.evaluate(u);
        for _ in 0..self.params.double_angle {
            y = 2.0 * y * y - 1.0;
        }
        y
    }

    /// Scale of the result for an input at `level`: the polynomial lands on
    /// the eval-mod scale and every double-angle step squares it and divides
    /// by the prime it consumes.
    pub fn output_scale(&self, ring: &Ring, level: usize) -> f64 {
        let mut scale = self.params.scale();
        let mut level = level.saturating_sub(self.poly.depth());
        for _ in 0..self.params.double_angle {
            let q = ring.moduli()[level].value() as f64;
            scale = scale * scale / q;
            level = level.saturating_sub(1);
        }
        scale
    }

    pub fn evaluate(&self, evaluator: &Evaluator, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        let mut y = evaluator.evaluate_polynomial(ct, &self.poly, self.params.scale())?;
        for _ in 0..self.params.double_angle {
            let square = evaluator.mul_relin(&y, &y)?;
            let doubled = evaluator.rescale(&evaluator.mul_int(&square, 2)?)?;
            y = evaluator.add_const(&doubled, Complex64::new(-1.0, 0.0))?;
        }
        Ok(y)
    }
}
