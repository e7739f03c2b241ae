//! Chebyshev interpolation and its homomorphic evaluation.
//!
//! A function on `[a, b]` is approximated by `sum_k c_k T_k(y)` with
//! `y = (2x - a - b) / (b - a)`. Homomorphically, every `T_k` is built from
//! products of lower powers,
//!
//! ```text
//! T_{2m}   = 2 T_m^2 - 1
//! T_{2m+1} = 2 T_{m+1} T_m - T_1
//! ```
//!
//! so `T_k` costs `ceil(log2 k)` levels, and the weighted sum one more.

use std::f64::consts::PI;

use num_complex::Complex64;

use super::{Ciphertext, CkksError, CkksResult, Evaluator};

#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevPolynomial {
    coefficients: Vec<f64>,
    a: f64,
    b: f64,
}

fn ceil_log2(x: usize) -> usize {
    if x <= 1 {
        0
    } else {
        (usize::BITS - (x - 1).leading_zeros()) as usize
    }
}

impl ChebyshevPolynomial {
    /// Interpolates `f` at the `degree + 1` Chebyshev nodes of `[a, b]`.
    pub fn interpolate<F: Fn(f64) -> f64>(f: F, degree: usize, a: f64, b: f64) -> CkksResult<Self> {
        if degree == 0 || !(a < b) {
            return Err(CkksError::InvalidParameter {
                message: format!("cannot interpolate degree {degree} on [{a}, {b}]"),
            });
        }
        let nodes = degree + 1;
        let samples: Vec<f64> = (0..nodes)
            .map(|j| {
                let theta = PI * (j as f64 + 0.5) / nodes as f64;
                f(0.5 * (b - a) * theta.cos() + 0.5 * (a + b))
            })
            .collect();
        let mut coefficients: Vec<f64> = (0..nodes)
            .map(|k| {
                let sum: f64 = samples
                    .iter()
                    .enumerate()
                    .map(|(j, &y)| y * (PI * k as f64 * (j as f64 + 0.5) / nodes as f64).cos())
                    .sum();
                2.0 * sum / nodes as f64
            })
            .collect();
        coefficients[0] *= 0.5;
        Ok(Self { coefficients, a, b })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn interval(&self) -> (f64, f64) {
        (self.a, self.b)
    }

    fn is_normalized(&self) -> bool {
        self.a == -1.0 && self.b == 1.0
    }

    /// Levels consumed by [`PolynomialEvaluator::evaluate_polynomial`].
    pub fn depth(&self) -> usize {
        ceil_log2(self.degree()) + 1 + usize::from(!self.is_normalized())
    }

    /// Plain evaluation with Clenshaw's recurrence.
    pub fn evaluate(&self, x: f64) -> f64 {
        let y = (2.0 * x - self.a - self.b) / (self.b - self.a);
        let (mut b1, mut b2) = (0.0, 0.0);
        for &c in self.coefficients.iter().skip(1).rev() {
            let next = 2.0 * y * b1 - b2 + c;
            b2 = b1;
            b1 = next;
        }
        y * b1 - b2 + self.coefficients[0]
    }
}

pub trait PolynomialEvaluator {
    /// Evaluates `poly` slot-wise; the result has exactly `target_scale` and
    /// sits `poly.depth()` levels below the input.
    fn evaluate_polynomial(
        &self,
        ct: &Ciphertext,
        poly: &ChebyshevPolynomial,
        target_scale: f64,
    ) -> CkksResult<Ciphertext>;
}

impl Evaluator {
    /// `2 * a * b` rescaled.
    fn double_product(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let product = self.mul_relin(a, b)?;
        self.rescale(&self.mul_int(&product, 2)?)
    }

    /// `ct` brought to `level` and `scale` by a unit constant product.
    fn align(&self, ct: &Ciphertext, level: usize, scale: f64) -> CkksResult<Ciphertext> {
        let raised = self.drop_to_level(ct, level + 1)?;
        self.mul_const_then_rescale(&raised, Complex64::new(1.0, 0.0), scale)
    }
}

impl PolynomialEvaluator for Evaluator {
    fn evaluate_polynomial(
        &self,
        ct: &Ciphertext,
        poly: &ChebyshevPolynomial,
        target_scale: f64,
    ) -> CkksResult<Ciphertext> {
        if ct.level() < poly.depth() {
            return Err(CkksError::LevelMismatch {
                expected: poly.depth(),
                actual: ct.level(),
            });
        }
        let t1 = if poly.is_normalized() {
            ct.clone()
        } else {
            let (a, b) = poly.interval();
            let scaled =
                self.mul_const_then_rescale(ct, Complex64::new(2.0 / (b - a), 0.0), ct.scale)?;
            self.add_const(&scaled, Complex64::new(-(a + b) / (b - a), 0.0))?
        };

        let degree = poly.degree();
        let mut powers: Vec<Ciphertext> = Vec::with_capacity(degree + 1);
        powers.push(t1.clone());
        powers.push(t1.clone());
        for k in 2..=degree {
            let m = k / 2;
            let next = if k % 2 == 0 {
                let square = self.double_product(&powers[m], &powers[m])?;
                self.add_const(&square, Complex64::new(-1.0, 0.0))?
            } else {
                let product = self.double_product(&powers[m + 1], &powers[m])?;
                let linear = self.align(&t1, product.level(), product.scale)?;
                self.sub(&product, &linear)?
            };
            powers.push(next);
        }

        let out_level = powers[1..]
            .iter()
            .map(Ciphertext::level)
            .min()
            .unwrap_or(t1.level())
            - 1;
        let mut result: Option<Ciphertext> = None;
        for (k, &c) in poly.coefficients().iter().enumerate().skip(1) {
            let source = self.drop_to_level(&powers[k], out_level + 1)?;
            let term = self.mul_const_then_rescale(&source, Complex64::new(c, 0.0), target_scale)?;
            result = Some(match result {
                Some(acc) => self.add(&acc, &term)?,
                None => term,
            });
        }
        let result = result.ok_or_else(|| CkksError::InvalidParameter {
            message: "polynomial has no non-constant term".to_string(),
        })?;
        self.add_const(&result, Complex64::new(poly.coefficients()[0], 0.0))
    }
}
