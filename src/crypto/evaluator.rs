//! Homomorphic evaluation on coefficient-domain ciphertexts.
//!
//! Operands at different levels are brought to the lower one. Additive
//! operations require matching scales; multiplicative ones multiply them.
//! Rescaling divides the scale by the removed prime.

use std::sync::Arc;

use num_complex::Complex64;

use super::{Ciphertext, CkksError, CkksResult, Parameters, Plaintext};
use crate::keys::{EvaluationKeySet, SwitchingKey};
use crate::rings::{PolyQP, RingView, RnsPoly};

/// Relative tolerance when comparing the scales of two operands.
const SCALE_TOLERANCE: f64 = 1e-9;

/// Scalars beyond this magnitude do not fit an `i128`.
const MAX_SCALAR: f64 = 1.0e37;

pub(crate) fn check_scales(expected: f64, actual: f64) -> CkksResult<()> {
    if (expected - actual).abs() > SCALE_TOLERANCE * expected.abs().max(actual.abs()) {
        return Err(CkksError::ScaleMismatch { expected, actual });
    }
    Ok(())
}

fn round_scalar(value: f64) -> CkksResult<i128> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded.abs() > MAX_SCALAR {
        return Err(CkksError::InvalidParameter {
            message: format!("scalar {value} cannot be represented exactly"),
        });
    }
    Ok(rounded as i128)
}

/// Evaluator over one parameter set. Holds no mutable state, so one instance
/// can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Evaluator {
    params: Arc<Parameters>,
    keys: Arc<EvaluationKeySet>,
}

impl Evaluator {
    pub fn new(params: Arc<Parameters>, keys: Arc<EvaluationKeySet>) -> Self {
        Self { params, keys }
    }

    pub fn params(&self) -> &Arc<Parameters> {
        &self.params
    }

    pub fn keys(&self) -> &Arc<EvaluationKeySet> {
        &self.keys
    }

    fn view(&self, level: usize) -> CkksResult<RingView<'_>> {
        Ok(self.params.ring_q().at_level(level)?)
    }

    fn check_degree(&self, ct: &Ciphertext) -> CkksResult<()> {
        if ct.degree() != self.params.degree() || ct.c1.degree() != self.params.degree() {
            return Err(CkksError::DegreeMismatch {
                expected: self.params.degree(),
                actual: ct.degree(),
            });
        }
        if ct.c1.level() != ct.c0.level() {
            return Err(CkksError::LevelMismatch {
                expected: ct.c0.level(),
                actual: ct.c1.level(),
            });
        }
        Ok(())
    }

    // ─── Levels and scales ───────────────────────────────────────────────────

    /// Truncates the ciphertext to `level` without touching the message.
    pub fn drop_to_level(&self, ct: &Ciphertext, level: usize) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        if level > ct.level() {
            return Err(CkksError::LevelMismatch {
                expected: ct.level(),
                actual: level,
            });
        }
        Ok(Ciphertext {
            c0: ct.c0.truncated(level)?,
            c1: ct.c1.truncated(level)?,
            scale: ct.scale,
            log_slots: ct.log_slots,
        })
    }

    pub fn drop_level(&self, ct: &Ciphertext, levels: usize) -> CkksResult<Ciphertext> {
        let level = ct.level().checked_sub(levels).ok_or(CkksError::LevelMismatch {
            expected: ct.level(),
            actual: levels,
        })?;
        self.drop_to_level(ct, level)
    }

    /// Divides by the top prime: one level down, scale divided by `q_l`.
    pub fn rescale(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let q_top = view.last_modulus().value() as f64;
        let mut out = ct.clone();
        view.div_round_by_last_modulus_inplace(&mut out.c0)?;
        view.div_round_by_last_modulus_inplace(&mut out.c1)?;
        out.scale = ct.scale / q_top;
        Ok(out)
    }

    // ─── Additive ────────────────────────────────────────────────────────────

    fn pair(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<(Ciphertext, Ciphertext)> {
        self.check_degree(a)?;
        self.check_degree(b)?;
        let level = a.level().min(b.level());
        Ok((self.drop_to_level(a, level)?, self.drop_to_level(b, level)?))
    }

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        check_scales(a.scale, b.scale)?;
        let (mut out, b) = self.pair(a, b)?;
        let view = self.view(out.level())?;
        view.add_assign(&mut out.c0, &b.c0)?;
        view.add_assign(&mut out.c1, &b.c1)?;
        Ok(out)
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        check_scales(a.scale, b.scale)?;
        let (mut out, b) = self.pair(a, b)?;
        let view = self.view(out.level())?;
        view.sub_assign(&mut out.c0, &b.c0)?;
        view.sub_assign(&mut out.c1, &b.c1)?;
        Ok(out)
    }

    pub fn neg(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let mut out = ct.clone();
        view.neg_assign(&mut out.c0)?;
        view.neg_assign(&mut out.c1)?;
        Ok(out)
    }

    /// Adds the constant `c` to every slot.
    ///
    /// The imaginary part goes on `X^{N/2}`, which evaluates to `i` at every
    /// slot root.
    pub fn add_const(&self, ct: &Ciphertext, c: Complex64) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let mut out = ct.clone();
        view.add_to_coefficient(&mut out.c0, 0, round_scalar(c.re * ct.scale)?)?;
        view.add_to_coefficient(&mut out.c0, view.degree() / 2, round_scalar(c.im * ct.scale)?)?;
        Ok(out)
    }

    // ─── Scalar products ─────────────────────────────────────────────────────

    /// Multiplies the message by an integer; level and scale are unchanged.
    pub fn mul_int(&self, ct: &Ciphertext, k: i128) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let mut out = ct.clone();
        view.mul_scalar_assign(&mut out.c0, k)?;
        view.mul_scalar_assign(&mut out.c1, k)?;
        Ok(out)
    }

    /// Multiplies by the complex constant `c` and rescales so that the result
    /// lands exactly on `target_scale`.
    ///
    /// The integer multiplier is `round(c * target_scale * q_l / scale)`, so
    /// the only deviation from `c * m` is the rounding of that multiplier.
    pub fn mul_const_then_rescale(
        &self,
        ct: &Ciphertext,
        c: Complex64,
        target_scale: f64,
    ) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let factor = target_scale * view.last_modulus().value() as f64 / ct.scale;
        let k_re = round_scalar(c.re * factor)?;
        let k_im = round_scalar(c.im * factor)?;

        let mut out = self.mul_int(ct, k_re)?;
        if k_im != 0 {
            let rotated = self.mul_by_i(ct)?;
            let imag = self.mul_int(&rotated, k_im)?;
            view.add_assign(&mut out.c0, &imag.c0)?;
            view.add_assign(&mut out.c1, &imag.c1)?;
        }
        let mut out = self.rescale(&out)?;
        out.scale = target_scale;
        Ok(out)
    }

    /// Multiplies by `i` (the monomial `X^{N/2}`); free of noise and levels.
    pub fn mul_by_i(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let view = self.view(ct.level())?;
        let half = view.degree() / 2;
        let mut out = ct.clone();
        view.mul_by_monomial(&ct.c0, half, &mut out.c0)?;
        view.mul_by_monomial(&ct.c1, half, &mut out.c1)?;
        Ok(out)
    }

    // ─── Products ────────────────────────────────────────────────────────────

    /// Slot-wise product with a plaintext; scales multiply, no rescale.
    pub fn mul_plaintext(&self, ct: &Ciphertext, pt: &Plaintext) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let level = ct.level().min(pt.level());
        let view = self.view(level)?;
        let mut pt_ntt = pt.poly.truncated(level)?;
        view.ntt_assign(&mut pt_ntt)?;
        let mut out = self.drop_to_level(ct, level)?;
        for c in [&mut out.c0, &mut out.c1] {
            view.ntt_assign(c)?;
            let source = c.clone();
            view.mul_coeffs(&source, &pt_ntt, c)?;
            view.intt_assign(c)?;
        }
        out.scale = ct.scale * pt.scale;
        Ok(out)
    }

    /// Product of two ciphertexts followed by relinearization; no rescale.
    pub fn mul_relin(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let key = self
            .keys
            .relinearization_key()
            .ok_or(CkksError::MissingRelinearizationKey)?;
        let (a, b) = self.pair(a, b)?;
        let level = a.level();
        let view = self.view(level)?;

        let to_ntt = |poly: &RnsPoly| -> CkksResult<RnsPoly> {
            let mut p = poly.clone();
            view.ntt_assign(&mut p)?;
            Ok(p)
        };
        let (a0, a1, b0, b1) = (to_ntt(&a.c0)?, to_ntt(&a.c1)?, to_ntt(&b.c0)?, to_ntt(&b.c1)?);

        let mut d0 = view.new_poly();
        let mut d1 = view.new_poly();
        let mut d2 = view.new_poly();
        view.mul_coeffs(&a0, &b0, &mut d0)?;
        view.mul_coeffs(&a0, &b1, &mut d1)?;
        view.mul_coeffs_then_add(&a1, &b0, &mut d1)?;
        view.mul_coeffs(&a1, &b1, &mut d2)?;
        for d in [&mut d0, &mut d1, &mut d2] {
            view.intt_assign(d)?;
        }

        let (k0, k1) = self.key_switch(level, &d2, key)?;
        view.add_assign(&mut d0, &k0)?;
        view.add_assign(&mut d1, &k1)?;
        Ok(Ciphertext {
            c0: d0,
            c1: d1,
            scale: a.scale * b.scale,
            log_slots: a.log_slots.max(b.log_slots),
        })
    }

    // ─── Automorphisms ───────────────────────────────────────────────────────

    /// Applies `X -> X^galois_element` and switches back to the original key.
    pub fn apply_galois(&self, ct: &Ciphertext, galois_element: u64) -> CkksResult<Ciphertext> {
        self.check_degree(ct)?;
        let key = self
            .keys
            .galois_key(galois_element)
            .ok_or(CkksError::MissingGaloisKey { galois_element })?;
        let level = ct.level();
        let view = self.view(level)?;
        let mut c0 = view.new_poly();
        let mut c1 = view.new_poly();
        view.automorphism(&ct.c0, galois_element, &mut c0)?;
        view.automorphism(&ct.c1, galois_element, &mut c1)?;
        let (k0, k1) = self.key_switch(level, &c1, key)?;
        view.add_assign(&mut c0, &k0)?;
        Ok(Ciphertext {
            c0,
            c1: k1,
            scale: ct.scale,
            log_slots: ct.log_slots,
        })
    }

    /// Rotates slots left by `k` (negative `k` rotates right).
    pub fn rotate(&self, ct: &Ciphertext, k: i64) -> CkksResult<Ciphertext> {
        let g = self.params.galois_element(k);
        if g == 1 {
            return Ok(ct.clone());
        }
        self.apply_galois(ct, g)
    }

    pub fn conjugate(&self, ct: &Ciphertext) -> CkksResult<Ciphertext> {
        self.apply_galois(ct, self.params.conjugation_galois_element())
    }

    // ─── Key switching ───────────────────────────────────────────────────────

    /// Hybrid key switching of the coefficient-domain polynomial `c` at
    /// `level`: `(k0, k1)` with `k0 + k1*s ≈ c * s_in`.
    ///
    /// Each gadget digit is lifted onto `Q_l ∪ P` with a fast basis
    /// conversion, multiplied with its key pair in NTT form and accumulated;
    /// the sums are divided by `P` with ModDown.
    pub fn key_switch(&self, level: usize, c: &RnsPoly, key: &SwitchingKey) -> CkksResult<(RnsPoly, RnsPoly)> {
        let n = self.params.degree();
        let view_q = self.view(level)?;
        let view_p = self.params.ring_p().view();
        let level_p = view_p.level();
        let alpha = self.params.digit_size();
        let digit_count = self.params.digit_count(level);
        if c.level() < level || c.degree() != n {
            return Err(CkksError::LevelMismatch {
                expected: level,
                actual: c.level(),
            });
        }
        if key.digits().len() < digit_count {
            return Err(CkksError::InvalidParameter {
                message: format!(
                    "switching key has {} digits, level {level} needs {digit_count}",
                    key.digits().len()
                ),
            });
        }

        let mut acc0 = PolyQP::zero(n, level, level_p);
        let mut acc1 = PolyQP::zero(n, level, level_p);
        let mut lifted = PolyQP::zero(n, level, level_p);
        for (d, digit) in key.digits().iter().take(digit_count).enumerate() {
            let start = d * alpha;
            let end = ((d + 1) * alpha).min(level + 1);
            let converter = self.params.digit_converter(d, end - start)?;
            {
                let source: Vec<&[u64]> = (start..end).map(|i| c.row(i)).collect();
                let mut target: Vec<&mut [u64]> =
                    lifted.p.rows_mut().chain(lifted.q.rows_mut()).collect();
                converter.convert_approx(&source, &mut target)?;
            }
            view_q.ntt_assign(&mut lifted.q)?;
            view_p.ntt_assign(&mut lifted.p)?;
            view_q.mul_coeffs_then_add(&lifted.q, &digit.b.q, &mut acc0.q)?;
            view_p.mul_coeffs_then_add(&lifted.p, &digit.b.p, &mut acc0.p)?;
            view_q.mul_coeffs_then_add(&lifted.q, &digit.a.q, &mut acc1.q)?;
            view_p.mul_coeffs_then_add(&lifted.p, &digit.a.p, &mut acc1.p)?;
        }

        let mod_down = |mut acc: PolyQP| -> CkksResult<RnsPoly> {
            view_q.intt_assign(&mut acc.q)?;
            view_p.intt_assign(&mut acc.p)?;
            self.params
                .extender()
                .mod_down_qp_to_q_inplace(level, level_p, &mut acc.q, &acc.p)?;
            Ok(acc.q)
        };
        Ok((mod_down(acc0)?, mod_down(acc1)?))
    }
}
