//! CKKS encoder/decoder for [`RnsPoly`](crate::rings::RnsPoly) plaintexts.
//!
//! Slot `k` of a polynomial `m` is its evaluation at `ζ_k = ω^{5^k}`, where
//! `ω = exp(iπ/N)` is a primitive `2N`-th root of unity. The conjugate roots
//! `ω^{-5^k}` carry the conjugate slots, so real coefficients are recovered
//! from a single size-`2N` FFT over all odd exponents:
//!
//! ```text
//! encode: Y[5^k] = z_k, Y[2N - 5^k] = conj(z_k)  →  t_j = Re(FFT(Y)[j]) / N
//! decode: X = IFFT(t zero-padded to 2N)          →  z_k = X[5^k]
//! ```
//!
//! With `2^log_slots < N/2` slots the vector is replicated across all `N/2`
//! slots, which makes the encoded polynomial a polynomial in `X^{N / 2^{log_slots+1}}`.

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::{EncodingError, EncodingResult};
use crate::crypto::Plaintext;
use crate::rings::{CrtReconstructor, Ring};

/// Coefficients whose magnitude exceeds this cannot be represented as `i128`.
const MAX_COEFFICIENT: f64 = 1.7e38;

/// Encoder bound to one ring; the FFT plans are built once and shared.
pub struct CkksEncoder {
    ring: Arc<Ring>,
    /// `5^k mod 2N` for `k < N/2`.
    slot_exponents: Vec<usize>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for CkksEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CkksEncoder")
            .field("degree", &self.ring.degree())
            .finish_non_exhaustive()
    }
}

impl CkksEncoder {
    pub fn new(ring: Arc<Ring>) -> Self {
        let n = ring.degree();
        let two_n = 2 * n;
        let mut slot_exponents = Vec::with_capacity(n / 2);
        let mut g = 1usize;
        for _ in 0..n / 2 {
            slot_exponents.push(g);
            g = (g * 5) % two_n;
        }
        let mut planner = FftPlanner::<f64>::new();
        Self {
            forward: planner.plan_fft_forward(two_n),
            inverse: planner.plan_fft_inverse(two_n),
            ring,
            slot_exponents,
        }
    }

    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    /// `log2(N/2)`, the largest supported slot exponent.
    pub fn max_log_slots(&self) -> usize {
        self.ring.log_degree() as usize - 1
    }

    fn check_log_slots(&self, log_slots: usize) -> EncodingResult<usize> {
        if log_slots > self.max_log_slots() {
            return Err(EncodingError::InvalidInput {
                message: format!(
                    "log_slots {log_slots} exceeds maximum {}",
                    self.max_log_slots()
                ),
            });
        }
        Ok(1 << log_slots)
    }

    fn check_scale(scale: f64) -> EncodingResult<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EncodingError::InvalidInput {
                message: format!("scale {scale} must be positive and finite"),
            });
        }
        Ok(())
    }

    // ── Encoding ─────────────────────────────────────────────────────────────

    /// Scaled integer coefficients of the polynomial whose slots are `values`.
    ///
    /// Missing values (fewer than `2^log_slots`) are zero.
    pub fn encode_coefficients(
        &self,
        values: &[Complex64],
        log_slots: usize,
        scale: f64,
    ) -> EncodingResult<Vec<i128>> {
        let slots = self.check_log_slots(log_slots)?;
        Self::check_scale(scale)?;
        if values.len() > slots {
            return Err(EncodingError::InputTooLong {
                got: values.len(),
                max: slots,
            });
        }

        let n = self.ring.degree();
        let two_n = 2 * n;
        let mut buffer = vec![Complex64::new(0.0, 0.0); two_n];
        for (k, &g) in self.slot_exponents.iter().enumerate() {
            let z = values.get(k % slots).copied().unwrap_or_default();
            buffer[g] = z;
            buffer[two_n - g] = z.conj();
        }
        self.forward.process(&mut buffer);

        let factor = scale / n as f64;
        buffer[..n]
            .iter()
            .map(|c| {
                let value = (c.re * factor).round();
                if !value.is_finite() || value.abs() > MAX_COEFFICIENT {
                    return Err(EncodingError::CoefficientOutOfRange { value });
                }
                Ok(value as i128)
            })
            .collect()
    }

    /// Encodes complex slot values at `level` with the given scale.
    pub fn encode(
        &self,
        values: &[Complex64],
        log_slots: usize,
        level: usize,
        scale: f64,
    ) -> EncodingResult<Plaintext> {
        let coeffs = self.encode_coefficients(values, log_slots, scale)?;
        let poly = self.ring.at_level(level)?.from_signed_wide(&coeffs)?;
        Ok(Plaintext {
            poly,
            scale,
            log_slots,
        })
    }

    /// Encodes real slot values.
    pub fn encode_real(
        &self,
        values: &[f64],
        log_slots: usize,
        level: usize,
        scale: f64,
    ) -> EncodingResult<Plaintext> {
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.encode(&complex, log_slots, level, scale)
    }

    // ── Decoding ─────────────────────────────────────────────────────────────

    /// Slot values of the polynomial with (centered) coefficients `coeffs`.
    pub fn decode_coefficients(
        &self,
        coeffs: &[f64],
        log_slots: usize,
        scale: f64,
    ) -> EncodingResult<Vec<Complex64>> {
        let slots = self.check_log_slots(log_slots)?;
        Self::check_scale(scale)?;
        let n = self.ring.degree();
        if coeffs.len() != n {
            return Err(EncodingError::InvalidInput {
                message: format!("expected {n} coefficients, got {}", coeffs.len()),
            });
        }
        let mut buffer = vec![Complex64::new(0.0, 0.0); 2 * n];
        for (b, &c) in buffer.iter_mut().zip(coeffs) {
            *b = Complex64::new(c, 0.0);
        }
        self.inverse.process(&mut buffer);
        Ok(self.slot_exponents[..slots]
            .iter()
            .map(|&g| buffer[g] / scale)
            .collect())
    }

    /// Decodes the first `2^log_slots` slots of a plaintext.
    ///
    /// Level-0 plaintexts are centered directly; higher levels go through an
    /// exact CRT reconstruction.
    pub fn decode(&self, plaintext: &Plaintext) -> EncodingResult<Vec<Complex64>> {
        let level = plaintext.level();
        let view = self.ring.at_level(level)?;
        let coeffs = if level == 0 {
            let q0 = &view.moduli()[0];
            plaintext
                .poly
                .row(0)
                .iter()
                .map(|&c| q0.center(c) as f64)
                .collect()
        } else {
            CrtReconstructor::new(view.moduli())?.centered_f64_coefficients(&plaintext.poly)?
        };
        self.decode_coefficients(&coeffs, plaintext.log_slots, plaintext.scale)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PrimeGenerator;
    use approx::assert_abs_diff_eq;

    fn encoder() -> CkksEncoder {
        let moduli = PrimeGenerator::new(16).chain(&[50, 40, 40]).unwrap();
        CkksEncoder::new(Arc::new(Ring::new(16, &moduli).unwrap()))
    }

    fn sample_values(len: usize) -> Vec<Complex64> {
        (0..len)
            .map(|k| Complex64::new(0.1 * k as f64 - 0.4, 0.05 * (k as f64).sin()))
            .collect()
    }

    #[test]
    fn roundtrip_full_slots_at_every_level() {
        let encoder = encoder();
        let values = sample_values(8);
        for level in 0..=2 {
            let pt = encoder.encode(&values, 3, level, 2f64.powi(30)).unwrap();
            assert_eq!(pt.level(), level);
            let decoded = encoder.decode(&pt).unwrap();
            for (want, got) in values.iter().zip(&decoded) {
                assert_abs_diff_eq!(want.re, got.re, epsilon = 1e-7);
                assert_abs_diff_eq!(want.im, got.im, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn sparse_slots_replicate_into_a_subring() {
        let encoder = encoder();
        let values = sample_values(2);
        let coeffs = encoder.encode_coefficients(&values, 1, 2f64.powi(30)).unwrap();
        // 2 slots in N = 16 leave only multiples of X^4.
        for (j, c) in coeffs.iter().enumerate() {
            if j % 4 != 0 {
                assert!(c.abs() <= 1, "coefficient {j} = {c}");
            }
        }
        let pt = encoder.encode(&values, 1, 1, 2f64.powi(30)).unwrap();
        let decoded = encoder.decode(&pt).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_abs_diff_eq!(decoded[1].re, values[1].re, epsilon = 1e-7);
    }

    #[test]
    fn real_inputs_give_real_slots() {
        let encoder = encoder();
        let pt = encoder.encode_real(&[0.25, -0.75, 0.5], 2, 0, 2f64.powi(30)).unwrap();
        let decoded = encoder.decode(&pt).unwrap();
        assert_abs_diff_eq!(decoded[1].re, -0.75, epsilon = 1e-7);
        assert_abs_diff_eq!(decoded[3].re, 0.0, epsilon = 1e-7);
        assert!(decoded.iter().all(|z| z.im.abs() < 1e-7));
    }

    #[test]
    fn constant_i_is_the_half_degree_monomial() {
        let encoder = encoder();
        let values = vec![Complex64::new(0.0, 1.0); 8];
        let coeffs = encoder.encode_coefficients(&values, 3, 1024.0).unwrap();
        assert_eq!(coeffs[8], 1024);
        assert!(coeffs.iter().enumerate().all(|(j, &c)| j == 8 || c == 0));
    }

    #[test]
    fn rejects_bad_inputs() {
        let encoder = encoder();
        assert!(matches!(
            encoder.encode(&sample_values(5), 2, 0, 1e6),
            Err(EncodingError::InputTooLong { got: 5, max: 4 })
        ));
        assert!(matches!(
            encoder.encode(&sample_values(2), 4, 0, 1e6),
            Err(EncodingError::InvalidInput { .. })
        ));
        assert!(matches!(
            encoder.encode(&sample_values(2), 1, 0, f64::NAN),
            Err(EncodingError::InvalidInput { .. })
        ));
        assert!(matches!(
            encoder.encode(&sample_values(2), 1, 3, 1e6),
            Err(EncodingError::Ring(_))
        ));
    }
}
