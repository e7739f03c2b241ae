//! Row-wise arithmetic on [`RnsPoly`] values through a [`RingView`].
//!
//! Inputs must reach at least the view's level; outputs are resized to it.
//! Rows are independent and processed in parallel.

use super::{
    errors::{RingError, RingResult},
    poly::RnsPoly,
    ring::RingView,
};
use crate::math::uniform_coefficients;
use rand::Rng;
use rayon::prelude::*;

impl RingView<'_> {
    fn prepare_output(&self, out: &mut RnsPoly) -> RingResult<()> {
        if out.degree() != self.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "output degree {} does not match ring degree {}",
                    out.degree(),
                    self.degree()
                ),
            });
        }
        out.resize(self.level())
    }

    fn rows_len(&self) -> usize {
        (self.level() + 1) * self.degree()
    }

    // ─── Additive ────────────────────────────────────────────────────────────

    pub fn add(&self, a: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.check_input(b)?;
        self.prepare_output(out)?;
        let n = self.degree();
        let len = self.rows_len();
        out.as_mut_slice()
            .par_chunks_exact_mut(n)
            .zip(a.as_slice()[..len].par_chunks_exact(n))
            .zip(b.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|(((o, x), y), m)| {
                for ((o, &x), &y) in o.iter_mut().zip(x).zip(y) {
                    *o = m.add(x, y);
                }
            });
        Ok(())
    }

    pub fn add_assign(&self, a: &mut RnsPoly, b: &RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.check_input(b)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .zip(b.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|((x, y), m)| {
                for (x, &y) in x.iter_mut().zip(y) {
                    *x = m.add(*x, y);
                }
            });
        Ok(())
    }

    pub fn sub_assign(&self, a: &mut RnsPoly, b: &RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.check_input(b)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .zip(b.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|((x, y), m)| {
                for (x, &y) in x.iter_mut().zip(y) {
                    *x = m.sub(*x, y);
                }
            });
        Ok(())
    }

    pub fn neg_assign(&self, a: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .zip(self.moduli().par_iter())
            .for_each(|(x, m)| x.iter_mut().for_each(|x| *x = m.neg(*x)));
        Ok(())
    }

    // ─── Scalars ─────────────────────────────────────────────────────────────

    /// Multiplies by a signed integer, reduced separately in each row.
    pub fn mul_scalar_assign(&self, a: &mut RnsPoly, scalar: i128) -> RingResult<()> {
        self.check_input(a)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .zip(self.moduli().par_iter())
            .for_each(|(x, m)| {
                let s = m.mform(m.reduce_i128(scalar));
                x.iter_mut().for_each(|x| *x = m.mred(*x, s));
            });
        Ok(())
    }

    /// Adds a signed integer to coefficient `index` (coefficient domain).
    pub fn add_to_coefficient(&self, a: &mut RnsPoly, index: usize, value: i128) -> RingResult<()> {
        self.check_input(a)?;
        if index >= self.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!("coefficient index {index} beyond degree {}", self.degree()),
            });
        }
        for (i, m) in self.moduli().iter().enumerate() {
            let row = a.row_mut(i);
            row[index] = m.add(row[index], m.reduce_i128(value));
        }
        Ok(())
    }

    // ─── Transforms ──────────────────────────────────────────────────────────

    pub fn ntt_assign(&self, a: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .enumerate()
            .for_each(|(i, row)| self.ntt_table(i).forward(row));
        Ok(())
    }

    pub fn intt_assign(&self, a: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        let n = self.degree();
        let len = self.rows_len();
        a.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .enumerate()
            .for_each(|(i, row)| self.ntt_table(i).inverse(row));
        Ok(())
    }

    /// Pointwise product of two NTT-domain polynomials.
    pub fn mul_coeffs(&self, a: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.check_input(b)?;
        self.prepare_output(out)?;
        let n = self.degree();
        let len = self.rows_len();
        out.as_mut_slice()
            .par_chunks_exact_mut(n)
            .zip(a.as_slice()[..len].par_chunks_exact(n))
            .zip(b.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|(((o, x), y), m)| {
                for ((o, &x), &y) in o.iter_mut().zip(x).zip(y) {
                    *o = m.mul(x, y);
                }
            });
        Ok(())
    }

    /// `acc += a * b` pointwise, NTT domain.
    pub fn mul_coeffs_then_add(&self, a: &RnsPoly, b: &RnsPoly, acc: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.check_input(b)?;
        self.check_input(acc)?;
        let n = self.degree();
        let len = self.rows_len();
        acc.as_mut_slice()[..len]
            .par_chunks_exact_mut(n)
            .zip(a.as_slice()[..len].par_chunks_exact(n))
            .zip(b.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|(((o, x), y), m)| {
                for ((o, &x), &y) in o.iter_mut().zip(x).zip(y) {
                    *o = m.add(*o, m.mul(x, y));
                }
            });
        Ok(())
    }

    /// Negacyclic product of two coefficient-domain polynomials.
    pub fn mul_poly(&self, a: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        let mut fa = a.truncated(self.level())?;
        let mut fb = b.truncated(self.level())?;
        self.ntt_assign(&mut fa)?;
        self.ntt_assign(&mut fb)?;
        self.mul_coeffs(&fa, &fb, out)?;
        self.intt_assign(out)
    }

    // ─── Ring automorphisms ──────────────────────────────────────────────────

    /// `out = a * X^k` for `0 <= k < 2N`, coefficient domain.
    pub fn mul_by_monomial(&self, a: &RnsPoly, k: usize, out: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.prepare_output(out)?;
        let n = self.degree();
        let k = k % (2 * n);
        let len = self.rows_len();
        out.as_mut_slice()
            .par_chunks_exact_mut(n)
            .zip(a.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|((o, x), m)| {
                for (j, &c) in x.iter().enumerate() {
                    let target = (j + k) % (2 * n);
                    if target < n {
                        o[target] = c;
                    } else {
                        o[target - n] = m.neg(c);
                    }
                }
            });
        Ok(())
    }

    /// `out(X) = a(X^galois_element)` for odd `galois_element`, coefficient domain.
    pub fn automorphism(&self, a: &RnsPoly, galois_element: u64, out: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        if galois_element % 2 == 0 {
            return Err(RingError::InvalidConfiguration {
                reason: format!("galois element {galois_element} must be odd"),
            });
        }
        self.prepare_output(out)?;
        let n = self.degree();
        let two_n = 2 * n as u64;
        let g = galois_element % two_n;
        let len = self.rows_len();
        out.as_mut_slice()
            .par_chunks_exact_mut(n)
            .zip(a.as_slice()[..len].par_chunks_exact(n))
            .zip(self.moduli().par_iter())
            .for_each(|((o, x), m)| {
                for (j, &c) in x.iter().enumerate() {
                    let target = ((j as u64 * g) % two_n) as usize;
                    if target < n {
                        o[target] = c;
                    } else {
                        o[target - n] = m.neg(c);
                    }
                }
            });
        Ok(())
    }

    // ─── Construction ────────────────────────────────────────────────────────

    /// Embeds signed coefficients into every row.
    pub fn from_signed(&self, coeffs: &[i64]) -> RingResult<RnsPoly> {
        let wide: Vec<i128> = coeffs.iter().map(|&c| c as i128).collect();
        self.from_signed_wide(&wide)
    }

    pub fn from_signed_wide(&self, coeffs: &[i128]) -> RingResult<RnsPoly> {
        if coeffs.len() != self.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "expected {} coefficients, got {}",
                    self.degree(),
                    coeffs.len()
                ),
            });
        }
        let mut poly = self.new_poly();
        let n = self.degree();
        poly.as_mut_slice()
            .par_chunks_exact_mut(n)
            .zip(self.moduli().par_iter())
            .for_each(|(row, m)| {
                for (r, &c) in row.iter_mut().zip(coeffs) {
                    *r = m.reduce_i128(c);
                }
            });
        Ok(poly)
    }

    /// Independent uniform residues in every row.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> RnsPoly {
        let n = self.degree();
        let mut poly = self.new_poly();
        for (row, m) in poly.rows_mut().zip(self.moduli()) {
            row.copy_from_slice(&uniform_coefficients(n, m.value(), rng));
        }
        poly
    }

    /// Copies rows `0..=level` of `a` into `out`.
    pub fn copy(&self, a: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        self.check_input(a)?;
        self.prepare_output(out)?;
        let len = self.rows_len();
        out.as_mut_slice().copy_from_slice(&a.as_slice()[..len]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::math::PrimeGenerator;
    use crate::rings::{Ring, RnsPoly};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn ring() -> Ring {
        let moduli = PrimeGenerator::new(16).chain(&[45, 40, 40]).unwrap();
        Ring::new(16, &moduli).unwrap()
    }

    #[test]
    fn add_then_sub_round_trips() {
        let ring = ring();
        let view = ring.view();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let a = view.sample_uniform(&mut rng);
        let b = view.sample_uniform(&mut rng);
        let mut sum = view.new_poly();
        view.add(&a, &b, &mut sum).unwrap();
        view.sub_assign(&mut sum, &b).unwrap();
        assert_eq!(sum, a);
    }

    #[test]
    fn monomial_x_to_n_negates() {
        let ring = ring();
        let view = ring.view();
        let coeffs: Vec<i64> = (0..16).map(|i| i - 5).collect();
        let a = view.from_signed(&coeffs).unwrap();
        let mut out = view.new_poly();
        view.mul_by_monomial(&a, 16, &mut out).unwrap();
        let mut neg = a.clone();
        view.neg_assign(&mut neg).unwrap();
        assert_eq!(out, neg);
    }

    #[test]
    fn monomial_matches_poly_product() {
        let ring = ring();
        let view = ring.view();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let a = view.sample_uniform(&mut rng);
        let mut mono = vec![0i64; 16];
        mono[5] = 1;
        let x5 = view.from_signed(&mono).unwrap();
        let mut expected = view.new_poly();
        view.mul_poly(&a, &x5, &mut expected).unwrap();
        let mut shifted = view.new_poly();
        view.mul_by_monomial(&a, 5, &mut shifted).unwrap();
        assert_eq!(shifted, expected);
    }

    #[test]
    fn automorphism_composes_multiplicatively() {
        let ring = ring();
        let view = ring.view();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let a = view.sample_uniform(&mut rng);
        let (mut once, mut twice, mut direct) =
            (view.new_poly(), view.new_poly(), view.new_poly());
        view.automorphism(&a, 5, &mut once).unwrap();
        view.automorphism(&once, 5, &mut twice).unwrap();
        view.automorphism(&a, 25, &mut direct).unwrap();
        assert_eq!(twice, direct);
        assert!(view.automorphism(&a, 4, &mut once).is_err());
    }

    #[test]
    fn lower_view_ignores_upper_rows() {
        let ring = ring();
        let low = ring.at_level(1).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let a = ring.view().sample_uniform(&mut rng);
        let mut out = RnsPoly::zero(16, 2);
        low.copy(&a, &mut out).unwrap();
        assert_eq!(out.level(), 1);
        assert_eq!(out.row(1), a.row(1));
    }
}
