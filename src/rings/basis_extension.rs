//! RNS basis extension (ModUp) and division by the auxiliary chain (ModDown).
//!
//! Fast basis conversion from a source basis `S = s_0 ... s_{k-1}` to a
//! target modulus `t`:
//!
//! ```text
//! y_j  = [x_j * (S/s_j)^{-1}]_{s_j}
//! x~_t = sum_j y_j * (S/s_j)  mod t
//! ```
//!
//! `x~` equals `x + v*S` for some `0 <= v < k`. The exact variant estimates
//! `v' = round(sum_j y_j / s_j)` in floating point and subtracts `v' * S`,
//! which lands on the centered representative of `x` in `(-S/2, S/2)`.
//! Every scalar is precomputed once, in Montgomery form, at construction.

use super::{
    errors::{RingError, RingResult},
    poly::RnsPoly,
    ring::Ring,
};
use crate::math::Modulus;
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BasisConverter {
    source: Vec<Modulus>,
    target: Vec<Modulus>,
    hat_inverses: Vec<u64>,
    hats_in_target: Vec<Vec<u64>>,
    product_in_target: Vec<u64>,
    source_reciprocals: Vec<f64>,
}

impl BasisConverter {
    pub fn new(source: &[Modulus], target: &[Modulus]) -> RingResult<Self> {
        if source.is_empty() {
            return Err(RingError::EmptyChain);
        }

        let mut hat_inverses = Vec::with_capacity(source.len());
        for (j, sj) in source.iter().enumerate() {
            let hat = product_mod(source, Some(j), sj);
            let inverse = sj.inv(hat).ok_or(RingError::InvalidModulus {
                modulus: sj.value(),
                reason: "source moduli are not pairwise coprime",
            })?;
            hat_inverses.push(sj.mform(inverse));
        }

        let hats_in_target = target
            .iter()
            .map(|ti| {
                (0..source.len())
                    .map(|j| ti.mform(product_mod(source, Some(j), ti)))
                    .collect()
            })
            .collect();
        let product_in_target = target
            .iter()
            .map(|ti| ti.mform(product_mod(source, None, ti)))
            .collect();

        Ok(Self {
            source: source.to_vec(),
            target: target.to_vec(),
            hat_inverses,
            hats_in_target,
            product_in_target,
            source_reciprocals: source.iter().map(|s| 1.0 / s.value() as f64).collect(),
        })
    }

    pub fn source(&self) -> &[Modulus] {
        &self.source
    }

    pub fn target(&self) -> &[Modulus] {
        &self.target
    }

    /// Fast conversion; the result may be off by a small multiple of `S`.
    pub fn convert_approx(&self, source: &[&[u64]], target: &mut [&mut [u64]]) -> RingResult<()> {
        self.convert(source, target, false)
    }

    /// Conversion to the centered representative of the source value.
    pub fn convert_exact(&self, source: &[&[u64]], target: &mut [&mut [u64]]) -> RingResult<()> {
        self.convert(source, target, true)
    }

    fn convert(&self, source: &[&[u64]], target: &mut [&mut [u64]], exact: bool) -> RingResult<()> {
        if source.len() != self.source.len() {
            return Err(RingError::LevelMismatch {
                expected: self.source.len() - 1,
                actual: source.len().wrapping_sub(1),
            });
        }
        if target.len() > self.target.len() {
            return Err(RingError::LevelMismatch {
                expected: self.target.len().wrapping_sub(1),
                actual: target.len() - 1,
            });
        }
        let degree = source[0].len();
        if source.iter().any(|row| row.len() != degree)
            || target.iter().any(|row| row.len() != degree)
        {
            return Err(RingError::InvalidConfiguration {
                reason: "basis conversion rows differ in length".to_string(),
            });
        }

        let digits: Vec<Vec<u64>> = source
            .par_iter()
            .zip(self.source.par_iter())
            .zip(self.hat_inverses.par_iter())
            .map(|((row, sj), &hat_inv)| row.iter().map(|&x| sj.mred(x, hat_inv)).collect())
            .collect();

        let overflow: Option<Vec<u64>> = exact.then(|| {
            (0..degree)
                .map(|c| {
                    let estimate: f64 = digits
                        .iter()
                        .zip(&self.source_reciprocals)
                        .map(|(d, &r)| d[c] as f64 * r)
                        .sum();
                    estimate.round() as u64
                })
                .collect()
        });

        target
            .par_iter_mut()
            .zip(self.target.par_iter())
            .zip(self.hats_in_target.par_iter())
            .zip(self.product_in_target.par_iter())
            .for_each(|(((out, ti), hats), &product)| {
                for (c, o) in out.iter_mut().enumerate() {
                    let mut acc = 0u64;
                    for (d, &hat) in digits.iter().zip(hats) {
                        acc = ti.add(acc, ti.mred(d[c], hat));
                    }
                    if let Some(v) = &overflow {
                        acc = ti.sub(acc, ti.mred(v[c], product));
                    }
                    *o = acc;
                }
            });
        Ok(())
    }
}

/// Product of `moduli` (optionally skipping one index) reduced modulo `m`.
fn product_mod(moduli: &[Modulus], skip: Option<usize>, m: &Modulus) -> u64 {
    moduli
        .iter()
        .enumerate()
        .filter(|&(j, _)| Some(j) != skip)
        .fold(1u64, |acc, (_, q)| m.mul(acc, m.reduce(q.value())))
}

/// ModUp/ModDown between a Q chain and an auxiliary P chain.
///
/// Converters are precomputed for every prefix of each chain, so calls at any
/// level pair only read shared tables.
#[derive(Debug, Clone)]
pub struct BasisExtender {
    ring_q: Arc<Ring>,
    ring_p: Arc<Ring>,
    p_to_q: Vec<BasisConverter>,
    q_to_p: Vec<BasisConverter>,
    p_inverse_in_q: Vec<Vec<u64>>,
}

impl BasisExtender {
    pub fn new(ring_q: Arc<Ring>, ring_p: Arc<Ring>) -> RingResult<Self> {
        if ring_q.degree() != ring_p.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "Q degree {} and P degree {} differ",
                    ring_q.degree(),
                    ring_p.degree()
                ),
            });
        }
        let q = ring_q.moduli();
        let p = ring_p.moduli();
        let p_to_q = (0..p.len())
            .map(|level_p| BasisConverter::new(&p[..=level_p], q))
            .collect::<RingResult<Vec<_>>>()?;
        let q_to_p = (0..q.len())
            .map(|level_q| BasisConverter::new(&q[..=level_q], p))
            .collect::<RingResult<Vec<_>>>()?;
        let p_inverse_in_q = (0..p.len())
            .map(|level_p| {
                q.iter()
                    .map(|qi| {
                        let inv = qi.inv(product_mod(&p[..=level_p], None, qi)).ok_or(
                            RingError::InvalidModulus {
                                modulus: qi.value(),
                                reason: "Q and P chains share a factor",
                            },
                        )?;
                        Ok(qi.mform(inv))
                    })
                    .collect::<RingResult<Vec<_>>>()
            })
            .collect::<RingResult<Vec<_>>>()?;

        Ok(Self {
            ring_q,
            ring_p,
            p_to_q,
            q_to_p,
            p_inverse_in_q,
        })
    }

    pub fn ring_q(&self) -> &Arc<Ring> {
        &self.ring_q
    }

    pub fn ring_p(&self) -> &Arc<Ring> {
        &self.ring_p
    }

    fn check_levels(&self, level_q: usize, level_p: usize) -> RingResult<()> {
        if level_q > self.ring_q.max_level() {
            return Err(RingError::LevelMismatch {
                expected: self.ring_q.max_level(),
                actual: level_q,
            });
        }
        if level_p > self.ring_p.max_level() {
            return Err(RingError::LevelMismatch {
                expected: self.ring_p.max_level(),
                actual: level_p,
            });
        }
        Ok(())
    }

    /// `out = round((x_Q, x_P) / P) mod Q_{level_q}`, where `P` is the product
    /// of `p_0..=p_{level_p}`.
    ///
    /// `out` must already hold exactly `level_q + 1` rows.
    pub fn mod_down_qp_to_q(
        &self,
        level_q: usize,
        level_p: usize,
        poly_q: &RnsPoly,
        poly_p: &RnsPoly,
        out: &mut RnsPoly,
    ) -> RingResult<()> {
        if out.level() != level_q {
            return Err(RingError::LevelMismatch {
                expected: level_q,
                actual: out.level(),
            });
        }
        self.check_levels(level_q, level_p)?;
        self.check_poly(poly_q, level_q)?;
        self.check_poly(out, level_q)?;
        out.as_mut_slice()
            .copy_from_slice(&poly_q.as_slice()[..(level_q + 1) * poly_q.degree()]);
        self.mod_down_qp_to_q_inplace(level_q, level_p, out, poly_p)
    }

    /// In-place form of [`BasisExtender::mod_down_qp_to_q`]: `poly_q` is
    /// overwritten with the quotient and resized to `level_q`.
    pub fn mod_down_qp_to_q_inplace(
        &self,
        level_q: usize,
        level_p: usize,
        poly_q: &mut RnsPoly,
        poly_p: &RnsPoly,
    ) -> RingResult<()> {
        self.check_levels(level_q, level_p)?;
        self.check_poly(poly_q, level_q)?;
        self.check_poly(poly_p, level_p)?;
        let degree = self.ring_q.degree();

        let mut lifted = vec![0u64; (level_q + 1) * degree];
        {
            let source: Vec<&[u64]> = poly_p.rows().take(level_p + 1).collect();
            let mut target: Vec<&mut [u64]> = lifted.chunks_exact_mut(degree).collect();
            self.p_to_q[level_p].convert_exact(&source, &mut target)?;
        }

        poly_q.resize(level_q)?;
        let p_inverse = &self.p_inverse_in_q[level_p];
        poly_q
            .as_mut_slice()
            .par_chunks_exact_mut(degree)
            .zip(lifted.par_chunks_exact(degree))
            .zip(self.ring_q.moduli().par_iter())
            .zip(p_inverse.par_iter())
            .for_each(|(((x, lift), qi), &p_inv)| {
                for (x, &l) in x.iter_mut().zip(lift) {
                    *x = qi.mred(qi.sub(*x, l), p_inv);
                }
            });
        Ok(())
    }

    /// Extends `poly_q` (levels `0..=level_q`) exactly onto `p_0..=p_{level_p}`.
    pub fn mod_up_q_to_p(
        &self,
        level_q: usize,
        level_p: usize,
        poly_q: &RnsPoly,
        out_p: &mut RnsPoly,
    ) -> RingResult<()> {
        self.check_levels(level_q, level_p)?;
        self.check_poly(poly_q, level_q)?;
        out_p.resize(level_p)?;
        let source: Vec<&[u64]> = poly_q.rows().take(level_q + 1).collect();
        let mut target: Vec<&mut [u64]> = out_p.rows_mut().collect();
        self.q_to_p[level_q].convert_exact(&source, &mut target)
    }

    /// Extends `poly_p` (levels `0..=level_p`) exactly onto `q_0..=q_{level_q}`.
    pub fn mod_up_p_to_q(
        &self,
        level_p: usize,
        level_q: usize,
        poly_p: &RnsPoly,
        out_q: &mut RnsPoly,
    ) -> RingResult<()> {
        self.check_levels(level_q, level_p)?;
        self.check_poly(poly_p, level_p)?;
        out_q.resize(level_q)?;
        let source: Vec<&[u64]> = poly_p.rows().take(level_p + 1).collect();
        let mut target: Vec<&mut [u64]> = out_q.rows_mut().collect();
        self.p_to_q[level_p].convert_exact(&source, &mut target)
    }

    fn check_poly(&self, poly: &RnsPoly, level: usize) -> RingResult<()> {
        if poly.degree() != self.ring_q.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "polynomial degree {} does not match ring degree {}",
                    poly.degree(),
                    self.ring_q.degree()
                ),
            });
        }
        if poly.level() < level {
            return Err(RingError::LevelMismatch {
                expected: level,
                actual: poly.level(),
            });
        }
        Ok(())
    }
}
