//! Division of RNS polynomials by the top modulus (or several top moduli).
//!
//! For a value `x` with residues `x_0..x_l` and top modulus `q_l`:
//!
//! ```text
//! floor(x / q_l) mod q_i = (x_i - [x]_{q_l}) * q_l^{-1} mod q_i
//! ```
//!
//! Rounding adds an offset `h` first, `floor((x + h) / q_l)`. The plain form
//! uses `h = floor(q_l / 2)`. The aux form uses `h = floor(G / 2)` where `G` is
//! the product of the top `aux_level + 1` moduli: removing the rest of that
//! group afterwards with floor divisions gives `round(x / G)` exactly, since
//! nested floors compose. With `aux_level == 0` both forms coincide.
//!
//! All divisions operate on coefficient-domain polynomials and treat `x` as
//! its canonical representative in `[0, Q_l)`.

use super::{
    errors::{RingError, RingResult},
    poly::RnsPoly,
    ring::RingView,
};
use crate::math::Modulus;
use rayon::prelude::*;

/// Rounding offset residues for one division.
struct Offset {
    top: u64,
    rows: Vec<u64>,
}

impl RingView<'_> {
    fn check_divisible(&self) -> RingResult<()> {
        if self.level() == 0 {
            return Err(RingError::LevelTooLow {
                level: 0,
                required: 1,
            });
        }
        Ok(())
    }

    /// `floor(G / 2)` residues for the group of the top `aux_level + 1` moduli.
    fn group_half_offset(&self, aux_level: usize) -> RingResult<Offset> {
        let level = self.level();
        if aux_level >= level {
            return Err(RingError::LevelTooLow {
                level,
                required: aux_level + 1,
            });
        }
        let group = &self.moduli()[level - aux_level..=level];
        // G is odd, so floor(G / 2) = (G - 1) / 2.
        let half_mod = |m: &Modulus| {
            let g = group.iter().fold(1u64, |acc, q| m.mul(acc, m.reduce(q.value())));
            let two_inv = (m.value() + 1) / 2;
            m.mul(m.sub(g, 1), two_inv)
        };
        Ok(Offset {
            top: half_mod(self.last_modulus()),
            rows: self.moduli()[..level].iter().map(half_mod).collect(),
        })
    }

    /// Divides rows `0..level` of `low` in place by the top modulus, given the
    /// top row separately.
    fn divide_by_top(&self, top: &[u64], low: &mut [u64], offset: Option<&Offset>) -> RingResult<()> {
        let level = self.level();
        let q_top = self.last_modulus();
        let constants = self.ring().rescale_constants(level)?;
        let shifted: Vec<u64> = match offset {
            Some(o) => top.iter().map(|&x| q_top.add(x, o.top)).collect(),
            None => top.to_vec(),
        };
        let zeros;
        let halves: &[u64] = match offset {
            Some(o) => &o.rows,
            None => {
                zeros = vec![0u64; level];
                &zeros
            }
        };
        low.par_chunks_exact_mut(self.degree())
            .zip(self.moduli()[..level].par_iter())
            .zip(constants.par_iter())
            .zip(halves.par_iter())
            .for_each(|(((row, qi), &inv), &h)| {
                for (x, &t) in row.iter_mut().zip(&shifted) {
                    let lifted = qi.add(*x, h);
                    *x = qi.mred(qi.sub(lifted, qi.reduce(t)), inv);
                }
            });
        Ok(())
    }

    fn divide_inplace(&self, a: &mut RnsPoly, offset: Option<&Offset>) -> RingResult<()> {
        self.check_input(a)?;
        self.check_divisible()?;
        let level = self.level();
        a.resize(level)?;
        let (low, top) = a.split_at_row_mut(level);
        let top = top.to_vec();
        self.divide_by_top(&top, low, offset)?;
        a.resize(level - 1)
    }

    fn divide_into(&self, a: &RnsPoly, out: &mut RnsPoly, offset: Option<&Offset>) -> RingResult<()> {
        self.check_input(a)?;
        self.check_divisible()?;
        let level = self.level();
        let n = self.degree();
        if out.degree() != n {
            return Err(RingError::InvalidConfiguration {
                reason: format!("output degree {} does not match ring degree {n}", out.degree()),
            });
        }
        out.resize(level - 1)?;
        out.as_mut_slice().copy_from_slice(&a.as_slice()[..level * n]);
        self.divide_by_top(a.row(level), out.as_mut_slice(), offset)
    }

    // ─── Single-level division ───────────────────────────────────────────────

    /// `out = round(a / q_level)` at level `level - 1`.
    pub fn div_round_by_last_modulus(&self, a: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        self.check_divisible()?;
        let offset = self.group_half_offset(0)?;
        self.divide_into(a, out, Some(&offset))
    }

    pub fn div_round_by_last_modulus_inplace(&self, a: &mut RnsPoly) -> RingResult<()> {
        self.check_divisible()?;
        let offset = self.group_half_offset(0)?;
        self.divide_inplace(a, Some(&offset))
    }

    /// Division by the top modulus with the rounding offset of the group of the
    /// top `aux_level + 1` moduli. Bit-identical to
    /// [`RingView::div_round_by_last_modulus`] when `aux_level == 0`.
    pub fn div_round_by_last_modulus_aux(
        &self,
        a: &RnsPoly,
        out: &mut RnsPoly,
        aux_level: usize,
    ) -> RingResult<()> {
        self.check_divisible()?;
        let offset = self.group_half_offset(aux_level)?;
        self.divide_into(a, out, Some(&offset))
    }

    pub fn div_round_by_last_modulus_aux_inplace(&self, a: &mut RnsPoly, aux_level: usize) -> RingResult<()> {
        self.check_divisible()?;
        let offset = self.group_half_offset(aux_level)?;
        self.divide_inplace(a, Some(&offset))
    }

    /// `out = floor(a / q_level)` at level `level - 1`.
    pub fn div_floor_by_last_modulus(&self, a: &RnsPoly, out: &mut RnsPoly) -> RingResult<()> {
        self.divide_into(a, out, None)
    }

    pub fn div_floor_by_last_modulus_inplace(&self, a: &mut RnsPoly) -> RingResult<()> {
        self.divide_inplace(a, None)
    }

    // ─── Multi-level division ────────────────────────────────────────────────

    fn check_removal(&self, k: usize) -> RingResult<()> {
        if k > self.level() {
            return Err(RingError::LevelTooLow {
                level: self.level(),
                required: k,
            });
        }
        Ok(())
    }

    /// Removes the top `k` moduli one at a time, rounding at each step.
    pub fn div_round_by_last_moduli(&self, k: usize, a: &mut RnsPoly) -> RingResult<()> {
        self.check_removal(k)?;
        for step in 0..k {
            self.at_level(self.level() - step)?
                .div_round_by_last_modulus_inplace(a)?;
        }
        Ok(())
    }

    /// Removes the top `k` moduli with floor divisions: `floor(a / (q_l...q_{l-k+1}))`.
    pub fn div_floor_by_last_moduli(&self, k: usize, a: &mut RnsPoly) -> RingResult<()> {
        self.check_removal(k)?;
        for step in 0..k {
            self.at_level(self.level() - step)?
                .div_floor_by_last_modulus_inplace(a)?;
        }
        Ok(())
    }

    /// Fused removal of the top `k` moduli, identical to `k` successive
    /// [`RingView::div_round_by_last_modulus_aux_inplace`] calls with
    /// `aux_level == 0`.
    ///
    /// Arrays are indexed by removal step `j` (`j = 0` is the top modulus):
    /// - `moduli[j] = q_{level - j}`,
    /// - `reduction_constants[j]` its Montgomery constant,
    /// - `scalar_constants[i][j] = mform(q_{level - j}^{-1} mod q_i)` for every
    ///   row `i < level - j` (entries for other rows are ignored).
    pub fn div_round_by_last_moduli_kernel_opt(
        &self,
        a: &mut RnsPoly,
        k: usize,
        moduli: &[u64],
        reduction_constants: &[u64],
        scalar_constants: &[Vec<u64>],
    ) -> RingResult<()> {
        self.check_input(a)?;
        let level = self.level();
        if k == 0 || k > level {
            return Err(RingError::LevelTooLow {
                level,
                required: k.max(1),
            });
        }
        if moduli.len() != k || reduction_constants.len() != k {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "expected {k} removed moduli and reduction constants, got {} and {}",
                    moduli.len(),
                    reduction_constants.len()
                ),
            });
        }
        if scalar_constants.len() != level || scalar_constants.iter().any(|row| row.len() != k) {
            return Err(RingError::InvalidConfiguration {
                reason: format!("scalar constants must form a {level} x {k} table"),
            });
        }

        let mut removed = Vec::with_capacity(k);
        for (j, (&value, &constant)) in moduli.iter().zip(reduction_constants).enumerate() {
            let modulus = Modulus::from_parts(value, constant)
                .filter(|m| m.value() == self.moduli()[level - j].value())
                .ok_or_else(|| RingError::InvalidConfiguration {
                    reason: format!("removed modulus {j} does not match the chain"),
                })?;
            removed.push(modulus);
        }

        let n = self.degree();
        a.resize(level)?;
        for (j, q_top) in removed.iter().enumerate() {
            let top_index = level - j;
            let half = (q_top.value() - 1) / 2;
            let (low, top) = a.split_at_row_mut(top_index);
            let shifted: Vec<u64> = top.iter().map(|&x| q_top.add(x, half)).collect();
            low.par_chunks_exact_mut(n)
                .enumerate()
                .for_each(|(i, row)| {
                    let qi = if i <= level - k {
                        &self.moduli()[i]
                    } else {
                        &removed[level - i]
                    };
                    let inv = scalar_constants[i][j];
                    let h = qi.reduce(half);
                    for (x, &t) in row.iter_mut().zip(&shifted) {
                        let lifted = qi.add(*x, h);
                        *x = qi.mred(qi.sub(lifted, qi.reduce(t)), inv);
                    }
                });
        }
        a.resize(level - k)
    }
}

/// Precomputed arrays for [`RingView::div_round_by_last_moduli_kernel_opt`],
/// borrowed from the ring's own rescale table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescaleKernelConstants {
    pub moduli: Vec<u64>,
    pub reduction_constants: Vec<u64>,
    pub scalar_constants: Vec<Vec<u64>>,
}

impl RescaleKernelConstants {
    pub fn new(view: &RingView<'_>, k: usize) -> RingResult<Self> {
        let level = view.level();
        if k == 0 || k > level {
            return Err(RingError::LevelTooLow {
                level,
                required: k.max(1),
            });
        }
        let ring = view.ring();
        let removed: Vec<&Modulus> = (0..k).map(|j| &view.moduli()[level - j]).collect();
        let mut scalar_constants = vec![vec![0u64; k]; level];
        for j in 0..k {
            let table = ring.rescale_constants(level - j)?;
            for (i, &c) in table.iter().enumerate() {
                scalar_constants[i][j] = c;
            }
        }
        Ok(Self {
            moduli: removed.iter().map(|m| m.value()).collect(),
            reduction_constants: removed.iter().map(|m| m.mred_constant()).collect(),
            scalar_constants,
        })
    }

    /// Runs the fused kernel with these constants.
    pub fn apply(&self, view: &RingView<'_>, a: &mut RnsPoly) -> RingResult<()> {
        view.div_round_by_last_moduli_kernel_opt(
            a,
            self.moduli.len(),
            &self.moduli,
            &self.reduction_constants,
            &self.scalar_constants,
        )
    }
}
