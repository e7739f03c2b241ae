//! Slot-domain linear maps evaluated with the diagonal method.
//!
//! For an `n x n` matrix `M` acting on `n = 2^log_slots` slots,
//!
//! ```text
//! M v = sum_k diag_k ⊙ rot_k(v),    diag_k[j] = M[j][(j + k) mod n]
//! ```
//!
//! Every diagonal is encoded once, at the level the transform runs at, with
//! scale `q_level * output_scale / input_scale`; one rescale then lands the
//! result on `output_scale` exactly.
//!
//! Offsets are visited as two chains, `0, k_1, k_2, ...` upwards and
//! `-k'_1, -k'_2, ...` downwards (offsets above `n/2` count as negative).
//! Each step rotates the previous ciphertext by the gap, so only the gaps
//! need Galois keys.

use std::collections::{BTreeMap, BTreeSet};

use num_complex::Complex64;

use super::evaluator::check_scales;
use super::{Ciphertext, CkksError, CkksResult, Evaluator};
use crate::encoding::CkksEncoder;
use crate::rings::{RingView, RnsPoly};

/// Diagonals of a slot-domain matrix by offset `k < n`.
pub type Diagonals = BTreeMap<usize, Vec<Complex64>>;

fn signed_offset(k: usize, slots: usize) -> i64 {
    if 2 * k <= slots {
        k as i64
    } else {
        k as i64 - slots as i64
    }
}

/// Signed offsets in chain order: `0` and the positive ones ascending, then
/// the negative ones descending.
fn rotation_chains(offsets: impl IntoIterator<Item = usize>, slots: usize) -> (Vec<i64>, Vec<i64>) {
    let (mut up, mut down): (Vec<i64>, Vec<i64>) = offsets
        .into_iter()
        .map(|k| signed_offset(k % slots, slots))
        .partition(|&k| k >= 0);
    up.sort_unstable();
    down.sort_unstable_by(|a, b| b.cmp(a));
    (up, down)
}

/// Rotation steps the chained evaluation of `offsets` needs keys for.
pub fn rotation_steps(offsets: impl IntoIterator<Item = usize>, slots: usize) -> Vec<i64> {
    let (up, down) = rotation_chains(offsets, slots);
    let mut steps = BTreeSet::new();
    for chain in [up, down] {
        let mut at = 0;
        for k in chain {
            if k != at {
                steps.insert(k - at);
                at = k;
            }
        }
    }
    steps.into_iter().collect()
}

#[derive(Debug, Clone)]
pub struct LinearTransform {
    level: usize,
    log_slots: usize,
    input_scale: f64,
    output_scale: f64,
    /// Encoded diagonals by offset, NTT form at `level`.
    diagonals: BTreeMap<usize, RnsPoly>,
}

impl LinearTransform {
    /// Encodes `diagonals`, all of the same power-of-two length.
    pub fn new(
        encoder: &CkksEncoder,
        diagonals: &Diagonals,
        level: usize,
        input_scale: f64,
        output_scale: f64,
    ) -> CkksResult<Self> {
        let n = diagonals.values().next().map_or(0, Vec::len);
        if !n.is_power_of_two()
            || diagonals.iter().any(|(&k, values)| k >= n || values.len() != n)
        {
            return Err(CkksError::InvalidParameter {
                message: format!(
                    "linear transform needs power-of-two diagonals with offsets below their length, got length {n}"
                ),
            });
        }
        let log_slots = n.trailing_zeros() as usize;
        let max_slots = encoder.ring().degree() / 2;
        if n > max_slots {
            return Err(CkksError::TooManyValues {
                got: n,
                max: max_slots,
            });
        }
        if level == 0 {
            return Err(CkksError::LevelMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let view = encoder.ring().at_level(level)?;
        let diag_scale = view.last_modulus().value() as f64 * output_scale / input_scale;

        let mut encoded = BTreeMap::new();
        for (&k, values) in diagonals {
            let coeffs = encoder.encode_coefficients(values, log_slots, diag_scale)?;
            let mut poly = view.from_signed_wide(&coeffs)?;
            view.ntt_assign(&mut poly)?;
            encoded.insert(k, poly);
        }

        Ok(Self {
            level,
            log_slots,
            input_scale,
            output_scale,
            diagonals: encoded,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn log_slots(&self) -> usize {
        self.log_slots
    }

    pub fn input_scale(&self) -> f64 {
        self.input_scale
    }

    pub fn output_scale(&self) -> f64 {
        self.output_scale
    }

    pub fn diagonal_count(&self) -> usize {
        self.diagonals.len()
    }

    /// Slot rotations the transform needs Galois keys for.
    pub fn rotations(&self) -> Vec<i64> {
        rotation_steps(self.diagonals.keys().copied(), 1 << self.log_slots)
    }
}

pub trait LinearTransformEvaluator {
    /// Evaluates `transform` on a ciphertext at the transform's level and
    /// input scale; the result is one level lower at the output scale.
    fn evaluate_linear_transform(
        &self,
        ct: &Ciphertext,
        transform: &LinearTransform,
    ) -> CkksResult<Ciphertext>;
}

fn multiply_accumulate(
    view: RingView<'_>,
    ct: &Ciphertext,
    diagonal: &RnsPoly,
    acc: &mut (RnsPoly, RnsPoly),
) -> CkksResult<()> {
    let (mut c0, mut c1) = (ct.c0.clone(), ct.c1.clone());
    view.ntt_assign(&mut c0)?;
    view.ntt_assign(&mut c1)?;
    view.mul_coeffs_then_add(&c0, diagonal, &mut acc.0)?;
    view.mul_coeffs_then_add(&c1, diagonal, &mut acc.1)?;
    Ok(())
}

impl LinearTransformEvaluator for Evaluator {
    fn evaluate_linear_transform(
        &self,
        ct: &Ciphertext,
        transform: &LinearTransform,
    ) -> CkksResult<Ciphertext> {
        if ct.level() != transform.level {
            return Err(CkksError::LevelMismatch {
                expected: transform.level,
                actual: ct.level(),
            });
        }
        check_scales(transform.input_scale, ct.scale)?;
        let view = self.params().ring_q().at_level(transform.level)?;
        let slots = 1usize << transform.log_slots;

        let mut acc = (view.new_poly(), view.new_poly());
        let (up, down) = rotation_chains(transform.diagonals.keys().copied(), slots);
        for chain in [up, down] {
            let mut current = ct.clone();
            let mut at = 0;
            for k in chain {
                if k != at {
                    current = self.rotate(&current, k - at)?;
                    at = k;
                }
                let offset = k.rem_euclid(slots as i64) as usize;
                if let Some(diagonal) = transform.diagonals.get(&offset) {
                    multiply_accumulate(view, &current, diagonal, &mut acc)?;
                }
            }
        }
        let (mut acc0, mut acc1) = acc;
        view.intt_assign(&mut acc0)?;
        view.intt_assign(&mut acc1)?;

        let product = Ciphertext {
            c0: acc0,
            c1: acc1,
            scale: ct.scale * transform.output_scale / transform.input_scale
                * view.last_modulus().value() as f64,
            log_slots: ct.log_slots,
        };
        let mut out = self.rescale(&product)?;
        out.scale = transform.output_scale;
        Ok(out)
    }
}
