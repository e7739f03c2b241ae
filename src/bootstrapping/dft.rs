//! Factored slot-domain DFT.
//!
//! With `n = N/2` slots and `ζ_k = exp(2πi 5^k / 4n)`, a plaintext with
//! coefficients `t_j` decodes to
//!
//! ```text
//! z_k = sum_{j < n} ζ_k^j (t_j + i t_{j + n}) = (U v)_k
//! ```
//!
//! The decoding matrix splits into radix-2 butterflies,
//!
//! ```text
//! U = F_m ... F_2 F_1 P,    m = log2 n
//! ```
//!
//! where `P` is the bit-reversal permutation and `F_s` combines blocks of
//! width `2^s` with half-width `h = 2^(s-1)` and twiddles
//! `t_j = exp(2πi (5^j mod 8h) / 8h)`. Each butterfly has three diagonals
//! (`0` and `±h`).
//!
//! CoeffsToSlots evaluates `G_1 ... G_m` with `G_s = F_s^-1` and leaves its
//! output in bit-reversed order; Mod1 acts slot-wise and SlotsToCoeffs starts
//! from `F_1`, so `P` is never evaluated. Consecutive butterflies are merged
//! into one transform per level: a group of `g` stages with smallest
//! half-width `h` has its diagonals on the multiples of `h` below `2^g h` in
//! absolute value, and a chain of rotations by `±h` visits all of them.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use num_complex::Complex64;

use crate::crypto::Diagonals;

/// Stage counts per level: `stages` split into `levels` groups, the larger
/// groups first.
pub fn stage_groups(stages: usize, levels: usize) -> Vec<usize> {
    if levels == 0 {
        return Vec::new();
    }
    let base = stages / levels;
    let extra = stages % levels;
    (0..levels).map(|i| base + usize::from(i < extra)).collect()
}

/// Half-widths of the CoeffsToSlots butterflies, grouped in evaluation
/// order: the widest stage runs first.
fn coeffs_to_slots_halves(log_slots: usize, levels: usize) -> Vec<Vec<usize>> {
    let halves: Vec<usize> = (0..log_slots).rev().map(|s| 1usize << s).collect();
    group(&halves, levels)
}

/// Half-widths of the SlotsToCoeffs butterflies in evaluation order.
fn slots_to_coeffs_halves(log_slots: usize, levels: usize) -> Vec<Vec<usize>> {
    let halves: Vec<usize> = (0..log_slots).map(|s| 1usize << s).collect();
    group(&halves, levels)
}

fn group(halves: &[usize], levels: usize) -> Vec<Vec<usize>> {
    let mut rest = halves;
    stage_groups(halves.len(), levels)
        .into_iter()
        .map(|size| {
            let (head, tail) = rest.split_at(size);
            rest = tail;
            head.to_vec()
        })
        .collect()
}

/// `t_j = exp(2πi (5^j mod 8h) / 8h)` for `j < h`.
fn twiddles(half: usize) -> Vec<Complex64> {
    let period = 8 * half as u64;
    let mut power = 1u64;
    (0..half)
        .map(|_| {
            let t = Complex64::from_polar(1.0, 2.0 * PI * power as f64 / period as f64);
            power = power * 5 % period;
            t
        })
        .collect()
}

fn add_diagonal(diagonals: &mut Diagonals, offset: usize, values: Vec<Complex64>) {
    match diagonals.get_mut(&offset) {
        Some(existing) => {
            for (e, v) in existing.iter_mut().zip(values) {
                *e += v;
            }
        }
        None => {
            diagonals.insert(offset, values);
        }
    }
}

/// `F_s` with half-width `half` over `slots` slots.
pub fn butterfly(slots: usize, half: usize) -> Diagonals {
    let t = twiddles(half);
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    let mut main = vec![zero; slots];
    let mut up = vec![zero; slots];
    let mut down = vec![zero; slots];
    for p in 0..slots {
        let j = p % (2 * half);
        if j < half {
            main[p] = one;
            up[p] = t[j];
        } else {
            main[p] = -t[j - half];
            down[p] = one;
        }
    }
    let mut diagonals = Diagonals::new();
    add_diagonal(&mut diagonals, 0, main);
    add_diagonal(&mut diagonals, half % slots, up);
    add_diagonal(&mut diagonals, (slots - half) % slots, down);
    diagonals
}

/// `G_s = F_s^-1` with half-width `half` over `slots` slots.
pub fn inverse_butterfly(slots: usize, half: usize) -> Diagonals {
    let t = twiddles(half);
    let zero = Complex64::new(0.0, 0.0);
    let mut main = vec![zero; slots];
    let mut up = vec![zero; slots];
    let mut down = vec![zero; slots];
    for p in 0..slots {
        let j = p % (2 * half);
        if j < half {
            main[p] = Complex64::new(0.5, 0.0);
            up[p] = Complex64::new(0.5, 0.0);
        } else {
            let c = t[j - half].conj() * 0.5;
            down[p] = c;
            main[p] = -c;
        }
    }
    let mut diagonals = Diagonals::new();
    add_diagonal(&mut diagonals, 0, main);
    add_diagonal(&mut diagonals, half % slots, up);
    add_diagonal(&mut diagonals, (slots - half) % slots, down);
    diagonals
}

/// `after · before` in diagonal form: `before` acts on the slots first.
pub fn compose(after: &Diagonals, before: &Diagonals) -> Diagonals {
    let mut out = Diagonals::new();
    for (&ka, a) in after {
        let slots = a.len();
        for (&kb, b) in before {
            let values = (0..slots)
                .map(|p| a[p] * b[(p + ka) % slots])
                .collect();
            add_diagonal(&mut out, (ka + kb) % slots, values);
        }
    }
    out
}

fn scale_diagonals(diagonals: &mut Diagonals, factor: f64) {
    for values in diagonals.values_mut() {
        for v in values.iter_mut() {
            *v *= factor;
        }
    }
}

fn merge(slots: usize, halves: &[usize], stage: fn(usize, usize) -> Diagonals) -> Diagonals {
    halves
        .iter()
        .map(|&h| stage(slots, h))
        .reduce(|acc, next| compose(&next, &acc))
        .unwrap_or_default()
}

/// CoeffsToSlots in `levels` factors, evaluation order. Together they map
/// the slots of a raised ciphertext to `P v / (2K)`.
pub fn coeffs_to_slots_factors(log_slots: usize, levels: usize, interval: u32) -> Vec<Diagonals> {
    let slots = 1usize << log_slots;
    let mut factors: Vec<Diagonals> = coeffs_to_slots_halves(log_slots, levels)
        .iter()
        .map(|halves| merge(slots, halves, inverse_butterfly))
        .collect();
    if let Some(first) = factors.first_mut() {
        scale_diagonals(first, 1.0 / (2.0 * f64::from(interval)));
    }
    factors
}

/// SlotsToCoeffs in `levels` factors, evaluation order. Together they map
/// `P v` to `factor * U v`.
pub fn slots_to_coeffs_factors(log_slots: usize, levels: usize, factor: f64) -> Vec<Diagonals> {
    let slots = 1usize << log_slots;
    let mut factors: Vec<Diagonals> = slots_to_coeffs_halves(log_slots, levels)
        .iter()
        .map(|halves| merge(slots, halves, butterfly))
        .collect();
    if let Some(last) = factors.last_mut() {
        scale_diagonals(last, factor);
    }
    factors
}

/// Diagonal offsets of a merged group, without building its values.
fn group_offsets(slots: usize, halves: &[usize]) -> BTreeSet<usize> {
    let mut offsets = BTreeSet::from([0]);
    for &h in halves {
        offsets = offsets
            .iter()
            .flat_map(|&x| [x, (x + h) % slots, (x + slots - h) % slots])
            .collect();
    }
    offsets
}

pub fn coeffs_to_slots_offsets(log_slots: usize, levels: usize) -> Vec<BTreeSet<usize>> {
    let slots = 1usize << log_slots;
    coeffs_to_slots_halves(log_slots, levels)
        .iter()
        .map(|halves| group_offsets(slots, halves))
        .collect()
}

pub fn slots_to_coeffs_offsets(log_slots: usize, levels: usize) -> Vec<BTreeSet<usize>> {
    let slots = 1usize << log_slots;
    slots_to_coeffs_halves(log_slots, levels)
        .iter()
        .map(|halves| group_offsets(slots, halves))
        .collect()
}
