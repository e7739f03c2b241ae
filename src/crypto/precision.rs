//! Precision statistics between expected and decoded slot values, in bits.

use num_complex::Complex64;

/// Errors below this are reported as this many bits.
const MAX_PRECISION_BITS: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionStats {
    /// `-log2` of the largest real-part error.
    pub min_real: f64,
    pub min_imag: f64,
    /// `-log2` of the mean real-part error.
    pub avg_real: f64,
    pub avg_imag: f64,
    pub max_error: f64,
}

fn bits(error: f64) -> f64 {
    if error <= 0.0 {
        MAX_PRECISION_BITS
    } else {
        (-error.log2()).min(MAX_PRECISION_BITS)
    }
}

impl PrecisionStats {
    /// Compares slot by slot over the shorter of the two vectors.
    pub fn new(want: &[Complex64], have: &[Complex64]) -> Self {
        let len = want.len().min(have.len()).max(1);
        let errors: Vec<(f64, f64)> = want
            .iter()
            .zip(have)
            .map(|(w, h)| ((w.re - h.re).abs(), (w.im - h.im).abs()))
            .collect();
        let max_re = errors.iter().map(|e| e.0).fold(0.0, f64::max);
        let max_im = errors.iter().map(|e| e.1).fold(0.0, f64::max);
        let mean_re = errors.iter().map(|e| e.0).sum::<f64>() / len as f64;
        let mean_im = errors.iter().map(|e| e.1).sum::<f64>() / len as f64;
        Self {
            min_real: bits(max_re),
            min_imag: bits(max_im),
            avg_real: bits(mean_re),
            avg_imag: bits(mean_im),
            max_error: max_re.max(max_im),
        }
    }

    /// Smallest of the two average precisions.
    pub fn avg(&self) -> f64 {
        self.avg_real.min(self.avg_imag)
    }
}

/// Minimum average precision a bootstrapped ciphertext must retain:
/// `log2(scale) - (log_n + 2)` clamped at zero, minus ten bits.
pub fn precision_floor(log_scale: f64, log_n: u32) -> f64 {
    (log_scale - f64::from(log_n + 2)).max(0.0) - 10.0
}
