//! CKKS parameter sets: the Q and P modulus chains, key distribution and the
//! default encoding scale.

use std::sync::Arc;

use tracing::info;

use super::errors::{CkksError, CkksResult};
use crate::math::PrimeGenerator;
use crate::rings::{BasisConverter, BasisExtender, Ring};

/// Smallest and largest supported `log2(N)`.
const LOG_N_RANGE: std::ops::RangeInclusive<u32> = 2..=17;

/// Bit sizes accepted for generated primes.
const PRIME_BITS_RANGE: std::ops::RangeInclusive<u32> = 20..=61;

/// Compact description of a parameter set; primes are generated on resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParametersLiteral {
    pub log_n: u32,
    /// Bit sizes of the Q chain, bottom (`q_0`) first.
    pub log_q: Vec<u32>,
    /// Bit sizes of the auxiliary P chain used by key switching.
    pub log_p: Vec<u32>,
    /// Number of non-zero secret coefficients.
    pub hamming_weight: usize,
    pub error_std_dev: f64,
    pub log_default_scale: u32,
}

impl Default for ParametersLiteral {
    fn default() -> Self {
        Self {
            log_n: 14,
            log_q: vec![55, 40, 40, 40, 40],
            log_p: vec![61],
            hamming_weight: 192,
            error_std_dev: 3.2,
            log_default_scale: 40,
        }
    }
}

/// Resolved CKKS parameters. Immutable once built and shared behind `Arc`.
#[derive(Debug)]
pub struct Parameters {
    ring_q: Arc<Ring>,
    ring_p: Arc<Ring>,
    extender: BasisExtender,
    /// `digit_converters[d][len - 1]` lifts the first `len` primes of gadget
    /// digit `d` onto `P ++ Q`.
    digit_converters: Vec<Vec<BasisConverter>>,
    hamming_weight: usize,
    error_std_dev: f64,
    log_default_scale: u32,
}

impl Parameters {
    /// Generates distinct NTT-friendly primes for the literal's bit sizes.
    pub fn new(literal: &ParametersLiteral) -> CkksResult<Self> {
        Self::check_log_n(literal.log_n)?;
        for &bits in literal.log_q.iter().chain(&literal.log_p) {
            if !PRIME_BITS_RANGE.contains(&bits) {
                return Err(CkksError::InvalidParameter {
                    message: format!("prime size {bits} bits outside {PRIME_BITS_RANGE:?}"),
                });
            }
        }
        let mut generator = PrimeGenerator::new(1 << literal.log_n);
        let not_enough = || CkksError::InvalidParameter {
            message: "not enough NTT-friendly primes of the requested sizes".to_string(),
        };
        let q = generator.chain(&literal.log_q).ok_or_else(not_enough)?;
        let p = generator.chain(&literal.log_p).ok_or_else(not_enough)?;
        Self::from_moduli(
            literal.log_n,
            &q,
            &p,
            literal.hamming_weight,
            literal.error_std_dev,
            literal.log_default_scale,
        )
    }

    /// Builds parameters over explicit Q and P primes.
    pub fn from_moduli(
        log_n: u32,
        q: &[u64],
        p: &[u64],
        hamming_weight: usize,
        error_std_dev: f64,
        log_default_scale: u32,
    ) -> CkksResult<Self> {
        Self::check_log_n(log_n)?;
        let degree = 1usize << log_n;
        if hamming_weight == 0 || hamming_weight > degree {
            return Err(CkksError::InvalidParameter {
                message: format!("hamming weight {hamming_weight} must be in 1..={degree}"),
            });
        }
        if !(error_std_dev.is_finite() && error_std_dev > 0.0) {
            return Err(CkksError::InvalidParameter {
                message: format!("error standard deviation {error_std_dev} is not valid"),
            });
        }
        if log_default_scale == 0 || log_default_scale >= 62 {
            return Err(CkksError::InvalidParameter {
                message: format!("default scale 2^{log_default_scale} is not supported"),
            });
        }
        if let Some(shared) = q.iter().find(|qi| p.contains(qi)) {
            return Err(CkksError::InvalidParameter {
                message: format!("prime {shared} appears in both Q and P"),
            });
        }

        let ring_q = Arc::new(Ring::new(degree, q)?);
        let ring_p = Arc::new(Ring::new(degree, p)?);
        let extender = BasisExtender::new(ring_q.clone(), ring_p.clone())?;

        let alpha = ring_p.moduli().len();
        let target: Vec<_> = ring_p
            .moduli()
            .iter()
            .chain(ring_q.moduli())
            .copied()
            .collect();
        let digit_converters = ring_q
            .moduli()
            .chunks(alpha)
            .map(|digit| {
                (1..=digit.len())
                    .map(|len| BasisConverter::new(&digit[..len], &target))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            log_n,
            q_primes = q.len(),
            p_primes = p.len(),
            log_qp = ring_q.log_modulus(ring_q.max_level()) + ring_p.log_modulus(ring_p.max_level()),
            log_default_scale,
            "resolved CKKS parameters"
        );

        Ok(Self {
            ring_q,
            ring_p,
            extender,
            digit_converters,
            hamming_weight,
            error_std_dev,
            log_default_scale,
        })
    }

    fn check_log_n(log_n: u32) -> CkksResult<()> {
        if !LOG_N_RANGE.contains(&log_n) {
            return Err(CkksError::InvalidParameter {
                message: format!("log_n {log_n} outside {LOG_N_RANGE:?}"),
            });
        }
        Ok(())
    }
}

impl Parameters {
    pub fn ring_q(&self) -> &Arc<Ring> {
        &self.ring_q
    }

    pub fn ring_p(&self) -> &Arc<Ring> {
        &self.ring_p
    }

    pub fn extender(&self) -> &BasisExtender {
        &self.extender
    }

    pub fn degree(&self) -> usize {
        self.ring_q.degree()
    }

    pub fn log_n(&self) -> u32 {
        self.ring_q.log_degree()
    }

    pub fn max_level(&self) -> usize {
        self.ring_q.max_level()
    }

    /// `log2(N/2)`.
    pub fn max_log_slots(&self) -> usize {
        self.log_n() as usize - 1
    }

    pub fn q_moduli(&self) -> Vec<u64> {
        self.ring_q.modulus_values()
    }

    pub fn p_moduli(&self) -> Vec<u64> {
        self.ring_p.modulus_values()
    }

    pub fn hamming_weight(&self) -> usize {
        self.hamming_weight
    }

    pub fn error_std_dev(&self) -> f64 {
        self.error_std_dev
    }

    pub fn log_default_scale(&self) -> u32 {
        self.log_default_scale
    }

    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.log_default_scale as i32)
    }

    /// `log2(Q_L * P)`.
    pub fn log_qp(&self) -> f64 {
        self.ring_q.log_modulus(self.max_level()) + self.ring_p.log_modulus(self.ring_p.max_level())
    }

    /// Number of primes per gadget digit, `|P|`.
    pub fn digit_size(&self) -> usize {
        self.ring_p.moduli().len()
    }

    /// Number of gadget digits touching levels `0..=level`.
    pub fn digit_count(&self, level: usize) -> usize {
        level / self.digit_size() + 1
    }

    pub(crate) fn digit_converter(&self, digit: usize, len: usize) -> CkksResult<&BasisConverter> {
        self.digit_converters
            .get(digit)
            .and_then(|lens| lens.get(len.wrapping_sub(1)))
            .ok_or_else(|| CkksError::InvalidParameter {
                message: format!("no gadget digit {digit} of length {len}"),
            })
    }

    /// Galois element `5^k mod 2N` rotating slots left by `k`.
    pub fn galois_element(&self, rotation: i64) -> u64 {
        let two_n = 2 * self.degree() as u64;
        let half = (self.degree() / 2) as i64;
        let mut k = rotation.rem_euclid(half) as u64;
        let (mut g, mut base) = (1u64, 5u64);
        while k > 0 {
            if k & 1 == 1 {
                g = g * base % two_n;
            }
            base = base * base % two_n;
            k >>= 1;
        }
        g
    }

    /// Galois element `2N - 1` conjugating every slot.
    pub fn conjugation_galois_element(&self) -> u64 {
        2 * self.degree() as u64 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal() -> ParametersLiteral {
        ParametersLiteral {
            log_n: 4,
            log_q: vec![50, 40, 40, 40, 40],
            log_p: vec![61, 61],
            hamming_weight: 8,
            error_std_dev: 3.2,
            log_default_scale: 40,
        }
    }

    #[test]
    fn resolves_distinct_primes_of_requested_sizes() {
        let params = Parameters::new(&literal()).unwrap();
        assert_eq!(params.max_level(), 4);
        assert_eq!(params.digit_size(), 2);
        assert_eq!(params.digit_count(4), 3);
        assert_eq!(params.digit_count(1), 1);
        for (q, bits) in params.q_moduli().iter().zip([50, 40, 40, 40, 40]) {
            assert_eq!(64 - q.leading_zeros(), bits);
        }
        let q = params.q_moduli();
        assert!(params.p_moduli().iter().all(|p| !q.contains(p)));
        assert_eq!(params.default_scale(), 2f64.powi(40));
    }

    #[test]
    fn galois_elements_follow_the_slot_order() {
        let params = Parameters::new(&literal()).unwrap();
        assert_eq!(params.galois_element(0), 1);
        assert_eq!(params.galois_element(1), 5);
        assert_eq!(params.galois_element(2), 25);
        // rotating by -1 is rotating by N/2 - 1 = 7
        assert_eq!(params.galois_element(-1), params.galois_element(7));
        assert_eq!(params.conjugation_galois_element(), 31);
    }

    #[test]
    fn rejects_invalid_literals() {
        let mut bad = literal();
        bad.log_n = 1;
        assert!(matches!(Parameters::new(&bad), Err(CkksError::InvalidParameter { .. })));

        let mut bad = literal();
        bad.log_q.push(62);
        assert!(matches!(Parameters::new(&bad), Err(CkksError::InvalidParameter { .. })));

        let mut bad = literal();
        bad.hamming_weight = 17;
        assert!(matches!(Parameters::new(&bad), Err(CkksError::InvalidParameter { .. })));

        let q = PrimeGenerator::new(16).chain(&[40, 40]).unwrap();
        assert!(matches!(
            Parameters::from_moduli(4, &q, &q[1..], 8, 3.2, 30),
            Err(CkksError::InvalidParameter { .. })
        ));
    }
}
