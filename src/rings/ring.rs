use super::{
    errors::{RingError, RingResult},
    ntt::NttTable,
    poly::RnsPoly,
};
use crate::math::{
    Modulus, is_prime,
    modular::MAX_MODULUS_BITS,
};
use std::collections::HashSet;

/// An immutable modulus chain `q_0..q_L` over a fixed ring degree.
///
/// Construction precomputes every table the kernels need:
/// - Montgomery constants per modulus,
/// - NTT twiddles per modulus,
/// - `rescale_constants[l][i] = mform(q_{l+1}^{-1} mod q_i)` for `i <= l`,
///   the scalars used when dividing by the modulus at level `l + 1`.
#[derive(Debug, Clone)]
pub struct Ring {
    degree: usize,
    moduli: Vec<Modulus>,
    ntt_tables: Vec<NttTable>,
    rescale_constants: Vec<Vec<u64>>,
}

impl Ring {
    pub fn new(degree: usize, moduli: &[u64]) -> RingResult<Self> {
        if degree < 2 || !degree.is_power_of_two() {
            return Err(RingError::InvalidDegree { degree });
        }
        if moduli.is_empty() {
            return Err(RingError::EmptyChain);
        }

        let mut seen = HashSet::with_capacity(moduli.len());
        let mut chain = Vec::with_capacity(moduli.len());
        let mut ntt_tables = Vec::with_capacity(moduli.len());
        for &q in moduli {
            validate_modulus(q, degree)?;
            if !seen.insert(q) {
                return Err(RingError::InvalidModulus {
                    modulus: q,
                    reason: "duplicate modulus in chain",
                });
            }
            let modulus = Modulus::new(q);
            let table = NttTable::new(modulus, degree).ok_or(RingError::InvalidModulus {
                modulus: q,
                reason: "no primitive 2N-th root of unity",
            })?;
            chain.push(modulus);
            ntt_tables.push(table);
        }

        let rescale_constants = (1..chain.len())
            .map(|top| {
                let removed = chain[top].value();
                chain[..top]
                    .iter()
                    .map(|qi| {
                        let inv = qi.inv(removed).ok_or(RingError::InvalidModulus {
                            modulus: removed,
                            reason: "moduli are not pairwise coprime",
                        })?;
                        Ok(qi.mform(inv))
                    })
                    .collect::<RingResult<Vec<u64>>>()
            })
            .collect::<RingResult<Vec<_>>>()?;

        Ok(Self {
            degree,
            moduli: chain,
            ntt_tables,
            rescale_constants,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn log_degree(&self) -> u32 {
        self.degree.trailing_zeros()
    }

    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    pub fn moduli(&self) -> &[Modulus] {
        &self.moduli
    }

    /// Modulus values as plain words.
    pub fn modulus_values(&self) -> Vec<u64> {
        self.moduli.iter().map(Modulus::value).collect()
    }

    pub fn at_level(&self, level: usize) -> RingResult<RingView<'_>> {
        if level > self.max_level() {
            return Err(RingError::LevelOutOfRange {
                level,
                max_level: self.max_level(),
            });
        }
        Ok(RingView { ring: self, level })
    }

    /// View at the maximum level.
    pub fn view(&self) -> RingView<'_> {
        RingView {
            ring: self,
            level: self.max_level(),
        }
    }

    /// Row `removed_level - 1` of the rescale table: `mform(q_removed^{-1})`
    /// modulo each `q_i` with `i < removed_level`.
    pub fn rescale_constants(&self, removed_level: usize) -> RingResult<&[u64]> {
        if removed_level == 0 {
            return Err(RingError::LevelTooLow {
                level: 0,
                required: 1,
            });
        }
        self.rescale_constants
            .get(removed_level - 1)
            .map(Vec::as_slice)
            .ok_or(RingError::LevelOutOfRange {
                level: removed_level,
                max_level: self.max_level(),
            })
    }

    /// `log2` of the product of the moduli up to `level`.
    pub fn log_modulus(&self, level: usize) -> f64 {
        self.moduli[..=level.min(self.max_level())]
            .iter()
            .map(|q| (q.value() as f64).log2())
            .sum()
    }
}

fn validate_modulus(q: u64, degree: usize) -> RingResult<()> {
    if q >= 1u64 << MAX_MODULUS_BITS {
        return Err(RingError::InvalidModulus {
            modulus: q,
            reason: "modulus exceeds 61 bits",
        });
    }
    if !is_prime(q) {
        return Err(RingError::InvalidModulus {
            modulus: q,
            reason: "modulus is not prime",
        });
    }
    if q % (2 * degree as u64) != 1 {
        return Err(RingError::InvalidModulus {
            modulus: q,
            reason: "modulus is not congruent to 1 modulo 2N",
        });
    }
    Ok(())
}

/// A ring restricted to the moduli `q_0..=q_level`.
///
/// Views are plain `(ring, level)` pairs: cheap to copy, never mutated, and
/// independent of each other.
#[derive(Debug, Clone, Copy)]
pub struct RingView<'a> {
    ring: &'a Ring,
    level: usize,
}

impl<'a> RingView<'a> {
    pub fn ring(&self) -> &'a Ring {
        self.ring
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn degree(&self) -> usize {
        self.ring.degree
    }

    /// Moduli `q_0..=q_level`.
    pub fn moduli(&self) -> &'a [Modulus] {
        &self.ring.moduli[..=self.level]
    }

    /// The modulus removed by a rescale at this level.
    pub fn last_modulus(&self) -> &'a Modulus {
        &self.ring.moduli[self.level]
    }

    /// Another view over the same chain.
    pub fn at_level(&self, level: usize) -> RingResult<RingView<'a>> {
        self.ring.at_level(level)
    }

    pub fn new_poly(&self) -> RnsPoly {
        RnsPoly::zero(self.degree(), self.level)
    }

    pub(crate) fn ntt_table(&self, index: usize) -> &'a NttTable {
        &self.ring.ntt_tables[index]
    }

    /// Fails unless `poly` reaches at least this view's level.
    pub(crate) fn check_input(&self, poly: &RnsPoly) -> RingResult<()> {
        if poly.degree() != self.degree() {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "polynomial degree {} does not match ring degree {}",
                    poly.degree(),
                    self.degree()
                ),
            });
        }
        if poly.level() < self.level {
            return Err(RingError::LevelMismatch {
                expected: self.level,
                actual: poly.level(),
            });
        }
        Ok(())
    }
}
