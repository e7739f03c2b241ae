//! Bootstrapping parameter resolution.
//!
//! A [`ParametersLiteral`] leaves every field optional. Resolving it against
//! the residual parameter set fixes the slot count, the message ratio, the
//! Mod1 approximation and the extended modulus chain. The bootstrapping
//! chain keeps the residual Q primes at the bottom and stacks, from bottom to
//! top, the SlotsToCoeffs primes, the Mod1 primes and the CoeffsToSlots
//! primes. Each log-scale list is in evaluation order, so its first entry is
//! the highest prime of its stage.

use std::sync::Arc;

use tracing::info;

use super::errors::{BootstrapError, BootstrapResult};
use crate::crypto::{self, Parameters};
use crate::math::PrimeGenerator;

/// Bit sizes accepted for the primes of the extended chain.
const PRIME_BITS_RANGE: std::ops::RangeInclusive<u32> = 20..=61;

const DEFAULT_LOG_P: [u32; 2] = [61, 61];
const DEFAULT_COEFFS_TO_SLOTS_LOG_SCALES: [u32; 4] = [56; 4];
const DEFAULT_SLOTS_TO_COEFFS_LOG_SCALES: [u32; 3] = [60; 3];
const DEFAULT_EVAL_MOD_LOG_SCALE: u32 = 60;
const DEFAULT_MOD1_INTERVAL: u32 = 16;
const DEFAULT_MOD1_DEGREE: usize = 30;
const DEFAULT_DOUBLE_ANGLE: u32 = 3;
const DEFAULT_MAX_LOG_QP: f64 = 1550.0;

/// Optional bootstrapping settings; `None` takes the default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParametersLiteral {
    /// Must equal the residual `log_n`; ring switching is not supported.
    pub log_n: Option<u32>,
    pub log_slots: Option<usize>,
    pub log_p: Option<Vec<u32>>,
    /// One prime per CoeffsToSlots level, at most `log_n - 1` of them.
    pub coeffs_to_slots_log_scales: Option<Vec<u32>>,
    pub slots_to_coeffs_log_scales: Option<Vec<u32>>,
    pub eval_mod_log_scale: Option<u32>,
    /// `K`: the Mod1 input is known to lie in `[-K, K]` before normalization.
    pub mod1_interval: Option<u32>,
    pub mod1_degree: Option<usize>,
    /// Number of double-angle iterations after the polynomial.
    pub double_angle: Option<u32>,
    pub log_message_ratio: Option<u32>,
    pub max_log_qp: Option<f64>,
}

impl ParametersLiteral {
    pub fn with_log_n(mut self, log_n: u32) -> Self {
        self.log_n = Some(log_n);
        self
    }

    pub fn with_log_slots(mut self, log_slots: usize) -> Self {
        self.log_slots = Some(log_slots);
        self
    }

    pub fn with_log_p(mut self, log_p: Vec<u32>) -> Self {
        self.log_p = Some(log_p);
        self
    }

    pub fn with_coeffs_to_slots_log_scales(mut self, log_scales: Vec<u32>) -> Self {
        self.coeffs_to_slots_log_scales = Some(log_scales);
        self
    }

    pub fn with_slots_to_coeffs_log_scales(mut self, log_scales: Vec<u32>) -> Self {
        self.slots_to_coeffs_log_scales = Some(log_scales);
        self
    }

    pub fn with_eval_mod_log_scale(mut self, log_scale: u32) -> Self {
        self.eval_mod_log_scale = Some(log_scale);
        self
    }

    pub fn with_mod1_interval(mut self, interval: u32) -> Self {
        self.mod1_interval = Some(interval);
        self
    }

    pub fn with_mod1_degree(mut self, degree: usize) -> Self {
        self.mod1_degree = Some(degree);
        self
    }

    pub fn with_double_angle(mut self, double_angle: u32) -> Self {
        self.double_angle = Some(double_angle);
        self
    }

    pub fn with_log_message_ratio(mut self, log_message_ratio: u32) -> Self {
        self.log_message_ratio = Some(log_message_ratio);
        self
    }

    pub fn with_max_log_qp(mut self, max_log_qp: f64) -> Self {
        self.max_log_qp = Some(max_log_qp);
        self
    }
}

/// Settings of the modular reduction stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mod1Parameters {
    /// `K` in `[-K, K]`.
    pub interval: u32,
    pub degree: usize,
    pub double_angle: u32,
    pub log_scale: u32,
}

impl Mod1Parameters {
    /// Levels consumed by the polynomial and the double-angle iterations.
    pub fn depth(&self) -> usize {
        let poly = if self.degree <= 1 {
            1
        } else {
            (usize::BITS - (self.degree - 1).leading_zeros()) as usize + 1
        };
        poly + self.double_angle as usize
    }

    pub fn scale(&self) -> f64 {
        2f64.powi(self.log_scale as i32)
    }
}

/// Levels of the bootstrapping chain each stage starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLevels {
    /// Level right after ModRaise; the first CoeffsToSlots factor runs here.
    pub coeffs_to_slots: usize,
    pub mod1: usize,
    /// Level of the first SlotsToCoeffs factor.
    pub slots_to_coeffs: usize,
    /// Level of a refreshed ciphertext.
    pub output: usize,
}

/// Resolved bootstrapping parameters over a residual parameter set.
#[derive(Debug)]
pub struct BootstrapParameters {
    residual: Arc<Parameters>,
    bootstrapping: Arc<Parameters>,
    log_slots: usize,
    log_message_ratio: u32,
    coeffs_to_slots_log_scales: Vec<u32>,
    slots_to_coeffs_log_scales: Vec<u32>,
    mod1: Mod1Parameters,
    levels: StageLevels,
}

impl BootstrapParameters {
    pub fn new(residual: Arc<Parameters>, literal: &ParametersLiteral) -> BootstrapResult<Self> {
        let log_n = literal.log_n.unwrap_or(residual.log_n());
        if log_n != residual.log_n() {
            return Err(BootstrapError::InvalidConfiguration {
                reason: format!(
                    "bootstrapping log_n {log_n} differs from residual log_n {}; ring switching is not supported",
                    residual.log_n()
                ),
            });
        }

        let max_log_slots = residual.max_log_slots();
        let log_slots = literal.log_slots.unwrap_or(max_log_slots);
        if log_slots > max_log_slots {
            return Err(BootstrapError::IncompatibleSlotCount {
                log_slots,
                max_log_slots,
            });
        }

        let log_message_ratio = literal
            .log_message_ratio
            .unwrap_or(8 + 15u32.saturating_sub(log_slots as u32));
        let log_q0 = residual.ring_q().log_modulus(0);
        let required = residual.log_default_scale() + log_message_ratio;
        if log_q0 < required as f64 {
            return Err(BootstrapError::InsufficientLevels {
                reason: "the level-0 modulus cannot hold the default scale times the message ratio"
                    .to_string(),
                required: required as usize,
                available: log_q0.floor() as usize,
            });
        }

        // The transforms always cover all N/2 slots: one butterfly per bit.
        let stages = max_log_slots;
        let cts_scales = stage_scales(
            "CoeffsToSlots",
            literal.coeffs_to_slots_log_scales.as_deref(),
            &DEFAULT_COEFFS_TO_SLOTS_LOG_SCALES,
            stages,
        )?;
        let stc_scales = stage_scales(
            "SlotsToCoeffs",
            literal.slots_to_coeffs_log_scales.as_deref(),
            &DEFAULT_SLOTS_TO_COEFFS_LOG_SCALES,
            stages,
        )?;

        let mod1 = Mod1Parameters {
            interval: literal.mod1_interval.unwrap_or(DEFAULT_MOD1_INTERVAL),
            degree: literal.mod1_degree.unwrap_or(DEFAULT_MOD1_DEGREE),
            double_angle: literal.double_angle.unwrap_or(DEFAULT_DOUBLE_ANGLE),
            log_scale: literal.eval_mod_log_scale.unwrap_or(DEFAULT_EVAL_MOD_LOG_SCALE),
        };
        if mod1.interval == 0 || mod1.degree == 0 {
            return Err(BootstrapError::InvalidConfiguration {
                reason: format!(
                    "Mod1 needs a positive interval and degree, got K = {} and degree {}",
                    mod1.interval, mod1.degree
                ),
            });
        }
        check_bits("eval-mod scale", mod1.log_scale)?;

        let log_p = literal
            .log_p
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_P.to_vec());
        if log_p.is_empty() {
            return Err(BootstrapError::InvalidConfiguration {
                reason: "the bootstrapping P chain is empty".to_string(),
            });
        }
        for &bits in &log_p {
            check_bits("P prime", bits)?;
        }

        let mod1_depth = mod1.depth();
        let mut extension: Vec<u32> = stc_scales.iter().rev().copied().collect();
        extension.extend(std::iter::repeat_n(mod1.log_scale, mod1_depth));
        extension.extend(cts_scales.iter().rev());

        let residual_q = residual.q_moduli();
        let mut generator = PrimeGenerator::new(residual.degree());
        generator.exclude(&residual_q);
        let not_enough = || BootstrapError::InvalidConfiguration {
            reason: "not enough NTT-friendly primes for the bootstrapping chain".to_string(),
        };
        let extra_q = generator.chain(&extension).ok_or_else(not_enough)?;
        let p = generator.chain(&log_p).ok_or_else(not_enough)?;
        let q: Vec<u64> = residual_q.iter().chain(&extra_q).copied().collect();

        let log_qp: f64 = q.iter().chain(&p).map(|&m| (m as f64).log2()).sum();
        let max_log_qp = literal.max_log_qp.unwrap_or(DEFAULT_MAX_LOG_QP);
        if log_qp > max_log_qp {
            return Err(BootstrapError::InsufficientLevels {
                reason: "the bootstrapping chain exceeds the modulus budget".to_string(),
                required: log_qp.ceil() as usize,
                available: max_log_qp.floor() as usize,
            });
        }

        let bootstrapping = Arc::new(Parameters::from_moduli(
            log_n,
            &q,
            &p,
            residual.hamming_weight(),
            residual.error_std_dev(),
            residual.log_default_scale(),
        )?);

        let output = residual.max_level();
        let slots_to_coeffs = output + stc_scales.len();
        let mod1_level = slots_to_coeffs + mod1_depth;
        let levels = StageLevels {
            coeffs_to_slots: mod1_level + cts_scales.len(),
            mod1: mod1_level,
            slots_to_coeffs,
            output,
        };

        info!(
            log_n,
            log_slots,
            log_message_ratio,
            cts_levels = cts_scales.len(),
            stc_levels = stc_scales.len(),
            mod1_degree = mod1.degree,
            double_angle = mod1.double_angle,
            top_level = levels.coeffs_to_slots,
            log_qp,
            "resolved bootstrapping parameters"
        );

        Ok(Self {
            residual,
            bootstrapping,
            log_slots,
            log_message_ratio,
            coeffs_to_slots_log_scales: cts_scales,
            slots_to_coeffs_log_scales: stc_scales,
            mod1,
            levels,
        })
    }

    pub fn residual(&self) -> &Arc<Parameters> {
        &self.residual
    }

    /// Parameters over the extended chain the pipeline runs on.
    pub fn bootstrapping(&self) -> &Arc<Parameters> {
        &self.bootstrapping
    }

    pub fn log_slots(&self) -> usize {
        self.log_slots
    }

    pub fn log_message_ratio(&self) -> u32 {
        self.log_message_ratio
    }

    pub fn message_ratio(&self) -> f64 {
        2f64.powi(self.log_message_ratio as i32)
    }

    /// Log-scales of the CoeffsToSlots levels in evaluation order.
    pub fn coeffs_to_slots_log_scales(&self) -> &[u32] {
        &self.coeffs_to_slots_log_scales
    }

    pub fn slots_to_coeffs_log_scales(&self) -> &[u32] {
        &self.slots_to_coeffs_log_scales
    }

    pub fn mod1(&self) -> &Mod1Parameters {
        &self.mod1
    }

    pub fn levels(&self) -> StageLevels {
        self.levels
    }

    /// Levels the pipeline consumes above the residual chain.
    pub fn depth(&self) -> usize {
        self.levels.coeffs_to_slots - self.levels.output
    }
}

/// Per-level log-scales of a slot transform over `stages` butterflies. The
/// default list is cut to the number of stages.
fn stage_scales(
    stage: &str,
    log_scales: Option<&[u32]>,
    default: &[u32],
    stages: usize,
) -> BootstrapResult<Vec<u32>> {
    let scales = match log_scales {
        None => default.iter().take(stages).copied().collect::<Vec<_>>(),
        Some(scales) => scales.to_vec(),
    };
    if scales.is_empty() || scales.len() > stages {
        return Err(BootstrapError::InvalidConfiguration {
            reason: format!(
                "{stage} takes between 1 and {stages} levels, got {}",
                scales.len()
            ),
        });
    }
    for &bits in &scales {
        check_bits(stage, bits)?;
    }
    Ok(scales)
}

fn check_bits(what: &str, bits: u32) -> BootstrapResult<()> {
    if !PRIME_BITS_RANGE.contains(&bits) {
        return Err(BootstrapError::InvalidConfiguration {
            reason: format!("{what} of {bits} bits outside {PRIME_BITS_RANGE:?}"),
        });
    }
    Ok(())
}

// ─── Test profiles ───────────────────────────────────────────────────────────

/// Parameter profiles for end-to-end runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestProfile {
    /// `N = 2^5`, sparse slots; runs in seconds.
    Short,
    /// `N = 2^16` with `2^15` slots; needs several GB of key material.
    Long,
}

impl TestProfile {
    pub fn residual_literal(self) -> crypto::ParametersLiteral {
        match self {
            TestProfile::Short => crypto::ParametersLiteral {
                log_n: 5,
                log_q: vec![55, 30, 30],
                log_p: vec![61],
                hamming_weight: 16,
                error_std_dev: 3.2,
                log_default_scale: 30,
            },
            TestProfile::Long => crypto::ParametersLiteral {
                log_n: 16,
                log_q: vec![55, 40, 40, 40, 40, 40, 40, 40, 40, 40],
                log_p: vec![61, 61, 61],
                hamming_weight: 192,
                error_std_dev: 3.2,
                log_default_scale: 40,
            },
        }
    }

    pub fn bootstrapping_literal(self) -> ParametersLiteral {
        match self {
            TestProfile::Short => ParametersLiteral::default()
                .with_log_slots(4)
                .with_coeffs_to_slots_log_scales(vec![56, 56])
                .with_slots_to_coeffs_log_scales(vec![60, 60])
                .with_mod1_degree(40),
            TestProfile::Long => ParametersLiteral::default()
                .with_log_slots(15)
                .with_log_p(vec![61, 61, 61]),
        }
    }
}
