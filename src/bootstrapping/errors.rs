use std::fmt;

use thiserror::Error;

use crate::crypto::{CkksError, CkksResult};
use crate::rings::RingError;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ScaleDown,
    ModRaise,
    CoeffsToSlots,
    Mod1,
    SlotsToCoeffs,
    /// Packing and splitting of the conjugate-invariant variant.
    ConjugateSplit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ScaleDown => "scale-down",
            Stage::ModRaise => "ModRaise",
            Stage::CoeffsToSlots => "CoeffsToSlots",
            Stage::Mod1 => "Mod1",
            Stage::SlotsToCoeffs => "SlotsToCoeffs",
            Stage::ConjugateSplit => "conjugate split",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BootstrapError {
    #[error("insufficient levels: {reason} (required {required}, available {available})")]
    InsufficientLevels {
        reason: String,
        required: usize,
        available: usize,
    },

    #[error("incompatible slot count: 2^{log_slots} slots, at most 2^{max_log_slots} supported")]
    IncompatibleSlotCount { log_slots: usize, max_log_slots: usize },

    #[error("bootstrapping input must be at level 0, got level {level}")]
    InvalidInputLevel { level: usize },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("{stage} stage failed: {source}")]
    StageFailure {
        stage: Stage,
        #[source]
        source: CkksError,
    },

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Ckks(#[from] CkksError),
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Tags collaborator errors with the stage that raised them.
pub(crate) trait InStage<T> {
    fn in_stage(self, stage: Stage) -> BootstrapResult<T>;
}

impl<T> InStage<T> for CkksResult<T> {
    fn in_stage(self, stage: Stage) -> BootstrapResult<T> {
        self.map_err(|source| BootstrapError::StageFailure { stage, source })
    }
}
