//! The bootstrapping pipeline.
//!
//! A level-0 ciphertext goes through
//!
//! 1. scale-down: an integer product bringing the scale to `q_0 / 2^r`,
//! 2. ModRaise: exact lift of both polynomials onto the full chain,
//! 3. CoeffsToSlots: the inverse butterflies, one level per factor, and a
//!    conjugate split into the low and high coefficient halves,
//! 4. Mod1: removal of the `q_0` multiples on each half,
//! 5. SlotsToCoeffs: the forward butterflies, the last factor landing on the
//!    requested scale.
//!
//! The refreshed ciphertext sits at the residual chain's top level and
//! decrypts under the residual secret key.

use std::borrow::Cow;
use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use super::dft;
use super::errors::{BootstrapError, BootstrapResult, InStage, Stage};
use super::mod1::Mod1Evaluator;
use super::parameters::BootstrapParameters;
use crate::crypto::{
    Ciphertext, CkksError, CkksResult, Diagonals, Evaluator, LinearTransform,
    LinearTransformEvaluator,
};
use crate::encoding::CkksEncoder;
use crate::keys::EvaluationKeySet;
use crate::rings::{BasisConverter, RnsPoly};

#[derive(Debug)]
pub struct Bootstrapper {
    params: Arc<BootstrapParameters>,
    evaluator: Evaluator,
    encoder: CkksEncoder,
    mod_raise: BasisConverter,
    coeffs_to_slots: Vec<LinearTransform>,
    mod1: Mod1Evaluator,
    /// Every SlotsToCoeffs factor but the last.
    slots_to_coeffs: Vec<LinearTransform>,
    slots_to_coeffs_last: LinearTransform,
    /// Last factor onto half the default scale, for the conjugate-invariant
    /// split which doubles it back.
    slots_to_coeffs_half: LinearTransform,
    /// Plain diagonals of the last factor, re-encoded when the input scale
    /// is off the default.
    last_diagonals: Diagonals,
    /// Scale of a default-scale input after the scale-down product.
    nominal_scale: f64,
}

impl Bootstrapper {
    /// Encodes the stage transforms and checks that `keys` cover every
    /// rotation they need.
    pub fn new(params: Arc<BootstrapParameters>, keys: Arc<EvaluationKeySet>) -> BootstrapResult<Self> {
        let btp = params.bootstrapping().clone();
        let residual = params.residual();
        let levels = params.levels();
        let log_slots = btp.max_log_slots();

        if keys.relinearization_key().is_none() {
            return Err(CkksError::MissingRelinearizationKey.into());
        }
        for galois_element in super::keys::bootstrapping_galois_elements(&params) {
            if keys.galois_key(galois_element).is_none() {
                return Err(CkksError::MissingGaloisKey { galois_element }.into());
            }
        }

        let moduli = btp.ring_q().moduli();
        let mod_raise = BasisConverter::new(&moduli[..1], moduli)?;
        let q0 = moduli[0].value() as f64;

        let encoder = CkksEncoder::new(btp.ring_q().clone());
        let mod1 = Mod1Evaluator::new(*params.mod1()).in_stage(Stage::Mod1)?;

        let cts_scales = params.coeffs_to_slots_log_scales();
        let cts_factors =
            dft::coeffs_to_slots_factors(log_slots, cts_scales.len(), params.mod1().interval);
        let mut input_scale = q0;
        let mut coeffs_to_slots = Vec::with_capacity(cts_factors.len());
        for (i, diagonals) in cts_factors.iter().enumerate() {
            let output_scale = if i + 1 == cts_factors.len() {
                params.mod1().scale()
            } else {
                2f64.powi(cts_scales[i] as i32)
            };
            let transform = LinearTransform::new(
                &encoder,
                diagonals,
                levels.coeffs_to_slots - i,
                input_scale,
                output_scale,
            )
            .in_stage(Stage::CoeffsToSlots)?;
            coeffs_to_slots.push(transform);
            input_scale = output_scale;
        }

        let default_scale = residual.default_scale();
        let nominal_scale = default_scale * scale_down_factor(q0, &params, default_scale).max(1.0);
        let stc_scales = params.slots_to_coeffs_log_scales();
        let stc_factor = q0 / (2.0 * PI * nominal_scale);
        let mut stc_factors = dft::slots_to_coeffs_factors(log_slots, stc_scales.len(), stc_factor);
        let last_diagonals = stc_factors.pop().ok_or_else(|| BootstrapError::InvalidConfiguration {
            reason: "SlotsToCoeffs needs at least one level".to_string(),
        })?;
        let mut input_scale = mod1.output_scale(btp.ring_q(), levels.mod1);
        let mut slots_to_coeffs = Vec::with_capacity(stc_factors.len());
        for (i, diagonals) in stc_factors.iter().enumerate() {
            let output_scale = 2f64.powi(stc_scales[i] as i32);
            let transform = LinearTransform::new(
                &encoder,
                diagonals,
                levels.slots_to_coeffs - i,
                input_scale,
                output_scale,
            )
            .in_stage(Stage::SlotsToCoeffs)?;
            slots_to_coeffs.push(transform);
            input_scale = output_scale;
        }
        let last_level = levels.output + 1;
        let slots_to_coeffs_last =
            LinearTransform::new(&encoder, &last_diagonals, last_level, input_scale, default_scale)
                .in_stage(Stage::SlotsToCoeffs)?;
        let slots_to_coeffs_half = LinearTransform::new(
            &encoder,
            &last_diagonals,
            last_level,
            input_scale,
            default_scale / 2.0,
        )
        .in_stage(Stage::SlotsToCoeffs)?;

        info!(
            log_n = btp.log_n(),
            log_slots = params.log_slots(),
            depth = params.depth(),
            cts_levels = coeffs_to_slots.len(),
            stc_levels = slots_to_coeffs.len() + 1,
            cts_diagonals = coeffs_to_slots.iter().map(LinearTransform::diagonal_count).sum::<usize>(),
            stc_diagonals = slots_to_coeffs
                .iter()
                .chain([&slots_to_coeffs_last])
                .map(LinearTransform::diagonal_count)
                .sum::<usize>(),
            "built bootstrapping evaluator"
        );

        Ok(Self {
            evaluator: Evaluator::new(btp, keys),
            params,
            encoder,
            mod_raise,
            coeffs_to_slots,
            mod1,
            slots_to_coeffs,
            slots_to_coeffs_last,
            slots_to_coeffs_half,
            last_diagonals,
            nominal_scale,
        })
    }

    pub fn params(&self) -> &Arc<BootstrapParameters> {
        &self.params
    }

    /// Evaluator over the bootstrapping chain.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Refreshes a level-0 ciphertext to the residual top level at the
    /// default scale.
    #[instrument(skip_all, fields(log_slots = ct.log_slots))]
    pub fn bootstrap(&self, ct: &Ciphertext) -> BootstrapResult<Ciphertext> {
        self.refresh(ct, self.params.residual().default_scale())
    }

    /// Bootstraps every ciphertext in parallel; results keep the input order.
    pub fn bootstrap_many(&self, cts: &[Ciphertext]) -> BootstrapResult<Vec<Ciphertext>> {
        cts.par_iter().map(|ct| self.bootstrap(ct)).collect()
    }

    /// Refreshes two real-valued ciphertexts with a single pipeline run.
    ///
    /// `left + i * right` is bootstrapped onto half the default scale; the
    /// real and imaginary parts are then split with one conjugation and each
    /// carries the default scale again.
    #[instrument(skip_all)]
    pub fn evaluate_conjugate_invariant(
        &self,
        left: &Ciphertext,
        right: &Ciphertext,
    ) -> BootstrapResult<(Ciphertext, Ciphertext)> {
        for ct in [left, right] {
            if ct.level() != 0 {
                return Err(BootstrapError::InvalidInputLevel { level: ct.level() });
            }
        }
        let eval = &self.evaluator;
        let packed = eval
            .mul_by_i(right)
            .and_then(|imag| eval.add(left, &imag))
            .in_stage(Stage::ConjugateSplit)?;

        let refreshed = self.refresh(&packed, self.params.residual().default_scale() / 2.0)?;
        let split = || -> CkksResult<(Ciphertext, Ciphertext)> {
            let conj = eval.conjugate(&refreshed)?;
            let mut real = eval.add(&refreshed, &conj)?;
            let mut imag = eval.neg(&eval.mul_by_i(&eval.sub(&refreshed, &conj)?)?)?;
            real.scale = 2.0 * refreshed.scale;
            imag.scale = 2.0 * refreshed.scale;
            Ok((real, imag))
        };
        split().in_stage(Stage::ConjugateSplit)
    }

    fn refresh(&self, ct: &Ciphertext, target_scale: f64) -> BootstrapResult<Ciphertext> {
        let levels = self.params.levels();
        if ct.level() != 0 {
            return Err(BootstrapError::InvalidInputLevel { level: ct.level() });
        }
        if ct.log_slots > self.params.log_slots() {
            return Err(BootstrapError::IncompatibleSlotCount {
                log_slots: ct.log_slots,
                max_log_slots: self.params.log_slots(),
            });
        }
        let default_scale = self.params.residual().default_scale();
        if ct.scale != default_scale {
            warn!(
                scale = ct.scale,
                default_scale, "bootstrapping input is not at the default scale"
            );
        }

        let scaled = self.scale_down(ct)?;
        debug!(stage = %Stage::ScaleDown, level = scaled.level(), scale = scaled.scale, "stage complete");

        let raised = self.mod_raise(&scaled)?;
        debug!(stage = %Stage::ModRaise, level = raised.level(), scale = raised.scale, "stage complete");

        let (real, imag) = self.coeffs_to_slots(&raised)?;
        check_level(Stage::CoeffsToSlots, &real, levels.mod1)?;
        debug!(stage = %Stage::CoeffsToSlots, level = real.level(), scale = real.scale, "stage complete");

        let eval = &self.evaluator;
        let real = self.mod1.evaluate(eval, &real).in_stage(Stage::Mod1)?;
        let imag = self.mod1.evaluate(eval, &imag).in_stage(Stage::Mod1)?;
        check_level(Stage::Mod1, &real, levels.slots_to_coeffs)?;
        debug!(stage = %Stage::Mod1, level = real.level(), scale = real.scale, "stage complete");

        let mut out =
            self.slots_to_coeffs(&real, &imag, target_scale, scaled.scale / self.nominal_scale)?;
        check_level(Stage::SlotsToCoeffs, &out, levels.output)?;
        out.log_slots = ct.log_slots;
        debug!(stage = %Stage::SlotsToCoeffs, level = out.level(), scale = out.scale, "stage complete");
        Ok(out)
    }

    /// Multiplies by `c = round(q_0 / (2^r * scale))` so that the message
    /// occupies a `2^-r` fraction of `q_0`.
    fn scale_down(&self, ct: &Ciphertext) -> BootstrapResult<Ciphertext> {
        let factor = scale_down_factor(self.q0(), &self.params, ct.scale);
        if factor < 1.0 {
            return Err(BootstrapError::StageFailure {
                stage: Stage::ScaleDown,
                source: CkksError::InvalidParameter {
                    message: format!(
                        "scale {} leaves no room for message ratio 2^{}",
                        ct.scale,
                        self.params.log_message_ratio()
                    ),
                },
            });
        }
        let mut out = self
            .evaluator
            .mul_int(ct, factor as i128)
            .in_stage(Stage::ScaleDown)?;
        out.scale = ct.scale * factor;
        Ok(out)
    }

    /// Lifts both polynomials from `q_0` onto the full chain through their
    /// centered representatives; the plaintext becomes `m + q_0 I`.
    fn mod_raise(&self, ct: &Ciphertext) -> BootstrapResult<Ciphertext> {
        let degree = self.evaluator.params().degree();
        let top = self.params.levels().coeffs_to_slots;
        let lift = |poly: &RnsPoly| -> BootstrapResult<RnsPoly> {
            let mut raised = RnsPoly::zero(degree, top);
            let mut target: Vec<&mut [u64]> = raised.rows_mut().collect();
            self.mod_raise.convert_exact(&[poly.row(0)], &mut target)?;
            Ok(raised)
        };
        Ok(Ciphertext {
            c0: lift(&ct.c0)?,
            c1: lift(&ct.c1)?,
            scale: self.q0(),
            log_slots: ct.log_slots,
        })
    }

    /// CoeffsToSlots factors followed by the conjugate split into
    /// `w_lo / K` and `w_hi / K`, both in bit-reversed slot order.
    fn coeffs_to_slots(&self, ct: &Ciphertext) -> BootstrapResult<(Ciphertext, Ciphertext)> {
        let eval = &self.evaluator;
        let run = || -> CkksResult<(Ciphertext, Ciphertext)> {
            let mut v = Cow::Borrowed(ct);
            for transform in &self.coeffs_to_slots {
                v = Cow::Owned(eval.evaluate_linear_transform(&v, transform)?);
            }
            let conj = eval.conjugate(&v)?;
            let real = eval.add(&v, &conj)?;
            let imag = eval.neg(&eval.mul_by_i(&eval.sub(&v, &conj)?)?)?;
            Ok((real, imag))
        };
        run().in_stage(Stage::CoeffsToSlots)
    }

    /// Recombines `real + i * imag` and runs the SlotsToCoeffs factors. The
    /// message comes out multiplied by `ratio`, the input scale over the
    /// default one, so the last factor lands on `target_scale / ratio` and
    /// the result is relabelled with `target_scale`.
    fn slots_to_coeffs(
        &self,
        real: &Ciphertext,
        imag: &Ciphertext,
        target_scale: f64,
        ratio: f64,
    ) -> BootstrapResult<Ciphertext> {
        let eval = &self.evaluator;
        let last = self
            .last_slots_to_coeffs(target_scale, ratio)
            .in_stage(Stage::SlotsToCoeffs)?;
        let run = || -> CkksResult<Ciphertext> {
            let mut v = eval.add(real, &eval.mul_by_i(imag)?)?;
            for transform in self.slots_to_coeffs.iter().chain([&*last]) {
                v = eval.evaluate_linear_transform(&v, transform)?;
            }
            v.scale = target_scale;
            Ok(v)
        };
        run().in_stage(Stage::SlotsToCoeffs)
    }

    fn last_slots_to_coeffs(&self, target_scale: f64, ratio: f64) -> CkksResult<Cow<'_, LinearTransform>> {
        let cached = &self.slots_to_coeffs_last;
        if ratio == 1.0 {
            if target_scale == cached.output_scale() {
                return Ok(Cow::Borrowed(cached));
            }
            if target_scale == self.slots_to_coeffs_half.output_scale() {
                return Ok(Cow::Borrowed(&self.slots_to_coeffs_half));
            }
        }
        debug!(ratio, target_scale, "re-encoding the last SlotsToCoeffs factor");
        LinearTransform::new(
            &self.encoder,
            &self.last_diagonals,
            cached.level(),
            cached.input_scale(),
            target_scale / ratio,
        )
        .map(Cow::Owned)
    }

    fn q0(&self) -> f64 {
        self.params.residual().ring_q().moduli()[0].value() as f64
    }
}

/// `round(q_0 / (2^r * scale))`.
fn scale_down_factor(q0: f64, params: &BootstrapParameters, scale: f64) -> f64 {
    (q0 / (params.message_ratio() * scale)).round()
}

fn check_level(stage: Stage, ct: &Ciphertext, expected: usize) -> BootstrapResult<()> {
    if ct.level() != expected {
        return Err(BootstrapError::StageFailure {
            stage,
            source: CkksError::LevelMismatch {
                expected,
                actual: ct.level(),
            },
        });
    }
    Ok(())
}
