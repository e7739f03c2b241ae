use std::collections::BTreeSet;

use rand::Rng;
use tracing::info;

use super::dft;
use super::errors::BootstrapResult;
use super::parameters::BootstrapParameters;
use crate::crypto::rotation_steps;
use crate::keys::{EvaluationKeySet, KeyGenerator, SecretKey};

/// Galois elements the pipeline rotates or conjugates with: the rotation
/// gaps of every CoeffsToSlots and SlotsToCoeffs factor plus complex
/// conjugation.
pub fn bootstrapping_galois_elements(params: &BootstrapParameters) -> Vec<u64> {
    let btp = params.bootstrapping();
    let log_slots = btp.max_log_slots();
    let slots = 1usize << log_slots;
    let factors = dft::coeffs_to_slots_offsets(log_slots, params.coeffs_to_slots_log_scales().len())
        .into_iter()
        .chain(dft::slots_to_coeffs_offsets(
            log_slots,
            params.slots_to_coeffs_log_scales().len(),
        ));
    let steps: BTreeSet<i64> = factors
        .flat_map(|offsets| rotation_steps(offsets, slots))
        .collect();
    let mut elements: Vec<u64> = steps.into_iter().map(|k| btp.galois_element(k)).collect();
    elements.push(btp.conjugation_galois_element());
    elements.sort_unstable();
    elements.dedup();
    elements
}

/// Evaluation keys over the bootstrapping chain for the residual secret key.
///
/// The key's ternary coefficients are lifted onto the extended chain, so
/// ciphertexts refreshed with these keys still decrypt under `sk`.
pub fn gen_bootstrapping_keys<R: Rng + ?Sized>(
    params: &BootstrapParameters,
    sk: &SecretKey,
    rng: &mut R,
) -> BootstrapResult<EvaluationKeySet> {
    let btp = params.bootstrapping();
    let lifted = SecretKey::from_coefficients(btp, sk.coefficients().to_vec())?;
    let elements = bootstrapping_galois_elements(params);
    let keys = KeyGenerator::new(btp.clone()).gen_evaluation_keys(&lifted, &elements, rng)?;
    info!(
        galois_keys = elements.len(),
        "generated bootstrapping evaluation keys"
    );
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrapping::TestProfile;
    use crate::crypto::Parameters;
    use std::sync::Arc;

    #[test]
    fn keys_cover_only_the_butterfly_gaps() {
        let residual = Arc::new(Parameters::new(&TestProfile::Short.residual_literal()).unwrap());
        let params =
            BootstrapParameters::new(residual, &TestProfile::Short.bootstrapping_literal()).unwrap();
        let btp = params.bootstrapping();
        // 16 slots in two levels each: gaps ±1 and ±4.
        let mut want: Vec<u64> = [-4, -1, 1, 4]
            .into_iter()
            .map(|k| btp.galois_element(k))
            .collect();
        want.push(btp.conjugation_galois_element());
        want.sort_unstable();
        assert_eq!(bootstrapping_galois_elements(&params), want);
    }
}
