#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::sync::Arc;

use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toy_ckks_bootstrap::bootstrapping::{
    BootstrapParameters, Bootstrapper, TestProfile, gen_bootstrapping_keys,
};
use toy_ckks_bootstrap::crypto::{Decryptor, Encryptor, Parameters, PrecisionStats};
use toy_ckks_bootstrap::encoding::CkksEncoder;
use toy_ckks_bootstrap::keys::KeyGenerator;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "dhat-heap")]
    let _dhat = dhat::Profiler::new_heap();

    let profile = TestProfile::Short;
    let mut rng = ChaCha20Rng::seed_from_u64(123);

    println!("Resolving parameters...");
    let residual = Arc::new(Parameters::new(&profile.residual_literal())?);
    let params = Arc::new(BootstrapParameters::new(
        residual.clone(),
        &profile.bootstrapping_literal(),
    )?);
    println!(
        "Bootstrapping chain: {} Q primes, depth {}",
        params.bootstrapping().q_moduli().len(),
        params.depth()
    );

    println!("Generating keys...");
    let sk = KeyGenerator::new(residual.clone()).gen_secret_key(&mut rng)?;
    let keys = gen_bootstrapping_keys(&params, &sk, &mut rng)?;
    let bootstrapper = Bootstrapper::new(params.clone(), Arc::new(keys))?;

    let slots = 1 << params.log_slots();
    let values: Vec<Complex64> = (0..slots)
        .map(|k| Complex64::new(0.05 * k as f64 - 0.4, 0.3))
        .collect();
    let encoder = CkksEncoder::new(residual.ring_q().clone());
    let pt = encoder.encode(&values, params.log_slots(), 0, residual.default_scale())?;
    let ct = Encryptor::new(residual.clone(), &sk).encrypt(&pt, &mut rng)?;

    println!("Bootstrapping...");
    let refreshed = bootstrapper.bootstrap(&ct)?;
    let decoded = encoder.decode(&Decryptor::new(residual.clone(), &sk).decrypt(&refreshed)?)?;
    let stats = PrecisionStats::new(&values, &decoded);

    println!(
        "Refreshed to level {} with average precision {:.2} bits",
        refreshed.level(),
        stats.avg()
    );
    Ok(())
}
