use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use num_complex::Complex64;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toy_ckks_bootstrap::bootstrapping::{
    BootstrapParameters, Bootstrapper, TestProfile, gen_bootstrapping_keys,
};
use toy_ckks_bootstrap::crypto::{Encryptor, Parameters};
use toy_ckks_bootstrap::encoding::CkksEncoder;
use toy_ckks_bootstrap::keys::KeyGenerator;

fn bench_bootstrap(c: &mut Criterion) {
    let profile = TestProfile::Short;
    let residual = Arc::new(Parameters::new(&profile.residual_literal()).unwrap());
    let params = Arc::new(
        BootstrapParameters::new(residual.clone(), &profile.bootstrapping_literal()).unwrap(),
    );
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let sk = KeyGenerator::new(residual.clone())
        .gen_secret_key(&mut rng)
        .unwrap();
    let keys = gen_bootstrapping_keys(&params, &sk, &mut rng).unwrap();
    let bootstrapper = Bootstrapper::new(params.clone(), Arc::new(keys)).unwrap();

    let slots = 1 << params.log_slots();
    let values: Vec<Complex64> = (0..slots)
        .map(|k| Complex64::from_polar(0.8, k as f64))
        .collect();
    let pt = CkksEncoder::new(residual.ring_q().clone())
        .encode(&values, params.log_slots(), 0, residual.default_scale())
        .unwrap();
    let encryptor = Encryptor::new(residual.clone(), &sk);
    let cts: Vec<_> = (0..4)
        .map(|_| encryptor.encrypt(&pt, &mut rng).unwrap())
        .collect();

    let mut group = c.benchmark_group("bootstrap_short");
    group.sample_size(10);
    group.bench_function("single", |b| {
        b.iter(|| bootstrapper.bootstrap(black_box(&cts[0])).unwrap());
    });
    group.bench_function("many_4", |b| {
        b.iter(|| bootstrapper.bootstrap_many(black_box(&cts)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_bootstrap);
criterion_main!(benches);
