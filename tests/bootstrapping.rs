use std::sync::{Arc, LazyLock};

use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use toy_ckks_bootstrap::bootstrapping::{
    BootstrapError, BootstrapParameters, Bootstrapper, ParametersLiteral, Stage, TestProfile,
    gen_bootstrapping_keys,
};
use toy_ckks_bootstrap::crypto::{
    Ciphertext, CkksError, Decryptor, Encryptor, Parameters, PrecisionStats, precision_floor,
};
use toy_ckks_bootstrap::encoding::CkksEncoder;
use toy_ckks_bootstrap::keys::{EvaluationKeySet, KeyGenerator, SecretKey};

struct Setup {
    residual: Arc<Parameters>,
    encoder: CkksEncoder,
    encryptor: Encryptor,
    decryptor: Decryptor,
    bootstrapper: Bootstrapper,
}

impl Setup {
    fn new(profile: TestProfile, seed: u64) -> Self {
        Self::with_literal(profile, &profile.bootstrapping_literal(), seed)
    }

    fn with_literal(profile: TestProfile, literal: &ParametersLiteral, seed: u64) -> Self {
        let residual = Arc::new(Parameters::new(&profile.residual_literal()).unwrap());
        let params = Arc::new(BootstrapParameters::new(residual.clone(), literal).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sk: SecretKey = KeyGenerator::new(residual.clone())
            .gen_secret_key(&mut rng)
            .unwrap();
        let keys = gen_bootstrapping_keys(&params, &sk, &mut rng).unwrap();
        Self {
            encoder: CkksEncoder::new(residual.ring_q().clone()),
            encryptor: Encryptor::new(residual.clone(), &sk),
            decryptor: Decryptor::new(residual.clone(), &sk),
            bootstrapper: Bootstrapper::new(params, Arc::new(keys)).unwrap(),
            residual,
        }
    }

    fn log_slots(&self) -> usize {
        self.bootstrapper.params().log_slots()
    }

    fn encrypt_at_level_zero(&self, values: &[Complex64], rng: &mut ChaCha20Rng) -> Ciphertext {
        self.encrypt_with(values, self.log_slots(), self.residual.default_scale(), rng)
    }

    fn encrypt_with(
        &self,
        values: &[Complex64],
        log_slots: usize,
        scale: f64,
        rng: &mut ChaCha20Rng,
    ) -> Ciphertext {
        let pt = self.encoder.encode(values, log_slots, 0, scale).unwrap();
        self.encryptor.encrypt(&pt, rng).unwrap()
    }

    fn decrypt(&self, ct: &Ciphertext) -> Vec<Complex64> {
        self.encoder
            .decode(&self.decryptor.decrypt(ct).unwrap())
            .unwrap()
    }

    fn floor(&self) -> f64 {
        precision_floor(
            f64::from(self.residual.log_default_scale()),
            self.residual.log_n(),
        )
    }
}

static SHORT: LazyLock<Setup> = LazyLock::new(|| Setup::new(TestProfile::Short, 2024));

/// Short profile configured for 4 of its 16 slots.
static SPARSE: LazyLock<Setup> = LazyLock::new(|| {
    let literal = TestProfile::Short.bootstrapping_literal().with_log_slots(2);
    Setup::with_literal(TestProfile::Short, &literal, 2025)
});

fn unit_square(len: usize, rng: &mut ChaCha20Rng) -> Vec<Complex64> {
    (0..len)
        .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
        .collect()
}

#[test]
fn bootstrap_refreshes_to_the_top_level_within_the_precision_floor() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let values = unit_square(1 << setup.log_slots(), &mut rng);
    let ct = setup.encrypt_at_level_zero(&values, &mut rng);

    let out = setup.bootstrapper.bootstrap(&ct).unwrap();
    assert_eq!(out.level(), setup.residual.max_level());
    assert_eq!(out.scale, setup.residual.default_scale());
    assert_eq!(out.log_slots, ct.log_slots);

    let stats = PrecisionStats::new(&values, &setup.decrypt(&out));
    for (part, bits) in [("real", stats.avg_real), ("imag", stats.avg_imag)] {
        assert!(
            bits >= setup.floor(),
            "average {part} precision {bits:.2} bits below floor {:.2}",
            setup.floor()
        );
    }
}

#[test]
fn bootstrapped_ciphertexts_support_further_computation() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let values = unit_square(1 << setup.log_slots(), &mut rng);
    let ct = setup.encrypt_at_level_zero(&values, &mut rng);

    let refreshed = setup.bootstrapper.bootstrap(&ct).unwrap();
    let evaluator = setup.bootstrapper.evaluator();
    let doubled = evaluator.add(&refreshed, &refreshed).unwrap();
    let shifted = evaluator
        .add_const(&doubled, Complex64::new(0.5, -0.25))
        .unwrap();

    let want: Vec<Complex64> = values
        .iter()
        .map(|v| 2.0 * v + Complex64::new(0.5, -0.25))
        .collect();
    let stats = PrecisionStats::new(&want, &setup.decrypt(&shifted));
    assert!(stats.avg() >= setup.floor() - 1.0, "{stats:?}");
}

#[test]
fn bootstrap_many_matches_independent_calls() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let inputs: Vec<Vec<Complex64>> = (0..3)
        .map(|_| unit_square(1 << setup.log_slots(), &mut rng))
        .collect();
    let cts: Vec<Ciphertext> = inputs
        .iter()
        .map(|values| setup.encrypt_at_level_zero(values, &mut rng))
        .collect();

    let batch = setup.bootstrapper.bootstrap_many(&cts).unwrap();
    assert_eq!(batch.len(), cts.len());
    for ((ct, out), values) in cts.iter().zip(&batch).zip(&inputs) {
        let single = setup.bootstrapper.bootstrap(ct).unwrap();
        assert_eq!(&single, out);
        let stats = PrecisionStats::new(values, &setup.decrypt(out));
        assert!(stats.avg() >= setup.floor(), "{stats:?}");
    }
}

#[test]
fn conjugate_invariant_variant_refreshes_two_real_vectors() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(4);
    let slots = 1 << setup.log_slots();
    let real = |rng: &mut ChaCha20Rng| -> Vec<Complex64> {
        (0..slots)
            .map(|_| Complex64::new(rng.random_range(-1.0..1.0), 0.0))
            .collect()
    };
    let left = real(&mut rng);
    let right = real(&mut rng);
    let left_ct = setup.encrypt_at_level_zero(&left, &mut rng);
    let right_ct = setup.encrypt_at_level_zero(&right, &mut rng);

    let (left_out, right_out) = setup
        .bootstrapper
        .evaluate_conjugate_invariant(&left_ct, &right_ct)
        .unwrap();
    for (want, out) in [(&left, &left_out), (&right, &right_out)] {
        assert_eq!(out.level(), setup.residual.max_level());
        assert_eq!(out.scale, setup.residual.default_scale());
        let stats = PrecisionStats::new(want, &setup.decrypt(out));
        assert!(stats.avg_real >= setup.floor(), "{stats:?}");
        assert!(stats.avg_imag >= setup.floor(), "{stats:?}");
    }
}

#[test]
fn rejects_inputs_above_level_zero() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let values = unit_square(4, &mut rng);
    let pt = setup
        .encoder
        .encode(&values, setup.log_slots(), 1, setup.residual.default_scale())
        .unwrap();
    let ct = setup.encryptor.encrypt(&pt, &mut rng).unwrap();
    assert_eq!(
        setup.bootstrapper.bootstrap(&ct).unwrap_err(),
        BootstrapError::InvalidInputLevel { level: 1 }
    );
    assert_eq!(
        setup.bootstrapper.bootstrap_many(&[ct]).unwrap_err(),
        BootstrapError::InvalidInputLevel { level: 1 }
    );
}

#[test]
fn sparse_slots_refresh_within_the_precision_floor() {
    let setup = &*SPARSE;
    assert_eq!(setup.log_slots(), 2);
    let mut rng = ChaCha20Rng::seed_from_u64(9);
    let values = unit_square(4, &mut rng);
    let ct = setup.encrypt_at_level_zero(&values, &mut rng);

    let out = setup.bootstrapper.bootstrap(&ct).unwrap();
    assert_eq!(out.level(), setup.residual.max_level());
    assert_eq!(out.scale, setup.residual.default_scale());
    assert_eq!(out.log_slots, 2);
    let stats = PrecisionStats::new(&values, &setup.decrypt(&out));
    assert!(stats.avg_real >= setup.floor(), "{stats:?}");
    assert!(stats.avg_imag >= setup.floor(), "{stats:?}");
}

#[test]
fn rejects_more_slots_than_configured() {
    let setup = &*SPARSE;
    let mut rng = ChaCha20Rng::seed_from_u64(10);
    let values = unit_square(16, &mut rng);
    let ct = setup.encrypt_with(&values, 4, setup.residual.default_scale(), &mut rng);
    assert_eq!(
        setup.bootstrapper.bootstrap(&ct).unwrap_err(),
        BootstrapError::IncompatibleSlotCount {
            log_slots: 4,
            max_log_slots: 2
        }
    );
}

#[test]
fn off_default_input_scale_comes_out_at_the_default_scale() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(12);
    let values = unit_square(1 << setup.log_slots(), &mut rng);
    let scale = 1.37 * setup.residual.default_scale();
    let ct = setup.encrypt_with(&values, setup.log_slots(), scale, &mut rng);

    let out = setup.bootstrapper.bootstrap(&ct).unwrap();
    assert_eq!(out.level(), setup.residual.max_level());
    assert_eq!(out.scale, setup.residual.default_scale());
    let stats = PrecisionStats::new(&values, &setup.decrypt(&out));
    assert!(stats.avg_real >= setup.floor(), "{stats:?}");
    assert!(stats.avg_imag >= setup.floor(), "{stats:?}");
}

#[test]
fn scale_down_failures_name_their_stage() {
    let setup = &*SHORT;
    let mut rng = ChaCha20Rng::seed_from_u64(13);
    let values = unit_square(1 << setup.log_slots(), &mut rng);
    let mut ct = setup.encrypt_at_level_zero(&values, &mut rng);
    // No integer factor brings 2^60 down to q_0 / 2^r.
    ct.scale = 2f64.powi(60);
    let err = setup.bootstrapper.bootstrap(&ct).unwrap_err();
    assert!(
        matches!(
            err,
            BootstrapError::StageFailure {
                stage: Stage::ScaleDown,
                source: CkksError::InvalidParameter { .. }
            }
        ),
        "{err:?}"
    );
}

#[test]
fn construction_requires_the_rotation_keys() {
    let setup = &*SHORT;
    let params = setup.bootstrapper.params().clone();
    let err = Bootstrapper::new(params, Arc::new(EvaluationKeySet::new())).unwrap_err();
    assert_eq!(
        err,
        BootstrapError::Ckks(CkksError::MissingRelinearizationKey)
    );
}

#[test]
#[ignore = "N = 2^16 needs several GB of key material; run with --ignored"]
fn long_profile_recovers_a_known_constant() {
    let setup = Setup::new(TestProfile::Long, 7);
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let known = Complex64::new(0.9238795325112867, 0.3826834323650898);
    let mut values = unit_square(1 << setup.log_slots(), &mut rng);
    values[..4].fill(known);
    let ct = setup.encrypt_at_level_zero(&values, &mut rng);

    let out = setup.bootstrapper.bootstrap(&ct).unwrap();
    assert_eq!(out.level(), setup.residual.max_level());
    assert_eq!(out.scale, setup.residual.default_scale());
    let decoded = setup.decrypt(&out);
    let stats = PrecisionStats::new(&[known; 4], &decoded[..4]);
    assert!(stats.avg() >= setup.floor(), "{stats:?}");
}
