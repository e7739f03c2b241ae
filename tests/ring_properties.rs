use std::sync::Arc;

use crypto_bigint::NonZero;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use toy_ckks_bootstrap::math::PrimeGenerator;
use toy_ckks_bootstrap::rings::crt::{CrtReconstructor, wide_mod};
use toy_ckks_bootstrap::rings::{BasisExtender, RescaleKernelConstants, Ring, RnsPoly};

const N: usize = 32;

struct Chains {
    q: Vec<u64>,
    p: Vec<u64>,
}

impl Chains {
    fn new(log_q: &[u32], log_p: &[u32]) -> Self {
        let mut generator = PrimeGenerator::new(N);
        let q = generator.chain(log_q).unwrap();
        let p = generator.chain(log_p).unwrap();
        Self { q, p }
    }

    fn merged(&self) -> Ring {
        let all: Vec<u64> = self.q.iter().chain(&self.p).copied().collect();
        Ring::new(N, &all).unwrap()
    }

    fn extender(&self) -> BasisExtender {
        BasisExtender::new(
            Arc::new(Ring::new(N, &self.q).unwrap()),
            Arc::new(Ring::new(N, &self.p).unwrap()),
        )
        .unwrap()
    }

    /// Splits a polynomial over `Q ++ P` into its Q and P parts.
    fn split(&self, poly: &RnsPoly) -> (RnsPoly, RnsPoly) {
        let rows: Vec<Vec<u64>> = poly.rows().map(<[u64]>::to_vec).collect();
        let (q_rows, p_rows) = rows.split_at(self.q.len());
        (
            RnsPoly::from_rows(q_rows.to_vec()).unwrap(),
            RnsPoly::from_rows(p_rows.to_vec()).unwrap(),
        )
    }
}

fn rows_of(poly: &RnsPoly) -> Vec<Vec<u64>> {
    poly.rows().map(<[u64]>::to_vec).collect()
}

/// `round(x / P)` over the Q primes for every coefficient of `poly`.
fn reference_mod_down(ring: &Ring, poly: &RnsPoly, q_len: usize) -> Vec<Vec<u64>> {
    let moduli = ring.moduli();
    let crt = CrtReconstructor::new(moduli).unwrap();
    let p_crt = CrtReconstructor::new(&moduli[q_len..]).unwrap();
    let divisor = NonZero::new(*p_crt.product()).unwrap();
    let half = p_crt.product().wrapping_shr(1);
    let mut rows = vec![vec![0u64; N]; q_len];
    for c in 0..N {
        let x = crt.reconstruct(&crt.column(poly, c));
        let (quotient, _) = x.wrapping_add(&half).div_rem(&divisor);
        for (i, row) in rows.iter_mut().enumerate() {
            row[c] = wide_mod(&quotient, &moduli[i]);
        }
    }
    rows
}

#[test]
fn mod_down_matches_big_integer_rounding() {
    for (log_q, log_p) in [
        (vec![55, 45, 45], vec![61]),
        (vec![50, 40, 40, 40], vec![61, 60]),
        (vec![60, 60], vec![61, 61, 58]),
    ] {
        let chains = Chains::new(&log_q, &log_p);
        let merged = chains.merged();
        let mut rng = ChaCha20Rng::seed_from_u64(log_p.len() as u64);
        let x = merged.view().sample_uniform(&mut rng);
        let (mut q, p) = chains.split(&x);

        let extender = chains.extender();
        extender
            .mod_down_qp_to_q_inplace(log_q.len() - 1, log_p.len() - 1, &mut q, &p)
            .unwrap();
        assert_eq!(rows_of(&q), reference_mod_down(&merged, &x, log_q.len()));
    }
}

#[test]
fn mod_down_equals_aux_rescale_then_floors_on_the_merged_chain() {
    let chains = Chains::new(&[55, 45, 45], &[61, 61, 60]);
    let merged = chains.merged();
    let view = merged.view();
    let alpha = chains.p.len();
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    for _ in 0..4 {
        let x = view.sample_uniform(&mut rng);

        let mut via_aux = x.clone();
        view.div_round_by_last_modulus_aux_inplace(&mut via_aux, alpha - 1)
            .unwrap();
        merged
            .at_level(view.level() - 1)
            .unwrap()
            .div_floor_by_last_moduli(alpha - 1, &mut via_aux)
            .unwrap();

        let (mut via_mod_down, p) = chains.split(&x);
        chains
            .extender()
            .mod_down_qp_to_q_inplace(chains.q.len() - 1, alpha - 1, &mut via_mod_down, &p)
            .unwrap();

        assert_eq!(via_aux.level(), chains.q.len() - 1);
        assert_eq!(rows_of(&via_aux), rows_of(&via_mod_down));
    }
}

#[test]
fn iterated_single_roundings_stay_within_one_of_mod_down() {
    let chains = Chains::new(&[55, 50, 50], &[61, 61]);
    let merged = chains.merged();
    let view = merged.view();
    let q_ring = Ring::new(N, &chains.q).unwrap();
    let crt_q = CrtReconstructor::new(q_ring.moduli()).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(12);
    let x = view.sample_uniform(&mut rng);

    let mut iterated = x.clone();
    view.div_round_by_last_moduli(chains.p.len(), &mut iterated)
        .unwrap();

    let (mut exact, p) = chains.split(&x);
    chains
        .extender()
        .mod_down_qp_to_q_inplace(chains.q.len() - 1, chains.p.len() - 1, &mut exact, &p)
        .unwrap();

    let q_view = q_ring.view();
    let mut diff = iterated.clone();
    q_view.sub_assign(&mut diff, &exact).unwrap();
    for c in 0..N {
        let column = crt_q.column(&diff, c);
        let delta = crt_q.reconstruct_centered_f64(&column);
        assert!(delta.abs() <= 1.0, "coefficient {c} off by {delta}");
        // Every residue row agrees on the same small difference.
        let d = delta as i64;
        for (i, m) in q_ring.moduli().iter().enumerate() {
            assert_eq!(column[i], m.reduce_i64(d), "row {i} of coefficient {c}");
        }
    }
}

#[test]
fn divisions_walk_the_level_down_and_keep_capacity() {
    let chains = Chains::new(&[55, 45, 45, 45], &[61]);
    let merged = chains.merged();
    let view = merged.view();
    let mut rng = ChaCha20Rng::seed_from_u64(13);
    let mut x = view.sample_uniform(&mut rng);
    let capacity = x.capacity_level();

    let top = view.level();
    for step in 1..=top {
        merged
            .at_level(top + 1 - step)
            .unwrap()
            .div_round_by_last_modulus_inplace(&mut x)
            .unwrap();
        assert_eq!(x.level(), top - step);
        assert_eq!(x.capacity_level(), capacity);
        assert_eq!(x.as_slice().len(), (top - step + 1) * N);
    }
    assert!(
        merged
            .at_level(0)
            .unwrap()
            .div_round_by_last_modulus_inplace(&mut x)
            .is_err()
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn fused_kernel_agrees_with_sequential_roundings(seed in any::<u64>(), k in 1usize..=3) {
        let chains = Chains::new(&[55, 45, 45], &[61, 61, 60]);
        let merged = chains.merged();
        let view = merged.view();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let x = view.sample_uniform(&mut rng);

        let mut sequential = x.clone();
        for step in 0..k {
            merged
                .at_level(view.level() - step)
                .unwrap()
                .div_round_by_last_modulus_inplace(&mut sequential)
                .unwrap();
        }

        let mut fused = x.clone();
        RescaleKernelConstants::new(&view, k)
            .unwrap()
            .apply(&view, &mut fused)
            .unwrap();
        prop_assert_eq!(fused.level(), view.level() - k);
        prop_assert_eq!(rows_of(&fused), rows_of(&sequential));
    }
}
