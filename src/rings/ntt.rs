//! Negacyclic number-theoretic transform over `Z_q[X]/(X^N + 1)`.
//!
//! Forward: Cooley-Tukey butterflies with powers of a primitive `2N`-th root
//! `psi` stored in bit-reversed order; natural-order input, bit-reversed
//! output. Inverse: Gentleman-Sande butterflies with `psi^{-1}`, followed by
//! scaling with `N^{-1}`. Pointwise products in the transformed domain are
//! negacyclic convolutions.

use crate::math::Modulus;

#[derive(Debug, Clone)]
pub struct NttTable {
    modulus: Modulus,
    forward_roots: Vec<u64>,
    inverse_roots: Vec<u64>,
    n_inv: u64,
}

impl NttTable {
    /// Builds twiddles for degree `degree`.
    ///
    /// Returns `None` when the modulus has no primitive `2 * degree`-th root.
    pub fn new(modulus: Modulus, degree: usize) -> Option<Self> {
        let q = modulus.value();
        let order = 2 * degree as u64;
        if degree < 2 || !degree.is_power_of_two() || (q - 1) % order != 0 {
            return None;
        }
        let psi = find_primitive_root(&modulus, degree)?;
        let psi_inv = modulus.inv(psi)?;
        let bit_count = degree.trailing_zeros();

        let mut forward_roots = vec![0u64; degree];
        let mut inverse_roots = vec![0u64; degree];
        for index in 0..degree {
            let exponent = reverse_bits(index, bit_count) as u64;
            forward_roots[index] = modulus.pow(psi, exponent);
            inverse_roots[index] = modulus.pow(psi_inv, exponent);
        }

        Some(Self {
            modulus,
            forward_roots,
            inverse_roots,
            n_inv: modulus.inv(degree as u64)?,
        })
    }

    pub fn degree(&self) -> usize {
        self.forward_roots.len()
    }

    /// In-place forward transform.
    pub fn forward(&self, a: &mut [u64]) {
        let n = self.degree();
        debug_assert_eq!(a.len(), n);
        let m = &self.modulus;
        let mut t = n;
        let mut groups = 1;
        while groups < n {
            t >>= 1;
            for i in 0..groups {
                let root = self.forward_roots[groups + i];
                let start = 2 * i * t;
                for j in start..start + t {
                    let u = a[j];
                    let v = m.mul(a[j + t], root);
                    a[j] = m.add(u, v);
                    a[j + t] = m.sub(u, v);
                }
            }
            groups <<= 1;
        }
    }

    /// In-place inverse transform.
    pub fn inverse(&self, a: &mut [u64]) {
        let n = self.degree();
        debug_assert_eq!(a.len(), n);
        let m = &self.modulus;
        let mut t = 1;
        let mut groups = n;
        while groups > 1 {
            let half = groups >> 1;
            let mut start = 0;
            for i in 0..half {
                let root = self.inverse_roots[half + i];
                for j in start..start + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = m.add(u, v);
                    a[j + t] = m.mul(m.sub(u, v), root);
                }
                start += 2 * t;
            }
            t <<= 1;
            groups = half;
        }
        for coeff in a.iter_mut() {
            *coeff = m.mul(*coeff, self.n_inv);
        }
    }
}

/// Smallest `g^((q-1)/2N)` whose `N`-th power is `-1`.
fn find_primitive_root(modulus: &Modulus, degree: usize) -> Option<u64> {
    let q = modulus.value();
    let exponent = (q - 1) / (2 * degree as u64);
    (2..q.min(1 << 20))
        .map(|g| modulus.pow(g, exponent))
        .find(|&psi| modulus.pow(psi, degree as u64) == q - 1)
}

fn reverse_bits(value: usize, bit_count: u32) -> usize {
    if bit_count == 0 {
        0
    } else {
        value.reverse_bits() >> (usize::BITS - bit_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PrimeGenerator;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn negacyclic_schoolbook(a: &[u64], b: &[u64], m: &Modulus) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let prod = m.mul(a[i], b[j]);
                let k = i + j;
                if k < n {
                    out[k] = m.add(out[k], prod);
                } else {
                    out[k - n] = m.sub(out[k - n], prod);
                }
            }
        }
        out
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let n = 64;
        let q = PrimeGenerator::new(n).next_below(50).unwrap();
        let table = NttTable::new(Modulus::new(q), n).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let original: Vec<u64> = (0..n).map(|_| rng.random_range(0..q)).collect();
        let mut a = original.clone();
        table.forward(&mut a);
        assert_ne!(a, original);
        table.inverse(&mut a);
        assert_eq!(a, original);
    }

    #[test]
    fn pointwise_product_is_negacyclic_convolution() {
        let n = 32;
        let q = PrimeGenerator::new(n).next_below(55).unwrap();
        let modulus = Modulus::new(q);
        let table = NttTable::new(modulus, n).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let a: Vec<u64> = (0..n).map(|_| rng.random_range(0..q)).collect();
        let b: Vec<u64> = (0..n).map(|_| rng.random_range(0..q)).collect();
        let expected = negacyclic_schoolbook(&a, &b, &modulus);

        let (mut fa, mut fb) = (a.clone(), b.clone());
        table.forward(&mut fa);
        table.forward(&mut fb);
        let mut product: Vec<u64> =
            fa.iter().zip(&fb).map(|(&x, &y)| modulus.mul(x, y)).collect();
        table.inverse(&mut product);
        assert_eq!(product, expected);
    }

    #[test]
    fn rejects_modulus_without_root_of_unity() {
        assert!(NttTable::new(Modulus::new(97), 64).is_none());
    }
}
