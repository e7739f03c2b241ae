//! Prime utilities for constructing NTT-friendly modulus chains.
//!
//! Primality is checked with Miller-Rabin over a fixed base set that is
//! deterministic for every `u64`. Chains are built by walking downward from
//! `2^bits` over the candidates `p = 1 (mod 2n)`, so every generated prime
//! supports a negacyclic NTT of degree `n`.
//! Reference:
//! https://en.wikipedia.org/wiki/Miller%E2%80%93Rabin_primality_test

use std::collections::HashSet;

// Deterministic for all n < 318,665,857,834,031,151,167,461.
const MILLER_RABIN_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    let mut acc = 1 % modulus;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    acc
}

/// Returns `true` if `n` is prime.
pub fn is_prime(n: u64) -> bool {
    match n {
        0 | 1 => return false,
        2 | 3 => return true,
        _ if n & 1 == 0 => return false,
        _ => {}
    }

    let r = (n - 1).trailing_zeros();
    let d = (n - 1) >> r;
    'bases: for &a in MILLER_RABIN_BASES.iter() {
        if a >= n {
            continue;
        }
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

/// Returns `true` when `p` is prime and `p = 1 (mod 2n)`.
#[inline]
pub fn is_ntt_friendly_prime(p: u64, n: u64) -> bool {
    match n.checked_mul(2) {
        Some(order) if order > 0 => is_prime(p) && p % order == 1,
        _ => false,
    }
}

/// Hands out distinct NTT-friendly primes for a fixed ring degree.
///
/// Each request for a bit size continues the downward walk for that size, so
/// asking twice for 60 bits yields two different primes close to `2^60`.
#[derive(Debug, Clone)]
pub struct PrimeGenerator {
    degree: u64,
    used: HashSet<u64>,
}

impl PrimeGenerator {
    pub fn new(degree: usize) -> Self {
        Self {
            degree: degree as u64,
            used: HashSet::new(),
        }
    }

    /// Marks externally chosen primes as taken.
    pub fn exclude(&mut self, primes: &[u64]) {
        self.used.extend(primes.iter().copied());
    }

    /// Largest unused NTT-friendly prime below `2^bits` and above `2^(bits-1)`.
    pub fn next_below(&mut self, bits: u32) -> Option<u64> {
        if !(2..64).contains(&bits) {
            return None;
        }
        let step = self.degree.checked_mul(2)?;
        let floor = 1u64 << (bits - 1);
        // Largest candidate below 2^bits that is 1 mod 2n.
        let top = (1u64 << bits) - 1;
        let mut candidate = top - (top + step - 1) % step;
        while candidate > floor {
            if !self.used.contains(&candidate) && is_prime(candidate) {
                self.used.insert(candidate);
                return Some(candidate);
            }
            candidate = candidate.checked_sub(step)?;
        }
        None
    }

    /// One prime per entry of `bit_sizes`, in order.
    pub fn chain(&mut self, bit_sizes: &[u32]) -> Option<Vec<u64>> {
        bit_sizes.iter().map(|&bits| self.next_below(bits)).collect()
    }
}
