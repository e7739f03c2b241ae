//! Word-sized modular arithmetic with Montgomery multiplication.
//!
//! A [`Modulus`] carries the constants needed by the hot loops of the ring
//! layer: `q^{-1} mod 2^64` for Montgomery reduction and the Montgomery form
//! of one. Scalars that are multiplied many times (rescale constants, CRT
//! constants) are stored in Montgomery form so that a single [`Modulus::mred`]
//! yields the plain product.

/// Largest supported modulus bit size.
pub const MAX_MODULUS_BITS: u32 = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulus {
    value: u64,
    mred_constant: u64,
}

impl Modulus {
    /// Builds the constants for an odd modulus below `2^61`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is even or does not fit in [`MAX_MODULUS_BITS`].
    pub fn new(value: u64) -> Self {
        assert!(
            value & 1 == 1 && value > 1,
            "Modulus::new: modulus must be odd and greater than one"
        );
        assert!(
            value < (1u64 << MAX_MODULUS_BITS),
            "Modulus::new: modulus exceeds {MAX_MODULUS_BITS} bits"
        );
        Self {
            value,
            mred_constant: inverse_mod_word(value),
        }
    }

    /// Rebuilds a modulus from precomputed constants, checking consistency.
    pub fn from_parts(value: u64, mred_constant: u64) -> Option<Self> {
        if value & 1 == 0 || value < 3 || value >= (1u64 << MAX_MODULUS_BITS) {
            return None;
        }
        (value.wrapping_mul(mred_constant) == 1).then_some(Self {
            value,
            mred_constant,
        })
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// `q^{-1} mod 2^64`.
    #[inline]
    pub fn mred_constant(&self) -> u64 {
        self.mred_constant
    }

    #[inline]
    pub fn reduce(&self, a: u64) -> u64 {
        a % self.value
    }

    #[inline]
    pub fn reduce_i64(&self, a: i64) -> u64 {
        (a as i128).rem_euclid(self.value as i128) as u64
    }

    #[inline]
    pub fn reduce_i128(&self, a: i128) -> u64 {
        a.rem_euclid(self.value as i128) as u64
    }

    #[inline]
    pub fn add(&self, a: u64, b: u64) -> u64 {
        let s = a + b;
        if s >= self.value { s - self.value } else { s }
    }

    #[inline]
    pub fn sub(&self, a: u64, b: u64) -> u64 {
        if a >= b { a - b } else { a + self.value - b }
    }

    #[inline]
    pub fn neg(&self, a: u64) -> u64 {
        if a == 0 { 0 } else { self.value - a }
    }

    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        ((a as u128 * b as u128) % self.value as u128) as u64
    }

    /// Converts `a` to Montgomery form, `a * 2^64 mod q`.
    #[inline]
    pub fn mform(&self, a: u64) -> u64 {
        (((a as u128) << 64) % self.value as u128) as u64
    }

    /// Montgomery product `a * b * 2^{-64} mod q`, canonical in `[0, q)`.
    ///
    /// `a` may be any word; `b` must be reduced.
    #[inline]
    pub fn mred(&self, a: u64, b: u64) -> u64 {
        let product = a as u128 * b as u128;
        let hi = (product >> 64) as u64;
        let lo = product as u64;
        let m = lo.wrapping_mul(self.mred_constant);
        let h = ((m as u128 * self.value as u128) >> 64) as u64;
        let r = hi + self.value - h;
        if r >= self.value { r - self.value } else { r }
    }

    pub fn pow(&self, base: u64, mut exp: u64) -> u64 {
        let mut acc = 1 % self.value;
        let mut base = base % self.value;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = self.mul(acc, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        acc
    }

    /// Inverse modulo a prime modulus via Fermat's little theorem.
    ///
    /// Returns `None` for zero.
    pub fn inv(&self, a: u64) -> Option<u64> {
        let a = a % self.value;
        if a == 0 {
            return None;
        }
        Some(self.pow(a, self.value - 2))
    }

    /// Centered representative in `(-q/2, q/2]`.
    #[inline]
    pub fn center(&self, a: u64) -> i64 {
        if a > self.value / 2 {
            a as i64 - self.value as i64
        } else {
            a as i64
        }
    }
}

/// Newton iteration for `q^{-1} mod 2^64`, valid for odd `q`.
fn inverse_mod_word(q: u64) -> u64 {
    let mut inv = q;
    for _ in 0..6 {
        inv = inv.wrapping_mul(2u64.wrapping_sub(q.wrapping_mul(inv)));
    }
    inv
}
