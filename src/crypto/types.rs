use crate::rings::RnsPoly;

/// An encoded message: `poly` holds `scale * m(X)` in the coefficient domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    pub poly: RnsPoly,
    pub scale: f64,
    pub log_slots: usize,
}

impl Plaintext {
    pub fn level(&self) -> usize {
        self.poly.level()
    }
}

/// A degree-one CKKS ciphertext `(c0, c1)` with `c0 + c1 * s ≈ scale * m`.
///
/// Both components are kept in the coefficient domain and always share the
/// same level.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    pub c0: RnsPoly,
    pub c1: RnsPoly,
    pub scale: f64,
    pub log_slots: usize,
}

impl Ciphertext {
    pub fn level(&self) -> usize {
        self.c0.level()
    }

    pub fn degree(&self) -> usize {
        self.c0.degree()
    }

    pub fn slots(&self) -> usize {
        1 << self.log_slots
    }
}
