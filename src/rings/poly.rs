use super::errors::{RingError, RingResult};

/// A polynomial in `Z_{q_0} x ... x Z_{q_level}[X] / (X^N + 1)`.
///
/// Rows live in one fixed-capacity arena; row `i` holds the residues modulo
/// `q_i`. The logical row count is `level + 1` and [`RnsPoly::resize`] only
/// moves that count, so slices handed out before a resize never dangle and
/// retained rows are never touched.
///
/// The polynomial carries no reference to its modulus chain; every operation
/// goes through a [`RingView`](super::RingView) that supplies the moduli.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RnsPoly {
    coeffs: Vec<u64>,
    degree: usize,
    rows: usize,
}

// ─── Constructors ─────────────────────────────────────────────────────────────

impl RnsPoly {
    /// Zero polynomial at `level` with room for exactly `level + 1` rows.
    pub fn zero(degree: usize, level: usize) -> Self {
        Self::with_capacity(degree, level, level)
    }

    /// Zero polynomial at `level` with room for `capacity_level + 1` rows.
    ///
    /// # Panics
    ///
    /// Panics if `level > capacity_level`.
    pub fn with_capacity(degree: usize, level: usize, capacity_level: usize) -> Self {
        assert!(
            level <= capacity_level,
            "RnsPoly::with_capacity: level exceeds capacity"
        );
        Self {
            coeffs: vec![0u64; degree * (capacity_level + 1)],
            degree,
            rows: level + 1,
        }
    }

    /// Builds a polynomial from explicit rows, one per modulus.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> RingResult<Self> {
        let degree = rows.first().map(Vec::len).ok_or(RingError::EmptyChain)?;
        if let Some(bad) = rows.iter().find(|row| row.len() != degree) {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "row of length {} in a polynomial of degree {degree}",
                    bad.len()
                ),
            });
        }
        let count = rows.len();
        Ok(Self {
            coeffs: rows.into_iter().flatten().collect(),
            degree,
            rows: count,
        })
    }
}

// ─── Shape ────────────────────────────────────────────────────────────────────

impl RnsPoly {
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn level(&self) -> usize {
        self.rows - 1
    }

    /// Highest level reachable by [`RnsPoly::resize`] without reallocating.
    pub fn capacity_level(&self) -> usize {
        self.coeffs.len() / self.degree - 1
    }

    /// Sets the logical level.
    ///
    /// Shrinking keeps the dropped rows in the arena; growing zeroes the newly
    /// exposed rows.
    pub fn resize(&mut self, level: usize) -> RingResult<()> {
        let capacity = self.capacity_level();
        if level > capacity {
            return Err(RingError::LevelOutOfRange {
                level,
                max_level: capacity,
            });
        }
        if level + 1 > self.rows {
            self.coeffs[self.rows * self.degree..(level + 1) * self.degree].fill(0);
        }
        self.rows = level + 1;
        Ok(())
    }

    /// Copy of the first `level + 1` rows, with capacity trimmed to fit.
    pub fn truncated(&self, level: usize) -> RingResult<Self> {
        if level > self.level() {
            return Err(RingError::LevelMismatch {
                expected: self.level(),
                actual: level,
            });
        }
        Ok(Self {
            coeffs: self.coeffs[..(level + 1) * self.degree].to_vec(),
            degree: self.degree,
            rows: level + 1,
        })
    }

    pub fn zeroize(&mut self) {
        self.coeffs[..self.rows * self.degree].fill(0);
    }

    /// Copies the logical rows of `other` into `self`, resizing to its level.
    pub fn copy_from(&mut self, other: &RnsPoly) -> RingResult<()> {
        if other.degree != self.degree {
            return Err(RingError::InvalidConfiguration {
                reason: format!(
                    "degree mismatch: {} versus {}",
                    self.degree, other.degree
                ),
            });
        }
        self.resize(other.level())?;
        let len = other.rows * other.degree;
        self.coeffs[..len].copy_from_slice(&other.coeffs[..len]);
        Ok(())
    }
}

// ─── Row access ───────────────────────────────────────────────────────────────

impl RnsPoly {
    /// # Panics
    ///
    /// Panics if `index > level`.
    pub fn row(&self, index: usize) -> &[u64] {
        assert!(index < self.rows, "RnsPoly::row: index beyond level");
        &self.coeffs[index * self.degree..(index + 1) * self.degree]
    }

    /// # Panics
    ///
    /// Panics if `index > level`.
    pub fn row_mut(&mut self, index: usize) -> &mut [u64] {
        assert!(index < self.rows, "RnsPoly::row_mut: index beyond level");
        &mut self.coeffs[index * self.degree..(index + 1) * self.degree]
    }

    /// The logical rows as one contiguous slice.
    pub fn as_slice(&self) -> &[u64] {
        &self.coeffs[..self.rows * self.degree]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut self.coeffs[..self.rows * self.degree]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u64]> {
        self.as_slice().chunks_exact(self.degree)
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u64]> {
        let degree = self.degree;
        self.as_mut_slice().chunks_exact_mut(degree)
    }

    /// Splits into the rows strictly below `index` and the row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > level`.
    pub fn split_at_row_mut(&mut self, index: usize) -> (&mut [u64], &mut [u64]) {
        assert!(index < self.rows, "RnsPoly::split_at_row_mut: index beyond level");
        let degree = self.degree;
        let (low, high) = self.coeffs.split_at_mut(index * degree);
        (low, &mut high[..degree])
    }
}

/// A polynomial over the extended basis `Q·P`: a Q-chain part and a P-chain
/// part sharing the same degree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyQP {
    pub q: RnsPoly,
    pub p: RnsPoly,
}

impl PolyQP {
    pub fn zero(degree: usize, level_q: usize, level_p: usize) -> Self {
        Self {
            q: RnsPoly::zero(degree, level_q),
            p: RnsPoly::zero(degree, level_p),
        }
    }

    pub fn level_q(&self) -> usize {
        self.q.level()
    }

    pub fn level_p(&self) -> usize {
        self.p.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(degree: usize, level: usize) -> RnsPoly {
        let rows = (0..=level)
            .map(|r| (0..degree).map(|c| (r * 100 + c) as u64).collect())
            .collect();
        RnsPoly::from_rows(rows).unwrap()
    }

    #[test]
    fn resize_keeps_retained_rows_and_zeroes_regrown_rows() {
        let mut poly = filled(8, 3);
        let before = poly.row(1).to_vec();
        poly.resize(1).unwrap();
        assert_eq!(poly.level(), 1);
        assert_eq!(poly.row(1), before.as_slice());
        poly.resize(3).unwrap();
        assert!(poly.row(2).iter().all(|&c| c == 0));
        assert!(poly.row(3).iter().all(|&c| c == 0));
        assert_eq!(poly.row(1), before.as_slice());
    }

    #[test]
    fn resize_beyond_capacity_fails() {
        let mut poly = RnsPoly::with_capacity(4, 1, 2);
        assert!(poly.resize(2).is_ok());
        assert!(matches!(
            poly.resize(3),
            Err(RingError::LevelOutOfRange { level: 3, max_level: 2 })
        ));
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let result = RnsPoly::from_rows(vec![vec![1, 2], vec![3]]);
        assert!(matches!(result, Err(RingError::InvalidConfiguration { .. })));
        assert!(matches!(RnsPoly::from_rows(vec![]), Err(RingError::EmptyChain)));
    }

    #[test]
    fn split_at_row_separates_top_row() {
        let mut poly = filled(4, 2);
        let (low, top) = poly.split_at_row_mut(2);
        assert_eq!(low.len(), 8);
        assert_eq!(top.to_vec(), vec![200, 201, 202, 203]);
    }

    #[test]
    fn truncated_copy_drops_upper_rows() {
        let poly = filled(4, 3);
        let low = poly.truncated(1).unwrap();
        assert_eq!(low.level(), 1);
        assert_eq!(low.capacity_level(), 1);
        assert_eq!(low.row(1), poly.row(1));
        assert!(poly.truncated(4).is_err());
    }
}
