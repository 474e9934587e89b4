use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("weight table is empty")]
    Empty,

    #[error("weight at position {index} must be positive and finite, got {weight}")]
    InvalidWeight { index: usize, weight: f64 },
}

/// Cumulative distribution over a list of entries.
///
/// A draw `d` in `[0, total)` selects the first entry whose cumulative weight
/// is strictly greater than `d`. Ties therefore always resolve to the earlier
/// entry; build the table with [`WeightedTable::canonical`] when the entry
/// order comes from storage and must not matter.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    entries: Vec<T>,
    cumulative: Vec<f64>,
    total: f64,
}

impl<T> WeightedTable<T> {
    pub fn new(entries: impl IntoIterator<Item = (T, f64)>) -> Result<Self, WeightError> {
        let mut items = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0;

        for (index, (entry, weight)) in entries.into_iter().enumerate() {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(WeightError::InvalidWeight { index, weight });
            }
            total += weight;
            items.push(entry);
            cumulative.push(total);
        }

        if items.is_empty() {
            return Err(WeightError::Empty);
        }

        Ok(Self {
            entries: items,
            cumulative,
            total,
        })
    }

    /// Like [`WeightedTable::new`], after sorting entries by `key`
    pub fn canonical<K: Ord>(
        entries: impl IntoIterator<Item = (T, f64)>,
        key: impl Fn(&T) -> K,
    ) -> Result<Self, WeightError> {
        let mut entries: Vec<(T, f64)> = entries.into_iter().collect();
        super::canonical::canonical_order(&mut entries, |(t, _)| key(t));
        Self::new(entries)
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic selection for a given draw. Draws outside `[0, total)`
    /// are clamped.
    pub fn pick_at(&self, draw: f64) -> &T {
        let idx = self.cumulative.partition_point(|&c| c <= draw);
        &self.entries[idx.min(self.entries.len() - 1)]
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let draw = rng.random_range(0.0..self.total);
        self.pick_at(draw)
    }
}
