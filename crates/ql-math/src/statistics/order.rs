use ql_core::Real;

/// Index of the empirical `q`-quantile in a sorted sample of size `n`:
/// the smallest `k` with `(k + 1)/n ≥ q`.
fn quantile_index(n: usize, q: Real) -> usize {
    let k = (q * n as Real).ceil() as usize;
    k.saturating_sub(1).min(n - 1)
}

/// A sample kept in ascending order for quantile queries.
///
/// Samples can be inserted one at a time (binary-search insertion, fine for
/// moderate sizes) or loaded in bulk and sorted once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderStatistics {
    sorted: Vec<Real>,
}

impl OrderStatistics {
    /// An empty sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort `values` once and keep them.
    pub fn from_unsorted(mut values: Vec<Real>) -> Self {
        values.sort_unstable_by(Real::total_cmp);
        Self { sorted: values }
    }

    /// Insert a value, keeping the sample sorted.
    pub fn insert(&mut self, x: Real) {
        let pos = self.sorted.partition_point(|&v| v <= x);
        self.sorted.insert(pos, x);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// `true` if the sample is empty.
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// The samples in ascending order.
    pub fn as_slice(&self) -> &[Real] {
        &self.sorted
    }

    /// Empirical `q`-quantile (`q` in `[0, 1]`).  `None` when empty.
    pub fn quantile(&self, q: Real) -> Option<Real> {
        if self.sorted.is_empty() {
            return None;
        }
        Some(self.sorted[quantile_index(self.sorted.len(), q.clamp(0.0, 1.0))])
    }

    /// Mean of the samples at or above the empirical `q`-quantile.
    pub fn tail_mean(&self, q: Real) -> Option<Real> {
        if self.sorted.is_empty() {
            return None;
        }
        let tail = &self.sorted[quantile_index(self.sorted.len(), q.clamp(0.0, 1.0))..];
        Some(tail.iter().sum::<Real>() / tail.len() as Real)
    }

    /// Fraction of samples strictly greater than `x`.
    pub fn fraction_above(&self, x: Real) -> Real {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let at_or_below = self.sorted.partition_point(|&v| v <= x);
        (self.sorted.len() - at_or_below) as Real / self.sorted.len() as Real
    }

    /// Sample mean of `f(x)`.
    pub fn mean_of<F: Fn(Real) -> Real>(&self, f: F) -> Option<Real> {
        if self.sorted.is_empty() {
            return None;
        }
        Some(self.sorted.iter().map(|&x| f(x)).sum::<Real>() / self.sorted.len() as Real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_keeps_order() {
        let mut s = OrderStatistics::new();
        for x in [0.3, 0.1, 0.5, 0.2, 0.4, 0.2] {
            s.insert(x);
        }
        assert_eq!(s.as_slice(), &[0.1, 0.2, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn quantiles_of_uniform_grid() {
        let s = OrderStatistics::from_unsorted((1..=100).rev().map(|i| i as Real).collect());
        assert_eq!(s.quantile(0.0), Some(1.0));
        assert_eq!(s.quantile(0.95), Some(95.0));
        assert_eq!(s.quantile(1.0), Some(100.0));
        assert_eq!(s.tail_mean(0.99), Some(99.5));
        assert!((s.fraction_above(90.0) - 0.10).abs() < 1e-15);
    }

    #[test]
    fn empty_sample_has_no_quantile() {
        assert_eq!(OrderStatistics::new().quantile(0.5), None);
    }
}
