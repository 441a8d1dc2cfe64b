use serde::Serialize;

/// Running summary of recorded samples.
///
/// Only aggregates are kept, so recording is O(1) and the snapshot is stable
/// regardless of sample order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Histogram {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Histogram {
    pub fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum as f64 / self.count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::Histogram;

    #[test]
    fn tracks_min_max_sum_count() {
        let mut h = Histogram::default();
        h.record(5);
        h.record(2);
        h.record(8);
        assert_eq!(h.count, 3);
        assert_eq!(h.sum, 15);
        assert_eq!(h.min, 2);
        assert_eq!(h.max, 8);
        assert_eq!(h.mean(), Some(5.0));
    }

    #[test]
    fn empty_has_no_mean() {
        assert!(Histogram::default().is_empty());
        assert_eq!(Histogram::default().mean(), None);
    }
}
