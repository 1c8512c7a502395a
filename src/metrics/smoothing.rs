//! Small smoothing and aggregation helpers.

/// Exponentially weighted average over roughly `size` samples.
#[derive(Debug, Clone)]
pub struct ExpWeightedAverage {
    /// Weight kept from the previous value
    c_prev: f64,
    /// Weight given to a new value
    c_next: f64,
    value: Option<f64>,
}

impl ExpWeightedAverage {
    /// Create an average that forgets with a time constant of `size` samples.
    pub fn new(size: u32) -> Self {
        let c_prev = (-1.0 / f64::from(size.max(1))).exp();
        Self {
            c_prev,
            c_next: 1.0 - c_prev,
            value: None,
        }
    }

    /// Seed with an initial value.
    pub fn with_value(size: u32, value: f64) -> Self {
        let mut ewa = Self::new(size);
        ewa.value = Some(value);
        ewa
    }

    /// Fold in a value and return the new average.
    pub fn add(&mut self, value: f64) -> f64 {
        let next = match self.value {
            Some(prev) => prev * self.c_prev + value * self.c_next,
            None => value,
        };
        self.value = Some(next);
        next
    }

    /// Current average.
    pub fn get(&self) -> Option<f64> {
        self.value
    }
}

/// Arithmetic mean, `None` when empty.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Median, `None` when empty. Even-length inputs average the middle pair.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
