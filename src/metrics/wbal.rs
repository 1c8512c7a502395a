//! W' balance: anaerobic capacity depletion and recovery.
//!
//! Above CP the balance drops by `(power - cp) * elapsed`. Below CP it
//! recovers in proportion to the remaining headroom:
//! `(cp - power) * elapsed * (w_prime - balance) / w_prime`.
//! The balance is always clamped to `[0, w_prime]`.

use serde::{Deserialize, Serialize};

/// Critical Power model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WBalModel {
    /// Critical Power in watts.
    pub cp: f64,
    /// W' (anaerobic capacity) in joules.
    pub w_prime: f64,
}

/// Incremental W' balance keyed to sample time.
#[derive(Debug, Clone, Default)]
pub struct WBalAccumulator {
    model: Option<WBalModel>,
    value: Option<f64>,
    last_time: Option<f64>,
}

impl WBalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the model and refill the balance. Missing or non-positive
    /// parameters leave the accumulator unconfigured.
    pub fn configure(&mut self, cp: Option<f64>, w_prime: Option<f64>) {
        self.last_time = None;
        match (cp, w_prime) {
            (Some(cp), Some(w_prime)) if cp > 0.0 && w_prime > 0.0 => {
                self.model = Some(WBalModel { cp, w_prime });
                self.value = Some(w_prime);
            }
            _ => {
                self.model = None;
                self.value = None;
            }
        }
    }

    /// Current model, if configured.
    pub fn model(&self) -> Option<WBalModel> {
        self.model
    }

    /// Fold in `power` held since the previous call. Returns the new balance.
    pub fn accumulate(&mut self, time: f64, power: f64) -> Option<f64> {
        let elapsed = match self.last_time {
            Some(last) if time > last => time - last,
            _ => 0.0,
        };
        self.last_time = Some(time);
        let model = self.model?;
        let balance = self.value.unwrap_or(model.w_prime);
        let delta = model.cp - power;
        let next = if power < model.cp {
            balance + delta * elapsed * (model.w_prime - balance) / model.w_prime
        } else {
            balance + delta * elapsed
        };
        let next = next.clamp(0.0, model.w_prime);
        self.value = Some(next);
        Some(next)
    }

    /// Current balance in joules, `None` when unconfigured.
    pub fn get(&self) -> Option<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_is_none() {
        let mut wbal = WBalAccumulator::new();
        assert_eq!(wbal.accumulate(0.0, 300.0), None);
        wbal.configure(Some(250.0), None);
        assert_eq!(wbal.accumulate(1.0, 300.0), None);
        assert_eq!(wbal.get(), None);
    }

    #[test]
    fn test_depletion_is_linear_above_cp() {
        let mut wbal = WBalAccumulator::new();
        wbal.configure(Some(250.0), Some(20000.0));
        wbal.accumulate(0.0, 350.0);
        let value = wbal.accumulate(10.0, 350.0).unwrap();
        assert!((value - 19000.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_at_zero() {
        let mut wbal = WBalAccumulator::new();
        wbal.configure(Some(200.0), Some(10000.0));
        wbal.accumulate(0.0, 1200.0);
        assert_eq!(wbal.accumulate(60.0, 1200.0), Some(0.0));
    }

    #[test]
    fn test_holding_cp_is_constant() {
        let mut wbal = WBalAccumulator::new();
        wbal.configure(Some(250.0), Some(20000.0));
        for t in 0..30 {
            wbal.accumulate(t as f64, 400.0);
        }
        let depleted = wbal.get().unwrap();
        for t in 30..3600 {
            wbal.accumulate(t as f64, 250.0);
        }
        assert_eq!(wbal.get(), Some(depleted));
    }
}
