//! Normalized Power and xPower maintained inline with a rolling window.
//!
//! NP = 4th root of average of (30-second rolling average power)^4
//! xP = 4th root of average of (25-second exponentially weighted power)^4
//!
//! Both are kept incrementally per committed entry so that a window evicting
//! old entries (or a lap forked from a live window) reports the value for
//! exactly its own range.

use super::rolling::{Accumulation, RollingWindow, SampleValue};

/// Minimum active seconds before NP or xP is reported unforced.
pub const MIN_ACTIVE_SECS: f64 = 300.0;

/// NP smoothing window in seconds.
const NP_WINDOW_SECS: f64 = 30.0;

/// xP time constant in seconds.
const XP_TIME_CONSTANT: f64 = 25.0;

/// Weighted values below this stop the xP catch-up decay.
const XP_NEGLIGIBLE: f64 = 0.1;

const XP_EPSILON: f64 = 0.1;

/// What a committed entry added, so it can be removed on eviction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerSaved {
    np: Option<f64>,
    pad: bool,
    xp_total: f64,
    xp_count: u64,
}

/// Inline NP/xP state.
#[derive(Debug, Clone)]
pub struct PowerAccumulation {
    ideal_gap: f64,
    // NP
    roll: Vec<f64>,
    roll_sum: f64,
    np_total: f64,
    gap_pad_count: usize,
    // xP
    attenuation: f64,
    sample_weight: f64,
    prev_time: Option<f64>,
    weighted: f64,
    xp_total: f64,
    xp_count: u64,
}

impl Accumulation for PowerAccumulation {
    type Saved = PowerSaved;

    fn new(ideal_gap: f64) -> Self {
        let roll_size = ((NP_WINDOW_SECS / ideal_gap).round() as usize).max(1);
        let samples_per_window = XP_TIME_CONSTANT / ideal_gap;
        Self {
            ideal_gap,
            roll: vec![0.0; roll_size],
            roll_sum: 0.0,
            np_total: 0.0,
            gap_pad_count: 0,
            attenuation: samples_per_window / (samples_per_window + ideal_gap),
            sample_weight: ideal_gap / (samples_per_window + ideal_gap),
            prev_time: None,
            weighted: 0.0,
            xp_total: 0.0,
            xp_count: 0,
        }
    }

    fn push(&mut self, time: f64, value: &SampleValue, index: u64, size: usize) -> PowerSaved {
        let slot = (index % self.roll.len() as u64) as usize;
        let mut saved = PowerSaved::default();

        if value.is_pad() {
            // Drain the ring but don't count the pad as an NP sample.
            self.roll_sum -= self.roll[slot];
            self.roll[slot] = 0.0;
            self.gap_pad_count += 1;
            saved.pad = true;
            return saved;
        }

        let watts = value.value();

        self.roll_sum += watts - self.roll[slot];
        self.roll[slot] = watts;
        let npa = self.roll_sum / self.roll.len().min(size) as f64;
        let qnpa = npa.powi(4);
        self.np_total += qnpa;
        saved.np = Some(qnpa);

        // Decay across skipped intervals before folding in the new sample.
        if let Some(mut prev) = self.prev_time {
            while self.weighted > XP_NEGLIGIBLE && time > prev + self.ideal_gap + XP_EPSILON {
                self.weighted *= self.attenuation;
                prev += self.ideal_gap;
                saved.xp_total += self.weighted.powi(4);
                saved.xp_count += 1;
            }
        }
        self.weighted = self.weighted * self.attenuation + self.sample_weight * watts;
        self.prev_time = Some(time);
        saved.xp_total += self.weighted.powi(4);
        saved.xp_count += 1;

        self.xp_total += saved.xp_total;
        self.xp_count += saved.xp_count;
        saved
    }

    fn evict(&mut self, _value: &SampleValue, saved: &PowerSaved) {
        if let Some(q) = saved.np {
            self.np_total -= q;
        }
        if saved.pad {
            self.gap_pad_count = self.gap_pad_count.saturating_sub(1);
        }
        self.xp_total -= saved.xp_total;
        self.xp_count = self.xp_count.saturating_sub(saved.xp_count);
    }
}

/// Rolling window of watts with inline NP and xP.
pub type PowerWindow = RollingWindow<PowerAccumulation>;

impl RollingWindow<PowerAccumulation> {
    /// Normalized Power. `None` below five active minutes unless `force`.
    pub fn np(&self, force: bool) -> Option<f64> {
        if self.active() < MIN_ACTIVE_SECS && !force {
            return None;
        }
        let state = self.accumulation();
        let samples = self.size().checked_sub(state.gap_pad_count)?;
        if samples == 0 {
            return None;
        }
        Some((state.np_total.max(0.0) / samples as f64).powf(0.25))
    }

    /// xPower. `None` below five active minutes unless `force`.
    pub fn xp(&self, force: bool) -> Option<f64> {
        if self.active() < MIN_ACTIVE_SECS && !force {
            return None;
        }
        let state = self.accumulation();
        if state.xp_count == 0 {
            return None;
        }
        Some((state.xp_total.max(0.0) / state.xp_count as f64).powf(0.25))
    }

    /// Work done over active time, in joules.
    pub fn joules(&self) -> f64 {
        self.values_sum()
    }
}

/// Training Stress Score for `active_secs` ridden at normalized power `np`.
pub fn calc_tss(np: f64, active_secs: f64, ftp: f64) -> Option<f64> {
    if ftp <= 0.0 {
        return None;
    }
    Some((np * active_secs * (np / ftp)) / (ftp * 3600.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::rolling::WindowOptions;

    fn feed(w: &mut PowerWindow, from: u32, to: u32, watts: f64) {
        for t in from..to {
            w.commit(t as f64, SampleValue::Sample(watts));
        }
    }

    #[test]
    fn test_np_constant_power() {
        let mut w = PowerWindow::new(WindowOptions::default());
        feed(&mut w, 0, 601, 200.0);

        let np = w.np(false).unwrap();
        assert!((np - 200.0).abs() < 0.01, "np = {}", np);
        let xp = w.xp(false).unwrap();
        assert!(xp < 200.0 && xp > 190.0, "xp = {}", xp);
    }

    #[test]
    fn test_np_gated_below_five_minutes() {
        let mut w = PowerWindow::new(WindowOptions::default());
        feed(&mut w, 0, 120, 250.0);

        assert_eq!(w.np(false), None);
        assert_eq!(w.xp(false), None);
        assert!((w.np(true).unwrap() - 250.0).abs() < 0.01);
    }

    #[test]
    fn test_np_exceeds_avg_for_variable_power() {
        let mut w = PowerWindow::new(WindowOptions::default());
        for block in 0..10 {
            let watts = if block % 2 == 0 { 100.0 } else { 400.0 };
            feed(&mut w, block * 60, block * 60 + 60, watts);
        }
        let avg = w.avg().unwrap();
        let np = w.np(false).unwrap();
        assert!(np > avg + 20.0, "np {} avg {}", np, avg);
    }

    #[test]
    fn test_pads_excluded_from_np_samples() {
        let mut w = PowerWindow::new(WindowOptions::default());
        feed(&mut w, 0, 400, 200.0);
        // 60 second pause becomes pads.
        feed(&mut w, 460, 500, 200.0);

        assert_eq!(w.accumulation().gap_pad_count, 59);
        let np = w.np(false).unwrap();
        assert!(np < 200.0 && np > 180.0, "np = {}", np);
    }

    #[test]
    fn test_evicting_window_tracks_recent_np() {
        let mut w = PowerWindow::new(WindowOptions::default().with_period(300.0));
        feed(&mut w, 0, 600, 150.0);
        feed(&mut w, 600, 1200, 300.0);

        let np = w.np(false).unwrap();
        assert!((np - 300.0).abs() < 0.5, "np = {}", np);
        assert!((w.xp(false).unwrap() - 300.0).abs() < 5.0);
    }

    #[test]
    fn test_joules_and_tss() {
        let mut w = PowerWindow::new(WindowOptions::default());
        feed(&mut w, 0, 3601, 250.0);

        assert!((w.joules() - 900_000.0).abs() < 1e-6);
        let tss = calc_tss(250.0, 3600.0, 250.0).unwrap();
        assert!((tss - 100.0).abs() < 1e-9);
        assert_eq!(calc_tss(250.0, 3600.0, 0.0), None);
    }
}
