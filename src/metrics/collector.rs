//! Peak tracking over several fixed-duration windows.
//!
//! A [`PeakTracker`] feeds every committed point into one unbounded window
//! (overall average) and one window per tracked duration. Whenever a
//! duration's window is full its average is compared to the best seen so far;
//! ties replace the record so peaks point at the most recent occurrence.

use super::rolling::{Accumulation, Mean, RollingWindow, SampleBuffer, SampleValue, WindowOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Best window average seen for one duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Window average
    pub avg: f64,
    /// End of the window, seconds since the athlete was first seen
    pub time: f64,
}

/// A peak as reported to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakStat {
    pub avg: Option<f64>,
    pub time: Option<f64>,
    /// Wall-clock end of the window
    pub ts: Option<DateTime<Utc>>,
}

/// Summary of one data series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    /// Overall average
    pub avg: Option<f64>,
    /// Largest single committed value
    pub max: f64,
    /// Best average per duration in seconds
    pub peaks: BTreeMap<u32, PeakStat>,
    /// Current average per duration in seconds
    pub smooth: BTreeMap<u32, Option<f64>>,
}

#[derive(Debug, Clone)]
struct Periodized<A: Accumulation> {
    period: u32,
    roll: RollingWindow<A>,
    peak: Option<PeakRecord>,
}

impl<A: Accumulation> Periodized<A> {
    fn update_peak(&mut self) {
        if !self.roll.full() {
            return;
        }
        let (Some(avg), Some(time)) = (self.roll.avg(), self.roll.last_time()) else {
            return;
        };
        match self.peak {
            Some(peak) if avg < peak.avg => {}
            _ => self.peak = Some(PeakRecord { avg, time }),
        }
    }
}

/// Buffered series with overall average, running max and per-duration peaks.
#[derive(Debug, Clone)]
pub struct PeakTracker<A: Accumulation = Mean> {
    round: bool,
    buffer: SampleBuffer,
    roll: RollingWindow<A>,
    periodized: Vec<Periodized<A>>,
    max_value: f64,
}

impl<A: Accumulation> PeakTracker<A> {
    /// Create a tracker. `options.period` is ignored for the overall window.
    pub fn new(options: WindowOptions, periods: &[u32], round: bool) -> Self {
        let base = WindowOptions {
            period: None,
            ..options
        };
        Self {
            round,
            buffer: SampleBuffer::default(),
            roll: RollingWindow::new(base),
            periodized: periods
                .iter()
                .map(|&period| Periodized {
                    period,
                    roll: RollingWindow::new(base.with_period(f64::from(period))),
                    peak: None,
                })
                .collect(),
            max_value: 0.0,
        }
    }

    /// Buffer a raw sample. Returns the number of entries committed to the
    /// overall window, pads included.
    pub fn add(&mut self, time: f64, value: f64) -> usize {
        let ideal_gap = self.roll.options().ideal_gap;
        match self.buffer.offer(time, value, ideal_gap) {
            Some((t, v)) => self.commit(t, v),
            None => 0,
        }
    }

    /// Commit whatever is buffered.
    pub fn flush_buffered(&mut self) -> usize {
        match self.buffer.take() {
            Some((t, v)) => self.commit(t, v),
            None => 0,
        }
    }

    fn commit(&mut self, time: f64, value: f64) -> usize {
        let value = if self.round { value.round() } else { value };
        let count = self.roll.commit(time, SampleValue::Sample(value));
        if count > 0 && value > self.max_value {
            self.max_value = value;
        }
        for p in &mut self.periodized {
            p.roll.commit(time, SampleValue::Sample(value));
            p.update_peak();
        }
        count
    }

    /// Advance elapsed-time windows to wall clock `now` and re-check peaks.
    pub fn resize(&mut self, now: f64) {
        self.roll.resize(now);
        for p in &mut self.periodized {
            p.roll.resize(now);
            p.update_peak();
        }
    }

    /// Independent copy; with `reset` only configuration is kept.
    pub fn fork(&self, reset: bool) -> Self {
        if !reset {
            return self.clone();
        }
        Self {
            round: self.round,
            buffer: SampleBuffer::default(),
            roll: self.roll.fork(true),
            periodized: self
                .periodized
                .iter()
                .map(|p| Periodized {
                    period: p.period,
                    roll: p.roll.fork(true),
                    peak: None,
                })
                .collect(),
            max_value: 0.0,
        }
    }

    /// Overall window.
    pub fn roll(&self) -> &RollingWindow<A> {
        &self.roll
    }

    /// Window tracking `period` seconds, if configured.
    pub fn period_roll(&self, period: u32) -> Option<&RollingWindow<A>> {
        self.periodized
            .iter()
            .find(|p| p.period == period)
            .map(|p| &p.roll)
    }

    /// Best record for `period` seconds.
    pub fn peak(&self, period: u32) -> Option<PeakRecord> {
        self.periodized
            .iter()
            .find(|p| p.period == period)
            .and_then(|p| p.peak)
    }

    /// Largest committed value.
    pub fn max(&self) -> f64 {
        self.max_value
    }

    /// Summary with peak timestamps relative to `origin` (when time was zero).
    pub fn stats(&self, origin: DateTime<Utc>) -> SeriesStats {
        let mut peaks = BTreeMap::new();
        let mut smooth = BTreeMap::new();
        for p in &self.periodized {
            let stat = match p.peak {
                Some(peak) => PeakStat {
                    avg: Some(peak.avg),
                    time: Some(peak.time),
                    ts: Some(origin + chrono::Duration::milliseconds((peak.time * 1000.0) as i64)),
                },
                None => PeakStat::default(),
            };
            peaks.insert(p.period, stat);
            smooth.insert(p.period, p.roll.avg());
        }
        SeriesStats {
            avg: self.roll.avg(),
            max: self.max_value,
            peaks,
            smooth,
        }
    }
}
