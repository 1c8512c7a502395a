//! Collector sets: one peak tracker per data series.
//!
//! An athlete keeps a session-wide set plus one per lap and one per active
//! segment. Each set is fed independently so it can be forked or reset
//! without touching the others.

use super::collector::{PeakTracker, SeriesStats};
use super::power::{calc_tss, PowerAccumulation};
use super::rolling::WindowOptions;
use crate::config::CollectorSettings;
use crate::sample::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Power series summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerStats {
    #[serde(flatten)]
    pub series: SeriesStats,
    /// Normalized Power (forced, so short efforts report too)
    pub np: Option<f64>,
    /// xPower (forced)
    pub xp: Option<f64>,
    /// Training Stress Score; requires FTP
    pub tss: Option<f64>,
    /// Work in kilojoules
    pub kj: f64,
}

/// Draft series summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftStats {
    #[serde(flatten)]
    pub series: SeriesStats,
    /// Energy saved by drafting, in kilojoules
    pub kj: f64,
}

/// Statistics of one collector set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStats {
    /// Engine seconds when the set started
    pub start: f64,
    /// Engine seconds when the set ended, if it has
    pub end: Option<f64>,
    pub elapsed_time: f64,
    pub active_time: f64,
    pub power: PowerStats,
    pub speed: SeriesStats,
    pub hr: SeriesStats,
    pub cadence: SeriesStats,
    pub draft: DraftStats,
}

/// Peak trackers for every series of one athlete.
#[derive(Debug, Clone)]
pub struct CollectorSet {
    /// Engine seconds when this set started
    pub start: f64,
    /// Engine seconds when this set ended
    pub end: Option<f64>,
    pub power: PeakTracker<PowerAccumulation>,
    pub speed: PeakTracker,
    pub hr: PeakTracker,
    pub cadence: PeakTracker,
    pub draft: PeakTracker,
}

impl CollectorSet {
    /// Fresh collectors starting at engine time `start`.
    pub fn new(settings: &CollectorSettings, start: f64) -> Self {
        let base = WindowOptions {
            period: None,
            ideal_gap: settings.ideal_gap,
            max_gap: settings.max_gap,
            active: true,
            ignore_zeros: false,
        };
        let sparse = WindowOptions {
            ignore_zeros: true,
            ..base
        };
        Self {
            start,
            end: None,
            power: PeakTracker::new(base, &settings.power_periods, true),
            speed: PeakTracker::new(sparse, &settings.long_periods, false),
            hr: PeakTracker::new(sparse, &settings.long_periods, true),
            cadence: PeakTracker::new(sparse, &[], true),
            draft: PeakTracker::new(base, &settings.long_periods, true),
        }
    }

    /// Add a sample at athlete-relative `time`. Returns the number of power
    /// entries committed.
    pub fn add(&mut self, time: f64, sample: &Sample) -> usize {
        let count = self.power.add(time, sample.power);
        self.speed.add(time, sample.speed);
        self.hr.add(time, sample.heartrate.unwrap_or(0.0));
        self.cadence.add(time, sample.cadence.unwrap_or(0.0));
        self.draft.add(time, sample.draft.unwrap_or(0.0));
        count
    }

    /// Commit buffered samples of every series. Returns the number of power
    /// entries committed.
    pub fn flush_buffered(&mut self) -> usize {
        let count = self.power.flush_buffered();
        if count > 0 {
            self.speed.flush_buffered();
            self.hr.flush_buffered();
            self.cadence.flush_buffered();
            self.draft.flush_buffered();
        }
        count
    }

    /// Advance elapsed-time windows to athlete-relative `time`.
    pub fn resize(&mut self, time: f64) {
        self.power.resize(time);
        self.speed.resize(time);
        self.hr.resize(time);
        self.cadence.resize(time);
        self.draft.resize(time);
    }

    /// Independent copy. With `reset` the copy starts empty at `now`;
    /// otherwise it continues the live state.
    pub fn fork(&self, reset: bool, now: f64) -> Self {
        Self {
            start: if reset { now } else { self.start },
            end: if reset { None } else { self.end },
            power: self.power.fork(reset),
            speed: self.speed.fork(reset),
            hr: self.hr.fork(reset),
            cadence: self.cadence.fork(reset),
            draft: self.draft.fork(reset),
        }
    }

    /// Summaries. `now` closes open sets; `origin` anchors peak timestamps.
    pub fn stats(&self, now: f64, origin: DateTime<Utc>, ftp: Option<f64>) -> CollectorStats {
        let end = self.end.unwrap_or(now);
        let roll = self.power.roll();
        let np = roll.np(true);
        let active_time = roll.active();
        let tss = match (np, ftp) {
            (Some(np), Some(ftp)) => calc_tss(np, active_time, ftp),
            _ => None,
        };

        CollectorStats {
            start: self.start,
            end: self.end,
            elapsed_time: (end - self.start).max(0.0),
            active_time,
            power: PowerStats {
                series: self.power.stats(origin),
                np,
                xp: roll.xp(true),
                tss,
                kj: roll.joules() / 1000.0,
            },
            speed: self.speed.stats(origin),
            hr: self.hr.stats(origin),
            cadence: self.cadence.stats(origin),
            draft: DraftStats {
                series: self.draft.stats(origin),
                kj: self.draft.roll().values_sum() / 1000.0,
            },
        }
    }
}
