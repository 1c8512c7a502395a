//! Per-athlete aggregate state.

use super::profile::AthleteProfile;
use crate::config::{CollectorSettings, ZoneSettings};
use crate::metrics::calculator::{CollectorSet, CollectorStats};
use crate::metrics::rolling::SampleValue;
use crate::metrics::PeakTracker;
use crate::metrics::wbal::WBalAccumulator;
use crate::metrics::zones::{zone_definitions, ZoneAccumulator};
use crate::road::{RoadPositionTracker, RoadSegment};
use crate::sample::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lap: a collector set forked from the session when it started.
#[derive(Debug, Clone)]
pub struct Lap {
    pub collectors: CollectorSet,
    pub course_id: u32,
}

/// A segment effort keyed to road-position crossings.
#[derive(Debug, Clone)]
pub struct SegmentEffort {
    pub segment: RoadSegment,
    pub collectors: CollectorSet,
    pub course_id: u32,
}

/// Streams not owned by a collector, one value per committed power entry.
#[derive(Debug, Clone, Default)]
pub struct AthleteStreams {
    pub distance: Vec<f64>,
    pub wbal: Vec<Option<f64>>,
    pub latlng: Vec<Option<[f64; 2]>>,
}

/// Gap of this athlete to the watched athlete from the last cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapState {
    /// Seconds; positive is behind the watched athlete
    pub gap: Option<f64>,
    /// Meters; positive is behind the watched athlete
    pub gap_distance: Option<f64>,
    pub is_gap_est: bool,
}

/// Formatted lap or segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapSummary {
    pub stats: CollectorStats,
    /// First committed time, athlete-relative seconds
    pub start_time: Option<f64>,
    /// Last committed time, athlete-relative seconds
    pub end_time: Option<f64>,
    pub course_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_name: Option<String>,
}

/// Everything the engine knows about one athlete.
#[derive(Debug, Clone)]
pub struct AthleteData {
    pub athlete_id: u64,
    /// Course of the most recent sample
    pub course_id: u32,
    /// Engine seconds at creation (or last reset)
    pub created: f64,
    /// Wall clock at creation (or last reset)
    pub created_at: DateTime<Utc>,
    /// Sample time that maps to collector time zero
    pub time_offset: f64,
    /// Engine seconds of the last accepted sample
    pub updated: f64,
    pub collectors: CollectorSet,
    /// Ordered laps; the last one is in progress
    pub laps: Vec<Lap>,
    pub segments: Vec<SegmentEffort>,
    /// Indices into `segments` of efforts in progress
    pub active_segments: Vec<usize>,
    pub road: RoadPositionTracker,
    pub wbal: WBalAccumulator,
    pub zones: ZoneAccumulator,
    pub most_recent: Option<Sample>,
    /// Added to the sample distance after course changes
    pub distance_offset: f64,
    pub auto_lap_mark: Option<f64>,
    pub streams: AthleteStreams,
    pub gap: GapState,
    pub profile: Option<AthleteProfile>,
    /// Caller-supplied fields merged into snapshots
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AthleteData {
    /// New athlete first seen at sample time `time_offset`.
    pub fn new(
        athlete_id: u64,
        course_id: u32,
        settings: &CollectorSettings,
        now: f64,
        created_at: DateTime<Utc>,
        time_offset: f64,
    ) -> Self {
        let collectors = CollectorSet::new(settings, now);
        let lap = collectors.fork(true, now);
        Self {
            athlete_id,
            course_id,
            created: now,
            created_at,
            time_offset,
            updated: now,
            collectors,
            laps: vec![Lap {
                collectors: lap,
                course_id,
            }],
            segments: Vec::new(),
            active_segments: Vec::new(),
            road: RoadPositionTracker::new(),
            wbal: WBalAccumulator::new(),
            zones: ZoneAccumulator::new(),
            most_recent: None,
            distance_offset: 0.0,
            auto_lap_mark: None,
            streams: AthleteStreams::default(),
            gap: GapState::default(),
            profile: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Apply a profile: W' model and zones follow CP/FTP.
    pub fn apply_profile(&mut self, profile: Option<AthleteProfile>, default_w_prime: f64, zones: &ZoneSettings) {
        let cp = profile.as_ref().and_then(AthleteProfile::effective_cp);
        let w_prime = cp.map(|_| {
            profile
                .as_ref()
                .and_then(|p| p.w_prime)
                .filter(|w| *w > 0.0)
                .unwrap_or(default_w_prime)
        });
        let current = self.wbal.model();
        if current.map(|m| m.cp) != cp || current.map(|m| m.w_prime) != w_prime {
            self.wbal.configure(cp, w_prime);
        }
        let ftp = profile.as_ref().and_then(|p| p.ftp);
        self.zones.configure(ftp, &zone_definitions(zones));
        self.profile = profile;
    }

    /// Collector time of a sample.
    pub fn relative_time(&self, sample: &Sample) -> f64 {
        sample.time - self.time_offset
    }

    /// The lap in progress.
    pub fn current_lap(&self) -> Option<&Lap> {
        self.laps.last()
    }

    /// End the current lap at engine time `now` and start a new one.
    pub fn start_lap(&mut self, now: f64) {
        if let Some(last) = self.laps.last_mut() {
            last.collectors.flush_buffered();
            last.collectors.end = Some(now);
        }
        let course_id = self.course_id;
        self.laps.push(Lap {
            collectors: self.collectors.fork(true, now),
            course_id,
        });
    }

    /// Start an effort on `segment`.
    pub fn start_segment(&mut self, segment: RoadSegment, now: f64) {
        let course_id = self.course_id;
        self.segments.push(SegmentEffort {
            segment,
            collectors: self.collectors.fork(true, now),
            course_id,
        });
        self.active_segments.push(self.segments.len() - 1);
    }

    /// End the effort in progress on segment `id`.
    pub fn stop_segment(&mut self, id: u64, now: f64) {
        let segments = &mut self.segments;
        self.active_segments.retain(|&i| match segments.get_mut(i) {
            Some(effort) if effort.segment.id == id => {
                effort.collectors.flush_buffered();
                effort.collectors.end = Some(now);
                false
            }
            _ => true,
        });
    }

    /// Whether an effort on segment `id` is in progress.
    pub fn segment_active(&self, id: u64) -> bool {
        self.active_segments
            .iter()
            .any(|&i| self.segments.get(i).is_some_and(|s| s.segment.id == id))
    }

    /// Fresh collectors, laps, segments, zone tallies and streams. W' balance
    /// is kept.
    pub fn reset(&mut self, settings: &CollectorSettings, now: f64, created_at: DateTime<Utc>) {
        self.collectors = CollectorSet::new(settings, now);
        let course_id = self.course_id;
        self.laps = vec![Lap {
            collectors: self.collectors.fork(true, now),
            course_id,
        }];
        self.segments.clear();
        self.active_segments.clear();
        self.zones.reset();
        self.streams = AthleteStreams::default();
        self.created = now;
        self.created_at = created_at;
        if let Some(s) = &self.most_recent {
            self.time_offset = s.time;
        }
    }

    /// Feed a sample into every collector set. Returns the number of
    /// session entries committed.
    pub fn add_to_collectors(&mut self, time: f64, sample: &Sample) -> usize {
        let count = self.collectors.add(time, sample);
        if let Some(lap) = self.laps.last_mut() {
            lap.collectors.add(time, sample);
            lap.collectors.resize(time);
        }
        for &i in &self.active_segments {
            if let Some(effort) = self.segments.get_mut(i) {
                effort.collectors.add(time, sample);
                effort.collectors.resize(time);
            }
        }
        count
    }

    /// Commit buffered samples of every collector set.
    pub fn flush_collectors(&mut self) -> usize {
        let count = self.collectors.flush_buffered();
        if let Some(lap) = self.laps.last_mut() {
            lap.collectors.flush_buffered();
        }
        for &i in &self.active_segments {
            if let Some(effort) = self.segments.get_mut(i) {
                effort.collectors.flush_buffered();
            }
        }
        count
    }

    /// Format a collector set as a lap or segment summary.
    pub fn summarize(&self, cs: &CollectorSet, course_id: u32, now: f64) -> LapSummary {
        let ftp = self.profile.as_ref().and_then(|p| p.ftp);
        LapSummary {
            stats: cs.stats(now, self.created_at, ftp),
            start_time: cs.power.roll().first_time(),
            end_time: cs.power.roll().last_time(),
            course_id,
            segment_id: None,
            segment_name: None,
        }
    }

    /// Session streams from `start_time` (athlete-relative) onward.
    pub fn streams_from(&self, start_time: Option<f64>) -> StreamsSnapshot {
        let roll = self.collectors.power.roll();
        let offset = match start_time {
            Some(start) => roll
                .entries()
                .position(|(t, _)| t >= start)
                .unwrap_or(roll.size()),
            None => 0,
        };
        let values = |tracker: &PeakTracker| -> Vec<f64> {
            tracker
                .roll()
                .entries()
                .skip(offset)
                .map(|(_, v)| v.value())
                .collect()
        };
        let power: Vec<(f64, SampleValue)> = roll.entries().skip(offset).collect();
        StreamsSnapshot {
            time: power.iter().map(|(t, _)| *t).collect(),
            active: power
                .iter()
                .map(|(_, v)| matches!(v, SampleValue::Sample(_)))
                .collect(),
            power: power.iter().map(|(_, v)| v.value()).collect(),
            speed: values(&self.collectors.speed),
            hr: values(&self.collectors.hr),
            cadence: values(&self.collectors.cadence),
            draft: values(&self.collectors.draft),
            distance: self.streams.distance.iter().skip(offset).copied().collect(),
            wbal: self.streams.wbal.iter().skip(offset).copied().collect(),
            latlng: self.streams.latlng.iter().skip(offset).copied().collect(),
        }
    }
}

/// Column-oriented session data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamsSnapshot {
    pub time: Vec<f64>,
    pub power: Vec<f64>,
    pub speed: Vec<f64>,
    pub hr: Vec<f64>,
    pub cadence: Vec<f64>,
    pub draft: Vec<f64>,
    /// False for pause padding
    pub active: Vec<bool>,
    pub distance: Vec<f64>,
    pub wbal: Vec<Option<f64>>,
    pub latlng: Vec<Option<[f64; 2]>>,
}
