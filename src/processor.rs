//! Stats processor: sample ingestion, athlete queries and the nearby cycle.
//!
//! The processor owns the athlete registry. Ingestion mutates one athlete per
//! sample; [`StatsProcessor::run_cycle`] recomputes nearby riders and groups
//! for the watched athlete. Changes are published on a broadcast channel.

use crate::athlete::{
    AthleteData, AthleteProfile, AthleteRegistry, LapSummary, ProfileStore, StreamsSnapshot,
};
use crate::config::{AutoLapMetric, EngineConfig};
use crate::error::{CycleError, SampleError};
use crate::metrics::calculator::CollectorStats;
use crate::metrics::zones::ZoneTime;
use crate::nearby::{compute_groups, Group, NearbyAthlete, NearbyComputer};
use crate::road::CourseData;
use crate::sample::{Sample, ROAD_COMPLETION_SCALE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Segments start only when entered near their start.
const SEGMENT_START_WINDOW: f64 = 0.05;

/// Fields of the previous sample the ingest checks compare against.
#[derive(Debug, Clone, Copy)]
struct PreviousSample {
    time: f64,
    course_id: u32,
    distance: f64,
}

/// Processor events.
#[derive(Debug, Clone)]
pub enum StatsEvent {
    /// Nearby list from the latest cycle.
    Nearby(Arc<Vec<NearbyAthlete>>),
    /// Groups from the latest cycle.
    Groups(Arc<Vec<Group>>),
    /// A sample was recorded for this athlete.
    AthleteUpdated { athlete_id: u64 },
    /// The watched athlete changed.
    WatchingChanged { athlete_id: u64 },
}

/// Formatted view of one athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteSnapshot {
    pub athlete_id: u64,
    pub course_id: u32,
    /// Engine seconds at creation
    pub created: f64,
    /// Seconds since the last sample
    pub age: f64,
    pub watching: bool,
    pub profile: Option<AthleteProfile>,
    pub stats: CollectorStats,
    pub lap: Option<CollectorStats>,
    pub last_lap: Option<CollectorStats>,
    pub lap_count: usize,
    pub state: Option<Sample>,
    pub gap: Option<f64>,
    pub gap_distance: Option<f64>,
    pub is_gap_est: bool,
    pub wbal: Option<f64>,
    pub time_in_power_zones: Option<Vec<ZoneTime>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Filter for lap and segment queries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LapQuery {
    /// Only entries whose first committed time is at or after this
    pub start_time: Option<f64>,
    /// Include the entry in progress
    pub active: bool,
}

/// Processor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorCounters {
    pub processed: u64,
    pub duplicate: u64,
    pub stale: u64,
    pub malformed: u64,
}

/// Diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    #[serde(flatten)]
    pub counters: ProcessorCounters,
    pub athletes: usize,
    /// Entries held across every session window
    pub data_points: usize,
    pub watching: Option<u64>,
}

/// Central stats processor.
pub struct StatsProcessor {
    config: EngineConfig,
    profiles: Arc<dyn ProfileStore>,
    course: Arc<dyn CourseData>,
    registry: AthleteRegistry,
    watching: Option<u64>,
    enabled: bool,
    epoch: Instant,
    epoch_wall: DateTime<Utc>,
    counters: ProcessorCounters,
    nearby: Arc<Vec<NearbyAthlete>>,
    groups: Arc<Vec<Group>>,
    event_tx: broadcast::Sender<StatsEvent>,
}

impl StatsProcessor {
    /// Create a processor. Engine time starts at zero now.
    pub fn new(config: EngineConfig, profiles: Arc<dyn ProfileStore>, course: Arc<dyn CourseData>) -> Self {
        let (tx, _) = broadcast::channel(256);

        Self {
            config,
            profiles,
            course,
            registry: AthleteRegistry::new(),
            watching: None,
            enabled: true,
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
            counters: ProcessorCounters::default(),
            nearby: Arc::new(Vec::new()),
            groups: Arc::new(Vec::new()),
            event_tx: tx,
        }
    }

    /// Seconds since the processor was created.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall clock at engine time `now`.
    fn wall_clock(&self, now: f64) -> DateTime<Utc> {
        self.epoch_wall + chrono::Duration::milliseconds((now * 1000.0) as i64)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to processor events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatsEvent> {
        self.event_tx.subscribe()
    }

    /// Accept or refuse new samples.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            tracing::info!("Stats processor {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Currently watched athlete.
    pub fn watching(&self) -> Option<u64> {
        self.watching
    }

    pub fn counters(&self) -> ProcessorCounters {
        self.counters
    }

    /// Record a sample at the current engine time.
    pub fn ingest(&mut self, sample: Sample) -> Result<(), SampleError> {
        let now = self.now();
        self.ingest_at(sample, now)
    }

    /// Record a sample at engine time `now`.
    pub fn ingest_at(&mut self, sample: Sample, now: f64) -> Result<(), SampleError> {
        if !self.enabled {
            return Err(SampleError::Disabled);
        }
        if let Err(e) = sample.validate() {
            self.counters.malformed += 1;
            tracing::debug!("Dropping sample for {}: {}", sample.athlete_id, e);
            return Err(e);
        }

        let created_at = self.wall_clock(now);
        let (ad, created) = self.registry.get_or_create(sample.athlete_id, || {
            AthleteData::new(
                sample.athlete_id,
                sample.course_id,
                &self.config.collectors,
                now,
                created_at,
                sample.time,
            )
        });
        if created {
            let profile = self.profiles.profile(sample.athlete_id);
            ad.apply_profile(profile, self.config.wbal.default_w_prime, &self.config.zones);
            tracing::debug!("Tracking athlete {}", sample.athlete_id);
        }

        let prev = ad
            .most_recent
            .as_ref()
            .map(|s| PreviousSample {
                time: s.time,
                course_id: s.course_id,
                distance: s.distance,
            });
        if let Some(prev) = prev {
            let elapsed = sample.time - prev.time;
            if elapsed < 0.0 {
                self.counters.stale += 1;
                return Err(SampleError::Stale);
            } else if elapsed == 0.0 {
                self.counters.duplicate += 1;
                return Err(SampleError::Duplicate);
            }
            if prev.course_id != sample.course_id || sample.distance < prev.distance {
                ad.distance_offset += prev.distance;
                ad.course_id = sample.course_id;
                ad.auto_lap_mark = None;
                if self.config.laps.lap_on_course_change {
                    tracing::debug!("Course change lap for {}", ad.athlete_id);
                    ad.start_lap(now);
                }
            }
        }

        if let Some(auto_lap) = self.config.laps.auto_lap {
            let mark = match auto_lap.metric {
                AutoLapMetric::Distance => sample.distance,
                AutoLapMetric::Time => sample.time,
            };
            match ad.auto_lap_mark {
                None => ad.auto_lap_mark = Some(mark),
                Some(prev) if mark - prev >= auto_lap.interval => {
                    tracing::debug!("Auto lap triggered for {}", ad.athlete_id);
                    ad.auto_lap_mark = Some(mark);
                    ad.start_lap(now);
                }
                Some(_) => {}
            }
        }

        let signature = sample.road_signature();
        let p = sample.road_completion / ROAD_COMPLETION_SCALE;
        for segment in self.course.road_segments(&signature) {
            let progress = segment.progress(p, sample.reverse);
            if ad.segment_active(segment.id) {
                if progress.is_none() {
                    tracing::debug!("Segment {} finished by {}", segment.id, ad.athlete_id);
                    ad.stop_segment(segment.id, now);
                }
            } else if progress.is_some_and(|x| x < SEGMENT_START_WINDOW) {
                tracing::debug!("Segment {} started by {}", segment.id, ad.athlete_id);
                ad.start_segment(segment, now);
            }
        }

        ad.road.record(sample.time, signature, sample.road_completion, sample.distance);
        ad.road.set_latlng(sample.latlng);

        // W' balance is biometric: never paused, keyed to absolute time.
        let wbal = ad.wbal.accumulate(sample.time, sample.power);
        let count = if sample.power == 0.0 && sample.speed == 0.0 {
            ad.flush_collectors()
        } else {
            let time = ad.relative_time(&sample);
            ad.zones.accumulate(time, sample.power);
            ad.add_to_collectors(time, &sample)
        };
        let distance = ad.distance_offset + sample.distance;
        for _ in 0..count {
            ad.streams.distance.push(distance);
            ad.streams.wbal.push(wbal);
            ad.streams.latlng.push(sample.latlng);
        }

        let athlete_id = sample.athlete_id;
        ad.most_recent = Some(sample);
        ad.updated = now;
        self.counters.processed += 1;
        let _ = self.event_tx.send(StatsEvent::AthleteUpdated { athlete_id });
        Ok(())
    }

    /// Watch `athlete_id`. Gap state of every athlete is cleared.
    pub fn set_watching(&mut self, athlete_id: u64) {
        if self.watching == Some(athlete_id) {
            return;
        }
        tracing::info!("Now watching: {}", athlete_id);
        self.watching = Some(athlete_id);
        for ad in self.registry.iter_mut() {
            ad.gap = Default::default();
        }
        let _ = self.event_tx.send(StatsEvent::WatchingChanged { athlete_id });
    }

    /// Start a new lap for every athlete.
    pub fn start_lap(&mut self) {
        let now = self.now();
        self.start_lap_at(now);
    }

    pub fn start_lap_at(&mut self, now: f64) {
        tracing::debug!("Starting new lap...");
        for ad in self.registry.iter_mut() {
            ad.start_lap(now);
        }
    }

    /// Start a new lap for one athlete. Returns false if unknown.
    pub fn start_athlete_lap(&mut self, athlete_id: u64) -> bool {
        let now = self.now();
        self.start_athlete_lap_at(athlete_id, now)
    }

    pub fn start_athlete_lap_at(&mut self, athlete_id: u64, now: f64) -> bool {
        match self.registry.get_mut(athlete_id) {
            Some(ad) => {
                ad.start_lap(now);
                true
            }
            None => false,
        }
    }

    /// Reset collectors, laps, segments, zones and streams of every athlete.
    pub fn reset_stats(&mut self) {
        let now = self.now();
        self.reset_stats_at(now);
    }

    pub fn reset_stats_at(&mut self, now: f64) {
        tracing::info!("Resetting stats for {} athletes", self.registry.len());
        let created_at = self.wall_clock(now);
        for ad in self.registry.iter_mut() {
            ad.reset(&self.config.collectors, now, created_at);
        }
    }

    /// Replace an athlete's profile. Returns false if unknown.
    pub fn set_profile(&mut self, athlete_id: u64, profile: AthleteProfile) -> bool {
        match self.registry.get_mut(athlete_id) {
            Some(ad) => {
                ad.apply_profile(Some(profile), self.config.wbal.default_w_prime, &self.config.zones);
                true
            }
            None => false,
        }
    }

    /// Drop athletes idle longer than the configured timeout.
    pub fn gc_athlete_data(&mut self) -> Vec<u64> {
        let now = self.now();
        self.gc_athlete_data_at(now)
    }

    pub fn gc_athlete_data_at(&mut self, now: f64) -> Vec<u64> {
        let removed = self
            .registry
            .gc(now, self.config.registry.idle_timeout_secs);
        for id in &removed {
            tracing::debug!("Dropped idle athlete {}", id);
        }
        removed
    }

    /// Recompute nearby riders and groups for the watched athlete.
    pub fn run_cycle(&mut self) -> Result<(), CycleError> {
        let now = self.now();
        self.run_cycle_at(now)
    }

    pub fn run_cycle_at(&mut self, now: f64) -> Result<(), CycleError> {
        let Some(watching) = self.watching else {
            return Ok(());
        };
        let nearby = NearbyComputer::new(self.course.as_ref(), &self.config.nearby)
            .compute(&mut self.registry, watching, now)?;
        let groups = compute_groups(&nearby, self.config.nearby.group_gap_secs);
        self.nearby = Arc::new(nearby);
        self.groups = Arc::new(groups);
        let _ = self.event_tx.send(StatsEvent::Nearby(Arc::clone(&self.nearby)));
        let _ = self.event_tx.send(StatsEvent::Groups(Arc::clone(&self.groups)));
        Ok(())
    }

    fn snapshot(&self, ad: &AthleteData, now: f64) -> AthleteSnapshot {
        let ftp = ad.profile.as_ref().and_then(|p| p.ftp);
        let lap_stats = |i: usize| {
            ad.laps
                .get(i)
                .map(|lap| lap.collectors.stats(now, ad.created_at, ftp))
        };
        let lap_count = ad.laps.len();
        AthleteSnapshot {
            athlete_id: ad.athlete_id,
            course_id: ad.course_id,
            created: ad.created,
            age: now - ad.updated,
            watching: self.watching == Some(ad.athlete_id),
            profile: ad.profile.clone(),
            stats: ad.collectors.stats(now, ad.created_at, ftp),
            lap: lap_count.checked_sub(1).and_then(lap_stats),
            last_lap: lap_count.checked_sub(2).and_then(lap_stats),
            lap_count,
            state: ad.most_recent.clone(),
            gap: ad.gap.gap,
            gap_distance: ad.gap.gap_distance,
            is_gap_est: ad.gap.is_gap_est,
            wbal: ad.wbal.get(),
            time_in_power_zones: ad.zones.get(),
            extra: ad.extra.clone(),
        }
    }

    /// Snapshot of one athlete.
    pub fn get_athlete_data(&self, athlete_id: u64) -> Option<AthleteSnapshot> {
        self.get_athlete_data_at(athlete_id, self.now())
    }

    pub fn get_athlete_data_at(&self, athlete_id: u64, now: f64) -> Option<AthleteSnapshot> {
        self.registry
            .get(athlete_id)
            .map(|ad| self.snapshot(ad, now))
    }

    /// Snapshots of the given athletes, or of every athlete.
    pub fn get_athletes_data(&self, ids: Option<&[u64]>) -> Vec<AthleteSnapshot> {
        let now = self.now();
        match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.registry.get(*id))
                .map(|ad| self.snapshot(ad, now))
                .collect(),
            None => {
                let mut all: Vec<AthleteSnapshot> = self
                    .registry
                    .iter()
                    .map(|ad| self.snapshot(ad, now))
                    .collect();
                all.sort_by_key(|x| x.athlete_id);
                all
            }
        }
    }

    /// Session statistics of one athlete.
    pub fn get_stats(&self, athlete_id: u64) -> Option<CollectorStats> {
        self.get_stats_at(athlete_id, self.now())
    }

    pub fn get_stats_at(&self, athlete_id: u64, now: f64) -> Option<CollectorStats> {
        let ad = self.registry.get(athlete_id)?;
        let ftp = ad.profile.as_ref().and_then(|p| p.ftp);
        Some(ad.collectors.stats(now, ad.created_at, ftp))
    }

    /// Merge caller fields into an athlete's snapshot.
    pub fn update_athlete_data(
        &mut self,
        athlete_id: u64,
        updates: serde_json::Map<String, serde_json::Value>,
    ) -> Option<AthleteSnapshot> {
        let ad = self.registry.get_mut(athlete_id)?;
        ad.extra.extend(updates);
        self.get_athlete_data(athlete_id)
    }

    /// Laps of one athlete.
    pub fn get_athlete_laps(&self, athlete_id: u64, query: LapQuery) -> Option<Vec<LapSummary>> {
        let now = self.now();
        let ad = self.registry.get(athlete_id)?;
        let laps: Vec<&crate::athlete::Lap> = ad
            .laps
            .iter()
            .filter(|lap| starts_after(&lap.collectors, query.start_time))
            .collect();
        let keep = visible_count(laps.iter().map(|lap| lap.collectors.end), query.active);
        Some(
            laps[..keep]
                .iter()
                .map(|lap| ad.summarize(&lap.collectors, lap.course_id, now))
                .collect(),
        )
    }

    /// Segment efforts of one athlete.
    pub fn get_athlete_segments(&self, athlete_id: u64, query: LapQuery) -> Option<Vec<LapSummary>> {
        let now = self.now();
        let ad = self.registry.get(athlete_id)?;
        let efforts: Vec<&crate::athlete::SegmentEffort> = ad
            .segments
            .iter()
            .filter(|s| starts_after(&s.collectors, query.start_time))
            .collect();
        let keep = visible_count(efforts.iter().map(|s| s.collectors.end), query.active);
        Some(
            efforts[..keep]
                .iter()
                .map(|s| LapSummary {
                    segment_id: Some(s.segment.id),
                    segment_name: Some(s.segment.name.clone()),
                    ..ad.summarize(&s.collectors, s.course_id, now)
                })
                .collect(),
        )
    }

    /// Session streams of one athlete from `start_time` onward.
    pub fn get_athlete_streams(&self, athlete_id: u64, start_time: Option<f64>) -> Option<StreamsSnapshot> {
        self.registry
            .get(athlete_id)
            .map(|ad| ad.streams_from(start_time))
    }

    /// Nearby list from the latest cycle.
    pub fn get_nearby_data(&self) -> Arc<Vec<NearbyAthlete>> {
        Arc::clone(&self.nearby)
    }

    /// Groups from the latest cycle.
    pub fn get_groups_data(&self) -> Arc<Vec<Group>> {
        Arc::clone(&self.groups)
    }

    pub fn debug_info(&self) -> DebugInfo {
        let data_points = self
            .registry
            .iter()
            .map(|ad| {
                let c = &ad.collectors;
                c.power.roll().size()
                    + c.speed.roll().size()
                    + c.hr.roll().size()
                    + c.cadence.roll().size()
                    + c.draft.roll().size()
            })
            .sum();
        DebugInfo {
            counters: self.counters,
            athletes: self.registry.len(),
            data_points,
            watching: self.watching,
        }
    }
}

fn starts_after(cs: &crate::metrics::CollectorSet, start_time: Option<f64>) -> bool {
    match start_time {
        Some(start) => cs.power.roll().first_time().is_some_and(|t| t >= start),
        None => true,
    }
}

/// How many entries to report: the trailing one is dropped when it is still
/// open and open entries were not asked for.
fn visible_count(ends: impl ExactSizeIterator<Item = Option<f64>>, active: bool) -> usize {
    let len = ends.len();
    match ends.last() {
        Some(None) if !active => len - 1,
        _ => len,
    }
}
