//! Integration tests for the background stats engine.

use rideview::config::EngineConfig;
use rideview::road::{RoadSegment, RoadSignature};
use rideview::{
    CourseData, EngineError, InMemoryCourseData, InMemoryProfileStore, Sample, StatsEngine, StatsEvent,
    StatsProcessor,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const HEALTHY: u8 = 0;
const CORRUPT: u8 = 1;
const PANICKING: u8 = 2;

/// Course data whose road length can be switched to garbage or a panic.
struct FlakyCourse {
    mode: AtomicU8,
}

impl FlakyCourse {
    fn new(mode: u8) -> Arc<Self> {
        Arc::new(Self {
            mode: AtomicU8::new(mode),
        })
    }

    fn set(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }
}

impl CourseData for FlakyCourse {
    fn road_length(&self, _signature: &RoadSignature) -> Option<f64> {
        match self.mode.load(Ordering::SeqCst) {
            CORRUPT => Some(f64::NAN),
            PANICKING => panic!("course data unavailable"),
            _ => Some(10_000.0),
        }
    }

    fn road_segments(&self, _signature: &RoadSignature) -> Vec<RoadSegment> {
        Vec::new()
    }
}

fn engine(config: EngineConfig) -> StatsEngine {
    let mut course = InMemoryCourseData::new();
    course.set_road_length(6, 1, 10_000.0);
    StatsEngine::new(StatsProcessor::new(
        config,
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(course),
    ))
}

fn sample(athlete_id: u64, time: f64) -> Sample {
    Sample {
        athlete_id,
        time,
        power: 200.0,
        speed: 36.0,
        heartrate: None,
        cadence: None,
        draft: None,
        road_id: 1,
        course_id: 6,
        reverse: false,
        road_completion: 100_000.0 + time * 1000.0,
        distance: time * 10.0,
        latlng: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_cycle_publishes_nearby_and_groups() {
    let mut engine = engine(EngineConfig::default());
    let mut rx = {
        let mut p = engine.lock();
        p.set_watching(1);
        for t in 0..5 {
            p.ingest(sample(1, f64::from(t))).unwrap();
        }
        p.subscribe()
    };
    engine.start().unwrap();

    let (mut nearby, mut groups) = (false, false);
    while !(nearby && groups) {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(StatsEvent::Nearby(rows))) => {
                assert_eq!(rows.len(), 1);
                assert!(rows[0].watching);
                nearby = true;
            }
            Ok(Ok(StatsEvent::Groups(g))) => {
                assert_eq!(g.len(), 1);
                groups = true;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event stream failed: {}", e),
            Err(_) => panic!("no cycle output within 5s"),
        }
    }
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_fails() {
    let mut engine = engine(EngineConfig::default());
    engine.start().unwrap();
    assert!(engine.is_running());
    assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

    engine.stop();
    assert!(!engine.is_running());
}

#[test]
fn test_start_without_runtime() {
    let mut engine = engine(EngineConfig::default());
    assert!(matches!(engine.start(), Err(EngineError::NoRuntime(_))));
    assert!(!engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_gc_drops_idle_athletes() {
    let mut config = EngineConfig::default();
    config.registry.idle_timeout_secs = 5.0;
    config.registry.gc_interval_secs = 10;
    let mut engine = engine(config);
    engine.lock().ingest(sample(9, 0.0)).unwrap();
    assert_eq!(engine.lock().debug_info().athletes, 1);

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert_eq!(engine.lock().debug_info().athletes, 0);
    engine.stop();
}

/// Watched rider 1 plus rider 2 far ahead with no shared history, so rider
/// 2's gap is estimated from the road length every cycle.
fn flaky_engine(course: Arc<FlakyCourse>) -> (StatsEngine, broadcast::Receiver<StatsEvent>) {
    let mut config = EngineConfig::default();
    config.nearby.stale_after_secs = 3600.0;
    let engine = StatsEngine::new(StatsProcessor::new(config, Arc::new(InMemoryProfileStore::new()), course));
    let rx = {
        let mut p = engine.lock();
        p.set_watching(1);
        for t in 0..5 {
            p.ingest(sample(1, f64::from(t))).unwrap();
        }
        p.ingest(Sample {
            road_completion: 200_000.0,
            ..sample(2, 0.0)
        })
        .unwrap();
        p.subscribe()
    };
    (engine, rx)
}

/// Seconds after `t0` at which the next nearby list is published.
async fn next_nearby(rx: &mut broadcast::Receiver<StatsEvent>, t0: Instant) -> f64 {
    loop {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Ok(StatsEvent::Nearby(_))) => return t0.elapsed().as_secs_f64(),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event stream failed: {}", e),
            Err(_) => panic!("no nearby list within 30s"),
        }
    }
}

fn assert_near(actual: f64, expected: f64) {
    assert!(
        actual >= expected && actual < expected + 0.05,
        "published at {}s, expected {}s",
        actual,
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn test_stalled_cycle_skips_missed_ticks() {
    let (mut engine, mut rx) = flaky_engine(FlakyCourse::new(HEALTHY));
    let t0 = Instant::now();
    engine.start().unwrap();
    assert_near(next_nearby(&mut rx, t0).await, 1.0);

    // The cycle due at 2s only gets to run at 5.5s.
    tokio::time::advance(Duration::from_millis(4500)).await;

    let mut published = Vec::new();
    let until = t0 + Duration::from_millis(7500);
    while let Ok(event) = tokio::time::timeout_at(until, rx.recv()).await {
        match event {
            Ok(StatsEvent::Nearby(_)) => published.push(t0.elapsed().as_secs_f64()),
            Ok(_) => {}
            Err(e) => panic!("event stream failed: {}", e),
        }
    }

    // One late cycle, the 3s/4s/5s ticks skipped, then back on the whole
    // second grid.
    assert_eq!(published.len(), 3, "{:?}", published);
    assert_near(published[0], 5.5);
    assert_near(published[1], 6.0);
    assert_near(published[2], 7.0);
    assert!(engine.is_running());
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_backs_off_then_resets() {
    let course = FlakyCourse::new(CORRUPT);
    let (mut engine, mut rx) = flaky_engine(Arc::clone(&course));
    let t0 = Instant::now();
    engine.start().unwrap();

    // Fails at 1s; the next deadline moves out by one interval plus
    // backoff_delay(1s, 1, 60s) = 2s.
    tokio::time::sleep_until(t0 + Duration::from_millis(1500)).await;
    assert!(engine.is_running());
    course.set(HEALTHY);
    assert_near(next_nearby(&mut rx, t0).await, 4.0);
    assert_near(next_nearby(&mut rx, t0).await, 5.0);

    // A success resets the failure count: the next failure backs off 2s
    // again, not 4s.
    course.set(CORRUPT);
    tokio::time::sleep_until(t0 + Duration::from_millis(6500)).await;
    course.set(HEALTHY);
    assert_near(next_nearby(&mut rx, t0).await, 9.0);
    assert!(engine.is_running());
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cycle_is_contained() {
    let course = FlakyCourse::new(PANICKING);
    let (mut engine, mut rx) = flaky_engine(Arc::clone(&course));
    let t0 = Instant::now();
    engine.start().unwrap();

    tokio::time::sleep_until(t0 + Duration::from_millis(1500)).await;
    assert!(engine.is_running());
    course.set(HEALTHY);
    assert_near(next_nearby(&mut rx, t0).await, 4.0);

    // The processor is still usable after the panic.
    assert_eq!(engine.lock().watching(), Some(1));
    let nearby = engine.lock().get_nearby_data();
    assert_eq!(nearby.len(), 2);
    engine.stop();
}
