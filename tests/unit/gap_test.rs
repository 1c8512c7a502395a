//! Unit tests for road comparisons across road transitions.

use rideview::road::{GapResolver, InMemoryCourseData, RoadPositionTracker, RoadSignature};

const ROAD: RoadSignature = RoadSignature {
    course_id: 6,
    road_id: 1,
    reverse: false,
};
const NEXT: RoadSignature = RoadSignature {
    course_id: 6,
    road_id: 2,
    reverse: false,
};

fn course() -> InMemoryCourseData {
    let mut c = InMemoryCourseData::new();
    c.set_road_length(6, 1, 1000.0);
    c.set_road_length(6, 2, 1000.0);
    c
}

/// B reaches the end of ROAD at t=9 and turns onto NEXT; A is still on ROAD
/// 20 m short of where B left it.
fn split_riders() -> (RoadPositionTracker, RoadPositionTracker) {
    let mut a = RoadPositionTracker::new();
    let mut b = RoadPositionTracker::new();
    for t in 0..=9 {
        b.record(t as f64, ROAD, 900_000.0 + 10_000.0 * t as f64, t as f64 * 10.0);
    }
    for t in 10..=15 {
        b.record(t as f64, NEXT, 10_000.0 * (t - 10) as f64, t as f64 * 10.0);
    }
    for t in 3..=15 {
        a.record(t as f64, ROAD, 850_000.0 + 10_000.0 * (t - 3) as f64, t as f64 * 10.0);
    }
    (a, b)
}

#[test]
fn test_follower_on_previous_road() {
    let course = course();
    let resolver = GapResolver::new(&course);
    let (a, b) = split_riders();

    let cmp = resolver.compare(&a, &b).unwrap();
    assert!(cmp.reversed);
    assert!(cmp.is_previous);
    // 20 m left on ROAD plus the 60 m B has ridden since leaving it.
    assert!((cmp.gap_distance - 80.0).abs() < 1e-9, "{}", cmp.gap_distance);

    // B passed A's current completion at t=7.
    let gap = resolver.real_gap(&a, &b).unwrap();
    assert!((gap - 8.0).abs() < 1e-9, "{}", gap);
}

#[test]
fn test_previous_road_check_is_symmetric() {
    let course = course();
    let resolver = GapResolver::new(&course);
    let (a, b) = split_riders();

    let forward = resolver.compare(&a, &b).unwrap();
    let backward = resolver.compare(&b, &a).unwrap();
    assert!(!backward.reversed);
    assert!(backward.is_previous);
    assert_eq!(forward.gap_distance, backward.gap_distance);
    assert_eq!(resolver.real_gap(&a, &b), resolver.real_gap(&b, &a));
}

#[test]
fn test_constant_speed_gap_matches_offset() {
    let course = course();
    let resolver = GapResolver::new(&course);
    let mut a = RoadPositionTracker::new();
    let mut b = RoadPositionTracker::new();
    // Same pace, B starts 4.25 s later.
    for t in 0..=20 {
        a.record(t as f64, ROAD, 100_000.0 + 10_000.0 * t as f64, t as f64 * 10.0);
    }
    for t in 0..=20 {
        let elapsed = t as f64 - 4.25;
        b.record(t as f64, ROAD, 100_000.0 + 10_000.0 * elapsed.max(0.0), elapsed.max(0.0) * 10.0);
    }

    let gap = resolver.real_gap(&b, &a).unwrap();
    assert!((gap - 4.25).abs() < 1e-9, "{}", gap);
}

#[test]
fn test_course_change_drops_previous_road() {
    let mut t = RoadPositionTracker::new();
    t.record(0.0, ROAD, 990_000.0, 0.0);
    t.record(1.0, RoadSignature { course_id: 7, ..NEXT }, 0.0, 10.0);
    assert!(t.previous_signature().is_none());
    assert_eq!(t.timeline().len(), 1);
}
