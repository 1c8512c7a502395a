//! Integration tests for the nearby list and groups driven through the
//! stats processor.

use rideview::{EngineConfig, InMemoryCourseData, InMemoryProfileStore, Sample, StatsProcessor};
use std::sync::Arc;

const WATCHED: u64 = 1;

fn processor() -> StatsProcessor {
    let mut course = InMemoryCourseData::new();
    course.set_road_length(6, 1, 10_000.0);
    StatsProcessor::new(
        EngineConfig::default(),
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(course),
    )
}

fn sample(athlete_id: u64, time: f64, road_completion: f64) -> Sample {
    Sample {
        athlete_id,
        time,
        power: 220.0,
        speed: 36.0,
        heartrate: Some(150.0),
        cadence: Some(90.0),
        draft: Some(20.0),
        road_id: 1,
        course_id: 6,
        reverse: false,
        road_completion,
        distance: time * 10.0,
        latlng: None,
    }
}

/// Ride 10 m/s on a 10 km road starting at `comp` at time `from`.
fn ride(p: &mut StatsProcessor, id: u64, comp: f64, from: u32, to: u32) {
    for t in from..=to {
        let comp = comp + f64::from(t - from) * 1000.0;
        p.ingest_at(sample(id, f64::from(t), comp), f64::from(t)).unwrap();
    }
}

/// A bunch around the watched rider plus one rider far ahead whose gap has to
/// be estimated.
fn peloton() -> StatsProcessor {
    let mut p = processor();
    p.set_watching(WATCHED);
    ride(&mut p, WATCHED, 100_000.0, 0, 30);
    ride(&mut p, 2, 105_000.0, 0, 30);
    ride(&mut p, 4, 120_000.0, 0, 30);
    ride(&mut p, 6, 101_000.0, 0, 30);
    ride(&mut p, 3, 90_000.0, 0, 30);
    ride(&mut p, 7, 88_500.0, 0, 30);
    // Joined recently: no shared history with anyone.
    ride(&mut p, 5, 160_000.0, 28, 30);
    p.run_cycle_at(30.0).unwrap();
    p
}

#[test]
fn test_nearby_sorted_by_gap() {
    let p = peloton();
    let nearby = p.get_nearby_data();

    let ids: Vec<u64> = nearby.iter().map(|x| x.athlete_id).collect();
    assert_eq!(ids, vec![5, 4, 2, 6, 1, 3, 7]);

    let gap = |id: u64| nearby.iter().find(|x| x.athlete_id == id).unwrap();
    assert_eq!(gap(WATCHED).gap, 0.0);
    assert!(gap(WATCHED).watching);
    assert!((gap(2).gap + 5.0).abs() < 1e-9);
    assert!((gap(4).gap + 20.0).abs() < 1e-9);
    assert!((gap(6).gap + 1.0).abs() < 1e-9);
    assert!((gap(3).gap - 10.0).abs() < 1e-9);
    assert!((gap(7).gap - 11.5).abs() < 1e-9);
    assert!(!gap(4).is_gap_est);

    // 120 m past rider 4 at the reference speed of 10 m/s.
    assert!(gap(5).is_gap_est);
    assert!((gap(5).gap + 32.0).abs() < 1e-6, "{}", gap(5).gap);
    assert!((gap(5).gap_distance + 320.0).abs() < 1e-6);
}

#[test]
fn test_gap_state_stored_on_athletes() {
    let p = peloton();
    let rider = p.get_athlete_data_at(3, 30.0).unwrap();
    assert_eq!(rider.gap, Some(10.0));
    assert_eq!(rider.gap_distance, Some(100.0));
    assert!(!rider.is_gap_est);

    let watched = p.get_athlete_data_at(WATCHED, 30.0).unwrap();
    assert!(watched.watching);
    assert_eq!(watched.gap, Some(0.0));
}

#[test]
fn test_groups_partition_nearby() {
    let p = peloton();
    let groups = p.get_groups_data();

    let members: Vec<Vec<u64>> = groups
        .iter()
        .map(|g| g.athletes.iter().map(|x| x.athlete_id).collect())
        .collect();
    assert_eq!(members, vec![vec![5], vec![4], vec![2], vec![6, 1], vec![3, 7]]);

    let flattened: Vec<u64> = members.into_iter().flatten().collect();
    let nearby: Vec<u64> = p.get_nearby_data().iter().map(|x| x.athlete_id).collect();
    assert_eq!(flattened, nearby);

    let watched = groups.iter().find(|g| g.watching).unwrap();
    assert_eq!(watched.gap, 0.0);
    assert_eq!(watched.power, 220.0);
    assert_eq!(watched.speed, Some(36.0));

    // Groups ahead report the rider nearest the watched group.
    assert!((groups[2].gap + 5.0).abs() < 1e-9);
    assert!((groups[4].gap - 10.0).abs() < 1e-9);
    assert!(groups[0].is_gap_est);
}

#[test]
fn test_stale_rider_left_out() {
    let mut p = processor();
    p.set_watching(WATCHED);
    ride(&mut p, WATCHED, 100_000.0, 0, 30);
    // Stops reporting at t=10.
    ride(&mut p, 2, 105_000.0, 0, 10);
    p.run_cycle_at(30.0).unwrap();

    let ids: Vec<u64> = p.get_nearby_data().iter().map(|x| x.athlete_id).collect();
    assert_eq!(ids, vec![WATCHED]);
}

#[test]
fn test_switching_watch_recomputes() {
    let mut p = peloton();
    p.set_watching(3);
    p.run_cycle_at(30.0).unwrap();

    let nearby = p.get_nearby_data();
    let watched = nearby.iter().find(|x| x.watching).unwrap();
    assert_eq!(watched.athlete_id, 3);
    let one = nearby.iter().find(|x| x.athlete_id == WATCHED).unwrap();
    assert!((one.gap + 10.0).abs() < 1e-9);
}
