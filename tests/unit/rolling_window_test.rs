//! Unit tests for rolling windows and peak trackers.

use rideview::metrics::{PeakTracker, RollingWindow, SampleValue, WindowOptions};

/// Deterministic pseudo-random watts in 0..600.
fn watts(n: usize) -> Vec<f64> {
    let mut seed: u64 = 0x2545_f491;
    (0..n)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) % 600) as f64
        })
        .collect()
}

#[test]
fn test_avg_matches_mean_within_period() {
    let period = 30;
    let values = watts(400);
    let mut roll: RollingWindow = RollingWindow::new(WindowOptions::default().with_period(period as f64));

    for (i, v) in values.iter().enumerate() {
        roll.commit(i as f64, SampleValue::Sample(*v));
        if !roll.full() {
            continue;
        }
        // The reference point does not count; the window covers the last
        // `period` seconds.
        let expected: f64 = values[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let avg = roll.avg().unwrap();
        assert!((avg - expected).abs() < 1e-6, "i={} avg={} expected={}", i, avg, expected);
    }
    assert!(roll.full());
}

#[test]
fn test_peak_never_below_observed_window() {
    let values = watts(300);
    let mut tracker: PeakTracker = PeakTracker::new(WindowOptions::default(), &[10], false);
    let mut best_seen = f64::MIN;

    for (i, v) in values.iter().enumerate() {
        tracker.add(i as f64, *v);
        let roll = tracker.period_roll(10).unwrap();
        if roll.full() {
            best_seen = best_seen.max(roll.avg().unwrap());
        }
        if let Some(peak) = tracker.peak(10) {
            assert!(peak.avg >= best_seen - 1e-9);
        }
    }
    tracker.flush_buffered();
    assert!(tracker.peak(10).unwrap().avg >= best_seen - 1e-9);
}

#[test]
fn test_peak_ties_favor_latest() {
    let mut tracker: PeakTracker = PeakTracker::new(WindowOptions::default(), &[5], false);
    for t in 0..20 {
        tracker.add(t as f64, 200.0);
    }
    tracker.flush_buffered();
    let peak = tracker.peak(5).unwrap();
    assert_eq!(peak.avg, 200.0);
    assert_eq!(peak.time, 19.0);
}

#[test]
fn test_pause_pads_are_inactive() {
    let mut roll: RollingWindow = RollingWindow::new(WindowOptions::default());
    roll.commit(0.0, SampleValue::Sample(100.0));
    roll.commit(1.0, SampleValue::Sample(100.0));
    // A 60 s gap is beyond max_gap: padded, and only the last second counts.
    let count = roll.commit(61.0, SampleValue::Sample(100.0));
    assert_eq!(count, 60);
    assert_eq!(roll.active(), 2.0);
    assert_eq!(roll.elapsed(), 61.0);
    assert_eq!(roll.avg(), Some(100.0));
}
