//! Unit tests for the W' balance model.

use rideview::metrics::WBalAccumulator;

fn configured() -> WBalAccumulator {
    let mut wbal = WBalAccumulator::new();
    wbal.configure(Some(250.0), Some(20000.0));
    wbal
}

#[test]
fn test_depletion_then_recovery() {
    let mut wbal = configured();
    for t in 0..=60 {
        wbal.accumulate(t as f64, 400.0);
    }
    let depleted = wbal.get().unwrap();
    assert!((depleted - 11000.0).abs() < 1e-6);
    assert!(depleted < 14000.0);

    let mut last = depleted;
    for t in 61..=360 {
        let value = wbal.accumulate(t as f64, 100.0).unwrap();
        assert!(value > last, "t={} value={} last={}", t, value, last);
        assert!(value >= 0.0 && value <= 20000.0);
        last = value;
    }
}

#[test]
fn test_holding_cp_is_neutral() {
    let mut wbal = configured();
    for t in 0..=30 {
        wbal.accumulate(t as f64, 500.0);
    }
    let before = wbal.get().unwrap();
    for t in 31..=90 {
        wbal.accumulate(t as f64, 250.0);
    }
    assert_eq!(wbal.get(), Some(before));
}

#[test]
fn test_balance_clamps_at_zero() {
    let mut wbal = configured();
    for t in 0..=100 {
        let value = wbal.accumulate(t as f64, 1000.0).unwrap();
        assert!(value >= 0.0);
    }
    assert_eq!(wbal.get(), Some(0.0));
}
