//! RideView - real-time rider analytics for multiplayer cycling sims
//!
//! Turns a stream of per-athlete telemetry samples into rolling power,
//! speed, heart rate, cadence and draft statistics (peaks, NP, xPower, TSS,
//! W' balance, time in zones), and keeps a road-position timeline per athlete
//! to estimate time gaps to a watched athlete and cluster riders into groups.

pub mod athlete;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod nearby;
pub mod processor;
pub mod road;
pub mod sample;

// Re-export commonly used types
pub use athlete::{AthleteProfile, InMemoryProfileStore, ProfileStore};
pub use config::EngineConfig;
pub use engine::StatsEngine;
pub use error::{CycleError, EngineError, SampleError};
pub use nearby::{Group, NearbyAthlete};
pub use processor::{AthleteSnapshot, LapQuery, StatsEvent, StatsProcessor};
pub use road::{CourseData, InMemoryCourseData, RoadSignature};
pub use sample::Sample;
