//! Athlete state: profiles, per-athlete aggregates and the registry.

pub mod data;
pub mod profile;
pub mod registry;

pub use data::{AthleteData, GapState, Lap, LapSummary, SegmentEffort, StreamsSnapshot};
pub use profile::{AthleteProfile, InMemoryProfileStore, ProfileStore};
pub use registry::AthleteRegistry;
