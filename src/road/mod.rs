//! Road positions along a shared course.
//!
//! Every athlete carries a [`RoadPositionTracker`]: the timeline of
//! road-completion samples on the current directed road, plus the archived
//! timeline of the road before it. Two trackers are enough to decide who is
//! ahead and by how much without authoritative positions for every pair.

pub mod course;
pub mod gap;
pub mod tracker;

use serde::{Deserialize, Serialize};

pub use course::{CourseData, InMemoryCourseData, RoadSegment};
pub use gap::{GapResolver, RoadComparison};
pub use tracker::RoadPositionTracker;

/// A contiguous directed road path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSignature {
    pub course_id: u32,
    pub road_id: u32,
    pub reverse: bool,
}

/// One road-completion sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Sample time in seconds
    pub time: f64,
    /// Fixed-point progress, 0..=1e6
    pub road_completion: f64,
    /// Athlete distance in meters
    pub distance: f64,
}
