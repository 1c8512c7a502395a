//! Course metadata supplied by an external collaborator.

use super::RoadSignature;
use geo::{geometry::Point, Distance as _, Haversine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A timed segment on a directed road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSegment {
    pub id: u64,
    pub name: String,
    /// Start as a fraction of road completion (0-1)
    pub road_start: f64,
    /// Finish as a fraction of road completion (0-1)
    pub road_finish: f64,
}

impl RoadSegment {
    /// Progress through the segment (0-1) at road fraction `p`, or `None`
    /// when outside it. On reversed roads the start lies above the finish.
    pub fn progress(&self, p: f64, reverse: bool) -> Option<f64> {
        if reverse {
            if p >= self.road_finish && p <= self.road_start && self.road_start > self.road_finish {
                Some(1.0 - (p - self.road_finish) / (self.road_start - self.road_finish))
            } else {
                None
            }
        } else if p <= self.road_finish && p >= self.road_start && self.road_finish > self.road_start {
            Some(1.0 - (self.road_finish - p) / (self.road_finish - self.road_start))
        } else {
            None
        }
    }
}

/// Road lengths and segments.
pub trait CourseData: Send + Sync {
    /// Length of the road in meters.
    fn road_length(&self, signature: &RoadSignature) -> Option<f64>;

    /// Segments on the directed road.
    fn road_segments(&self, signature: &RoadSignature) -> Vec<RoadSegment>;
}

/// Course data held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCourseData {
    lengths: HashMap<(u32, u32), f64>,
    segments: HashMap<RoadSignature, Vec<RoadSegment>>,
}

impl InMemoryCourseData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the length of a road in either direction.
    pub fn set_road_length(&mut self, course_id: u32, road_id: u32, meters: f64) {
        self.lengths.insert((course_id, road_id), meters);
    }

    /// Add a segment to a directed road.
    pub fn add_segment(&mut self, signature: RoadSignature, segment: RoadSegment) {
        self.segments.entry(signature).or_default().push(segment);
    }
}

impl CourseData for InMemoryCourseData {
    fn road_length(&self, signature: &RoadSignature) -> Option<f64> {
        self.lengths
            .get(&(signature.course_id, signature.road_id))
            .copied()
    }

    fn road_segments(&self, signature: &RoadSignature) -> Vec<RoadSegment> {
        self.segments.get(signature).cloned().unwrap_or_default()
    }
}

/// Great-circle distance in meters between two `[lat, lng]` points.
pub fn crow_flight_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let p1 = Point::new(a[1], a[0]);
    let p2 = Point::new(b[1], b[0]);
    Haversine.distance(p1, p2)
}
