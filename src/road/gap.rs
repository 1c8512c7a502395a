//! Directional gaps between two road trackers.
//!
//! [`GapResolver::compare`] decides which of two athletes leads and how far
//! apart they are in meters. [`GapResolver::real_gap`] turns that into
//! seconds by finding when the leader was where the follower is now.

use super::course::{crow_flight_distance, CourseData};
use super::tracker::RoadPositionTracker;
use super::{RoadSignature, TimelineEntry};
use crate::sample::ROAD_COMPLETION_SCALE;
use serde::{Deserialize, Serialize};

/// Completion deltas beyond this on the same road are checked as lapping.
const LAPPING_DELTA: f64 = ROAD_COMPLETION_SCALE / 2.0;

/// Relationship of A to B.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadComparison {
    /// B leads A
    pub reversed: bool,
    /// The leader's previous timeline holds the follower's position
    pub is_previous: bool,
    /// Meters between the two
    pub gap_distance: f64,
}

/// Resolves gaps using course road lengths.
pub struct GapResolver<'a> {
    course: &'a dyn CourseData,
}

impl<'a> GapResolver<'a> {
    pub fn new(course: &'a dyn CourseData) -> Self {
        Self { course }
    }

    /// Meters spanned by a completion delta on `road`, falling back to the
    /// crow-flight distance between the athletes when the length is unknown.
    fn completion_meters(
        &self,
        delta: f64,
        road: &RoadSignature,
        a: &RoadPositionTracker,
        b: &RoadPositionTracker,
    ) -> f64 {
        match self.course.road_length(road) {
            Some(length) => delta / ROAD_COMPLETION_SCALE * length,
            None => match (a.latlng(), b.latlng()) {
                (Some(pa), Some(pb)) => crow_flight_distance(pa, pb),
                _ => 0.0,
            },
        }
    }

    /// Decide who leads. `None` when the roads are unrelated.
    pub fn compare(&self, a: &RoadPositionTracker, b: &RoadPositionTracker) -> Option<RoadComparison> {
        let (a_sig, b_sig) = (a.signature()?, b.signature()?);
        let (a_tail, b_tail) = (a.tail()?, b.tail()?);
        let (a_comp, b_comp) = (a_tail.road_completion, b_tail.road_completion);

        if a_sig == b_sig {
            let d = a_comp - b_comp;
            let (reversed, is_previous, delta) = if d < -LAPPING_DELTA
                && a.previous_signature() == Some(b_sig)
            {
                (false, true, ROAD_COMPLETION_SCALE + d)
            } else if d > LAPPING_DELTA && b.previous_signature() == Some(a_sig) {
                (true, true, ROAD_COMPLETION_SCALE - d)
            } else if d > 0.0 {
                (false, false, d)
            } else if d < 0.0 {
                (true, false, -d)
            } else {
                // Dead heat: whoever got there first leads.
                (a_tail.time >= b_tail.time, false, 0.0)
            };
            let gap_distance = if delta == 0.0 {
                0.0
            } else {
                self.completion_meters(delta, &a_sig, a, b)
            };
            return Some(RoadComparison {
                reversed,
                is_previous,
                gap_distance,
            });
        }

        // A moved on from the road B is on now.
        let a_ahead = match (a.previous_signature(), a.previous_tail()) {
            (Some(prev), Some(prev_tail)) if prev == b_sig => {
                let d = prev_tail.road_completion - b_comp;
                (d >= 0.0).then_some((d, prev, *prev_tail))
            }
            _ => None,
        };
        // B moved on from the road A is on now.
        let b_ahead = match (b.previous_signature(), b.previous_tail()) {
            (Some(prev), Some(prev_tail)) if prev == a_sig => {
                let d = prev_tail.road_completion - a_comp;
                (d >= 0.0).then_some((d, prev, *prev_tail))
            }
            _ => None,
        };

        let (reversed, (d, prev_sig, prev_tail), leader_tail) = match (a_ahead, b_ahead) {
            (Some(x), Some(y)) if y.0 < x.0 => (true, y, b_tail),
            (Some(x), _) => (false, x, a_tail),
            (None, Some(y)) => (true, y, b_tail),
            (None, None) => return None,
        };
        let gap_distance = self.completion_meters(d, &prev_sig, a, b)
            + (leader_tail.distance - prev_tail.distance).max(0.0);
        Some(RoadComparison {
            reversed,
            is_previous: true,
            gap_distance,
        })
    }

    /// Seconds between A and B, or `None` when unresolvable.
    pub fn real_gap(&self, a: &RoadPositionTracker, b: &RoadPositionTracker) -> Option<f64> {
        let cmp = self.compare(a, b)?;
        real_gap_for(&cmp, a, b)
    }
}

/// Seconds between A and B given an existing comparison.
///
/// Scans the leader's timeline newest to oldest for the first entry at or
/// behind the follower's completion and interpolates against the newer
/// neighbour.
pub fn real_gap_for(cmp: &RoadComparison, a: &RoadPositionTracker, b: &RoadPositionTracker) -> Option<f64> {
    let (leader, follower) = if cmp.reversed { (b, a) } else { (a, b) };
    let timeline: &[TimelineEntry] = if cmp.is_previous {
        leader.previous_timeline()
    } else {
        leader.timeline()
    };
    let follower_tail = follower.tail()?;
    let mut newer: Option<&TimelineEntry> = None;
    for x in timeline.iter().rev() {
        if x.road_completion <= follower_tail.road_completion {
            let offset = match newer {
                Some(n) if n.road_completion > x.road_completion => {
                    (follower_tail.road_completion - x.road_completion)
                        / (n.road_completion - x.road_completion)
                        * (n.time - x.time)
                }
                _ => 0.0,
            };
            return Some((follower_tail.time - x.time - offset).abs());
        }
        newer = Some(x);
    }
    None
}
