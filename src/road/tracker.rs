//! Per-athlete road timeline with road and lap transition handling.

use super::{RoadSignature, TimelineEntry};
use crate::sample::ROAD_COMPLETION_SCALE;

/// Completion drops larger than this are a lap rollover rather than drift.
const ROLLOVER_DROP: f64 = ROAD_COMPLETION_SCALE / 2.0;

/// Current and previous road timelines of one athlete.
#[derive(Debug, Clone, Default)]
pub struct RoadPositionTracker {
    signature: Option<RoadSignature>,
    timeline: Vec<TimelineEntry>,
    previous: Option<(RoadSignature, Vec<TimelineEntry>)>,
    latlng: Option<[f64; 2]>,
}

impl RoadPositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a road position.
    ///
    /// A new road archives the current timeline as previous, unless the
    /// course changed too, which drops the archive. On the same road a
    /// completion drop of more than half the range is a lap rollover and
    /// archives; a smaller drop clears the timeline in place.
    pub fn record(&mut self, time: f64, signature: RoadSignature, road_completion: f64, distance: f64) {
        if let Some(current) = self.signature {
            if current != signature {
                if current.course_id == signature.course_id {
                    self.archive(current);
                } else {
                    self.previous = None;
                    self.timeline.clear();
                }
            } else if let Some(last) = self.timeline.last() {
                let delta = road_completion - last.road_completion;
                if delta < -ROLLOVER_DROP {
                    self.archive(current);
                } else if delta < 0.0 {
                    self.timeline.clear();
                }
            }
        }
        if self.timeline.last().is_some_and(|last| time < last.time) {
            self.timeline.clear();
        }
        self.signature = Some(signature);
        self.timeline.push(TimelineEntry {
            time,
            road_completion,
            distance,
        });
    }

    fn archive(&mut self, signature: RoadSignature) {
        let timeline = std::mem::take(&mut self.timeline);
        self.previous = if timeline.is_empty() {
            None
        } else {
            Some((signature, timeline))
        };
    }

    /// Remember the latest coordinates for crow-flight fallbacks.
    pub fn set_latlng(&mut self, latlng: Option<[f64; 2]>) {
        if latlng.is_some() {
            self.latlng = latlng;
        }
    }

    pub fn latlng(&self) -> Option<[f64; 2]> {
        self.latlng
    }

    /// Current road.
    pub fn signature(&self) -> Option<RoadSignature> {
        self.signature
    }

    /// Timeline on the current road, oldest first.
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    /// Latest entry on the current road.
    pub fn tail(&self) -> Option<&TimelineEntry> {
        self.timeline.last()
    }

    /// Previous road.
    pub fn previous_signature(&self) -> Option<RoadSignature> {
        self.previous.as_ref().map(|(sig, _)| *sig)
    }

    /// Timeline on the previous road, oldest first.
    pub fn previous_timeline(&self) -> &[TimelineEntry] {
        self.previous.as_ref().map_or(&[], |(_, t)| t.as_slice())
    }

    /// Latest entry on the previous road.
    pub fn previous_tail(&self) -> Option<&TimelineEntry> {
        self.previous.as_ref().and_then(|(_, t)| t.last())
    }
}
