//! Telemetry sample as delivered by the game collaborator.

use crate::error::SampleError;
use crate::road::RoadSignature;
use serde::{Deserialize, Serialize};

/// Fixed-point upper bound of `road_completion`.
pub const ROAD_COMPLETION_SCALE: f64 = 1_000_000.0;

/// A single decoded telemetry record for one athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub athlete_id: u64,
    /// Monotonic seconds shared by every athlete
    pub time: f64,
    /// Watts
    pub power: f64,
    /// km/h
    pub speed: f64,
    #[serde(default)]
    pub heartrate: Option<f64>,
    #[serde(default)]
    pub cadence: Option<f64>,
    #[serde(default)]
    pub draft: Option<f64>,
    pub road_id: u32,
    pub course_id: u32,
    #[serde(default)]
    pub reverse: bool,
    /// Fixed-point progress along the directed road, 0..=1e6
    pub road_completion: f64,
    /// Meters since the athlete joined the current course
    pub distance: f64,
    /// `[lat, lng]` in degrees
    #[serde(default)]
    pub latlng: Option<[f64; 2]>,
}

impl Sample {
    /// The directed road this sample was taken on.
    pub fn road_signature(&self) -> RoadSignature {
        RoadSignature {
            course_id: self.course_id,
            road_id: self.road_id,
            reverse: self.reverse,
        }
    }

    /// Check required numeric fields.
    pub fn validate(&self) -> Result<(), SampleError> {
        fn non_negative(value: f64, field: &'static str) -> Result<(), SampleError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(SampleError::Malformed { field })
            }
        }

        non_negative(self.time, "time")?;
        non_negative(self.power, "power")?;
        non_negative(self.speed, "speed")?;
        non_negative(self.distance, "distance")?;
        if !self.road_completion.is_finite()
            || !(0.0..=ROAD_COMPLETION_SCALE).contains(&self.road_completion)
        {
            return Err(SampleError::Malformed {
                field: "road_completion",
            });
        }
        for (value, field) in [
            (self.heartrate, "heartrate"),
            (self.cadence, "cadence"),
            (self.draft, "draft"),
        ] {
            if let Some(v) = value {
                non_negative(v, field)?;
            }
        }
        if let Some([lat, lng]) = self.latlng {
            if !lat.is_finite() || !lng.is_finite() {
                return Err(SampleError::Malformed { field: "latlng" });
            }
        }
        Ok(())
    }
}
