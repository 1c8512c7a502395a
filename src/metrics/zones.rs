//! Power zone schemes and time-in-zone accounting.
//!
//! Zones are half-open power ranges `(from, to]` in watts. Overlap zones
//! (such as sweet spot) may intersect ordinary zones; a sample credits at most
//! one ordinary zone plus any overlap zones containing it.

use crate::config::{ZoneScheme, ZoneSettings};
use serde::{Deserialize, Serialize};

/// A zone expressed in fractions of FTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    /// Zone label
    pub zone: String,
    /// Lower bound (exclusive) as a fraction of FTP; `None` means zero
    #[serde(default)]
    pub from: Option<f64>,
    /// Upper bound (inclusive) as a fraction of FTP; `None` means unbounded
    #[serde(default)]
    pub to: Option<f64>,
    /// Whether this zone overlaps ordinary zones
    #[serde(default)]
    pub overlap: bool,
}

impl ZoneDefinition {
    fn new(zone: &str, from: f64, to: Option<f64>) -> Self {
        Self {
            zone: zone.to_string(),
            from: Some(from),
            to,
            overlap: false,
        }
    }
}

/// A zone resolved to watts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerZone {
    pub zone: String,
    pub from: f64,
    pub to: f64,
    pub overlap: bool,
}

impl PowerZone {
    /// Whether `power` falls in `(from, to]`.
    pub fn contains(&self, power: f64) -> bool {
        power > self.from && power <= self.to
    }
}

/// Coggan 7-zone model.
pub fn coggan_zones() -> Vec<ZoneDefinition> {
    vec![
        ZoneDefinition::new("Z1", 0.0, Some(0.55)),
        ZoneDefinition::new("Z2", 0.55, Some(0.75)),
        ZoneDefinition::new("Z3", 0.75, Some(0.90)),
        ZoneDefinition::new("Z4", 0.90, Some(1.05)),
        ZoneDefinition::new("Z5", 1.05, Some(1.20)),
        ZoneDefinition::new("Z6", 1.20, Some(1.50)),
        ZoneDefinition::new("Z7", 1.50, None),
    ]
}

/// Three-zone polarized model.
pub fn polarized_zones() -> Vec<ZoneDefinition> {
    vec![
        ZoneDefinition::new("Z1", 0.0, Some(0.75)),
        ZoneDefinition::new("Z2", 0.75, Some(1.0)),
        ZoneDefinition::new("Z3", 1.0, None),
    ]
}

/// Sweet spot band, 84-97% FTP.
pub fn sweetspot_zone() -> ZoneDefinition {
    ZoneDefinition {
        overlap: true,
        ..ZoneDefinition::new("SS", 0.84, Some(0.97))
    }
}

/// Zone definitions for the configured scheme. An empty custom list falls
/// back to Coggan.
pub fn zone_definitions(settings: &ZoneSettings) -> Vec<ZoneDefinition> {
    let mut zones = match settings.scheme {
        ZoneScheme::Coggan => coggan_zones(),
        ZoneScheme::Polarized => polarized_zones(),
        ZoneScheme::Custom if settings.custom.is_empty() => coggan_zones(),
        ZoneScheme::Custom => settings.custom.clone(),
    };
    if settings.sweetspot {
        zones.push(sweetspot_zone());
    }
    zones
}

/// Resolve fractional zones to watts for `ftp`.
pub fn resolve_zones(ftp: f64, defs: &[ZoneDefinition]) -> Vec<PowerZone> {
    defs.iter()
        .map(|d| PowerZone {
            zone: d.zone.clone(),
            from: d.from.unwrap_or(0.0) * ftp,
            to: d.to.map(|to| to * ftp).unwrap_or(f64::INFINITY),
            overlap: d.overlap,
        })
        .collect()
}

/// Accumulated time in one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTime {
    pub zone: String,
    /// Seconds
    pub time: f64,
}

/// Time-in-zone tally keyed to sample time.
#[derive(Debug, Clone, Default)]
pub struct ZoneAccumulator {
    ftp: Option<f64>,
    zones: Vec<PowerZone>,
    times: Vec<f64>,
    last_time: Option<f64>,
}

impl ZoneAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure from FTP and zone definitions. Missing or non-positive FTP
    /// leaves the accumulator unconfigured.
    pub fn configure(&mut self, ftp: Option<f64>, defs: &[ZoneDefinition]) {
        self.last_time = None;
        match ftp {
            Some(ftp) if ftp > 0.0 && !defs.is_empty() => {
                let mut zones = resolve_zones(ftp, defs);
                // Overlap zones go last so the backward scan can stop at the
                // first ordinary zone.
                zones.sort_by_key(|z| z.overlap);
                self.times = vec![0.0; zones.len()];
                self.zones = zones;
                self.ftp = Some(ftp);
            }
            _ => {
                self.zones.clear();
                self.times.clear();
                self.ftp = None;
            }
        }
    }

    /// Whether zones are configured.
    pub fn is_configured(&self) -> bool {
        self.ftp.is_some()
    }

    /// Credit the time since the previous call to the zones containing `power`.
    pub fn accumulate(&mut self, time: f64, power: f64) {
        let elapsed = match self.last_time {
            Some(last) if time > last => time - last,
            _ => 0.0,
        };
        self.last_time = Some(time);
        for (zone, acc) in self.zones.iter().zip(self.times.iter_mut()).rev() {
            if zone.contains(power) {
                *acc += elapsed;
                if !zone.overlap {
                    break;
                }
            }
        }
    }

    /// Time per zone, `None` when unconfigured.
    pub fn get(&self) -> Option<Vec<ZoneTime>> {
        self.ftp?;
        Some(
            self.zones
                .iter()
                .zip(&self.times)
                .map(|(z, t)| ZoneTime {
                    zone: z.zone.clone(),
                    time: *t,
                })
                .collect(),
        )
    }

    /// Zero the tallies, keeping the configuration.
    pub fn reset(&mut self) {
        self.times.iter_mut().for_each(|t| *t = 0.0);
        self.last_time = None;
    }

    /// Resolved zones in scan order.
    pub fn zones(&self) -> &[PowerZone] {
        &self.zones
    }
}
