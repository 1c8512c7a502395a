//! Gaps from every athlete to the watched athlete.
//!
//! Athletes with a direct time gap get it from the road timelines. The rest
//! are chained outward from the watched athlete: each gap is the gap of the
//! neighbour closer to the watched athlete plus the increment between the
//! two, estimated from a reference speed when the timelines do not overlap.

use crate::athlete::{AthleteData, AthleteRegistry, GapState};
use crate::config::NearbySettings;
use crate::error::CycleError;
use crate::metrics::smoothing::ExpWeightedAverage;
use crate::road::gap::real_gap_for;
use crate::road::{CourseData, GapResolver};
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One row of the nearby list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyAthlete {
    pub athlete_id: u64,
    pub watching: bool,
    /// Seconds; negative is ahead of the watched athlete
    pub gap: f64,
    /// Meters; negative is ahead of the watched athlete
    pub gap_distance: f64,
    pub is_gap_est: bool,
    pub name: Option<String>,
    pub weight: Option<f64>,
    pub wbal: Option<f64>,
    /// Most recent sample
    pub state: Sample,
}

/// An athlete that passed the filters, with its gap to the watched athlete
/// before propagation.
#[derive(Debug, Clone, Copy)]
struct Candidate<'r> {
    ad: &'r AthleteData,
    gap: Option<f64>,
    /// Unsigned meters
    gap_distance: f64,
    speed: f64,
}

/// Runs the nearby computation over a registry.
pub struct NearbyComputer<'a> {
    course: &'a dyn CourseData,
    settings: &'a NearbySettings,
}

impl<'a> NearbyComputer<'a> {
    pub fn new(course: &'a dyn CourseData, settings: &'a NearbySettings) -> Self {
        Self { course, settings }
    }

    /// Compute gaps to `watching` at engine time `now`, store them on each
    /// athlete and return the nearby list sorted by signed gap.
    pub fn compute(
        &self,
        registry: &mut AthleteRegistry,
        watching: u64,
        now: f64,
    ) -> Result<Vec<NearbyAthlete>, CycleError> {
        let Some(watched) = registry.get(watching).filter(|ad| ad.most_recent.is_some()) else {
            for ad in registry.iter_mut() {
                ad.gap = GapState::default();
            }
            return Ok(Vec::new());
        };
        let resolver = GapResolver::new(self.course);
        let watching_speed = watched.most_recent.as_ref().map_or(0.0, |s| s.speed);

        // Seeded with the watched athlete so estimates lean on its speed.
        let mut ref_speed = ExpWeightedAverage::new(self.settings.ref_speed_window);
        if watching_speed > 1.0 {
            ref_speed.add(watching_speed);
        }
        // Stopped riders only matter while the watched athlete is stopped too.
        let filter_stopped = watching_speed != 0.0;

        let mut ahead = Vec::new();
        let mut behind = Vec::new();
        let mut unresolved = Vec::new();
        for ad in registry.iter() {
            if ad.athlete_id == watching {
                continue;
            }
            let Some(state) = &ad.most_recent else {
                continue;
            };
            if (filter_stopped && state.speed == 0.0) || now - ad.updated > self.settings.stale_after_secs {
                continue;
            }
            let Some(cmp) = resolver.compare(&ad.road, &watched.road) else {
                unresolved.push(ad.athlete_id);
                continue;
            };
            let candidate = Candidate {
                ad,
                gap: real_gap_for(&cmp, &ad.road, &watched.road),
                gap_distance: cmp.gap_distance,
                speed: state.speed,
            };
            if cmp.reversed {
                behind.push(candidate);
            } else {
                ahead.push(candidate);
            }
        }

        // Both walk outward from the watched athlete.
        ahead.sort_by(by_distance);
        behind.sort_by(by_distance);

        let ahead_gaps = self.propagate(watched, &ahead, &mut ref_speed, true)?;
        let behind_gaps = self.propagate(watched, &behind, &mut ref_speed, false)?;

        let mut rows = Vec::with_capacity(ahead.len() + behind.len() + 1);
        let mut updates = Vec::with_capacity(ahead.len() + behind.len() + unresolved.len() + 1);
        updates.push((
            watching,
            GapState {
                gap: Some(0.0),
                gap_distance: Some(0.0),
                is_gap_est: false,
            },
        ));
        rows.extend(nearby_row(watched, 0.0, 0.0, false, true));

        for (candidates, gaps, sign) in [(&ahead, &ahead_gaps, -1.0), (&behind, &behind_gaps, 1.0)] {
            for (c, (gap, is_gap_est)) in candidates.iter().zip(gaps) {
                let gap_distance = sign * c.gap_distance;
                updates.push((
                    c.ad.athlete_id,
                    GapState {
                        gap: Some(*gap),
                        gap_distance: Some(gap_distance),
                        is_gap_est: *is_gap_est,
                    },
                ));
                if gap.abs() >= self.settings.max_gap_secs {
                    continue;
                }
                rows.extend(nearby_row(c.ad, *gap, gap_distance, *is_gap_est, false));
            }
        }
        for id in unresolved {
            updates.push((
                id,
                GapState {
                    gap: None,
                    gap_distance: None,
                    is_gap_est: true,
                },
            ));
        }

        for (id, state) in updates {
            if let Some(ad) = registry.get_mut(id) {
                ad.gap = state;
            }
        }

        rows.sort_by(|a, b| a.gap.total_cmp(&b.gap).then(a.athlete_id.cmp(&b.athlete_id)));
        Ok(rows)
    }

    /// Signed gaps for `candidates`, nearest first. Returns `(gap, is_gap_est)`
    /// per candidate.
    fn propagate(
        &self,
        watched: &AthleteData,
        candidates: &[Candidate],
        ref_speed: &mut ExpWeightedAverage,
        ahead: bool,
    ) -> Result<Vec<(f64, bool)>, CycleError> {
        let resolver = GapResolver::new(self.course);
        let sign = if ahead { -1.0 } else { 1.0 };
        let mut out: Vec<(f64, bool)> = Vec::with_capacity(candidates.len());
        let mut adjacent: Option<(&AthleteData, f64, f64)> = None;

        for c in candidates {
            let speed_ref = ref_speed.add(c.speed);
            let (adj, adj_gap, adj_distance) = adjacent.unwrap_or((watched, 0.0, 0.0));
            let ad = c.ad;

            let (gap, is_gap_est) = match c.gap {
                Some(direct) => (sign * direct, false),
                None => {
                    let inc = resolver.real_gap(&ad.road, &adj.road).unwrap_or_else(|| {
                        let inc_distance = c.gap_distance - adj_distance;
                        if speed_ref > 0.0 {
                            inc_distance / (speed_ref / 3.6)
                        } else {
                            0.0
                        }
                    });
                    (adj_gap + sign * inc, true)
                }
            };
            if !gap.is_finite() {
                return Err(CycleError::NonFiniteGap {
                    athlete_id: ad.athlete_id,
                });
            }
            out.push((gap, is_gap_est));
            adjacent = Some((ad, gap, c.gap_distance));
        }
        Ok(out)
    }
}

fn by_distance(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.gap_distance
        .total_cmp(&b.gap_distance)
        .then(a.ad.athlete_id.cmp(&b.ad.athlete_id))
}

fn nearby_row(ad: &AthleteData, gap: f64, gap_distance: f64, is_gap_est: bool, watching: bool) -> Option<NearbyAthlete> {
    let profile = ad.profile.as_ref();
    let mut state = ad.most_recent.clone()?;
    state.distance += ad.distance_offset;
    Some(NearbyAthlete {
        athlete_id: ad.athlete_id,
        watching,
        gap,
        gap_distance,
        is_gap_est,
        name: profile.and_then(|p| p.name.clone()),
        weight: profile.and_then(|p| p.weight),
        wbal: ad.wbal.get(),
        state,
    })
}
