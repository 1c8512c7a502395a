//! Clusters of riders separated by less than the group gap.

use super::compute::NearbyAthlete;
use crate::metrics::smoothing::{mean, median};
use serde::{Deserialize, Serialize};

/// A contiguous cluster of riders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub athletes: Vec<NearbyAthlete>,
    /// Contains the watched athlete
    pub watching: bool,
    /// Seconds to the watched group, from the edge rider nearest it
    pub gap: f64,
    /// Seconds to the next group behind, when there is one
    pub inner_gap: Option<f64>,
    pub is_gap_est: bool,
    pub power: f64,
    pub draft: f64,
    pub speed: Option<f64>,
    pub heartrate: Option<f64>,
    pub weight: Option<f64>,
}

impl Group {
    fn from_athletes(athletes: Vec<NearbyAthlete>) -> Self {
        let count = athletes.len().max(1) as f64;
        let power = athletes.iter().map(|x| x.state.power).sum::<f64>() / count;
        let draft = athletes.iter().filter_map(|x| x.state.draft).sum::<f64>() / count;
        let speed = median(athletes.iter().map(|x| x.state.speed));
        let heartrate = mean(athletes.iter().filter_map(|x| x.state.heartrate).filter(|hr| *hr > 0.0));
        let weight = mean(athletes.iter().filter_map(|x| x.weight).filter(|w| *w > 0.0));
        let watching = athletes.iter().any(|x| x.watching);
        Self {
            athletes,
            watching,
            gap: 0.0,
            inner_gap: None,
            is_gap_est: false,
            power,
            draft,
            speed,
            heartrate,
            weight,
        }
    }
}

/// Split a gap-sorted nearby list wherever consecutive riders are more than
/// `group_gap` seconds apart.
pub fn compute_groups(nearby: &[NearbyAthlete], group_gap: f64) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut current: Vec<NearbyAthlete> = Vec::new();
    let mut inner_gaps = Vec::new();
    let mut prev_gap: Option<f64> = None;

    for x in nearby {
        if let Some(prev) = prev_gap {
            let inner = x.gap - prev;
            if inner > group_gap && !current.is_empty() {
                groups.push(Group::from_athletes(std::mem::take(&mut current)));
                inner_gaps.push(inner);
            }
        }
        current.push(x.clone());
        prev_gap = Some(x.gap);
    }
    if !current.is_empty() {
        groups.push(Group::from_athletes(current));
    }
    for (grp, inner) in groups.iter_mut().zip(inner_gaps) {
        grp.inner_gap = Some(inner);
    }

    let watching_idx = groups.iter().position(|g| g.watching);
    for (i, grp) in groups.iter_mut().enumerate() {
        if watching_idx == Some(i) {
            grp.gap = 0.0;
            grp.is_gap_est = false;
            continue;
        }
        // Edge nearest the watched group.
        let edge = match watching_idx {
            Some(w) if w < i => grp.athletes.first(),
            _ => grp.athletes.last(),
        };
        if let Some(edge) = edge {
            grp.gap = edge.gap;
            grp.is_gap_est = edge.is_gap_est;
        }
    }
    groups
}
