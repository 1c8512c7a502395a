//! Athlete profiles supplied by an external store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Physiological fields the engine reads but does not own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AthleteProfile {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Functional Threshold Power in watts
    #[serde(default)]
    pub ftp: Option<f64>,
    /// Critical Power in watts; FTP stands in when absent
    #[serde(default)]
    pub cp: Option<f64>,
    /// W' in joules
    #[serde(default)]
    pub w_prime: Option<f64>,
    /// Weight in kilograms
    #[serde(default)]
    pub weight: Option<f64>,
}

impl AthleteProfile {
    /// CP for the W' model, falling back to FTP.
    pub fn effective_cp(&self) -> Option<f64> {
        self.cp.filter(|cp| *cp > 0.0).or(self.ftp.filter(|ftp| *ftp > 0.0))
    }
}

/// Source of athlete profiles, fetched on demand.
pub trait ProfileStore: Send + Sync {
    fn profile(&self, athlete_id: u64) -> Option<AthleteProfile>;
}

/// Profiles held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<u64, AthleteProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub fn insert(&self, athlete_id: u64, profile: AthleteProfile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(athlete_id, profile);
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn profile(&self, athlete_id: u64) -> Option<AthleteProfile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&athlete_id)
            .cloned()
    }
}
