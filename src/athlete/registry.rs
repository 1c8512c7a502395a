//! Athlete arena keyed by athlete id.

use super::data::AthleteData;
use std::collections::HashMap;

/// Every tracked athlete. Owned by the processor; callers get ids, not
/// references, across cycles.
#[derive(Debug, Default)]
pub struct AthleteRegistry {
    athletes: HashMap<u64, AthleteData>,
}

impl AthleteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, athlete_id: u64) -> Option<&AthleteData> {
        self.athletes.get(&athlete_id)
    }

    pub fn get_mut(&mut self, athlete_id: u64) -> Option<&mut AthleteData> {
        self.athletes.get_mut(&athlete_id)
    }

    /// Existing entry, or one built by `create`. The flag is true when the
    /// entry was created.
    pub fn get_or_create(&mut self, athlete_id: u64, create: impl FnOnce() -> AthleteData) -> (&mut AthleteData, bool) {
        let mut created = false;
        let ad = self.athletes.entry(athlete_id).or_insert_with(|| {
            created = true;
            create()
        });
        (ad, created)
    }

    pub fn contains(&self, athlete_id: u64) -> bool {
        self.athletes.contains_key(&athlete_id)
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AthleteData> {
        self.athletes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AthleteData> {
        self.athletes.values_mut()
    }

    /// Remove athletes not updated since `now - idle_timeout`. Returns the
    /// removed ids, sorted.
    pub fn gc(&mut self, now: f64, idle_timeout: f64) -> Vec<u64> {
        let cutoff = now - idle_timeout;
        let mut removed: Vec<u64> = self
            .athletes
            .iter()
            .filter(|(_, ad)| ad.updated < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            self.athletes.remove(id);
        }
        removed.sort_unstable();
        removed
    }
}
