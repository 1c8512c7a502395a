//! Nearby riders and the groups they form around the watched athlete.

pub mod compute;
pub mod groups;

pub use compute::{NearbyAthlete, NearbyComputer};
pub use groups::{compute_groups, Group};
