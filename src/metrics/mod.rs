//! Metrics module: rolling windows, peaks, power models and zones.

pub mod calculator;
pub mod collector;
pub mod power;
pub mod rolling;
pub mod smoothing;
pub mod wbal;
pub mod zones;

pub use calculator::{CollectorSet, CollectorStats};
pub use collector::{PeakRecord, PeakTracker, SeriesStats};
pub use power::{calc_tss, PowerAccumulation, PowerWindow};
pub use rolling::{Accumulation, Mean, RollingWindow, SampleValue, WindowOptions};
pub use wbal::WBalAccumulator;
pub use zones::{ZoneAccumulator, ZoneDefinition};
