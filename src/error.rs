//! Error types for sample ingestion and the periodic cycle.

use thiserror::Error;

/// Reasons a sample is dropped during ingestion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// A required numeric field is missing, non-finite or out of range.
    #[error("Malformed sample: invalid {field}")]
    Malformed { field: &'static str },

    /// The sample is older than the most recent one for this athlete.
    #[error("Stale sample")]
    Stale,

    /// The sample has the same timestamp as the most recent one.
    #[error("Duplicate sample")]
    Duplicate,

    /// The processor is disabled and not accepting samples.
    #[error("Stats processor disabled")]
    Disabled,
}

/// Failures inside the periodic nearby/groups computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    /// A propagated gap became NaN or infinite.
    #[error("Non-finite gap computed for athlete {athlete_id}")]
    NonFiniteGap { athlete_id: u64 },

    /// The computation panicked.
    #[error("Cycle panicked: {0}")]
    Panicked(String),
}

/// Failures starting the background engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Already running")]
    AlreadyRunning,

    #[error("No tokio runtime: {0}")]
    NoRuntime(String),
}
