//! Error hierarchy
//!
//! Only fatal conditions are errors. Producer timeouts, empty bursts and
//! pattern loops are recovered in place and reported as [`Condition`] events.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Root error type for mind gym failures.
#[derive(Error, Debug)]
pub enum GymError {
    /// Out-of-range thresholds or grid sizes supplied at session start.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No live session with this id.
    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    /// The session already reached its terminal rest phase.
    #[error("session {0} is complete")]
    SessionComplete(Uuid),

    /// Snapshot/branch backend failed.
    #[error("branch error: {0}")]
    Branch(String),
}

pub type GymResult<T> = Result<T, GymError>;

/// Recoverable conditions, logged as structured events and never surfaced as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// A single producer call exceeded its bound (or failed).
    Timeout,
    /// The fast phase produced no thoughts at all.
    EmptyBurst,
    /// The pattern cycle detector fired repeatedly.
    LoopDetected,
    /// Session-level cancellation aborted in-flight work.
    Cancelled,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Timeout => "timeout",
            Condition::EmptyBurst => "empty_burst",
            Condition::LoopDetected => "loop_detected",
            Condition::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
