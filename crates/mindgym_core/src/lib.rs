//! # Mind Gym Core
//!
//! Shared vocabulary of the cognitive workout: the somatic state vector,
//! thoughts and their origins, the workout phases, the contracts the two
//! producers must satisfy, configuration and the error taxonomy.

pub mod config;
pub mod error;
pub mod state;
pub mod thought;

pub use config::{
    BranchConfig, ClassificationConfig, GymConfig, PatternConfig, SomaticConfig, SyncConfig,
    Tiers, WorkoutConfig,
};
pub use error::{Condition, GymError, GymResult};
pub use state::{sanitize_f32, SomaticSnapshot, SomaticVector};
pub use thought::{monotonic_micros, Origin, Thought};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Workout phases, in the order a session moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutPhase {
    WarmingUp,
    BuildingStrength,
    PeakPerformance,
    /// Terminal for a session instance
    NeedsRest,
}

impl WorkoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutPhase::WarmingUp => "warming_up",
            WorkoutPhase::BuildingStrength => "building_strength",
            WorkoutPhase::PeakPerformance => "peak_performance",
            WorkoutPhase::NeedsRest => "needs_rest",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == WorkoutPhase::NeedsRest
    }
}

impl std::fmt::Display for WorkoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a producer is asked to think about
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    /// The session's query
    pub query: String,
    /// Recommended sampling temperature for this cycle
    pub temperature: f32,
    /// Position of this call within its burst (0 for slow calls)
    pub index: usize,
}

impl Stimulus {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            temperature: 0.7,
            index: 0,
        }
    }
}

/// Context handed to the slow producer alongside the stimulus
#[derive(Debug, Clone)]
pub struct SlowContext {
    /// The reduced fast thought to refine
    pub selected: Thought,
    /// Internal dialogue rounds the producer may spend
    pub dialogue_rounds: u32,
}

/// Low-latency, high-throughput thought source. May be called concurrently.
#[async_trait]
pub trait FastProducer: Send + Sync {
    async fn generate(&self, stimulus: &Stimulus) -> anyhow::Result<Thought>;
}

/// High-latency, low-throughput thought source. Called sequentially.
#[async_trait]
pub trait SlowProducer: Send + Sync {
    async fn generate(&self, stimulus: &Stimulus, context: &SlowContext) -> anyhow::Result<Thought>;
}
