//! Pattern health - what the body looks like to the controller
//!
//! Health is a pure function of the grid and its history, so measuring twice
//! without evolving in between always yields the same report.

use mindgym_core::ClassificationConfig;
use serde::{Deserialize, Serialize};

/// Cognitive reading of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveState {
    /// All cells dead
    Rest,
    /// Too dense to think
    Overwhelmed,
    /// Too sparse to sustain activity
    Understimulated,
    /// Stuck repeating a prior generation
    Looping,
    /// Moving structures present
    Flowing,
    Balanced,
}

impl CognitiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveState::Rest => "rest",
            CognitiveState::Overwhelmed => "overwhelmed",
            CognitiveState::Understimulated => "understimulated",
            CognitiveState::Looping => "looping",
            CognitiveState::Flowing => "flowing",
            CognitiveState::Balanced => "balanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternHealth {
    /// live / total cells
    pub density: f32,
    /// 1.0 for an exact repeat within the lookback window, otherwise
    /// a scaled similarity to the previous generation
    pub stability: f32,
    pub oscillator_count: usize,
    pub glider_count: usize,
    /// Cycle length if the current generation repeats a recent one
    pub cycle_length: Option<usize>,
    pub state: CognitiveState,
}

impl PatternHealth {
    /// Health of an all-dead grid.
    pub fn rest() -> Self {
        Self {
            density: 0.0,
            stability: 1.0,
            oscillator_count: 0,
            glider_count: 0,
            cycle_length: None,
            state: CognitiveState::Rest,
        }
    }
}

/// Five-way partition (plus rest) by density, stability and motif counts.
pub fn classify(
    density: f32,
    stability: f32,
    glider_count: usize,
    config: &ClassificationConfig,
) -> CognitiveState {
    if density <= 0.0 {
        CognitiveState::Rest
    } else if density > config.overwhelmed_density {
        CognitiveState::Overwhelmed
    } else if density < config.understimulated_density {
        CognitiveState::Understimulated
    } else if stability >= config.looping_stability && glider_count == 0 {
        CognitiveState::Looping
    } else if glider_count >= config.flowing_gliders {
        CognitiveState::Flowing
    } else {
        CognitiveState::Balanced
    }
}
