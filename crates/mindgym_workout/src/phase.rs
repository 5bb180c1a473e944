//! Workout Phase Machine
//!
//! Phases follow elapsed tension time through ascending thresholds:
//!
//! ```text
//! WarmingUp --t0--> BuildingStrength --t1--> PeakPerformance
//!      \________________|_______________________|
//!                needs_rest (any time)  -->  NeedsRest (terminal)
//! ```
//!
//! Past the last threshold the session stays at peak ("overtime") until the
//! somatic controller asks for rest. The machine never moves backwards.

use mindgym_core::{WorkoutConfig, WorkoutPhase};
use serde::Serialize;
use std::time::Duration;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: WorkoutPhase,
    pub to: WorkoutPhase,
}

impl PhaseTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True exactly once: on the tick that entered rest.
    pub fn entered_rest(&self) -> bool {
        self.changed() && self.to.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyChange {
    Raised,
    Lowered,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct WorkoutPhaseMachine {
    phase: WorkoutPhase,
    thresholds: [Duration; 3],
    difficulty: u32,
    max_difficulty: u32,
    success_threshold: f32,
    stress_threshold: f32,
    overtime: bool,
}

impl WorkoutPhaseMachine {
    pub fn new(config: &WorkoutConfig) -> Self {
        let max_difficulty = config.max_difficulty.max(1);
        Self {
            phase: WorkoutPhase::WarmingUp,
            thresholds: config.tension_thresholds(),
            difficulty: config.initial_difficulty.clamp(1, max_difficulty),
            max_difficulty,
            success_threshold: config.success_threshold,
            stress_threshold: config.difficulty_stress_threshold,
            overtime: false,
        }
    }

    pub fn phase(&self) -> WorkoutPhase {
        self.phase
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Whether elapsed time has passed the last threshold.
    pub fn is_overtime(&self) -> bool {
        self.overtime
    }

    fn phase_for(&self, elapsed: Duration) -> WorkoutPhase {
        if elapsed < self.thresholds[0] {
            WorkoutPhase::WarmingUp
        } else if elapsed < self.thresholds[1] {
            WorkoutPhase::BuildingStrength
        } else {
            WorkoutPhase::PeakPerformance
        }
    }

    pub fn tick(&mut self, elapsed: Duration, needs_rest: bool) -> PhaseTransition {
        let from = self.phase;
        if from.is_terminal() {
            return PhaseTransition { from, to: from };
        }
        self.overtime = elapsed >= self.thresholds[2];
        let to = if needs_rest {
            WorkoutPhase::NeedsRest
        } else {
            self.phase_for(elapsed).max(from)
        };
        self.phase = to;
        if to != from {
            tracing::info!(
                from = from.as_str(),
                to = to.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                needs_rest,
                "Workout phase transition"
            );
        }
        PhaseTransition { from, to }
    }

    /// Jump straight to rest (cancellation, empty burst).
    pub fn force_rest(&mut self) -> PhaseTransition {
        let from = self.phase;
        self.phase = WorkoutPhase::NeedsRest;
        PhaseTransition {
            from,
            to: self.phase,
        }
    }

    /// Raise difficulty on successful synthesis, lower it under stress.
    pub fn adjust_difficulty(&mut self, coherence: f32, stress: f32) -> DifficultyChange {
        if coherence > self.success_threshold && self.difficulty < self.max_difficulty {
            self.difficulty += 1;
            DifficultyChange::Raised
        } else if coherence <= self.success_threshold
            && stress > self.stress_threshold
            && self.difficulty > 1
        {
            self.difficulty -= 1;
            DifficultyChange::Lowered
        } else {
            DifficultyChange::Unchanged
        }
    }
}
