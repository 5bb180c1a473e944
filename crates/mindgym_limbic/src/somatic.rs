//! Somatic Controller - the feedback governor of a workout
//!
//! Owns the session's [`SomaticVector`] and is its only writer. After every
//! reduction/evolution cycle it blends burst agreement and pattern stability
//! into coherence, moves arousal and valence, and from the resulting stress
//! recommends how hard the producers should be driven next.
//!
//! Instead of telling a producer "you're stressed", the controller shrinks
//! its burst, cools its temperature and narrows the reduction strategy.

use crate::health::PatternHealth;
use mindgym_core::{sanitize_f32, SomaticConfig, SomaticVector, Thought};
use serde::{Deserialize, Serialize};

/// How a burst is reduced to the thoughts worth slow processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionStrategy {
    /// Highest-confidence thought only
    Conservative,
    /// Lowest-confidence (most novel) thought only
    Exploratory,
    /// One representative per similarity cluster
    Clustered,
}

/// Stress tier the recommendation was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressTier {
    HighStress,
    Exploratory,
    Balanced,
}

/// Parameters governing the producers for the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBundle {
    pub tier: StressTier,
    pub burst_size: usize,
    pub dialogue_rounds: u32,
    pub temperature: f32,
    pub reduction_strategy: ReductionStrategy,
}

/// What happened during the cycle the controller is being updated from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleSignals {
    /// Variance of fast-producer confidences in the burst
    pub burst_variance: f32,
    /// Thoughts the fast phase produced
    pub burst_len: usize,
    /// Thoughts that survived reduction
    pub selected_len: usize,
    /// Whether the slow producer ran this cycle
    pub slow_activity: bool,
    /// External sentiment signal (-1.0 to 1.0), if any
    pub sentiment: Option<f32>,
}

impl CycleSignals {
    /// Signals carrying only a burst variance.
    pub fn from_variance(burst_variance: f32) -> Self {
        Self {
            burst_variance,
            ..Default::default()
        }
    }
}

/// Population variance of the burst's confidences (0 for fewer than two thoughts).
pub fn confidence_variance(burst: &[Thought]) -> f32 {
    if burst.len() < 2 {
        return 0.0;
    }
    let n = burst.len() as f32;
    let mean = burst.iter().map(|t| t.confidence()).sum::<f32>() / n;
    burst
        .iter()
        .map(|t| (t.confidence() - mean).powi(2))
        .sum::<f32>()
        / n
}

pub struct SomaticController {
    state: SomaticVector,
    config: SomaticConfig,
}

impl SomaticController {
    pub fn new(config: SomaticConfig) -> Self {
        Self::with_state(config, SomaticVector::default())
    }

    pub fn with_state(config: SomaticConfig, state: SomaticVector) -> Self {
        let mut state = state;
        state.normalize();
        Self { state, config }
    }

    pub fn state(&self) -> SomaticVector {
        self.state
    }

    pub fn config(&self) -> &SomaticConfig {
        &self.config
    }

    pub fn stress_level(&self) -> f32 {
        self.state.stress()
    }

    /// Fold one cycle's outcome into the somatic state.
    pub fn update(&mut self, health: &PatternHealth, signals: &CycleSignals) {
        let c = &self.config;

        // Coherence: blend toward agreement of the burst and stability of the body
        let burst_agreement = (1.0 - sanitize_f32(signals.burst_variance, 0.0)).clamp(0.0, 1.0);
        let stability = sanitize_f32(health.stability, 0.0).clamp(0.0, 1.0);
        let agreement =
            burst_agreement * (1.0 - c.stability_weight) + stability * c.stability_weight;
        self.state.coherence =
            self.state.coherence * (1.0 - c.coherence_blend) + agreement * c.coherence_blend;

        // Arousal: settles after slow work, rises with how much of the burst was discarded
        if signals.slow_activity {
            self.state.arousal =
                c.arousal_baseline + (self.state.arousal - c.arousal_baseline) * c.arousal_decay;
        }
        if signals.burst_len > 0 {
            let kept = signals.selected_len.min(signals.burst_len) as f32;
            let discarded = 1.0 - kept / signals.burst_len as f32;
            self.state.arousal += c.arousal_gain * discarded;
        }

        // Valence: recomputed from sentiment when present, otherwise fades to neutral
        self.state.valence = match signals.sentiment {
            Some(s) => s,
            None => self.state.valence * c.valence_decay,
        };

        self.state.normalize();

        tracing::debug!(
            arousal = self.state.arousal,
            valence = self.state.valence,
            coherence = self.state.coherence,
            tension = self.state.tension,
            stress = self.stress_level(),
            "Somatic update"
        );
    }

    /// Tension grows with every processed thought.
    pub fn accumulate_tension(&mut self, thoughts: usize) {
        self.state.tension += self.config.tension_per_thought * thoughts as f32;
        self.state.normalize();
    }

    /// Force arousal upward (loop recovery).
    pub fn kick_arousal(&mut self, amount: f32) {
        self.state.arousal += sanitize_f32(amount, 0.0);
        self.state.normalize();
    }

    pub fn recommend_parameters(&self) -> ParameterBundle {
        let c = &self.config;
        let tier = if self.stress_level() > c.stress_threshold {
            StressTier::HighStress
        } else if self.state.arousal < c.exploratory_arousal {
            StressTier::Exploratory
        } else {
            StressTier::Balanced
        };

        match tier {
            StressTier::HighStress => ParameterBundle {
                tier,
                burst_size: c.burst_size_tiers.conservative,
                dialogue_rounds: c.dialogue_rounds_tiers.conservative,
                temperature: c.temperature_tiers.conservative,
                reduction_strategy: ReductionStrategy::Conservative,
            },
            StressTier::Exploratory => ParameterBundle {
                tier,
                burst_size: c.burst_size_tiers.exploratory,
                dialogue_rounds: c.dialogue_rounds_tiers.exploratory,
                temperature: c.temperature_tiers.exploratory,
                reduction_strategy: ReductionStrategy::Exploratory,
            },
            StressTier::Balanced => ParameterBundle {
                tier,
                burst_size: c.burst_size_tiers.balanced,
                dialogue_rounds: c.dialogue_rounds_tiers.balanced,
                temperature: c.temperature_tiers.balanced,
                reduction_strategy: ReductionStrategy::Clustered,
            },
        }
    }

    pub fn needs_rest(&self) -> bool {
        self.stress_level() > self.config.rest_threshold
            || self.state.tension > self.config.tension_rest_threshold
    }
}
