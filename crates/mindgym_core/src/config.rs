use crate::error::{GymError, GymResult};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GymConfig {
    pub pattern: PatternConfig,
    pub somatic: SomaticConfig,
    pub sync: SyncConfig,
    pub workout: WorkoutConfig,
    pub branch: BranchConfig,
    pub classification: ClassificationConfig,
}

impl GymConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: GymConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_parse::<usize>("MINDGYM_GRID_SIZE") {
            self.pattern.width = n;
            self.pattern.height = n;
        }
        if let Some(v) = env_parse::<f32>("MINDGYM_STRESS_THRESHOLD") {
            self.somatic.stress_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("MINDGYM_REST_THRESHOLD") {
            self.somatic.rest_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("MINDGYM_MERGE_THRESHOLD") {
            self.branch.merge_score_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("MINDGYM_FAST_TIMEOUT_MS") {
            self.sync.fast_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("MINDGYM_SLOW_TIMEOUT_MS") {
            self.sync.slow_timeout_ms = v;
        }
    }

    /// Reject configurations a session cannot run with.
    pub fn validate(&self) -> GymResult<()> {
        let p = &self.pattern;
        if p.width == 0 || p.height == 0 {
            return invalid(format!("grid size must be positive, got {}x{}", p.width, p.height));
        }
        if !(0.0..=1.0).contains(&p.birth_probability) {
            return invalid(format!("birth_probability {} outside [0, 1]", p.birth_probability));
        }
        if p.cycle_detection_lookback == 0 {
            return invalid("cycle_detection_lookback must be at least 1".to_string());
        }
        if p.cycle_detection_lookback > p.history_len {
            return invalid(format!(
                "cycle_detection_lookback {} exceeds history_len {}",
                p.cycle_detection_lookback, p.history_len
            ));
        }

        let s = &self.somatic;
        unit("somatic.stress_threshold", s.stress_threshold)?;
        unit("somatic.rest_threshold", s.rest_threshold)?;
        unit("somatic.tension_rest_threshold", s.tension_rest_threshold)?;
        unit("somatic.exploratory_arousal", s.exploratory_arousal)?;
        unit("somatic.coherence_blend", s.coherence_blend)?;
        unit("somatic.stability_weight", s.stability_weight)?;
        unit("somatic.arousal_decay", s.arousal_decay)?;
        unit("somatic.arousal_baseline", s.arousal_baseline)?;
        unit("somatic.arousal_gain", s.arousal_gain)?;
        unit("somatic.valence_decay", s.valence_decay)?;
        unit("somatic.tension_per_thought", s.tension_per_thought)?;
        let bursts = &s.burst_size_tiers;
        if bursts.conservative == 0 || bursts.balanced == 0 || bursts.exploratory == 0 {
            return invalid("burst_size_tiers must all be at least 1".to_string());
        }
        let rounds = &s.dialogue_rounds_tiers;
        if rounds.conservative == 0 || rounds.balanced == 0 || rounds.exploratory == 0 {
            return invalid("dialogue_rounds_tiers must all be at least 1".to_string());
        }
        let temps = &s.temperature_tiers;
        for t in [temps.conservative, temps.balanced, temps.exploratory] {
            if !(0.0..=2.0).contains(&t) {
                return invalid(format!("temperature tier {} outside [0, 2]", t));
            }
        }

        let sync = &self.sync;
        if sync.fast_timeout_ms == 0 || sync.slow_timeout_ms == 0 {
            return invalid("producer timeouts must be positive".to_string());
        }
        if sync.max_attempts == 0 {
            return invalid("sync.max_attempts must be at least 1".to_string());
        }
        if sync.max_concurrency == Some(0) {
            return invalid("sync.max_concurrency must be at least 1 when set".to_string());
        }

        let w = &self.workout;
        let [a, b, c] = w.tension_thresholds_secs;
        if !(a > 0.0 && a < b && b < c) || !c.is_finite() {
            return invalid(format!(
                "tension thresholds must be positive and strictly ascending, got [{}, {}, {}]",
                a, b, c
            ));
        }
        unit("workout.success_threshold", w.success_threshold)?;
        unit("workout.difficulty_stress_threshold", w.difficulty_stress_threshold)?;
        unit("workout.conflict_threshold", w.conflict_threshold)?;
        unit("workout.arousal_kick", w.arousal_kick)?;
        if w.max_difficulty == 0 {
            return invalid("workout.max_difficulty must be at least 1".to_string());
        }
        if w.evolve_steps == 0 || w.loop_strikes == 0 {
            return invalid("workout.evolve_steps and workout.loop_strikes must be at least 1".to_string());
        }

        unit("branch.merge_score_threshold", self.branch.merge_score_threshold)?;

        let k = &self.classification;
        unit("classification.overwhelmed_density", k.overwhelmed_density)?;
        unit("classification.understimulated_density", k.understimulated_density)?;
        unit("classification.looping_stability", k.looping_stability)?;
        if k.understimulated_density >= k.overwhelmed_density {
            return invalid("understimulated_density must be below overwhelmed_density".to_string());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn invalid(msg: String) -> GymResult<()> {
    Err(GymError::InvalidConfiguration(msg))
}

fn unit(name: &str, v: f32) -> GymResult<()> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        invalid(format!("{} = {} outside [0, 1]", name, v))
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// One value per stress tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Tiers<T> {
    pub conservative: T,
    pub balanced: T,
    pub exploratory: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub width: usize,
    pub height: usize,
    /// Chance a dead cell with exactly two live neighbors is born (spontaneous ideation)
    pub birth_probability: f64,
    /// Generations retained for cycle detection
    pub history_len: usize,
    pub cycle_detection_lookback: usize,
    /// Fixed RNG seed; random when absent
    pub seed: Option<u64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            birth_probability: 0.1,
            history_len: 16,
            cycle_detection_lookback: 8,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SomaticConfig {
    /// Above this stress the controller recommends the conservative tier
    pub stress_threshold: f32,
    /// Above this stress the session needs rest
    pub rest_threshold: f32,
    /// Above this tension the session needs rest
    pub tension_rest_threshold: f32,
    /// Below this arousal (and under the stress threshold) the exploratory tier is used
    pub exploratory_arousal: f32,
    pub burst_size_tiers: Tiers<usize>,
    pub dialogue_rounds_tiers: Tiers<u32>,
    pub temperature_tiers: Tiers<f32>,
    /// Weight of new agreement in `coherence = coherence*(1-w) + agreement*w`
    pub coherence_blend: f32,
    /// Share of agreement taken from pattern stability (rest from burst variance)
    pub stability_weight: f32,
    /// Arousal retained per slow-producer cycle
    pub arousal_decay: f32,
    pub arousal_baseline: f32,
    /// Arousal added per unit of discarded burst share
    pub arousal_gain: f32,
    /// Valence retained per cycle when no sentiment signal is present
    pub valence_decay: f32,
    pub tension_per_thought: f32,
}

impl Default for SomaticConfig {
    fn default() -> Self {
        Self {
            stress_threshold: 0.7,
            rest_threshold: 0.9,
            tension_rest_threshold: 0.9,
            exploratory_arousal: 0.3,
            burst_size_tiers: Tiers {
                conservative: 3,
                balanced: 8,
                exploratory: 16,
            },
            dialogue_rounds_tiers: Tiers {
                conservative: 1,
                balanced: 2,
                exploratory: 4,
            },
            temperature_tiers: Tiers {
                conservative: 0.3,
                balanced: 0.6,
                exploratory: 0.9,
            },
            coherence_blend: 0.3,
            stability_weight: 0.5,
            arousal_decay: 0.8,
            arousal_baseline: 0.0,
            arousal_gain: 0.2,
            valence_decay: 0.9,
            tension_per_thought: 0.02,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub fast_timeout_ms: u64,
    pub slow_timeout_ms: u64,
    /// Parallel fast calls per burst; unbounded (burst size) when absent
    pub max_concurrency: Option<usize>,
    /// Fast bursts attempted per cycle before giving up
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fast_timeout_ms: 500,
            slow_timeout_ms: 5_000,
            max_concurrency: None,
            max_attempts: 2,
        }
    }
}

impl SyncConfig {
    pub fn fast_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_timeout_ms)
    }

    pub fn slow_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkoutConfig {
    /// Elapsed tension boundaries: warm-up → build → peak → (rest only via needs_rest)
    pub tension_thresholds_secs: [f64; 3],
    /// Coherence above which a tick counts as successful synthesis
    pub success_threshold: f32,
    /// Stress above which difficulty is lowered
    pub difficulty_stress_threshold: f32,
    pub initial_difficulty: u32,
    pub max_difficulty: u32,
    /// Pattern generations per tick
    pub evolve_steps: u32,
    /// Consecutive loop detections before recovery kicks in
    pub loop_strikes: u32,
    /// Noise motifs stamped during loop recovery
    pub noise_injections: u32,
    /// Arousal added during loop recovery
    pub arousal_kick: f32,
    /// Fast/slow confidence gap treated as a conflict signal
    pub conflict_threshold: f32,
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            tension_thresholds_secs: [5.0, 15.0, 30.0],
            success_threshold: 0.8,
            difficulty_stress_threshold: 0.8,
            initial_difficulty: 1,
            max_difficulty: 10,
            evolve_steps: 1,
            loop_strikes: 2,
            noise_injections: 3,
            arousal_kick: 0.2,
            conflict_threshold: 0.5,
        }
    }
}

impl WorkoutConfig {
    pub fn tension_thresholds(&self) -> [Duration; 3] {
        self.tension_thresholds_secs.map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BranchConfig {
    /// Evaluation score above which a fork is integrated
    pub merge_score_threshold: f32,
    /// Generations a fork's private grid is evolved during evaluation
    pub evaluation_steps: u32,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            merge_score_threshold: 0.7,
            evaluation_steps: 8,
        }
    }
}

/// Boundaries of the five-way cognitive classification of pattern health.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub overwhelmed_density: f32,
    pub understimulated_density: f32,
    pub looping_stability: f32,
    /// Gliders needed for the grid to count as flowing
    pub flowing_gliders: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            overwhelmed_density: 0.45,
            understimulated_density: 0.03,
            looping_stability: 1.0,
            flowing_gliders: 1,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
