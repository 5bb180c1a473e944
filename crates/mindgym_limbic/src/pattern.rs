//! Pattern Engine - the automaton "body" of a session
//!
//! Thoughts are hashed onto the grid and stamped as motifs; the grid then
//! evolves under birth/survival rules. Its health feeds back into the
//! somatic controller, which can in turn perturb the grid.
//!
//! Rule: a dead cell is born with exactly 3 live neighbors, or with
//! probability `birth_probability` when it has exactly 2. A live cell
//! survives with 2 or 3 live neighbors.

use crate::grid::PatternGrid;
use crate::health::{classify, CognitiveState, PatternHealth};
use crate::motif::{blinker_masks, glider_masks, ring_is_dead, window_mask, Motif};
use mindgym_core::{sanitize_f32, ClassificationConfig, GymConfig, GymError, GymResult, Origin, PatternConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

/// Where and what an injection stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Injection {
    pub x: usize,
    pub y: usize,
    pub motif: Motif,
}

pub struct PatternEngine {
    grid: PatternGrid,
    rng: StdRng,
    birth_probability: f64,
    lookback: usize,
    classification: ClassificationConfig,
}

impl PatternEngine {
    pub fn new(config: &PatternConfig, classification: ClassificationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            grid: PatternGrid::new(config.width, config.height, config.history_len),
            rng,
            birth_probability: config.birth_probability.clamp(0.0, 1.0),
            lookback: config.cycle_detection_lookback.max(1),
            classification,
        }
    }

    pub fn from_config(config: &GymConfig) -> Self {
        Self::new(&config.pattern, config.classification.clone())
    }

    pub fn grid(&self) -> &PatternGrid {
        &self.grid
    }

    /// Immutable copy of the grid for forking.
    pub fn snapshot(&self) -> PatternGrid {
        self.grid.clone()
    }

    /// Replace the grid wholesale (branch merge). Dimensions must match.
    pub fn replace_grid(&mut self, grid: PatternGrid) -> GymResult<()> {
        if grid.dimensions() != self.grid.dimensions() {
            return Err(GymError::Branch(format!(
                "grid dimensions {:?} do not match live grid {:?}",
                grid.dimensions(),
                self.grid.dimensions()
            )));
        }
        self.grid = grid;
        Ok(())
    }

    /// Stable hash of `(origin, confidence)` onto a grid coordinate.
    pub fn coordinate_for(&self, origin: Origin, confidence: f32) -> (usize, usize) {
        let confidence = sanitize_f32(confidence, 0.0).clamp(0.0, 1.0);
        let mut key = origin.as_str().as_bytes().to_vec();
        key.extend_from_slice(&confidence.to_bits().to_le_bytes());
        let h = Uuid::new_v5(&Uuid::NAMESPACE_OID, &key).as_u128();
        let x = (h as u64 % self.grid.width() as u64) as usize;
        let y = ((h >> 64) as u64 % self.grid.height() as u64) as usize;
        (x, y)
    }

    /// Stamp the motif for a thought's origin at its hashed coordinate.
    /// `conflict` overrides the origin motif with noise.
    pub fn inject(&mut self, origin: Origin, confidence: f32, conflict: bool) -> Injection {
        let (x, y) = self.coordinate_for(origin, confidence);
        let motif = match (conflict, origin) {
            (true, _) => Motif::Noise,
            (false, Origin::Fast) => Motif::Glider,
            (false, Origin::Slow) => Motif::Block,
        };
        motif.stamp(&mut self.grid, x as i64, y as i64, &mut self.rng);
        tracing::trace!(x, y, ?motif, origin = origin.as_str(), "Injected motif");
        Injection { x, y, motif }
    }

    /// Stamp `count` noise motifs at random coordinates (loop recovery).
    pub fn inject_noise(&mut self, count: u32) {
        for _ in 0..count {
            let x = self.rng.gen_range(0..self.grid.width()) as i64;
            let y = self.rng.gen_range(0..self.grid.height()) as i64;
            Motif::Noise.stamp(&mut self.grid, x, y, &mut self.rng);
        }
    }

    /// Apply the birth/survival rules for `steps` generations (at least one).
    pub fn evolve(&mut self, steps: u32) {
        for _ in 0..steps.max(1) {
            self.step();
        }
    }

    fn step(&mut self) {
        let (w, h) = self.grid.dimensions();
        let mut next = vec![false; w * h];
        for y in 0..h {
            for x in 0..w {
                let (xi, yi) = (x as i64, y as i64);
                let n = self.grid.live_neighbors(xi, yi);
                next[y * w + x] = if self.grid.get(xi, yi) {
                    n == 2 || n == 3
                } else {
                    n == 3
                        || (n == 2
                            && self.birth_probability > 0.0
                            && self.rng.gen_bool(self.birth_probability))
                };
            }
        }
        self.grid.advance(next);
    }

    /// True if the current generation exactly equals any of the last `lookback`.
    pub fn detect_loop(&self, lookback: usize) -> bool {
        self.grid.cycle_length(lookback).is_some()
    }

    pub fn measure_health(&self) -> PatternHealth {
        let live = self.grid.live_count();
        if live == 0 {
            return PatternHealth::rest();
        }
        let (w, h) = self.grid.dimensions();
        let density = live as f32 / (w * h) as f32;

        let cycle_length = self.grid.cycle_length(self.lookback);
        let stability = match cycle_length {
            Some(_) => 1.0,
            None => self
                .grid
                .similarity_to_previous()
                .map(|s| s * 0.9)
                .unwrap_or(0.0),
        };

        let (oscillator_count, glider_count) = self.count_motifs();
        let state = classify(density, stability, glider_count, &self.classification);

        PatternHealth {
            density,
            stability,
            oscillator_count,
            glider_count,
            cycle_length,
            state,
        }
    }

    /// Local 3x3 matching of isolated blinkers and gliders.
    fn count_motifs(&self) -> (usize, usize) {
        let gliders = glider_masks();
        let blinkers = blinker_masks();
        let (w, h) = self.grid.dimensions();
        let mut oscillators = 0;
        let mut glider_count = 0;
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let mask = window_mask(&self.grid, x, y);
                if mask == 0 {
                    continue;
                }
                let is_glider = gliders.binary_search(&mask).is_ok();
                let is_blinker = blinkers.contains(&mask);
                if (is_glider || is_blinker) && ring_is_dead(&self.grid, x, y) {
                    if is_glider {
                        glider_count += 1;
                    } else {
                        oscillators += 1;
                    }
                }
            }
        }
        (oscillators, glider_count)
    }

    pub fn classify(&self) -> CognitiveState {
        self.measure_health().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(size: usize, birth_probability: f64) -> PatternEngine {
        let config = PatternConfig {
            width: size,
            height: size,
            birth_probability,
            history_len: 16,
            cycle_detection_lookback: 8,
            seed: Some(7),
        };
        PatternEngine::new(&config, ClassificationConfig::default())
    }

    fn toroidal_distance(a: usize, b: usize, n: usize) -> usize {
        let d = a.abs_diff(b);
        d.min(n - d)
    }

    #[test]
    fn test_glider_survives_on_small_grid() {
        let mut e = engine(8, 0.0);
        let inj = e.inject(Origin::Fast, 0.42, false);
        assert_eq!(inj.motif, Motif::Glider);

        e.evolve(4);
        let health = e.measure_health();
        assert!(health.density > 0.0);

        // At least one live cell near the original 3x3 stamp
        let near = (0..8).any(|y| {
            (0..8).any(|x| {
                e.grid().get(x as i64, y as i64)
                    && toroidal_distance(x, (inj.x + 1) % 8, 8) <= 3
                    && toroidal_distance(y, (inj.y + 1) % 8, 8) <= 3
            })
        });
        assert!(near, "glider extinguished or drifted away");
        // Still exactly five cells after a full period
        assert_eq!(e.grid().live_count(), 5);
    }

    #[test]
    fn test_glider_is_counted() {
        let mut e = engine(8, 0.0);
        e.inject(Origin::Fast, 0.9, false);
        let h = e.measure_health();
        assert_eq!(h.glider_count, 1);
        assert_eq!(h.state, CognitiveState::Flowing);
    }

    #[test]
    fn test_blinker_is_an_oscillator() {
        let mut e = engine(10, 0.0);
        // Horizontal blinker at (4..7, 5)
        for x in 4..7 {
            e.grid.set(x, 5, true);
        }
        let h = e.measure_health();
        assert_eq!(h.oscillator_count, 1);
        e.evolve(2);
        assert!(e.detect_loop(2));
        assert_eq!(e.measure_health().cycle_length, Some(2));
    }

    #[test]
    fn test_coordinate_hash_is_stable() {
        let a = engine(32, 0.1);
        let b = engine(32, 0.1);
        assert_eq!(
            a.coordinate_for(Origin::Fast, 0.5),
            b.coordinate_for(Origin::Fast, 0.5)
        );
        assert_ne!(
            a.coordinate_for(Origin::Fast, 0.5),
            a.coordinate_for(Origin::Slow, 0.5)
        );
    }

    #[test]
    fn test_slow_and_conflict_motifs() {
        let mut e = engine(16, 0.0);
        assert_eq!(e.inject(Origin::Slow, 0.3, false).motif, Motif::Block);
        assert_eq!(e.inject(Origin::Fast, 0.3, true).motif, Motif::Noise);
    }

    #[test]
    fn test_block_is_detected_as_loop() {
        let mut e = engine(8, 0.0);
        e.inject(Origin::Slow, 0.5, false);
        assert!(!e.detect_loop(8));
        e.evolve(1);
        assert!(e.detect_loop(8));
        let h = e.measure_health();
        assert_eq!(h.stability, 1.0);
        assert_eq!(h.state, CognitiveState::Looping);
    }

    #[test]
    fn test_dead_grid_health_is_rest() {
        let mut e = engine(8, 0.5);
        let h = e.measure_health();
        assert_eq!(h.density, 0.0);
        assert_eq!(h.state, CognitiveState::Rest);
        // Spontaneous births need two neighbors, so nothing appears
        e.evolve(3);
        assert_eq!(e.measure_health(), PatternHealth::rest());
    }

    #[test]
    fn test_measure_health_is_idempotent() {
        let mut e = engine(16, 0.1);
        e.inject(Origin::Fast, 0.2, false);
        e.inject(Origin::Slow, 0.7, false);
        e.evolve(3);
        assert_eq!(e.measure_health(), e.measure_health());
    }

    #[test]
    fn test_evolve_zero_steps_still_advances() {
        let mut e = engine(8, 0.0);
        e.evolve(0);
        assert_eq!(e.grid().generation(), 1);
    }

    #[test]
    fn test_replace_grid_rejects_other_dimensions() {
        let mut e = engine(8, 0.0);
        assert!(e.replace_grid(PatternGrid::new(9, 8, 4)).is_err());
        assert!(e.replace_grid(PatternGrid::new(8, 8, 4)).is_ok());
    }

    #[test]
    fn test_inject_noise_keeps_dimensions() {
        let mut e = engine(12, 0.1);
        e.inject_noise(5);
        e.evolve(2);
        assert_eq!(e.grid().dimensions(), (12, 12));
    }
}
