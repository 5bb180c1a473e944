//! Branch evaluation
//!
//! Scoring a fork is a value judgment supplied from outside the session.
//! [`RestEvaluator`] is the built-in judge: it lets the forked grid keep
//! evolving on its own for a while and rewards forks that end up coherent,
//! stable and still moving. What the fork became while resting is handed
//! back with the score so an integrated branch carries it home.

use crate::branch::SessionSnapshot;
use async_trait::async_trait;
use mindgym_core::{ClassificationConfig, GymConfig, GymResult, Origin, PatternConfig, Thought};
use mindgym_limbic::{CognitiveState, PatternEngine};

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// In [0, 1]; higher means more worth integrating
    pub score: f32,
    /// The branch as it stands after exploration, if exploring changed it
    pub explored: Option<SessionSnapshot>,
}

impl Evaluation {
    pub fn scored(score: f32) -> Self {
        Self {
            score,
            explored: None,
        }
    }

    pub fn explored(score: f32, snapshot: SessionSnapshot) -> Self {
        Self {
            score,
            explored: Some(snapshot),
        }
    }
}

#[async_trait]
pub trait BranchEvaluator: Send + Sync {
    /// Judge a fork without touching it.
    async fn evaluate(&self, snapshot: &SessionSnapshot) -> GymResult<Evaluation>;
}

pub struct RestEvaluator {
    pattern: PatternConfig,
    classification: ClassificationConfig,
    steps: u32,
}

impl RestEvaluator {
    pub fn new(pattern: PatternConfig, classification: ClassificationConfig, steps: u32) -> Self {
        Self {
            pattern,
            classification,
            steps,
        }
    }

    pub fn from_config(config: &GymConfig) -> Self {
        Self::new(
            config.pattern.clone(),
            config.classification.clone(),
            config.branch.evaluation_steps,
        )
    }
}

fn state_bonus(state: CognitiveState) -> f32 {
    match state {
        CognitiveState::Flowing => 1.0,
        CognitiveState::Balanced => 0.7,
        CognitiveState::Looping => 0.3,
        CognitiveState::Understimulated => 0.2,
        CognitiveState::Overwhelmed => 0.1,
        CognitiveState::Rest => 0.0,
    }
}

#[async_trait]
impl BranchEvaluator for RestEvaluator {
    async fn evaluate(&self, snapshot: &SessionSnapshot) -> GymResult<Evaluation> {
        let (width, height) = snapshot.grid.dimensions();
        let config = PatternConfig {
            width,
            height,
            ..self.pattern.clone()
        };
        // Private engine: the snapshot itself is never touched
        let mut engine = PatternEngine::new(&config, self.classification.clone());
        engine.replace_grid(snapshot.grid.clone())?;
        engine.evolve(self.steps);
        let health = engine.measure_health();

        let score = 0.4 * snapshot.somatic.coherence
            + 0.3 * health.stability
            + 0.3 * state_bonus(health.state);
        let score = score.clamp(0.0, 1.0);
        tracing::debug!(
            session_id = %snapshot.session_id,
            coherence = snapshot.somatic.coherence,
            stability = health.stability,
            state = health.state.as_str(),
            score,
            "Branch evaluated"
        );

        let mut explored = snapshot.clone();
        explored.grid = engine.snapshot();
        explored.thoughts.push(Thought::new(
            Origin::Slow,
            format!(
                "rest settled into {} after {} generation(s)",
                health.state.as_str(),
                self.steps.max(1)
            ),
            score,
        ));
        Ok(Evaluation::explored(score, explored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mindgym_core::{SomaticVector, WorkoutPhase};
    use mindgym_limbic::PatternGrid;
    use uuid::Uuid;

    fn snapshot(grid: PatternGrid, coherence: f32) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Uuid::new_v4(),
            somatic: SomaticVector::new(0.5, 0.0, coherence, 0.3),
            grid,
            thoughts: Vec::new(),
            difficulty: 1,
            phase: WorkoutPhase::NeedsRest,
            forked_at: Utc::now(),
        }
    }

    fn evaluator() -> RestEvaluator {
        let pattern = PatternConfig {
            birth_probability: 0.0,
            seed: Some(1),
            ..Default::default()
        };
        RestEvaluator::new(pattern, ClassificationConfig::default(), 4)
    }

    #[tokio::test]
    async fn test_dead_fork_stays_below_merge_threshold() {
        // A dead grid is perfectly still but earns no state bonus
        let snap = snapshot(PatternGrid::new(8, 8, 8), 0.5);
        let score = evaluator().evaluate(&snap).await.unwrap().score;
        assert!((score - 0.5).abs() < 1e-6, "score {}", score);
        assert!(score < 0.7);
    }

    #[tokio::test]
    async fn test_block_fork_scores_as_stable() {
        let mut grid = PatternGrid::new(8, 8, 8);
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            grid.set(x, y, true);
        }
        let snap = snapshot(grid, 1.0);
        // 0.4 coherence + 0.3 stability + 0.3 * looping bonus
        let score = evaluator().evaluate(&snap).await.unwrap().score;
        assert!((score - 0.79).abs() < 1e-5, "score {}", score);
    }

    #[tokio::test]
    async fn test_evaluation_leaves_snapshot_alone() {
        let mut grid = PatternGrid::new(8, 8, 8);
        for x in 2..5 {
            grid.set(x, 4, true);
        }
        let snap = snapshot(grid, 0.6);
        let before = snap.clone();
        evaluator().evaluate(&snap).await.unwrap();
        assert_eq!(snap, before);
    }

    #[tokio::test]
    async fn test_exploration_carries_the_rested_grid() {
        let mut grid = PatternGrid::new(8, 8, 8);
        for x in 2..5 {
            grid.set(x, 4, true);
        }
        let snap = snapshot(grid, 0.6);
        let evaluation = evaluator().evaluate(&snap).await.unwrap();
        let explored = evaluation.explored.unwrap();

        assert_eq!(explored.grid.generation(), snap.grid.generation() + 4);
        assert_eq!(explored.session_id, snap.session_id);
        // Blinker has period 2, so after 4 generations it is back in phase
        assert_eq!(explored.grid.cells(), snap.grid.cells());
        assert_eq!(explored.thoughts.len(), snap.thoughts.len() + 1);
        let summary = explored.thoughts.last().unwrap();
        assert_eq!(summary.origin(), Origin::Slow);
        assert!(!summary.is_placeholder());
        assert!((summary.confidence() - evaluation.score).abs() < 1e-6);
    }
}
