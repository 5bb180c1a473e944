//! Workout Session - one query worked through to rest
//!
//! A session exclusively owns its somatic controller, pattern engine and
//! synchronizer; nothing is shared between sessions. Each `step` is one
//! full tick:
//!
//! 1. map/reduce cycle under the controller's recommended parameters
//! 2. stamp the burst and its refinements into the grid, evolve it
//! 3. fold health and burst agreement into the somatic state
//! 4. loop recovery, difficulty adjustment, phase transition
//! 5. on entering rest, fork the session and resolve the fork out of band

use crate::phase::{PhaseTransition, WorkoutPhaseMachine};
use chrono::Utc;
use mindgym_core::{
    Condition, FastProducer, GymConfig, GymError, GymResult, Origin, SlowProducer,
    SomaticSnapshot, Stimulus, Thought, WorkoutPhase,
};
use mindgym_limbic::{
    confidence_variance, CycleSignals, ParameterBundle, PatternEngine, PatternGrid, PatternHealth,
    SomaticController,
};
use mindgym_memory::{
    spawn_resolution, BranchEvaluator, BranchHandle, PendingResolution, SessionSnapshot,
    SnapshotBranchManager,
};
use mindgym_reasoning::{cancel_pair, CancelHandle, CycleOutcome, CycleStatus, TemporalSynchronizer};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// What one tick did
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub session_id: Uuid,
    pub step: u64,
    pub phase: WorkoutPhase,
    pub transition: PhaseTransition,
    pub somatic: SomaticSnapshot,
    pub pattern_health: PatternHealth,
    /// Fast thoughts that survived reduction
    pub selected_thoughts: Vec<Thought>,
    /// Slow refinements, 1:1 with `selected_thoughts` (placeholders included)
    pub refined_thoughts: Vec<Thought>,
    pub parameters: ParameterBundle,
    pub difficulty: u32,
    pub conditions: Vec<Condition>,
    /// Fork taken on entering rest
    pub branch: Option<BranchHandle>,
    pub overtime: bool,
}

impl StepReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Collaborators a session is wired to.
pub struct SessionDeps {
    pub fast: Arc<dyn FastProducer>,
    pub slow: Arc<dyn SlowProducer>,
    pub branches: Arc<dyn SnapshotBranchManager>,
    pub evaluator: Arc<dyn BranchEvaluator>,
}

pub struct WorkoutSession {
    id: Uuid,
    stimulus: Stimulus,
    config: GymConfig,
    started: Instant,
    machine: WorkoutPhaseMachine,
    controller: SomaticController,
    engine: PatternEngine,
    synchronizer: TemporalSynchronizer,
    thoughts: Vec<Thought>,
    loop_strikes: u32,
    steps: u64,
    cancel: CancelHandle,
    branches: Arc<dyn SnapshotBranchManager>,
    evaluator: Arc<dyn BranchEvaluator>,
    rest_branch: Option<BranchHandle>,
    pending: Option<PendingResolution>,
}

impl WorkoutSession {
    /// Validates `config`; the session never starts on error.
    pub fn new(stimulus: Stimulus, config: GymConfig, deps: SessionDeps) -> GymResult<Self> {
        config.validate()?;
        let (cancel, _) = cancel_pair();
        Ok(Self {
            id: Uuid::new_v4(),
            stimulus,
            started: Instant::now(),
            machine: WorkoutPhaseMachine::new(&config.workout),
            controller: SomaticController::new(config.somatic.clone()),
            engine: PatternEngine::from_config(&config),
            synchronizer: TemporalSynchronizer::new(deps.fast, deps.slow, config.sync.clone()),
            thoughts: Vec::new(),
            loop_strikes: 0,
            steps: 0,
            cancel,
            branches: deps.branches,
            evaluator: deps.evaluator,
            rest_branch: None,
            pending: None,
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> WorkoutPhase {
        self.machine.phase()
    }

    pub fn is_complete(&self) -> bool {
        self.machine.phase().is_terminal()
    }

    pub fn grid(&self) -> &PatternGrid {
        self.engine.grid()
    }

    pub fn thoughts(&self) -> &[Thought] {
        &self.thoughts
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn branches(&self) -> &Arc<dyn SnapshotBranchManager> {
        &self.branches
    }

    pub fn evaluator(&self) -> &Arc<dyn BranchEvaluator> {
        &self.evaluator
    }

    pub fn rest_branch(&self) -> Option<BranchHandle> {
        self.rest_branch
    }

    /// Immutable copy of the live state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            somatic: self.controller.state(),
            grid: self.engine.snapshot(),
            thoughts: self.thoughts.clone(),
            difficulty: self.machine.difficulty(),
            phase: self.machine.phase(),
            forked_at: Utc::now(),
        }
    }

    pub async fn step(&mut self) -> GymResult<StepReport> {
        if self.is_complete() {
            return Err(GymError::SessionComplete(self.id));
        }
        self.steps += 1;
        let span = tracing::info_span!(
            "workout_step",
            session_id = %self.id,
            step = self.steps,
            phase = self.machine.phase().as_str()
        );
        self.run_step().instrument(span).await
    }

    async fn run_step(&mut self) -> GymResult<StepReport> {
        let signal = self.cancel.signal();
        let params = self.controller.recommend_parameters();
        let mut conditions = Vec::new();

        if signal.is_cancelled() {
            conditions.push(Condition::Cancelled);
            let transition = self.machine.force_rest();
            let health = self.engine.measure_health();
            return self
                .finish(transition, params, health, None, conditions)
                .await;
        }

        let outcome = self
            .synchronizer
            .run_cycle(&self.stimulus, &params, &signal)
            .await;
        if outcome.fast_timeouts + outcome.slow_timeouts > 0 {
            conditions.push(Condition::Timeout);
        }

        let (transition, health) = match outcome.status {
            CycleStatus::Completed => {
                let health = self.absorb(&outcome, &mut conditions);
                // A cancel that lands after the last producer call still rests
                let transition = if signal.is_cancelled() {
                    tracing::info!(condition = %Condition::Cancelled, "Cancelled as the cycle completed");
                    conditions.push(Condition::Cancelled);
                    self.machine.force_rest()
                } else {
                    let needs_rest = self.controller.needs_rest();
                    self.machine.tick(self.started.elapsed(), needs_rest)
                };
                (transition, health)
            }
            CycleStatus::EmptyBurst => {
                tracing::warn!(
                    condition = %Condition::EmptyBurst,
                    attempts = outcome.attempts,
                    "No fast thoughts survived, forcing rest"
                );
                conditions.push(Condition::EmptyBurst);
                (self.machine.force_rest(), self.engine.measure_health())
            }
            CycleStatus::Cancelled => {
                conditions.push(Condition::Cancelled);
                self.record(&outcome);
                (self.machine.force_rest(), self.engine.measure_health())
            }
        };

        self.finish(transition, params, health, Some(outcome), conditions)
            .await
    }

    /// Fold a completed cycle into the grid and the somatic state.
    fn absorb(&mut self, outcome: &CycleOutcome, conditions: &mut Vec<Condition>) -> PatternHealth {
        let workout = &self.config.workout;

        for thought in &outcome.burst {
            self.engine.inject(Origin::Fast, thought.confidence(), false);
        }
        let mut completed = 0;
        let mut sentiments = Vec::new();
        for (selected, refined) in outcome.selected.iter().zip(&outcome.refined) {
            if refined.is_placeholder() {
                continue;
            }
            completed += 1;
            let gap = (selected.confidence() - refined.confidence()).abs();
            let conflict = gap > workout.conflict_threshold;
            if conflict {
                tracing::debug!(source = %selected.id(), gap, "Fast/slow conflict");
            }
            self.engine.inject(Origin::Slow, refined.confidence(), conflict);
            sentiments.extend(refined.sentiment());
        }
        self.engine.evolve(workout.evolve_steps);
        let health = self.engine.measure_health();

        let sentiment = if sentiments.is_empty() {
            None
        } else {
            Some(sentiments.iter().sum::<f32>() / sentiments.len() as f32)
        };
        let signals = CycleSignals {
            burst_variance: confidence_variance(&outcome.burst),
            burst_len: outcome.burst.len(),
            selected_len: outcome.selected.len(),
            slow_activity: completed > 0,
            sentiment,
        };
        self.controller.update(&health, &signals);
        self.controller.accumulate_tension(outcome.burst.len() + completed);

        let health = if self
            .engine
            .detect_loop(self.config.pattern.cycle_detection_lookback)
        {
            self.loop_strikes += 1;
            if self.loop_strikes >= workout.loop_strikes.max(1) {
                tracing::warn!(
                    condition = %Condition::LoopDetected,
                    strikes = self.loop_strikes,
                    cycle_length = ?health.cycle_length,
                    "Pattern stuck, injecting noise"
                );
                self.engine.inject_noise(workout.noise_injections);
                self.controller.kick_arousal(workout.arousal_kick);
                self.loop_strikes = 0;
                conditions.push(Condition::LoopDetected);
                self.engine.measure_health()
            } else {
                health
            }
        } else {
            self.loop_strikes = 0;
            health
        };

        let state = self.controller.state();
        self.machine.adjust_difficulty(state.coherence, state.stress());
        self.record(outcome);
        health
    }

    /// Keep the burst and every completed refinement in the history.
    fn record(&mut self, outcome: &CycleOutcome) {
        self.thoughts.extend(outcome.burst.iter().cloned());
        self.thoughts.extend(outcome.completed_refinements().cloned());
    }

    async fn finish(
        &mut self,
        transition: PhaseTransition,
        parameters: ParameterBundle,
        pattern_health: PatternHealth,
        outcome: Option<CycleOutcome>,
        conditions: Vec<Condition>,
    ) -> GymResult<StepReport> {
        let branch = if transition.entered_rest() {
            Some(self.fork_for_rest().await?)
        } else {
            None
        };
        let (selected_thoughts, refined_thoughts) = match outcome {
            Some(o) => (o.selected, o.refined),
            None => (Vec::new(), Vec::new()),
        };
        Ok(StepReport {
            session_id: self.id,
            step: self.steps,
            phase: self.machine.phase(),
            transition,
            somatic: self.controller.state().into(),
            pattern_health,
            selected_thoughts,
            refined_thoughts,
            parameters,
            difficulty: self.machine.difficulty(),
            conditions,
            branch,
            overtime: self.machine.is_overtime(),
        })
    }

    /// Fork for rest and start evaluating the fork in the background.
    async fn fork_for_rest(&mut self) -> GymResult<BranchHandle> {
        let handle = self.branches.fork(self.snapshot()).await?;
        self.rest_branch = Some(handle);
        self.pending = Some(spawn_resolution(
            Arc::clone(&self.branches),
            Arc::clone(&self.evaluator),
            handle,
        ));
        Ok(handle)
    }

    /// Rest immediately after a cancellation that arrived between steps.
    pub async fn rest_after_cancel(&mut self) -> GymResult<Option<BranchHandle>> {
        if self.is_complete() {
            return Ok(None);
        }
        self.machine.force_rest();
        self.fork_for_rest().await.map(Some)
    }

    pub fn take_pending(&mut self) -> Option<PendingResolution> {
        self.pending.take()
    }

    /// Replace the grid with the fork's and append its thoughts not already held.
    /// The grid is checked first, so a failed merge changes nothing.
    pub fn merge(&mut self, fork: &SessionSnapshot) -> GymResult<usize> {
        self.engine.replace_grid(fork.grid.clone())?;
        let known: HashSet<Uuid> = self.thoughts.iter().map(Thought::id).collect();
        let before = self.thoughts.len();
        self.thoughts.extend(
            fork.thoughts
                .iter()
                .filter(|t| !known.contains(&t.id()))
                .cloned(),
        );
        Ok(self.thoughts.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindgym_memory::{InMemoryBranchManager, RestEvaluator};
    use mindgym_reasoning::providers::{MockFastProducer, MockSlowProducer};

    fn session(loop_strikes: u32) -> WorkoutSession {
        let mut config = GymConfig::default();
        config.pattern.width = 16;
        config.pattern.height = 16;
        config.pattern.birth_probability = 0.0;
        config.pattern.seed = Some(7);
        config.workout.loop_strikes = loop_strikes;
        let deps = SessionDeps {
            fast: Arc::new(MockFastProducer::default()),
            slow: Arc::new(MockSlowProducer::default()),
            branches: Arc::new(InMemoryBranchManager::default()),
            evaluator: Arc::new(RestEvaluator::from_config(&config)),
        };
        WorkoutSession::new(Stimulus::new("still"), config, deps).unwrap()
    }

    /// A completed cycle that stamped nothing, so only evolution moves the grid.
    fn quiet_cycle() -> CycleOutcome {
        CycleOutcome {
            status: CycleStatus::Completed,
            burst: Vec::new(),
            selected: Vec::new(),
            refined: Vec::new(),
            attempts: 1,
            fast_timeouts: 0,
            slow_timeouts: 0,
        }
    }

    #[tokio::test]
    async fn test_still_life_triggers_loop_recovery() {
        let mut stuck = session(1);
        let mut patient = session(2);
        for s in [&mut stuck, &mut patient] {
            s.engine.inject(Origin::Slow, 0.5, false);
        }
        let still = stuck.grid().cells().to_vec();
        assert_eq!(patient.grid().cells(), still.as_slice());

        let mut stuck_conditions = Vec::new();
        stuck.absorb(&quiet_cycle(), &mut stuck_conditions);
        let mut patient_conditions = Vec::new();
        patient.absorb(&quiet_cycle(), &mut patient_conditions);

        assert_eq!(stuck_conditions, vec![Condition::LoopDetected]);
        assert_eq!(stuck.loop_strikes, 0);
        assert_ne!(stuck.grid().cells(), still.as_slice());
        assert!(stuck.controller.state().arousal > patient.controller.state().arousal);

        // One strike short: the block is left alone
        assert!(patient_conditions.is_empty());
        assert_eq!(patient.loop_strikes, 1);
        assert_eq!(patient.grid().cells(), still.as_slice());
    }

    #[tokio::test]
    async fn test_strikes_accumulate_across_ticks() {
        let mut s = session(2);
        s.engine.inject(Origin::Slow, 0.5, false);
        let before = s.controller.state().arousal;

        let mut first = Vec::new();
        s.absorb(&quiet_cycle(), &mut first);
        assert!(first.is_empty());
        let mut second = Vec::new();
        s.absorb(&quiet_cycle(), &mut second);
        assert_eq!(second, vec![Condition::LoopDetected]);
        assert!(s.controller.state().arousal > before);
    }
}
