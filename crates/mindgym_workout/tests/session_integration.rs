//! End-to-end workout sessions against scripted producers.

use async_trait::async_trait;
use mindgym_core::{
    ClassificationConfig, Condition, FastProducer, GymConfig, GymError, GymResult, Origin,
    PatternConfig, SlowContext, SlowProducer, SomaticConfig, Stimulus, Thought, WorkoutPhase,
};
use mindgym_limbic::{
    CycleSignals, PatternEngine, PatternHealth, ReductionStrategy, SomaticController,
};
use mindgym_memory::{
    BranchEvaluator, Evaluation, InMemoryBranchManager, MergeDecision, RestEvaluator,
    SessionSnapshot,
};
use mindgym_reasoning::providers::{MockFastProducer, MockSlowProducer};
use mindgym_reasoning::{reduce, CancelHandle};
use mindgym_workout::{MindGym, PatternFrame, SessionDeps, WorkoutSession};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Fast producer whose every call outlives any reasonable bound.
struct Stalled;

#[async_trait]
impl FastProducer for Stalled {
    async fn generate(&self, _stimulus: &Stimulus) -> anyhow::Result<Thought> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("never answered")
    }
}

/// Slow producer that counts calls and never answers.
#[derive(Default)]
struct HangingSlow {
    calls: AtomicUsize,
}

#[async_trait]
impl SlowProducer for HangingSlow {
    async fn generate(&self, _s: &Stimulus, _c: &SlowContext) -> anyhow::Result<Thought> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::bail!("never answered")
    }
}

/// Fast producer that repeats one idea, so reduction keeps a single thought.
struct Echo;

#[async_trait]
impl FastProducer for Echo {
    async fn generate(&self, _stimulus: &Stimulus) -> anyhow::Result<Thought> {
        Ok(Thought::new(Origin::Fast, "the same idea", 0.6))
    }
}

/// Slow producer that cancels its session while answering.
#[derive(Default)]
struct CancelWhileAnswering {
    cancel: OnceLock<CancelHandle>,
}

#[async_trait]
impl SlowProducer for CancelWhileAnswering {
    async fn generate(&self, _s: &Stimulus, context: &SlowContext) -> anyhow::Result<Thought> {
        if let Some(cancel) = self.cancel.get() {
            cancel.cancel();
        }
        Ok(Thought::derived(&context.selected, "worked it out", 0.7))
    }
}

struct FixedScore(f32);

#[async_trait]
impl BranchEvaluator for FixedScore {
    async fn evaluate(&self, _snapshot: &SessionSnapshot) -> GymResult<Evaluation> {
        Ok(Evaluation::scored(self.0))
    }
}

/// Explores like the rest evaluator but overrides its verdict.
struct Rescored {
    inner: RestEvaluator,
    score: f32,
}

impl Rescored {
    fn new(score: f32) -> Self {
        Self {
            inner: RestEvaluator::from_config(&config()),
            score,
        }
    }
}

#[async_trait]
impl BranchEvaluator for Rescored {
    async fn evaluate(&self, snapshot: &SessionSnapshot) -> GymResult<Evaluation> {
        let evaluation = self.inner.evaluate(snapshot).await?;
        Ok(Evaluation {
            score: self.score,
            ..evaluation
        })
    }
}

fn config() -> GymConfig {
    let mut config = GymConfig::default();
    config.pattern.width = 16;
    config.pattern.height = 16;
    config.pattern.seed = Some(42);
    config
}

fn mock_gym() -> MindGym {
    MindGym::new(
        Arc::new(MockFastProducer::default()),
        Arc::new(MockSlowProducer::default()),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_a_glider_survives_evolution() {
    let pattern = PatternConfig {
        width: 8,
        height: 8,
        birth_probability: 0.0,
        seed: Some(1),
        ..Default::default()
    };
    let mut engine = PatternEngine::new(&pattern, ClassificationConfig::default());
    engine.inject(Origin::Fast, 0.75, false);
    engine.evolve(4);
    let health = engine.measure_health();
    assert!(health.density > 0.0);
    assert_eq!(PatternFrame::from_grid(engine.grid()).live_pixels(), 5);
}

#[test]
fn scenario_b_coherence_settles_under_agreement() {
    let mut controller = SomaticController::new(SomaticConfig::default());
    let health = PatternHealth { stability: 1.0, ..PatternHealth::rest() };
    let mut previous = controller.state().coherence;
    let mut deltas = Vec::new();
    for _ in 0..5 {
        controller.update(&health, &CycleSignals::from_variance(0.0));
        let coherence = controller.state().coherence;
        deltas.push(coherence - previous);
        previous = coherence;
    }
    assert!(deltas.iter().all(|d| *d > 0.0));
    assert!(deltas.windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn scenario_c_reduction_strategies() {
    let burst: Vec<Thought> = (1..=10)
        .map(|i| Thought::new(Origin::Fast, format!("candidate {}", i), i as f32 / 10.0))
        .collect();
    let conservative = reduce(&burst, ReductionStrategy::Conservative);
    assert_eq!(conservative.len(), 1);
    assert!((conservative[0].confidence() - 1.0).abs() < 1e-6);

    let exploratory = reduce(&burst, ReductionStrategy::Exploratory);
    assert_eq!(exploratory.len(), 1);
    assert!((exploratory[0].confidence() - 0.1).abs() < 1e-6);

    let clustered = reduce(&burst, ReductionStrategy::Clustered);
    assert!((1..=4).contains(&clustered.len()));
}

#[tokio::test(start_paused = true)]
async fn scenario_d_peak_until_rest_is_needed() {
    let gym = mock_gym();
    let handle = gym.start_session(Stimulus::new("spiral"), config()).await.unwrap();

    tokio::time::advance(Duration::from_secs(31)).await;
    let report = gym.step(handle).await.unwrap();
    assert_eq!(report.phase, WorkoutPhase::PeakPerformance);
    assert!(report.overtime);
    assert!(report.branch.is_none());

    // Tension keeps building with every thought until rest is forced
    let mut last = report;
    for _ in 0..50 {
        if gym.is_complete(handle).await.unwrap() {
            break;
        }
        last = gym.step(handle).await.unwrap();
    }
    assert!(gym.is_complete(handle).await.unwrap());
    assert_eq!(last.phase, WorkoutPhase::NeedsRest);
    assert!(last.transition.entered_rest());
    assert!(last.branch.is_some());
    assert!(last.somatic.vector.tension > 0.9 || last.somatic.stress > 0.9);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_empty_burst_forces_rest() {
    let slow = Arc::new(HangingSlow::default());
    let gym = MindGym::new(Arc::new(Stalled), slow.clone());
    let handle = gym.start_session(Stimulus::new("void"), config()).await.unwrap();

    let report = gym.step(handle).await.unwrap();
    assert_eq!(report.phase, WorkoutPhase::NeedsRest);
    assert!(report.conditions.contains(&Condition::EmptyBurst));
    assert!(report.conditions.contains(&Condition::Timeout));
    assert!(report.selected_thoughts.is_empty());
    assert!(report.branch.is_some());
    // No reduction, so the slow producer was never consulted
    assert_eq!(slow.calls.load(Ordering::Relaxed), 0);
}

// ============================================================================
// Session driver
// ============================================================================

#[tokio::test(start_paused = true)]
async fn step_reports_are_consistent() {
    let gym = mock_gym();
    let handle = gym.start_session(Stimulus::new("river"), config()).await.unwrap();
    let report = gym.step(handle).await.unwrap();

    assert_eq!(report.session_id, handle.id());
    assert_eq!(report.step, 1);
    assert_eq!(report.refined_thoughts.len(), report.selected_thoughts.len());
    assert!(report.somatic.vector.is_bounded());
    assert!(report.to_json().unwrap().contains("\"selected_thoughts\""));

    let snapshot = gym.inspect(handle).await.unwrap();
    assert!(snapshot.thoughts.len() >= report.selected_thoughts.len());
    let frame = gym.export_pattern(handle).await.unwrap();
    assert_eq!((frame.width, frame.height), (16, 16));
}

#[tokio::test]
async fn invalid_configuration_never_starts() {
    let gym = mock_gym();
    let mut bad = GymConfig::default();
    bad.pattern.width = 0;
    let result = gym.start_session(Stimulus::new("x"), bad).await;
    assert!(matches!(result, Err(GymError::InvalidConfiguration(_))));
    assert_eq!(gym.session_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn completed_and_unknown_sessions_are_errors() {
    let gym = MindGym::new(Arc::new(Stalled), Arc::new(HangingSlow::default()));
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();
    assert!(matches!(gym.step(handle).await, Err(GymError::SessionComplete(_))));

    gym.end_session(handle).await.unwrap();
    assert!(matches!(gym.step(handle).await, Err(GymError::UnknownSession(_))));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_in_flight_step() {
    let slow = Arc::new(HangingSlow::default());
    let gym = Arc::new(MindGym::new(Arc::new(MockFastProducer::default()), slow.clone()));
    let mut cfg = config();
    cfg.sync.slow_timeout_ms = 600_000;
    let handle = gym.start_session(Stimulus::new("x"), cfg).await.unwrap();

    let stepping = tokio::spawn({
        let gym = Arc::clone(&gym);
        async move { gym.step(handle).await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(slow.calls.load(Ordering::Relaxed) >= 1);

    // The step holds the session, so it reports the fork itself
    assert_eq!(gym.cancel(handle).await.unwrap(), None);
    let report = stepping.await.unwrap().unwrap();
    assert_eq!(report.phase, WorkoutPhase::NeedsRest);
    assert!(report.conditions.contains(&Condition::Cancelled));
    assert!(report.branch.is_some());
    assert!(report.refined_thoughts.iter().all(Thought::is_placeholder));

    // The burst was kept, not lost
    let snapshot = gym.inspect(handle).await.unwrap();
    assert!(!snapshot.thoughts.is_empty());
    assert!(gym.is_complete(handle).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn cancel_landing_as_the_cycle_completes_still_rests() {
    let slow = Arc::new(CancelWhileAnswering::default());
    let deps = SessionDeps {
        fast: Arc::new(Echo),
        slow: slow.clone(),
        branches: Arc::new(InMemoryBranchManager::default()),
        evaluator: Arc::new(FixedScore(0.0)),
    };
    let mut session = WorkoutSession::new(Stimulus::new("x"), config(), deps).unwrap();
    assert!(slow.cancel.set(session.cancel_handle()).is_ok());

    let report = session.step().await.unwrap();
    assert!(session.cancel_handle().is_cancelled());
    assert_eq!(report.phase, WorkoutPhase::NeedsRest);
    assert!(report.conditions.contains(&Condition::Cancelled));
    assert!(report.branch.is_some());
    assert!(session.is_complete());
    // The refinement that finished is kept
    assert!(session
        .thoughts()
        .iter()
        .any(|t| t.origin() == Origin::Slow && t.content() == "worked it out"));
}

#[tokio::test(start_paused = true)]
async fn cancel_between_steps_rests_immediately() {
    let gym = mock_gym();
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();

    let branch = gym.cancel(handle).await.unwrap();
    assert!(branch.is_some());
    assert!(gym.is_complete(handle).await.unwrap());
    // Cancelling again forks nothing new
    assert_eq!(gym.cancel(handle).await.unwrap(), None);
}

// ============================================================================
// Branches
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fork_then_discard_leaves_session_untouched() {
    let gym = mock_gym();
    let handle = gym.start_session(Stimulus::new("loop"), config()).await.unwrap();
    gym.step(handle).await.unwrap();
    gym.step(handle).await.unwrap();

    let before = gym.inspect(handle).await.unwrap();
    let branch = gym.fork_session(handle).await.unwrap();
    let decision = gym.resolve_branch(handle, branch, 0.0).await.unwrap();
    assert_eq!(decision, MergeDecision::Discard);
    let after = gym.inspect(handle).await.unwrap();

    assert_eq!(before.somatic, after.somatic);
    assert_eq!(before.grid.to_bytes(), after.grid.to_bytes());
    assert_eq!(before.grid, after.grid);
    assert_eq!(before.thoughts, after.thoughts);
}

#[tokio::test(start_paused = true)]
async fn rest_fork_is_integrated_when_scored_high() {
    let gym = mock_gym().with_evaluator(Arc::new(Rescored::new(0.95)));
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();
    gym.step(handle).await.unwrap();
    let branch = gym.cancel(handle).await.unwrap().unwrap();
    let before = gym.inspect(handle).await.unwrap();

    let resolution = gym.integrate_branch(handle).await.unwrap().unwrap();
    assert_eq!(resolution.handle, branch);
    assert_eq!(resolution.decision, MergeDecision::Integrate);

    // The generations evolved while resting and the rest summary are folded in
    let after = gym.inspect(handle).await.unwrap();
    assert!(after.grid.generation() > before.grid.generation());
    assert_ne!(after.grid, before.grid);
    assert_eq!(after.thoughts.len(), before.thoughts.len() + 1);
    assert_eq!(&after.thoughts[..before.thoughts.len()], before.thoughts.as_slice());

    // Resolved once; nothing left pending
    assert!(gym.integrate_branch(handle).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn manual_fork_integrates_and_leaves_store_empty() {
    let store = Arc::new(InMemoryBranchManager::new(0.7));
    let gym = mock_gym().with_branch_manager(store.clone());
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();

    let branch = gym.fork_session(handle).await.unwrap();
    assert_eq!(store.len().await, 1);
    let decision = gym.resolve_branch(handle, branch, 0.9).await.unwrap();
    assert_eq!(decision, MergeDecision::Integrate);
    assert!(store.is_empty().await);
    assert!(!gym.is_complete(handle).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn manual_fork_explored_by_evaluator_is_merged() {
    let store = Arc::new(InMemoryBranchManager::new(0.7));
    let gym = mock_gym()
        .with_branch_manager(store.clone())
        .with_evaluator(Arc::new(Rescored::new(0.9)));
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();
    let before = gym.inspect(handle).await.unwrap();

    let branch = gym.fork_session(handle).await.unwrap();
    let resolution = gym.evaluate_branch(handle, branch).await.unwrap();
    assert_eq!(resolution.decision, MergeDecision::Integrate);
    assert!(store.is_empty().await);

    let after = gym.inspect(handle).await.unwrap();
    assert!(after.grid.generation() > before.grid.generation());
    assert_eq!(after.thoughts.len(), before.thoughts.len() + 1);
}

#[tokio::test(start_paused = true)]
async fn rest_fork_is_discarded_when_scored_low() {
    let gym = mock_gym().with_evaluator(Arc::new(FixedScore(0.2)));
    let handle = gym.start_session(Stimulus::new("x"), config()).await.unwrap();
    gym.step(handle).await.unwrap();
    let before = gym.inspect(handle).await.unwrap();
    gym.cancel(handle).await.unwrap();

    let resolution = gym.integrate_branch(handle).await.unwrap().unwrap();
    assert_eq!(resolution.decision, MergeDecision::Discard);
    let after = gym.inspect(handle).await.unwrap();
    assert_eq!(before.grid, after.grid);
    assert_eq!(before.thoughts, after.thoughts);
}
