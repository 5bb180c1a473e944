//! Mind Gym - the session driver
//!
//! Owns the producers and a registry of live sessions. Each session sits
//! behind its own mutex so steps on one session are strictly ordered while
//! different sessions proceed independently. The cancel handle lives outside
//! the mutex so a session can be cancelled while a step is in flight.

use crate::export::PatternFrame;
use crate::session::{SessionDeps, StepReport, WorkoutSession};
use mindgym_core::{
    Condition, FastProducer, GymConfig, GymError, GymResult, SlowProducer, Stimulus,
};
use mindgym_memory::{
    spawn_resolution, BranchEvaluator, BranchHandle, InMemoryBranchManager, MergeDecision,
    RestEvaluator, Resolution, SessionSnapshot, SnapshotBranchManager,
};
use mindgym_reasoning::CancelHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    id: Uuid,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct SessionEntry {
    cancel: CancelHandle,
    session: Arc<Mutex<WorkoutSession>>,
}

pub struct MindGym {
    fast: Arc<dyn FastProducer>,
    slow: Arc<dyn SlowProducer>,
    /// Shared branch store; when absent each session gets its own in-memory one
    branches: Option<Arc<dyn SnapshotBranchManager>>,
    evaluator: Option<Arc<dyn BranchEvaluator>>,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl MindGym {
    pub fn new(fast: Arc<dyn FastProducer>, slow: Arc<dyn SlowProducer>) -> Self {
        Self {
            fast,
            slow,
            branches: None,
            evaluator: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_branch_manager(mut self, branches: Arc<dyn SnapshotBranchManager>) -> Self {
        self.branches = Some(branches);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn BranchEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub async fn start_session(&self, stimulus: Stimulus, config: GymConfig) -> GymResult<SessionHandle> {
        let deps = SessionDeps {
            fast: Arc::clone(&self.fast),
            slow: Arc::clone(&self.slow),
            branches: self.branches.clone().unwrap_or_else(|| {
                Arc::new(InMemoryBranchManager::new(config.branch.merge_score_threshold))
            }),
            evaluator: self
                .evaluator
                .clone()
                .unwrap_or_else(|| Arc::new(RestEvaluator::from_config(&config))),
        };
        let query = stimulus.query.clone();
        let session = WorkoutSession::new(stimulus, config, deps)?;
        let handle = SessionHandle { id: session.id() };
        tracing::info!(session_id = %handle.id, query = %query, "Session started");

        self.sessions.write().await.insert(
            handle.id,
            SessionEntry {
                cancel: session.cancel_handle(),
                session: Arc::new(Mutex::new(session)),
            },
        );
        Ok(handle)
    }

    async fn entry(&self, handle: SessionHandle) -> GymResult<(CancelHandle, Arc<Mutex<WorkoutSession>>)> {
        self.sessions
            .read()
            .await
            .get(&handle.id)
            .map(|e| (e.cancel.clone(), Arc::clone(&e.session)))
            .ok_or(GymError::UnknownSession(handle.id))
    }

    async fn session(&self, handle: SessionHandle) -> GymResult<Arc<Mutex<WorkoutSession>>> {
        self.entry(handle).await.map(|(_, session)| session)
    }

    /// One full map → reduce → evolve → phase-transition tick.
    pub async fn step(&self, handle: SessionHandle) -> GymResult<StepReport> {
        let session = self.session(handle).await?;
        let mut session = session.lock().await;
        session.step().await
    }

    pub async fn is_complete(&self, handle: SessionHandle) -> GymResult<bool> {
        let session = self.session(handle).await?;
        let complete = session.lock().await.is_complete();
        Ok(complete)
    }

    pub async fn export_pattern(&self, handle: SessionHandle) -> GymResult<PatternFrame> {
        let session = self.session(handle).await?;
        let frame = PatternFrame::from_grid(session.lock().await.grid());
        Ok(frame)
    }

    /// Copy of the live session state.
    pub async fn inspect(&self, handle: SessionHandle) -> GymResult<SessionSnapshot> {
        let session = self.session(handle).await?;
        let snapshot = session.lock().await.snapshot();
        Ok(snapshot)
    }

    /// Abort in-flight producer calls and send the session to rest.
    ///
    /// Returns the rest fork when the session was idle. When a step is in
    /// flight, that step observes the cancellation, rests and reports the
    /// fork; this call then waits for it and returns `None`.
    pub async fn cancel(&self, handle: SessionHandle) -> GymResult<Option<BranchHandle>> {
        let (cancel, session) = self.entry(handle).await?;
        cancel.cancel();
        tracing::info!(session_id = %handle.id, condition = %Condition::Cancelled, "Session cancelled");
        // Whoever holds the lock last sees the flag, so the session always rests
        let branch = session.lock().await.rest_after_cancel().await?;
        Ok(branch)
    }

    /// Fork the live session without interrupting it.
    pub async fn fork_session(&self, handle: SessionHandle) -> GymResult<BranchHandle> {
        let session = self.session(handle).await?;
        let (branches, snapshot) = {
            let s = session.lock().await;
            (Arc::clone(s.branches()), s.snapshot())
        };
        branches.fork(snapshot).await
    }

    /// Resolve a fork with an externally supplied score.
    ///
    /// An integrated branch is folded into the live session straight away,
    /// so nothing is left behind in the branch store.
    pub async fn resolve_branch(
        &self,
        handle: SessionHandle,
        branch: BranchHandle,
        score: f32,
    ) -> GymResult<MergeDecision> {
        let session = self.session(handle).await?;
        let branches = Arc::clone(session.lock().await.branches());
        let decision = branches.resolve(&branch, score).await?;
        if decision == MergeDecision::Integrate {
            self.apply(handle, &session, branch, score).await?;
        }
        Ok(decision)
    }

    /// Explore and score a fork with the session's evaluator, then apply
    /// the decision.
    pub async fn evaluate_branch(&self, handle: SessionHandle, branch: BranchHandle) -> GymResult<Resolution> {
        let session = self.session(handle).await?;
        let (branches, evaluator) = {
            let s = session.lock().await;
            (Arc::clone(s.branches()), Arc::clone(s.evaluator()))
        };
        let resolution = spawn_resolution(branches, evaluator, branch).wait().await?;
        if resolution.decision == MergeDecision::Integrate {
            self.apply(handle, &session, branch, resolution.score).await?;
        }
        Ok(resolution)
    }

    /// Wait for the rest fork's out-of-band resolution and apply it.
    ///
    /// On "integrate" the fork's grid replaces the live grid and its thought
    /// history is appended, as one step. Returns `None` if no fork is pending.
    pub async fn integrate_branch(&self, handle: SessionHandle) -> GymResult<Option<Resolution>> {
        let session = self.session(handle).await?;
        let pending = session.lock().await.take_pending();
        let Some(pending) = pending else {
            return Ok(None);
        };
        let resolution = pending.wait().await?;
        if resolution.decision == MergeDecision::Integrate {
            self.apply(handle, &session, resolution.handle, resolution.score)
                .await?;
        }
        Ok(Some(resolution))
    }

    /// Take an integrated branch out of the store and merge it.
    async fn apply(
        &self,
        handle: SessionHandle,
        session: &Mutex<WorkoutSession>,
        branch: BranchHandle,
        score: f32,
    ) -> GymResult<usize> {
        let mut live = session.lock().await;
        let fork = live.branches().take(&branch).await?;
        let added = live.merge(&fork)?;
        tracing::info!(
            session_id = %handle.id,
            branch = %branch.id,
            score,
            added,
            generation = fork.grid.generation(),
            "Branch integrated"
        );
        Ok(added)
    }

    /// Drop a session from the registry, cancelling anything in flight.
    pub async fn end_session(&self, handle: SessionHandle) -> GymResult<()> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&handle.id)
            .ok_or(GymError::UnknownSession(handle.id))?;
        entry.cancel.cancel();
        tracing::info!(session_id = %handle.id, "Session ended");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
