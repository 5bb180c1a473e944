//! Snapshot branches
//!
//! A fork is an immutable copy of a session's somatic state, pattern grid
//! and thought history. Nothing done with a fork reaches the live session
//! until the caller explicitly integrates it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mindgym_core::{GymError, GymResult, SomaticVector, Thought, WorkoutPhase};
use mindgym_limbic::PatternGrid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Everything a branch needs to be evaluated without the live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub somatic: SomaticVector,
    pub grid: PatternGrid,
    pub thoughts: Vec<Thought>,
    pub difficulty: u32,
    pub phase: WorkoutPhase,
    pub forked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchHandle {
    pub id: Uuid,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    /// Fold the branch's thoughts and grid back into the live session
    Integrate,
    Discard,
}

/// Fork/resolve contract over any versioned store.
#[async_trait]
pub trait SnapshotBranchManager: Send + Sync {
    /// Store an immutable copy and return a handle to it.
    async fn fork(&self, snapshot: SessionSnapshot) -> GymResult<BranchHandle>;

    async fn get(&self, handle: &BranchHandle) -> GymResult<Arc<SessionSnapshot>>;

    /// Replace the branch's contents with what exploring it produced.
    /// The live session is not affected.
    async fn record_exploration(&self, handle: &BranchHandle, explored: SessionSnapshot) -> GymResult<()>;

    /// Decide from an evaluation score. Discarded branches are dropped.
    async fn resolve(&self, handle: &BranchHandle, score: f32) -> GymResult<MergeDecision>;

    /// Remove the branch and hand back its contents (for integration).
    async fn take(&self, handle: &BranchHandle) -> GymResult<Arc<SessionSnapshot>>;

    async fn discard(&self, handle: &BranchHandle) -> GymResult<()>;
}

/// Branches held as shared in-memory copies.
pub struct InMemoryBranchManager {
    branches: RwLock<HashMap<Uuid, Arc<SessionSnapshot>>>,
    merge_threshold: f32,
}

impl InMemoryBranchManager {
    pub fn new(merge_threshold: f32) -> Self {
        Self {
            branches: RwLock::new(HashMap::new()),
            merge_threshold: merge_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn merge_threshold(&self) -> f32 {
        self.merge_threshold
    }

    pub async fn len(&self) -> usize {
        self.branches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.branches.read().await.is_empty()
    }
}

impl Default for InMemoryBranchManager {
    fn default() -> Self {
        Self::new(0.7)
    }
}

fn missing(handle: &BranchHandle) -> GymError {
    GymError::Branch(format!("no branch {}", handle.id))
}

#[async_trait]
impl SnapshotBranchManager for InMemoryBranchManager {
    async fn fork(&self, snapshot: SessionSnapshot) -> GymResult<BranchHandle> {
        let handle = BranchHandle {
            id: Uuid::new_v4(),
            session_id: snapshot.session_id,
        };
        tracing::info!(
            session_id = %handle.session_id,
            branch = %handle.id,
            thoughts = snapshot.thoughts.len(),
            generation = snapshot.grid.generation(),
            "Session forked"
        );
        self.branches
            .write()
            .await
            .insert(handle.id, Arc::new(snapshot));
        Ok(handle)
    }

    async fn get(&self, handle: &BranchHandle) -> GymResult<Arc<SessionSnapshot>> {
        self.branches
            .read()
            .await
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| missing(handle))
    }

    async fn record_exploration(&self, handle: &BranchHandle, explored: SessionSnapshot) -> GymResult<()> {
        if explored.session_id != handle.session_id {
            return Err(GymError::Branch(format!(
                "branch {} belongs to session {}, not {}",
                handle.id, handle.session_id, explored.session_id
            )));
        }
        let mut branches = self.branches.write().await;
        let slot = branches.get_mut(&handle.id).ok_or_else(|| missing(handle))?;
        tracing::debug!(
            branch = %handle.id,
            generation = explored.grid.generation(),
            thoughts = explored.thoughts.len(),
            "Branch explored"
        );
        *slot = Arc::new(explored);
        Ok(())
    }

    async fn resolve(&self, handle: &BranchHandle, score: f32) -> GymResult<MergeDecision> {
        let mut branches = self.branches.write().await;
        if !branches.contains_key(&handle.id) {
            return Err(missing(handle));
        }
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        let decision = if score > self.merge_threshold {
            MergeDecision::Integrate
        } else {
            branches.remove(&handle.id);
            MergeDecision::Discard
        };
        tracing::info!(
            session_id = %handle.session_id,
            branch = %handle.id,
            score,
            ?decision,
            "Branch resolved"
        );
        Ok(decision)
    }

    async fn take(&self, handle: &BranchHandle) -> GymResult<Arc<SessionSnapshot>> {
        self.branches
            .write()
            .await
            .remove(&handle.id)
            .ok_or_else(|| missing(handle))
    }

    async fn discard(&self, handle: &BranchHandle) -> GymResult<()> {
        self.branches
            .write()
            .await
            .remove(&handle.id)
            .map(|_| ())
            .ok_or_else(|| missing(handle))
    }
}
