//! Out-of-band branch resolution.
//!
//! Evaluation can be slow, so it runs on its own task. The live session only
//! waits when it explicitly asks for the outcome.

use crate::branch::{BranchHandle, MergeDecision, SnapshotBranchManager};
use crate::evaluator::BranchEvaluator;
use mindgym_core::{GymError, GymResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub handle: BranchHandle,
    pub score: f32,
    pub decision: MergeDecision,
}

/// A resolution running in the background.
pub struct PendingResolution {
    handle: BranchHandle,
    task: JoinHandle<GymResult<Resolution>>,
}

impl PendingResolution {
    pub fn handle(&self) -> BranchHandle {
        self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> GymResult<Resolution> {
        self.task
            .await
            .map_err(|e| GymError::Branch(format!("resolution task failed: {}", e)))?
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Evaluate and resolve `handle` on a background task.
pub fn spawn_resolution(
    manager: Arc<dyn SnapshotBranchManager>,
    evaluator: Arc<dyn BranchEvaluator>,
    handle: BranchHandle,
) -> PendingResolution {
    let task = tokio::spawn(async move {
        let snapshot = manager.get(&handle).await?;
        let evaluation = evaluator.evaluate(&snapshot).await?;
        if let Some(explored) = evaluation.explored {
            manager.record_exploration(&handle, explored).await?;
        }
        let score = evaluation.score;
        let decision = manager.resolve(&handle, score).await?;
        Ok(Resolution {
            handle,
            score,
            decision,
        })
    });
    PendingResolution { handle, task }
}
