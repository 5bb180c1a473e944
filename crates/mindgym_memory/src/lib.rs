//! # Mind Gym Memory
//!
//! Rest-time branching. When a session needs rest it is forked into an
//! isolated snapshot; an evaluator scores the fork off the session's path,
//! and the fork is either integrated back (atomically) or discarded.

pub mod branch;
pub mod evaluator;
pub mod resolution;

pub use branch::{
    BranchHandle, InMemoryBranchManager, MergeDecision, SessionSnapshot, SnapshotBranchManager,
};
pub use evaluator::{BranchEvaluator, Evaluation, RestEvaluator};
pub use resolution::{spawn_resolution, PendingResolution, Resolution};
