//! # Mind Gym Reasoning (System 2)
//!
//! Coordinates the two producers across their time scales. The fast producer
//! is mapped concurrently into a burst; the burst is reduced locally; the
//! survivors are refined one by one by the slow producer.

pub mod cancel;
pub mod providers;
pub mod reduce;
pub mod synchronizer;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use reduce::{cluster, reduce};
pub use synchronizer::{
    CycleOutcome, CycleStatus, MapResult, ReduceResult, SyncPhase, TemporalSynchronizer,
};
