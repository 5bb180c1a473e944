//! # Mind Gym Limbic System (System 1)
//!
//! The fast, non-verbal half of a workout session:
//!
//! - **PatternEngine**: a toroidal cellular automaton that both visualizes
//!   the session's thoughts and perturbs the controller through its health
//! - **SomaticController**: owns the somatic vector, derives stress, and
//!   recommends producer parameters
//!
//! ## Feedback loop
//!
//! 1. Thoughts are stamped into the grid as motifs
//! 2. The grid evolves and reports health (density, stability, motif counts)
//! 3. The controller folds health and burst agreement into its state
//! 4. The next cycle runs with the controller's recommended parameters

mod grid;
mod health;
mod motif;
mod pattern;
mod somatic;

pub use grid::PatternGrid;
pub use health::{classify, CognitiveState, PatternHealth};
pub use motif::Motif;
pub use pattern::{Injection, PatternEngine};
pub use somatic::{
    confidence_variance, CycleSignals, ParameterBundle, ReductionStrategy, SomaticController,
    StressTier,
};
