//! # Mind Gym Workout
//!
//! Drives a cognitive workout session end to end:
//!
//! - **WorkoutPhaseMachine**: warm-up → build → peak → rest, by elapsed
//!   tension time and the controller's rest signal; adjusts difficulty
//! - **WorkoutSession**: the per-query aggregate owning its controller,
//!   pattern engine and synchronizer
//! - **MindGym**: the driver API (`start_session`, `step`, `is_complete`,
//!   `export_pattern`, `cancel`, branch integration)

pub mod export;
pub mod gym;
pub mod phase;
pub mod session;

pub use export::PatternFrame;
pub use gym::{MindGym, SessionHandle};
pub use phase::{DifficultyChange, PhaseTransition, WorkoutPhaseMachine};
pub use session::{SessionDeps, StepReport, WorkoutSession};
