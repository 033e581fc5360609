//! Change planning for stack updates.
//!
//! The backend computes the diff as a change set; this module decides
//! whether that change set is executed.

mod change_planner;

pub use change_planner::{confirmation_prompt, ChangePlanner, PlanOutcome};
