//! Stack lifecycle pipelines and their single terminal outcome.
//!
//! - Create: resolve, validate, create, wait for available
//! - Update: resolve, require the stack, run the change planner
//! - Delete: resolve, require the stack, delete, wait for absent
//! - Status: resolve, describe

mod collaborators;
mod machine;
mod outcome;

#[cfg(test)]
pub use collaborators::{MockConfirmer, MockFailureReporter};
pub use collaborators::{Confirmer, FailureReporter};
pub use machine::{Lifecycle, Operation};
pub use outcome::{step, Completion, Failure, Outcome, Phase};
