// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Kiln
//!
//! Safe create, update and delete of declaratively described infrastructure
//! stacks on a remote provisioning backend.
//!
//! ## Overview
//!
//! Kiln turns one intent ("update this stack") into an ordered set of
//! backend calls:
//!
//! - Resolve which configuration profile and stack the invocation targets
//! - Let the backend compute a change set and skip it when it is empty
//! - Ask for confirmation, execute, and wait with bounded polling
//! - Report exactly one terminal outcome
//!
//! The backend is the source of truth. Kiln keeps no local state between
//! invocations and never diffs templates itself.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and template loading
//! - [`gateway`]: Provisioning backend trait and the CloudFormation backend
//! - [`poller`]: Bounded constant-interval polling
//! - [`planner`]: Change-set protocol for updates
//! - [`lifecycle`]: Create, update, delete and status pipelines
//! - [`resolver`]: Profile and stack identity resolution
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! main:
//!   stack_name: MyStack
//!   template: stack.template.yaml
//!   region: eu-west-1
//!
//! parameters:
//!   InstanceType: t3.micro
//!
//! capabilities:
//!   - CAPABILITY_IAM
//!
//! polling:
//!   wait_frequency_secs: 10
//!   timeout_secs: 1800
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod planner;
pub mod poller;
pub mod resolver;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigSource, ConfigValidator, Configuration, TemplateSource};
pub use error::{KilnError, Result};
pub use gateway::{CloudFormationGateway, ProviderGateway};
pub use lifecycle::{Completion, Failure, Lifecycle, Operation, Outcome};
pub use planner::ChangePlanner;
pub use poller::Poller;
pub use resolver::{ResolvedStack, StackResolver};
