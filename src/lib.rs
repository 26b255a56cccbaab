//! # cppgrade
//!
//! An autograder for short C++ programs. A submission is compiled, run
//! side by side with a reference solution on generated inputs, checked for
//! style, and reviewed by a language model against the default or an
//! instructor-supplied rubric.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Batch jobs, the batch queue, and its worker
pub mod batch;
/// Runtime configuration read from the environment
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Compiling, running, style-checking and rubric-parsing C++ sources
pub mod cpp;
/// Errors that end a grading attempt
pub mod error;
/// For all things related to grading
pub mod grade;
/// Chat-completion clients
pub mod llm;
/// Subprocess helpers with timeouts
pub mod process;
/// Durable state for submissions, results and batch jobs
pub mod store;
/// Utility functions for convenience
pub mod util;

pub use error::GradingError;
