#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Error taxonomy surfaced by the grading pipeline.
//!
//! Tool failures (compiler, style, tests) never show up here; they degrade to
//! neutral values inside the pipeline. What remains are the errors that end a
//! submission in the `error` state.

use uuid::Uuid;

use crate::llm::LlmError;

/// Errors that are fatal for a single submission or batch.
#[derive(thiserror::Error, Debug)]
pub enum GradingError {
    /// The submitted file or the reference file could not be decoded.
    #[error("Could not read {what}: {reason}")]
    UnreadableFile {
        /// Which file failed ("submission", "reference solution", ...).
        what:   String,
        /// Why decoding failed.
        reason: String,
    },
    /// A record the pipeline depends on is missing from the store.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind, eg. `submission`.
        kind: &'static str,
        /// Identifier that was looked up.
        id:   Uuid,
    },
    /// The model transport failed; this is not retried.
    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),
    /// A rubric or score shape could not be used.
    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),
    /// The private scratch directory for a grading attempt could not be
    /// created.
    #[error("Could not create scratch directory: {0}")]
    Workspace(#[source] std::io::Error),
    /// Reading from or writing to the store failed.
    #[error("Persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl GradingError {
    /// Builds an [`GradingError::UnreadableFile`].
    pub fn unreadable(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnreadableFile {
            what:   what.into(),
            reason: reason.into(),
        }
    }
}
