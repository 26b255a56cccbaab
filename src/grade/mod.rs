#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Locating JSON inside model output.
pub mod extract;
/// Tool-only grading used when the model reply is unusable.
pub mod fallback;
/// The end-to-end grading pipeline.
pub mod pipeline;
/// Grading prompt construction.
pub mod prompt;
/// Parsing and validating model replies.
pub mod response;
/// Grade result types.
pub mod results;
/// Model-driven test case synthesis.
pub mod testgen;

pub use fallback::fallback_review;
pub use pipeline::{Grader, GradingStage, panic_message};
pub use response::{ResponseError, parse_review};
pub use results::{CriterionScore, GradedBy, GradingResult, Review, ToolOutputs};
pub use testgen::{TestSynthesizer, fallback_cases};
