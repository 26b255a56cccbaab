#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Points available for correctness in the default rubric.
pub const CORRECTNESS_WEIGHT: u32 = 40;

/// Points available for code style in the default rubric.
pub const STYLE_WEIGHT: u32 = 25;

/// Points available for efficiency in the default rubric.
pub const EFFICIENCY_WEIGHT: u32 = 20;

/// Points available for documentation in the default rubric.
pub const DOCUMENTATION_WEIGHT: u32 = 15;

/// Maximum score of the default rubric.
pub const DEFAULT_MAX_SCORE: u32 = 100;

/// Style score assumed when the analyzer could not run.
pub const NEUTRAL_STYLE_SCORE: u32 = 15;

/// Points deducted per style issue.
pub const STYLE_ISSUE_PENALTY: u32 = 3;

/// Correctness pre-score assumed when the test stage itself failed. Unlike
/// regular pre-scores this is not capped at [`CORRECTNESS_WEIGHT`].
pub const NEUTRAL_CORRECTNESS: f64 = 50.0;

/// Baseline awarded by the fallback grader when the submission compiled.
pub const FALLBACK_COMPILED_BASELINE: u32 = 20;

/// Baseline awarded by the fallback grader when the submission did not compile.
pub const FALLBACK_UNCOMPILED_BASELINE: u32 = 5;

/// Documentation score used by the fallback grader.
pub const FALLBACK_DOCUMENTATION: u32 = 10;

/// Efficiency score used by the fallback grader.
pub const FALLBACK_EFFICIENCY: u32 = 15;

/// Factor applied to the differential correctness pre-score by the fallback.
pub const FALLBACK_CORRECTNESS_FACTOR: f64 = 0.4;

/// Upper bound on persisted per-criterion feedback, in characters.
pub const CRITERION_FEEDBACK_LIMIT: usize = 5_000;

/// Upper bound on persisted overall feedback, in characters.
pub const OVERALL_FEEDBACK_LIMIT: usize = 10_000;

/// Upper bound on persisted suggestions, in characters.
pub const SUGGESTIONS_LIMIT: usize = 5_000;

/// Number of sample test outcomes embedded in the grading prompt.
pub const PROMPT_SAMPLE_TESTS: usize = 3;

/// Number of style issues embedded in the grading prompt.
pub const PROMPT_SAMPLE_ISSUES: usize = 3;

/// Length of the overall-feedback preview in batch results.
pub const BATCH_FEEDBACK_PREVIEW: usize = 200;

/// Name recorded in `graded_by` when the tool-only path produced the grade.
pub const FALLBACK_GRADER_NAME: &str = "fallback";
