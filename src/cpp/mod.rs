#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Compiling C++ sources with the system toolchain.
pub mod compiler;
/// Rubric extraction from reference-solution headers.
pub mod rubric;
/// Differential execution of student and reference programs.
pub mod runner;
/// Decoding and normalizing uploaded source files.
pub mod sanitize;
/// Static style heuristics.
pub mod style;

pub use compiler::{CompilationResult, CompileFailure, Compiler};
pub use rubric::{Criterion, CustomRubric, DeductionRule, Rubric, RubricReport};
pub use runner::{DiffRunner, TestCase, TestOutcome, TestRunReport};
pub use sanitize::{read_source, sanitize};
pub use style::StyleReport;
