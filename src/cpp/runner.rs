#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs a student executable and a reference executable on the same inputs
//! and compares what they print.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, utils::diff_unicode_words};

use super::compiler::CompilationResult;
use crate::{
    config::Config,
    constants::{CORRECTNESS_WEIGHT, NEUTRAL_CORRECTNESS},
    process::{ProcessError, StdinSource, run_collect},
};

/// One input to feed to both programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Short descriptive name.
    pub name:        String,
    /// Text written to stdin.
    pub input:       String,
    /// What the case exercises.
    pub description: String,
}

impl TestCase {
    /// Creates a test case.
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name:        name.into(),
            input:       input.into(),
            description: description.into(),
        }
    }
}

/// Result of one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    /// The case that was run.
    pub test_case:           TestCase,
    /// Trimmed reference stdout.
    pub expected_output:     String,
    /// Trimmed student stdout.
    pub actual_output:       String,
    /// Both exited zero and the trimmed outputs are identical.
    pub passed:              bool,
    /// The student program exited zero within its deadline.
    pub execution_succeeded: bool,
    /// Student stderr, or the reason the student program did not finish.
    pub student_errors:      String,
}

/// Aggregate of a differential run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunReport {
    /// Per-case outcomes, in input order.
    pub outcomes:            Vec<TestOutcome>,
    /// Number of passing outcomes.
    pub passed:              usize,
    /// Number of cases run.
    pub total:               usize,
    /// Human-readable findings, ending with a summary line.
    pub diagnostics:         Vec<String>,
    /// Correctness pre-score out of 40, except for [`TestRunReport::neutral`]
    /// reports, which carry 50.
    pub overall_correctness: f64,
}

impl TestRunReport {
    /// Report for a run that did not get to execute any case.
    pub fn short_circuit(diagnostic: impl Into<String>) -> Self {
        Self {
            outcomes:            Vec::new(),
            passed:              0,
            total:               0,
            diagnostics:         vec![diagnostic.into()],
            overall_correctness: 0.0,
        }
    }

    /// Degraded report used when the test stage itself failed.
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            outcomes:            Vec::new(),
            passed:              0,
            total:               0,
            diagnostics:         vec![format!("Testing failed: {}", reason.into())],
            overall_correctness: NEUTRAL_CORRECTNESS,
        }
    }

    /// Builds a report from outcomes, computing counts, the summary line and
    /// the correctness pre-score.
    pub fn from_outcomes(outcomes: Vec<TestOutcome>, mut diagnostics: Vec<String>) -> Self {
        let total = outcomes.len();
        let passed = outcomes.iter().filter(|o| o.passed).count();

        if total > 0 && passed == total {
            diagnostics.push("All test cases passed! Code produces correct output.".into());
        } else {
            diagnostics.push(format!("{passed}/{total} test cases passed."));
        }

        Self {
            outcomes,
            passed,
            total,
            diagnostics,
            overall_correctness: correctness_score(passed, total),
        }
    }
}

/// `passed / total * 40`, or zero when nothing ran.
pub fn correctness_score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed.min(total) as f64 / total as f64 * f64::from(CORRECTNESS_WEIGHT)
    }
}

/// What one execution of one program produced.
#[derive(Debug, Default)]
struct Execution {
    /// Exited zero within the deadline.
    succeeded: bool,
    /// Trimmed stdout.
    stdout:    String,
    /// Stderr, or the reason execution failed.
    errors:    String,
}

/// Executes student and reference programs side by side.
#[derive(Debug, Clone)]
pub struct DiffRunner {
    /// Deadline for each program run.
    timeout: Duration,
}

impl DiffRunner {
    /// Creates a runner using the configured run timeout.
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: config.run_timeout(),
        }
    }

    /// Returns the report for a run that cannot start because one side did
    /// not compile, or `None` when both executables are available.
    pub fn precheck(
        student: &CompilationResult,
        reference: &CompilationResult,
    ) -> Option<TestRunReport> {
        if student.executable().is_none() {
            return Some(TestRunReport::short_circuit(format!(
                "Code does not compile: {}",
                student.errors
            )));
        }
        if reference.executable().is_none() {
            return Some(TestRunReport::short_circuit(
                "Reference code compilation failed - cannot run comparison tests",
            ));
        }
        None
    }

    /// Runs every case against both executables. Never fails; runtime errors,
    /// non-zero exits and timeouts are recorded as failed outcomes.
    pub async fn run(
        &self,
        student: &CompilationResult,
        reference: &CompilationResult,
        cases: &[TestCase],
    ) -> TestRunReport {
        if let Some(report) = Self::precheck(student, reference) {
            return report;
        }
        let (Some(student_exe), Some(reference_exe)) =
            (student.executable(), reference.executable())
        else {
            return TestRunReport::short_circuit("Executables missing after compilation");
        };

        let mut outcomes = Vec::with_capacity(cases.len());
        let mut diagnostics = Vec::new();

        for case in cases {
            let actual = self.execute(student_exe, &case.input).await;
            let expected = self.execute(reference_exe, &case.input).await;

            let passed = actual.succeeded && expected.succeeded && actual.stdout == expected.stdout;
            tracing::debug!(test = %case.name, passed, "ran test case");

            if !passed {
                diagnostics.push(if !actual.succeeded {
                    format!("{}: Runtime error - {}", case.name, runtime_error(&actual))
                } else if !expected.succeeded {
                    format!(
                        "{}: Reference solution failed on this input - {}",
                        case.name,
                        runtime_error(&expected)
                    )
                } else {
                    mismatch_message(&case.name, &expected.stdout, &actual.stdout)
                });
            }

            outcomes.push(TestOutcome {
                test_case: case.clone(),
                expected_output: expected.stdout,
                actual_output: actual.stdout,
                passed,
                execution_succeeded: actual.succeeded,
                student_errors: actual.errors,
            });
        }

        let report = TestRunReport::from_outcomes(outcomes, diagnostics);
        tracing::info!(passed = report.passed, total = report.total, "differential run finished");
        report
    }

    /// Runs `executable` with `input` on stdin under the deadline.
    async fn execute(&self, executable: &Path, input: &str) -> Execution {
        let mut bytes = input.as_bytes().to_vec();
        if !input.ends_with('\n') {
            bytes.push(b'\n');
        }

        match run_collect(
            executable,
            &[],
            StdinSource::Bytes(bytes),
            executable.parent(),
            Some(self.timeout),
        )
        .await
        {
            Ok(collected) => Execution {
                succeeded: collected.status.success(),
                stdout:    collected.stdout_text().trim().to_string(),
                errors:    if collected.status.success() {
                    collected.stderr_text()
                } else {
                    let stderr = collected.stderr_text();
                    if stderr.trim().is_empty() {
                        format!("Program exited with {}", collected.status)
                    } else {
                        stderr
                    }
                },
            },
            Err(ProcessError::Timeout(limit)) => Execution {
                errors: format!(
                    "Program execution timed out (>{} seconds)",
                    limit.as_secs()
                ),
                ..Default::default()
            },
            Err(e) => Execution {
                errors: format!("Runtime error: {e}"),
                ..Default::default()
            },
        }
    }
}

/// First line of an execution's error text.
fn runtime_error(execution: &Execution) -> String {
    let first = execution.errors.trim().lines().next().unwrap_or("");
    if first.is_empty() {
        "Unknown error".to_string()
    } else {
        first.to_string()
    }
}

/// Describes an output mismatch, with a word-level diff where `[-x-]` was
/// expected but missing and `{+y+}` was printed but not expected.
fn mismatch_message(name: &str, expected: &str, actual: &str) -> String {
    let mut diff = String::new();
    for (change, value) in diff_unicode_words(Algorithm::Patience, expected, actual) {
        match change {
            ChangeTag::Equal => diff.push_str(value),
            ChangeTag::Delete => {
                diff.push_str("[-");
                diff.push_str(value);
                diff.push_str("-]");
            }
            ChangeTag::Insert => {
                diff.push_str("{+");
                diff.push_str(value);
                diff.push_str("+}");
            }
        }
    }

    format!(
        "{name}: Output mismatch\n   Expected: '{expected}'\n   Got: '{actual}'\n   Diff: {diff}"
    )
}
