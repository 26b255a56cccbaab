#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use super::results::{CriterionScore, Review};
use crate::{
    constants::{
        CORRECTNESS_WEIGHT, DEFAULT_MAX_SCORE, DOCUMENTATION_WEIGHT, EFFICIENCY_WEIGHT,
        FALLBACK_COMPILED_BASELINE, FALLBACK_CORRECTNESS_FACTOR, FALLBACK_DOCUMENTATION,
        FALLBACK_EFFICIENCY, FALLBACK_UNCOMPILED_BASELINE, STYLE_WEIGHT,
    },
    cpp::{CompilationResult, StyleReport, TestRunReport},
};

/// Grades from tool outputs alone. Total: always returns a review with a
/// percentage in `0..=100`.
pub fn fallback_review(
    compilation: &CompilationResult,
    style: &StyleReport,
    tests: &TestRunReport,
) -> Review {
    let compiled = compilation.success;
    let baseline = if compiled {
        FALLBACK_COMPILED_BASELINE
    } else {
        FALLBACK_UNCOMPILED_BASELINE
    };
    let style_score = style.score.min(STYLE_WEIGHT);
    let weighted_correctness = tests.overall_correctness.max(0.0) * FALLBACK_CORRECTNESS_FACTOR;

    let total = (f64::from(baseline)
        + f64::from(style_score)
        + weighted_correctness
        + f64::from(FALLBACK_DOCUMENTATION))
    .floor()
    .clamp(0.0, f64::from(DEFAULT_MAX_SCORE));

    let compile_word = if compiled { "Success" } else { "Failed" };
    let criteria = vec![
        CriterionScore::builder()
            .name("Correctness")
            .score(weighted_correctness.floor().min(f64::from(CORRECTNESS_WEIGHT)))
            .max_score(f64::from(CORRECTNESS_WEIGHT))
            .feedback(format!(
                "Compilation: {compile_word}. Tests: {}/{} passed. Model grading failed, using \
                 tool-based assessment.",
                tests.passed, tests.total
            ))
            .build(),
        CriterionScore::builder()
            .name("Code Style")
            .score(f64::from(style_score))
            .max_score(f64::from(STYLE_WEIGHT))
            .feedback(format!(
                "Style score: {style_score}/{STYLE_WEIGHT}. Issues found: {}. Model grading \
                 failed, using automated style checker.",
                style.issues.len()
            ))
            .build(),
        CriterionScore::builder()
            .name("Efficiency")
            .score(f64::from(FALLBACK_EFFICIENCY))
            .max_score(f64::from(EFFICIENCY_WEIGHT))
            .feedback(
                "Model grading failed. Code efficiency could not be fully assessed. Consider \
                 optimizing algorithms and data structures.",
            )
            .build(),
        CriterionScore::builder()
            .name("Documentation")
            .score(f64::from(FALLBACK_DOCUMENTATION))
            .max_score(f64::from(DOCUMENTATION_WEIGHT))
            .feedback(
                "Model grading failed. Documentation assessment based on basic code structure.",
            )
            .build(),
    ];

    let compile_phrase = if compiled {
        "compiles successfully"
    } else {
        "has compilation errors"
    };

    Review {
        total_score: total,
        max_score: f64::from(DEFAULT_MAX_SCORE),
        percentage: total,
        criteria,
        custom_criteria: Vec::new(),
        overall_feedback: format!(
            "Model grading was unavailable, so this grade comes from the automated tools only. \
             Your code {compile_phrase}. Consider reviewing the compiler messages and fixing any \
             issues."
        ),
        suggestions: "Review compilation errors if any, improve code style based on automated \
                      checks, and ensure proper documentation."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpp::CompileFailure;

    fn compiled(success: bool) -> CompilationResult {
        if success {
            CompilationResult {
                success: true,
                ..Default::default()
            }
        } else {
            CompilationResult::failed(CompileFailure::Diagnostics, "error")
        }
    }

    #[test]
    fn fallback_is_total_and_bounded() {
        for success in [true, false] {
            for style_score in [0, 7, 25, 99] {
                for correctness in [-5.0, 0.0, 13.3, 40.0, 50.0, 1e9] {
                    let style = StyleReport {
                        score:       style_score,
                        issues:      vec![],
                        suggestions: vec![],
                    };
                    let mut tests = TestRunReport::short_circuit("x");
                    tests.overall_correctness = correctness;
                    let review = fallback_review(&compiled(success), &style, &tests);
                    assert!((0.0..=100.0).contains(&review.percentage));
                    assert_eq!(review.criteria.len(), 4);
                    assert!(review.criteria.iter().all(|c| c.score <= c.max_score));
                }
            }
        }
    }

    #[test]
    fn fallback_matches_tool_formula() {
        let style = StyleReport::from_findings(vec!["a".into()], vec![]);
        let mut tests = TestRunReport::short_circuit("x");
        tests.overall_correctness = 40.0;

        let review = fallback_review(&compiled(true), &style, &tests);
        // 20 + 22 + 16 + 10
        assert_eq!(review.total_score, 68.0);
        assert_eq!(review.percentage, 68.0);
        assert_eq!(review.criteria[0].score, 16.0);
        assert_eq!(review.criteria[2].score, 15.0);

        let neutral = TestRunReport::neutral("boom");
        let review = fallback_review(&compiled(false), &StyleReport::neutral("boom"), &neutral);
        // 5 + 15 + 20 + 10
        assert_eq!(review.total_score, 50.0);
    }
}
