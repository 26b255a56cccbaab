#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Builds the grading request from tool outputs and the rubric.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    constants::{PROMPT_SAMPLE_ISSUES, PROMPT_SAMPLE_TESTS, STYLE_WEIGHT},
    cpp::{CompilationResult, Criterion, Rubric, StyleReport, TestRunReport},
};

/// Substitutes `{{key}}` placeholders in a single left-to-right pass, so
/// substituted text is never itself expanded. Unknown placeholders are kept.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(&after[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Everything the model needs to review one submission.
#[derive(Debug, Clone, Copy)]
pub struct GradingPrompt<'a> {
    /// Assignment name shown to the model.
    pub assignment:  &'a str,
    /// Sanitized student source.
    pub student:     &'a str,
    /// Sanitized reference source.
    pub reference:   &'a str,
    /// Student compilation.
    pub compilation: &'a CompilationResult,
    /// Differential test run.
    pub tests:       &'a TestRunReport,
    /// Style analysis.
    pub style:       &'a StyleReport,
    /// Rubric in effect.
    pub rubric:      &'a Rubric,
}

impl GradingPrompt<'_> {
    /// Renders the prompt into `template`.
    pub fn render(&self, template: &str) -> String {
        let compilation = self.compilation_section();
        let tests = self.tests_section();
        let style = self.style_section();
        let criteria = self.criteria_section();
        let schema = self.schema();

        fill_template(
            template,
            &[
                ("assignment", self.assignment),
                ("compilation", &compilation),
                ("tests", &tests),
                ("style", &style),
                ("reference", self.reference.trim_end()),
                ("student", self.student.trim_end()),
                ("criteria", &criteria),
                ("schema", &schema),
            ],
        )
    }

    /// Compilation status and warnings.
    fn compilation_section(&self) -> String {
        if self.compilation.success {
            let mut section = "Compilation: compiles successfully".to_string();
            if !self.compilation.warnings.trim().is_empty() {
                let _ = write!(section, "\nCompiler warnings:\n{}", self.compilation.warnings.trim());
            }
            section
        } else {
            format!("Compilation: FAILED\n{}", self.compilation.errors.trim())
        }
    }

    /// Pass count and a few sample outcomes.
    fn tests_section(&self) -> String {
        if self.tests.outcomes.is_empty() {
            let reason = self.tests.diagnostics.first().map_or("", String::as_str);
            return format!("Test Results: no tests were run. {reason}");
        }

        let mut section = format!(
            "Test Results: {}/{} tests passed\n",
            self.tests.passed, self.tests.total
        );
        for outcome in self.tests.outcomes.iter().take(PROMPT_SAMPLE_TESTS) {
            let status = if outcome.passed { "PASS" } else { "FAIL" };
            let _ = writeln!(
                section,
                "  [{status}] {}: {}",
                outcome.test_case.name, outcome.test_case.description
            );
        }
        section
    }

    /// Style score and a few issues.
    fn style_section(&self) -> String {
        let mut section = format!("Style Analysis: {}/{STYLE_WEIGHT} points\n", self.style.score);
        if !self.style.issues.is_empty() {
            section.push_str("Style Issues:\n");
            for issue in self.style.issues.iter().take(PROMPT_SAMPLE_ISSUES) {
                let _ = writeln!(section, "  - {issue}");
            }
        }
        section
    }

    /// Criteria listing plus grading guidance.
    fn criteria_section(&self) -> String {
        match self.rubric {
            Rubric::Default => {
                let mut section = format!(
                    "**Grading Criteria (Total: {} points):**\n",
                    self.rubric.total_points()
                );
                for (i, criterion) in self.rubric.criteria().iter().enumerate() {
                    let _ = writeln!(
                        section,
                        "{}. **{} ({} points)** - {}",
                        i + 1,
                        criterion.name,
                        criterion.max_points,
                        criterion.description
                    );
                }
                section.push_str(
                    "\n**IMPORTANT:**\n- If the code doesn't compile, the correctness score \
                     should be very low (0-10 points).",
                );
                section
            }
            Rubric::Custom(custom) => {
                let mut section = format!(
                    "**CUSTOM GRADING RUBRIC (Total: {} points):**\n",
                    custom.total_points()
                );
                for criterion in custom.criteria() {
                    let _ = writeln!(
                        section,
                        "- **{} ({} points)** - {}",
                        criterion.name, criterion.max_points, criterion.description
                    );
                    for sub in &criterion.subcriteria {
                        let _ = writeln!(section, "  - {sub}");
                    }
                }

                let penalty = custom
                    .criteria()
                    .iter()
                    .filter(|c| c.name.to_lowercase().contains("compil"))
                    .map(|c| c.max_points)
                    .max()
                    .map_or_else(|| "maximum".to_string(), |p| p.to_string());
                let _ = write!(
                    section,
                    "\n**IMPORTANT RUBRIC-BASED GRADING:**\n- Use the custom rubric criteria \
                     above as your primary grading framework.\n- Each criterion has specific \
                     point values that must be respected.\n- If the code doesn't compile, \
                     deduct the full compilation penalty ({penalty} points)."
                );
                section
            }
        }
    }

    /// JSON shape the reply must follow.
    fn schema(&self) -> String {
        let criteria: Vec<(String, Criterion)> = match self.rubric {
            Rubric::Default => {
                let keys = ["correctness", "code_style", "efficiency", "documentation"];
                keys.iter()
                    .map(|k| k.to_string())
                    .zip(Rubric::default_criteria())
                    .collect()
            }
            Rubric::Custom(custom) => custom
                .criteria()
                .iter()
                .map(|c| (c.json_key(), c.clone()))
                .collect(),
        };

        let body = criteria
            .iter()
            .map(|(key, c)| {
                format!(
                    "  \"{key}\": {{\n    \"score\": <number out of {max}>,\n    \"max_score\": \
                     {max},\n    \"feedback\": \"<detailed feedback for {name}>\"\n  }}",
                    max = c.max_points,
                    name = c.name.to_lowercase()
                )
            })
            .join(",\n");

        format!(
            "{{\n  \"total_score\": <number>,\n  \"max_score\": {},\n  \"percentage\": <number \
             with 2 decimals>,\n{body},\n  \"overall_feedback\": \"<overall assessment \
             referencing the automated results>\",\n  \"suggestions\": \"<specific suggestions \
             for improvement>\"\n}}",
            self.rubric.total_points()
        )
    }
}
