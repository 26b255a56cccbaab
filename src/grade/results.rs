#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, Width, object::Rows},
};
use uuid::Uuid;

use crate::{
    constants::{
        CRITERION_FEEDBACK_LIMIT, DEFAULT_MAX_SCORE, FALLBACK_GRADER_NAME, OVERALL_FEEDBACK_LIMIT,
        SUGGESTIONS_LIMIT,
    },
    cpp::{CompilationResult, RubricReport, StyleReport, TestRunReport},
    util::truncate_chars,
};

#[derive(Tabled, Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
/// Score awarded for a single criterion.
pub struct CriterionScore {
    #[tabled(rename = "Criterion")]
    /// Display name, eg. `Correctness`.
    pub name:      String,
    #[tabled(rename = "Score")]
    /// Points awarded.
    pub score:     f64,
    #[tabled(rename = "Out of")]
    /// Points available.
    pub max_score: f64,
    #[tabled(rename = "Feedback")]
    /// Explanation of the score.
    pub feedback:  String,
}

/// Who produced the qualitative part of a grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradedBy {
    /// A language model produced the review.
    Model {
        /// Model identifier.
        model: String,
    },
    /// The tool-only fallback produced the review.
    Fallback,
}

impl GradedBy {
    /// Name recorded with the result: the model id, or `fallback`.
    pub fn name(&self) -> &str {
        match self {
            Self::Model { model } => model,
            Self::Fallback => FALLBACK_GRADER_NAME,
        }
    }
}

impl Display for GradedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw tool outputs kept with every result for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputs {
    /// Student compilation.
    pub compilation: CompilationResult,
    /// Differential test run.
    pub tests:       TestRunReport,
    /// Style analysis.
    pub style:       StyleReport,
    /// Rubric in effect.
    pub rubric:      RubricReport,
}

/// Scores and feedback before they are attached to a submission; produced
/// either by parsing a model reply or by the fallback grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Total points awarded.
    pub total_score:      f64,
    /// Points available.
    pub max_score:        f64,
    /// Percentage, 0..=100.
    pub percentage:       f64,
    /// The four display buckets.
    pub criteria:         Vec<CriterionScore>,
    /// Raw per-criterion scores under a custom rubric.
    pub custom_criteria:  Vec<CriterionScore>,
    /// Overall assessment.
    pub overall_feedback: String,
    /// Suggestions for improvement.
    pub suggestions:      String,
}

/// Final, immutable grade for one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    /// Submission this grade belongs to.
    pub submission_id:        Uuid,
    /// Total points awarded.
    pub total_score:          f64,
    /// Points available.
    pub max_score:            f64,
    /// Percentage, 0..=100.
    pub percentage:           f64,
    /// Correctness, code style, efficiency, documentation.
    pub criteria:             Vec<CriterionScore>,
    /// Raw per-criterion scores under a custom rubric; empty otherwise.
    pub custom_criteria:      Vec<CriterionScore>,
    /// Overall assessment.
    pub overall_feedback:     String,
    /// Suggestions for improvement.
    pub suggestions:          String,
    /// Model name or fallback.
    pub graded_by:            GradedBy,
    /// Raw tool outputs.
    pub tool_outputs:         ToolOutputs,
    /// Wall-clock seconds spent grading.
    pub processing_time_secs: f64,
    /// When the grade was produced.
    pub graded_at:            DateTime<Utc>,
}

/// Clamps a criterion into range and bounds its feedback.
fn bounded(mut criterion: CriterionScore) -> CriterionScore {
    criterion.max_score = criterion.max_score.max(0.0);
    criterion.score = criterion.score.clamp(0.0, criterion.max_score);
    criterion.feedback = truncate_chars(&criterion.feedback, CRITERION_FEEDBACK_LIMIT);
    criterion
}

impl GradingResult {
    /// Attaches a review to a submission, enforcing score ranges and text
    /// length limits. Over-long text is truncated, never rejected.
    pub fn assemble(
        submission_id: Uuid,
        review: Review,
        graded_by: GradedBy,
        tool_outputs: ToolOutputs,
        processing_time_secs: f64,
    ) -> Self {
        let max_score = if review.max_score > 0.0 {
            review.max_score
        } else {
            f64::from(DEFAULT_MAX_SCORE)
        };

        Self {
            submission_id,
            total_score: review.total_score.clamp(0.0, max_score),
            max_score,
            percentage: review.percentage.clamp(0.0, 100.0),
            criteria: review.criteria.into_iter().map(bounded).collect(),
            custom_criteria: review.custom_criteria.into_iter().map(bounded).collect(),
            overall_feedback: truncate_chars(&review.overall_feedback, OVERALL_FEEDBACK_LIMIT),
            suggestions: truncate_chars(&review.suggestions, SUGGESTIONS_LIMIT),
            graded_by,
            tool_outputs,
            processing_time_secs,
            graded_at: Utc::now(),
        }
    }

    /// Looks up a display bucket by name.
    pub fn criterion(&self, name: &str) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// Renders the criteria as a table for terminal output.
    pub fn table(&self) -> String {
        let rows = if self.custom_criteria.is_empty() {
            &self.criteria
        } else {
            &self.custom_criteria
        };

        Table::new(rows)
            .with(Panel::header(format!("Graded by {}", self.graded_by)))
            .with(Panel::footer(format!(
                "Total: {:.2}/{:.2} ({:.1}%)",
                self.total_score, self.max_score, self.percentage
            )))
            .with(Modify::new(Rows::new(1..)).with(Width::wrap(48).keep_words(true)))
            .with(
                Modify::new(Rows::first())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(
                Modify::new(Rows::last())
                    .with(Alignment::center())
                    .with(Alignment::center_vertical()),
            )
            .with(Style::modern())
            .to_string()
    }
}
