#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Reads an instructor rubric out of the comment header of a reference
//! solution.
//!
//! The header looks like this:
//!
//! ```text
//! // Program Name: Sorting Numbers
//! // Rubric
//! // -50: Program does not compile
//! // -20: Algorithm not implemented
//! //   uses a loop to read input
//! // -5: Missing comments
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        CORRECTNESS_WEIGHT, DEFAULT_MAX_SCORE, DOCUMENTATION_WEIGHT, EFFICIENCY_WEIGHT,
        STYLE_WEIGHT,
    },
    error::GradingError,
};

/// Assignment name used when the header does not name one.
pub const UNKNOWN_ASSIGNMENT: &str = "Unknown Assignment";

/// A point deduction as written by the instructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionRule {
    /// Points deducted.
    pub points:      u32,
    /// Category label as written.
    pub category:    String,
    /// Indented detail lines following the rule.
    pub subcriteria: Vec<String>,
}

/// A positively-phrased grading criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Display name.
    pub name:        String,
    /// Points available.
    pub max_points:  u32,
    /// What the grader should look for.
    pub description: String,
    /// Detail lines.
    pub subcriteria: Vec<String>,
}

impl Criterion {
    /// Key the model uses for this criterion in its JSON reply.
    pub fn json_key(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }
}

/// An instructor rubric; always has at least one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRubric {
    /// Name from `// Program Name:`.
    assignment_name: String,
    /// Points the rubric is out of.
    total_points:    u32,
    /// Criteria derived from the deductions.
    criteria:        Vec<Criterion>,
    /// Deductions as written.
    deductions:      Vec<DeductionRule>,
}

impl CustomRubric {
    /// Builds a rubric from parsed deductions.
    pub fn new(
        assignment_name: impl Into<String>,
        deductions: Vec<DeductionRule>,
    ) -> Result<Self, GradingError> {
        if deductions.is_empty() {
            return Err(GradingError::InvalidRubric(
                "rubric header has no deduction rules".into(),
            ));
        }

        // Deductions that map to the same criterion share one reply key, so
        // their points are pooled.
        let mut criteria: Vec<Criterion> = Vec::with_capacity(deductions.len());
        for criterion in deductions.iter().map(criterion_for) {
            match criteria.iter_mut().find(|c| c.name == criterion.name) {
                Some(existing) => {
                    existing.max_points += criterion.max_points;
                    existing.subcriteria.extend(criterion.subcriteria);
                }
                None => criteria.push(criterion),
            }
        }
        Ok(Self {
            assignment_name: assignment_name.into(),
            total_points: total_points_for(&deductions),
            criteria,
            deductions,
        })
    }

    /// Assignment name.
    pub fn assignment_name(&self) -> &str {
        &self.assignment_name
    }

    /// Points the rubric is out of.
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    /// Criteria in header order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Deductions as written.
    pub fn deductions(&self) -> &[DeductionRule] {
        &self.deductions
    }
}

/// The rubric in effect for one grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rubric", rename_all = "snake_case")]
pub enum Rubric {
    /// Correctness 40, code style 25, efficiency 20, documentation 15.
    Default,
    /// Extracted from the reference header.
    Custom(CustomRubric),
}

impl Rubric {
    /// The four default criteria.
    pub fn default_criteria() -> Vec<Criterion> {
        let make = |name: &str, max_points: u32, description: &str| Criterion {
            name: name.to_string(),
            max_points,
            description: description.to_string(),
            subcriteria: Vec::new(),
        };
        vec![
            make(
                "Correctness",
                CORRECTNESS_WEIGHT,
                "Does the code work correctly? Use the automated test results and your analysis",
            ),
            make(
                "Code Style",
                STYLE_WEIGHT,
                "Proper naming, formatting, structure; consider the automated style analysis",
            ),
            make(
                "Efficiency",
                EFFICIENCY_WEIGHT,
                "Algorithm efficiency and approach, memory usage",
            ),
            make(
                "Documentation",
                DOCUMENTATION_WEIGHT,
                "Comments, code clarity, readability",
            ),
        ]
    }

    /// Criteria in effect.
    pub fn criteria(&self) -> Vec<Criterion> {
        match self {
            Self::Default => Self::default_criteria(),
            Self::Custom(custom) => custom.criteria().to_vec(),
        }
    }

    /// Points the rubric is out of.
    pub fn total_points(&self) -> u32 {
        match self {
            Self::Default => DEFAULT_MAX_SCORE,
            Self::Custom(custom) => custom.total_points(),
        }
    }

    /// Whether an instructor rubric is in effect.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Assignment name from the header, if any.
    pub fn assignment_name(&self) -> &str {
        match self {
            Self::Default => UNKNOWN_ASSIGNMENT,
            Self::Custom(custom) => custom.assignment_name(),
        }
    }

    /// Serializable audit form.
    pub fn report(&self) -> RubricReport {
        RubricReport {
            has_custom_rubric:     self.is_custom(),
            assignment_name:       self.assignment_name().to_string(),
            total_possible_points: self.total_points(),
            criteria:              self.criteria(),
            deductions:            match self {
                Self::Default => Vec::new(),
                Self::Custom(custom) => custom.deductions().to_vec(),
            },
        }
    }
}

/// What the rubric extractor found, as stored with the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricReport {
    /// Whether an instructor rubric was found.
    pub has_custom_rubric:     bool,
    /// Assignment name.
    pub assignment_name:       String,
    /// Points the rubric is out of.
    pub total_possible_points: u32,
    /// Criteria in effect.
    pub criteria:              Vec<Criterion>,
    /// Deductions as written; empty for the default rubric.
    pub deductions:            Vec<DeductionRule>,
}

/// Classification of one reference line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    /// `// text`, with the markers and surrounding spaces removed.
    Comment(&'a str),
    /// Anything that is not a comment.
    Code,
    /// Whitespace only.
    Blank,
}

/// Classifies a single line.
fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Line::Blank
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Line::Comment(rest.trim_start_matches('/').trim())
    } else {
        Line::Code
    }
}

/// Parses `-<N>: <category>`, allowing spaces after `-` and around `:`.
fn parse_deduction(text: &str) -> Option<(u32, &str)> {
    let rest = text.strip_prefix('-')?.trim_start();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let points = rest[..digits_end].parse().ok()?;
    let category = rest[digits_end..].trim_start().strip_prefix(':')?.trim();
    if category.is_empty() {
        return None;
    }
    Some((points, category))
}

/// Maps a deduction onto a named criterion by keyword.
fn criterion_for(rule: &DeductionRule) -> Criterion {
    let label = rule.category.to_lowercase();
    let (name, description) = if label.contains("compile") {
        ("Code Compilation", "Code must compile without errors")
    } else if label.contains("algorithm") || label.contains("implement") {
        (
            "Algorithm Implementation",
            "Code must correctly implement the required algorithm",
        )
    } else if label.contains("variable") || label.contains("format") {
        (
            "Code Correctness",
            "Proper variable usage, types, and input/output format",
        )
    } else if label.contains("comment") {
        ("Documentation", "Adequate comments and program header")
    } else {
        (rule.category.as_str(), rule.category.as_str())
    };

    Criterion {
        name:        name.to_string(),
        max_points:  rule.points,
        description: description.to_string(),
        subcriteria: rule.subcriteria.clone(),
    }
}

/// Total points implied by the largest deduction.
fn total_points_for(deductions: &[DeductionRule]) -> u32 {
    let largest = deductions.iter().map(|d| d.points).max().unwrap_or(0);
    if largest >= 50 {
        DEFAULT_MAX_SCORE
    } else if largest >= 20 {
        largest * 2
    } else {
        DEFAULT_MAX_SCORE
    }
}

/// Extracts the rubric from a reference solution. Never fails: anything
/// without at least one deduction rule yields [`Rubric::Default`].
pub fn extract(reference: &str) -> Rubric {
    let mut assignment_name = UNKNOWN_ASSIGNMENT.to_string();
    let mut deductions: Vec<DeductionRule> = Vec::new();
    let mut in_section = false;
    let mut seen_header = false;

    for line in reference.lines() {
        match classify(line) {
            Line::Comment(text) => {
                if let Some((_, name)) = text.split_once("Program Name:") {
                    let name = name.trim();
                    if !name.is_empty() {
                        assignment_name = name.to_string();
                    }
                    continue;
                }
                if !seen_header && text.contains("Rubric") {
                    in_section = true;
                    seen_header = true;
                    continue;
                }
                if !in_section {
                    continue;
                }
                if let Some((points, category)) = parse_deduction(text) {
                    deductions.push(DeductionRule {
                        points,
                        category: category.to_string(),
                        subcriteria: Vec::new(),
                    });
                } else if !text.is_empty() && !text.starts_with('-') {
                    if let Some(last) = deductions.last_mut() {
                        last.subcriteria.push(text.to_string());
                    }
                }
            }
            Line::Blank => {}
            Line::Code => in_section = false,
        }
    }

    match CustomRubric::new(assignment_name, deductions) {
        Ok(custom) => {
            tracing::debug!(
                criteria = custom.criteria().len(),
                total = custom.total_points(),
                assignment = custom.assignment_name(),
                "extracted custom rubric"
            );
            Rubric::Custom(custom)
        }
        Err(e) => {
            tracing::debug!("using default rubric: {e}");
            Rubric::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(reference: &str) -> CustomRubric {
        match extract(reference) {
            Rubric::Custom(custom) => custom,
            Rubric::Default => panic!("expected a custom rubric"),
        }
    }

    #[test]
    fn deductions_for_the_same_criterion_are_merged() {
        let rubric = custom(
            "// Rubric\n// -20: Does not compile\n// -10: Compile warnings\n// -5: Missing comments\nint main() {}\n",
        );
        let names: Vec<&str> = rubric.criteria().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Code Compilation", "Documentation"]);
        assert_eq!(rubric.criteria()[0].max_points, 30);
        assert_eq!(rubric.deductions().len(), 3);
        assert_eq!(rubric.total_points(), 40);
    }

    #[test]
    fn default_weights_sum_to_one_hundred() {
        let sum: u32 = Rubric::default_criteria().iter().map(|c| c.max_points).sum();
        assert_eq!(sum, 100);
        assert_eq!(Rubric::Default.total_points(), 100);
    }

    #[test]
    fn largest_deduction_of_sixty_totals_one_hundred() {
        let rubric = custom("// Rubric\n// -60: Program does not compile\n// -10: Missing comments\nint main() {}\n");
        assert_eq!(rubric.total_points(), 100);
    }

    #[test]
    fn largest_deduction_of_thirty_doubles() {
        let rubric = custom("// Rubric\n// -30: Algorithm not implemented\n// -5: Poor variable names\n");
        assert_eq!(rubric.total_points(), 60);
    }

    #[test]
    fn small_deductions_total_one_hundred() {
        let rubric = custom("// Rubric\n// -10: Missing comments\n");
        assert_eq!(rubric.total_points(), 100);
    }

    #[test]
    fn header_is_parsed_into_named_criteria() {
        let reference = "// Program Name: Sorting Numbers\n// Author: someone\n// Rubric\n// -50: \
                         Program does not compile\n// -20: Algorithm not implemented\n//   \
                         reads until -999\n//   sorts ascending\n// -5: Missing comments\n\n#include \
                         <iostream>\n// -99: not part of the rubric\n";
        let rubric = custom(reference);
        assert_eq!(rubric.assignment_name(), "Sorting Numbers");
        let names: Vec<_> = rubric.criteria().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Code Compilation", "Algorithm Implementation", "Documentation"]);
        assert_eq!(
            rubric.criteria()[1].subcriteria,
            ["reads until -999", "sorts ascending"]
        );
        assert_eq!(rubric.deductions().len(), 3);
        assert_eq!(rubric.criteria()[1].json_key(), "algorithm_implementation");
    }

    #[test]
    fn deduction_syntax_tolerates_spaces() {
        assert_eq!(parse_deduction("- 50:Program does not compile"), Some((50, "Program does not compile")));
        assert_eq!(parse_deduction("-5 : Bad format"), Some((5, "Bad format")));
        assert_eq!(parse_deduction("-: nothing"), None);
        assert_eq!(parse_deduction("-5 missing colon"), None);
        assert_eq!(parse_deduction("-5:"), None);
    }

    #[test]
    fn unknown_categories_keep_their_label() {
        let rubric = custom("// Rubric\n// -15: Uses recursion\n");
        assert_eq!(rubric.criteria()[0].name, "Uses recursion");
        assert_eq!(rubric.criteria()[0].description, "Uses recursion");
    }

    #[test]
    fn header_without_rules_is_default() {
        assert_eq!(extract("// Rubric\n// nothing here\nint main() {}\n"), Rubric::Default);
        assert_eq!(extract(""), Rubric::Default);
        assert_eq!(extract("int main() { return 0; }"), Rubric::Default);
    }

    #[test]
    fn subcriteria_before_first_rule_are_ignored() {
        let rubric = custom("// Rubric\n// stray note\n// -20: Wrong format\n");
        assert!(rubric.criteria()[0].subcriteria.is_empty());
        assert_eq!(rubric.criteria()[0].name, "Code Correctness");
    }

    #[test]
    fn report_reflects_rubric() {
        let report = Rubric::Default.report();
        assert!(!report.has_custom_rubric);
        assert_eq!(report.criteria.len(), 4);
        assert_eq!(report.total_possible_points, 100);
    }
}
