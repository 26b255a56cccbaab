#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turns a model reply into a [`Review`].

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    extract::{candidate_spans, cleanup},
    results::{CriterionScore, Review},
};
use crate::{
    constants::{CORRECTNESS_WEIGHT, DOCUMENTATION_WEIGHT, EFFICIENCY_WEIGHT, STYLE_WEIGHT},
    cpp::{CustomRubric, Rubric},
    util::round_half_up,
};

/// Suggestions used when a custom-rubric reply omits them.
const DEFAULT_SUGGESTIONS: &str = "Continue practicing to improve your programming skills.";

/// Why a reply could not be used.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    /// No JSON object could be located.
    #[error("no JSON object found in model response")]
    NoJson,
    /// An object was found but did not deserialize or lacked fields.
    #[error("malformed model response: {0}")]
    Malformed(String),
    /// The reply's `max_score` was zero or negative.
    #[error("model response has a non-positive max_score")]
    InvalidMaxScore,
    /// A custom-rubric reply contained no criterion objects.
    #[error("model response contains no criterion scores")]
    NoCriteria,
}

/// Criterion object as the model writes it.
#[derive(Debug, Deserialize)]
struct ReplyCriterion {
    /// Points awarded.
    score:     f64,
    /// Points available, if the model repeated them.
    #[serde(default)]
    max_score: Option<f64>,
    /// Explanation.
    #[serde(default)]
    feedback:  String,
}

/// Suggestions as either one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Suggestions {
    /// Free text.
    Text(String),
    /// One suggestion per entry.
    List(Vec<String>),
}

impl Suggestions {
    /// Flattens into display text.
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::List(items) => items.join("\n"),
        }
    }
}

/// Reply shape for the default rubric.
#[derive(Debug, Deserialize)]
struct DefaultReply {
    /// Total points awarded.
    total_score:      f64,
    /// Points available.
    max_score:        f64,
    /// Percentage.
    percentage:       f64,
    /// Correctness bucket.
    correctness:      ReplyCriterion,
    /// Style bucket.
    code_style:       ReplyCriterion,
    /// Efficiency bucket.
    efficiency:       ReplyCriterion,
    /// Documentation bucket.
    documentation:    ReplyCriterion,
    /// Overall assessment.
    overall_feedback: String,
    /// Suggestions.
    #[serde(default)]
    suggestions:      Option<Suggestions>,
}

/// Parses a reply for `rubric`. When the first attempt fails, one cleanup
/// pass runs and parsing is retried once.
pub fn parse_review(text: &str, rubric: &Rubric) -> Result<Review, ResponseError> {
    match parse_once(text, rubric) {
        Ok(review) => Ok(review),
        Err(first) => {
            tracing::debug!("first parse failed ({first}); retrying after cleanup");
            parse_once(&cleanup(text), rubric)
        }
    }
}

/// One parse attempt over every candidate object span.
fn parse_once(text: &str, rubric: &Rubric) -> Result<Review, ResponseError> {
    let mut last_error = ResponseError::NoJson;

    for span in candidate_spans(text, '{', '}') {
        let value: Value = match serde_json::from_str(span) {
            Ok(value) => value,
            Err(e) => {
                last_error = ResponseError::Malformed(e.to_string());
                continue;
            }
        };
        let Value::Object(object) = value else {
            continue;
        };

        let parsed = match rubric {
            Rubric::Default => parse_default(object),
            Rubric::Custom(custom) => parse_custom(object, custom),
        };
        match parsed {
            Ok(review) => return Ok(review),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Validates and converts a default-rubric reply.
fn parse_default(object: Map<String, Value>) -> Result<Review, ResponseError> {
    let reply: DefaultReply = serde_json::from_value(Value::Object(object))
        .map_err(|e| ResponseError::Malformed(e.to_string()))?;
    if reply.max_score <= 0.0 {
        return Err(ResponseError::InvalidMaxScore);
    }

    let bucket = |name: &str, weight: u32, c: ReplyCriterion| CriterionScore {
        name:      name.to_string(),
        score:     c.score,
        max_score: c.max_score.unwrap_or(f64::from(weight)),
        feedback:  c.feedback,
    };

    Ok(Review {
        total_score:      reply.total_score,
        max_score:        reply.max_score,
        percentage:       reply.percentage,
        criteria:         vec![
            bucket("Correctness", CORRECTNESS_WEIGHT, reply.correctness),
            bucket("Code Style", STYLE_WEIGHT, reply.code_style),
            bucket("Efficiency", EFFICIENCY_WEIGHT, reply.efficiency),
            bucket("Documentation", DOCUMENTATION_WEIGHT, reply.documentation),
        ],
        custom_criteria:  Vec::new(),
        overall_feedback: reply.overall_feedback,
        suggestions:      reply
            .suggestions
            .map(Suggestions::into_text)
            .unwrap_or_default(),
    })
}

/// Reads a required number from a reply object.
fn number(object: &Map<String, Value>, key: &str) -> Result<f64, ResponseError> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ResponseError::Malformed(format!("missing numeric field `{key}`")))
}

/// Title-cases a snake_case key: `code_compilation` -> `Code Compilation`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Which display bucket a custom criterion's feedback belongs to.
fn bucket_for(name: &str) -> usize {
    const KEYWORDS: [&[&str]; 4] = [
        &["compil", "correct", "algorithm", "implement", "major"],
        &["style", "format", "variable", "minor"],
        &["efficien", "performance", "moderate"],
        &["doc", "comment", "clarity"],
    ];

    let lower = name.to_lowercase();
    KEYWORDS
        .iter()
        .position(|words| words.iter().any(|w| lower.contains(w)))
        .unwrap_or(0)
}

/// Validates a custom-rubric reply and projects it onto the four buckets.
fn parse_custom(
    mut object: Map<String, Value>,
    rubric: &CustomRubric,
) -> Result<Review, ResponseError> {
    let total_score = number(&object, "total_score")?;
    let max_score = number(&object, "max_score")?;
    if max_score <= 0.0 {
        return Err(ResponseError::InvalidMaxScore);
    }
    let percentage = object
        .get("percentage")
        .and_then(Value::as_f64)
        .unwrap_or(total_score / max_score * 100.0);

    let overall = object
        .remove("overall_feedback")
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    let suggestions = object
        .remove("suggestions")
        .and_then(|v| serde_json::from_value::<Suggestions>(v).ok())
        .map_or_else(|| DEFAULT_SUGGESTIONS.to_string(), Suggestions::into_text);

    let is_criterion = |v: &Value| {
        v.as_object()
            .is_some_and(|o| o.get("score").is_some_and(Value::is_number) && o.contains_key("feedback"))
    };

    // Rubric order first, then anything else the model added.
    let mut custom_criteria = Vec::new();
    for criterion in rubric.criteria() {
        if let Some(value) = object.remove(&criterion.json_key())
            && is_criterion(&value)
            && let Ok(reply) = serde_json::from_value::<ReplyCriterion>(value)
        {
            custom_criteria.push(CriterionScore {
                name:      criterion.name.clone(),
                score:     reply.score,
                max_score: reply.max_score.unwrap_or(f64::from(criterion.max_points)),
                feedback:  reply.feedback,
            });
        }
    }
    for (key, value) in object {
        if is_criterion(&value)
            && let Ok(reply) = serde_json::from_value::<ReplyCriterion>(value)
        {
            custom_criteria.push(CriterionScore {
                name:      title_case(&key),
                score:     reply.score,
                max_score: reply.max_score.unwrap_or(0.0),
                feedback:  reply.feedback,
            });
        }
    }
    if custom_criteria.is_empty() {
        return Err(ResponseError::NoCriteria);
    }

    let mut feedback: [Vec<String>; 4] = Default::default();
    for criterion in &custom_criteria {
        feedback[bucket_for(&criterion.name)].push(format!("{}: {}", criterion.name, criterion.feedback));
    }

    let ratio = (total_score / max_score).clamp(0.0, 1.0);
    let proportional = format!(
        "Proportional score based on custom rubric (Total: {total_score}/{max_score})"
    );
    let buckets = [
        ("Correctness", CORRECTNESS_WEIGHT),
        ("Code Style", STYLE_WEIGHT),
        ("Efficiency", EFFICIENCY_WEIGHT),
        ("Documentation", DOCUMENTATION_WEIGHT),
    ];
    let criteria = buckets
        .iter()
        .zip(feedback)
        .map(|((name, weight), lines)| CriterionScore {
            name:      name.to_string(),
            score:     round_half_up(ratio * f64::from(*weight)) as f64,
            max_score: f64::from(*weight),
            feedback:  if lines.is_empty() {
                proportional.clone()
            } else {
                lines.join("\n")
            },
        })
        .collect();

    let applied = custom_criteria
        .iter()
        .map(|c| format!("**{}** ({}/{}): {}", c.name, c.score, c.max_score, c.feedback))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Review {
        total_score,
        max_score,
        percentage,
        criteria,
        custom_criteria,
        overall_feedback: format!("Custom Rubric Applied:\n{applied}\n\n{overall}"),
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpp::rubric;

    const DEFAULT_REPLY: &str = r#"Here is my assessment:
{
  "total_score": 88,
  "max_score": 100,
  "percentage": 88.0,
  "correctness": {"score": 38, "max_score": 40, "feedback": "All tests pass."},
  "code_style": {"score": 20, "max_score": 25, "feedback": "Good {naming}."},
  "efficiency": {"score": 17, "max_score": 20, "feedback": "Fine."},
  "documentation": {"score": 13, "max_score": 15, "feedback": "Some comments."},
  "overall_feedback": "Solid work.",
  "suggestions": ["Add a header", "Name constants"]
}
Thanks!"#;

    fn custom_rubric() -> Rubric {
        rubric::extract(
            "// Rubric\n// -30: Program does not compile\n// -20: Algorithm not implemented\n// \
             -10: Poor variable names\n",
        )
    }

    #[test]
    fn default_reply_parses() {
        let review = parse_review(DEFAULT_REPLY, &Rubric::Default).expect("parse");
        assert_eq!(review.total_score, 88.0);
        assert_eq!(review.criteria.len(), 4);
        assert_eq!(review.criteria[1].name, "Code Style");
        assert_eq!(review.criteria[1].feedback, "Good {naming}.");
        assert_eq!(review.suggestions, "Add a header\nName constants");
        assert!(review.custom_criteria.is_empty());
    }

    #[test]
    fn missing_field_is_rejected() {
        let reply = r#"{"total_score": 10, "max_score": 100, "percentage": 10,
            "correctness": {"score": 1, "feedback": ""}, "overall_feedback": "x"}"#;
        assert!(matches!(
            parse_review(reply, &Rubric::Default),
            Err(ResponseError::Malformed(_))
        ));
    }

    #[test]
    fn prose_only_is_rejected() {
        assert_eq!(parse_review("I cannot grade this.", &Rubric::Default), Err(ResponseError::NoJson));
    }

    #[test]
    fn raw_newlines_are_repaired_by_cleanup() {
        let reply = "```json\n{\"total_score\": 50, \"max_score\": 100, \"percentage\": 50,\n\
                     \"correctness\": {\"score\": 20, \"feedback\": \"line\nbreak\"},\n\
                     \"code_style\": {\"score\": 10, \"feedback\": \"\"},\n\
                     \"efficiency\": {\"score\": 10, \"feedback\": \"\"},\n\
                     \"documentation\": {\"score\": 10, \"feedback\": \"\"},\n\
                     \"overall_feedback\": \"ok\"}\n```";
        let review = parse_review(reply, &Rubric::Default).expect("repaired");
        assert_eq!(review.criteria[0].feedback, "line break");
    }

    #[test]
    fn custom_reply_is_projected() {
        let reply = r#"{
          "total_score": 45, "max_score": 60, "percentage": 75.0,
          "code_compilation": {"score": 30, "max_score": 30, "feedback": "Compiles."},
          "algorithm_implementation": {"score": 10, "max_score": 20, "feedback": "Partial."},
          "code_correctness": {"score": 5, "max_score": 10, "feedback": "Odd names."},
          "overall_feedback": "Decent."
        }"#;
        let review = parse_review(reply, &custom_rubric()).expect("parse");
        assert_eq!(review.custom_criteria.len(), 3);
        assert_eq!(review.custom_criteria[0].name, "Code Compilation");

        let scores: Vec<f64> = review.criteria.iter().map(|c| c.score).collect();
        assert_eq!(scores, [30.0, 19.0, 15.0, 11.0]);

        assert!(review.criteria[0].feedback.contains("Code Compilation: Compiles."));
        assert!(review.criteria[0].feedback.contains("Algorithm Implementation: Partial."));
        // "correct" is a correctness keyword, so this lands with the others.
        assert!(review.criteria[0].feedback.contains("Code Correctness: Odd names."));
        assert!(review.criteria[1].feedback.starts_with("Proportional score"));
        assert!(review.criteria[2].feedback.starts_with("Proportional score based on custom rubric (Total: 45/60)"));
        assert!(review.overall_feedback.starts_with("Custom Rubric Applied:\n**Code Compilation** (30/30): Compiles."));
        assert!(review.overall_feedback.ends_with("\n\nDecent."));
        assert_eq!(review.suggestions, DEFAULT_SUGGESTIONS);
    }

    #[test]
    fn custom_reply_with_zero_max_is_invalid() {
        let reply = r#"{"total_score": 5, "max_score": 0,
            "code_compilation": {"score": 5, "feedback": "x"}}"#;
        assert_eq!(parse_review(reply, &custom_rubric()), Err(ResponseError::InvalidMaxScore));
    }

    #[test]
    fn custom_reply_without_criteria_is_invalid() {
        let reply = r#"{"total_score": 5, "max_score": 60, "overall_feedback": "x"}"#;
        assert_eq!(parse_review(reply, &custom_rubric()), Err(ResponseError::NoCriteria));
    }

    #[test]
    fn unknown_custom_keys_are_title_cased() {
        let reply = r#"{"total_score": 9, "max_score": 10,
            "uses_recursion": {"score": 9, "max_score": 10, "feedback": "Nice."}}"#;
        let review = parse_review(reply, &custom_rubric()).expect("parse");
        assert_eq!(review.custom_criteria[0].name, "Uses Recursion");
        assert_eq!(bucket_for("Uses Recursion"), 0);
        assert_eq!(bucket_for("Minor issues"), 1);
        assert_eq!(bucket_for("Performance"), 2);
        assert_eq!(bucket_for("Clarity"), 3);
    }
}
