#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Asks the model for stdin test inputs based on the reference solution.

use std::sync::Arc;

use super::{extract::candidate_spans, prompt::fill_template};
use crate::{config::Config, cpp::TestCase, llm::CompletionClient};

/// Why model-generated cases were rejected.
#[derive(thiserror::Error, Debug)]
enum SynthesisError {
    /// The model call failed.
    #[error(transparent)]
    Model(#[from] crate::llm::LlmError),
    /// No array could be located in the reply.
    #[error("no JSON array found in response")]
    NoArray,
    /// An array was found but was not a list of well-formed cases.
    #[error("invalid test cases: {0}")]
    Invalid(String),
}

/// The three fixed cases used whenever synthesis fails.
pub fn fallback_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("Basic Input Test", "5 3 8 1 9 -999", "Test with basic integer input"),
        TestCase::new("Empty Input Test", "-999", "Test with immediate termination"),
        TestCase::new("Single Number Test", "42 -999", "Test with single number"),
    ]
}

/// Parses the first array span that holds at least one well-formed case.
fn parse_cases(text: &str) -> Result<Vec<TestCase>, SynthesisError> {
    let spans = candidate_spans(text, '[', ']');
    if spans.is_empty() {
        return Err(SynthesisError::NoArray);
    }

    let mut last_error = SynthesisError::NoArray;
    for span in spans {
        match serde_json::from_str::<Vec<TestCase>>(span) {
            Ok(cases) if !cases.is_empty() => return Ok(cases),
            Ok(_) => last_error = SynthesisError::Invalid("empty array".into()),
            Err(e) => last_error = SynthesisError::Invalid(e.to_string()),
        }
    }
    Err(last_error)
}

/// Produces test inputs, falling back to fixed cases on any failure.
#[derive(Clone)]
pub struct TestSynthesizer {
    /// Completion capability.
    client:     Arc<dyn CompletionClient>,
    /// Output-token budget.
    max_tokens: u32,
    /// Prompt template.
    template:   String,
}

impl TestSynthesizer {
    /// Creates a synthesizer using `client` and the configured template and
    /// token budget.
    pub fn new(client: Arc<dyn CompletionClient>, config: &Config) -> Self {
        Self {
            client,
            max_tokens: config.testgen_max_tokens(),
            template: config.prompts().testgen().to_string(),
        }
    }

    /// Returns at least one test case; never fails.
    pub async fn synthesize(&self, reference: &str, description: &str) -> Vec<TestCase> {
        match self.try_synthesize(reference, description).await {
            Ok(cases) => {
                tracing::info!(count = cases.len(), "synthesized test cases");
                cases
            }
            Err(e) => {
                tracing::warn!("test synthesis failed, using fallback cases: {e}");
                fallback_cases()
            }
        }
    }

    /// One model call plus parsing.
    async fn try_synthesize(
        &self,
        reference: &str,
        description: &str,
    ) -> Result<Vec<TestCase>, SynthesisError> {
        let prompt = fill_template(
            &self.template,
            &[("description", description), ("reference", reference.trim_end())],
        );
        let reply = self.client.complete(&prompt, self.max_tokens).await?;
        parse_cases(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedClient;

    #[test]
    fn parses_cases_after_prose() {
        let reply = r#"I generated [3] cases:
[
  {"name": "Basic", "input": "1 2 -999", "description": "two numbers"},
  {"name": "Empty", "input": "-999", "description": "sentinel only", "extra": 1}
]"#;
        let cases = parse_cases(reply).expect("parse");
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].input, "-999");
    }

    #[test]
    fn rejects_incomplete_cases() {
        assert!(parse_cases(r#"[{"name": "a", "input": "1"}]"#).is_err());
        assert!(parse_cases(r#"[{"name": "a", "input": 1, "description": "d"}]"#).is_err());
        assert!(parse_cases("[]").is_err());
        assert!(matches!(parse_cases("no array"), Err(SynthesisError::NoArray)));
    }

    #[tokio::test]
    async fn transport_failure_uses_fallback_cases() {
        let synth = TestSynthesizer::new(
            Arc::new(ScriptedClient::failing("connection refused")),
            &Config::default(),
        );
        let cases = synth.synthesize("int main() {}", "sort numbers").await;
        assert_eq!(cases, fallback_cases());
        assert_eq!(cases.len(), 3);
    }

    #[tokio::test]
    async fn prompt_carries_description_and_reference() {
        let client = ScriptedClient::always(
            r#"[{"name": "n", "input": "4 -999", "description": "d"}]"#,
        );
        let synth = TestSynthesizer::new(Arc::new(client.clone()), &Config::default());
        let cases = synth.synthesize("int main() { /* ref */ }", "Sort numbers").await;
        assert_eq!(cases, vec![TestCase::new("n", "4 -999", "d")]);

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Sort numbers"));
        assert!(prompts[0].contains("/* ref */"));
    }
}
