#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Text-completion capability used by the test synthesizer and the grader.
//!
//! Pipeline components receive an `Arc<dyn CompletionClient>` instead of
//! reaching for a global client, so tests can substitute [`ScriptedClient`].

use std::sync::{Arc, Mutex};

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;

use crate::config::Config;

/// Failures of a completion request. None of them carry partial output.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No endpoint is configured, so no request was attempted.
    #[error("no language model is configured")]
    NotConfigured,
    /// The request failed in transit or the endpoint rejected it.
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered without any text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends `prompt` and returns the generated text, bounded by
    /// `max_tokens` output tokens.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;

    /// Identifier of the model behind this client, recorded in results.
    fn model_name(&self) -> &str;
}

/// Completion client for OpenAI-compatible chat endpoints.
pub struct OpenAiClient {
    /// Underlying async-openai client.
    client:      OpenAIClient<OpenAIConfig>,
    /// Model identifier.
    model:       String,
    /// Optional sampling temperature.
    temperature: Option<f32>,
}

impl OpenAiClient {
    /// Builds a client from `config`, or returns `None` when no endpoint is
    /// configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        let Some(openai) = config.openai() else {
            return Ok(None);
        };

        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(openai.api_base().to_owned())
                .with_api_key(openai.api_key().to_owned()),
        )
        .with_http_client(config.http_client()?);

        Ok(Some(Self {
            client,
            model: openai.model().to_owned(),
            temperature: openai.temperature(),
        }))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(vec![message.into()])
            .max_completion_tokens(max_tokens)
            .n(1);
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Client used when no endpoint is configured. Every call fails with
/// [`LlmError::NotConfigured`], which the pipeline treats as "grade with the
/// tools only".
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl CompletionClient for UnconfiguredClient {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Signature of the closure backing a [`ScriptedClient`].
type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Deterministic client that answers with a caller-supplied function and
/// records every prompt it receives.
#[derive(Clone)]
pub struct ScriptedClient {
    /// Produces a response for a prompt.
    responder: Arc<Responder>,
    /// Prompts seen so far, in order.
    prompts:   Arc<Mutex<Vec<String>>>,
}

impl ScriptedClient {
    /// Answers every prompt with `responder(prompt)`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            prompts:   Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every prompt with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Fails every prompt with a transport error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(LlmError::Transport(message.clone())))
    }

    /// Returns the prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        (self.responder)(prompt)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Builds the completion client for `config`: the OpenAI client when an
/// endpoint is configured, [`UnconfiguredClient`] otherwise.
pub fn client_from_config(config: &Config) -> anyhow::Result<Arc<dyn CompletionClient>> {
    Ok(match OpenAiClient::from_config(config)? {
        Some(client) => Arc::new(client),
        None => {
            tracing::warn!("OPENAI_API_KEY/OPENAI_MODEL not set; grading with tools only");
            Arc::new(UnconfiguredClient)
        }
    })
}
