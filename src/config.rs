#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use reqwest::Client;

/// Default C++ compiler driver.
const DEFAULT_CXX: &str = "g++";

/// OpenAI-compatible endpoint settings sourced from the environment.
#[derive(Clone, Debug)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:    String,
    /// API key used to authenticate requests.
    api_key:     String,
    /// Model identifier for chat completions.
    model:       String,
    /// Optional temperature override.
    temperature: Option<f32>,
}

impl OpenAiEnv {
    /// Creates an endpoint description from explicit values.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base:    api_base.into(),
            api_key:     api_key.into(),
            model:       model.into(),
            temperature: None,
        }
    }

    /// Construct an `OpenAiEnv` from environment variables; returns `None` if
    /// any required field is missing.
    fn from_env() -> Option<Self> {
        let api_base = std::env::var("OPENAI_ENDPOINT")
            .map(|s| s.trim().to_owned())
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY").ok()?.trim().to_owned();
        let model = std::env::var("OPENAI_MODEL").ok()?.trim().to_owned();

        if api_base.is_empty() || api_key.is_empty() || model.is_empty() {
            return None;
        }

        let temperature = std::env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok());

        Some(Self {
            api_base,
            api_key,
            model,
            temperature,
        })
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

/// Prompt templates shipped with the binary.
///
/// Templates use `{{name}}` placeholders that are substituted verbatim.
#[derive(Clone, Debug)]
pub struct Prompts {
    /// Template for the rubric-based grading request.
    grading: String,
    /// Template for the test-case synthesis request.
    testgen: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            grading: include_str!("prompts/grading.md").to_string(),
            testgen: include_str!("prompts/testgen.md").to_string(),
        }
    }
}

impl Prompts {
    /// Returns the grading prompt template.
    pub fn grading(&self) -> &str {
        &self.grading
    }

    /// Returns the test generation prompt template.
    pub fn testgen(&self) -> &str {
        &self.testgen
    }
}

/// Runtime configuration for the grading pipeline.
#[derive(Clone, Debug)]
pub struct Config {
    /// OpenAI-compatible endpoint, if configured.
    openai:             Option<OpenAiEnv>,
    /// Compiler driver invoked for every compilation.
    compiler:           String,
    /// Wall-clock budget for a single compilation.
    compile_timeout:    Duration,
    /// Wall-clock budget for a single program run.
    run_timeout:        Duration,
    /// Request timeout applied to LLM calls.
    llm_timeout:        Duration,
    /// Output-token budget for the grading call.
    grading_max_tokens: u32,
    /// Output-token budget for test synthesis.
    testgen_max_tokens: u32,
    /// Prompt templates.
    prompts:            Prompts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai:             None,
            compiler:           DEFAULT_CXX.to_string(),
            compile_timeout:    Duration::from_secs(30),
            run_timeout:        Duration::from_secs(10),
            llm_timeout:        Duration::from_secs(120),
            grading_max_tokens: 4000,
            testgen_max_tokens: 2000,
            prompts:            Prompts::default(),
        }
    }
}

impl Config {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai:             OpenAiEnv::from_env(),
            compiler:           std::env::var("CPPGRADE_CXX")
                .map(|value| value.trim().to_owned())
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.compiler),
            compile_timeout:    read_timeout_secs("CPPGRADE_COMPILE_TIMEOUT_SECS", 30),
            run_timeout:        read_timeout_secs("CPPGRADE_RUN_TIMEOUT_SECS", 10),
            llm_timeout:        read_timeout_secs("CPPGRADE_LLM_TIMEOUT_SECS", 120),
            grading_max_tokens: read_u32("CPPGRADE_GRADING_MAX_TOKENS", 4000),
            testgen_max_tokens: read_u32("CPPGRADE_TESTGEN_MAX_TOKENS", 2000),
            prompts:            defaults.prompts,
        }
    }

    /// Returns the OpenAI configuration, if all required variables are set.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Replaces the OpenAI configuration.
    pub fn with_openai(mut self, openai: OpenAiEnv) -> Self {
        self.openai = Some(openai);
        self
    }

    /// Returns the compiler driver.
    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Overrides the compiler driver.
    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    /// Returns the compilation timeout.
    pub fn compile_timeout(&self) -> Duration {
        self.compile_timeout
    }

    /// Overrides the compilation timeout.
    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    /// Returns the per-run timeout for test executions.
    pub fn run_timeout(&self) -> Duration {
        self.run_timeout
    }

    /// Overrides the per-run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Returns the LLM request timeout.
    pub fn llm_timeout(&self) -> Duration {
        self.llm_timeout
    }

    /// Returns the output-token budget for grading.
    pub fn grading_max_tokens(&self) -> u32 {
        self.grading_max_tokens
    }

    /// Returns the output-token budget for test synthesis.
    pub fn testgen_max_tokens(&self) -> u32 {
        self.testgen_max_tokens
    }

    /// Returns the prompt templates.
    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Builds the HTTP client used for LLM calls, bounded by `llm_timeout`.
    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .timeout(self.llm_timeout)
            .build()
            .context("Failed to construct shared HTTP client")
    }
}

/// Shared configuration handle.
pub type ConfigHandle = Arc<Config>;

/// Global storage for the lazily constructed configuration.
static CONFIG_SLOT: OnceLock<Mutex<Option<ConfigHandle>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<ConfigHandle>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Returns the process-wide configuration, reading the environment (and a
/// `.env` file) on first use.
pub fn get() -> ConfigHandle {
    let mut guard = slot().lock().expect("config slot poisoned");
    if let Some(cfg) = guard.as_ref() {
        return Arc::clone(cfg);
    }

    dotenvy::dotenv().ok();
    let cfg = Arc::new(Config::from_env());
    *guard = Some(Arc::clone(&cfg));
    cfg
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Parses an environment variable into a `u32`.
fn read_u32(env: &str, default: u32) -> u32 {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
