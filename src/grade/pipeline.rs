#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs the tools, asks the model, and persists one grade.

use std::{
    any::Any,
    fmt::Display,
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Instant,
};

use futures::FutureExt;
use uuid::Uuid;

use super::{
    fallback::fallback_review,
    prompt::GradingPrompt,
    response::parse_review,
    results::{GradedBy, GradingResult, Review, ToolOutputs},
    testgen::TestSynthesizer,
};
use crate::{
    config::ConfigHandle,
    cpp::{
        CompilationResult, CompileFailure, Compiler, DiffRunner, Rubric, StyleReport,
        TestRunReport, read_source, rubric, style,
    },
    error::GradingError,
    llm::{CompletionClient, LlmError},
    store::{Assignment, GradingStore, Submission, SubmissionStatus},
    util::round_half_up,
};

/// Steps of a grading attempt, logged as the attempt moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStage {
    /// Compiler, style, rubric and test tools have produced their outputs.
    ToolsRun,
    /// The grading prompt has been rendered.
    PromptBuilt,
    /// The model has replied.
    ModelCalled,
    /// The reply parsed into a review.
    ResponseParsed,
    /// The tool-only grader produced the review.
    Fallback,
    /// The result and submission status were stored.
    ResultPersisted,
}

impl Display for GradingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ToolsRun => "tools_run",
            Self::PromptBuilt => "prompt_built",
            Self::ModelCalled => "model_called",
            Self::ResponseParsed => "response_parsed",
            Self::Fallback => "fallback",
            Self::ResultPersisted => "result_persisted",
        })
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Runs a tool stage so that neither an error nor a panic escapes it.
async fn isolated<T, F>(stage: &'static str, future: F) -> Result<T, String>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let outcome = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload)),
    };
    if let Err(reason) = &outcome {
        tracing::warn!(stage, "tool stage failed, using neutral value: {reason}");
    }
    outcome
}

/// Grades submissions end to end.
#[derive(Clone)]
pub struct Grader {
    /// Where submissions, assignments and results live.
    store:       Arc<dyn GradingStore>,
    /// Model used for the qualitative review.
    client:      Arc<dyn CompletionClient>,
    /// Runtime configuration.
    config:      ConfigHandle,
    /// Test-case generator sharing `client`.
    synthesizer: TestSynthesizer,
    /// Differential runner.
    runner:      DiffRunner,
}

impl Grader {
    /// Creates a grader.
    pub fn new(
        store: Arc<dyn GradingStore>,
        client: Arc<dyn CompletionClient>,
        config: ConfigHandle,
    ) -> Self {
        let synthesizer = TestSynthesizer::new(Arc::clone(&client), &config);
        let runner = DiffRunner::new(&config);
        Self {
            store,
            client,
            config,
            synthesizer,
            runner,
        }
    }

    /// The store this grader reads from and writes to.
    pub fn store(&self) -> &Arc<dyn GradingStore> {
        &self.store
    }

    /// Grades a stored submission, persisting the result and moving the
    /// submission to `Graded`, or to `Error` with `error_details` set.
    pub async fn grade_one(&self, submission_id: Uuid) -> Result<GradingResult, GradingError> {
        let submission = self
            .store
            .submission(submission_id)
            .await
            .map_err(GradingError::Persistence)?
            .ok_or(GradingError::NotFound {
                kind: "submission",
                id:   submission_id,
            })?;

        match self.grade_loaded(&submission).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(%submission_id, "grading failed: {e}");
                let details = format!("Grading failed: {e}");
                let marked = self
                    .store
                    .update_submission(
                        submission_id,
                        Box::new(move |s: &mut Submission| {
                            s.status = SubmissionStatus::Error;
                            s.error_details = Some(details);
                        }),
                    )
                    .await;
                if let Err(store_error) = marked {
                    tracing::error!(%submission_id, "could not record failure: {store_error:#}");
                }
                Err(e)
            }
        }
    }

    /// Loads the assignment, grades, and persists.
    async fn grade_loaded(&self, submission: &Submission) -> Result<GradingResult, GradingError> {
        let assignment = self
            .store
            .assignment(submission.assignment_id)
            .await
            .map_err(GradingError::Persistence)?
            .ok_or(GradingError::NotFound {
                kind: "assignment",
                id:   submission.assignment_id,
            })?;

        self.store
            .update_submission(
                submission.id,
                Box::new(|s: &mut Submission| {
                    s.status = SubmissionStatus::Grading;
                    s.error_details = None;
                }),
            )
            .await
            .map_err(GradingError::Persistence)?;

        let result = self.grade_submission(submission, &assignment).await?;

        self.store
            .save_result(&result)
            .await
            .map_err(GradingError::Persistence)?;
        let (total, percentage, graded_at) =
            (round_half_up(result.total_score), result.percentage, result.graded_at);
        self.store
            .update_submission(
                submission.id,
                Box::new(move |s: &mut Submission| {
                    s.status = SubmissionStatus::Graded;
                    s.total_score = Some(total);
                    s.percentage = Some(percentage);
                    s.graded_at = Some(graded_at);
                    s.error_details = None;
                }),
            )
            .await
            .map_err(GradingError::Persistence)?;

        tracing::info!(
            submission_id = %submission.id,
            stage = %GradingStage::ResultPersisted,
            percentage = result.percentage,
            graded_by = %result.graded_by,
            "graded submission"
        );
        Ok(result)
    }

    /// Grades one submission without touching the store.
    ///
    /// Only unreadable files, scratch-directory failures and model transport
    /// errors are fatal; every tool failure degrades to a neutral value and
    /// every unusable model reply falls back to tool-only grading.
    pub async fn grade_submission(
        &self,
        submission: &Submission,
        assignment: &Assignment,
    ) -> Result<GradingResult, GradingError> {
        let started = Instant::now();
        let submission_id = submission.id;

        let student = read_source(&submission.source, "submission")?;
        let reference = read_source(&assignment.reference_source, "reference solution")?;

        let scratch = tempfile::Builder::new()
            .prefix("cppgrade-")
            .tempdir()
            .map_err(GradingError::Workspace)?;
        let compiler = Compiler::new(&self.config, scratch.path());

        let rubric = isolated("rubric", async { Ok(rubric::extract(&reference)) })
            .await
            .unwrap_or(Rubric::Default);
        let compilation = isolated("compile", async {
            Ok(compiler.compile(&student, "student").await)
        })
        .await
        .unwrap_or_else(|e| CompilationResult::failed(CompileFailure::System, e));
        let style = isolated("style", async { Ok(style::analyze(&student)) })
            .await
            .unwrap_or_else(|e| StyleReport::neutral(e));
        let tests = isolated(
            "tests",
            self.run_tests(&compiler, &compilation, &reference, &assignment.description),
        )
        .await
        .unwrap_or_else(|e| TestRunReport::neutral(e));

        tracing::info!(
            %submission_id,
            stage = %GradingStage::ToolsRun,
            compiled = compilation.success,
            passed = tests.passed,
            total = tests.total,
            style = style.score,
            custom_rubric = rubric.is_custom(),
            "tools finished"
        );

        let assignment_name = match &rubric {
            Rubric::Custom(custom) if custom.assignment_name() != rubric::UNKNOWN_ASSIGNMENT => {
                custom.assignment_name().to_string()
            }
            _ => assignment.name.clone(),
        };
        let prompt = GradingPrompt {
            assignment:  &assignment_name,
            student:     &student,
            reference:   &reference,
            compilation: &compilation,
            tests:       &tests,
            style:       &style,
            rubric:      &rubric,
        }
        .render(self.config.prompts().grading());
        tracing::debug!(%submission_id, stage = %GradingStage::PromptBuilt, chars = prompt.len());

        let fallback = |reason: String| -> (Review, GradedBy) {
            tracing::warn!(%submission_id, stage = %GradingStage::Fallback, "{reason}");
            (fallback_review(&compilation, &style, &tests), GradedBy::Fallback)
        };

        let (review, graded_by) = match self
            .client
            .complete(&prompt, self.config.grading_max_tokens())
            .await
        {
            Ok(reply) => {
                tracing::debug!(%submission_id, stage = %GradingStage::ModelCalled, chars = reply.len());
                match parse_review(&reply, &rubric) {
                    Ok(review) => {
                        tracing::debug!(%submission_id, stage = %GradingStage::ResponseParsed);
                        let model = self.client.model_name().to_string();
                        (review, GradedBy::Model { model })
                    }
                    Err(e) => fallback(e.to_string()),
                }
            }
            Err(e @ (LlmError::NotConfigured | LlmError::EmptyResponse)) => fallback(e.to_string()),
            Err(e @ LlmError::Transport(_)) => return Err(GradingError::Model(e)),
        };

        let tool_outputs = ToolOutputs {
            compilation,
            tests,
            style,
            rubric: rubric.report(),
        };
        drop(scratch);

        Ok(GradingResult::assemble(
            submission_id,
            review,
            graded_by,
            tool_outputs,
            started.elapsed().as_secs_f64(),
        ))
    }

    /// Compiles the reference, synthesizes cases and runs them, unless one
    /// side failed to compile.
    async fn run_tests(
        &self,
        compiler: &Compiler,
        compilation: &CompilationResult,
        reference: &str,
        description: &str,
    ) -> anyhow::Result<TestRunReport> {
        let reference_build = compiler.compile(reference, "reference").await;
        if let Some(report) = DiffRunner::precheck(compilation, &reference_build) {
            return Ok(report);
        }

        let cases = self.synthesizer.synthesize(reference, description).await;
        Ok(self.runner.run(compilation, &reference_build, &cases).await)
    }
}
