#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Batch grading: many submissions for one assignment, graded in the
//! background by a single worker fed from a queue.

use std::{panic::AssertUnwindSafe, sync::Arc};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
    constants::BATCH_FEEDBACK_PREVIEW,
    error::GradingError,
    grade::{CriterionScore, Grader, panic_message},
    store::{BatchJob, GradingStore, JobState, Submission, SubmissionStatus},
    util::truncate_chars,
};

/// Name used when nothing usable remains of a file name.
const UNKNOWN_STUDENT: &str = "Unknown Student";

/// Assignment suffixes stripped from file names, checked in this order.
const NAME_SUFFIXES: [&str; 3] = ["lab", "assignment", "hw"];

/// An uploaded file in a batch.
#[derive(Debug, Clone)]
pub struct SubmissionFile {
    /// Original file name, used to derive the student name.
    pub file_name: String,
    /// Raw file content.
    pub bytes:     Vec<u8>,
}

impl SubmissionFile {
    /// Creates an uploaded file.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Removes one trailing `[_-]?<suffix>\d*`, ignoring case.
fn strip_suffix_ignore_case(name: &str, suffix: &str) -> Option<String> {
    let without_digits = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let split = without_digits.len().checked_sub(suffix.len())?;
    if !without_digits.is_char_boundary(split)
        || !without_digits[split..].eq_ignore_ascii_case(suffix)
    {
        return None;
    }
    let head = &without_digits[..split];
    Some(head.strip_suffix(['_', '-']).unwrap_or(head).to_string())
}

/// Derives a display name from a submission file name, eg.
/// `johnDoelab1.cpp` -> `John Doe`, `maryCalderon_Lab01.cpp` -> `Mary
/// Calderon`.
pub fn student_name_from_file(file_name: &str) -> String {
    let mut name = match file_name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name.to_string(),
    };

    for suffix in NAME_SUFFIXES {
        if let Some(stripped) = strip_suffix_ignore_case(&name, suffix) {
            name = stripped;
        }
    }

    let mut spaced = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for c in name.chars() {
        if c.is_ascii_uppercase() && previous.is_some_and(|p| p.is_ascii_lowercase()) {
            spaced.push(' ');
        }
        spaced.push(if c == '_' || c == '-' { ' ' } else { c });
        previous = Some(c);
    }

    let words: Vec<String> = spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        UNKNOWN_STUDENT.to_string()
    } else {
        words.join(" ")
    }
}

/// Progress and statistics of a batch, as reported to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    /// Job identifier.
    pub id:                  Uuid,
    /// Current state.
    pub status:              JobState,
    /// Assignment name.
    pub assignment_name:     String,
    /// Submissions in the batch.
    pub total_files:         usize,
    /// Submissions that reached a terminal state.
    pub processed_files:     usize,
    /// Submissions graded successfully.
    pub successful_grades:   usize,
    /// Submissions that ended in error.
    pub failed_grades:       usize,
    /// `processed / total * 100`.
    pub progress_percentage: f64,
    /// Mean percentage over graded submissions.
    pub average_score:       Option<f64>,
    /// Best percentage.
    pub highest_score:       Option<f64>,
    /// Worst percentage.
    pub lowest_score:        Option<f64>,
    /// When the job was created.
    pub created_at:          DateTime<Utc>,
    /// When the worker started it.
    pub started_at:          Option<DateTime<Utc>>,
    /// When it finished.
    pub completed_at:        Option<DateTime<Utc>>,
    /// Why the job failed.
    pub error_message:       Option<String>,
}

impl BatchStatus {
    /// Whether the job reached `Completed` or `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobState::Completed | JobState::Failed)
    }

    /// Builds the view of `job`.
    fn from_job(job: &BatchJob, assignment_name: String) -> Self {
        let progress_percentage = if job.total_files == 0 {
            0.0
        } else {
            job.processed_files as f64 / job.total_files as f64 * 100.0
        };
        Self {
            id: job.id,
            status: job.status,
            assignment_name,
            total_files: job.total_files,
            processed_files: job.processed_files,
            successful_grades: job.successful_grades,
            failed_grades: job.failed_grades,
            progress_percentage,
            average_score: job.average_score,
            highest_score: job.highest_score,
            lowest_score: job.lowest_score,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
        }
    }
}

/// Per-criterion detail attached to a graded batch row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingDetails {
    /// The four display buckets.
    pub criteria:             Vec<CriterionScore>,
    /// Overall feedback, shortened for listings.
    pub overall_feedback:     String,
    /// Seconds spent grading.
    pub processing_time_secs: f64,
    /// Model name or `fallback`.
    pub graded_by:            String,
}

/// One submission in a batch listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultRow {
    /// Submission id.
    pub id:              Uuid,
    /// Student display name.
    pub student_name:    String,
    /// Uploaded file name.
    pub file_name:       String,
    /// Submission status.
    pub status:          SubmissionStatus,
    /// When grading finished.
    pub graded_at:       Option<DateTime<Utc>>,
    /// Rounded total score.
    pub total_score:     Option<i64>,
    /// Percentage.
    pub percentage:      Option<f64>,
    /// Details for graded submissions.
    pub grading_details: Option<GradingDetails>,
    /// Failure reason for errored submissions.
    pub error_details:   Option<String>,
}

/// Compact table row for terminal output.
#[derive(Tabled)]
struct SummaryRow {
    /// Student display name.
    #[tabled(rename = "Student")]
    student: String,
    /// Uploaded file name.
    #[tabled(rename = "File")]
    file:    String,
    /// Status word.
    #[tabled(rename = "Status")]
    status:  String,
    /// Percentage or error.
    #[tabled(rename = "Result")]
    result:  String,
}

/// Status plus per-submission rows, ordered by student name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Job status.
    pub batch:   BatchStatus,
    /// One row per submission.
    pub results: Vec<BatchResultRow>,
}

impl BatchResults {
    /// Renders the rows as a table.
    pub fn table(&self) -> String {
        use tabled::{
            Table,
            settings::{Panel, Style},
        };

        let rows = self.results.iter().map(|row| SummaryRow {
            student: row.student_name.clone(),
            file:    row.file_name.clone(),
            status:  format!("{:?}", row.status).to_lowercase(),
            result:  match (&row.percentage, &row.error_details) {
                (Some(p), _) => format!("{p:.1}%"),
                (None, Some(e)) => truncate_chars(e, 60),
                (None, None) => "-".to_string(),
            },
        });

        let footer = match self.batch.average_score {
            Some(avg) => format!(
                "{}/{} graded, average {avg:.1}%",
                self.batch.successful_grades, self.batch.total_files
            ),
            None => format!(
                "{}/{} graded",
                self.batch.successful_grades, self.batch.total_files
            ),
        };

        Table::new(rows)
            .with(Panel::header(format!(
                "Batch {} ({})",
                self.batch.id, self.batch.assignment_name
            )))
            .with(Panel::footer(footer))
            .with(Style::modern())
            .to_string()
    }
}

/// Sending half of the batch queue.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    /// Job ids waiting for the worker.
    sender: mpsc::UnboundedSender<Uuid>,
}

impl BatchQueue {
    /// Creates a queue and the receiver a [`BatchWorker`] drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueues a job. Fails only when the worker has shut down.
    pub fn enqueue(&self, job_id: Uuid) -> anyhow::Result<()> {
        self.sender
            .send(job_id)
            .map_err(|_| anyhow::anyhow!("batch worker is not running"))
    }
}

/// Grades queued batch jobs one submission at a time.
pub struct BatchWorker {
    /// Grader shared with interactive grading.
    grader:   Grader,
    /// Queue being drained.
    receiver: mpsc::UnboundedReceiver<Uuid>,
}

impl BatchWorker {
    /// Creates a worker draining `receiver`.
    pub fn new(grader: Grader, receiver: mpsc::UnboundedReceiver<Uuid>) -> Self {
        Self { grader, receiver }
    }

    /// Creates a queue, a worker for it, and spawns the worker after
    /// re-enqueuing unfinished jobs from the store.
    pub async fn spawn(grader: Grader) -> anyhow::Result<(BatchQueue, JoinHandle<()>)> {
        let (queue, receiver) = BatchQueue::new();
        let recovered = Self::recover(grader.store().as_ref(), &queue).await?;
        if recovered > 0 {
            tracing::info!(recovered, "re-enqueued unfinished batch jobs");
        }
        let worker = Self::new(grader, receiver);
        Ok((queue, tokio::spawn(worker.run())))
    }

    /// Re-enqueues every job still pending or processing in the store.
    pub async fn recover(store: &dyn GradingStore, queue: &BatchQueue) -> anyhow::Result<usize> {
        let unfinished = store.unfinished_batches().await?;
        for job_id in &unfinished {
            queue.enqueue(*job_id)?;
        }
        Ok(unfinished.len())
    }

    /// Processes jobs until every queue handle is dropped.
    pub async fn run(mut self) {
        while let Some(job_id) = self.receiver.recv().await {
            self.process_job(job_id).await;
        }
        tracing::debug!("batch queue closed; worker exiting");
    }

    /// Processes one job, marking it failed if it cannot be processed.
    pub async fn process_job(&self, job_id: Uuid) {
        if let Err(e) = self.try_process_job(job_id).await {
            tracing::error!(%job_id, "batch job failed: {e}");
            let message = e.to_string();
            let marked = self
                .grader
                .store()
                .update_batch_progress(
                    job_id,
                    Box::new(move |job: &mut BatchJob| {
                        job.status = JobState::Failed;
                        job.error_message = Some(message);
                        job.completed_at = Some(Utc::now());
                    }),
                )
                .await;
            if let Err(store_error) = marked {
                tracing::error!(%job_id, "could not record batch failure: {store_error:#}");
            }
        }
    }

    /// Grades every unfinished submission of a job, updating progress after
    /// each one, then records statistics.
    async fn try_process_job(&self, job_id: Uuid) -> Result<(), GradingError> {
        let store = self.grader.store();
        let job = store
            .batch(job_id)
            .await
            .map_err(GradingError::Persistence)?
            .ok_or(GradingError::NotFound {
                kind: "batch job",
                id:   job_id,
            })?;
        if matches!(job.status, JobState::Completed | JobState::Failed) {
            tracing::debug!(%job_id, "batch job already finished");
            return Ok(());
        }

        store
            .update_batch_progress(
                job_id,
                Box::new(|job: &mut BatchJob| {
                    job.status = JobState::Processing;
                    job.started_at.get_or_insert_with(Utc::now);
                }),
            )
            .await
            .map_err(GradingError::Persistence)?;

        let submissions = store
            .batch_submissions(job_id)
            .await
            .map_err(GradingError::Persistence)?;
        tracing::info!(%job_id, total = submissions.len(), "batch grading started");

        for (index, submission) in submissions.iter().enumerate() {
            if matches!(
                submission.status,
                SubmissionStatus::Graded | SubmissionStatus::Error
            ) {
                continue;
            }

            let outcome = AssertUnwindSafe(self.grader.grade_one(submission.id))
                .catch_unwind()
                .await;
            let graded = match outcome {
                Ok(Ok(result)) => {
                    tracing::info!(
                        %job_id,
                        student = %submission.student_name,
                        percentage = result.percentage,
                        "graded {}/{}",
                        index + 1,
                        submissions.len()
                    );
                    true
                }
                Ok(Err(e)) => {
                    tracing::warn!(%job_id, student = %submission.student_name, "grading failed: {e}");
                    false
                }
                Err(payload) => {
                    let reason = panic_message(payload);
                    tracing::error!(%job_id, student = %submission.student_name, "grading {reason}");
                    let details = format!("Grading failed: {reason}");
                    store
                        .update_submission(
                            submission.id,
                            Box::new(move |s: &mut Submission| {
                                s.status = SubmissionStatus::Error;
                                s.error_details = Some(details);
                            }),
                        )
                        .await
                        .map_err(GradingError::Persistence)?;
                    false
                }
            };

            store
                .update_batch_progress(
                    job_id,
                    Box::new(move |job: &mut BatchJob| {
                        job.processed_files += 1;
                        if graded {
                            job.successful_grades += 1;
                        } else {
                            job.failed_grades += 1;
                        }
                    }),
                )
                .await
                .map_err(GradingError::Persistence)?;
        }

        let percentages: Vec<f64> = store
            .batch_submissions(job_id)
            .await
            .map_err(GradingError::Persistence)?
            .iter()
            .filter(|s| s.status == SubmissionStatus::Graded)
            .filter_map(|s| s.percentage)
            .collect();

        let finished = store
            .update_batch_progress(
                job_id,
                Box::new(move |job: &mut BatchJob| {
                    if !percentages.is_empty() {
                        job.average_score =
                            Some(percentages.iter().sum::<f64>() / percentages.len() as f64);
                        job.highest_score = percentages.iter().copied().reduce(f64::max);
                        job.lowest_score = percentages.iter().copied().reduce(f64::min);
                    }
                    job.status = JobState::Completed;
                    job.completed_at = Some(Utc::now());
                }),
            )
            .await
            .map_err(GradingError::Persistence)?;

        tracing::info!(
            %job_id,
            processed = finished.processed_files,
            successful = finished.successful_grades,
            failed = finished.failed_grades,
            average = ?finished.average_score,
            "batch grading completed"
        );
        Ok(())
    }
}

/// Entry point for creating and observing batch jobs.
#[derive(Clone)]
pub struct BatchService {
    /// Durable state.
    store: Arc<dyn GradingStore>,
    /// Queue feeding the worker.
    queue: BatchQueue,
}

impl BatchService {
    /// Creates a service that enqueues onto `queue`.
    pub fn new(store: Arc<dyn GradingStore>, queue: BatchQueue) -> Self {
        Self { store, queue }
    }

    /// Persists a job and its submissions, enqueues it, and returns its id
    /// without waiting for grading.
    pub async fn grade_batch(
        &self,
        assignment_id: Uuid,
        files: Vec<SubmissionFile>,
    ) -> Result<Uuid, GradingError> {
        self.store
            .assignment(assignment_id)
            .await
            .map_err(GradingError::Persistence)?
            .ok_or(GradingError::NotFound {
                kind: "assignment",
                id:   assignment_id,
            })?;

        let job = BatchJob::new(assignment_id, files.len());
        let job_id = job.id;
        self.store
            .put_batch(job)
            .await
            .map_err(GradingError::Persistence)?;

        for file in files {
            let student_name = student_name_from_file(&file.file_name);
            let mut submission =
                Submission::new(assignment_id, &student_name, file.file_name, file.bytes);
            submission.batch_job_id = Some(job_id);
            tracing::debug!(%job_id, student = %student_name, "created batch submission");
            self.store
                .put_submission(submission)
                .await
                .map_err(GradingError::Persistence)?;
        }

        // The job is durable; a worker started later picks it up via recover.
        if let Err(e) = self.queue.enqueue(job_id) {
            tracing::warn!(%job_id, "{e}; job stays pending until the worker restarts");
        }
        tracing::info!(%job_id, "batch job created");
        Ok(job_id)
    }

    /// Current progress and statistics of a job.
    pub async fn get_batch_status(&self, job_id: Uuid) -> Result<BatchStatus, GradingError> {
        let job = self
            .store
            .batch(job_id)
            .await
            .map_err(GradingError::Persistence)?
            .ok_or(GradingError::NotFound {
                kind: "batch job",
                id:   job_id,
            })?;
        let assignment_name = self
            .store
            .assignment(job.assignment_id)
            .await
            .map_err(GradingError::Persistence)?
            .map(|a| a.name)
            .unwrap_or_default();
        Ok(BatchStatus::from_job(&job, assignment_name))
    }

    /// Status plus one row per submission, ordered by student name.
    pub async fn get_batch_results(&self, job_id: Uuid) -> Result<BatchResults, GradingError> {
        let batch = self.get_batch_status(job_id).await?;
        let mut submissions = self
            .store
            .batch_submissions(job_id)
            .await
            .map_err(GradingError::Persistence)?;
        submissions.sort_by(|a, b| a.student_name.cmp(&b.student_name));

        let mut results = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let grading_details = self
                .store
                .result(submission.id)
                .await
                .map_err(GradingError::Persistence)?
                .map(|result| GradingDetails {
                    overall_feedback:     truncate_chars(
                        &result.overall_feedback,
                        BATCH_FEEDBACK_PREVIEW,
                    ),
                    processing_time_secs: result.processing_time_secs,
                    graded_by:            result.graded_by.name().to_string(),
                    criteria:             result.criteria,
                });

            results.push(BatchResultRow {
                id: submission.id,
                student_name: submission.student_name,
                file_name: submission.file_name,
                status: submission.status,
                graded_at: submission.graded_at,
                total_score: submission.total_score,
                percentage: submission.percentage,
                grading_details,
                error_details: submission.error_details,
            });
        }

        Ok(BatchResults { batch, results })
    }
}
