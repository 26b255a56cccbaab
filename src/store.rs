#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Persistence boundary for submissions, assignments, results and batch jobs.
//!
//! Production deployments back [`GradingStore`] with a database; the crate
//! ships [`MemoryStore`] for the CLI and tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grade::GradingResult;

/// Lifecycle of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Waiting to be graded.
    Pending,
    /// A grader is working on it.
    Grading,
    /// A result was persisted.
    Graded,
    /// Grading failed; see `error_details`.
    Error,
}

/// A student's uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier.
    pub id:            Uuid,
    /// Assignment being answered.
    pub assignment_id: Uuid,
    /// Student display name.
    pub student_name:  String,
    /// Uploaded file name.
    pub file_name:     String,
    /// Raw uploaded bytes; never modified.
    pub source:        Vec<u8>,
    /// Current status.
    pub status:        SubmissionStatus,
    /// Why grading failed, when it did.
    pub error_details: Option<String>,
    /// Rounded total score, once graded.
    pub total_score:   Option<i64>,
    /// Percentage, once graded.
    pub percentage:    Option<f64>,
    /// When grading finished.
    pub graded_at:     Option<DateTime<Utc>>,
    /// Batch this submission belongs to, if any.
    pub batch_job_id:  Option<Uuid>,
    /// When the record was created.
    pub created_at:    DateTime<Utc>,
}

impl Submission {
    /// Creates a pending submission.
    pub fn new(
        assignment_id: Uuid,
        student_name: impl Into<String>,
        file_name: impl Into<String>,
        source: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            student_name: student_name.into(),
            file_name: file_name.into(),
            source,
            status: SubmissionStatus::Pending,
            error_details: None,
            total_score: None,
            percentage: None,
            graded_at: None,
            batch_job_id: None,
            created_at: Utc::now(),
        }
    }
}

/// An assignment with its reference solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Identifier.
    pub id:               Uuid,
    /// Display name.
    pub name:             String,
    /// Free-text description given to the test synthesizer.
    pub description:      String,
    /// Raw bytes of the reference solution.
    pub reference_source: Vec<u8>,
}

impl Assignment {
    /// Creates an assignment.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        reference_source: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            reference_source,
        }
    }
}

/// Lifecycle of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, not started.
    Pending,
    /// The worker is grading its submissions.
    Processing,
    /// Every submission reached a terminal state.
    Completed,
    /// The job itself could not be processed.
    Failed,
}

/// A batch of submissions graded together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    /// Identifier.
    pub id:                Uuid,
    /// Assignment all submissions answer.
    pub assignment_id:     Uuid,
    /// Current state.
    pub status:            JobState,
    /// Number of submissions in the batch.
    pub total_files:       usize,
    /// Submissions that reached a terminal state.
    pub processed_files:   usize,
    /// Submissions graded successfully.
    pub successful_grades: usize,
    /// Submissions that ended in error.
    pub failed_grades:     usize,
    /// Mean percentage over graded submissions.
    pub average_score:     Option<f64>,
    /// Best percentage.
    pub highest_score:     Option<f64>,
    /// Worst percentage.
    pub lowest_score:      Option<f64>,
    /// When the job was created.
    pub created_at:        DateTime<Utc>,
    /// When the worker picked it up.
    pub started_at:        Option<DateTime<Utc>>,
    /// When it finished.
    pub completed_at:      Option<DateTime<Utc>>,
    /// Why the job failed, when it did.
    pub error_message:     Option<String>,
}

impl BatchJob {
    /// Creates a pending job for `total_files` submissions.
    pub fn new(assignment_id: Uuid, total_files: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            status: JobState::Pending,
            total_files,
            processed_files: 0,
            successful_grades: 0,
            failed_grades: 0,
            average_score: None,
            highest_score: None,
            lowest_score: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Mutation applied to a submission under the store's lock.
pub type SubmissionUpdate = Box<dyn FnOnce(&mut Submission) + Send>;

/// Mutation applied to a batch job under the store's lock.
pub type BatchUpdate = Box<dyn FnOnce(&mut BatchJob) + Send>;

/// Storage used by the grader and the batch worker. Updates take closures
/// so read-modify-write happens atomically inside the store.
#[async_trait]
pub trait GradingStore: Send + Sync {
    /// Inserts or replaces an assignment.
    async fn put_assignment(&self, assignment: Assignment) -> Result<()>;

    /// Loads an assignment.
    async fn assignment(&self, id: Uuid) -> Result<Option<Assignment>>;

    /// Inserts or replaces a submission.
    async fn put_submission(&self, submission: Submission) -> Result<()>;

    /// Loads a submission.
    async fn submission(&self, id: Uuid) -> Result<Option<Submission>>;

    /// Applies `update` to a submission and returns the new value.
    async fn update_submission(&self, id: Uuid, update: SubmissionUpdate) -> Result<Submission>;

    /// Submissions of a batch, in creation order.
    async fn batch_submissions(&self, batch_id: Uuid) -> Result<Vec<Submission>>;

    /// Persists a result together with its raw tool outputs as audit JSON.
    async fn save_result(&self, result: &GradingResult) -> Result<()>;

    /// Loads the result for a submission.
    async fn result(&self, submission_id: Uuid) -> Result<Option<GradingResult>>;

    /// Raw tool outputs stored with a result.
    async fn tool_audit(&self, submission_id: Uuid) -> Result<Option<serde_json::Value>>;

    /// Inserts or replaces a batch job.
    async fn put_batch(&self, job: BatchJob) -> Result<()>;

    /// Loads a batch job.
    async fn batch(&self, id: Uuid) -> Result<Option<BatchJob>>;

    /// Applies `update` to a batch job and returns the new value.
    async fn update_batch_progress(&self, id: Uuid, update: BatchUpdate) -> Result<BatchJob>;

    /// Jobs still `Pending` or `Processing`, oldest first.
    async fn unfinished_batches(&self) -> Result<Vec<Uuid>>;
}

/// Tables held by [`MemoryStore`].
#[derive(Default)]
struct Tables {
    /// Assignments by id.
    assignments: HashMap<Uuid, Assignment>,
    /// Submissions by id.
    submissions: HashMap<Uuid, Submission>,
    /// Submission ids in insertion order.
    order:       Vec<Uuid>,
    /// Results by submission id.
    results:     HashMap<Uuid, GradingResult>,
    /// Tool output audit records by submission id.
    audit:       HashMap<Uuid, serde_json::Value>,
    /// Batch jobs by id.
    batches:     HashMap<Uuid, BatchJob>,
}

/// In-process [`GradingStore`].
#[derive(Default)]
pub struct MemoryStore {
    /// All tables behind one lock.
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables.
    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn put_assignment(&self, assignment: Assignment) -> Result<()> {
        self.tables()?.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        Ok(self.tables()?.assignments.get(&id).cloned())
    }

    async fn put_submission(&self, submission: Submission) -> Result<()> {
        let mut tables = self.tables()?;
        if !tables.submissions.contains_key(&submission.id) {
            tables.order.push(submission.id);
        }
        tables.submissions.insert(submission.id, submission);
        Ok(())
    }

    async fn submission(&self, id: Uuid) -> Result<Option<Submission>> {
        Ok(self.tables()?.submissions.get(&id).cloned())
    }

    async fn update_submission(&self, id: Uuid, update: SubmissionUpdate) -> Result<Submission> {
        let mut tables = self.tables()?;
        let submission = tables
            .submissions
            .get_mut(&id)
            .with_context(|| format!("submission {id} does not exist"))?;
        update(submission);
        Ok(submission.clone())
    }

    async fn batch_submissions(&self, batch_id: Uuid) -> Result<Vec<Submission>> {
        let tables = self.tables()?;
        Ok(tables
            .order
            .iter()
            .filter_map(|id| tables.submissions.get(id))
            .filter(|s| s.batch_job_id == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn save_result(&self, result: &GradingResult) -> Result<()> {
        let audit = serde_json::to_value(&result.tool_outputs)
            .context("Failed to serialize tool outputs")?;
        let mut tables = self.tables()?;
        tables.audit.insert(result.submission_id, audit);
        tables.results.insert(result.submission_id, result.clone());
        Ok(())
    }

    async fn result(&self, submission_id: Uuid) -> Result<Option<GradingResult>> {
        Ok(self.tables()?.results.get(&submission_id).cloned())
    }

    async fn tool_audit(&self, submission_id: Uuid) -> Result<Option<serde_json::Value>> {
        Ok(self.tables()?.audit.get(&submission_id).cloned())
    }

    async fn put_batch(&self, job: BatchJob) -> Result<()> {
        self.tables()?.batches.insert(job.id, job);
        Ok(())
    }

    async fn batch(&self, id: Uuid) -> Result<Option<BatchJob>> {
        Ok(self.tables()?.batches.get(&id).cloned())
    }

    async fn update_batch_progress(&self, id: Uuid, update: BatchUpdate) -> Result<BatchJob> {
        let mut tables = self.tables()?;
        let job = tables
            .batches
            .get_mut(&id)
            .with_context(|| format!("batch job {id} does not exist"))?;
        update(job);
        Ok(job.clone())
    }

    async fn unfinished_batches(&self) -> Result<Vec<Uuid>> {
        let tables = self.tables()?;
        let mut jobs: Vec<&BatchJob> = tables
            .batches
            .values()
            .filter(|job| matches!(job.status, JobState::Pending | JobState::Processing))
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs.into_iter().map(|job| job.id).collect())
    }
}
