use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use cppgrade::{
    batch::{BatchService, BatchStatus, BatchWorker, SubmissionFile},
    config::Config,
    grade::{Grader, GradingResult},
    llm::{ScriptedClient, UnconfiguredClient},
    store::{
        Assignment, BatchJob, BatchUpdate, GradingStore, JobState, MemoryStore, Submission,
        SubmissionStatus, SubmissionUpdate,
    },
};
use uuid::Uuid;

fn reference() -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("cpp")
        .join("sorted-echo")
        .join("reference.cpp");
    std::fs::read(path).expect("read reference")
}

async fn fixture() -> (Arc<MemoryStore>, Grader, Assignment) {
    let store = Arc::new(MemoryStore::new());
    let assignment = Assignment::new("Sorted Echo", "Sort integers until -999.", reference());
    store
        .put_assignment(assignment.clone())
        .await
        .expect("assignment");
    let grader = Grader::new(
        store.clone(),
        Arc::new(UnconfiguredClient),
        Arc::new(Config::default()),
    );
    (store, grader, assignment)
}

async fn wait_until_finished(service: &BatchService, job_id: Uuid) -> BatchStatus {
    for _ in 0..600 {
        let status = service.get_batch_status(job_id).await.expect("status");
        if status.is_finished() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("batch {job_id} did not finish");
}

#[tokio::test]
async fn batch_of_five_with_one_unreadable_file_completes() {
    let (store, grader, assignment) = fixture().await;
    let (queue, _worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store.clone(), queue);

    let files = vec![
        SubmissionFile::new("aliceAdams_lab1.cpp", reference()),
        SubmissionFile::new("bobBrown_lab1.cpp", reference()),
        SubmissionFile::new("carolChen_lab1.cpp", Vec::new()),
        SubmissionFile::new("daveDiaz_lab1.cpp", reference()),
        SubmissionFile::new("eveEvans_lab1.cpp", reference()),
    ];
    let job_id = service
        .grade_batch(assignment.id, files)
        .await
        .expect("create batch");

    let status = wait_until_finished(&service, job_id).await;
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.assignment_name, "Sorted Echo");
    assert_eq!(status.total_files, 5);
    assert_eq!(status.processed_files, 5);
    assert_eq!(status.successful_grades, 4);
    assert_eq!(status.failed_grades, 1);
    assert_eq!(status.progress_percentage, 100.0);
    assert!(status.started_at.is_some());
    assert!(status.completed_at.is_some());
    let average = status.average_score.expect("average");
    let (low, high) = (
        status.lowest_score.expect("low"),
        status.highest_score.expect("high"),
    );
    assert!(low <= average && average <= high);

    let results = service.get_batch_results(job_id).await.expect("results");
    let names: Vec<&str> = results
        .results
        .iter()
        .map(|r| r.student_name.as_str())
        .collect();
    assert_eq!(names, ["Alice Adams", "Bob Brown", "Carol Chen", "Dave Diaz", "Eve Evans"]);

    for row in &results.results {
        if row.student_name == "Carol Chen" {
            assert_eq!(row.status, SubmissionStatus::Error);
            assert!(row.grading_details.is_none());
            let details = row.error_details.as_deref().expect("details");
            assert!(details.starts_with("Grading failed:"), "{details}");
        } else {
            assert_eq!(row.status, SubmissionStatus::Graded);
            let details = row.grading_details.as_ref().expect("details");
            assert_eq!(details.criteria.len(), 4);
            assert!(details.overall_feedback.chars().count() <= 200);
            assert_eq!(details.graded_by, "fallback");
        }
    }
    assert!(results.table().contains("Carol Chen"));
}

#[tokio::test]
async fn unknown_assignment_is_rejected() {
    let (store, grader, _) = fixture().await;
    let (queue, _worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store, queue);

    let err = service
        .grade_batch(Uuid::new_v4(), vec![SubmissionFile::new("a.cpp", reference())])
        .await
        .expect_err("missing assignment");
    assert!(err.to_string().contains("assignment"));
}

#[tokio::test]
async fn pending_jobs_are_recovered_on_start() {
    let (store, grader, assignment) = fixture().await;
    let job = BatchJob::new(assignment.id, 0);
    let job_id = job.id;
    store.put_batch(job).await.expect("job");

    let (queue, _worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store.clone(), queue);

    let status = wait_until_finished(&service, job_id).await;
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.progress_percentage, 0.0);
    assert!(status.average_score.is_none());
    assert!(store.unfinished_batches().await.expect("list").is_empty());
}

#[tokio::test]
async fn job_without_record_is_reported_missing() {
    let (store, grader, _) = fixture().await;
    let (queue, _worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store, queue);

    let err = service
        .get_batch_status(Uuid::new_v4())
        .await
        .expect_err("unknown job");
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn panicking_submission_does_not_stop_the_batch() {
    let (store, _, assignment) = fixture().await;
    let client = ScriptedClient::from_fn(|prompt| {
        if prompt.contains("// explode-while-grading") {
            panic!("model client blew up");
        }
        Err(cppgrade::llm::LlmError::NotConfigured)
    });
    let grader = Grader::new(store.clone(), Arc::new(client), Arc::new(Config::default()));
    let (queue, worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store.clone(), queue);

    let mut exploding = reference();
    exploding.extend_from_slice(b"// explode-while-grading\n");
    let files = vec![
        SubmissionFile::new("aliceAdams.cpp", reference()),
        SubmissionFile::new("bobBrown.cpp", exploding),
        SubmissionFile::new("carolChen.cpp", reference()),
    ];
    let job_id = service.grade_batch(assignment.id, files).await.expect("create");

    let status = wait_until_finished(&service, job_id).await;
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.processed_files, 3);
    assert_eq!(status.successful_grades, 2);
    assert_eq!(status.failed_grades, 1);
    assert!(!worker.is_finished());

    let results = service.get_batch_results(job_id).await.expect("results");
    let bob = results
        .results
        .iter()
        .find(|r| r.student_name == "Bob Brown")
        .expect("bob");
    assert_eq!(bob.status, SubmissionStatus::Error);
    let details = bob.error_details.as_deref().expect("details");
    assert!(details.starts_with("Grading failed: panicked"), "{details}");
}

/// Store whose batch listing always fails.
struct BrokenListing(MemoryStore);

#[async_trait]
impl GradingStore for BrokenListing {
    async fn put_assignment(&self, assignment: Assignment) -> anyhow::Result<()> {
        self.0.put_assignment(assignment).await
    }

    async fn assignment(&self, id: Uuid) -> anyhow::Result<Option<Assignment>> {
        self.0.assignment(id).await
    }

    async fn put_submission(&self, submission: Submission) -> anyhow::Result<()> {
        self.0.put_submission(submission).await
    }

    async fn submission(&self, id: Uuid) -> anyhow::Result<Option<Submission>> {
        self.0.submission(id).await
    }

    async fn update_submission(
        &self,
        id: Uuid,
        update: SubmissionUpdate,
    ) -> anyhow::Result<Submission> {
        self.0.update_submission(id, update).await
    }

    async fn batch_submissions(&self, _batch_id: Uuid) -> anyhow::Result<Vec<Submission>> {
        Err(anyhow::anyhow!("disk unavailable"))
    }

    async fn save_result(&self, result: &GradingResult) -> anyhow::Result<()> {
        self.0.save_result(result).await
    }

    async fn result(&self, submission_id: Uuid) -> anyhow::Result<Option<GradingResult>> {
        self.0.result(submission_id).await
    }

    async fn tool_audit(&self, submission_id: Uuid) -> anyhow::Result<Option<serde_json::Value>> {
        self.0.tool_audit(submission_id).await
    }

    async fn put_batch(&self, job: BatchJob) -> anyhow::Result<()> {
        self.0.put_batch(job).await
    }

    async fn batch(&self, id: Uuid) -> anyhow::Result<Option<BatchJob>> {
        self.0.batch(id).await
    }

    async fn update_batch_progress(&self, id: Uuid, update: BatchUpdate) -> anyhow::Result<BatchJob> {
        self.0.update_batch_progress(id, update).await
    }

    async fn unfinished_batches(&self) -> anyhow::Result<Vec<Uuid>> {
        self.0.unfinished_batches().await
    }
}

#[tokio::test]
async fn store_failure_marks_the_job_failed() {
    let store = Arc::new(BrokenListing(MemoryStore::new()));
    let assignment = Assignment::new("Sorted Echo", "", reference());
    store
        .put_assignment(assignment.clone())
        .await
        .expect("assignment");
    let grader = Grader::new(
        store.clone(),
        Arc::new(UnconfiguredClient),
        Arc::new(Config::default()),
    );
    let (queue, _worker) = BatchWorker::spawn(grader).await.expect("worker");
    let service = BatchService::new(store, queue);

    let job_id = service
        .grade_batch(assignment.id, vec![SubmissionFile::new("a.cpp", reference())])
        .await
        .expect("create");

    let status = wait_until_finished(&service, job_id).await;
    assert_eq!(status.status, JobState::Failed);
    assert_eq!(status.processed_files, 0);
    assert!(status.completed_at.is_some());
    let message = status.error_message.expect("message");
    assert!(message.contains("disk unavailable"), "{message}");
}
