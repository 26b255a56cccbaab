use std::{path::PathBuf, sync::Arc};

use cppgrade::{
    config::Config,
    grade::{GradedBy, Grader},
    llm::{CompletionClient, LlmError, ScriptedClient, UnconfiguredClient},
    store::{Assignment, GradingStore, MemoryStore, Submission, SubmissionStatus},
};

const FULL_MARKS: &str = r#"Here is my evaluation:
```json
{
  "total_score": 98,
  "max_score": 100,
  "percentage": 98,
  "correctness": {"score": 40, "max_score": 40, "feedback": "All outputs match."},
  "code_style": {"score": 24, "max_score": 25, "feedback": "Clean and consistent."},
  "efficiency": {"score": 19, "max_score": 20, "feedback": "Uses std::sort."},
  "documentation": {"score": 15, "max_score": 15, "feedback": "Header comment present."},
  "overall_feedback": "Excellent work.",
  "suggestions": ["Consider validating input."]
}
```"#;

const CASES: &str = r#"[
  {"name": "Mixed", "input": "4 -2 9 0 -999", "description": "negative and zero"},
  {"name": "Sorted", "input": "1 2 3 -999", "description": "already sorted"},
  {"name": "Duplicates", "input": "7 7 3 7 -999", "description": "repeated values"}
]"#;

const CUSTOM_REPLY: &str = r#"{
  "total_score": 36,
  "max_score": 40,
  "code_compilation": {"score": 20, "max_score": 20, "feedback": "Compiles cleanly."},
  "algorithm_implementation": {"score": 16, "max_score": 20, "feedback": "Sort is correct."},
  "documentation": {"score": 0, "max_score": 10, "feedback": "No comments."},
  "overall_feedback": "Solid solution."
}"#;

fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("cpp")
        .join("sorted-echo")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

fn has_compiler() -> bool {
    if which::which("g++").is_ok() {
        true
    } else {
        eprintln!("g++ not found on PATH; skipping");
        false
    }
}

fn is_testgen(prompt: &str) -> bool {
    prompt.contains("creating comprehensive test cases")
}

async fn setup(
    client: Arc<dyn CompletionClient>,
    reference: &str,
    submission: &str,
) -> (Arc<MemoryStore>, Grader, uuid::Uuid) {
    let store = Arc::new(MemoryStore::new());
    let assignment = Assignment::new(
        "Sorted Echo",
        "Read integers until -999 and print them sorted ascending.",
        fixture(reference),
    );
    let submission = Submission::new(assignment.id, "Test Student", submission, fixture(submission));
    let id = submission.id;
    store.put_assignment(assignment).await.expect("assignment");
    store.put_submission(submission).await.expect("submission");

    let grader = Grader::new(store.clone(), client, Arc::new(Config::default()));
    (store, grader, id)
}

#[tokio::test]
async fn identical_submission_scores_near_full_marks() {
    if !has_compiler() {
        return;
    }
    let client = ScriptedClient::from_fn(|prompt| {
        Ok(if is_testgen(prompt) { CASES } else { FULL_MARKS }.to_string())
    });
    let (store, grader, id) =
        setup(Arc::new(client.clone()), "reference.cpp", "reference.cpp").await;

    let result = grader.grade_one(id).await.expect("grade");

    assert!(result.tool_outputs.compilation.success);
    assert_eq!(result.tool_outputs.tests.total, 3);
    assert_eq!(result.tool_outputs.tests.passed, 3);
    assert_eq!(result.tool_outputs.tests.overall_correctness, 40.0);
    assert!(result.percentage >= 95.0, "got {}", result.percentage);
    assert_eq!(result.graded_by, GradedBy::Model {
        model: "scripted".into(),
    });
    assert_eq!(result.criterion("Correctness").map(|c| c.score), Some(40.0));

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Test Results: 3/3 tests passed"));

    let stored = store.submission(id).await.expect("load").expect("present");
    assert_eq!(stored.status, SubmissionStatus::Graded);
    assert_eq!(stored.total_score, Some(98));
    assert!(store.tool_audit(id).await.expect("audit").is_some());
}

#[tokio::test]
async fn syntax_error_is_graded_with_low_correctness() {
    let (store, grader, id) =
        setup(Arc::new(UnconfiguredClient), "reference.cpp", "syntax_error.cpp").await;

    let result = grader.grade_one(id).await.expect("grade");

    assert!(!result.tool_outputs.compilation.success);
    assert_eq!(result.tool_outputs.tests.total, 0);
    assert!(result.tool_outputs.tests.outcomes.is_empty());
    assert_eq!(result.graded_by, GradedBy::Fallback);
    let correctness = result.criterion("Correctness").expect("bucket");
    assert!(correctness.score <= 10.0, "got {}", correctness.score);
    assert!((0.0..=100.0).contains(&result.percentage));

    let stored = store.submission(id).await.expect("load").expect("present");
    assert_eq!(stored.status, SubmissionStatus::Graded);
}

#[tokio::test]
async fn testgen_transport_failure_uses_fixed_cases() {
    if !has_compiler() {
        return;
    }
    let client = ScriptedClient::from_fn(|prompt| {
        if is_testgen(prompt) {
            Err(LlmError::Transport("connection reset".into()))
        } else {
            Ok(FULL_MARKS.to_string())
        }
    });
    let (_, grader, id) = setup(Arc::new(client), "reference.cpp", "unsorted.cpp").await;

    let result = grader.grade_one(id).await.expect("grade");

    let tests = &result.tool_outputs.tests;
    assert_eq!(tests.total, 3);
    let names: Vec<&str> = tests
        .outcomes
        .iter()
        .map(|o| o.test_case.name.as_str())
        .collect();
    assert_eq!(names, ["Basic Input Test", "Empty Input Test", "Single Number Test"]);
    // "5 3 8 1 9" is the only unsorted input.
    assert_eq!(tests.passed, 2);
}

#[tokio::test]
async fn grading_transport_failure_marks_submission_error() {
    let client = ScriptedClient::from_fn(|prompt| {
        if is_testgen(prompt) {
            Ok(CASES.to_string())
        } else {
            Err(LlmError::Transport("timed out".into()))
        }
    });
    let (store, grader, id) = setup(Arc::new(client), "reference.cpp", "reference.cpp").await;

    assert!(grader.grade_one(id).await.is_err());

    let stored = store.submission(id).await.expect("load").expect("present");
    assert_eq!(stored.status, SubmissionStatus::Error);
    let details = stored.error_details.expect("details");
    assert!(details.starts_with("Grading failed:"), "{details}");
    assert!(store.result(id).await.expect("result").is_none());
}

#[tokio::test]
async fn unparseable_reply_falls_back() {
    let client = ScriptedClient::from_fn(|prompt| {
        Ok(if is_testgen(prompt) {
            CASES.to_string()
        } else {
            "I cannot grade this submission.".to_string()
        })
    });
    let (_, grader, id) = setup(Arc::new(client), "reference.cpp", "reference.cpp").await;

    let result = grader.grade_one(id).await.expect("grade");

    assert_eq!(result.graded_by, GradedBy::Fallback);
    assert_eq!(result.criteria.len(), 4);
    assert!((0.0..=100.0).contains(&result.percentage));
}

#[tokio::test]
async fn custom_rubric_reply_keeps_raw_scores_and_projects() {
    let client = ScriptedClient::from_fn(|prompt| {
        Ok(if is_testgen(prompt) { CASES } else { CUSTOM_REPLY }.to_string())
    });
    let (_, grader, id) =
        setup(Arc::new(client.clone()), "rubric_reference.cpp", "reference.cpp").await;

    let result = grader.grade_one(id).await.expect("grade");

    assert!(result.tool_outputs.rubric.has_custom_rubric);
    assert_eq!(result.tool_outputs.rubric.assignment_name, "Sorted Echo");
    assert_eq!(result.tool_outputs.rubric.total_possible_points, 40);
    assert_eq!(result.max_score, 40.0);
    assert_eq!(result.percentage, 90.0);
    let names: Vec<&str> = result.custom_criteria.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Code Compilation", "Algorithm Implementation", "Documentation"]);
    assert_eq!(result.criterion("Correctness").map(|c| c.score), Some(36.0));
    assert_eq!(result.criterion("Code Style").map(|c| c.score), Some(23.0));

    let grading_prompt = client
        .prompts()
        .into_iter()
        .find(|p| !is_testgen(p))
        .expect("grading prompt");
    assert!(grading_prompt.contains("Sorted Echo"));
    assert!(grading_prompt.contains("code_compilation"));
}

#[tokio::test]
async fn missing_submission_is_not_found() {
    let (_, grader, _) =
        setup(Arc::new(UnconfiguredClient), "reference.cpp", "reference.cpp").await;

    let err = grader
        .grade_one(uuid::Uuid::new_v4())
        .await
        .expect_err("unknown id");
    assert!(err.to_string().contains("not found"));
}
