#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # cppgrade
//!
//! Command line front end: grade one submission, grade a batch, or run the
//! style checker and rubric extractor on their own.
//!
//! The model endpoint is configured through `OPENAI_ENDPOINT`,
//! `OPENAI_API_KEY` and `OPENAI_MODEL` (a `.env` file works too). Without
//! them every grade comes from the tool-only fallback grader.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use bpaf::*;
use cppgrade::{
    batch::{BatchService, BatchWorker, SubmissionFile, student_name_from_file},
    config,
    cpp::{read_source, rubric, style},
    grade::Grader,
    llm::client_from_config,
    store::{Assignment, GradingStore, MemoryStore, Submission},
};
use dotenvy::dotenv;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// How often a running batch is polled for progress.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Reference solution and assignment details shared by `grade` and `batch`.
#[derive(Debug, Clone)]
struct AssignmentArgs {
    /// Reference solution path
    reference:   PathBuf,
    /// Assignment description handed to the test generator
    description: String,
    /// Assignment name; defaults to the reference file stem
    name:        Option<String>,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade one submission
    Grade {
        /// Reference and assignment details
        assignment: AssignmentArgs,
        /// Print the full result as JSON
        json:       bool,
        /// Submission path
        submission: PathBuf,
    },
    /// Grade many submissions as one batch job
    Batch {
        /// Reference and assignment details
        assignment: AssignmentArgs,
        /// Submission paths
        files:      Vec<PathBuf>,
    },
    /// Run only the style checker
    Style(PathBuf),
    /// Run only the rubric extractor on a reference solution
    Rubric(PathBuf),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the reference solution and assignment details
    fn assignment() -> impl Parser<AssignmentArgs> {
        let reference = long("reference")
            .short('r')
            .help("Reference solution, optionally carrying a rubric comment block")
            .argument::<PathBuf>("FILE");
        let description = long("description")
            .short('d')
            .help("Assignment description used when generating test inputs")
            .argument::<String>("TEXT")
            .fallback(String::new());
        let name = long("name")
            .short('n')
            .help("Assignment name")
            .argument::<String>("NAME")
            .optional();
        construct!(AssignmentArgs {
            reference,
            description,
            name
        })
    }

    /// parses a single C++ file name
    fn f(metavar: &'static str) -> impl Parser<PathBuf> {
        positional::<PathBuf>(metavar).help("C++ source file")
    }

    let grade = {
        let assignment = assignment();
        let json = long("json").help("Print the full result as JSON").switch();
        let submission = f("SUBMISSION");
        construct!(Cmd::Grade {
            assignment,
            json,
            submission
        })
    }
    .to_options()
    .command("grade")
    .help("Grade one submission against a reference solution");

    let batch = {
        let assignment = assignment();
        let files = positional::<PathBuf>("FILES")
            .help("Submissions; student names are derived from the file names")
            .some("at least one submission is required");
        construct!(Cmd::Batch { assignment, files })
    }
    .to_options()
    .command("batch")
    .help("Grade several submissions as one batch job");

    let style = {
        let file = f("FILE");
        construct!(Cmd::Style(file))
    }
    .to_options()
    .command("style")
    .help("Run the style checker on a file");

    let rubric = {
        let file = f("FILE");
        construct!(Cmd::Rubric(file))
    }
    .to_options()
    .command("rubric")
    .help("Print the rubric found in a reference solution");

    let cmd = construct!([grade, batch, style, rubric]);

    cmd.to_options()
        .descr("LLM-assisted autograder for short C++ programs")
        .run()
}

/// Reads a file into memory.
async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// File name component of `path`, or the whole path when there is none.
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Stores the assignment described by `args` and returns it.
async fn load_assignment(store: &MemoryStore, args: &AssignmentArgs) -> Result<Assignment> {
    let reference = read_bytes(&args.reference).await?;
    let name = args.name.clone().unwrap_or_else(|| {
        args.reference
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Assignment".to_string())
    });
    let assignment = Assignment::new(name, args.description.clone(), reference);
    store.put_assignment(assignment.clone()).await?;
    Ok(assignment)
}

/// Builds the store and grader shared by `grade` and `batch`.
fn grader() -> Result<(Arc<MemoryStore>, Grader)> {
    let config = config::get();
    let client = client_from_config(&config)?;
    let store = Arc::new(MemoryStore::new());
    let grader = Grader::new(store.clone(), client, config);
    Ok((store, grader))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let level = std::env::var("CPPGRADE_LOG")
        .ok()
        .and_then(|value| value.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(level);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();

    match cmd {
        Cmd::Grade {
            assignment,
            json,
            submission,
        } => {
            let (store, grader) = grader()?;
            let assignment = load_assignment(&store, &assignment).await?;
            let name = file_name(&submission);
            let record = Submission::new(
                assignment.id,
                student_name_from_file(&name),
                name,
                read_bytes(&submission).await?,
            );
            let id = record.id;
            store.put_submission(record).await?;

            let result = grader.grade_one(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.table());
                println!("{}", result.overall_feedback);
                if !result.suggestions.is_empty() {
                    println!("\nSuggestions: {}", result.suggestions);
                }
            }
        }
        Cmd::Batch { assignment, files } => {
            let (store, grader) = grader()?;
            let assignment = load_assignment(&store, &assignment).await?;

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                // An unreadable file still counts; it fails in the batch.
                let bytes = match read_bytes(path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("{e:#}");
                        Vec::new()
                    }
                };
                uploads.push(SubmissionFile::new(file_name(path), bytes));
            }

            let (queue, worker) = BatchWorker::spawn(grader).await?;
            let service = BatchService::new(store, queue);
            let job_id = service.grade_batch(assignment.id, uploads).await?;

            let mut reported = usize::MAX;
            loop {
                let status = service.get_batch_status(job_id).await?;
                if status.processed_files != reported {
                    reported = status.processed_files;
                    tracing::info!(
                        "{}/{} processed ({:.0}%)",
                        status.processed_files,
                        status.total_files,
                        status.progress_percentage
                    );
                }
                if status.is_finished() {
                    break;
                }
                if worker.is_finished() {
                    anyhow::bail!(
                        "batch worker stopped with job {job_id} still {:?}",
                        status.status
                    );
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            let results = service.get_batch_results(job_id).await?;
            if let Some(message) = &results.batch.error_message {
                eprintln!("Batch failed: {message}");
            }
            println!("{}", results.table());
        }
        Cmd::Style(path) => {
            let source = read_source(&read_bytes(&path).await?, "source file")?;
            let report = style::analyze(&source);
            println!("Style score: {}/25", report.score);
            for issue in &report.issues {
                println!("  issue: {issue}");
            }
            for suggestion in &report.suggestions {
                println!("  suggestion: {suggestion}");
            }
        }
        Cmd::Rubric(path) => {
            let source = read_source(&read_bytes(&path).await?, "reference solution")?;
            let report = rubric::extract(&source).report();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    };

    Ok(())
}
