#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::sanitize::sanitize;
use crate::{
    config::Config,
    process::{ProcessError, StdinSource, run_collect},
    util::cxx_path,
};

/// Why a compilation did not produce an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileFailure {
    /// There was no source text to compile.
    EmptySource,
    /// The compiler driver could not be found.
    MissingToolchain,
    /// The compiler exceeded its wall-clock budget.
    Timeout,
    /// The compiler exited non-zero, or exited zero without an artifact.
    Diagnostics,
    /// Writing the source or spawning the compiler failed at the OS level.
    System,
}

/// Outcome of a single compile call. Never mutated once produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationResult {
    /// True only if the compiler exited zero and the executable exists.
    pub success:    bool,
    /// Path to the produced executable, inside the scratch directory.
    pub executable: Option<PathBuf>,
    /// Diagnostic text for failed compilations.
    pub errors:     String,
    /// Compiler stderr for successful compilations.
    pub warnings:   String,
    /// Classification of the failure, if any.
    pub failure:    Option<CompileFailure>,
}

impl CompilationResult {
    /// Builds a failed result with the given classification and message.
    pub fn failed(failure: CompileFailure, errors: impl Into<String>) -> Self {
        Self {
            success: false,
            executable: None,
            errors: errors.into(),
            warnings: String::new(),
            failure: Some(failure),
        }
    }

    /// Returns the executable path when compilation succeeded.
    pub fn executable(&self) -> Option<&Path> {
        if self.success {
            self.executable.as_deref()
        } else {
            None
        }
    }
}

/// Invokes the C++ toolchain inside a private scratch directory.
#[derive(Debug, Clone)]
pub struct Compiler {
    /// Compiler driver name or path.
    program: String,
    /// Wall-clock budget per compilation.
    timeout: Duration,
    /// Directory that receives sources and executables.
    workdir: PathBuf,
}

impl Compiler {
    /// Creates a compiler writing into `workdir`.
    pub fn new(config: &Config, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.compiler().to_string(),
            timeout: config.compile_timeout(),
            workdir: workdir.into(),
        }
    }

    /// Compiles `source` as `<stem>.cpp` into an executable named `<stem>`.
    ///
    /// Every failure mode is reported in the returned value; this never
    /// errors.
    pub async fn compile(&self, source: &str, stem: &str) -> CompilationResult {
        if source.trim().is_empty() {
            return CompilationResult::failed(
                CompileFailure::EmptySource,
                "Empty or invalid code provided",
            );
        }

        let compiler = match cxx_path(&self.program) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(compiler = %self.program, "compiler not found");
                return CompilationResult::failed(
                    CompileFailure::MissingToolchain,
                    format!("C++ compiler ({}) not available on this system: {e}", self.program),
                );
            }
        };

        let source_path = self.workdir.join(format!("{stem}.cpp"));
        let executable = self.workdir.join(stem);

        if let Err(e) = tokio::fs::create_dir_all(&self.workdir).await {
            return CompilationResult::failed(
                CompileFailure::System,
                format!("System error during compilation: {e}"),
            );
        }
        if let Err(e) = tokio::fs::write(&source_path, sanitize(source)).await {
            return CompilationResult::failed(
                CompileFailure::System,
                format!("System error during compilation: could not write source: {e}"),
            );
        }

        let args: Vec<OsString> = vec![
            "-std=c++17".into(),
            "-Wall".into(),
            "-Wextra".into(),
            "-pedantic".into(),
            "-o".into(),
            executable.clone().into_os_string(),
            source_path.into_os_string(),
        ];

        let collected = match run_collect(
            &compiler,
            &args,
            StdinSource::Null,
            Some(&self.workdir),
            Some(self.timeout),
        )
        .await
        {
            Ok(collected) => collected,
            Err(ProcessError::Timeout(limit)) => {
                return CompilationResult::failed(
                    CompileFailure::Timeout,
                    format!(
                        "Compilation timed out (>{} seconds) - code may be too complex",
                        limit.as_secs()
                    ),
                );
            }
            Err(e @ ProcessError::Spawn { .. }) => {
                return CompilationResult::failed(CompileFailure::MissingToolchain, e.to_string());
            }
            Err(e) => {
                return CompilationResult::failed(
                    CompileFailure::System,
                    format!("System error during compilation: {e}"),
                );
            }
        };

        let stderr = collected.stderr_text();
        let produced = tokio::fs::try_exists(&executable).await.unwrap_or(false);

        if collected.status.success() && produced {
            tracing::debug!(stem, "compilation succeeded");
            CompilationResult {
                success:    true,
                executable: Some(executable),
                errors:     String::new(),
                warnings:   stderr,
                failure:    None,
            }
        } else {
            let errors = if stderr.trim().is_empty() {
                format!(
                    "Compiler exited with {} without producing an executable",
                    collected.status
                )
            } else {
                stderr
            };
            tracing::debug!(stem, "compilation failed");
            CompilationResult::failed(CompileFailure::Diagnostics, errors)
        }
    }
}
