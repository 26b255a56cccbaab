#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::{OsStr, OsString},
    io,
    path::Path,
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, Command},
    time::timeout,
};

/// Drop guard that terminates a spawned child process if the caller stops
/// waiting on it (for instance when a deadline elapses).
struct ChildDropGuard(Option<Child>);

impl ChildDropGuard {
    /// Wraps the provided child process with the drop guard.
    fn new(child: Child) -> Self {
        Self(Some(child))
    }

    /// Returns a mutable reference to the underlying child process.
    fn child_mut(&mut self) -> Result<&mut Child, ProcessError> {
        self.0
            .as_mut()
            .ok_or_else(|| ProcessError::Io(io::Error::other("child process already taken")))
    }

    /// Prevents the guard from killing the process on drop.
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ChildDropGuard {
    fn drop(&mut self) {
        if let Some(child) = self.0.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Ways a subprocess invocation can fail before producing an exit status.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The program could not be found or was not executable.
    #[error("could not start `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source:  io::Error,
    },
    /// The process did not finish within its deadline and was killed.
    #[error("process exceeded its {0:?} deadline")]
    Timeout(Duration),
    /// Reading pipes or waiting on the process failed.
    #[error("i/o error while supervising process: {0}")]
    Io(#[from] io::Error),
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: std::process::ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

impl Collected {
    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Describes how stdin should be wired for the spawned process.
#[derive(Debug)]
pub enum StdinSource {
    /// Attach nothing to stdin.
    Null,
    /// Write the provided bytes, then close stdin.
    Bytes(Vec<u8>),
}

/// Spawns a command, optionally feeds stdin, and collects stdout/stderr.
///
/// When `deadline` elapses the child is killed and
/// [`ProcessError::Timeout`] is returned.
pub async fn run_collect(
    program: impl AsRef<OsStr>,
    args: &[OsString],
    stdin: StdinSource,
    cwd: Option<&Path>,
    deadline: Option<Duration>,
) -> Result<Collected, ProcessError> {
    let program = program.as_ref();
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    match &stdin {
        StdinSource::Null => {
            cmd.stdin(Stdio::null());
        }
        StdinSource::Bytes(_) => {
            cmd.stdin(Stdio::piped());
        }
    }

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string_lossy().into_owned(),
        source,
    })?;
    let mut guard = ChildDropGuard::new(child);

    if let StdinSource::Bytes(bytes) = stdin
        && let Some(mut handle) = guard.child_mut()?.stdin.take()
    {
        tokio::spawn(async move {
            // A program that exits without reading stdin closes the pipe early.
            if !bytes.is_empty() {
                let _ = handle.write_all(&bytes).await;
            }
            let _ = handle.shutdown().await;
        });
    }

    let stdout = guard
        .child_mut()?
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("missing stdout pipe"))?;
    let stderr = guard
        .child_mut()?
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("missing stderr pipe"))?;

    let out_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });

    let err_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, io::Error>(buf)
    });

    let wait_future = async move {
        let mut guard = guard;
        let status = guard.child_mut()?.wait().await?;
        let stdout = out_task.await.map_err(io::Error::other)??;
        let stderr = err_task.await.map_err(io::Error::other)??;
        guard.disarm();
        Ok::<Collected, ProcessError>(Collected {
            status,
            stdout,
            stderr,
        })
    };

    match deadline {
        Some(limit) => timeout(limit, wait_future)
            .await
            .map_err(|_| ProcessError::Timeout(limit))?,
        None => wait_future.await,
    }
}
