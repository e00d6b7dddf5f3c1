//! Captured command execution with a wall-clock timeout.
//!
//! The child's stdout and stderr are drained concurrently into shared
//! buffers, so whatever a process printed before it was killed is still
//! returned. On Unix the child leads its own process group and the whole
//! group is killed on timeout, on Ctrl-C, or when the run is abandoned;
//! otherwise a grandchild holding the pipes open would keep the readers
//! waiting, or outlive the session.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::interrupt;
use crate::platform::ShellPlatform;

/// How long the output readers may keep going once the child is gone.
/// Readers still busy after that (a background job holding the pipe) are
/// aborted, so output written later is lost.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Exit code reported when the process was killed or its status is unknown.
pub const KILLED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// What to show when the command failed: stderr, or stdout if stderr is empty.
    pub fn failure_detail(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("working directory is no longer available: {}", .0.display())]
    DirectoryUnavailable(PathBuf),
    #[error("failed to launch {shell}: {source}")]
    Launch {
        shell: String,
        #[source]
        source: io::Error,
    },
    /// Ctrl-C arrived mid-run. The process group was killed; carries what
    /// it printed before that.
    #[error("command interrupted")]
    Interrupted(CommandOutput),
}

enum Ending {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Interrupted,
}

/// Kills the child's process group when dropped, unless disarmed after a
/// normal exit. Covers runs whose future is dropped before completion.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_group(pid);
        }
    }
}

/// Runs one command line to completion or timeout.
///
/// A non-zero exit is a normal result; only a missing working directory or
/// an interpreter that cannot be started is an error.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        command: &'a str,
        cwd: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, RunError>>;
}

pub struct ShellRunner {
    platform: Arc<dyn ShellPlatform>,
}

impl ShellRunner {
    pub fn new(platform: Arc<dyn ShellPlatform>) -> Self {
        Self { platform }
    }

    async fn execute(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        if !cwd.is_dir() {
            return Err(RunError::DirectoryUnavailable(cwd.to_path_buf()));
        }

        let mut process = self.platform.command(command);
        process
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let mut child = process.spawn().map_err(|source| RunError::Launch {
            shell: self.platform.shell_name().to_string(),
            source,
        })?;
        tracing::debug!(command, cwd = %cwd.display(), pid = ?child.id(), "spawned");
        let mut guard = GroupGuard { pid: child.id() };

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            child.stdout.take().map(|pipe| drain(pipe, Arc::clone(&stdout))),
            child.stderr.take().map(|pipe| drain(pipe, Arc::clone(&stderr))),
        ];

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            () = tokio::time::sleep(timeout) => Ending::TimedOut,
            () = interrupt::ctrl_c() => Ending::Interrupted,
        };

        let exit_code = match &ending {
            Ending::Exited(Ok(status)) => {
                guard.disarm();
                exit_code_of(*status)
            }
            Ending::Exited(Err(e)) => {
                tracing::warn!(error = %e, "failed to wait for child");
                KILLED_EXIT_CODE
            }
            Ending::TimedOut => {
                tracing::debug!(command, ?timeout, "timed out, killing");
                kill(&mut child).await;
                guard.disarm();
                KILLED_EXIT_CODE
            }
            Ending::Interrupted => {
                tracing::debug!(command, "interrupted, killing");
                kill(&mut child).await;
                guard.disarm();
                KILLED_EXIT_CODE
            }
        };

        let deadline = Instant::now() + READER_GRACE;
        for mut reader in readers.into_iter().flatten() {
            if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
                tracing::debug!("output reader still busy after exit, keeping partial output");
                reader.abort();
            }
        }

        let mut output = CommandOutput {
            stdout: decode(&stdout),
            stderr: decode(&stderr),
            exit_code,
            timed_out: matches!(ending, Ending::TimedOut),
        };
        match ending {
            Ending::TimedOut => {
                output.stderr.push_str(&format!(
                    "\nError: Command timed out after {} seconds.",
                    timeout.as_secs()
                ));
                Ok(output)
            }
            Ending::Interrupted => {
                output.stderr.push_str("\nInterrupted.");
                Err(RunError::Interrupted(output))
            }
            Ending::Exited(_) => Ok(output),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        cwd: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, RunError>> {
        Box::pin(self.execute(command, cwd, timeout))
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn drain<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => lock(&sink).extend_from_slice(&buf[..n]),
            }
        }
    })
}

fn decode(buffer: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&lock(buffer)).into_owned()
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(KILLED_EXIT_CODE)
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: killpg only sends a signal; the group was created at spawn.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

async fn kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill failed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::Posix;
    use std::time::Instant;

    fn runner() -> ShellRunner {
        ShellRunner::new(Arc::new(Posix::default()))
    }

    const LONG: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner()
            .run("echo hello; echo oops >&2", dir.path(), LONG)
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code, 0);
        assert!(out.success());
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner().run("exit 3", dir.path(), LONG).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn runs_in_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = runner().run("ls", dir.path(), LONG).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn shell_metacharacters_are_interpreted() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner()
            .run("printf 'a\\nb\\nc\\n' | wc -l", dir.path(), LONG)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let out = runner()
            .run("echo started; sleep 30", dir.path(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.timed_out);
        assert_eq!(out.exit_code, KILLED_EXIT_CODE);
        assert_eq!(out.stdout, "started\n");
        assert!(out.stderr.contains("Error: Command timed out after 1 seconds."));
    }

    #[tokio::test]
    async fn timeout_kills_grandchildren_holding_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let out = runner()
            .run("sleep 30 & sleep 30", dir.path(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn background_job_does_not_hold_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let out = runner()
            .run("(sleep 3; echo late) & echo now", dir.path(), LONG)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(out.stdout, "now\n");
        assert!(out.success());
    }

    fn is_alive(pid: i32) -> bool {
        // SAFETY: signal 0 only checks that the process exists.
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        // An unreaped zombie still answers signal 0.
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    async fn gone_within(pid: i32, limit: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < limit {
            if !is_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn abandoned_run_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("bg.pid");
        let runner = runner();

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            runner.run("sleep 300 & echo $! > bg.pid; wait", dir.path(), LONG),
        )
        .await;
        assert!(abandoned.is_err());

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(gone_within(pid, Duration::from_secs(3)).await);
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let err = runner().run("echo hi", &gone, LONG).await.unwrap_err();
        assert!(matches!(err, RunError::DirectoryUnavailable(ref p) if *p == gone));
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(Arc::new(Posix::new("/nonexistent/shell")));
        let err = runner.run("echo hi", dir.path(), LONG).await.unwrap_err();
        match err {
            RunError::Launch { shell, .. } => assert_eq!(shell, "/nonexistent/shell"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner()
            .run("printf 'ok\\377'", dir.path(), LONG)
            .await
            .unwrap();
        assert!(out.stdout.starts_with("ok"));
    }

    #[test]
    fn failure_detail_prefers_stderr() {
        let mut out = CommandOutput {
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
            exit_code: 1,
            timed_out: false,
        };
        assert_eq!(out.failure_detail(), "boom");
        out.stderr = "  \n".to_string();
        assert_eq!(out.failure_detail(), "partial");
    }
}
