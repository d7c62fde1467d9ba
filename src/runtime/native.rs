//! Native process runner
//!
//! Runs commands directly on the host through the platform shell, racing
//! completion against a timeout and an interrupt future.

use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{ProcessOutput, ProcessRequest};

/// How long to wait for pipe readers after the child has exited or been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Spawns shell commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `request` to completion, timeout or interrupt.
    ///
    /// Never fails: spawn errors, timeouts and interrupts are all reported in
    /// the returned [`ProcessOutput`].
    ///
    /// # Example
    /// ```no_run
    /// use codecli::runtime::{ProcessRequest, ProcessRunner};
    ///
    /// # tokio_test::block_on(async {
    /// let out = ProcessRunner::new()
    ///     .run(&ProcessRequest::new("echo hi"), std::future::pending())
    ///     .await;
    /// assert_eq!(out.stdout, "hi");
    /// # });
    /// ```
    pub async fn run<I>(&self, request: &ProcessRequest, interrupt: I) -> ProcessOutput
    where
        I: Future<Output = ()> + Send,
    {
        let mut cmd = shell_command(&request.command);
        if let Some(ref cwd) = request.cwd {
            cmd.current_dir(cwd);
        }
        cmd.env("FORCE_COLOR", "0");
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %request.command, error = %e, "Failed to spawn shell");
                return ProcessOutput::spawn_failed(e);
            }
        };

        let stdout_buf = SharedBuf::default();
        let stderr_buf = SharedBuf::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, stdout_buf.clone(), request.echo));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, stderr_buf.clone(), request.echo));
        }

        enum Ending {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Interrupted,
        }

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(request.timeout) => Ending::TimedOut,
            _ = interrupt => Ending::Interrupted,
        };

        if !matches!(ending, Ending::Exited(_)) {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Kill after timeout/interrupt failed");
            }
            let _ = tokio::time::timeout(DRAIN_GRACE, child.wait()).await;
        }

        for reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
                debug!("Output reader still open after grace period");
            }
        }

        let stdout = take_trimmed(&stdout_buf);
        let stderr = take_trimmed(&stderr_buf);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match ending {
            Ending::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                debug!(command = %request.command, exit_code = code, elapsed_ms, "Command finished");
                ProcessOutput::completed(code, stdout, stderr)
            }
            Ending::Exited(Err(e)) => {
                warn!(command = %request.command, error = %e, "Waiting on command failed");
                let stderr = if stderr.is_empty() {
                    e.to_string()
                } else {
                    format!("{}\n{}", stderr, e)
                };
                ProcessOutput::completed(-1, stdout, stderr)
            }
            Ending::TimedOut => {
                warn!(
                    command = %request.command,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Command timed out"
                );
                ProcessOutput::timed_out(stdout, stderr)
            }
            Ending::Interrupted => {
                debug!(command = %request.command, elapsed_ms, "Command interrupted");
                ProcessOutput::interrupted(stdout, stderr)
            }
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
pub async fn ctrl_c_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/c").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn spawn_reader<R>(mut pipe: R, buf: SharedBuf, echo: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut guard) = buf.lock() {
                        guard.extend_from_slice(&chunk[..n]);
                    }
                    if echo {
                        // stdout stays reserved for the reply
                        let mut terminal = tokio::io::stderr();
                        let _ = terminal.write_all(&chunk[..n]).await;
                        let _ = terminal.flush().await;
                    }
                }
            }
        }
    })
}

fn take_trimmed(buf: &SharedBuf) -> String {
    let bytes = match buf.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    String::from_utf8_lossy(&bytes).trim().to_string()
}
