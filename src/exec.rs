// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! External command execution with timeout and cancellation.
//!
//! Every probe that shells out goes through [`Executor::execute`]: stdout is
//! captured, non-zero exits carry the stderr head, and the child is killed
//! when the per-call deadline or the audit's cancel token fires. The executor
//! never writes to disk and never retries.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ExecError;

/// Default per-call timeout, overridable via configuration.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How much of stderr is carried in a [`ExecError::NonZeroExit`].
const STDERR_HEAD_BYTES: usize = 512;

/// Cancellation signal shared by one audit run.
///
/// Cloned into every check and collector; file-scanning loops poll
/// [`CancelToken::is_cancelled`] between iterations and the executor races
/// child waits against [`CancelToken::cancelled`]. The default token never
/// fires.
#[derive(Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

/// The triggering side of a [`CancelToken`], held by the caller of the audit.
#[derive(Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// Create a linked handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: std::sync::Arc::new(tx) },
        CancelToken { rx: Some(rx) },
    )
}

impl CancelHandle {
    /// Signal every holder of the paired token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolve once the paired handle cancels; pend forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            std::future::pending::<()>().await;
            unreachable!();
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling; this run can no longer
                // be cancelled.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Runs external programs with a bounded lifetime.
pub struct Executor {
    timeout: Duration,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(timeout: Duration, cancel: CancelToken) -> Self {
        Self { timeout, cancel }
    }

    /// Run `program` with `args`, returning captured stdout.
    ///
    /// Error mapping per the executor contract: ENOENT at spawn →
    /// [`ExecError::NotFound`], EACCES → [`ExecError::PermissionDenied`],
    /// deadline exceeded → [`ExecError::Timeout`] (child killed), non-zero
    /// exit → [`ExecError::NonZeroExit`] with the first 512 bytes of stderr.
    pub async fn execute(&self, program: &str, args: &[&str]) -> Result<String, ExecError> {
        self.execute_with_timeout(program, args, self.timeout).await
    }

    /// [`Executor::execute`] with a caller-supplied deadline.
    pub async fn execute_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled(program.to_string()));
        }

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExecError::NotFound(program.to_string()),
                std::io::ErrorKind::PermissionDenied => {
                    ExecError::PermissionDenied(program.to_string())
                }
                _ => ExecError::Io(program.to_string(), e),
            })?;

        // Dropping the wait future (timeout or cancellation) kills the child
        // via kill_on_drop.
        let wait = child.wait_with_output();
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(program, "probe cancelled");
                Err(ExecError::Cancelled(program.to_string()))
            }
            result = tokio::time::timeout(timeout, wait) => match result {
                Err(_) => Err(ExecError::Timeout {
                    program: program.to_string(),
                    timeout_secs: timeout.as_secs(),
                }),
                Ok(Err(e)) => Err(ExecError::Io(program.to_string(), e)),
                Ok(Ok(output)) => {
                    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    if output.status.success() {
                        Ok(stdout)
                    } else {
                        let head = &output.stderr[..output.stderr.len().min(STDERR_HEAD_BYTES)];
                        Err(ExecError::NonZeroExit {
                            program: program.to_string(),
                            code: output.status.code().unwrap_or(-1),
                            stderr: String::from_utf8_lossy(head).trim().to_string(),
                            stdout,
                        })
                    }
                }
            }
        }
    }
}

/// True when `name` resolves to an executable file on PATH.
pub fn command_available(name: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(name);
        std::fs::metadata(&candidate)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    })
}
