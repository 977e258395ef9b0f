// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Error taxonomy for the audit engine.
//!
//! [`ExecError`] covers the command executor contract; [`AuditError`] is the
//! broader fault taxonomy used by parsers, collectors, and the evidence
//! builder. Errors within a single check never abort the audit: every check
//! catches its faults and downgrades to a `skip`/`warn` status instead.

use thiserror::Error;

/// Faults from [`crate::exec::Executor::execute`].
#[derive(Debug, Error)]
pub enum ExecError {
    /// The program does not exist on PATH. Callers downgrade to `skip`.
    #[error("{0}: command not found")]
    NotFound(String),

    /// The OS reported EACCES. Callers may try a fallback path.
    #[error("{0}: permission denied")]
    PermissionDenied(String),

    /// The child exceeded the deadline and was killed.
    #[error("{program}: probe timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    /// Non-zero exit status, returned verbatim with the stderr head and the
    /// captured stdout (some probes report findings through their exit code).
    #[error("{program}: exit status {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
        stdout: String,
    },

    /// The audit's cancel token fired while the child was running.
    #[error("{0}: cancelled")]
    Cancelled(String),

    /// Spawn or wait failed for another reason.
    #[error("{0}: {1}")]
    Io(String, std::io::Error),
}

/// Engine-wide fault taxonomy.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("required tool missing: {0}")]
    ToolMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("i/o failure: {0}")]
    IOFailure(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExecError> for AuditError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::NotFound(p) => AuditError::ToolMissing(p),
            ExecError::PermissionDenied(p) => AuditError::PermissionDenied(p),
            ExecError::Timeout { program, .. } => AuditError::Timeout(program),
            ExecError::Cancelled(p) => AuditError::Internal(format!("{p}: cancelled")),
            ExecError::NonZeroExit { program, code, stderr, .. } => {
                AuditError::Internal(format!("{program}: exit status {code}: {stderr}"))
            }
            ExecError::Io(_, e) => AuditError::IOFailure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::NotFound("ufw".into());
        assert_eq!(err.to_string(), "ufw: command not found");

        let err = ExecError::Timeout { program: "rkhunter".into(), timeout_secs: 30 };
        assert!(err.to_string().contains("timed out after 30s"));
    }

    #[test]
    fn test_exec_error_maps_to_taxonomy() {
        let err: AuditError = ExecError::NotFound("lastb".into()).into();
        assert!(matches!(err, AuditError::ToolMissing(_)));

        let err: AuditError = ExecError::PermissionDenied("lastb".into()).into();
        assert!(matches!(err, AuditError::PermissionDenied(_)));
    }
}
