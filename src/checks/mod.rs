// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Security check suite.
//!
//! Each check is a value implementing [`Check`]: one stable category tag and
//! one `run` producing a [`CheckResult`]. Checks are self-contained, share no
//! mutable state, and follow a common shape: probe, downgrade to `skip` when
//! the essential tool is absent, classify findings into details with
//! evidence, aggregate the worst detail status.

pub mod accounts;
pub mod filesystem;
pub mod hardening;
pub mod network;
pub mod process;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::AuditContext;
use crate::error::ExecError;
use crate::report::{CheckResult, Status};

/// A single policy probe.
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable snake_case tag from the closed set rendered by the UI.
    fn category(&self) -> &'static str;

    /// Run the probe. Never errors: faults are folded into the status.
    async fn run(&self, ctx: &AuditContext) -> CheckResult;
}

/// All checks, in report order. The order here is the order of
/// `securityChecks` in the JSON report and of the recommendation list.
pub fn registry() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(hardening::NonRootUser),
        Box::new(network::UfwSecurity),
        Box::new(hardening::SshSecurity),
        Box::new(hardening::AccessControl),
        Box::new(network::PortSecurity),
        Box::new(hardening::UnattendedUpgrades),
        Box::new(hardening::Fail2ban),
        Box::new(process::RootkitDetection),
        Box::new(process::SuspiciousProcesses),
        Box::new(network::ListeningPorts),
        Box::new(filesystem::CronJobs),
        Box::new(filesystem::SuspiciousFiles),
        Box::new(accounts::SystemAccounts),
        Box::new(network::NetworkConnections),
        Box::new(filesystem::FileIntegrity),
        Box::new(accounts::LoginHistory),
        Box::new(filesystem::ImmutableFiles),
        Box::new(process::SuspiciousEnvVars),
    ]
}

/// Fold an executor fault into a check result per the shared policy:
/// missing tool or permission problem → `skip`, timeout → `warn`
/// "probe timed out", cancellation → `skip` "cancelled", anything else →
/// `warn`.
pub(crate) fn downgrade(category: &'static str, err: &ExecError) -> CheckResult {
    match err {
        ExecError::NotFound(program) => {
            debug!(category, program, "tool missing, skipping check");
            CheckResult::new(category, Status::Skip, &format!("{program} not available"))
        }
        ExecError::PermissionDenied(program) => {
            debug!(category, program, "permission denied, skipping check");
            CheckResult::new(category, Status::Skip, &format!("{program}: permission denied"))
        }
        ExecError::Timeout { .. } => CheckResult::new(category, Status::Warn, "probe timed out"),
        ExecError::Cancelled(_) => CheckResult::new(category, Status::Skip, "cancelled"),
        other => {
            warn!(category, error = %other, "probe failed");
            CheckResult::new(category, Status::Warn, &format!("probe failed: {other}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_categories_and_order() {
        let expected = [
            "non_root_user",
            "ufw_security",
            "ssh_security",
            "access_control",
            "port_security",
            "unattended_upgrades",
            "fail2ban",
            "rootkit_detection",
            "suspicious_processes",
            "listening_ports",
            "cron_jobs",
            "suspicious_files",
            "system_accounts",
            "network_connections",
            "file_integrity",
            "login_history",
            "immutable_files",
            "suspicious_env_vars",
        ];
        let categories: Vec<&str> = registry().iter().map(|c| c.category()).collect();
        assert_eq!(categories, expected);
    }

    #[test]
    fn test_downgrade_missing_tool_is_skip() {
        let result = downgrade("ufw_security", &ExecError::NotFound("ufw".into()));
        assert_eq!(result.status, Status::Skip);
        assert!(result.message.contains("ufw"));
    }

    #[test]
    fn test_downgrade_timeout_is_warn() {
        let result = downgrade(
            "rootkit_detection",
            &ExecError::Timeout { program: "rkhunter".into(), timeout_secs: 30 },
        );
        assert_eq!(result.status, Status::Warn);
        assert_eq!(result.message, "probe timed out");
    }

    #[test]
    fn test_downgrade_cancelled_is_skip() {
        let result = downgrade("fail2ban", &ExecError::Cancelled("fail2ban-client".into()));
        assert_eq!(result.status, Status::Skip);
        assert_eq!(result.message, "cancelled");
    }
}
