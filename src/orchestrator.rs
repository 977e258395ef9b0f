// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Audit run orchestration.
//!
//! [`run_audit`] stamps the run, collects system info best-effort, fans
//! checks out over a bounded worker pool concurrently with the asset
//! collectors, and seals the result. The final check list preserves registry
//! order regardless of completion order, and recommendations are
//! deterministic for identical check results.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::checks::registry;
use crate::collect;
use crate::context::AuditContext;
use crate::parsers::now_ms;
use crate::report::{AuditResult, CheckResult, Status};
use crate::sysinfo;

/// Run one complete audit. Never fails: every fault is folded into check
/// statuses and the result is always serializable.
pub async fn run_audit(ctx: &AuditContext) -> AuditResult {
    let start_time = now_ms();
    info!("audit run started");

    let system_info = sysinfo::collect(ctx).await;
    let (security_checks, assets) = tokio::join!(run_checks(ctx), collect::collect_assets(ctx));
    let recommendations = build_recommendations(&security_checks);

    let end_time = now_ms().max(start_time);
    info!(elapsed_ms = end_time - start_time, checks = security_checks.len(), "audit run finished");

    AuditResult {
        system_info,
        security_checks,
        assets,
        recommendations,
        start_time,
        end_time,
    }
}

/// Execute every registered check on a semaphore-bounded pool, returning
/// results in registry order. A cancelled or not-yet-started check yields
/// `skip` with message "cancelled"; a panicked check yields `skip` with
/// "internal error".
async fn run_checks(ctx: &AuditContext) -> Vec<CheckResult> {
    let checks = registry();
    let semaphore = Arc::new(Semaphore::new(ctx.config.audit.effective_workers()));

    let mut handles = Vec::with_capacity(checks.len());
    for check in checks {
        let category = check.category();
        let semaphore = Arc::clone(&semaphore);
        let ctx = ctx.clone();
        handles.push((
            category,
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return CheckResult::new(category, Status::Skip, "cancelled"),
                };
                if ctx.cancel.is_cancelled() {
                    return CheckResult::new(category, Status::Skip, "cancelled");
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => CheckResult::new(category, Status::Skip, "cancelled"),
                    result = check.run(&ctx) => result,
                }
            }),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (category, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(category, error = %e, "check task failed");
                results.push(CheckResult::new(category, Status::Skip, "internal error"));
            }
        }
    }
    results
}

fn severity_prefix(status: Status) -> Option<&'static str> {
    match status {
        Status::Fail => Some("【紧急】"),
        Status::Warn => Some("【警告】"),
        Status::Pass | Status::Skip => None,
    }
}

/// Remediation advice per category; a few SSH findings get directive-level
/// advice.
fn remediation(category: &str, detail_name: &str) -> &'static str {
    match category {
        "non_root_user" => "create a non-root administrative user and use it for daily access",
        "ufw_security" => "enable the firewall (ufw enable) and allow only required ports",
        "ssh_security" => match detail_name {
            "permit_root_login" => "set PermitRootLogin no in /etc/ssh/sshd_config and restart sshd",
            "password_authentication" => "set PasswordAuthentication no and deploy SSH keys before restarting sshd",
            "port" => "move sshd to a non-default port to cut automated scanning noise",
            _ => "review /etc/ssh/sshd_config against your SSH hardening policy",
        },
        "access_control" => "restrict SSH logins with AllowUsers or AllowGroups",
        "port_security" => "bind the service to localhost or firewall the port off the public interface",
        "unattended_upgrades" => "enable automatic security updates for this distribution",
        "fail2ban" => "install and enable fail2ban with at least the sshd jail",
        "rootkit_detection" => "treat the host as compromised: isolate it and rebuild from known-good media",
        "suspicious_processes" => "verify the process, terminate it if unexpected, and locate its persistence mechanism",
        "listening_ports" => "audit exposed services and stop or firewall the unneeded ones",
        "cron_jobs" => "remove the cron entry and audit how it was installed",
        "suspicious_files" => "inspect the file, delete it if unexpected, and remount scratch directories noexec",
        "system_accounts" => "lock or delete the account and audit how it was created",
        "network_connections" => "identify the owning process and block the destination",
        "file_integrity" => "restore the file from a trusted source and investigate the modification",
        "login_history" => "rotate credentials, review authorized_keys, and restrict login source addresses",
        "immutable_files" => "clear the attribute with chattr and investigate who set it",
        "suspicious_env_vars" => "remove the linker override and check for planted shared objects",
        _ => "review this finding",
    }
}

/// Turn non-passing findings into severity-prefixed remediation strings.
///
/// Ordering is (registry category order, detail order) and the output is
/// byte-identical for identical inputs.
pub fn build_recommendations(checks: &[CheckResult]) -> Vec<String> {
    let mut recommendations = Vec::new();
    for check in checks {
        match &check.details {
            Some(details) => {
                for detail in details {
                    push_recommendation(&mut recommendations, &check.category, detail.status, &detail.message, &detail.name);
                }
            }
            None => {
                push_recommendation(&mut recommendations, &check.category, check.status, &check.message, "");
            }
        }
    }
    recommendations
}

fn push_recommendation(
    recommendations: &mut Vec<String>,
    category: &str,
    status: Status,
    message: &str,
    detail_name: &str,
) {
    if let Some(prefix) = severity_prefix(status) {
        recommendations.push(format!(
            "{prefix}[{category}] {message}: {}",
            remediation(category, detail_name)
        ));
    }
}
