// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Process-level checks: rootkit scanners, suspicious processes, dynamic
//! linker environment hooks.

use async_trait::async_trait;
use tracing::debug;

use super::Check;
use crate::collect::process as process_collect;
use crate::context::AuditContext;
use crate::error::ExecError;
use crate::evidence::{file_evidence, EvidenceBuilder};
use crate::exec::command_available;
use crate::report::{CheckDetail, CheckResult, ProcessInfo, RiskLevel, Status};

/// `rootkit_detection`: run chkrootkit and/or rkhunter when installed and
/// surface their INFECTED/Warning lines.
pub struct RootkitDetection;

#[async_trait]
impl Check for RootkitDetection {
    fn category(&self) -> &'static str {
        "rootkit_detection"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        let mut details = Vec::new();
        let mut ran_any = false;

        if command_available("chkrootkit") {
            ran_any = true;
            match ctx.executor.execute("chkrootkit", &[]).await {
                Ok(output) => details.extend(parse_rootkit_output("chkrootkit", &output)),
                // chkrootkit signals findings through its exit code; the
                // report is still on stdout.
                Err(ExecError::NonZeroExit { stdout, .. }) => {
                    details.extend(parse_rootkit_output("chkrootkit", &stdout))
                }
                Err(ExecError::Cancelled(_)) => {
                    return CheckResult::new(self.category(), Status::Skip, "cancelled")
                }
                Err(ExecError::Timeout { .. }) => {
                    details.push(CheckDetail::new("chkrootkit", Status::Warn, "probe timed out"));
                }
                Err(e) => {
                    debug!(error = %e, "chkrootkit probe failed");
                    details.push(CheckDetail::new(
                        "chkrootkit",
                        Status::Warn,
                        &format!("chkrootkit probe failed: {e}"),
                    ));
                }
            }
        }

        if command_available("rkhunter") {
            ran_any = true;
            match ctx.executor.execute("rkhunter", &["--check", "--skip-keypress"]).await {
                Ok(output) => details.extend(parse_rootkit_output("rkhunter", &output)),
                Err(ExecError::NonZeroExit { stdout, .. }) => {
                    details.extend(parse_rootkit_output("rkhunter", &stdout))
                }
                Err(ExecError::Cancelled(_)) => {
                    return CheckResult::new(self.category(), Status::Skip, "cancelled")
                }
                Err(ExecError::Timeout { .. }) => {
                    details.push(CheckDetail::new("rkhunter", Status::Warn, "probe timed out"));
                }
                Err(e) => {
                    debug!(error = %e, "rkhunter probe failed");
                    details.push(CheckDetail::new(
                        "rkhunter",
                        Status::Warn,
                        &format!("rkhunter probe failed: {e}"),
                    ));
                }
            }
        }

        if !ran_any {
            return CheckResult::new(
                self.category(),
                Status::Skip,
                "chkrootkit/rkhunter not available",
            );
        }
        if details.is_empty() {
            return CheckResult::new(self.category(), Status::Pass, "no rootkit indicators found");
        }
        let message = format!("{} rootkit scanner finding(s)", details.len());
        CheckResult::with_details(self.category(), &message, details)
    }
}

/// Pull INFECTED/Warning lines out of a scanner transcript.
///
/// `INFECTED` is matched case-sensitively so chkrootkit's frequent
/// "not infected" lines stay quiet.
pub fn parse_rootkit_output(tool: &str, output: &str) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.contains("INFECTED") {
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .process_tree(vec![line.to_string()])
                .build();
            details.push(CheckDetail {
                name: format!("{tool}_infected_{}", details.len()),
                status: Status::Fail,
                message: line.to_string(),
                evidence,
            });
        } else if line.contains("Warning:") {
            let evidence = EvidenceBuilder::new(RiskLevel::Medium)
                .process_tree(vec![line.to_string()])
                .build();
            details.push(CheckDetail {
                name: format!("{tool}_warning_{}", details.len()),
                status: Status::Warn,
                message: line.to_string(),
                evidence,
            });
        }
    }
    details
}

/// Process names strongly associated with cryptominers and droppers.
const MINER_NAMES: &[&str] = &["xmrig", "kinsing", "kdevtmpfsi", "minerd", "xmr-stak", "cryptonight"];

/// Executables running from scratch space.
const SCRATCH_PREFIXES: &[&str] = &["/tmp/", "/var/tmp/", "/dev/shm/"];

/// `suspicious_processes`: miners, scratch-space executables, deleted
/// binaries.
pub struct SuspiciousProcesses;

#[async_trait]
impl Check for SuspiciousProcesses {
    fn category(&self) -> &'static str {
        "suspicious_processes"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("ps") {
            return CheckResult::new(self.category(), Status::Skip, "ps not available");
        }
        let processes = process_collect::collect(ctx).await;
        let details = classify_processes(&processes);
        if details.is_empty() {
            let message = format!("{} process(es), nothing suspicious", processes.len());
            CheckResult::new(self.category(), Status::Pass, &message)
        } else {
            let message = format!("{} suspicious process finding(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

pub fn classify_processes(processes: &[ProcessInfo]) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for process in processes {
        let line = format!("{} {} {}", process.user, process.pid, process.command);
        let lowered = process.command.to_lowercase();

        if MINER_NAMES.iter().any(|name| lowered.contains(name)) {
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .process_tree(vec![line])
                .build();
            details.push(CheckDetail {
                name: format!("miner:{}", process.pid),
                status: Status::Fail,
                message: format!("known miner process signature (pid {})", process.pid),
                evidence,
            });
        } else if SCRATCH_PREFIXES.iter().any(|p| process.command.starts_with(p)) {
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .process_tree(vec![line])
                .build();
            details.push(CheckDetail {
                name: format!("scratch_exec:{}", process.pid),
                status: Status::Fail,
                message: format!("process executing from scratch space (pid {})", process.pid),
                evidence,
            });
        } else if process.command.contains("(deleted)") {
            let evidence = EvidenceBuilder::new(RiskLevel::Medium)
                .process_tree(vec![line])
                .build();
            details.push(CheckDetail {
                name: format!("deleted_binary:{}", process.pid),
                status: Status::Warn,
                message: format!("process binary deleted on disk (pid {})", process.pid),
                evidence,
            });
        }
    }
    details
}

/// Linker variables that hijack symbol resolution when preloaded.
const LINKER_VARS: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH"];

/// Shell init files scanned for linker hooks.
const PROFILE_PATHS: &[&str] = &["/etc/environment", "/etc/profile", "/etc/bash.bashrc", "/root/.bashrc"];

/// `suspicious_env_vars`: ld.so.preload persistence and linker hooks in
/// shell profiles or the agent's own environment.
pub struct SuspiciousEnvVars;

#[async_trait]
impl Check for SuspiciousEnvVars {
    fn category(&self) -> &'static str {
        "suspicious_env_vars"
    }

    async fn run(&self, _ctx: &AuditContext) -> CheckResult {
        let mut details = Vec::new();

        if let Ok(content) = std::fs::read_to_string("/etc/ld.so.preload") {
            if content.lines().any(|l| !l.trim().is_empty() && !l.trim().starts_with('#')) {
                details.push(CheckDetail::with_evidence(
                    "ld_so_preload",
                    Status::Fail,
                    "/etc/ld.so.preload is non-empty (classic userland rootkit persistence)",
                    file_evidence("/etc/ld.so.preload", RiskLevel::High),
                ));
            }
        }

        for &path in PROFILE_PATHS {
            if let Ok(content) = std::fs::read_to_string(path) {
                details.extend(scan_profile_content(&content, path));
            }
        }

        for var in LINKER_VARS {
            if std::env::var_os(var).is_some() {
                details.push(CheckDetail::new(
                    &format!("agent_env:{var}"),
                    Status::Warn,
                    &format!("{var} is set in the audit agent's own environment"),
                ));
            }
        }

        if details.is_empty() {
            CheckResult::new(self.category(), Status::Pass, "no suspicious environment configuration")
        } else {
            let message = format!("{} environment finding(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// Find linker-variable assignments in a shell profile.
pub fn scan_profile_content(content: &str, path: &str) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        for var in LINKER_VARS {
            if line.contains(&format!("{var}=")) {
                details.push(CheckDetail::with_evidence(
                    &format!("profile_hook:{path}:{var}"),
                    Status::Warn,
                    &format!("{var} assignment in {path}"),
                    file_evidence(path, RiskLevel::Medium),
                ));
            }
        }
    }
    details
}
