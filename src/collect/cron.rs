// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Cron job inventory: `/etc/crontab`, `/etc/cron.d/*`, and per-user
//! crontabs via `crontab -l -u`.
//!
//! Per-user listing needs root; individual failures are logged at debug and
//! the user is skipped.

use tracing::debug;

use crate::context::AuditContext;
use crate::parsers::{is_login_shell, parse_passwd};
use crate::report::CronJob;

pub async fn collect(ctx: &AuditContext) -> Vec<CronJob> {
    let mut jobs = Vec::new();

    if let Ok(content) = std::fs::read_to_string("/etc/crontab") {
        jobs.extend(parse_system_crontab(&content, "/etc/crontab"));
    }

    if let Ok(entries) = std::fs::read_dir("/etc/cron.d") {
        for entry in entries.flatten() {
            if ctx.cancel.is_cancelled() {
                return jobs;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(&path) {
                jobs.extend(parse_system_crontab(&content, &path.display().to_string()));
            }
        }
    }

    for user in crontab_users() {
        if ctx.cancel.is_cancelled() {
            return jobs;
        }
        match ctx.executor.execute("crontab", &["-l", "-u", &user]).await {
            Ok(output) => jobs.extend(parse_user_crontab(&output, &user)),
            Err(e) => debug!(user, error = %e, "no readable crontab"),
        }
    }

    jobs
}

/// root plus every user with a login shell.
fn crontab_users() -> Vec<String> {
    let Ok(content) = std::fs::read_to_string("/etc/passwd") else {
        return vec!["root".to_string()];
    };
    parse_passwd(&content)
        .into_iter()
        .filter(|e| e.uid == 0 || is_login_shell(&e.shell))
        .map(|e| e.name)
        .collect()
}

/// Parse a system crontab (with a user column): `m h dom mon dow user cmd`.
/// `@reboot`-style schedules and env assignments are handled.
pub fn parse_system_crontab(content: &str, source: &str) -> Vec<CronJob> {
    let mut jobs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        // SHELL=/bin/sh and friends
        if fields[0].contains('=') {
            continue;
        }

        if fields[0].starts_with('@') {
            if fields.len() < 3 {
                continue;
            }
            jobs.push(CronJob {
                source: source.to_string(),
                user: fields[1].to_string(),
                schedule: fields[0].to_string(),
                command: fields[2..].join(" "),
            });
        } else {
            if fields.len() < 7 {
                continue;
            }
            jobs.push(CronJob {
                source: source.to_string(),
                user: fields[5].to_string(),
                schedule: fields[..5].join(" "),
                command: fields[6..].join(" "),
            });
        }
    }
    jobs
}

/// Parse `crontab -l` output for one user (no user column).
pub fn parse_user_crontab(content: &str, user: &str) -> Vec<CronJob> {
    let source = format!("crontab:{user}");
    let mut jobs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields[0].contains('=') {
            continue;
        }

        if fields[0].starts_with('@') {
            if fields.len() < 2 {
                continue;
            }
            jobs.push(CronJob {
                source: source.clone(),
                user: user.to_string(),
                schedule: fields[0].to_string(),
                command: fields[1..].join(" "),
            });
        } else {
            if fields.len() < 6 {
                continue;
            }
            jobs.push(CronJob {
                source: source.clone(),
                user: user.to_string(),
                schedule: fields[..5].join(" "),
                command: fields[5..].join(" "),
            });
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_crontab() {
        let content = "\
# /etc/crontab: system-wide crontab
SHELL=/bin/sh
PATH=/usr/local/sbin:/usr/local/bin:/sbin:/bin

17 *    * * *   root    cd / && run-parts --report /etc/cron.hourly
@reboot         root    /usr/local/bin/agent --boot
";
        let jobs = parse_system_crontab(content, "/etc/crontab");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].schedule, "17 * * * *");
        assert_eq!(jobs[0].user, "root");
        assert!(jobs[0].command.starts_with("cd /"));
        assert_eq!(jobs[1].schedule, "@reboot");
        assert_eq!(jobs[1].command, "/usr/local/bin/agent --boot");
    }

    #[test]
    fn test_parse_user_crontab() {
        let content = "\
MAILTO=alice@example.com
*/5 * * * * /home/alice/bin/sync.sh
@daily /home/alice/bin/backup.sh --quiet
";
        let jobs = parse_user_crontab(content, "alice");
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].source, "crontab:alice");
        assert_eq!(jobs[0].schedule, "*/5 * * * *");
        assert_eq!(jobs[0].command, "/home/alice/bin/sync.sh");
        assert_eq!(jobs[1].schedule, "@daily");
    }

    #[test]
    fn test_parse_crontab_short_lines_skipped() {
        assert!(parse_system_crontab("1 2 3\n", "/etc/crontab").is_empty());
        assert!(parse_user_crontab("* * * * *\n", "bob").is_empty());
    }
}
