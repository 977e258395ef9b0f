// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Login asset collection: history, failures, active sessions, statistics.
//!
//! Failed logins come from `lastb` when it works; any failure there (the
//! usual case without root, since `/var/log/btmp` is mode 0660) falls back to
//! scanning `/var/log/auth.log` or `/var/log/secure`. The fallback reads from
//! the head of the file, matching the behavior audits have always had; see
//! DESIGN.md for the product-review note.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::context::AuditContext;
use crate::parsers::{canonicalize_ip, parse_failed_login_line, parse_idle_time, parse_login_time, now_ms};
use crate::report::{LoginAssets, LoginRecord, LoginSession, LoginStatistics, LoginStatus};

const AUTH_LOG_PATHS: &[&str] = &["/var/log/auth.log", "/var/log/secure"];

/// Collect the full login inventory.
pub async fn collect(ctx: &AuditContext) -> LoginAssets {
    let successful_logins = collect_successful(ctx).await;
    let failed_logins = collect_failed(ctx).await;
    let current_sessions = collect_sessions(ctx).await;
    let statistics = calculate_statistics(&successful_logins, &failed_logins, &current_sessions);
    LoginAssets {
        successful_logins,
        failed_logins,
        current_sessions,
        statistics,
    }
}

async fn collect_successful(ctx: &AuditContext) -> Vec<LoginRecord> {
    let limit = ctx.config.login.max_records;
    let count = limit.to_string();
    match ctx.executor.execute("last", &["-n", &count, "-F", "-w"]).await {
        Ok(output) => parse_last_output(&output, LoginStatus::Success, limit),
        Err(e) => {
            debug!(error = %e, "cannot read login history");
            Vec::new()
        }
    }
}

async fn collect_failed(ctx: &AuditContext) -> Vec<LoginRecord> {
    let limit = ctx.config.login.max_records;
    let count = limit.to_string();
    match ctx.executor.execute("lastb", &["-n", &count, "-F", "-w"]).await {
        Ok(output) => parse_last_output(&output, LoginStatus::Failed, limit),
        Err(e) => {
            debug!(error = %e, "lastb unavailable, falling back to auth log");
            collect_failed_from_auth_log(ctx, limit)
        }
    }
}

fn collect_failed_from_auth_log(ctx: &AuditContext, limit: usize) -> Vec<LoginRecord> {
    let Some(path) = AUTH_LOG_PATHS.iter().copied().find(|p| Path::new(p).exists()) else {
        return Vec::new();
    };
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!(path, error = %e, "cannot open auth log");
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Ok(line) = line else { break };
        if line.contains("Failed password") || line.contains("authentication failure") {
            records.push(parse_failed_login_line(&line));
            if records.len() >= limit {
                break;
            }
        }
    }
    records
}

async fn collect_sessions(ctx: &AuditContext) -> Vec<LoginSession> {
    match ctx.executor.execute("w", &["-h"]).await {
        Ok(output) => parse_w_output(&output, now_ms()),
        Err(e) => {
            debug!(error = %e, "cannot read current sessions");
            Vec::new()
        }
    }
}

/// Parse `last -F -w` / `lastb -F -w` output.
///
/// Skips empty lines, the trailing `wtmp`/`btmp begins` footer, reboot
/// records, and `system boot` pseudo-logins. A line needs at least
/// username/terminal/source fields to count.
pub fn parse_last_output(output: &str, status: LoginStatus, limit: usize) -> Vec<LoginRecord> {
    let mut records = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with("wtmp")
            || line.starts_with("btmp")
            || line.starts_with("reboot")
            || line.contains("system boot")
        {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }

        let (timestamp, timestamp_inferred) = parse_login_time(&fields);
        records.push(LoginRecord {
            username: fields[0].to_string(),
            terminal: fields[1].to_string(),
            ip: canonicalize_ip(fields[2]),
            timestamp,
            status,
            timestamp_inferred,
        });

        if records.len() >= limit {
            break;
        }
    }
    records
}

/// Parse `w -h` output into sessions.
///
/// Login time is back-computed from the idle time; `w` prints login time in
/// too many locale-dependent shapes to parse reliably.
pub fn parse_w_output(output: &str, now_ms: i64) -> Vec<LoginSession> {
    let mut sessions = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let idle_time = parse_idle_time(fields[3]);
        sessions.push(LoginSession {
            username: fields[0].to_string(),
            terminal: fields[1].to_string(),
            ip: canonicalize_ip(fields[2]),
            login_time: now_ms - (idle_time as i64) * 1000,
            idle_time,
        });
    }
    sessions
}

/// Aggregate counters over the collected records.
///
/// Unique IP/user maps are computed over successful logins; the
/// high-frequency subset keeps entries seen more than 10 times.
pub fn calculate_statistics(
    successful: &[LoginRecord],
    failed: &[LoginRecord],
    sessions: &[LoginSession],
) -> LoginStatistics {
    let mut unique_ips: BTreeMap<String, usize> = BTreeMap::new();
    let mut unique_users: BTreeMap<String, usize> = BTreeMap::new();
    for login in successful {
        *unique_ips.entry(login.ip.clone()).or_insert(0) += 1;
        *unique_users.entry(login.username.clone()).or_insert(0) += 1;
    }

    let high_frequency_ips = unique_ips
        .iter()
        .filter(|(_, count)| **count > 10)
        .map(|(ip, count)| (ip.clone(), *count))
        .collect();

    LoginStatistics {
        total_logins: successful.len(),
        failed_logins: failed.len(),
        current_sessions: sessions.len(),
        unique_ips,
        unique_users,
        high_frequency_ips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate, TimeZone};

    #[test]
    fn test_parse_last_line() {
        let output = "root     pts/0        203.0.113.5      Mon Dec 25 10:30:00 2023 - Mon Dec 25 11:00:00 2023  (00:30)\n";
        let records = parse_last_output(output, LoginStatus::Success, 100);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.username, "root");
        assert_eq!(record.terminal, "pts/0");
        assert_eq!(record.ip, "203.0.113.5");
        assert_eq!(record.status, LoginStatus::Success);
        assert!(!record.timestamp_inferred);

        let expected = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2023, 12, 25)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(record.timestamp, expected);
    }

    #[test]
    fn test_parse_last_skips_special_lines() {
        let output = "\
reboot   system boot  6.1.0-18-amd64   Mon Dec 25 09:00:00 2023   still running
alice    pts/1        192.0.2.10       Mon Dec 25 10:30:00 2023 - Mon Dec 25 11:00:00 2023  (00:30)

wtmp begins Fri Dec  1 00:00:01 2023
";
        let records = parse_last_output(output, LoginStatus::Success, 100);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "alice");
    }

    #[test]
    fn test_parse_lastb_skips_btmp_footer() {
        let output = "\
admin    ssh:notty    198.51.100.7     Mon Dec 25 10:30:00 2023 - Mon Dec 25 10:30:00 2023  (00:00)
btmp begins Fri Dec  1 00:00:01 2023
";
        let records = parse_last_output(output, LoginStatus::Failed, 100);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "admin");
        assert_eq!(records[0].status, LoginStatus::Failed);
    }

    #[test]
    fn test_parse_last_local_display_canonicalized() {
        let output = "bob      tty7         :0               Mon Dec 25 10:30:00 2023   still logged in\n";
        let records = parse_last_output(output, LoginStatus::Success, 100);
        assert_eq!(records[0].ip, "localhost");
    }

    #[test]
    fn test_parse_last_respects_limit() {
        let line = "alice    pts/1        192.0.2.10       Mon Dec 25 10:30:00 2023 - Mon Dec 25 11:00:00 2023  (00:30)\n";
        let output = line.repeat(10);
        let records = parse_last_output(&output, LoginStatus::Success, 3);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_parse_w_session_idle() {
        let output = "alice    pts/1    192.0.2.10       2:30   0.04s  0.01s sshd: alice [priv]\n";
        let now = 1_700_000_000_000;
        let sessions = parse_w_output(output, now);
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.username, "alice");
        assert_eq!(session.idle_time, 9000);
        assert_eq!(session.login_time, now - 9_000_000);
    }

    #[test]
    fn test_parse_w_local_session() {
        let output = "bob      tty7     -        1.00s  2.00s  0.5s /usr/bin/gnome-shell\n";
        let sessions = parse_w_output(output, 0);
        assert_eq!(sessions[0].ip, "localhost");
        assert_eq!(sessions[0].idle_time, 1);
    }

    #[test]
    fn test_statistics_counts() {
        let record = |user: &str, ip: &str| LoginRecord {
            username: user.to_string(),
            terminal: "pts/0".to_string(),
            ip: ip.to_string(),
            timestamp: 0,
            status: LoginStatus::Success,
            timestamp_inferred: false,
        };
        let successful: Vec<LoginRecord> = (0..12)
            .map(|_| record("root", "203.0.113.5"))
            .chain(std::iter::once(record("alice", "192.0.2.10")))
            .collect();
        let failed = vec![record("admin", "198.51.100.7")];

        let stats = calculate_statistics(&successful, &failed, &[]);
        assert_eq!(stats.total_logins, 13);
        assert_eq!(stats.failed_logins, 1);
        assert_eq!(stats.unique_ips["203.0.113.5"], 12);
        assert_eq!(stats.unique_users["root"], 12);
        // Strictly greater than 10.
        assert!(stats.high_frequency_ips.contains_key("203.0.113.5"));
        assert!(!stats.high_frequency_ips.contains_key("192.0.2.10"));
    }

    #[test]
    fn test_statistics_threshold_boundary() {
        let record = |ip: &str| LoginRecord {
            username: "root".to_string(),
            terminal: "pts/0".to_string(),
            ip: ip.to_string(),
            timestamp: 0,
            status: LoginStatus::Success,
            timestamp_inferred: false,
        };
        let successful: Vec<LoginRecord> = (0..10).map(|_| record("203.0.113.5")).collect();
        let stats = calculate_statistics(&successful, &[], &[]);
        // Exactly 10 does not qualify as high-frequency.
        assert!(stats.high_frequency_ips.is_empty());
    }
}
