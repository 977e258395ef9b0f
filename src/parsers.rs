// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Parsers for operator-tool output: `last`/`lastb` timestamps, syslog dates,
//! `w` idle strings, and auth.log failure lines.
//!
//! All parsers are table-driven and tolerate distro variation. When a
//! timestamp cannot be parsed at all the record falls back to wall-clock time
//! and is flagged with `timestamp_inferred` so consumers can tell synthesized
//! ordering from real data.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::report::{LoginRecord, LoginStatus};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// `last -F` timestamp layouts, in priority order. The `%e` form also covers
/// single-digit days without padding.
const LAST_TIME_FORMATS: &[&str] = &["%a %b %e %H:%M:%S %Y", "%a %b %d %H:%M:%S %Y"];

const ISO_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn local_millis(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Parse the login timestamp out of a whitespace-split `last -F` line.
///
/// Fields 0..3 are username/terminal/ip; the timestamp occupies fields 3..8
/// (`Mon Dec 25 10:30:00 2023`) or 3..5 for ISO-style output. Returns
/// `(unix_ms, inferred)` where `inferred` marks the wall-clock fallback.
pub fn parse_login_time(fields: &[&str]) -> (i64, bool) {
    if fields.len() >= 8 {
        let joined = fields[3..8].join(" ");
        for fmt in LAST_TIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, fmt) {
                if let Some(ms) = local_millis(naive) {
                    return (ms, false);
                }
            }
        }
    }
    if fields.len() >= 5 {
        let joined = fields[3..5].join(" ");
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, ISO_TIME_FORMAT) {
            if let Some(ms) = local_millis(naive) {
                return (ms, false);
            }
        }
    }
    debug!(fields = ?fields.get(3..), "unparseable login time, using wall clock");
    (now_ms(), true)
}

/// Parse a syslog-style prefix (`Dec 25 10:30:00`, no year) from `line`.
pub fn parse_syslog_time(line: &str) -> (i64, bool) {
    parse_syslog_time_at(line, Local::now())
}

/// [`parse_syslog_time`] against an injected reference clock.
///
/// Syslog omits the year, so the current one is synthesized; a result in the
/// future means the entry is from last year and gets rolled back.
pub fn parse_syslog_time_at(line: &str, now: DateTime<Local>) -> (i64, bool) {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return (now.timestamp_millis(), true);
    }

    let joined = format!("{} {} {} {}", fields[0], fields[1], fields[2], now.year());
    for fmt in ["%b %e %H:%M:%S %Y", "%b %d %H:%M:%S %Y"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, fmt) {
            if let Some(dt) = Local.from_local_datetime(&naive).earliest() {
                if dt > now {
                    if let Some(ms) = naive.with_year(now.year() - 1).and_then(local_millis) {
                        return (ms, false);
                    }
                }
                return (dt.timestamp_millis(), false);
            }
        }
    }

    debug!(line, "unparseable syslog time, using wall clock");
    (now.timestamp_millis(), true)
}

/// Parse a `w` idle-time string into seconds.
///
/// Grammar: `Ns` (seconds, possibly fractional), `H:MM` (hours:minutes),
/// `Ndays`. Anything else, including the `-`/`?` placeholders, is 0.
pub fn parse_idle_time(idle: &str) -> u64 {
    let idle = idle.trim();
    if idle.is_empty() || idle == "-" || idle == "?" {
        return 0;
    }

    if let Some(stripped) = idle.strip_suffix('s') {
        return stripped.parse::<f64>().map(|s| s as u64).unwrap_or(0);
    }

    if let Some((hours, minutes)) = idle.split_once(':') {
        if let (Ok(h), Ok(m)) = (hours.parse::<u64>(), minutes.parse::<u64>()) {
            return h * 3600 + m * 60;
        }
        return 0;
    }

    if let Some(idx) = idle.find("day") {
        return idle[..idx].parse::<u64>().map(|d| d * 86400).unwrap_or(0);
    }

    0
}

/// Canonicalize the source field of a login record.
///
/// Local logins show up as empty, `-`, `:0`, `:0.0`, or an X display tag;
/// all of those map to `localhost`.
pub fn canonicalize_ip(ip: &str) -> String {
    if ip.is_empty() || ip == "-" || ip.starts_with(':') {
        return "localhost".to_string();
    }
    ip.to_string()
}

struct FailedLoginPatterns {
    /// `invalid user NAME` / `user NAME`; tried first, like sshd prints it.
    user: Regex,
    /// `Failed password for NAME`.
    target: Regex,
    /// `from ADDR`.
    source: Regex,
}

fn failed_login_patterns() -> Option<&'static FailedLoginPatterns> {
    static PATTERNS: OnceLock<Option<FailedLoginPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(FailedLoginPatterns {
                user: Regex::new(r"user (\S+)").ok()?,
                target: Regex::new(r"for (\S+)").ok()?,
                source: Regex::new(r"from (\S+)").ok()?,
            })
        })
        .as_ref()
}

fn first_capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Parse one auth.log failure line into a [`LoginRecord`].
///
/// Handles the `Failed password for [invalid user] NAME from IP port N` and
/// pam `authentication failure` shapes; unmatched parts degrade to
/// `"unknown"` rather than dropping the record.
pub fn parse_failed_login_line(line: &str) -> LoginRecord {
    parse_failed_login_line_at(line, Local::now())
}

/// [`parse_failed_login_line`] against an injected reference clock.
pub fn parse_failed_login_line_at(line: &str, now: DateTime<Local>) -> LoginRecord {
    let mut username = "unknown";
    let mut ip = "unknown";
    if let Some(patterns) = failed_login_patterns() {
        username = first_capture(&patterns.user, line)
            .or_else(|| first_capture(&patterns.target, line))
            .unwrap_or("unknown");
        ip = first_capture(&patterns.source, line).unwrap_or("unknown");
    }

    let (timestamp, inferred) = parse_syslog_time_at(line, now);

    LoginRecord {
        username: username.to_string(),
        terminal: "ssh".to_string(),
        ip: canonicalize_ip(ip),
        timestamp,
        status: LoginStatus::Failed,
        timestamp_inferred: inferred,
    }
}

/// One `/etc/passwd` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

/// Parse `/etc/passwd` content, dropping malformed rows.
pub fn parse_passwd(content: &str) -> Vec<PasswdEntry> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 {
                return None;
            }
            Some(PasswdEntry {
                name: fields[0].to_string(),
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                home: fields[5].to_string(),
                shell: fields[6].to_string(),
            })
        })
        .collect()
}

/// True for shells that allow interactive login.
pub fn is_login_shell(shell: &str) -> bool {
    !matches!(
        shell,
        "" | "/usr/sbin/nologin" | "/sbin/nologin" | "/bin/false" | "/usr/bin/false" | "/bin/sync"
    )
}
