// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Audit report data model.
//!
//! Everything in this module serializes to the JSON schema consumed by the
//! control plane UI: an [`AuditResult`] per run, holding [`SystemInfo`], the
//! ordered [`CheckResult`] list, collected [`Assets`], and remediation
//! recommendations. Absent optional fields are omitted from the JSON, never
//! emitted as null.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a check or a sub-finding.
///
/// Aggregation severity order is `pass < skip < warn < fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Skip,
    Warn,
    Fail,
}

impl Status {
    fn rank(self) -> u8 {
        match self {
            Status::Pass => 0,
            Status::Skip => 1,
            Status::Warn => 2,
            Status::Fail => 3,
        }
    }

    /// The worst status in `statuses`, or `Pass` when empty.
    pub fn worst<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
        statuses
            .into_iter()
            .max_by_key(|s| s.rank())
            .unwrap_or(Status::Pass)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pass => write!(f, "pass"),
            Status::Skip => write!(f, "skip"),
            Status::Warn => write!(f, "warn"),
            Status::Fail => write!(f, "fail"),
        }
    }
}

/// Risk attached to a piece of evidence, independent of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Structured context attached to a [`CheckDetail`].
///
/// Invariant: at least one of the optional fields is populated; empty
/// evidence is never attached (enforced by the builder in `evidence`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Hex SHA-256, 64 lowercase characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_conn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_tree: Option<Vec<String>>,
    pub risk_level: RiskLevel,
}

impl Evidence {
    /// True when no contextual field is populated.
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.file_hash.is_none()
            && self.timestamp.is_none()
            && self.network_conn.is_none()
            && self.process_tree.is_none()
    }
}

/// A sub-finding within a check. `name` is unique within its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDetail {
    pub name: String,
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl CheckDetail {
    pub fn new(name: &str, status: Status, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            evidence: None,
        }
    }

    pub fn with_evidence(name: &str, status: Status, message: &str, evidence: Evidence) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            evidence: Some(evidence),
        }
    }
}

/// Result of a single security check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Stable snake_case tag from the closed category set.
    pub category: String,
    pub status: Status,
    /// One-line human summary.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<CheckDetail>>,
}

impl CheckResult {
    /// A result with no details and an explicitly chosen status.
    pub fn new(category: &str, status: Status, message: &str) -> Self {
        Self {
            category: category.to_string(),
            status,
            message: message.to_string(),
            details: None,
        }
    }

    /// A result whose status is the worst among its details.
    ///
    /// An empty detail list collapses to a plain `pass` result.
    pub fn with_details(category: &str, message: &str, details: Vec<CheckDetail>) -> Self {
        if details.is_empty() {
            return Self::new(category, Status::Pass, message);
        }
        let status = Status::worst(details.iter().map(|d| d.status));
        Self {
            category: category.to_string(),
            status,
            message: message.to_string(),
            details: Some(details),
        }
    }
}

/// Basic host identity collected at the start of a run.
///
/// Probe failures leave fields empty; they never abort the audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub kernel_version: String,
    /// Seconds since boot.
    pub uptime: u64,
    #[serde(rename = "publicIP", skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

/// One parsed `last`/`lastb`/auth.log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecord {
    pub username: String,
    pub terminal: String,
    pub ip: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub status: LoginStatus,
    /// True when the timestamp fell back to wall-clock because the source
    /// line could not be parsed.
    pub timestamp_inferred: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
}

/// One active session from `w`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    pub username: String,
    pub terminal: String,
    pub ip: String,
    /// Unix milliseconds.
    pub login_time: i64,
    /// Seconds, never negative.
    pub idle_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatistics {
    pub total_logins: usize,
    pub failed_logins: usize,
    pub current_sessions: usize,
    #[serde(rename = "uniqueIPs")]
    pub unique_ips: BTreeMap<String, usize>,
    pub unique_users: BTreeMap<String, usize>,
    /// Subset of `uniqueIPs` with count > 10.
    #[serde(rename = "highFrequencyIPs")]
    pub high_frequency_ips: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAssets {
    pub successful_logins: Vec<LoginRecord>,
    pub failed_logins: Vec<LoginRecord>,
    pub current_sessions: Vec<LoginSession>,
    pub statistics: LoginStatistics,
}

/// A TCP/UDP socket in listening state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningPort {
    pub protocol: String,
    pub local_address: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
}

/// One scheduled cron entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// Where the entry came from (file path or `crontab:<user>`).
    pub source: String,
    pub user: String,
    pub schedule: String,
    pub command: String,
}

/// One row of `ps aux`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub user: String,
    pub cpu: f32,
    pub mem: f32,
    pub command: String,
}

/// Inventory produced by the asset collectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assets {
    pub logins: LoginAssets,
    pub listening_ports: Vec<ListeningPort>,
    pub cron_jobs: Vec<CronJob>,
    pub processes: Vec<ProcessInfo>,
}

/// The sealed result of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub system_info: SystemInfo,
    pub security_checks: Vec<CheckResult>,
    pub assets: Assets,
    /// Severity-prefixed remediation strings, stable order.
    pub recommendations: Vec<String>,
    /// Unix milliseconds.
    pub start_time: i64,
    /// Unix milliseconds, `>= start_time`.
    pub end_time: i64,
}
