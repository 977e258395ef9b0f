// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Configuration loading and serialization.
//!
//! Defines the TOML configuration schema for the audit agent. All sections
//! use `#[serde(default)]` so a missing section or field gracefully falls
//! back to its default. Config is loaded from `/etc/vigil/config.toml` by
//! default; an absent file means an all-defaults run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration struct, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub geoip: GeoIpConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Orchestrator settings: pool size, per-probe timeout, optional run deadline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Concurrent check workers. Clamped to a minimum of 1.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per external command timeout in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Whole-run deadline in seconds; unset means no deadline.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_workers() -> usize {
    4
}
fn default_command_timeout() -> u64 {
    30
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            command_timeout_secs: default_command_timeout(),
            deadline_secs: None,
        }
    }
}

impl AuditConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Login history collection and thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginConfig {
    /// Record cap for each of `last`, `lastb`, and the auth.log fallback.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// Failed logins from a single IP within 24h before the check warns.
    #[serde(default = "default_failed_threshold")]
    pub failed_threshold_24h: usize,
}

fn default_max_records() -> usize {
    100
}
fn default_failed_threshold() -> usize {
    50
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            failed_threshold_24h: default_failed_threshold(),
        }
    }
}

/// Filesystem scan targets and integrity baseline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    /// Directories walked by the suspicious-files check.
    #[serde(default = "default_scan_dirs")]
    pub scan_dirs: Vec<String>,
    /// Optional `sha256  path` baseline for the file-integrity check.
    #[serde(default = "default_baseline_path")]
    pub baseline_path: String,
}

fn default_scan_dirs() -> Vec<String> {
    vec!["/tmp".into(), "/var/tmp".into(), "/dev/shm".into()]
}
fn default_baseline_path() -> String {
    "/etc/vigil/baseline.sha256".into()
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            scan_dirs: default_scan_dirs(),
            baseline_path: default_baseline_path(),
        }
    }
}

/// GeoIP lookup settings. The database itself is injected by the host
/// application; this only controls language and the login allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoIpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub db_path: String,
    /// Preferred localized names, falling back to `en`.
    #[serde(default = "default_language")]
    pub language: String,
    /// Locations successful logins are expected from; empty disables the
    /// location check.
    #[serde(default)]
    pub allowed_locations: Vec<String>,
}

fn default_language() -> String {
    "zh-CN".into()
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: String::new(),
            language: default_language(),
            allowed_locations: Vec::new(),
        }
    }
}

/// System info probe overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Fixed public IP, for hosts where local detection is wrong.
    #[serde(default)]
    pub public_ip: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("cannot parse config file {}", path.display()))
    }
}
