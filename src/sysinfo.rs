// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Best-effort host identity probe.
//!
//! Every field degrades to empty/zero on failure; this probe never aborts an
//! audit. The public IP is taken from configuration when set, otherwise from
//! the first global address on a local interface (no network round-trip —
//! report transport owns anything heavier).

use tracing::debug;

use crate::context::AuditContext;
use crate::report::SystemInfo;

pub async fn collect(ctx: &AuditContext) -> SystemInfo {
    let hostname = read_hostname(ctx).await;
    let os = std::fs::read_to_string("/etc/os-release")
        .map(|raw| parse_os_release(&raw))
        .unwrap_or_default();
    let kernel_version = match ctx.executor.execute("uname", &["-r"]).await {
        Ok(out) => out.trim().to_string(),
        Err(e) => {
            debug!(error = %e, "cannot determine kernel version");
            String::new()
        }
    };
    let uptime = std::fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|raw| parse_uptime(&raw))
        .unwrap_or(0);
    let public_ip = match &ctx.config.system.public_ip {
        Some(ip) => Some(ip.clone()),
        None => detect_global_address(ctx).await,
    };

    SystemInfo { hostname, os, kernel_version, uptime, public_ip }
}

async fn read_hostname(ctx: &AuditContext) -> String {
    if let Ok(raw) = std::fs::read_to_string("/etc/hostname") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    match ctx.executor.execute("hostname", &[]).await {
        Ok(out) => out.trim().to_string(),
        Err(e) => {
            debug!(error = %e, "cannot determine hostname");
            String::new()
        }
    }
}

async fn detect_global_address(ctx: &AuditContext) -> Option<String> {
    match ctx.executor.execute("ip", &["-o", "-4", "addr", "show", "scope", "global"]).await {
        Ok(out) => parse_global_addr(&out),
        Err(e) => {
            debug!(error = %e, "cannot detect global address");
            None
        }
    }
}

/// Extract `PRETTY_NAME` from `/etc/os-release` content.
pub fn parse_os_release(content: &str) -> String {
    content
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// First field of `/proc/uptime`, truncated to whole seconds.
pub fn parse_uptime(content: &str) -> Option<u64> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| secs as u64)
}

/// First address from `ip -o -4 addr show scope global` output.
pub fn parse_global_addr(output: &str) -> Option<String> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // 2: eth0    inet 203.0.113.5/24 brd ...
        if let Some(idx) = fields.iter().position(|f| *f == "inet") {
            if let Some(cidr) = fields.get(idx + 1) {
                if let Some((addr, _)) = cidr.split_once('/') {
                    return Some(addr.to_string());
                }
                return Some(cidr.to_string());
            }
        }
    }
    None
}
