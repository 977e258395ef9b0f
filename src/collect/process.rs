// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Process inventory via `ps aux`.

use tracing::debug;

use crate::context::AuditContext;
use crate::report::ProcessInfo;

pub async fn collect(ctx: &AuditContext) -> Vec<ProcessInfo> {
    match ctx.executor.execute("ps", &["aux"]).await {
        Ok(output) => parse_ps_output(&output),
        Err(e) => {
            debug!(error = %e, "cannot enumerate processes");
            Vec::new()
        }
    }
}

/// Parse `ps aux` output: USER PID %CPU %MEM VSZ RSS TTY STAT START TIME
/// COMMAND. Rows that fail numeric parsing are dropped.
pub fn parse_ps_output(output: &str) -> Vec<ProcessInfo> {
    let mut processes = Vec::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            continue;
        }
        let Ok(pid) = fields[1].parse::<u32>() else {
            continue;
        };
        processes.push(ProcessInfo {
            pid,
            user: fields[0].to_string(),
            cpu: fields[2].parse().unwrap_or(0.0),
            mem: fields[3].parse().unwrap_or(0.0),
            command: fields[10..].join(" "),
        });
    }
    processes
}
