// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Asset collectors: structured inventory, no pass/fail verdicts.

pub mod cron;
pub mod login;
pub mod ports;
pub mod process;

use crate::context::AuditContext;
use crate::report::Assets;

/// Run all collectors concurrently and assemble the inventory.
pub async fn collect_assets(ctx: &AuditContext) -> Assets {
    let (logins, listening_ports, cron_jobs, processes) = tokio::join!(
        login::collect(ctx),
        ports::collect(ctx),
        cron::collect(ctx),
        process::collect(ctx),
    );
    Assets {
        logins,
        listening_ports,
        cron_jobs,
        processes,
    }
}
