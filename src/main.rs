// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! CLI entry point: run one audit and emit the JSON report.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use vigil::config::Config;
use vigil::context::AuditContext;
use vigil::exec::cancel_pair;
use vigil::geoip::GeoIpService;
use vigil::orchestrator;

/// Host-level security audit agent for Linux servers.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/vigil/config.toml")]
    config: String,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Cancel outstanding checks after this many seconds (overrides config)
    #[arg(long)]
    deadline: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = if Path::new(&args.config).exists() {
        Config::load(&args.config)?
    } else {
        debug!(path = %args.config, "no config file, running with defaults");
        Config::default()
    };

    let (handle, token) = cancel_pair();

    if let Some(secs) = args.deadline.or(config.audit.deadline_secs) {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(deadline_secs = secs, "deadline reached, cancelling outstanding checks");
            handle.cancel();
        });
    }

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling audit");
                handle.cancel();
            }
        });
    }

    let geoip = GeoIpService::from_config(&config.geoip);
    let ctx = AuditContext::new(config, geoip, token);
    let result = orchestrator::run_audit(&ctx).await;

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("cannot write report to {path}"))?
        }
        None => println!("{json}"),
    }
    Ok(())
}
