// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Shared per-run state handed to every check and collector.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::exec::{CancelToken, Executor};
use crate::geoip::GeoIpService;

/// Everything a check needs: configuration, the command executor, the shared
/// GeoIP handle, and the run's cancel token. Cheap to clone; checks share no
/// mutable state through it.
#[derive(Clone)]
pub struct AuditContext {
    pub config: Arc<Config>,
    pub executor: Arc<Executor>,
    pub geoip: Arc<GeoIpService>,
    pub cancel: CancelToken,
}

impl AuditContext {
    pub fn new(config: Config, geoip: GeoIpService, cancel: CancelToken) -> Self {
        let timeout = Duration::from_secs(config.audit.command_timeout_secs);
        Self {
            executor: Arc::new(Executor::new(timeout, cancel.clone())),
            config: Arc::new(config),
            geoip: Arc::new(geoip),
            cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_cloneable() {
        let ctx = AuditContext::new(Config::default(), GeoIpService::disabled(), CancelToken::default());
        let clone = ctx.clone();
        assert_eq!(clone.config.audit.workers, ctx.config.audit.workers);
    }
}
