// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! GeoIP lookup contract.
//!
//! The database backend is an external collaborator injected behind
//! [`GeoDatabase`]; this module owns everything around it: the
//! private-range short-circuit, localized name selection with `en` fallback,
//! and the hyphen-joined `Country-Subdivision-City` formatting. The handle is
//! shared read-only across checks; [`GeoIpService::reload`] takes the write
//! lock.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{OnceLock, RwLock};

use ipnet::IpNet;
use tracing::debug;

use crate::config::GeoIpConfig;

/// Localized name maps for one city-level lookup result.
#[derive(Debug, Clone, Default)]
pub struct GeoNames {
    /// Language tag → country name.
    pub country: HashMap<String, String>,
    /// Outermost subdivision first.
    pub subdivisions: Vec<HashMap<String, String>>,
    pub city: HashMap<String, String>,
}

/// City-level database lookup, implemented by the host application.
pub trait GeoDatabase: Send + Sync {
    fn city(&self, ip: IpAddr) -> Option<GeoNames>;
}

/// Shared lookup service with the report-facing `lookup(ip) -> String`
/// contract.
pub struct GeoIpService {
    enabled: bool,
    language: String,
    db: RwLock<Option<Box<dyn GeoDatabase>>>,
}

impl GeoIpService {
    pub fn from_config(config: &GeoIpConfig) -> Self {
        Self {
            enabled: config.enabled,
            language: config.language.clone(),
            db: RwLock::new(None),
        }
    }

    /// A permanently disabled service; every lookup returns `""`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            language: default_language(),
            db: RwLock::new(None),
        }
    }

    /// Swap in a (re)loaded database. Takes the write lock, so it waits for
    /// in-flight lookups to finish.
    pub fn reload(&self, db: Box<dyn GeoDatabase>) {
        let mut guard = self.db.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(db);
    }

    /// Resolve an IP string to a display location.
    ///
    /// Returns `""` when disabled or no database is loaded, `"内网IP"` for
    /// private/loopback/link-local/ULA ranges, otherwise a hyphen-joined
    /// `Country-Subdivision-City` string with unresolved parts skipped.
    pub fn lookup(&self, ip: &str) -> String {
        if !self.enabled {
            return String::new();
        }
        let guard = self.db.read().unwrap_or_else(|e| e.into_inner());
        let Some(db) = guard.as_ref() else {
            return String::new();
        };

        if is_private_ip(ip) {
            return "内网IP".to_string();
        }

        let Ok(parsed) = ip.parse::<IpAddr>() else {
            return String::new();
        };
        match db.city(parsed) {
            Some(names) => format_location(&names, &self.language),
            None => {
                debug!(ip, "geoip lookup found no record");
                String::new()
            }
        }
    }
}

fn default_language() -> String {
    "zh-CN".to_string()
}

/// Pick `lang` from a name map, falling back to `en`, then empty.
///
/// A present-but-empty primary name falls through to `en` the same as a
/// missing one; sparsely localized database entries carry both shapes.
fn pick_name<'a>(names: &'a HashMap<String, String>, lang: &str) -> Option<&'a str> {
    names
        .get(lang)
        .filter(|s| !s.is_empty())
        .or_else(|| names.get("en").filter(|s| !s.is_empty()))
        .map(String::as_str)
}

/// Hyphen-join country, first subdivision, and city, skipping unresolved
/// parts.
pub fn format_location(names: &GeoNames, lang: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if let Some(country) = pick_name(&names.country, lang) {
        parts.push(country);
    }
    if let Some(subdivision) = names.subdivisions.first().and_then(|s| pick_name(s, lang)) {
        parts.push(subdivision);
    }
    if let Some(city) = pick_name(&names.city, lang) {
        parts.push(city);
    }
    parts.join("-")
}

/// RFC1918, loopback, and link-local v4 ranges plus v6 loopback, ULA, and
/// link-local.
fn private_ranges() -> &'static [IpNet] {
    static RANGES: OnceLock<Vec<IpNet>> = OnceLock::new();
    RANGES.get_or_init(|| {
        [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "127.0.0.0/8",
            "169.254.0.0/16",
            "::1/128",
            "fc00::/7",
            "fe80::/10",
        ]
        .iter()
        .filter_map(|block| block.parse().ok())
        .collect()
    })
}

/// True for addresses that never leave the host's network.
pub fn is_private_ip(ip: &str) -> bool {
    let Ok(parsed) = ip.parse::<IpAddr>() else {
        return false;
    };
    private_ranges().iter().any(|net| net.contains(&parsed))
}
