// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Account and login-history checks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::Check;
use crate::collect::login as login_collect;
use crate::context::AuditContext;
use crate::evidence::{file_evidence, EvidenceBuilder};
use crate::exec::command_available;
use crate::parsers::{is_login_shell, now_ms, parse_passwd};
use crate::report::{CheckDetail, CheckResult, LoginAssets, LoginStatus, RiskLevel, Status};

/// System accounts that legitimately keep a shell.
const SHELL_ALLOWED_SYSTEM_ACCOUNTS: &[&str] = &["root", "sync"];

/// `system_accounts`: extra uid-0 accounts, system accounts with shells,
/// empty password fields.
pub struct SystemAccounts;

#[async_trait]
impl Check for SystemAccounts {
    fn category(&self) -> &'static str {
        "system_accounts"
    }

    async fn run(&self, _ctx: &AuditContext) -> CheckResult {
        let passwd = match std::fs::read_to_string("/etc/passwd") {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "cannot read /etc/passwd");
                return CheckResult::new(self.category(), Status::Skip, "cannot read /etc/passwd");
            }
        };

        let mut details = evaluate_passwd_accounts(&passwd);

        match std::fs::read_to_string("/etc/shadow") {
            Ok(shadow) => details.extend(evaluate_shadow(&shadow)),
            // Normal without root; the metadata side is covered by the
            // file-integrity check.
            Err(e) => debug!(error = %e, "shadow not readable, skipping password-field audit"),
        }

        if details.is_empty() {
            CheckResult::new(self.category(), Status::Pass, "account database looks sane")
        } else {
            let message = format!("{} account finding(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// uid-0 duplicates and shell-bearing system accounts.
pub fn evaluate_passwd_accounts(passwd: &str) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for entry in parse_passwd(passwd) {
        if entry.uid == 0 && entry.name != "root" {
            details.push(CheckDetail::with_evidence(
                &format!("uid0:{}", entry.name),
                Status::Fail,
                &format!("account {} has uid 0", entry.name),
                file_evidence("/etc/passwd", RiskLevel::High),
            ));
        } else if entry.uid > 0
            && entry.uid < 1000
            && is_login_shell(&entry.shell)
            && !SHELL_ALLOWED_SYSTEM_ACCOUNTS.contains(&entry.name.as_str())
        {
            details.push(CheckDetail::new(
                &format!("system_shell:{}", entry.name),
                Status::Warn,
                &format!("system account {} has login shell {}", entry.name, entry.shell),
            ));
        }
    }
    details
}

/// Accounts whose shadow password field is empty (passwordless login).
pub fn evaluate_shadow(shadow: &str) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for line in shadow.lines() {
        let mut fields = line.split(':');
        let (Some(user), Some(password)) = (fields.next(), fields.next()) else {
            continue;
        };
        if password.is_empty() {
            details.push(CheckDetail::with_evidence(
                &format!("empty_password:{user}"),
                Status::Fail,
                &format!("account {user} has an empty password field"),
                file_evidence("/etc/shadow", RiskLevel::High),
            ));
        }
    }
    details
}

/// `login_history`: brute-force pressure and out-of-region successful
/// logins, computed over the login asset inventory.
pub struct LoginHistory;

#[async_trait]
impl Check for LoginHistory {
    fn category(&self) -> &'static str {
        "login_history"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        let sources_available = command_available("last")
            || command_available("lastb")
            || command_available("w")
            || Path::new("/var/log/auth.log").exists()
            || Path::new("/var/log/secure").exists();
        if !sources_available {
            return CheckResult::new(self.category(), Status::Skip, "no login history sources available");
        }

        let assets = login_collect::collect(ctx).await;
        let details = evaluate_login_history(
            &assets,
            ctx.config.login.failed_threshold_24h,
            now_ms(),
            &|ip| ctx.geoip.lookup(ip),
            &ctx.config.geoip.allowed_locations,
        );

        if details.is_empty() {
            let message = format!(
                "{} successful / {} failed login(s), no anomalies",
                assets.statistics.total_logins, assets.statistics.failed_logins
            );
            CheckResult::new(self.category(), Status::Pass, &message)
        } else {
            let message = format!("{} login anomaly(ies)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// Classify collected login assets.
///
/// Any single IP with more than `failed_threshold` failures in the last 24h
/// is a warning; a successful login whose resolved location is outside the
/// allow-list is a failure. An empty allow-list disables the location rule.
pub fn evaluate_login_history(
    assets: &LoginAssets,
    failed_threshold: usize,
    now_ms: i64,
    lookup: &dyn Fn(&str) -> String,
    allowed_locations: &[String],
) -> Vec<CheckDetail> {
    let mut details = Vec::new();

    let cutoff = now_ms - 24 * 3600 * 1000;
    let mut failures_per_ip: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &assets.failed_logins {
        if record.timestamp >= cutoff {
            *failures_per_ip.entry(record.ip.as_str()).or_insert(0) += 1;
        }
    }
    for (ip, count) in failures_per_ip {
        if count > failed_threshold {
            let risk = if count > failed_threshold * 10 { RiskLevel::High } else { RiskLevel::Medium };
            let evidence = EvidenceBuilder::new(risk)
                .network_conn(ip.to_string())
                .timestamp(now_ms)
                .build();
            details.push(CheckDetail {
                name: format!("brute_force:{ip}"),
                status: Status::Warn,
                message: format!("{count} failed logins from {ip} in the last 24h"),
                evidence,
            });
        }
    }

    if !allowed_locations.is_empty() {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for record in &assets.successful_logins {
            if record.status != LoginStatus::Success {
                continue;
            }
            let ip = record.ip.as_str();
            if ip == "localhost" || ip == "unknown" || !seen.insert(ip) {
                continue;
            }
            let location = lookup(ip);
            if location.is_empty() || location == "内网IP" {
                continue;
            }
            if allowed_locations.iter().any(|allowed| location.contains(allowed.as_str())) {
                continue;
            }
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .network_conn(ip.to_string())
                .timestamp(record.timestamp)
                .build();
            details.push(CheckDetail {
                name: format!("geo:{ip}"),
                status: Status::Fail,
                message: format!("successful login from {ip} ({location}) outside allowed locations"),
                evidence,
            });
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{LoginRecord, LoginStatistics};

    #[test]
    fn test_passwd_duplicate_uid0_fails() {
        let passwd = "\
root:x:0:0:root:/root:/bin/bash
toor:x:0:0::/root:/bin/bash
alice:x:1000:1000::/home/alice:/bin/bash
";
        let details = evaluate_passwd_accounts(passwd);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].name, "uid0:toor");
        assert_eq!(details[0].status, Status::Fail);
    }

    #[test]
    fn test_passwd_system_account_shell_warns() {
        let passwd = "\
root:x:0:0:root:/root:/bin/bash
www-data:x:33:33:www-data:/var/www:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
";
        let details = evaluate_passwd_accounts(passwd);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].name, "system_shell:www-data");
        assert_eq!(details[0].status, Status::Warn);
    }

    #[test]
    fn test_shadow_empty_password_fails() {
        let shadow = "\
root:$6$salt$hash:19700:0:99999:7:::
backdoor::19700:0:99999:7:::
daemon:*:19700:0:99999:7:::
";
        let details = evaluate_shadow(shadow);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].name, "empty_password:backdoor");
        assert_eq!(details[0].status, Status::Fail);
    }

    fn record(ip: &str, status: LoginStatus, timestamp: i64) -> LoginRecord {
        LoginRecord {
            username: "root".to_string(),
            terminal: "ssh".to_string(),
            ip: ip.to_string(),
            timestamp,
            status,
            timestamp_inferred: false,
        }
    }

    fn assets_with(failed: Vec<LoginRecord>, successful: Vec<LoginRecord>) -> LoginAssets {
        LoginAssets {
            successful_logins: successful,
            failed_logins: failed,
            current_sessions: vec![],
            statistics: LoginStatistics::default(),
        }
    }

    #[test]
    fn test_brute_force_over_threshold_warns() {
        let now = 1_700_000_000_000;
        let failed: Vec<LoginRecord> = (0..60)
            .map(|_| record("198.51.100.7", LoginStatus::Failed, now - 1000))
            .collect();
        let assets = assets_with(failed, vec![]);
        let details = evaluate_login_history(&assets, 50, now, &|_| String::new(), &[]);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].name, "brute_force:198.51.100.7");
        assert_eq!(details[0].status, Status::Warn);
    }

    #[test]
    fn test_brute_force_old_failures_ignored() {
        let now = 1_700_000_000_000;
        let two_days_ago = now - 2 * 24 * 3600 * 1000;
        let failed: Vec<LoginRecord> = (0..60)
            .map(|_| record("198.51.100.7", LoginStatus::Failed, two_days_ago))
            .collect();
        let assets = assets_with(failed, vec![]);
        let details = evaluate_login_history(&assets, 50, now, &|_| String::new(), &[]);
        assert!(details.is_empty());
    }

    #[test]
    fn test_brute_force_at_threshold_quiet() {
        let now = 1_700_000_000_000;
        let failed: Vec<LoginRecord> = (0..50)
            .map(|_| record("198.51.100.7", LoginStatus::Failed, now - 1000))
            .collect();
        let assets = assets_with(failed, vec![]);
        // Exactly the threshold is not "more than".
        let details = evaluate_login_history(&assets, 50, now, &|_| String::new(), &[]);
        assert!(details.is_empty());
    }

    #[test]
    fn test_geo_outside_allow_list_fails() {
        let now = 1_700_000_000_000;
        let assets = assets_with(vec![], vec![record("203.0.113.5", LoginStatus::Success, now)]);
        let lookup = |_: &str| "美国-加利福尼亚州-洛杉矶".to_string();
        let allowed = vec!["中国".to_string()];
        let details = evaluate_login_history(&assets, 50, now, &lookup, &allowed);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Fail);
        assert_eq!(details[0].name, "geo:203.0.113.5");
        assert_eq!(details[0].evidence.as_ref().unwrap().risk_level, RiskLevel::High);
    }

    #[test]
    fn test_geo_allowed_location_quiet() {
        let now = 1_700_000_000_000;
        let assets = assets_with(vec![], vec![record("203.0.113.5", LoginStatus::Success, now)]);
        let lookup = |_: &str| "中国-北京-北京".to_string();
        let allowed = vec!["中国".to_string()];
        assert!(evaluate_login_history(&assets, 50, now, &lookup, &allowed).is_empty());
    }

    #[test]
    fn test_geo_private_and_localhost_quiet() {
        let now = 1_700_000_000_000;
        let assets = assets_with(
            vec![],
            vec![
                record("localhost", LoginStatus::Success, now),
                record("10.0.0.8", LoginStatus::Success, now),
            ],
        );
        let lookup = |ip: &str| if ip == "10.0.0.8" { "内网IP".to_string() } else { String::new() };
        let allowed = vec!["中国".to_string()];
        assert!(evaluate_login_history(&assets, 50, now, &lookup, &allowed).is_empty());
    }

    #[test]
    fn test_geo_disabled_without_allow_list() {
        let now = 1_700_000_000_000;
        let assets = assets_with(vec![], vec![record("203.0.113.5", LoginStatus::Success, now)]);
        let lookup = |_: &str| "美国".to_string();
        assert!(evaluate_login_history(&assets, 50, now, &lookup, &[]).is_empty());
    }
}
