// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Host hardening checks: login users, SSH daemon policy, access control,
//! automatic updates, fail2ban.

use async_trait::async_trait;
use tracing::debug;

use super::{downgrade, Check};
use crate::context::AuditContext;
use crate::error::ExecError;
use crate::evidence::file_evidence;
use crate::exec::command_available;
use crate::parsers::{is_login_shell, parse_passwd};
use crate::report::{CheckDetail, CheckResult, RiskLevel, Status};

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// `non_root_user`: at least one non-root account must be able to log in,
/// so day-to-day access does not have to happen as root.
pub struct NonRootUser;

#[async_trait]
impl Check for NonRootUser {
    fn category(&self) -> &'static str {
        "non_root_user"
    }

    async fn run(&self, _ctx: &AuditContext) -> CheckResult {
        let content = match std::fs::read_to_string("/etc/passwd") {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "cannot read /etc/passwd");
                return CheckResult::new(self.category(), Status::Skip, "cannot read /etc/passwd");
            }
        };

        let users = non_root_login_users(&content);
        if users.is_empty() {
            let detail = CheckDetail::new(
                "login_users",
                Status::Warn,
                "root is the only account that can log in",
            );
            CheckResult::with_details(self.category(), "no non-root login user found", vec![detail])
        } else {
            let shown: Vec<&str> = users.iter().take(5).map(String::as_str).collect();
            let detail = CheckDetail::new(
                "login_users",
                Status::Pass,
                &format!("{} non-root login user(s): {}", users.len(), shown.join(", ")),
            );
            CheckResult::with_details(self.category(), "non-root login users present", vec![detail])
        }
    }
}

/// Names of regular accounts (uid ≥ 1000, real shell, not `nobody`).
pub fn non_root_login_users(passwd: &str) -> Vec<String> {
    parse_passwd(passwd)
        .into_iter()
        .filter(|e| e.uid >= 1000 && e.uid < 65534 && is_login_shell(&e.shell))
        .map(|e| e.name)
        .collect()
}

/// `ssh_security`: sshd_config policy — root login, password authentication,
/// default port.
pub struct SshSecurity;

#[async_trait]
impl Check for SshSecurity {
    fn category(&self) -> &'static str {
        "ssh_security"
    }

    async fn run(&self, _ctx: &AuditContext) -> CheckResult {
        match std::fs::read_to_string(SSHD_CONFIG) {
            Ok(content) => {
                let details = evaluate_sshd_config(&content);
                let issues = details.iter().filter(|d| d.status != Status::Pass).count();
                let message = if issues == 0 {
                    "sshd configuration hardened".to_string()
                } else {
                    format!("{issues} sshd configuration issue(s)")
                };
                CheckResult::with_details(self.category(), &message, details)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                CheckResult::new(self.category(), Status::Skip, "sshd_config not found")
            }
            Err(e) => {
                debug!(error = %e, "cannot read sshd_config");
                CheckResult::new(self.category(), Status::Skip, "cannot read sshd_config")
            }
        }
    }
}

/// Effective sshd directives: first non-comment occurrence wins, keys are
/// case-insensitive (sshd semantics).
fn effective_directive<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let (Some(k), Some(v)) = (parts.next(), parts.next()) else {
            continue;
        };
        if k.eq_ignore_ascii_case(key) {
            return Some(v.trim());
        }
    }
    None
}

/// Classify an sshd_config into details.
///
/// `PermitRootLogin yes` and password authentication without key enforcement
/// are failures; the default port 22 is a warning only.
pub fn evaluate_sshd_config(content: &str) -> Vec<CheckDetail> {
    let mut details = Vec::new();

    let permit_root = effective_directive(content, "PermitRootLogin");
    match permit_root {
        Some("yes") => details.push(CheckDetail::with_evidence(
            "permit_root_login",
            Status::Fail,
            "PermitRootLogin is enabled",
            file_evidence(SSHD_CONFIG, RiskLevel::High),
        )),
        Some("no") => details.push(CheckDetail::new(
            "permit_root_login",
            Status::Pass,
            "root login disabled",
        )),
        Some(other) => details.push(CheckDetail::new(
            "permit_root_login",
            Status::Pass,
            &format!("root login restricted ({other})"),
        )),
        None => details.push(CheckDetail::new(
            "permit_root_login",
            Status::Pass,
            "PermitRootLogin not set (defaults to prohibit-password)",
        )),
    }

    let password_auth = effective_directive(content, "PasswordAuthentication");
    let auth_methods = effective_directive(content, "AuthenticationMethods").unwrap_or("");
    let key_enforced = auth_methods.contains("publickey");
    match password_auth {
        Some("no") => details.push(CheckDetail::new(
            "password_authentication",
            Status::Pass,
            "password authentication disabled, key-only access",
        )),
        Some("yes") if key_enforced => details.push(CheckDetail::new(
            "password_authentication",
            Status::Warn,
            "passwords permitted but AuthenticationMethods requires a key",
        )),
        Some("yes") => details.push(CheckDetail::with_evidence(
            "password_authentication",
            Status::Fail,
            "password authentication enabled with no key enforcement",
            file_evidence(SSHD_CONFIG, RiskLevel::High),
        )),
        Some(other) => details.push(CheckDetail::new(
            "password_authentication",
            Status::Warn,
            &format!("unrecognized PasswordAuthentication value: {other}"),
        )),
        None => details.push(CheckDetail::new(
            "password_authentication",
            Status::Warn,
            "PasswordAuthentication not set (most distros default to yes)",
        )),
    }

    match effective_directive(content, "Port") {
        None | Some("22") => details.push(CheckDetail::new(
            "port",
            Status::Warn,
            "sshd listens on the default port 22",
        )),
        Some(port) => details.push(CheckDetail::new(
            "port",
            Status::Pass,
            &format!("sshd listens on non-default port {port}"),
        )),
    }

    details
}

/// `access_control`: SSH user allow/deny lists and TCP wrapper rules.
pub struct AccessControl;

#[async_trait]
impl Check for AccessControl {
    fn category(&self) -> &'static str {
        "access_control"
    }

    async fn run(&self, _ctx: &AuditContext) -> CheckResult {
        let sshd = std::fs::read_to_string(SSHD_CONFIG).ok();
        let hosts_allow = std::fs::read_to_string("/etc/hosts.allow").ok();
        let hosts_deny = std::fs::read_to_string("/etc/hosts.deny").ok();

        if sshd.is_none() && hosts_allow.is_none() && hosts_deny.is_none() {
            return CheckResult::new(
                self.category(),
                Status::Skip,
                "no access control sources readable",
            );
        }

        let details = evaluate_access_control(sshd.as_deref(), hosts_allow.as_deref(), hosts_deny.as_deref());
        CheckResult::with_details(self.category(), "access control reviewed", details)
    }
}

fn has_rule_lines(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .any(|l| !l.is_empty() && !l.starts_with('#'))
}

pub fn evaluate_access_control(
    sshd: Option<&str>,
    hosts_allow: Option<&str>,
    hosts_deny: Option<&str>,
) -> Vec<CheckDetail> {
    let mut details = Vec::new();

    if let Some(sshd) = sshd {
        let restricted = ["AllowUsers", "AllowGroups", "DenyUsers", "DenyGroups"]
            .iter()
            .any(|&key| effective_directive(sshd, key).is_some());
        if restricted {
            details.push(CheckDetail::new(
                "ssh_user_restriction",
                Status::Pass,
                "sshd restricts which users may log in",
            ));
        } else {
            details.push(CheckDetail::new(
                "ssh_user_restriction",
                Status::Warn,
                "sshd accepts logins from any account (no AllowUsers/AllowGroups)",
            ));
        }
    }

    let wrapper_rules = hosts_allow.map(has_rule_lines).unwrap_or(false)
        || hosts_deny.map(has_rule_lines).unwrap_or(false);
    if hosts_allow.is_some() || hosts_deny.is_some() {
        if wrapper_rules {
            details.push(CheckDetail::new(
                "tcp_wrappers",
                Status::Pass,
                "TCP wrapper rules configured",
            ));
        }
        // No rules in an existing hosts.allow/deny is the distro default;
        // not worth a finding on its own.
    }

    details
}

/// `unattended_upgrades`: automatic security updates via apt's
/// unattended-upgrades or dnf-automatic.
pub struct UnattendedUpgrades;

#[async_trait]
impl Check for UnattendedUpgrades {
    fn category(&self) -> &'static str {
        "unattended_upgrades"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if std::path::Path::new("/etc/apt").is_dir() {
            return self.check_apt(ctx).await;
        }
        if command_available("dnf") {
            return self.check_dnf(ctx).await;
        }
        CheckResult::new(self.category(), Status::Skip, "no supported package manager found")
    }
}

impl UnattendedUpgrades {
    async fn check_apt(&self, ctx: &AuditContext) -> CheckResult {
        if let Ok(content) = std::fs::read_to_string("/etc/apt/apt.conf.d/20auto-upgrades") {
            if apt_periodic_enabled(&content) {
                let detail = CheckDetail::new(
                    "apt_periodic",
                    Status::Pass,
                    "unattended-upgrades enabled via APT::Periodic",
                );
                return CheckResult::with_details(self.category(), "automatic updates enabled", vec![detail]);
            }
        }
        match ctx.executor.execute("systemctl", &["is-enabled", "unattended-upgrades"]).await {
            Ok(out) if out.trim() == "enabled" => {
                let detail = CheckDetail::new(
                    "service",
                    Status::Pass,
                    "unattended-upgrades service enabled",
                );
                CheckResult::with_details(self.category(), "automatic updates enabled", vec![detail])
            }
            Ok(_) | Err(ExecError::NonZeroExit { .. }) => {
                let detail = CheckDetail::new(
                    "service",
                    Status::Warn,
                    "automatic security updates are not enabled",
                );
                CheckResult::with_details(self.category(), "automatic updates disabled", vec![detail])
            }
            Err(e) => downgrade(self.category(), &e),
        }
    }

    async fn check_dnf(&self, ctx: &AuditContext) -> CheckResult {
        match ctx.executor.execute("systemctl", &["is-enabled", "dnf-automatic.timer"]).await {
            Ok(out) if out.trim() == "enabled" => {
                let detail = CheckDetail::new("timer", Status::Pass, "dnf-automatic timer enabled");
                CheckResult::with_details(self.category(), "automatic updates enabled", vec![detail])
            }
            Ok(_) | Err(ExecError::NonZeroExit { .. }) => {
                let detail = CheckDetail::new(
                    "timer",
                    Status::Warn,
                    "dnf-automatic timer is not enabled",
                );
                CheckResult::with_details(self.category(), "automatic updates disabled", vec![detail])
            }
            Err(e) => downgrade(self.category(), &e),
        }
    }
}

/// True when APT::Periodic turns the daily unattended upgrade on.
pub fn apt_periodic_enabled(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        line.starts_with("APT::Periodic::Unattended-Upgrade") && line.contains("\"1\"")
    })
}

/// `fail2ban`: service present, running, and at least one jail enabled.
pub struct Fail2ban;

#[async_trait]
impl Check for Fail2ban {
    fn category(&self) -> &'static str {
        "fail2ban"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("fail2ban-client") {
            return CheckResult::new(self.category(), Status::Skip, "fail2ban not installed");
        }

        match ctx.executor.execute("fail2ban-client", &["status"]).await {
            Ok(output) => {
                let jails = parse_jail_list(&output);
                if jails.is_empty() {
                    let detail = CheckDetail::new(
                        "jails",
                        Status::Warn,
                        "fail2ban is running but no jails are enabled",
                    );
                    CheckResult::with_details(self.category(), "no jails enabled", vec![detail])
                } else {
                    let detail = CheckDetail::new(
                        "jails",
                        Status::Pass,
                        &format!("{} jail(s) enabled: {}", jails.len(), jails.join(", ")),
                    );
                    CheckResult::with_details(self.category(), "fail2ban active", vec![detail])
                }
            }
            Err(ExecError::NonZeroExit { .. }) | Err(ExecError::Io(..)) => {
                let detail = CheckDetail::new(
                    "service",
                    Status::Warn,
                    "fail2ban is installed but the server is not running",
                );
                CheckResult::with_details(self.category(), "fail2ban not running", vec![detail])
            }
            Err(e) => downgrade(self.category(), &e),
        }
    }
}

/// Jail names from `fail2ban-client status` output.
pub fn parse_jail_list(output: &str) -> Vec<String> {
    output
        .lines()
        .find(|l| l.contains("Jail list:"))
        .and_then(|l| l.split("Jail list:").nth(1))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|j| !j.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sshd_root_and_password_enabled_fails_twice() {
        let content = "PermitRootLogin yes\nPasswordAuthentication yes\nPort 22\n";
        let details = evaluate_sshd_config(content);
        let fails: Vec<&CheckDetail> = details.iter().filter(|d| d.status == Status::Fail).collect();
        assert_eq!(fails.len(), 2);
        assert!(fails.iter().any(|d| d.name == "permit_root_login"));
        assert!(fails.iter().any(|d| d.name == "password_authentication"));
        // Port 22 is a warning, not a failure.
        let port = details.iter().find(|d| d.name == "port").unwrap();
        assert_eq!(port.status, Status::Warn);
    }

    #[test]
    fn test_sshd_hardened_passes() {
        let content = "PermitRootLogin no\nPasswordAuthentication no\nPort 2222\n";
        let details = evaluate_sshd_config(content);
        assert!(details.iter().all(|d| d.status == Status::Pass));
    }

    #[test]
    fn test_sshd_prohibit_password_passes() {
        let content = "PermitRootLogin prohibit-password\nPasswordAuthentication no\nPort 2222\n";
        let details = evaluate_sshd_config(content);
        let root = details.iter().find(|d| d.name == "permit_root_login").unwrap();
        assert_eq!(root.status, Status::Pass);
    }

    #[test]
    fn test_sshd_comments_ignored() {
        let content = "#PermitRootLogin yes\nPermitRootLogin no\nPasswordAuthentication no\n";
        let details = evaluate_sshd_config(content);
        let root = details.iter().find(|d| d.name == "permit_root_login").unwrap();
        assert_eq!(root.status, Status::Pass);
    }

    #[test]
    fn test_sshd_first_directive_wins() {
        let content = "PermitRootLogin no\nPermitRootLogin yes\n";
        let details = evaluate_sshd_config(content);
        let root = details.iter().find(|d| d.name == "permit_root_login").unwrap();
        assert_eq!(root.status, Status::Pass);
    }

    #[test]
    fn test_sshd_password_with_key_enforcement_warns() {
        let content = "PasswordAuthentication yes\nAuthenticationMethods publickey,password\n";
        let details = evaluate_sshd_config(content);
        let password = details.iter().find(|d| d.name == "password_authentication").unwrap();
        assert_eq!(password.status, Status::Warn);
    }

    #[test]
    fn test_sshd_fail_details_carry_evidence() {
        let content = "PermitRootLogin yes\n";
        let details = evaluate_sshd_config(content);
        let root = details.iter().find(|d| d.name == "permit_root_login").unwrap();
        let evidence = root.evidence.as_ref().unwrap();
        assert_eq!(evidence.file_path.as_deref(), Some(SSHD_CONFIG));
        assert_eq!(evidence.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_non_root_login_users() {
        let passwd = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
alice:x:1000:1000::/home/alice:/bin/bash
bob:x:1001:1001::/home/bob:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
";
        assert_eq!(non_root_login_users(passwd), vec!["alice"]);
    }

    #[test]
    fn test_access_control_no_restrictions_warns() {
        let details = evaluate_access_control(Some("Port 22\n"), None, None);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Warn);
    }

    #[test]
    fn test_access_control_allow_users_passes() {
        let details = evaluate_access_control(Some("AllowUsers alice bob\n"), None, None);
        assert_eq!(details[0].status, Status::Pass);
    }

    #[test]
    fn test_access_control_wrapper_rules_pass() {
        let details = evaluate_access_control(
            Some("AllowUsers alice\n"),
            Some("sshd: 192.0.2.\n"),
            Some("ALL: ALL\n"),
        );
        assert!(details.iter().any(|d| d.name == "tcp_wrappers" && d.status == Status::Pass));
    }

    #[test]
    fn test_apt_periodic_enabled() {
        let content = "APT::Periodic::Update-Package-Lists \"1\";\nAPT::Periodic::Unattended-Upgrade \"1\";\n";
        assert!(apt_periodic_enabled(content));
        assert!(!apt_periodic_enabled("APT::Periodic::Unattended-Upgrade \"0\";\n"));
        assert!(!apt_periodic_enabled(""));
    }

    #[test]
    fn test_parse_jail_list() {
        let output = "Status\n|- Number of jail:\t2\n`- Jail list:\tsshd, nginx-botsearch\n";
        assert_eq!(parse_jail_list(output), vec!["sshd", "nginx-botsearch"]);
    }

    #[test]
    fn test_parse_jail_list_empty() {
        let output = "Status\n|- Number of jail:\t0\n`- Jail list:\t\n";
        assert!(parse_jail_list(output).is_empty());
        assert!(parse_jail_list("garbage").is_empty());
    }
}
