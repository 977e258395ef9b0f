// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Network-facing checks: UFW state, risky listeners, listener summary,
//! established connections.

use async_trait::async_trait;
use tracing::debug;

use super::{downgrade, Check};
use crate::collect::ports::{self, is_wildcard_address};
use crate::context::AuditContext;
use crate::evidence::EvidenceBuilder;
use crate::exec::command_available;
use crate::report::{CheckDetail, CheckResult, ListeningPort, RiskLevel, Status};

/// `ufw_security`: pass if the firewall is active, fail if inactive, skip if
/// ufw is not installed.
pub struct UfwSecurity;

#[async_trait]
impl Check for UfwSecurity {
    fn category(&self) -> &'static str {
        "ufw_security"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("ufw") {
            return CheckResult::new(self.category(), Status::Skip, "ufw not available");
        }
        match ctx.executor.execute("ufw", &["status", "verbose"]).await {
            Ok(output) => {
                let detail = evaluate_ufw_status(&output);
                let message = detail.message.clone();
                CheckResult::with_details(self.category(), &message, vec![detail])
            }
            Err(e) => downgrade(self.category(), &e),
        }
    }
}

/// Classify `ufw status verbose` output.
pub fn evaluate_ufw_status(output: &str) -> CheckDetail {
    if !output.contains("Status: active") {
        return CheckDetail::new("firewall_state", Status::Fail, "UFW firewall is inactive");
    }
    // Rules follow the `--` header separator.
    let rule_count = output
        .lines()
        .skip_while(|l| !l.starts_with("--"))
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count();
    if rule_count == 0 {
        CheckDetail::new("firewall_state", Status::Warn, "firewall active but no rules defined")
    } else {
        CheckDetail::new(
            "firewall_state",
            Status::Pass,
            &format!("firewall active with {rule_count} rule(s)"),
        )
    }
}

/// Plaintext remote-access services; any listener here is a failure.
const PLAINTEXT_SERVICES: &[(u16, &str)] = &[
    (21, "ftp"),
    (23, "telnet"),
    (69, "tftp"),
    (512, "rexec"),
    (513, "rlogin"),
    (514, "rsh"),
];

/// Datastores that should never face the network unauthenticated; wildcard
/// binds are warnings.
const DATASTORE_SERVICES: &[(u16, &str)] = &[
    (3306, "mysql"),
    (5432, "postgresql"),
    (6379, "redis"),
    (9200, "elasticsearch"),
    (11211, "memcached"),
    (27017, "mongodb"),
];

/// `port_security`: flag plaintext remote-access services and wildcard-bound
/// datastores.
pub struct PortSecurity;

#[async_trait]
impl Check for PortSecurity {
    fn category(&self) -> &'static str {
        "port_security"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("ss") && !command_available("netstat") {
            return CheckResult::new(self.category(), Status::Skip, "ss/netstat not available");
        }
        let listeners = ports::collect(ctx).await;
        let details = classify_listeners(&listeners);
        if details.is_empty() {
            CheckResult::new(self.category(), Status::Pass, "no risky services listening")
        } else {
            let message = format!("{} risky listener(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

fn service_name(table: &[(u16, &'static str)], port: u16) -> Option<&'static str> {
    table.iter().find(|(p, _)| *p == port).map(|(_, name)| *name)
}

/// Risk-classify a listener table.
pub fn classify_listeners(listeners: &[ListeningPort]) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for listener in listeners {
        if let Some(name) = service_name(PLAINTEXT_SERVICES, listener.port) {
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .network_conn(listener.local_address.clone())
                .build();
            details.push(CheckDetail {
                name: format!("plaintext:{}", listener.port),
                status: Status::Fail,
                message: format!("{name} is listening on {}", listener.local_address),
                evidence,
            });
        } else if is_wildcard_address(&listener.local_address) {
            if let Some(name) = service_name(DATASTORE_SERVICES, listener.port) {
                let evidence = EvidenceBuilder::new(RiskLevel::Medium)
                    .network_conn(listener.local_address.clone())
                    .build();
                details.push(CheckDetail {
                    name: format!("exposed:{}", listener.port),
                    status: Status::Warn,
                    message: format!("{name} is bound to all interfaces on {}", listener.local_address),
                    evidence,
                });
            }
        }
    }
    details
}

/// Wildcard listeners beyond this many earn a warning from the summary
/// check.
const WILDCARD_LISTENER_THRESHOLD: usize = 12;

/// `listening_ports`: listener inventory summary.
pub struct ListeningPorts;

#[async_trait]
impl Check for ListeningPorts {
    fn category(&self) -> &'static str {
        "listening_ports"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        if !command_available("ss") && !command_available("netstat") {
            return CheckResult::new(self.category(), Status::Skip, "ss/netstat not available");
        }
        let listeners = ports::collect(ctx).await;
        let wildcard: Vec<&ListeningPort> = listeners
            .iter()
            .filter(|p| is_wildcard_address(&p.local_address))
            .collect();
        let message = format!(
            "{} listening socket(s), {} on all interfaces",
            listeners.len(),
            wildcard.len()
        );
        if wildcard.len() > WILDCARD_LISTENER_THRESHOLD {
            let lines = wildcard
                .iter()
                .take(10)
                .map(|p| match &p.process {
                    Some(proc) => format!("{} ({proc})", p.local_address),
                    None => p.local_address.clone(),
                })
                .collect();
            let evidence = EvidenceBuilder::new(RiskLevel::Low).process_tree(lines).build();
            let detail = CheckDetail {
                name: "wildcard_listeners".to_string(),
                status: Status::Warn,
                message: format!("{} services bound to all interfaces", wildcard.len()),
                evidence,
            };
            CheckResult::with_details(self.category(), &message, vec![detail])
        } else {
            CheckResult::new(self.category(), Status::Pass, &message)
        }
    }
}

/// Remote ports associated with C2/backdoor traffic.
const SUSPICIOUS_REMOTE_PORTS: &[u16] = &[1337, 4444, 6667, 6697, 31337];

/// Established connections beyond this many earn a warning.
const CONNECTION_COUNT_THRESHOLD: usize = 200;

/// `network_connections`: established traffic review.
pub struct NetworkConnections;

#[async_trait]
impl Check for NetworkConnections {
    fn category(&self) -> &'static str {
        "network_connections"
    }

    async fn run(&self, ctx: &AuditContext) -> CheckResult {
        let remotes = match ctx.executor.execute("ss", &["-tn"]).await {
            Ok(output) => parse_ss_established(&output),
            Err(e) => {
                debug!(error = %e, "ss unavailable, trying netstat");
                match ctx.executor.execute("netstat", &["-tn"]).await {
                    Ok(output) => parse_netstat_established(&output),
                    Err(e) => return downgrade(self.category(), &e),
                }
            }
        };

        let details = classify_connections(&remotes);
        if details.is_empty() {
            let message = format!("{} established connection(s), nothing unusual", remotes.len());
            CheckResult::new(self.category(), Status::Pass, &message)
        } else {
            let message = format!("{} suspicious connection finding(s)", details.len());
            CheckResult::with_details(self.category(), &message, details)
        }
    }
}

/// Remote `addr:port` fields of established sockets from `ss -tn`.
pub fn parse_ss_established(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 5 && fields[0] == "ESTAB" {
                Some(fields[4].to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Remote `addr:port` fields of established sockets from `netstat -tn`.
pub fn parse_netstat_established(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 6 && fields[0].starts_with("tcp") && fields[5] == "ESTABLISHED" {
                Some(fields[4].to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Flag connections to known C2 ports and an excessive total count.
pub fn classify_connections(remotes: &[String]) -> Vec<CheckDetail> {
    let mut details = Vec::new();
    for remote in remotes {
        let Some(port) = remote.rsplit_once(':').and_then(|(_, p)| p.parse::<u16>().ok()) else {
            continue;
        };
        if SUSPICIOUS_REMOTE_PORTS.contains(&port) {
            let evidence = EvidenceBuilder::new(RiskLevel::High)
                .network_conn(remote.clone())
                .build();
            details.push(CheckDetail {
                name: format!("c2_port:{remote}"),
                status: Status::Warn,
                message: format!("established connection to suspicious remote port: {remote}"),
                evidence,
            });
        }
    }
    if remotes.len() > CONNECTION_COUNT_THRESHOLD {
        details.push(CheckDetail::new(
            "connection_count",
            Status::Warn,
            &format!("{} established connections (threshold {CONNECTION_COUNT_THRESHOLD})", remotes.len()),
        ));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ufw_active_with_rules() {
        let output = "Status: active
Logging: on (low)
Default: deny (incoming), allow (outgoing), disabled (routed)

To                         Action      From
--                         ------      ----
22/tcp                     ALLOW IN    Anywhere
80/tcp                     ALLOW IN    Anywhere
";
        let detail = evaluate_ufw_status(output);
        assert_eq!(detail.status, Status::Pass);
        assert!(detail.message.contains("2 rule(s)"));
    }

    #[test]
    fn test_ufw_active_no_rules() {
        let output = "Status: active\n\nTo                         Action      From\n--                         ------      ----\n";
        let detail = evaluate_ufw_status(output);
        assert_eq!(detail.status, Status::Warn);
    }

    #[test]
    fn test_ufw_inactive_fails() {
        let detail = evaluate_ufw_status("Status: inactive\n");
        assert_eq!(detail.status, Status::Fail);
    }

    fn listener(port: u16, local: &str) -> ListeningPort {
        ListeningPort {
            protocol: "tcp".to_string(),
            local_address: local.to_string(),
            port,
            process: None,
        }
    }

    #[test]
    fn test_classify_telnet_fails() {
        let details = classify_listeners(&[listener(23, "0.0.0.0:23")]);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Fail);
        assert!(details[0].message.contains("telnet"));
        assert_eq!(
            details[0].evidence.as_ref().unwrap().network_conn.as_deref(),
            Some("0.0.0.0:23")
        );
    }

    #[test]
    fn test_classify_wildcard_redis_warns() {
        let details = classify_listeners(&[listener(6379, "0.0.0.0:6379")]);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Warn);
        assert!(details[0].message.contains("redis"));
    }

    #[test]
    fn test_classify_loopback_redis_ok() {
        let details = classify_listeners(&[listener(6379, "127.0.0.1:6379")]);
        assert!(details.is_empty());
    }

    #[test]
    fn test_classify_ssh_unflagged() {
        let details = classify_listeners(&[listener(22, "0.0.0.0:22")]);
        assert!(details.is_empty());
    }

    #[test]
    fn test_parse_ss_established() {
        let output = "\
State  Recv-Q Send-Q  Local Address:Port   Peer Address:Port Process
ESTAB  0      0          10.0.0.5:22      203.0.113.9:51515
ESTAB  0      36         10.0.0.5:443     198.51.100.2:40000
LISTEN 0      128         0.0.0.0:22          0.0.0.0:*
";
        let remotes = parse_ss_established(output);
        assert_eq!(remotes, vec!["203.0.113.9:51515", "198.51.100.2:40000"]);
    }

    #[test]
    fn test_parse_netstat_established() {
        let output = "\
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 10.0.0.5:22             203.0.113.9:51515       ESTABLISHED
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN
";
        let remotes = parse_netstat_established(output);
        assert_eq!(remotes, vec!["203.0.113.9:51515"]);
    }

    #[test]
    fn test_classify_connections_c2_port() {
        let remotes = vec!["203.0.113.9:4444".to_string(), "198.51.100.2:443".to_string()];
        let details = classify_connections(&remotes);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].status, Status::Warn);
        assert_eq!(details[0].evidence.as_ref().unwrap().risk_level, RiskLevel::High);
    }

    #[test]
    fn test_classify_connections_count_threshold() {
        let remotes: Vec<String> = (0..201).map(|i| format!("198.51.100.2:{}", 10000 + i)).collect();
        let details = classify_connections(&remotes);
        assert!(details.iter().any(|d| d.name == "connection_count"));
    }
}
