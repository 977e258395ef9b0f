// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Listening socket inventory via `ss`, falling back to `netstat`.

use tracing::debug;

use crate::context::AuditContext;
use crate::report::ListeningPort;

pub async fn collect(ctx: &AuditContext) -> Vec<ListeningPort> {
    match ctx.executor.execute("ss", &["-tlnp"]).await {
        Ok(output) => return parse_ss_output(&output),
        Err(e) => debug!(error = %e, "ss unavailable, trying netstat"),
    }
    match ctx.executor.execute("netstat", &["-tlnp"]).await {
        Ok(output) => parse_netstat_output(&output),
        Err(e) => {
            debug!(error = %e, "cannot enumerate listening ports");
            Vec::new()
        }
    }
}

/// Parse `ss -tlnp` output.
///
/// Columns: State Recv-Q Send-Q Local-Address:Port Peer-Address:Port
/// [Process]. The process column is absent without CAP_NET_ADMIN.
pub fn parse_ss_output(output: &str) -> Vec<ListeningPort> {
    let mut ports = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != "LISTEN" {
            continue;
        }
        let Some(port) = split_host_port(fields[3]) else {
            continue;
        };
        let process = fields.get(5).and_then(|f| extract_ss_process(f));
        ports.push(ListeningPort {
            protocol: "tcp".to_string(),
            local_address: fields[3].to_string(),
            port,
            process,
        });
    }
    ports
}

/// Parse `netstat -tlnp` output.
pub fn parse_netstat_output(output: &str) -> Vec<ListeningPort> {
    let mut ports = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 || !fields[0].starts_with("tcp") || fields[5] != "LISTEN" {
            continue;
        }
        let Some(port) = split_host_port(fields[3]) else {
            continue;
        };
        let process = fields
            .get(6)
            .and_then(|f| f.split_once('/'))
            .map(|(_, name)| name.to_string());
        ports.push(ListeningPort {
            protocol: "tcp".to_string(),
            local_address: fields[3].to_string(),
            port,
            process,
        });
    }
    ports
}

/// Port number from an `addr:port` field; handles `[::]:22` and `*:80`.
pub fn split_host_port(local: &str) -> Option<u16> {
    local.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}

/// True when the address half of a listener binds every interface.
pub fn is_wildcard_address(local: &str) -> bool {
    let Some((host, _)) = local.rsplit_once(':') else {
        return false;
    };
    matches!(host, "0.0.0.0" | "*" | "[::]" | "::")
}

fn extract_ss_process(field: &str) -> Option<String> {
    // users:(("sshd",pid=700,fd=3))
    let start = field.find("((\"")? + 3;
    let rest = &field[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SS_FIXTURE: &str = "\
State    Recv-Q   Send-Q     Local Address:Port       Peer Address:Port  Process
LISTEN   0        128              0.0.0.0:22              0.0.0.0:*      users:((\"sshd\",pid=700,fd=3))
LISTEN   0        511            127.0.0.1:6379            0.0.0.0:*      users:((\"redis-server\",pid=812,fd=6))
LISTEN   0        4096               [::]:80                  [::]:*
";

    #[test]
    fn test_parse_ss_output() {
        let ports = parse_ss_output(SS_FIXTURE);
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].port, 22);
        assert_eq!(ports[0].process.as_deref(), Some("sshd"));
        assert_eq!(ports[1].port, 6379);
        assert_eq!(ports[1].process.as_deref(), Some("redis-server"));
        assert_eq!(ports[2].port, 80);
        assert!(ports[2].process.is_none());
    }

    #[test]
    fn test_parse_netstat_output() {
        let output = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN      700/sshd
tcp6       0      0 :::80                   :::*                    LISTEN      812/nginx
";
        let ports = parse_netstat_output(output);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 22);
        assert_eq!(ports[0].process.as_deref(), Some("sshd"));
        assert_eq!(ports[1].port, 80);
        assert_eq!(ports[1].process.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(is_wildcard_address("0.0.0.0:22"));
        assert!(is_wildcard_address("[::]:80"));
        assert!(is_wildcard_address("*:443"));
        assert!(!is_wildcard_address("127.0.0.1:6379"));
        assert!(!is_wildcard_address("192.168.1.5:3306"));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("0.0.0.0:22"), Some(22));
        assert_eq!(split_host_port("[::]:8080"), Some(8080));
        assert_eq!(split_host_port("garbage"), None);
    }
}
