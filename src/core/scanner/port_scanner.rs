// src/core/scanner/port_scanner.rs

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::knowledge_base::{is_risky_port, service_name};
use crate::core::models::{Finding, PortEntry, PortScanResult, PortStatus};

/// Runs a TCP connect scan of `ports` on `ip`.
///
/// At most `concurrency` connections are in flight at once and the output keeps the
/// order of `ports`. Without a resolved address nothing is scanned.
///
/// # Arguments
/// * `ip` - The resolved address of the target, if any.
/// * `ports` - Candidate ports, in reporting order.
/// * `connect_timeout` - Deadline for each connection attempt.
/// * `concurrency` - Maximum number of simultaneous attempts.
///
/// # Returns
/// A `PortScanResult` splitting open from closed or filtered ports, with findings.
pub async fn run_port_scan(
    ip: Option<IpAddr>,
    ports: &[u16],
    connect_timeout: Duration,
    concurrency: usize,
) -> PortScanResult {
    let Some(ip) = ip else {
        warn!("No resolved address, skipping port scan.");
        return PortScanResult {
            analysis: vec![Finding::warning(
                "DNS unresolved: port scan skipped because the host has no address",
            )],
            ..Default::default()
        };
    };

    info!(%ip, ports = ports.len(), concurrency, "Starting port scan.");

    let entries: Vec<PortEntry> = stream::iter(ports.iter().copied())
        .map(|port| check_port(ip, port, connect_timeout))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut results = PortScanResult {
        scanned: entries.len(),
        ..Default::default()
    };
    for entry in entries {
        if entry.status == PortStatus::Open {
            results.open_ports.push(entry);
        } else {
            results.closed_ports.push(entry);
        }
    }

    results.analysis = analyze_port_results(&results);
    info!(
        open = results.open_ports.len(),
        findings = %results.analysis.len(),
        "Port scan finished."
    );
    results
}

/// Classifies a single port: connected is open, refused is closed, anything else is filtered.
async fn check_port(ip: IpAddr, port: u16, connect_timeout: Duration) -> PortEntry {
    let addr = SocketAddr::new(ip, port);
    let status = match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => PortStatus::Open,
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortStatus::Closed,
        Ok(Err(e)) => {
            debug!(port, error = %e, "Connection attempt failed.");
            PortStatus::Filtered
        }
        Err(_) => PortStatus::Filtered,
    };
    debug!(port, %status, "Port checked.");

    PortEntry {
        port,
        service: service_name(port).to_string(),
        status,
    }
}

fn analyze_port_results(results: &PortScanResult) -> Vec<Finding> {
    let risky: Vec<&PortEntry> = results
        .open_ports
        .iter()
        .filter(|entry| is_risky_port(entry.port))
        .collect();

    if risky.is_empty() {
        return vec![Finding::success("No risky ports exposed")];
    }

    risky
        .into_iter()
        .map(|entry| {
            Finding::danger(format!(
                "Port {} ({}) is open to the internet",
                entry.port, entry.service
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FindingType;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_and_closed_ports_are_classified_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = probe.local_addr().unwrap().port();
        drop(probe);

        let results = run_port_scan(
            Some("127.0.0.1".parse().unwrap()),
            &[closed, open],
            Duration::from_secs(2),
            4,
        )
        .await;

        assert_eq!(results.scanned, 2);
        assert_eq!(results.open_ports.len(), 1);
        assert_eq!(results.open_ports[0].port, open);
        assert_eq!(results.closed_ports[0].port, closed);
        assert_eq!(results.closed_ports[0].status, PortStatus::Closed);
        assert_eq!(results.analysis[0].kind, FindingType::Success);
    }

    #[tokio::test]
    async fn missing_address_skips_scan() {
        let results = run_port_scan(None, &[22, 80], Duration::from_secs(1), 10).await;
        assert_eq!(results.scanned, 0);
        assert!(results.open_ports.is_empty());
        assert!(results.closed_ports.is_empty());
        assert_eq!(results.analysis.len(), 1);
        assert_eq!(results.analysis[0].kind, FindingType::Warning);
        assert!(results.analysis[0].message.contains("DNS unresolved"));
    }

    #[test]
    fn risky_open_ports_are_danger() {
        let results = PortScanResult {
            open_ports: vec![
                PortEntry { port: 443, service: "HTTPS".into(), status: PortStatus::Open },
                PortEntry { port: 3306, service: "MySQL".into(), status: PortStatus::Open },
            ],
            scanned: 2,
            ..Default::default()
        };
        let findings = analyze_port_results(&results);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingType::Danger);
        assert!(findings[0].message.contains("3306"));
    }
}
