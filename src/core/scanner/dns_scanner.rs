// src/core/scanner/dns_scanner.rs

use std::fmt::Display;
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use tokio::time::{self, error::Elapsed};
use tracing::{debug, info, warn};

use crate::core::models::{DnsRecordSet, Finding};

/// Maximum number of MX, NS and TXT values kept per record type.
const MAX_RECORDS: usize = 5;
/// TXT values are cut to this many characters.
const MAX_TXT_LEN: usize = 100;

/// Runs the DNS exposure scan for a target.
///
/// Address and TXT records are queried for the host itself, MX and NS records for the
/// registered domain. Every query is independent: a failing or slow query yields an
/// empty list for its record type and never affects the others. An IP-literal host is
/// reported as its own address record and no queries are sent.
///
/// # Arguments
/// * `host` - The full host name of the target.
/// * `domain` - The registered domain the host belongs to.
/// * `timeout` - Deadline for each individual query.
///
/// # Returns
/// A `DnsRecordSet` holding the records found and the analysis findings.
pub async fn run_dns_scan(host: &str, domain: &str, timeout: Duration) -> DnsRecordSet {
    info!(host, domain, "Starting DNS scan.");

    if let Ok(ip) = host.parse::<IpAddr>() {
        return literal_address(ip);
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

    let (a, aaaa, mx, ns, txt) = tokio::join!(
        time::timeout(timeout, resolver.ipv4_lookup(host)),
        time::timeout(timeout, resolver.ipv6_lookup(host)),
        time::timeout(timeout, resolver.mx_lookup(domain)),
        time::timeout(timeout, resolver.ns_lookup(domain)),
        time::timeout(timeout, resolver.txt_lookup(host)),
    );

    debug!("All DNS lookups completed, starting analysis.");

    let mut results = DnsRecordSet {
        a_records: settle("A", host, a)
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect())
            .unwrap_or_default(),
        aaaa_records: settle("AAAA", host, aaaa)
            .map(|lookup| lookup.iter().map(|r| r.to_string()).collect())
            .unwrap_or_default(),
        mx_records: settle("MX", domain, mx)
            .map(|lookup| capped(lookup.iter().map(|mx| mx.exchange())))
            .unwrap_or_default(),
        ns_records: settle("NS", domain, ns)
            .map(|lookup| capped(lookup.iter()))
            .unwrap_or_default(),
        txt_records: settle("TXT", host, txt)
            .map(|lookup| {
                lookup
                    .iter()
                    .take(MAX_RECORDS)
                    .map(|r| r.to_string().chars().take(MAX_TXT_LEN).collect())
                    .collect()
            })
            .unwrap_or_default(),
        analysis: Vec::new(),
    };

    results.analysis = analyze_dns_results(&results);
    info!(findings = %results.analysis.len(), "DNS scan finished.");
    results
}

fn literal_address(ip: IpAddr) -> DnsRecordSet {
    debug!(%ip, "Host is an IP literal, skipping name lookups.");
    let mut results = DnsRecordSet::default();
    match ip {
        IpAddr::V4(_) => results.a_records.push(ip.to_string()),
        IpAddr::V6(_) => results.aaaa_records.push(ip.to_string()),
    }
    results.analysis = vec![Finding::info(
        "Target is an IP address; MX, NS and TXT records were not queried",
    )];
    info!(findings = %results.analysis.len(), "DNS scan finished.");
    results
}

/// Unwraps a timed lookup, logging why it produced nothing.
fn settle<T>(
    record_type: &str,
    name: &str,
    outcome: Result<Result<T, ResolveError>, Elapsed>,
) -> Option<T> {
    match outcome {
        Ok(Ok(lookup)) => {
            debug!(record_type, name, "Lookup succeeded.");
            Some(lookup)
        }
        Ok(Err(e)) => {
            if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                debug!(record_type, name, "No records found.");
            } else {
                warn!(record_type, name, error = %e, "DNS lookup failed.");
            }
            None
        }
        Err(_) => {
            warn!(record_type, name, "DNS lookup timed out.");
            None
        }
    }
}

/// Renders host names without their trailing root dot, keeping at most `MAX_RECORDS`.
fn capped<T: Display>(names: impl Iterator<Item = T>) -> Vec<String> {
    names
        .take(MAX_RECORDS)
        .map(|name| name.to_string().trim_end_matches('.').to_string())
        .collect()
}

/// Analyzes the collected DNS records and generates findings.
fn analyze_dns_results(results: &DnsRecordSet) -> Vec<Finding> {
    let mut analyses = Vec::new();

    if results.a_records.is_empty() && results.aaaa_records.is_empty() {
        debug!("DNS analysis: no address records, adding warning.");
        analyses.push(Finding::warning("DNS unresolved: no A or AAAA records found"));
    }

    if results.mx_records.is_empty() {
        debug!("DNS analysis: no MX records, adding info finding.");
        analyses.push(Finding::info("No MX records found; the domain does not receive email"));
    }

    analyses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FindingType;

    #[test]
    fn capped_strips_root_dot_and_limits() {
        let names = ["a.example.com.", "b.example.com.", "c.", "d.", "e.", "f."];
        let out = capped(names.iter());
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], "a.example.com");
        assert_eq!(out[2], "c");
    }

    #[test]
    fn empty_record_set_is_flagged() {
        let findings = analyze_dns_results(&DnsRecordSet::default());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, FindingType::Warning);
        assert_eq!(findings[1].kind, FindingType::Info);
    }

    #[test]
    fn healthy_record_set_has_no_findings() {
        let records = DnsRecordSet {
            a_records: vec!["93.184.216.34".into()],
            mx_records: vec!["mail.example.com".into()],
            ..Default::default()
        };
        assert!(analyze_dns_results(&records).is_empty());
    }

    #[tokio::test]
    async fn ip_literal_is_its_own_address_record() {
        let v4 = run_dns_scan("127.0.0.1", "127.0.0.1", Duration::from_secs(2)).await;
        assert_eq!(v4.a_records, vec!["127.0.0.1".to_string()]);
        assert!(v4.aaaa_records.is_empty());
        assert!(v4.mx_records.is_empty());
        assert_eq!(v4.analysis.len(), 1);
        assert_eq!(v4.analysis[0].kind, FindingType::Info);

        let v6 = run_dns_scan("::1", "::1", Duration::from_secs(2)).await;
        assert!(v6.a_records.is_empty());
        assert_eq!(v6.aaaa_records, vec!["::1".to_string()]);
        assert!(v6.analysis.iter().all(|f| f.kind != FindingType::Warning));
    }
}
