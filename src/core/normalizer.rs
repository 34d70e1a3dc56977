// src/core/normalizer.rs

//! Turns a raw user-supplied target into canonical URL components.
//!
//! Parsing is pure and synchronous; only the final address lookup touches the network,
//! and a failed lookup leaves `ip_address` empty rather than failing the request.

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::core::knowledge_base::MULTI_PART_SUFFIXES;
use crate::core::models::UrlComponents;
use crate::core::scanner::ProbeSet;
use crate::error::ScanError;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ftp"];

/// Parses `raw` and resolves its host through `probes`.
///
/// # Arguments
/// * `raw` - The target as typed by the user; a missing scheme defaults to https.
/// * `probes` - Supplies the address lookup.
/// * `timeout` - Upper bound on the lookup.
///
/// # Returns
/// The URL components, or a `ScanError` when the target is not a usable URL.
pub async fn normalize(
    raw: &str,
    probes: &dyn ProbeSet,
    timeout: Duration,
) -> Result<UrlComponents, ScanError> {
    let mut components = parse_target(raw)?;
    info!(host = %components.domain_name, "Target normalized.");

    match probes.resolve(&components.domain_name, timeout).await {
        Some(ip) => components.ip_address = ip.to_string(),
        None => warn!(host = %components.domain_name, "Host did not resolve."),
    }
    Ok(components)
}

/// Parses a raw target into URL components without any network access.
pub fn parse_target(raw: &str) -> Result<UrlComponents, ScanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScanError::EmptyInput);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| ScanError::InvalidUrl(e.to_string()))?;
    let scheme = url.scheme().to_string();
    if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
        return Err(ScanError::UnsupportedScheme(scheme));
    }

    let (host, is_ip) = match url.host() {
        Some(Host::Domain(domain)) => (domain.trim_end_matches('.').to_string(), false),
        Some(Host::Ipv4(ip)) => (ip.to_string(), true),
        Some(Host::Ipv6(ip)) => (ip.to_string(), true),
        None => return Err(ScanError::InvalidUrl("missing host".to_string())),
    };
    if host.is_empty() {
        return Err(ScanError::InvalidUrl("missing host".to_string()));
    }

    let port = url
        .port_or_known_default()
        .unwrap_or(if scheme == "https" { 443 } else { 80 });

    let path = match url.path() {
        "" => "/".to_string(),
        p => p.to_string(),
    };

    let pairs: Vec<String> = url
        .query_pairs()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    let query_params = (!pairs.is_empty()).then(|| pairs.join(", "));

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| segment.contains('.'))
        .map(str::to_string);

    let (subdomain, registered_domain, tld) = if is_ip {
        (None, host.clone(), None)
    } else {
        split_host(&host)
    };
    debug!(%host, ?subdomain, %registered_domain, ?tld, "Host split.");

    Ok(UrlComponents {
        secure: scheme == "https",
        protocol: scheme,
        domain_name: host,
        subdomain,
        registered_domain,
        tld,
        port,
        path,
        query_params,
        fragment: url.fragment().filter(|f| !f.is_empty()).map(str::to_string),
        file_name,
        ip_address: String::new(),
        explicit_port: url.port().is_some(),
        url: url.to_string(),
    })
}

/// Splits a domain into subdomain, registered domain and public suffix, preferring the
/// longest multi-label suffix that leaves at least one label in front of it.
fn split_host(host: &str) -> (Option<String>, String, Option<String>) {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return (None, host.to_string(), None);
    }

    let suffix_len = MULTI_PART_SUFFIXES
        .iter()
        .filter(|suffix| {
            host.strip_suffix(**suffix)
                .is_some_and(|rest| rest.len() > 1 && rest.ends_with('.'))
        })
        .map(|suffix| suffix.split('.').count())
        .max()
        .unwrap_or(1);

    let split_at = labels.len() - suffix_len - 1;
    let tld = labels[labels.len() - suffix_len..].join(".");
    let registered = labels[split_at..].join(".");
    let subdomain = (split_at > 0).then(|| labels[..split_at].join("."));
    (subdomain, registered, Some(tld))
}

/// Looks up `host`, preferring an IPv4 address. IP literals are returned as-is.
pub async fn resolve_host(host: &str, timeout: Duration) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }

    debug!(host, "Resolving host address.");
    match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => {
            let addrs: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
            addrs
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| addrs.first())
                .copied()
        }
        Ok(Err(e)) => {
            warn!(host, error = %e, "Address lookup failed.");
            None
        }
        Err(_) => {
            warn!(host, "Address lookup timed out.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_part_suffix_round_trip() {
        let c = parse_target("https://sub.example.co.uk:8443/path").unwrap();
        assert_eq!(c.protocol, "https");
        assert_eq!(c.domain_name, "sub.example.co.uk");
        assert_eq!(c.subdomain.as_deref(), Some("sub"));
        assert_eq!(c.registered_domain, "example.co.uk");
        assert_eq!(c.tld.as_deref(), Some("co.uk"));
        assert_eq!(c.port, 8443);
        assert_eq!(c.path, "/path");
        assert!(c.secure);
        assert!(c.explicit_port);
    }

    #[test]
    fn bare_host_defaults_to_https() {
        let c = parse_target("  Example.com ").unwrap();
        assert_eq!(c.protocol, "https");
        assert_eq!(c.domain_name, "example.com");
        assert_eq!(c.subdomain, None);
        assert_eq!(c.tld.as_deref(), Some("com"));
        assert_eq!(c.port, 443);
        assert_eq!(c.path, "/");
        assert!(!c.explicit_port);
        assert_eq!(c.url, "https://example.com/");
    }

    #[test]
    fn scheme_defaults_ports() {
        assert_eq!(parse_target("http://legacy.example.com").unwrap().port, 80);
        assert_eq!(parse_target("ftp://files.example.com").unwrap().port, 21);
        assert!(!parse_target("http://legacy.example.com").unwrap().secure);
    }

    #[test]
    fn query_fragment_and_file_name() {
        let c = parse_target("https://www.example.com/docs/report.pdf?a=1&b=two#top").unwrap();
        assert_eq!(c.subdomain.as_deref(), Some("www"));
        assert_eq!(c.query_params.as_deref(), Some("a=1, b=two"));
        assert_eq!(c.fragment.as_deref(), Some("top"));
        assert_eq!(c.file_name.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn ip_literals_have_no_suffix() {
        let c = parse_target("http://192.168.1.10:8080/").unwrap();
        assert_eq!(c.domain_name, "192.168.1.10");
        assert_eq!(c.registered_domain, "192.168.1.10");
        assert_eq!(c.tld, None);
        assert_eq!(c.subdomain, None);

        let v6 = parse_target("https://[::1]/").unwrap();
        assert_eq!(v6.domain_name, "::1");
    }

    #[test]
    fn single_label_host() {
        let c = parse_target("http://localhost:3000").unwrap();
        assert_eq!(c.registered_domain, "localhost");
        assert_eq!(c.tld, None);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_target("   "), Err(ScanError::EmptyInput));
        assert_eq!(
            parse_target("gopher://example.com"),
            Err(ScanError::UnsupportedScheme("gopher".to_string()))
        );
        assert!(matches!(parse_target("https://"), Err(ScanError::InvalidUrl(_))));
        assert!(matches!(parse_target("not a url"), Err(ScanError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn ip_literal_resolves_without_lookup() {
        let ip = resolve_host("127.0.0.1", Duration::from_millis(10)).await;
        assert_eq!(ip, Some("127.0.0.1".parse().unwrap()));
    }
}
