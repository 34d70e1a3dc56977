// tests/common/mod.rs

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use vanguard_deep_scan::ScanConfig;
use vanguard_deep_scan::core::models::{
    DnsRecordSet, Finding, HttpAudit, PortEntry, PortScanResult, PortStatus, ProbeKind,
    RedirectChain, RegistrationSource, TechnologyProfile, TlsReport, TrustReport, UrlComponents,
};
use vanguard_deep_scan::core::scanner::ProbeSet;
use vanguard_deep_scan::core::scanner::headers_scanner::audit_headers;
use vanguard_deep_scan::core::scanner::port_scanner::run_port_scan;
use vanguard_deep_scan::core::scanner::ssl_scanner::{CertificateFacts, HandshakeFacts, build_report};
use vanguard_deep_scan::core::scanner::whois_scanner::{RegistrationRecord, evaluate_trust};

pub const COMPLIANT_HEADERS: &[(&str, &str)] = &[
    ("strict-transport-security", "max-age=63072000; includeSubDomains; preload"),
    ("content-security-policy", "default-src 'self'"),
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "camera=(), microphone=()"),
];

/// Canned probe results, with switches to stall or crash individual probes.
#[derive(Clone)]
pub struct FakeProbes {
    pub ip: Option<IpAddr>,
    pub tls: TlsReport,
    pub http: HttpAudit,
    pub dns: DnsRecordSet,
    pub ports: PortScanResult,
    pub trust: TrustReport,
    pub stall: Vec<ProbeKind>,
    pub panic: Vec<ProbeKind>,
}

impl FakeProbes {
    /// A well-run HTTPS site: fresh certificate, every header, no risky ports, old domain.
    pub fn compliant() -> Self {
        let now = Utc::now();
        let tls = build_report(
            HandshakeFacts {
                protocol: Some("TLSv1.3".into()),
                cipher: Some("TLS13_AES_256_GCM_SHA384".into()),
                certificate: Some(CertificateFacts {
                    issuer: Some("CN=R11, O=Let's Encrypt, C=US".into()),
                    subject: Some("CN=example.com".into()),
                    not_after: now + ChronoDuration::days(200),
                    subject_alt_names: vec!["example.com".into(), "www.example.com".into()],
                }),
                verification: Ok(()),
            },
            now,
        );

        let config = ScanConfig::default();
        let mut headers = audit_headers(&header_map(COMPLIANT_HEADERS), &config.header_checklist);
        headers.status_code = Some(200);
        headers.final_url = Some("https://example.com/".into());
        headers.analysis = vec![Finding::success("All 6 security headers present")];

        let today = now.date_naive();
        let record = RegistrationRecord {
            registrar: Some("MarkMonitor Inc.".into()),
            organization: Some("Example Corp".into()),
            creation_date: NaiveDate::from_ymd_opt(1995, 8, 14),
            expiry_date: Some(today + ChronoDuration::days(400)),
            updated_date: None,
            name_servers: vec!["a.iana-servers.net".into()],
            source: RegistrationSource::Rdap,
        };

        Self {
            ip: "93.184.216.34".parse().ok(),
            tls,
            http: HttpAudit {
                headers,
                redirects: RedirectChain {
                    final_url: "https://example.com/".into(),
                    ..Default::default()
                },
                technology: Some(TechnologyProfile {
                    cdn: Some("Cloudflare".into()),
                    detected: vec!["CDN: Cloudflare".into()],
                    analysis: vec![Finding::success("CDN detected: Cloudflare")],
                    ..Default::default()
                }),
            },
            dns: DnsRecordSet {
                a_records: vec!["93.184.216.34".into()],
                mx_records: vec!["mail.example.com".into()],
                ns_records: vec!["a.iana-servers.net".into()],
                ..Default::default()
            },
            ports: PortScanResult {
                open_ports: vec![
                    PortEntry { port: 80, service: "HTTP".into(), status: PortStatus::Open },
                    PortEntry { port: 443, service: "HTTPS".into(), status: PortStatus::Open },
                ],
                closed_ports: Vec::new(),
                scanned: 17,
                analysis: vec![Finding::success("No risky ports exposed")],
            },
            trust: evaluate_trust(Some(&record), today),
            stall: Vec::new(),
            panic: Vec::new(),
        }
    }

    /// A plain-HTTP site with no security headers.
    pub fn legacy_http() -> Self {
        let config = ScanConfig::default();
        let mut headers = audit_headers(&HeaderMap::new(), &config.header_checklist);
        headers.status_code = Some(200);
        headers.analysis = config
            .header_checklist
            .iter()
            .map(|check| Finding::warning(check.remediation.clone()))
            .collect();

        Self {
            tls: TlsReport {
                error: Some("Not an HTTPS URL".into()),
                analysis: vec![Finding::danger("No SSL/HTTPS enabled")],
                ..Default::default()
            },
            http: HttpAudit {
                headers,
                redirects: RedirectChain {
                    final_url: "http://legacy.example.com/".into(),
                    ..Default::default()
                },
                technology: None,
            },
            ..Self::compliant()
        }
    }

    pub fn stalling(mut self, kind: ProbeKind) -> Self {
        self.stall.push(kind);
        self
    }

    pub fn panicking(mut self, kind: ProbeKind) -> Self {
        self.panic.push(kind);
        self
    }

    pub fn unresolved(mut self) -> Self {
        self.ip = None;
        self
    }

    pub fn shared(self) -> Arc<dyn ProbeSet> {
        Arc::new(self)
    }

    async fn gate(&self, kind: ProbeKind) {
        if self.panic.contains(&kind) {
            panic!("{kind} probe exploded");
        }
        if self.stall.contains(&kind) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[async_trait]
impl ProbeSet for FakeProbes {
    async fn resolve(&self, _host: &str, _timeout: Duration) -> Option<IpAddr> {
        self.ip
    }

    async fn tls(&self, _target: &UrlComponents, _timeout: Duration) -> TlsReport {
        self.gate(ProbeKind::Tls).await;
        self.tls.clone()
    }

    async fn http(&self, _target: &UrlComponents, _timeout: Duration, fingerprint: bool) -> HttpAudit {
        self.gate(ProbeKind::Http).await;
        let mut audit = self.http.clone();
        if !fingerprint {
            audit.technology = None;
        }
        audit
    }

    async fn dns(&self, _target: &UrlComponents) -> DnsRecordSet {
        self.gate(ProbeKind::Dns).await;
        self.dns.clone()
    }

    async fn ports(&self, ip: Option<IpAddr>) -> PortScanResult {
        self.gate(ProbeKind::Ports).await;
        match ip {
            Some(_) => self.ports.clone(),
            None => run_port_scan(None, &[80, 443], Duration::from_secs(1), 1).await,
        }
    }

    async fn trust(&self, _domain: &str, _timeout: Duration) -> TrustReport {
        self.gate(ProbeKind::Trust).await;
        self.trust.clone()
    }
}

pub fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_static(*value));
    }
    map
}

/// One canned HTTP response.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Route {
    pub fn ok(headers: &[(&str, &str)], body: &str) -> Self {
        Self {
            status: 200,
            headers: headers.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
            body: body.to_string(),
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            headers: vec![("Location".to_string(), location.to_string())],
            body: String::new(),
        }
    }
}

/// Serves `routes` by request path on an ephemeral local port until the test ends.
/// Unknown paths get a 404.
pub async fn serve(routes: Vec<(&str, Route)>) -> SocketAddr {
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                    if read == buf.len() {
                        return;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let route = routes.get(&path).cloned().unwrap_or(Route {
                    status: 404,
                    headers: Vec::new(),
                    body: "not found".to_string(),
                });
                let mut response = format!("HTTP/1.1 {} Canned\r\n", route.status);
                for (name, value) in &route.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    route.body.len(),
                    route.body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
