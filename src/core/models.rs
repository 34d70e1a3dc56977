// src/core/models.rs

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Scan Request ---

/// Selects which probes a scan dispatches.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanMode {
    /// TLS Prober and Header Auditor only.
    Quick,
    /// Every probe.
    #[default]
    Deep,
    /// URL components and domain trust only, no score.
    Extract,
}

impl ScanMode {
    /// The fixed probe subset for this mode, in dispatch order.
    pub fn probes(self) -> &'static [ProbeKind] {
        match self {
            ScanMode::Quick => &[ProbeKind::Tls, ProbeKind::Http],
            ScanMode::Deep => &[
                ProbeKind::Tls,
                ProbeKind::Http,
                ProbeKind::Dns,
                ProbeKind::Ports,
                ProbeKind::Trust,
            ],
            ScanMode::Extract => &[ProbeKind::Trust],
        }
    }

    pub fn is_graded(self) -> bool {
        !matches!(self, ScanMode::Extract)
    }
}

/// Identifies a probe, used for dispatch bookkeeping and partial-result reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProbeKind {
    Tls,
    Http,
    Dns,
    Ports,
    Trust,
}

/// A validated-on-use scan request. Fields are private so the request stays immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    target: String,
    mode: ScanMode,
    probe_timeout: Option<Duration>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            target: target.into(),
            mode,
            probe_timeout: None,
        }
    }

    /// Overrides the configured per-probe deadline for this request only.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }
}

// --- Findings ---

/// Severity tag carried by every finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FindingType {
    Success,
    Info,
    Warning,
    Danger,
}

/// A single human-readable observation emitted by a probe or by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingType,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FindingType::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FindingType::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FindingType::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(FindingType::Danger, message)
    }
}

// --- URL Components ---

/// Canonical pieces of the scan target, derived once by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlComponents {
    pub protocol: String,
    pub domain_name: String,
    pub subdomain: Option<String>,
    pub registered_domain: String,
    pub tld: Option<String>,
    pub port: u16,
    pub path: String,
    pub query_params: Option<String>,
    pub fragment: Option<String>,
    pub file_name: Option<String>,
    /// Empty when the host could not be resolved.
    pub ip_address: String,
    pub secure: bool,
    /// The normalized absolute URL the HTTP probes fetch.
    #[serde(skip)]
    pub url: String,
    /// Whether the port was written in the URL rather than implied by the scheme.
    #[serde(skip)]
    pub explicit_port: bool,
}

impl UrlComponents {
    pub fn resolved_ip(&self) -> Option<IpAddr> {
        self.ip_address.parse().ok()
    }
}

// --- TLS ---

/// Outcome of the TLS handshake and leaf-certificate inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsReport {
    pub enabled: bool,
    pub valid: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_alt_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

impl TlsReport {
    /// True once a certificate was actually read from the peer.
    pub fn has_certificate(&self) -> bool {
        self.expires.is_some()
    }
}

// --- HTTP Headers ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderStatus {
    pub present: bool,
    pub value: Option<String>,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderReport {
    pub headers: BTreeMap<String, HeaderStatus>,
    pub present_count: usize,
    pub total_headers: usize,
    pub score: u8,
    pub server: Option<String>,
    pub powered_by: Option<String>,
    pub cookies_secure: Option<bool>,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
    pub redirects_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectChain {
    pub chain: Vec<RedirectHop>,
    pub final_url: String,
    pub count: usize,
    pub has_redirects: bool,
    pub https_upgrade: bool,
    pub https_downgrade: bool,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- DNS ---

/// Record sets per type. Every list is empty rather than absent when nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSet {
    pub a_records: Vec<String>,
    pub aaaa_records: Vec<String>,
    pub mx_records: Vec<String>,
    pub ns_records: Vec<String>,
    pub txt_records: Vec<String>,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

// --- Ports ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub port: u16,
    pub service: String,
    pub status: PortStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortScanResult {
    pub open_ports: Vec<PortEntry>,
    pub closed_ports: Vec<PortEntry>,
    pub scanned: usize,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

// --- Technology ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyProfile {
    pub server: Option<String>,
    pub framework: Option<String>,
    pub cms: Option<String>,
    pub cdn: Option<String>,
    pub javascript_libraries: Vec<String>,
    pub analytics: Vec<String>,
    pub detected: Vec<String>,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

/// Everything produced by the HTTP task: the header audit, its redirect chain and,
/// when requested, the fingerprint computed from the same response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpAudit {
    pub headers: HeaderReport,
    pub redirects: RedirectChain,
    pub technology: Option<TechnologyProfile>,
}

// --- Domain Trust ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RegistrationSource {
    Rdap,
    Whois,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustReport {
    pub available: bool,
    pub registrar: String,
    pub organization: String,
    pub creation_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub updated_date: Option<NaiveDate>,
    pub domain_age: String,
    pub age_days: i64,
    pub trust_score: u8,
    pub risk_level: RiskLevel,
    pub name_servers: Vec<String>,
    pub source: RegistrationSource,
    #[serde(skip)]
    pub analysis: Vec<Finding>,
}

// --- Scoring ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum Grade {
    #[serde(rename = "A+")]
    #[strum(serialize = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component: String,
    pub weight: f64,
    pub score: f64,
}

// --- Main Result ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    PartialFailure,
    Failed,
}

/// The top-level aggregate returned for every request. Optional sections are omitted
/// from the serialized form when the mode did not dispatch the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub success: bool,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub scan_mode: ScanMode,
    pub scan_time: DateTime<Utc>,
    pub status: ScanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_grade: Option<Grade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<Vec<ComponentScore>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_analysis: Option<TlsReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_headers: Option<HeaderReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_chain: Option<RedirectChain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_records: Option<DnsRecordSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<TechnologyProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_ports: Option<PortScanResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois: Option<TrustReport>,
    /// URL components, emitted at the top level in extract mode.
    #[serde(flatten)]
    pub url_info: Option<UrlComponents>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_probes: Vec<ProbeKind>,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// An empty result for `target`, to be filled in by the orchestrator.
    pub fn new(target: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            success: true,
            target: target.into(),
            hostname: None,
            scan_mode: mode,
            scan_time: Utc::now(),
            status: ScanStatus::Completed,
            security_score: None,
            security_grade: None,
            score_breakdown: None,
            ssl_analysis: None,
            security_headers: None,
            redirect_chain: None,
            dns_records: None,
            technology: None,
            open_ports: None,
            whois: None,
            url_info: None,
            missing_probes: Vec::new(),
            findings: Vec::new(),
            error: None,
        }
    }

    /// The only path that reports `success = false`: the request itself was unusable.
    pub fn failed(target: impl Into<String>, mode: ScanMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: ScanStatus::Failed,
            error: Some(error.into()),
            ..Self::new(target, mode)
        }
    }
}
