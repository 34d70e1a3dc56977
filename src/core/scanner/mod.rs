// src/core/scanner/mod.rs

// Probe modules and the orchestrator that runs them.
pub mod dns_scanner;
pub mod fingerprint_scanner;
pub mod headers_scanner;
pub mod port_scanner;
pub mod ssl_scanner;
pub mod whois_scanner;

use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::core::models::{
    DnsRecordSet, Finding, HeaderReport, HttpAudit, PortScanResult, ProbeKind, RedirectChain,
    ScanMode, ScanRequest, ScanResult, ScanStatus, TlsReport, TrustReport, UrlComponents,
};
use crate::core::normalizer;
use crate::core::scoring::{self, ScoringInput};

use self::dns_scanner::run_dns_scan;
use self::headers_scanner::run_headers_scan;
use self::port_scanner::run_port_scan;
use self::ssl_scanner::run_ssl_scan;
use self::whois_scanner::{evaluate_trust, run_whois_scan};

/// The network-facing operations a scan is made of.
///
/// Every method reports failures inside its return value; none of them returns an error.
/// `NetworkProbes` is the real implementation, tests substitute their own.
#[async_trait]
pub trait ProbeSet: Send + Sync {
    /// Resolves a host to one address, preferring IPv4.
    async fn resolve(&self, host: &str, timeout: Duration) -> Option<IpAddr>;

    async fn tls(&self, target: &UrlComponents, timeout: Duration) -> TlsReport;

    /// Audits headers and redirects, fingerprinting the final response when asked to.
    async fn http(&self, target: &UrlComponents, timeout: Duration, fingerprint: bool) -> HttpAudit;

    async fn dns(&self, target: &UrlComponents) -> DnsRecordSet;

    async fn ports(&self, ip: Option<IpAddr>) -> PortScanResult;

    async fn trust(&self, domain: &str, timeout: Duration) -> TrustReport;
}

/// Probes that talk to the real network.
pub struct NetworkProbes {
    config: Arc<ScanConfig>,
}

impl NetworkProbes {
    pub fn new(config: Arc<ScanConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProbeSet for NetworkProbes {
    async fn resolve(&self, host: &str, timeout: Duration) -> Option<IpAddr> {
        normalizer::resolve_host(host, timeout).await
    }

    async fn tls(&self, target: &UrlComponents, timeout: Duration) -> TlsReport {
        run_ssl_scan(target, timeout).await
    }

    async fn http(
        &self,
        target: &UrlComponents,
        timeout: Duration,
        fingerprint: bool,
    ) -> HttpAudit {
        run_headers_scan(&target.url, &self.config, timeout, fingerprint).await
    }

    async fn dns(&self, target: &UrlComponents) -> DnsRecordSet {
        run_dns_scan(
            &target.domain_name,
            &target.registered_domain,
            self.config.dns_timeout(),
        )
        .await
    }

    async fn ports(&self, ip: Option<IpAddr>) -> PortScanResult {
        run_port_scan(
            ip,
            &self.config.port_list,
            self.config.port_timeout(),
            self.config.port_concurrency,
        )
        .await
    }

    async fn trust(&self, domain: &str, timeout: Duration) -> TrustReport {
        run_whois_scan(domain, timeout, &self.config.user_agent).await
    }
}

/// What a finished probe task hands back.
enum ProbeOutcome {
    Tls(TlsReport),
    Http(HttpAudit),
    Dns(DnsRecordSet),
    Ports(PortScanResult),
    Trust(TrustReport),
}

type ProbeTaskResult = (ProbeKind, Result<ProbeOutcome, String>);

/// Runs scans: normalizes the target, fans the mode's probes out as independent tasks
/// under a per-probe and an overall deadline, and grades what comes back.
#[derive(Clone)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    probes: Arc<dyn ProbeSet>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        let config = Arc::new(config);
        let probes = Arc::new(NetworkProbes::new(config.clone()));
        Self { config, probes }
    }

    /// Builds a scanner over a custom probe implementation.
    pub fn with_probes(config: ScanConfig, probes: Arc<dyn ProbeSet>) -> Self {
        Self {
            config: Arc::new(config),
            probes,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Synchronous wrapper around [`Scanner::scan`]. Must not be called from inside a
    /// Tokio runtime.
    pub fn scan_blocking(&self, request: ScanRequest) -> ScanResult {
        match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => {
                let result = runtime.block_on(self.scan(request));
                // Resolver lookups parked on the blocking pool must not hold the caller.
                runtime.shutdown_background();
                result
            }
            Err(e) => {
                error!(error = %e, "Failed to start Tokio runtime.");
                ScanResult::failed(
                    request.target(),
                    request.mode(),
                    format!("Failed to start runtime: {e}"),
                )
            }
        }
    }

    /// Scans a target.
    ///
    /// Only an unusable target yields `success = false`. Probe failures become degraded
    /// sections with a finding, and probes still running at the overall deadline are
    /// dropped and listed in `missing_probes`.
    pub async fn scan(&self, request: ScanRequest) -> ScanResult {
        let mode = request.mode();
        let deadline = Instant::now() + self.config.overall_timeout();
        info!(url = request.target(), %mode, "Starting scan.");

        let components = match normalizer::normalize(
            request.target(),
            self.probes.as_ref(),
            self.config.dns_timeout(),
        )
        .await
        {
            Ok(components) => components,
            Err(e) => {
                warn!(url = request.target(), error = %e, "Target rejected.");
                return ScanResult::failed(request.target(), mode, e.to_string());
            }
        };

        let probe_timeout = request
            .probe_timeout()
            .unwrap_or_else(|| self.config.probe_timeout());
        let mut set = self.dispatch(mode, &components, probe_timeout);
        let mut pending: Vec<ProbeKind> = mode.probes().to_vec();
        let mut slots = ProbeSlots::default();

        loop {
            match time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((kind, outcome)))) => {
                    pending.retain(|k| *k != kind);
                    slots.fill(kind, outcome, &self.config);
                }
                Ok(Some(Err(e))) => {
                    error!(error = %e, "Probe task ended abnormally.");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        missing = ?pending,
                        "Overall deadline reached, aborting outstanding probes."
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        let mut result = ScanResult::new(request.target(), mode);
        result.hostname = Some(components.domain_name.clone());

        if set.is_empty() {
            // Tasks that vanished without reporting are treated like failed probes.
            for kind in pending.drain(..) {
                slots.fill(kind, Err("probe task ended abnormally".to_string()), &self.config);
            }
        } else {
            result.status = ScanStatus::PartialFailure;
            result.missing_probes = pending;
        }

        self.assemble(&mut result, components, slots);
        info!(
            status = %result.status,
            score = ?result.security_score,
            grade = ?result.security_grade.map(|g| g.to_string()),
            findings = result.findings.len(),
            "Scan finished."
        );
        result
    }

    fn dispatch(
        &self,
        mode: ScanMode,
        target: &UrlComponents,
        limit: Duration,
    ) -> JoinSet<ProbeTaskResult> {
        let mut set = JoinSet::new();
        let fingerprint = matches!(mode, ScanMode::Deep);

        for &kind in mode.probes() {
            let probes = self.probes.clone();
            let target = target.clone();
            debug!(probe = %kind, timeout_secs = limit.as_secs(), "Dispatching probe.");

            set.spawn(async move {
                let work = async {
                    match kind {
                        ProbeKind::Tls => ProbeOutcome::Tls(probes.tls(&target, limit).await),
                        ProbeKind::Http => {
                            ProbeOutcome::Http(probes.http(&target, limit, fingerprint).await)
                        }
                        ProbeKind::Dns => ProbeOutcome::Dns(probes.dns(&target).await),
                        ProbeKind::Ports => {
                            ProbeOutcome::Ports(probes.ports(target.resolved_ip()).await)
                        }
                        ProbeKind::Trust => ProbeOutcome::Trust(
                            probes.trust(&target.registered_domain, limit / 2).await,
                        ),
                    }
                };

                let outcome = match AssertUnwindSafe(time::timeout(limit, work))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) => {
                        warn!(probe = %kind, "Probe timed out.");
                        Err(format!("timed out after {}s", limit.as_secs()))
                    }
                    Err(_) => {
                        error!(probe = %kind, "Probe panicked.");
                        Err("probe panicked".to_string())
                    }
                };
                (kind, outcome)
            });
        }
        set
    }

    /// Writes the probe slots into the result in dispatch order and grades it.
    fn assemble(&self, result: &mut ScanResult, components: UrlComponents, slots: ProbeSlots) {
        let ProbeSlots {
            tls,
            http,
            dns,
            ports,
            trust,
            failed,
        } = slots;

        let scored_tls = tls.as_ref().filter(|_| !failed.contains(&ProbeKind::Tls));
        let scored_http = http.as_ref().filter(|_| !failed.contains(&ProbeKind::Http));
        let scored_ports = ports.as_ref().filter(|_| !failed.contains(&ProbeKind::Ports));

        if result.scan_mode.is_graded() {
            let card = scoring::aggregate(
                &ScoringInput {
                    mode: result.scan_mode,
                    secure: components.secure,
                    tls: scored_tls,
                    headers: scored_http.map(|audit| &audit.headers),
                    redirects: scored_http.map(|audit| &audit.redirects),
                    ports: scored_ports,
                },
                &self.config.weights,
                &self.config.grade_thresholds,
            );
            result.security_score = Some(card.score);
            result.security_grade = Some(card.grade);
            result.score_breakdown = Some(card.breakdown);
            result.findings = card.findings;
        }

        let mut findings = Vec::new();
        findings.extend(failed.iter().filter(|k| **k == ProbeKind::Tls).map(degraded_finding));
        if let Some(report) = &tls {
            findings.extend(report.analysis.iter().cloned());
        }
        findings.extend(failed.iter().filter(|k| **k == ProbeKind::Http).map(degraded_finding));
        if let Some(audit) = &http {
            findings.extend(audit.headers.analysis.iter().cloned());
            if let Some(technology) = &audit.technology {
                findings.extend(technology.analysis.iter().cloned());
            }
        }
        for (kind, analysis) in [
            (ProbeKind::Dns, dns.as_ref().map(|d| &d.analysis)),
            (ProbeKind::Ports, ports.as_ref().map(|p| &p.analysis)),
            (ProbeKind::Trust, trust.as_ref().map(|t| &t.analysis)),
        ] {
            if failed.contains(&kind) {
                findings.push(degraded_finding(&kind));
            }
            if let Some(analysis) = analysis {
                findings.extend(analysis.iter().cloned());
            }
        }
        for kind in &result.missing_probes {
            findings.push(Finding::warning(format!(
                "Scan deadline reached before the {kind} probe finished"
            )));
        }
        findings.append(&mut result.findings);
        result.findings = findings;

        result.ssl_analysis = tls;
        if let Some(audit) = http {
            result.security_headers = Some(audit.headers);
            result.redirect_chain = Some(audit.redirects);
            result.technology = audit.technology;
        }
        result.dns_records = dns;
        result.open_ports = ports;
        result.whois = trust;

        if matches!(result.scan_mode, ScanMode::Extract) {
            result.url_info = Some(components);
        }
        result.scan_time = Utc::now();
    }
}

fn degraded_finding(kind: &ProbeKind) -> Finding {
    Finding::warning(format!("The {kind} probe did not complete; its results are unavailable"))
}

/// One slot per probe, written once when the probe's task reports.
#[derive(Default)]
struct ProbeSlots {
    tls: Option<TlsReport>,
    http: Option<HttpAudit>,
    dns: Option<DnsRecordSet>,
    ports: Option<PortScanResult>,
    trust: Option<TrustReport>,
    failed: Vec<ProbeKind>,
}

impl ProbeSlots {
    fn fill(
        &mut self,
        kind: ProbeKind,
        outcome: Result<ProbeOutcome, String>,
        config: &ScanConfig,
    ) {
        match outcome {
            Ok(ProbeOutcome::Tls(report)) => self.tls = Some(report),
            Ok(ProbeOutcome::Http(audit)) => self.http = Some(audit),
            Ok(ProbeOutcome::Dns(records)) => self.dns = Some(records),
            Ok(ProbeOutcome::Ports(ports)) => self.ports = Some(ports),
            Ok(ProbeOutcome::Trust(report)) => self.trust = Some(report),
            Err(reason) => {
                debug!(probe = %kind, %reason, "Recording degraded probe result.");
                self.failed.push(kind);
                self.degrade(kind, reason, config);
            }
        }
    }

    fn degrade(&mut self, kind: ProbeKind, reason: String, config: &ScanConfig) {
        match kind {
            ProbeKind::Tls => {
                self.tls = Some(TlsReport {
                    error: Some(reason),
                    ..Default::default()
                })
            }
            ProbeKind::Http => {
                self.http = Some(HttpAudit {
                    headers: HeaderReport {
                        total_headers: config.header_checklist.len(),
                        error: Some(reason.clone()),
                        ..Default::default()
                    },
                    redirects: RedirectChain {
                        error: Some(reason),
                        ..Default::default()
                    },
                    technology: None,
                })
            }
            ProbeKind::Dns => self.dns = Some(DnsRecordSet::default()),
            ProbeKind::Ports => self.ports = Some(PortScanResult::default()),
            ProbeKind::Trust => {
                let mut report = evaluate_trust(None, Utc::now().date_naive());
                report.analysis.clear();
                self.trust = Some(report);
            }
        }
    }
}
