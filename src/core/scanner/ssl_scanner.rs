// src/core/scanner/ssl_scanner.rs

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use crate::core::models::{Finding, TlsReport, UrlComponents};

/// Ports on which a TLS endpoint is assumed even when the URL says `http`.
const CONVENTIONAL_TLS_PORTS: &[u16] = &[443, 8443];
const EXPIRY_WARNING_DAYS: i64 = 30;
const SECONDS_PER_DAY: i64 = 86_400;

/// What the handshake revealed, before any judgement is applied.
#[derive(Debug, Clone)]
pub struct HandshakeFacts {
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub certificate: Option<CertificateFacts>,
    /// Outcome of webpki chain and name verification.
    pub verification: Result<(), String>,
}

#[derive(Debug, Clone)]
pub struct CertificateFacts {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub not_after: DateTime<Utc>,
    pub subject_alt_names: Vec<String>,
}

/// Runs the TLS probe against the target's host and port.
///
/// Certificate verification failures do not abort the handshake: the verifier records
/// the outcome and lets the connection proceed, so an invalid certificate is still read
/// and reported with `valid = false`.
///
/// # Arguments
/// * `target` - The normalized URL components.
/// * `timeout` - Deadline covering TCP connect and handshake.
///
/// # Returns
/// A `TlsReport` with the certificate details and the analysis findings.
pub async fn run_ssl_scan(target: &UrlComponents, timeout: Duration) -> TlsReport {
    let host = target.domain_name.as_str();
    info!(host, port = target.port, "Starting SSL/TLS scan.");

    let mut report = if should_probe(target) {
        match tokio::time::timeout(timeout, perform_tls_handshake(host, target.port)).await {
            Ok(Ok(facts)) => build_report(facts, Utc::now()),
            Ok(Err(e)) => handshake_failed(e),
            Err(_) => {
                warn!(host, "TLS handshake timed out.");
                handshake_failed(format!("TLS handshake timed out after {}s", timeout.as_secs()))
            }
        }
    } else {
        debug!(host, "Target is not served over TLS, skipping handshake.");
        TlsReport {
            error: Some("Not an HTTPS URL".to_string()),
            ..Default::default()
        }
    };

    report.analysis = analyze_ssl_results(&report);
    info!(findings = %report.analysis.len(), "SSL/TLS scan finished.");
    report
}

fn should_probe(target: &UrlComponents) -> bool {
    target.secure || (target.explicit_port && CONVENTIONAL_TLS_PORTS.contains(&target.port))
}

fn handshake_failed(error: String) -> TlsReport {
    TlsReport {
        enabled: true,
        valid: false,
        error: Some(error),
        ..Default::default()
    }
}

async fn perform_tls_handshake(host: &str, port: u16) -> Result<HandshakeFacts, String> {
    let provider = Arc::new(ring::default_provider());
    let verifier = Arc::new(RecordingVerifier::new(provider.clone())?);

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("TLS configuration error: {e}"))?
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| format!("Invalid server name '{host}': {e}"))?;

    debug!(host, port, "Connecting TCP stream.");
    let stream = TcpStream::connect((host, port)).await.map_err(|e| {
        error!(error = %e, "TCP connection failed");
        format!("TCP Connection Error: {e}")
    })?;

    debug!(host, "Performing TLS handshake.");
    let tls = connector.connect(server_name, stream).await.map_err(|e| {
        error!(error = %e, "TLS handshake failed");
        format!("TLS Handshake Error: {e}")
    })?;

    let (_, conn) = tls.get_ref();
    let protocol = conn.protocol_version().map(|v| format!("{v:?}"));
    let cipher = conn
        .negotiated_cipher_suite()
        .map(|suite| format!("{:?}", suite.suite()));
    let certificate = conn
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(|leaf| parse_certificate(leaf.as_ref()))
        .transpose()?;

    let verification = verifier
        .outcome
        .get()
        .cloned()
        .unwrap_or_else(|| Err("Certificate was not verified".to_string()));
    debug!(?protocol, ?cipher, trusted = verification.is_ok(), "TLS handshake completed.");

    Ok(HandshakeFacts {
        protocol,
        cipher,
        certificate,
        verification,
    })
}

fn parse_certificate(der: &[u8]) -> Result<CertificateFacts, String> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        format!("X.509 Parse Error: {e}")
    })?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let issuer = first_attribute(x509.issuer().iter_organization())
        .or_else(|| first_attribute(x509.issuer().iter_common_name()));
    let subject = first_attribute(x509.subject().iter_common_name());

    let subject_alt_names = match x509.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(CertificateFacts {
        issuer,
        subject,
        not_after: asn1_time_to_chrono_utc(&x509.validity().not_after),
        subject_alt_names,
    })
}

fn first_attribute<'a, 'b: 'a>(
    mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    attrs
        .find_map(|attr| attr.as_str().ok())
        .map(str::to_string)
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Turns handshake facts into a report as of `now`.
pub fn build_report(facts: HandshakeFacts, now: DateTime<Utc>) -> TlsReport {
    let Some(cert) = facts.certificate else {
        return TlsReport {
            enabled: true,
            protocol: facts.protocol,
            cipher: facts.cipher,
            error: Some("No peer certificate presented".to_string()),
            ..Default::default()
        };
    };

    let days_until_expiry = (cert.not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY);
    let valid = facts.verification.is_ok() && days_until_expiry >= 0;

    TlsReport {
        enabled: true,
        valid,
        issuer: cert.issuer,
        subject: cert.subject,
        expires: Some(cert.not_after),
        days_until_expiry: Some(days_until_expiry),
        protocol: facts.protocol,
        cipher: facts.cipher,
        subject_alt_names: cert.subject_alt_names,
        error: facts.verification.err(),
        analysis: Vec::new(),
    }
}

fn analyze_ssl_results(report: &TlsReport) -> Vec<Finding> {
    debug!("Analyzing SSL scan results.");
    let mut analyses = Vec::new();

    if !report.enabled {
        analyses.push(Finding::danger("No SSL/HTTPS enabled"));
        return analyses;
    }

    let Some(days) = report.days_until_expiry else {
        let reason = report.error.as_deref().unwrap_or("unknown error");
        analyses.push(Finding::danger(format!("TLS handshake failed: {reason}")));
        return analyses;
    };

    if days < 0 {
        debug!(days, "Certificate is expired.");
        analyses.push(Finding::danger(format!(
            "Certificate expired {} days ago",
            days.unsigned_abs()
        )));
    } else if !report.valid {
        let reason = report.error.as_deref().unwrap_or("verification failed");
        analyses.push(Finding::danger(format!("Untrusted SSL certificate: {reason}")));
    } else if days <= EXPIRY_WARNING_DAYS {
        debug!(days, "Certificate is expiring soon.");
        analyses.push(Finding::warning(format!("Certificate expires soon ({days} days)")));
    } else {
        analyses.push(Finding::success(format!(
            "Valid SSL certificate, expires in {days} days"
        )));
    }

    analyses
}

/// Runs standard webpki verification but only records its verdict, so the handshake
/// completes for untrusted certificates too.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    outcome: OnceLock<Result<(), String>>,
}

impl RecordingVerifier {
    fn new(provider: Arc<CryptoProvider>) -> Result<Self, String> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| format!("TLS verifier error: {e}"))?;
        Ok(Self {
            inner,
            outcome: OnceLock::new(),
        })
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .map(|_| ())
            .map_err(|e| e.to_string());
        if let Err(reason) = &verdict {
            debug!(%reason, "Certificate failed verification.");
        }
        let _ = self.outcome.set(verdict);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
