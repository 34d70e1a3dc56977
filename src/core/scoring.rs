// src/core/scoring.rs

//! Reduces probe results to a composite score and letter grade.
//!
//! Each component is scored on a 0 to 100 scale and weighted. Components the scan mode
//! did not dispatch are left out and the remaining weights renormalized; components whose
//! probe produced no usable data get a conservative credit instead.

use tracing::debug;

use crate::config::{GradeThreshold, ScoringWeights};
use crate::core::knowledge_base::is_risky_port;
use crate::core::models::{
    ComponentScore, Finding, Grade, HeaderReport, PortScanResult, RedirectChain, ScanMode,
    TlsReport,
};
use crate::core::scanner::fingerprint_scanner::discloses_version;

/// Share of the TLS points kept by a reachable endpoint whose certificate does not verify.
const TLS_REACHABLE_CREDIT: f64 = 15.0 / 35.0;
/// Share of the TLS points kept by a valid certificate that expires within 30 days.
const TLS_EXPIRING_CREDIT: f64 = 33.0 / 35.0;
const EXPIRY_WARNING_DAYS: i64 = 30;

/// The probe results the aggregator looks at. `None` means the probe did not report.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub mode: ScanMode,
    pub secure: bool,
    pub tls: Option<&'a TlsReport>,
    pub headers: Option<&'a HeaderReport>,
    pub redirects: Option<&'a RedirectChain>,
    pub ports: Option<&'a PortScanResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub score: u8,
    pub grade: Grade,
    pub breakdown: Vec<ComponentScore>,
    pub findings: Vec<Finding>,
}

/// Scores a scan.
///
/// # Arguments
/// * `input` - Borrowed probe results and the scan mode.
/// * `weights` - Component weights and in-component penalties.
/// * `thresholds` - Grade floors, highest first.
///
/// # Returns
/// A `ScoreCard` with the rounded score, grade, per-component breakdown and the
/// aggregator's own findings.
pub fn aggregate(
    input: &ScoringInput<'_>,
    weights: &ScoringWeights,
    thresholds: &[GradeThreshold],
) -> ScoreCard {
    let mut findings = Vec::new();
    let mut breakdown = Vec::new();
    let credit = weights.missing_data_credit;

    let mut push = |component: &str, weight: f64, score: Option<f64>, findings: &mut Vec<Finding>| {
        let score = score.unwrap_or_else(|| {
            findings.push(Finding::info(format!(
                "{component} data unavailable; conservative credit applied"
            )));
            credit
        });
        breakdown.push(ComponentScore {
            component: component.to_string(),
            weight,
            score: score.clamp(0.0, 100.0),
        });
    };

    push("TLS", weights.tls, input.tls.map(tls_component), &mut findings);

    let headers = input.headers.filter(|h| h.error.is_none());
    push(
        "Headers",
        weights.headers,
        headers.map(|h| f64::from(h.score)),
        &mut findings,
    );

    if matches!(input.mode, ScanMode::Deep) {
        let ports = input.ports.filter(|p| p.scanned > 0);
        push(
            "Ports",
            weights.ports,
            ports.map(|p| ports_component(p, weights)),
            &mut findings,
        );
    }

    let https = https_component(input.secure, input.redirects);
    if https == 0.0 {
        findings.push(Finding::warning("HTTPS is not enforced for this site"));
    }
    push("HTTPS", weights.https, Some(https), &mut findings);

    push(
        "Technology",
        weights.technology,
        headers.map(|h| technology_component(h, weights)),
        &mut findings,
    );

    let total_weight: f64 = breakdown.iter().map(|c| c.weight).sum();
    let weighted: f64 = breakdown.iter().map(|c| c.weight * c.score).sum();
    let score = if total_weight > 0.0 {
        (weighted / total_weight).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };
    let grade = grade_for(score, thresholds);
    debug!(score, %grade, components = breakdown.len(), "Score aggregated.");

    ScoreCard {
        score,
        grade,
        breakdown,
        findings,
    }
}

fn tls_component(tls: &TlsReport) -> f64 {
    if !tls.enabled {
        return 0.0;
    }
    match tls.days_until_expiry {
        None if !tls.has_certificate() => 100.0 * TLS_REACHABLE_CREDIT,
        Some(days) if days < 0 => 100.0 * TLS_REACHABLE_CREDIT,
        _ if !tls.valid => 100.0 * TLS_REACHABLE_CREDIT,
        Some(days) if days <= EXPIRY_WARNING_DAYS => 100.0 * TLS_EXPIRING_CREDIT,
        _ => 100.0,
    }
}

fn ports_component(ports: &PortScanResult, weights: &ScoringWeights) -> f64 {
    let risky = ports
        .open_ports
        .iter()
        .filter(|entry| is_risky_port(entry.port))
        .count() as f64;
    (100.0 - risky * weights.risky_port_penalty).max(0.0)
}

fn https_component(secure: bool, redirects: Option<&RedirectChain>) -> f64 {
    let downgraded = redirects.is_some_and(|chain| chain.https_downgrade);
    if secure && !downgraded { 100.0 } else { 0.0 }
}

fn technology_component(headers: &HeaderReport, weights: &ScoringWeights) -> f64 {
    let mut score = 100.0;
    if headers.server.as_deref().is_some_and(discloses_version) {
        score -= weights.version_disclosure_penalty;
    }
    if headers.powered_by.is_some() {
        score -= weights.powered_by_penalty;
    }
    f64::max(score, 0.0)
}

/// Maps a score to the first grade whose floor it reaches; below every floor is an F.
pub fn grade_for(score: u8, thresholds: &[GradeThreshold]) -> Grade {
    thresholds
        .iter()
        .find(|t| score >= t.min_score)
        .map(|t| t.grade)
        .unwrap_or(Grade::F)
}
