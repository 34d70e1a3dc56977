// src/core/scanner/whois_scanner.rs

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::core::knowledge_base::{
    PRIVACY_MARKERS, REPUTABLE_REGISTRARS, WHOIS_ROOT_SERVER, rdap_url,
};
use crate::core::models::{Finding, RegistrationSource, RiskLevel, TrustReport};

const NOT_AVAILABLE: &str = "Not Available";
const WHOIS_PORT: u16 = 43;
/// Upper bound on a WHOIS reply; registries answer with a few KiB.
const MAX_WHOIS_BYTES: u64 = 64 * 1024;

/// Registration facts gathered from RDAP or WHOIS, before scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub registrar: Option<String>,
    pub organization: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub updated_date: Option<NaiveDate>,
    pub name_servers: Vec<String>,
    pub source: RegistrationSource,
}

impl RegistrationRecord {
    fn is_empty(&self) -> bool {
        self.registrar.is_none()
            && self.organization.is_none()
            && self.creation_date.is_none()
            && self.expiry_date.is_none()
    }
}

/// Runs the domain trust analysis for a registered domain.
///
/// RDAP is tried first; classic WHOIS over port 43 is the fallback. A domain for which
/// neither source returns data is reported as unavailable rather than as an error.
///
/// # Arguments
/// * `domain` - The registered domain, e.g. `example.co.uk`.
/// * `timeout` - Deadline for each of the two lookups.
/// * `user_agent` - Sent with the RDAP request.
///
/// # Returns
/// A `TrustReport` with the registration data, trust score and findings.
pub async fn run_whois_scan(domain: &str, timeout: Duration, user_agent: &str) -> TrustReport {
    info!(domain, "Starting domain trust scan.");

    let record = match lookup_rdap(domain, timeout, user_agent).await {
        Ok(record) if !record.is_empty() => Some(record),
        Ok(_) => {
            debug!(domain, "RDAP returned no registration data, trying WHOIS.");
            lookup_whois_with_timeout(domain, timeout).await
        }
        Err(e) => {
            warn!(domain, error = %e, "RDAP lookup failed, trying WHOIS.");
            lookup_whois_with_timeout(domain, timeout).await
        }
    };

    let report = evaluate_trust(record.as_ref(), Utc::now().date_naive());
    info!(
        trust_score = report.trust_score,
        risk = %report.risk_level,
        findings = %report.analysis.len(),
        "Domain trust scan finished."
    );
    report
}

async fn lookup_rdap(
    domain: &str,
    timeout: Duration,
    user_agent: &str,
) -> Result<RegistrationRecord, String> {
    let url = rdap_url(domain);
    debug!(%url, "Querying RDAP.");

    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| format!("HTTP client error: {e}"))?;

    let response = client
        .get(&url)
        .header(ACCEPT, "application/rdap+json, application/json")
        .send()
        .await
        .map_err(|e| format!("RDAP request failed: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("RDAP server answered {}", response.status()));
    }

    let data: Value = response
        .json()
        .await
        .map_err(|e| format!("RDAP response was not JSON: {e}"))?;
    Ok(parse_rdap(&data))
}

async fn lookup_whois_with_timeout(domain: &str, timeout: Duration) -> Option<RegistrationRecord> {
    match tokio::time::timeout(timeout, lookup_whois(domain)).await {
        Ok(Ok(record)) if !record.is_empty() => Some(record),
        Ok(Ok(_)) => {
            debug!(domain, "WHOIS returned no registration data.");
            None
        }
        Ok(Err(e)) => {
            warn!(domain, error = %e, "WHOIS lookup failed.");
            None
        }
        Err(_) => {
            warn!(domain, "WHOIS lookup timed out.");
            None
        }
    }
}

/// Asks the IANA root for the registry's WHOIS server, then queries that server.
async fn lookup_whois(domain: &str) -> Result<RegistrationRecord, std::io::Error> {
    let root = query_whois_server(WHOIS_ROOT_SERVER, domain).await?;
    let referral = root.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim().eq_ignore_ascii_case("refer") || key.trim().eq_ignore_ascii_case("whois"))
            .then(|| value.trim().to_string())
            .filter(|server| !server.is_empty())
    });

    let text = match referral {
        Some(server) => {
            debug!(%server, "Following WHOIS referral.");
            query_whois_server(&server, domain).await?
        }
        None => root,
    };
    Ok(parse_whois_text(&text))
}

async fn query_whois_server(server: &str, domain: &str) -> Result<String, std::io::Error> {
    let mut stream = TcpStream::connect((server, WHOIS_PORT)).await?;
    stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

    let mut buf = Vec::new();
    stream.take(MAX_WHOIS_BYTES).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extracts registration facts from an RDAP domain object.
pub fn parse_rdap(data: &Value) -> RegistrationRecord {
    let mut record = RegistrationRecord {
        source: RegistrationSource::Rdap,
        ..Default::default()
    };

    if let Some(events) = data.get("events").and_then(Value::as_array) {
        for event in events {
            let action = event.get("eventAction").and_then(Value::as_str);
            let date = event
                .get("eventDate")
                .and_then(Value::as_str)
                .and_then(parse_date);
            match (action, date) {
                (Some("registration"), Some(d)) => record.creation_date = Some(d),
                (Some("expiration"), Some(d)) => record.expiry_date = Some(d),
                (Some("last changed"), Some(d)) => record.updated_date = Some(d),
                _ => {}
            }
        }
    }

    if let Some(nameservers) = data.get("nameservers").and_then(Value::as_array) {
        record.name_servers = nameservers
            .iter()
            .filter_map(|ns| ns.get("ldhName").and_then(Value::as_str))
            .map(|name| name.trim_end_matches('.').to_lowercase())
            .collect();
    }

    if let Some(entities) = data.get("entities").and_then(Value::as_array) {
        for entity in entities {
            let roles: Vec<&str> = entity
                .get("roles")
                .and_then(Value::as_array)
                .map(|roles| roles.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            if roles.contains(&"registrar") && record.registrar.is_none() {
                record.registrar = vcard_property(entity, "fn");
            }
            if roles.contains(&"registrant") && record.organization.is_none() {
                record.organization =
                    vcard_property(entity, "org").or_else(|| vcard_property(entity, "fn"));
            }
        }
    }

    record
}

/// Reads a text property out of an entity's jCard (`["vcard", [[name, {}, type, value], ...]]`).
fn vcard_property(entity: &Value, name: &str) -> Option<String> {
    entity
        .get("vcardArray")?
        .get(1)?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .find(|prop| prop.first().and_then(Value::as_str) == Some(name))
        .and_then(|prop| prop.get(3))
        .and_then(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => parts.iter().find_map(Value::as_str).map(str::to_string),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts registration facts from a classic WHOIS reply.
pub fn parse_whois_text(text: &str) -> RegistrationRecord {
    let mut record = RegistrationRecord {
        source: RegistrationSource::Whois,
        ..Default::default()
    };

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "registrar" | "registrar name" | "sponsoring registrar" => {
                record.registrar.get_or_insert_with(|| value.to_string());
            }
            "registrant organization" | "registrant organisation" | "registrant" | "org" => {
                record.organization.get_or_insert_with(|| value.to_string());
            }
            "creation date" | "created" | "created on" | "registered on" | "registration time"
            | "domain registration date" => {
                if record.creation_date.is_none() {
                    record.creation_date = parse_date(value);
                }
            }
            "registry expiry date" | "registrar registration expiration date"
            | "expiry date" | "expiration date" | "expires" | "expires on" | "paid-till" => {
                if record.expiry_date.is_none() {
                    record.expiry_date = parse_date(value);
                }
            }
            "updated date" | "last updated" | "last modified" | "changed" => {
                if record.updated_date.is_none() {
                    record.updated_date = parse_date(value);
                }
            }
            "name server" | "nserver" => {
                let ns = value
                    .split_whitespace()
                    .next()
                    .unwrap_or(value)
                    .trim_end_matches('.')
                    .to_lowercase();
                if !record.name_servers.contains(&ns) {
                    record.name_servers.push(ns);
                }
            }
            _ => {}
        }
    }

    record
}

/// Parses the date formats registries commonly use.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S", "%Y.%m.%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    for format in ["%Y-%m-%d", "%d-%b-%Y", "%d.%m.%Y", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    // Fall back to a leading ISO date, e.g. "2024-08-14T07:01:38.0Z (UTC)".
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Scores a registration record as of `today`.
///
/// The rubric adds up to 100 points: domain age (40), registrar reputation (25),
/// registrant organisation (20) and time to expiry (15).
pub fn evaluate_trust(record: Option<&RegistrationRecord>, today: NaiveDate) -> TrustReport {
    let Some(record) = record.filter(|r| !r.is_empty()) else {
        return TrustReport {
            available: false,
            registrar: NOT_AVAILABLE.to_string(),
            organization: NOT_AVAILABLE.to_string(),
            creation_date: None,
            expiry_date: None,
            updated_date: None,
            domain_age: "Unknown".to_string(),
            age_days: 0,
            trust_score: 0,
            risk_level: RiskLevel::Critical,
            name_servers: Vec::new(),
            source: RegistrationSource::None,
            analysis: vec![Finding::info("Domain registration data not available")],
        };
    };

    let age_days = record
        .creation_date
        .map(|created| (today - created).num_days().max(0))
        .unwrap_or(0);

    let mut score: u8 = match age_days {
        d if d > 1825 => 40,
        d if d > 730 => 30,
        d if d > 365 => 20,
        d if d > 180 => 10,
        _ => 0,
    };

    score += match record.registrar.as_deref() {
        Some(name) if is_reputable(name) => 25,
        Some(_) => 15,
        None => 0,
    };

    score += match record.organization.as_deref() {
        Some(org) if is_privacy_protected(org) => 10,
        Some(_) => 20,
        None => 0,
    };

    if let Some(expiry) = record.expiry_date {
        score += match (expiry - today).num_days() {
            d if d > 365 => 15,
            d if d > 90 => 10,
            d if d > 0 => 5,
            _ => 0,
        };
    }

    let risk_level = match score {
        s if s >= 75 => RiskLevel::Low,
        s if s >= 50 => RiskLevel::Medium,
        s if s >= 25 => RiskLevel::High,
        _ => RiskLevel::Critical,
    };
    debug!(age_days, score, risk = %risk_level, "Trust rubric evaluated.");

    let domain_age = if record.creation_date.is_some() {
        describe_age(age_days)
    } else {
        "Unknown".to_string()
    };

    let mut report = TrustReport {
        available: true,
        registrar: record
            .registrar
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        organization: record
            .organization
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        creation_date: record.creation_date,
        expiry_date: record.expiry_date,
        updated_date: record.updated_date,
        domain_age,
        age_days,
        trust_score: score,
        risk_level,
        name_servers: record.name_servers.clone(),
        source: record.source,
        analysis: Vec::new(),
    };
    report.analysis = analyze_trust_results(&report);
    report
}

fn is_reputable(registrar: &str) -> bool {
    let normalized: String = registrar
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    REPUTABLE_REGISTRARS.iter().any(|name| normalized.contains(name))
}

fn is_privacy_protected(organization: &str) -> bool {
    let lower = organization.to_lowercase();
    PRIVACY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Renders an age as `N years M months`, `N months` or `N days`.
fn describe_age(age_days: i64) -> String {
    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    }

    let years = age_days / 365;
    let months = (age_days % 365) / 30;
    match (years, months) {
        (0, 0) => plural(age_days, "day"),
        (0, m) => plural(m, "month"),
        (y, 0) => plural(y, "year"),
        (y, m) => format!("{} {}", plural(y, "year"), plural(m, "month")),
    }
}

fn analyze_trust_results(report: &TrustReport) -> Vec<Finding> {
    let summary = format!(
        "Domain trust score {}/100 ({} risk), registered {}",
        report.trust_score, report.risk_level, report.domain_age
    );
    let finding = match report.risk_level {
        RiskLevel::Low => Finding::success(summary),
        RiskLevel::Medium => Finding::info(summary),
        RiskLevel::High => Finding::warning(summary),
        RiskLevel::Critical => Finding::danger(summary),
    };
    vec![finding]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FindingType;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn parses_rdap_domain_object() {
        let data = json!({
            "objectClassName": "domain",
            "ldhName": "EXAMPLE.COM",
            "events": [
                {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2026-08-13T04:00:00Z"},
                {"eventAction": "last changed", "eventDate": "2024-08-14T07:01:38Z"}
            ],
            "nameservers": [
                {"objectClassName": "nameserver", "ldhName": "A.IANA-SERVERS.NET"},
                {"objectClassName": "nameserver", "ldhName": "B.IANA-SERVERS.NET"}
            ],
            "entities": [{
                "objectClassName": "entity",
                "roles": ["registrar"],
                "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["fn", {}, "text", "RESERVED-Internet Assigned Numbers Authority"]
                ]]
            }]
        });

        let record = parse_rdap(&data);
        assert_eq!(record.source, RegistrationSource::Rdap);
        assert_eq!(
            record.registrar.as_deref(),
            Some("RESERVED-Internet Assigned Numbers Authority")
        );
        assert_eq!(record.creation_date, NaiveDate::from_ymd_opt(1995, 8, 14));
        assert_eq!(record.expiry_date, NaiveDate::from_ymd_opt(2026, 8, 13));
        assert_eq!(record.name_servers, vec!["a.iana-servers.net", "b.iana-servers.net"]);
        assert_eq!(record.organization, None);
    }

    #[test]
    fn parses_whois_text() {
        let text = "\
Domain Name: EXAMPLE.ORG
Registrar: NameCheap, Inc.
Creation Date: 2015-03-02T10:00:00Z
Registry Expiry Date: 2027-03-02T10:00:00Z
Updated Date: 2024-01-10T00:00:00Z
Registrant Organization: Privacy service provided by Withheld for Privacy ehf
Name Server: DNS1.REGISTRAR-SERVERS.COM.
Name Server: DNS2.REGISTRAR-SERVERS.COM
";
        let record = parse_whois_text(text);
        assert_eq!(record.source, RegistrationSource::Whois);
        assert_eq!(record.registrar.as_deref(), Some("NameCheap, Inc."));
        assert_eq!(record.creation_date, NaiveDate::from_ymd_opt(2015, 3, 2));
        assert_eq!(record.expiry_date, NaiveDate::from_ymd_opt(2027, 3, 2));
        assert_eq!(record.name_servers.len(), 2);
        assert_eq!(record.name_servers[0], "dns1.registrar-servers.com");
    }

    #[test]
    fn established_domain_is_low_risk() {
        let record = RegistrationRecord {
            registrar: Some("MarkMonitor Inc.".into()),
            organization: Some("Example Corp".into()),
            creation_date: NaiveDate::from_ymd_opt(2005, 1, 1),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            source: RegistrationSource::Rdap,
            ..Default::default()
        };
        let report = evaluate_trust(Some(&record), today());
        assert!(report.available);
        assert_eq!(report.trust_score, 100);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.domain_age.starts_with("20 years"));
        assert_eq!(report.analysis[0].kind, FindingType::Success);
    }

    #[test]
    fn privacy_protected_young_domain() {
        let record = RegistrationRecord {
            registrar: Some("Some Small Registrar LLC".into()),
            organization: Some("REDACTED FOR PRIVACY".into()),
            creation_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            expiry_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            ..Default::default()
        };
        let report = evaluate_trust(Some(&record), today());
        // age 0 + registrar 15 + privacy 10 + expiry 10
        assert_eq!(report.trust_score, 35);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.domain_age, "2 months");
        assert_eq!(report.analysis[0].kind, FindingType::Warning);
    }

    #[test]
    fn missing_data_is_unavailable() {
        let report = evaluate_trust(None, today());
        assert!(!report.available);
        assert_eq!(report.registrar, "Not Available");
        assert_eq!(report.organization, "Not Available");
        assert_eq!(report.domain_age, "Unknown");
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(report.analysis.len(), 1);
        assert_eq!(report.analysis[0].kind, FindingType::Info);

        let empty = parse_whois_text("No match for \"NOPE.COM\".");
        assert!(!evaluate_trust(Some(&empty), today()).available);
    }

    #[test]
    fn age_descriptions() {
        assert_eq!(describe_age(1), "1 day");
        assert_eq!(describe_age(20), "20 days");
        assert_eq!(describe_age(65), "2 months");
        assert_eq!(describe_age(365), "1 year");
        assert_eq!(describe_age(800), "2 years 2 months");
    }

    #[test]
    fn parses_registry_date_formats() {
        assert_eq!(parse_date("14-Aug-1995"), NaiveDate::from_ymd_opt(1995, 8, 14));
        assert_eq!(parse_date("2001-02-03"), NaiveDate::from_ymd_opt(2001, 2, 3));
        assert_eq!(
            parse_date("2024-08-14T07:01:38.123Z"),
            NaiveDate::from_ymd_opt(2024, 8, 14)
        );
        assert_eq!(parse_date("not a date"), None);
    }
}
