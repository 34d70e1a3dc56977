// src/core/scanner/headers_scanner.rs

use std::collections::HashSet;
use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION, SERVER, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{HeaderCheck, ScanConfig};
use crate::core::models::{
    Finding, HeaderReport, HeaderStatus, HttpAudit, RedirectChain, RedirectHop,
};
use crate::core::scanner::fingerprint_scanner::{FetchedPage, run_fingerprint_scan};

/// Header values are cut to this many characters in the report.
const MAX_VALUE_LEN: usize = 100;

/// Audits the HTTP security headers of a URL.
///
/// Redirects are followed by hand so every hop can be recorded; the chain stops at
/// `max_redirects` hops or as soon as a URL repeats. The headers of the last response
/// are then checked against the configured checklist. When `fingerprint` is set the
/// same response is also handed to the technology fingerprinter.
///
/// # Arguments
/// * `url` - The normalized absolute URL to fetch.
/// * `config` - Supplies the checklist, hop limit, body limit, user agent and signatures.
/// * `timeout` - Deadline for each individual request.
/// * `fingerprint` - Whether to fingerprint the final response.
///
/// # Returns
/// An `HttpAudit` holding the header report, the redirect chain and the optional profile.
pub async fn run_headers_scan(
    url: &str,
    config: &ScanConfig,
    timeout: Duration,
    fingerprint: bool,
) -> HttpAudit {
    info!(url, "Starting headers scan.");

    let client = match Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client for headers scan.");
            return failed_audit(url, config, format!("Failed to build HTTP client: {e}"));
        }
    };

    let start = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return failed_audit(url, config, format!("Invalid URL: {e}")),
    };

    let walk = match follow_redirects(&client, start.clone(), config.max_redirects).await {
        Ok(walk) => walk,
        Err(e) => {
            error!(url, error = %e, "HTTP request failed for headers scan.");
            return failed_audit(url, config, format!("HTTP request failed: {e}"));
        }
    };

    let status = walk.response.status();
    info!(status = %status, hops = walk.hops.len(), "Received final HTTP response.");
    let headers = walk.response.headers().clone();

    // A chain that died mid-way leaves a redirect stub, not the site's final response.
    let broken = !walk.truncated && status.is_redirection() && walk.error.is_some();
    let mut report = if broken {
        warn!(url, "Redirect chain broken before the final response.");
        let mut report = audit_headers(&HeaderMap::new(), &config.header_checklist);
        report.error = walk
            .error
            .as_ref()
            .map(|e| format!("Final response not reached: {e}"));
        report
    } else {
        audit_headers(&headers, &config.header_checklist)
    };
    report.status_code = Some(status.as_u16());
    report.final_url = Some(walk.final_url.to_string());

    let redirects = summarize_chain(&start, walk.hops, &walk.final_url, walk.truncated, walk.error);

    let technology = if fingerprint && !broken {
        let body = read_body(walk.response, config.max_body_bytes).await;
        Some(run_fingerprint_scan(&FetchedPage { headers, body }, &config.signatures))
    } else {
        None
    };

    report.analysis = analyze_headers_results(&report, &redirects, &config.header_checklist);
    info!(findings = %report.analysis.len(), score = report.score, "Headers scan finished.");

    HttpAudit {
        headers: report,
        redirects,
        technology,
    }
}

/// The outcome of walking a redirect chain.
struct RedirectWalk {
    response: Response,
    final_url: Url,
    hops: Vec<RedirectHop>,
    truncated: bool,
    error: Option<String>,
}

/// Follows redirects from `start`. Only a failure of the very first request is an error;
/// a later failure ends the walk at the last response received.
async fn follow_redirects(
    client: &Client,
    start: Url,
    max_redirects: usize,
) -> Result<RedirectWalk, reqwest::Error> {
    let mut current = start;
    let mut visited = HashSet::from([current.to_string()]);
    let mut hops = Vec::new();

    debug!(url = %current, "Requesting URL.");
    let mut response = client.get(current.clone()).send().await?;

    loop {
        let Some(next) = redirect_target(&response, &current) else {
            return Ok(RedirectWalk {
                response,
                final_url: current,
                hops,
                truncated: false,
                error: None,
            });
        };

        if hops.len() >= max_redirects {
            warn!(url = %current, max_redirects, "Redirect limit reached.");
            return Ok(RedirectWalk {
                response,
                final_url: current,
                hops,
                truncated: true,
                error: Some(format!("Stopped after {max_redirects} redirects")),
            });
        }

        hops.push(RedirectHop {
            url: current.to_string(),
            status_code: response.status().as_u16(),
            redirects_to: next.to_string(),
        });

        if !visited.insert(next.to_string()) {
            warn!(url = %next, "Redirect loop detected.");
            return Ok(RedirectWalk {
                response,
                final_url: current,
                hops,
                truncated: true,
                error: Some(format!("Redirect loop detected at {next}")),
            });
        }

        debug!(url = %next, "Following redirect.");
        match client.get(next.clone()).send().await {
            Ok(following) => {
                response = following;
                current = next;
            }
            Err(e) => {
                warn!(url = %next, error = %e, "Request failed mid-chain.");
                return Ok(RedirectWalk {
                    response,
                    final_url: current,
                    hops,
                    truncated: false,
                    error: Some(format!("Request to {next} failed: {e}")),
                });
            }
        }
    }
}

/// Resolves the `Location` of a redirect response against the URL that produced it.
fn redirect_target(response: &Response, current: &Url) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

/// Reads at most `limit` bytes of the body, stopping quietly on a read error.
async fn read_body(mut response: Response, limit: usize) -> String {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read response body.");
                break;
            }
        }
    }
    debug!(bytes = body.len(), "Read response body.");
    String::from_utf8_lossy(&body).into_owned()
}

fn summarize_chain(
    start: &Url,
    hops: Vec<RedirectHop>,
    final_url: &Url,
    truncated: bool,
    error: Option<String>,
) -> RedirectChain {
    let https_downgrade = hops
        .iter()
        .any(|hop| hop.url.starts_with("https://") && hop.redirects_to.starts_with("http://"));
    let https_upgrade = start.scheme() == "http" && final_url.scheme() == "https";

    RedirectChain {
        count: hops.len(),
        has_redirects: !hops.is_empty(),
        chain: hops,
        final_url: final_url.to_string(),
        https_upgrade,
        https_downgrade,
        truncated,
        error,
    }
}

fn failed_audit(url: &str, config: &ScanConfig, error: String) -> HttpAudit {
    let mut report = audit_headers(&HeaderMap::new(), &config.header_checklist);
    report.error = Some(error.clone());
    let redirects = RedirectChain {
        final_url: url.to_string(),
        error: Some(error),
        ..Default::default()
    };
    report.analysis = analyze_headers_results(&report, &redirects, &config.header_checklist);
    HttpAudit {
        headers: report,
        redirects,
        technology: None,
    }
}

/// Checks a set of response headers against the checklist.
///
/// Pure: the score is `round(100 * present / total)`, and header values are truncated
/// to 100 characters.
pub fn audit_headers(headers: &HeaderMap, checklist: &[HeaderCheck]) -> HeaderReport {
    let mut report = HeaderReport {
        total_headers: checklist.len(),
        ..Default::default()
    };

    for check in checklist {
        let value = check_header(headers, &check.name);
        if value.is_some() {
            report.present_count += 1;
        }
        report.headers.insert(
            check.name.clone(),
            HeaderStatus {
                present: value.is_some(),
                value,
                recommendation: check.recommendation.clone(),
            },
        );
    }

    if report.total_headers > 0 {
        report.score =
            (100.0 * report.present_count as f64 / report.total_headers as f64).round() as u8;
    }

    report.server = header_text(headers, SERVER.as_str());
    report.powered_by = header_text(headers, "x-powered-by");
    report.cookies_secure = cookies_secure(headers);
    report
}

/// Returns the truncated value of a header, or `None` if it is absent.
fn check_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => {
            debug!(header_name = name, value = s, "Header found.");
            Some(s.chars().take(MAX_VALUE_LEN).collect())
        }
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some("[Invalid UTF-8]".to_string())
        }
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.chars().take(MAX_VALUE_LEN).collect())
}

/// `Some(true)` when every `Set-Cookie` carries the `Secure` attribute, `None` without cookies.
fn cookies_secure(headers: &HeaderMap) -> Option<bool> {
    let cookies: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if cookies.is_empty() {
        return None;
    }
    Some(cookies.iter().all(|cookie| {
        cookie
            .split(';')
            .skip(1)
            .any(|attr| attr.trim().eq_ignore_ascii_case("secure"))
    }))
}

/// Analyzes the header report and the redirect chain to generate findings.
/// Missing headers are reported in checklist order with their remediation text.
fn analyze_headers_results(
    report: &HeaderReport,
    chain: &RedirectChain,
    checklist: &[HeaderCheck],
) -> Vec<Finding> {
    debug!("Analyzing collected header data.");
    let mut analyses = Vec::new();

    if let Some(error) = &report.error {
        match chain.error.as_deref() {
            Some(chain_error) if chain.has_redirects && !chain.truncated => {
                analyses.push(Finding::warning(format!(
                    "Redirect chain broken: {chain_error}"
                )));
            }
            _ => analyses.push(Finding::danger(format!(
                "Security headers could not be retrieved: {error}"
            ))),
        }
        return analyses;
    }

    if report.present_count == report.total_headers {
        analyses.push(Finding::success(format!(
            "All {} security headers present",
            report.total_headers
        )));
    }
    for check in checklist {
        if report.headers.get(&check.name).is_some_and(|status| !status.present) {
            debug!(header_name = %check.name, "Header missing, adding warning.");
            analyses.push(Finding::warning(check.remediation.clone()));
        }
    }

    if report.cookies_secure == Some(false) {
        analyses.push(Finding::warning("Cookies are set without the Secure flag"));
    }

    if chain.https_downgrade {
        analyses.push(Finding::danger("Redirect chain downgrades from HTTPS to HTTP"));
    } else if chain.https_upgrade {
        analyses.push(Finding::success("HTTP to HTTPS redirect enabled"));
    }
    if chain.truncated {
        let reason = chain.error.as_deref().unwrap_or("too many redirects");
        analyses.push(Finding::warning(format!("Redirect chain truncated: {reason}")));
    }

    analyses
}
