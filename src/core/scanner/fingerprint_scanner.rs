// src/core/scanner/fingerprint_scanner.rs

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, SERVER};
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::config::{Signature, SignatureTable};
use crate::core::models::{Finding, TechnologyProfile};

/// The final response of the header audit, handed over for fingerprinting.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub headers: HeaderMap,
    /// Response body, already truncated to the configured limit.
    pub body: String,
}

static RE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)+").unwrap());
static SCRIPT_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static META_GENERATOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name='generator']").unwrap());
static LINK_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").unwrap());

/// True when a banner such as `nginx/1.18.0` carries a dotted version number.
pub fn discloses_version(banner: &str) -> bool {
    RE_VERSION.is_match(banner)
}

/// Identifies the technologies behind a fetched page.
///
/// This is a pure transform: it performs no I/O and only looks at the response headers,
/// the lowercased body, and the `script`, `meta` and `link` elements of the parsed HTML.
///
/// # Arguments
/// * `page` - The final response of the header audit.
/// * `signatures` - The signature table to match against.
///
/// # Returns
/// A `TechnologyProfile` with the detected stack and the analysis findings.
pub fn run_fingerprint_scan(page: &FetchedPage, signatures: &SignatureTable) -> TechnologyProfile {
    info!(body_bytes = %page.body.len(), "Starting fingerprint scan.");

    let body = page.body.to_lowercase();
    let document = Html::parse_document(&page.body);
    let script_srcs = collect_attr(&document, &SCRIPT_SRC, "src");
    let link_hrefs = collect_attr(&document, &LINK_HREF, "href");
    let generator = collect_attr(&document, &META_GENERATOR, "content");
    debug!(
        scripts = script_srcs.len(),
        links = link_hrefs.len(),
        generator = ?generator.first(),
        "Parsed HTML document."
    );

    let header_text = page
        .headers
        .iter()
        .map(|(name, value)| {
            format!("{}: {}", name.as_str(), value.to_str().unwrap_or_default()).to_lowercase()
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut profile = TechnologyProfile {
        server: header_value(&page.headers, SERVER.as_str()),
        framework: header_value(&page.headers, "x-powered-by"),
        ..Default::default()
    };

    if let Some(server) = &profile.server {
        profile.detected.push(format!("Server: {server}"));
    }
    if let Some(framework) = &profile.framework {
        profile.detected.push(format!("Framework: {framework}"));
    }

    let generator = generator.join("\n");
    let script_srcs = script_srcs.join("\n");
    let link_hrefs = link_hrefs.join("\n");

    if let Some(cms) = first_match(&signatures.cms, &[body.as_str(), generator.as_str()]) {
        debug!(cms, "CMS detected.");
        profile.detected.push(format!("CMS: {cms}"));
        profile.cms = Some(cms.to_string());
    }

    profile.javascript_libraries = all_matches(
        &signatures.javascript,
        &[body.as_str(), script_srcs.as_str(), link_hrefs.as_str()],
    );
    for lib in &profile.javascript_libraries {
        profile.detected.push(format!("JS: {lib}"));
    }

    if let Some(cdn) = first_match(&signatures.cdn, &[body.as_str(), header_text.as_str()]) {
        debug!(cdn, "CDN detected.");
        profile.detected.push(format!("CDN: {cdn}"));
        profile.cdn = Some(cdn.to_string());
    }

    profile.analytics = all_matches(&signatures.analytics, &[body.as_str(), script_srcs.as_str()]);
    for tool in &profile.analytics {
        profile.detected.push(format!("Analytics: {tool}"));
    }

    profile.analysis = analyze_fingerprint_results(&profile);
    info!(
        technologies = %profile.detected.len(),
        findings = %profile.analysis.len(),
        "Fingerprint scan finished."
    );
    profile
}

fn collect_attr(document: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_lowercase)
        .collect()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn signature_matches(signature: &Signature, sources: &[&str]) -> bool {
    signature.patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        sources.iter().any(|source| source.contains(&pattern))
    })
}

fn first_match<'a>(table: &'a [Signature], sources: &[&str]) -> Option<&'a str> {
    table
        .iter()
        .find(|signature| signature_matches(signature, sources))
        .map(|signature| signature.name.as_str())
}

fn all_matches(table: &[Signature], sources: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for signature in table.iter().filter(|s| signature_matches(s, sources)) {
        if !found.contains(&signature.name) {
            found.push(signature.name.clone());
        }
    }
    found
}

fn analyze_fingerprint_results(profile: &TechnologyProfile) -> Vec<Finding> {
    let mut analyses = Vec::new();

    if let Some(server) = profile.server.as_deref().filter(|s| discloses_version(s)) {
        debug!(server, "Server banner discloses a version.");
        analyses.push(Finding::warning(format!(
            "Server banner discloses version information: {server}"
        )));
    }
    if let Some(framework) = profile.framework.as_deref().filter(|s| discloses_version(s)) {
        debug!(framework, "X-Powered-By discloses a version.");
        analyses.push(Finding::warning(format!(
            "X-Powered-By header discloses version information: {framework}"
        )));
    }
    if let Some(cdn) = &profile.cdn {
        analyses.push(Finding::success(format!("CDN detected: {cdn}")));
    }

    analyses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FindingType;
    use reqwest::header::HeaderValue;

    fn page(headers: &[(&'static str, &'static str)], body: &str) -> FetchedPage {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        FetchedPage {
            headers: map,
            body: body.to_string(),
        }
    }

    #[test]
    fn detects_wordpress_stack() {
        let html = r#"<html><head>
            <meta name="generator" content="WordPress 6.4.2">
            <script src="/wp-includes/js/jquery/jquery.min.js"></script>
            <script async src="https://www.googletagmanager.com/gtag/js?id=G-1"></script>
            </head><body></body></html>"#;
        let profile = run_fingerprint_scan(
            &page(&[("server", "nginx/1.18.0"), ("x-powered-by", "PHP/8.1.2")], html),
            &SignatureTable::default(),
        );

        assert_eq!(profile.cms.as_deref(), Some("WordPress"));
        assert_eq!(profile.javascript_libraries, vec!["jQuery".to_string()]);
        assert!(profile.analytics.contains(&"Google Tag Manager".to_string()));
        assert_eq!(profile.server.as_deref(), Some("nginx/1.18.0"));
        assert_eq!(profile.framework.as_deref(), Some("PHP/8.1.2"));
        assert!(profile.detected.contains(&"CMS: WordPress".to_string()));

        let warnings = profile
            .analysis
            .iter()
            .filter(|f| f.kind == FindingType::Warning)
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn cdn_detected_from_headers() {
        let profile = run_fingerprint_scan(
            &page(&[("server", "cloudflare"), ("cf-ray", "8a1b2c3d4e-AMS")], "<html></html>"),
            &SignatureTable::default(),
        );
        assert_eq!(profile.cdn.as_deref(), Some("Cloudflare"));
        assert_eq!(profile.analysis.len(), 1);
        assert_eq!(profile.analysis[0].kind, FindingType::Success);
    }

    #[test]
    fn plain_page_detects_nothing() {
        let profile = run_fingerprint_scan(
            &page(&[], "<html><body>Hello</body></html>"),
            &SignatureTable::default(),
        );
        assert!(profile.detected.is_empty());
        assert!(profile.analysis.is_empty());
        assert_eq!(profile.cms, None);
    }

    #[test]
    fn version_disclosure() {
        assert!(discloses_version("Apache/2.4.41 (Ubuntu)"));
        assert!(discloses_version("nginx/1.25.3"));
        assert!(!discloses_version("nginx"));
        assert!(!discloses_version("cloudflare"));
    }
}
