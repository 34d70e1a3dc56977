// tests/headers_test.rs

mod common;

use std::time::Duration;

use common::{COMPLIANT_HEADERS, Route, serve};
use vanguard_deep_scan::ScanConfig;
use vanguard_deep_scan::core::models::FindingType;
use vanguard_deep_scan::core::scanner::headers_scanner::run_headers_scan;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn relative_redirect_is_followed_and_audited() {
    let addr = serve(vec![
        ("/start", Route::redirect(301, "/landing")),
        ("/landing", Route::ok(COMPLIANT_HEADERS, "<html></html>")),
    ])
    .await;
    let config = ScanConfig::default();

    let audit = run_headers_scan(&format!("http://{addr}/start"), &config, TIMEOUT, false).await;

    let chain = &audit.redirects;
    assert!(chain.error.is_none());
    assert!(chain.has_redirects);
    assert_eq!(chain.count, 1);
    assert_eq!(chain.chain[0].status_code, 301);
    assert_eq!(chain.chain[0].redirects_to, format!("http://{addr}/landing"));
    assert_eq!(chain.final_url, format!("http://{addr}/landing"));
    assert!(!chain.https_upgrade);
    assert!(!chain.truncated);

    assert_eq!(audit.headers.status_code, Some(200));
    assert_eq!(audit.headers.score, 100);
    assert!(audit.technology.is_none());
    assert!(audit.headers.analysis.iter().all(|f| f.kind == FindingType::Success));
}

#[tokio::test]
async fn redirect_loop_is_cut_short() {
    let addr = serve(vec![
        ("/a", Route::redirect(302, "/b")),
        ("/b", Route::redirect(302, "/a")),
    ])
    .await;
    let config = ScanConfig::default();

    let audit = run_headers_scan(&format!("http://{addr}/a"), &config, TIMEOUT, false).await;

    let chain = &audit.redirects;
    assert!(chain.truncated);
    assert_eq!(chain.count, 2);
    assert!(chain.error.as_deref().unwrap().contains("loop"));
    assert!(
        audit
            .headers
            .analysis
            .iter()
            .any(|f| f.message.starts_with("Redirect chain truncated"))
    );
}

#[tokio::test]
async fn hop_limit_stops_long_chains() {
    let addr = serve(vec![
        ("/1", Route::redirect(301, "/2")),
        ("/2", Route::redirect(301, "/3")),
        ("/3", Route::redirect(301, "/4")),
        ("/4", Route::ok(&[], "done")),
    ])
    .await;
    let config = ScanConfig {
        max_redirects: 2,
        ..ScanConfig::default()
    };

    let audit = run_headers_scan(&format!("http://{addr}/1"), &config, TIMEOUT, false).await;

    assert!(audit.redirects.truncated);
    assert_eq!(audit.redirects.count, 2);
    assert_eq!(audit.redirects.final_url, format!("http://{addr}/3"));
}

#[tokio::test]
async fn final_response_is_fingerprinted_in_deep_mode() {
    let body = r#"<html><head>
        <link rel="stylesheet" href="/wp-content/themes/site/style.css">
        <script src="https://code.jquery.com/jquery-3.7.1.min.js"></script>
        </head><body></body></html>"#;
    let addr = serve(vec![(
        "/",
        Route::ok(&[("Server", "nginx/1.18.0"), ("Set-Cookie", "sid=1; HttpOnly")], body),
    )])
    .await;
    let config = ScanConfig::default();

    let audit = run_headers_scan(&format!("http://{addr}/"), &config, TIMEOUT, true).await;

    let technology = audit.technology.as_ref().unwrap();
    assert_eq!(technology.cms.as_deref(), Some("WordPress"));
    assert!(technology.javascript_libraries.iter().any(|lib| lib == "jQuery"));
    assert_eq!(technology.server.as_deref(), Some("nginx/1.18.0"));
    assert!(technology.analysis.iter().any(|f| f.kind == FindingType::Warning));

    assert_eq!(audit.headers.server.as_deref(), Some("nginx/1.18.0"));
    assert_eq!(audit.headers.cookies_secure, Some(false));
    assert_eq!(audit.headers.score, 0);
}

#[tokio::test]
async fn redirect_to_dead_host_is_reported_as_broken_chain() {
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);
    let addr = serve(vec![(
        "/",
        Route::redirect(302, &format!("http://{dead_addr}/x")),
    )])
    .await;
    let config = ScanConfig::default();

    let audit = run_headers_scan(&format!("http://{addr}/"), &config, TIMEOUT, true).await;

    assert!(!audit.redirects.truncated);
    assert_eq!(audit.redirects.count, 1);
    assert!(audit.redirects.error.is_some());
    assert_eq!(audit.headers.status_code, Some(302));
    assert!(audit.headers.error.is_some());
    assert_eq!(audit.headers.present_count, 0);
    assert!(audit.technology.is_none());
    assert_eq!(audit.headers.analysis.len(), 1);
    assert_eq!(audit.headers.analysis[0].kind, FindingType::Warning);
    assert!(audit.headers.analysis[0].message.starts_with("Redirect chain broken"));
}

#[tokio::test]
async fn unreachable_host_is_reported_not_raised() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = ScanConfig::default();

    let audit = run_headers_scan(&format!("http://{addr}/"), &config, TIMEOUT, true).await;

    assert!(audit.headers.error.is_some());
    assert_eq!(audit.headers.present_count, 0);
    assert_eq!(audit.headers.total_headers, 6);
    assert!(audit.technology.is_none());
    assert_eq!(audit.headers.analysis.len(), 1);
    assert_eq!(audit.headers.analysis[0].kind, FindingType::Danger);
}
