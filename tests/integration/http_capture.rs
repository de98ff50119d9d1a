//! End-to-end capture over HTTP
//!
//! Tests the flow: wiremock page -> PageLauncher + HttpFetcher -> agent task
//! -> CoordinatorService -> archive, with no mocks inside the crate.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use pagepack::agent::{AgentOptions, HttpFetcher, PageLauncher, DEFAULT_USER_AGENT};
use pagepack::capture::{CaptureSummary, CoordinatorEvent, SurfaceCommand, TargetContextId};
use pagepack::coordinator::CoordinatorService;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::determinism::{fixed_clock, memory_coordinator};
use super::common::fixtures::{unzip, CART_JS, SHOP_PAGE, SITE_CSS};

async fn shop_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(SHOP_PAGE),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SITE_CSS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/js/cart.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CART_JS))
        .mount(&server)
        .await;
    server
}

fn launcher(options: AgentOptions) -> PageLauncher {
    let fetcher = HttpFetcher::new(Duration::from_secs(5), DEFAULT_USER_AGENT).unwrap();
    PageLauncher::new(Arc::new(fetcher), fixed_clock(), options)
}

async fn wait_for_complete(
    events: &mut mpsc::UnboundedReceiver<CoordinatorEvent>,
) -> CaptureSummary {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event timed out")
            .expect("event channel closed");
        match event {
            CoordinatorEvent::Complete(summary) => return summary,
            CoordinatorEvent::Error { message } => panic!("capture failed: {}", message),
            _ => {}
        }
    }
}

/// Fetches same-origin resources, omits failures and leaves cross-origin
/// scripts as placeholders
#[tokio::test]
async fn test_capture_page_over_http() {
    let server = shop_server().await;
    let page_url = format!("{}/", server.uri());

    let (coordinator, mut events, sink) =
        memory_coordinator(Arc::new(launcher(AgentOptions::default())));
    let handle = CoordinatorService::new(coordinator).spawn();

    assert!(
        handle
            .send(SurfaceCommand::Start {
                target: TargetContextId::new("tab-1"),
                source_url: page_url.clone(),
                title: "Corner Shop".into(),
            })
            .await
    );

    let summary = wait_for_complete(&mut events).await;
    assert_eq!(summary.counts.html, 1);
    assert_eq!(summary.counts.css, 2);
    assert_eq!(summary.counts.js, 3);
    assert_eq!(summary.counts.other, 0);

    assert!(
        handle
            .send(SurfaceCommand::Download {
                session_id: summary.session_id.clone()
            })
            .await
    );
    handle.shutdown().await.unwrap();

    let entries = unzip(&sink.get("Corner_Shop-frontend.zip").unwrap());
    assert!(entries["index.html"].starts_with("<!DOCTYPE html><html>"));
    assert!(entries["index.html"].contains("<h1>Corner Shop</h1>"));
    assert_eq!(entries["css/inline-style-0.css"], "body{margin:0}");
    assert_eq!(entries["css/site.css"], SITE_CSS);
    assert!(!entries.contains_key("css/missing.css"));
    assert_eq!(entries["js/inline-script-0.js"], "window.shop = {};");
    assert_eq!(entries["js/cart.js"], CART_JS);
    assert!(entries["js/analytics.js"]
        .starts_with("// External script from https://cdn.example.net/lib/analytics.js"));
    assert!(!entries.keys().any(|k| k.contains("inject")));

    let requested: BTreeSet<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    let expected: BTreeSet<String> = ["/", "/css/site.css", "/css/missing.css", "/js/cart.js"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(requested, expected);
}

/// Concurrent fetching produces the same archive order as sequential
#[tokio::test]
async fn test_concurrent_fetch_keeps_order() {
    let server = shop_server().await;
    Mock::given(method("GET"))
        .and(path("/css/missing.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late{}")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let (mut coordinator, mut events, _sink) = memory_coordinator(Arc::new(launcher(
        AgentOptions::default().with_fetch_concurrency(4),
    )));
    coordinator
        .begin_session(
            TargetContextId::new("tab-1"),
            format!("{}/", server.uri()),
            "Corner Shop",
        )
        .await
        .unwrap();

    let service = CoordinatorService::new(coordinator).spawn();
    let summary = wait_for_complete(&mut events).await;
    assert_eq!(summary.counts.css, 3);

    let coordinator = service.shutdown().await.unwrap();
    let css = coordinator
        .session()
        .unwrap()
        .resources
        .css
        .clone()
        .unwrap();
    let names: Vec<&str> = css.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, vec!["inline-style-0.css", "site.css", "missing.css"]);
}

/// A page that cannot be loaded fails the start
#[tokio::test]
async fn test_unreachable_page_is_an_injection_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let (mut coordinator, mut events, _sink) =
        memory_coordinator(Arc::new(launcher(AgentOptions::default())));
    let result = coordinator
        .begin_session(
            TargetContextId::new("tab-1"),
            format!("{}/gone", server.uri()),
            "Gone",
        )
        .await;
    assert!(result.is_err());

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    match last {
        Some(CoordinatorEvent::Error { message }) => {
            assert!(message.starts_with("Failed to inject capture script:"));
            assert!(message.contains("HTTP 410"));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}
