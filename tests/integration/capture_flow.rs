//! Integration tests for the capture session flow
//!
//! Tests the flow: MockLauncher -> Coordinator -> archive -> sink, with the
//! coordinator driven directly so every intermediate state can be checked.

use std::sync::Arc;
use std::time::Duration;

use pagepack::agent::mock::{MockConfig, MockLauncher, MockMessageBuilder};
use pagepack::capture::{
    AgentEnvelope, AgentMessage, CaptureError, CapturedFile, CoordinatorEvent, Delivery,
    ResourceCounts, SessionId, SessionPhase, SurfaceCommand, TargetContextId,
};
use pagepack::coordinator::CoordinatorService;
use pagepack::surface::{SurfaceState, SurfaceView};

use super::common::determinism::{drain, memory_coordinator, percents};
use super::common::fixtures::unzip;

fn tab() -> TargetContextId {
    TargetContextId::new("tab-7")
}

/// The "My Page!" walkthrough: one inline style, one inline script, no
/// assets.
#[tokio::test]
async fn test_my_page_end_to_end() {
    let (mut coordinator, mut events, sink) = memory_coordinator(Arc::new(MockLauncher::new()));

    let id = coordinator
        .begin_session(tab(), "https://x.test/", "My Page!")
        .await
        .expect("session should start");

    coordinator.receive_markup("<html></html>".into());
    coordinator.receive_styles(vec![CapturedFile::inline(
        "inline-style-0.css",
        "body{color:red}",
    )]);
    coordinator.receive_scripts(vec![CapturedFile::inline(
        "inline-script-0.js",
        "console.log(1)",
    )]);
    coordinator.receive_assets(vec![]);

    let events_seen = drain(&mut events);
    assert_eq!(percents(&events_seen), vec![10, 30, 50, 70, 80, 90, 100]);

    let summary = match events_seen.last() {
        Some(CoordinatorEvent::Complete(summary)) => summary.clone(),
        other => panic!("Expected Complete, got {:?}", other),
    };
    assert_eq!(summary.session_id, id);
    assert_eq!(
        summary.counts,
        ResourceCounts {
            html: 1,
            css: 1,
            js: 1,
            other: 0
        }
    );
    // 13 + 15 + 14 bytes
    assert_eq!(summary.total_size_bytes, 42);

    let path = coordinator.retrieve_archive(&id).await.unwrap();
    assert_eq!(path.to_str(), Some("My_Page_-frontend.zip"));

    let entries = unzip(&sink.get("My_Page_-frontend.zip").unwrap());
    let names: Vec<&str> = entries.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "css/inline-style-0.css",
            "index.html",
            "js/inline-script-0.js",
            "manifest.json"
        ]
    );
    assert_eq!(entries["index.html"], "<html></html>");
    assert_eq!(entries["css/inline-style-0.css"], "body{color:red}");

    let manifest: serde_json::Value = serde_json::from_str(&entries["manifest.json"]).unwrap();
    assert_eq!(manifest["title"], "My Page!");
    assert_eq!(manifest["url"], "https://x.test/");
    assert_eq!(manifest["captureDate"], "2024-05-01T12:00:00.000Z");
    assert_eq!(manifest["counts"]["css"], 1);
}

/// Entry counts in the archive match the reported counts
#[tokio::test]
async fn test_counts_match_archive_entries() {
    let (mut coordinator, mut events, sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    let id = coordinator
        .begin_session(tab(), "https://x.test/", "Counts")
        .await
        .unwrap();

    coordinator.receive_markup("<html><body></body></html>".into());
    coordinator.receive_styles(vec![
        CapturedFile::inline("inline-style-0.css", ""),
        CapturedFile::fetched("a.css", "a", "https://x.test/a.css"),
    ]);
    coordinator.receive_scripts(vec![
        CapturedFile::inline("inline-script-0.js", "x"),
        CapturedFile::external_placeholder("lib.js", "https://cdn.test/lib.js"),
        CapturedFile::fetched("app.js", &"y".repeat(1000), "https://x.test/app.js"),
    ]);
    coordinator.receive_assets(vec![
        CapturedFile::fetched("logo.png", "png", "https://x.test/logo.png"),
        CapturedFile::fetched("font.woff2", "woff", "https://x.test/font.woff2"),
    ]);

    let summary = match drain(&mut events).pop() {
        Some(CoordinatorEvent::Complete(summary)) => summary,
        other => panic!("Expected Complete, got {:?}", other),
    };
    coordinator.retrieve_archive(&id).await.unwrap();
    let entries = unzip(&sink.get("Counts-frontend.zip").unwrap());

    let count = |prefix: &str| entries.keys().filter(|k| k.starts_with(prefix)).count();
    assert_eq!(summary.counts.css, count("css/"));
    assert_eq!(summary.counts.js, count("js/"));
    assert_eq!(summary.counts.other, count("assets/"));
    assert!(entries.contains_key("assets/images/logo.png"));
    assert!(entries.contains_key("assets/fonts/font.woff2"));

    let placeholder_len = CapturedFile::external_placeholder("lib.js", "https://cdn.test/lib.js")
        .content
        .len() as u64;
    assert_eq!(
        summary.total_size_bytes,
        26 + 1 + 1 + placeholder_len + 1000 + 3 + 4
    );
}

/// Downloads for any id other than the current one are refused
#[tokio::test]
async fn test_stale_download_is_refused() {
    let (mut coordinator, mut events, sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    coordinator
        .begin_session(tab(), "https://x.test/", "Stale")
        .await
        .unwrap();
    coordinator.receive_markup("<p>".into());
    coordinator.receive_styles(vec![]);
    coordinator.receive_scripts(vec![]);
    coordinator.receive_assets(vec![]);
    drain(&mut events);

    let err = coordinator
        .retrieve_archive(&SessionId::from_string("capture_0_deadbeef"))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::StaleRequest));
    assert!(sink.filenames().is_empty());
    assert_eq!(
        drain(&mut events),
        vec![CoordinatorEvent::error(
            "Capture data not available. Please try again."
        )]
    );
}

/// Asking for the archive before the last stage arrives is refused
#[tokio::test]
async fn test_download_before_assembly_is_refused() {
    let (mut coordinator, _events, sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    let id = coordinator
        .begin_session(tab(), "https://x.test/", "Early")
        .await
        .unwrap();
    coordinator.receive_markup("<p>".into());
    coordinator.receive_styles(vec![]);
    coordinator.receive_scripts(vec![]);

    let err = coordinator.retrieve_archive(&id).await.unwrap_err();
    assert!(matches!(err, CaptureError::StaleRequest));
    assert!(sink.filenames().is_empty());
    assert!(coordinator.is_in_progress());
}

/// A second start throws away everything from the first
#[tokio::test]
async fn test_restart_discards_previous_session() {
    let (mut coordinator, _events, _sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    let first = coordinator
        .begin_session(tab(), "https://x.test/", "First")
        .await
        .unwrap();
    coordinator.receive_markup("<html>first</html>".into());
    coordinator.receive_styles(vec![CapturedFile::inline("inline-style-0.css", "a{}")]);

    let second = coordinator
        .begin_session(tab(), "https://y.test/", "Second")
        .await
        .unwrap();
    assert_ne!(first, second);

    let session = coordinator.session().unwrap();
    assert_eq!(session.id, second);
    assert_eq!(session.title, "Second");
    assert!(session.resources.html.is_none());
    assert!(session.resources.css.is_none());
    assert_eq!(session.counts, ResourceCounts::default());
    assert_eq!(session.total_size_bytes, 0);

    // Late output from the first agent is not applied to the second session
    coordinator.receive(AgentEnvelope::new(
        first,
        Delivery::Markup("<html>late</html>".into()),
    ));
    assert!(coordinator.session().unwrap().resources.html.is_none());
}

/// Deliveries after a cancel are ignored and the agent is told to stop
#[tokio::test]
async fn test_cancel_drops_late_deliveries() {
    let launcher = MockLauncher::new();
    let (mut coordinator, mut events, _sink) = memory_coordinator(Arc::new(launcher.clone()));
    let id = coordinator
        .begin_session(tab(), "https://x.test/", "Cancelled")
        .await
        .unwrap();
    coordinator.receive_markup("<html></html>".into());

    coordinator.cancel_session();
    assert_eq!(coordinator.session().unwrap().phase(), SessionPhase::Cancelled);
    drain(&mut events);

    coordinator.receive(AgentEnvelope::new(id.clone(), Delivery::Styles(vec![])));
    coordinator.receive_scripts(vec![]);
    coordinator.receive_assets(vec![]);

    assert!(drain(&mut events).is_empty());
    let session = coordinator.session().unwrap();
    assert!(session.resources.css.is_none());
    assert!(session.archive().is_none());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(launcher.was_cancelled());
}

/// A launch failure is reported once and leaves the coordinator idle
#[tokio::test]
async fn test_injection_failure_resets_to_idle() {
    let launcher =
        MockLauncher::new().with_config(MockConfig::default().failing_with("tab crashed"));
    let (mut coordinator, mut events, _sink) = memory_coordinator(Arc::new(launcher));

    let err = coordinator
        .begin_session(tab(), "https://x.test/", "Broken")
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Injection(_)));
    assert!(coordinator.session().is_none());
    assert!(!coordinator.is_in_progress());

    let seen = drain(&mut events);
    let errors: Vec<&CoordinatorEvent> = seen
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::Error { .. }))
        .collect();
    assert_eq!(
        errors,
        vec![&CoordinatorEvent::error(
            "Failed to inject capture script: tab crashed"
        )]
    );
}

/// Out-of-order deliveries are rejected without touching state
#[tokio::test]
async fn test_out_of_order_delivery_is_ignored() {
    let (mut coordinator, mut events, _sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    coordinator
        .begin_session(tab(), "https://x.test/", "Order")
        .await
        .unwrap();
    drain(&mut events);

    coordinator.receive_scripts(vec![CapturedFile::inline("inline-script-0.js", "x")]);
    assert!(drain(&mut events).is_empty());

    coordinator.receive_markup("<p>".into());
    coordinator.receive_markup("<p>again</p>".into());
    let session = coordinator.session().unwrap();
    assert_eq!(session.total_size_bytes, 3);
    assert!(session.resources.js.is_none());
}

/// The surface view follows the service through a full capture
#[tokio::test]
async fn test_surface_follows_service_events() {
    let messages = MockMessageBuilder::new()
        .markup("<html></html>")
        .inline_style("body{color:red}")
        .inline_script("console.log(1)")
        .no_assets()
        .build();
    let launcher = MockLauncher::new().with_config(
        MockConfig::default()
            .with_messages(messages)
            .with_delay(Duration::from_millis(5)),
    );
    let (coordinator, mut events, sink) = memory_coordinator(Arc::new(launcher));
    let handle = CoordinatorService::new(coordinator).spawn();

    let mut view = SurfaceView::new();
    let start = view.start(tab(), "https://x.test/", "My Page!").unwrap();
    assert!(handle.send(start).await);
    assert!(view.start(tab(), "https://x.test/", "Again").is_none());

    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timed out")
            .expect("channel closed");
        view.apply(&event);
        match event {
            CoordinatorEvent::Complete(_) => {
                let download = view.download().unwrap();
                assert!(matches!(download, SurfaceCommand::Download { .. }));
                assert!(handle.send(download).await);
            }
            CoordinatorEvent::Saved { .. } => break,
            CoordinatorEvent::Error { message } => panic!("capture failed: {}", message),
            CoordinatorEvent::Progress { .. } => assert!(view.is_in_progress()),
        }
    }

    match view.state() {
        SurfaceState::Finished(summary) => assert_eq!(summary.total_size_bytes, 42),
        other => panic!("Expected Finished, got {:?}", other),
    }
    assert!(view.render().contains("Total size:  42 Bytes"));
    assert!(sink.get("My_Page_-frontend.zip").is_some());

    handle.shutdown().await.unwrap();
}

/// An agent failure mid-pipeline is surfaced as a single error
#[tokio::test]
async fn test_agent_failure_is_relayed() {
    let (mut coordinator, mut events, _sink) = memory_coordinator(Arc::new(MockLauncher::new()));
    let id = coordinator
        .begin_session(tab(), "https://x.test/", "Fails")
        .await
        .unwrap();
    coordinator.receive_markup("<p>".into());
    drain(&mut events);

    coordinator.receive(AgentEnvelope::new(
        id,
        AgentMessage::Failed {
            message: "context destroyed".into(),
        },
    ));

    assert_eq!(
        drain(&mut events),
        vec![CoordinatorEvent::error("Error during capture: context destroyed")]
    );
    assert!(coordinator.session().is_none());
}
