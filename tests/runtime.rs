//! The event loop end to end, over fake transports.

mod common;

use common::*;
use notif_feed::{
    ChannelState, ClientConfig, CloseCode, Delivery, DetailToggle, EventQuery, FeedError,
    FeedRuntime, FilterChangeKind, HttpResponse, ReconnectConfig, Result, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;

const EVENTS: &str = "-/api/events";

fn config() -> ClientConfig {
    init_tracing();
    ClientConfig::new(BASE).unwrap()
}

#[test]
fn test_history_then_live_with_filters() {
    let transport = FakeTransport::new();
    transport.respond(
        EVENTS,
        HttpResponse::ok(history_body(&[
            notification("a", "r1", 20.0, &["deploy"]),
            notification("b", "r2", 10.0, &["build"]),
        ])),
    );
    let connector = FakeConnector::default();
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport.clone(), connector.clone(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    let caught_up = wait_for(&observed, |o| matches!(o, Observed::CaughtUp { .. }));
    assert_eq!(
        caught_up,
        Observed::CaughtUp {
            history: 2,
            holdback: 0,
            degraded: false
        }
    );

    let sink = connector.wait_opened(1);
    sink.opened();
    wait_for(&observed, |o| *o == Observed::State(ChannelState::Open));

    handle.add_filter("deploy").unwrap();
    match wait_for(&observed, |o| matches!(o, Observed::Filter { .. })) {
        Observed::Filter { change, visible } => {
            assert_eq!(change.kind, FilterChangeKind::Added);
            assert_eq!(visible, 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    sink.message(wire(&notification("c", "r3", 30.0, &["build", "nightly"])));
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Notification { .. })),
        Observed::Notification {
            id: "c".into(),
            origin: Delivery::Live,
            visible: false
        }
    );

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
    assert_eq!(connector.0.lock().closed, vec![CloseCode::NORMAL]);

    let seen = transport.requests_to(EVENTS);
    assert_eq!(seen.len(), 1);
    assert!(seen[0].url.query().unwrap().starts_with("min_ts="));
}

#[test]
fn test_history_failure_still_goes_live() {
    let transport = FakeTransport::new();
    transport.respond(EVENTS, HttpResponse::status(500));
    let connector = FakeConnector::default();
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport, connector.clone(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::CaughtUp { .. })),
        Observed::CaughtUp {
            history: 0,
            holdback: 0,
            degraded: true
        }
    );

    let sink = connector.wait_opened(1);
    sink.opened();
    sink.message(wire(&notification("x", "r1", 1.0, &[])));
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Notification { .. })),
        Observed::Notification {
            id: "x".into(),
            origin: Delivery::Live,
            visible: true
        }
    );

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
}

#[test]
fn test_reconnect_timer_and_abandon() {
    let transport = FakeTransport::new();
    transport.respond(EVENTS, HttpResponse::ok("{}"));
    let config = config().with_reconnect(ReconnectConfig {
        delay: Duration::from_millis(5),
        max_attempts: 2,
    });
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config, transport, FakeConnector::refusing(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    wait_for(&observed, |o| *o == Observed::State(ChannelState::Reconnecting(1)));
    wait_for(&observed, |o| *o == Observed::State(ChannelState::Reconnecting(2)));
    wait_for(&observed, |o| *o == Observed::State(ChannelState::Failed));
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Abandoned(_))),
        Observed::Abandoned(2)
    );

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
    assert!(!observed.try_iter().any(|o| matches!(o, Observed::Abandoned(_))));
}

#[test]
fn test_toggle_details_fetches_and_memoizes() {
    let transport = FakeTransport::new();
    transport
        .respond(EVENTS, HttpResponse::ok("{}"))
        .respond(
            "-/api/data",
            HttpResponse::ok(r#"{"data": [{"key": "k", "ts": 1, "data": "{}"}]}"#),
        );
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport.clone(), FakeConnector::default(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    handle.toggle_details("r1").unwrap();
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Toggled(..))),
        Observed::Toggled("r1".into(), DetailToggle::Opened)
    );
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Details(..))),
        Observed::Details("r1".into(), Ok(1))
    );

    handle.toggle_details("r1").unwrap();
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Toggled(..))),
        Observed::Toggled("r1".into(), DetailToggle::Closed)
    );

    // Re-opening is served from the cache.
    handle.toggle_details("r1").unwrap();
    wait_for(&observed, |o| matches!(o, Observed::Details(..)));

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
    assert_eq!(transport.requests_to("-/api/data").len(), 1);
}

#[test]
fn test_search_uses_active_filter() {
    let transport = FakeTransport::new();
    transport
        .respond(EVENTS, HttpResponse::ok("{}"))
        .respond(
            EVENTS,
            HttpResponse::ok(history_body(&[notification("hit", "r9", 150.0, &["deploy"])])),
        );
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport.clone(), FakeConnector::default(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    wait_for(&observed, |o| matches!(o, Observed::CaughtUp { .. }));
    handle.add_filter("deploy").unwrap();
    wait_for(&observed, |o| matches!(o, Observed::Filter { .. }));

    handle
        .search(EventQuery::default().between(Some(Timestamp(100.0)), Some(Timestamp(200.0))))
        .unwrap();
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Search(_))),
        Observed::Search(Ok(vec!["hit".to_string()]))
    );

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();

    let seen = transport.requests_to(EVENTS);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].url.query(), Some("min_ts=100&max_ts=200&any_tag=deploy"));
}

#[test]
fn test_known_tags_loaded_once() {
    let transport = FakeTransport::new();
    transport
        .respond(EVENTS, HttpResponse::ok("{}"))
        .respond("-/api/tags", HttpResponse::ok(r#"["deploy", "build"]"#));
    let (recorder, observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport.clone(), FakeConnector::default(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    handle.load_known_tags().unwrap();
    assert_eq!(
        wait_for(&observed, |o| matches!(o, Observed::Tags(_))),
        Observed::Tags(vec!["deploy".to_string(), "build".to_string()])
    );
    handle.load_known_tags().unwrap();

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
    assert_eq!(transport.requests_to("-/api/tags").len(), 1);
}

#[test]
fn test_handle_after_shutdown() {
    let transport = FakeTransport::new();
    transport.respond(EVENTS, HttpResponse::ok("{}"));
    let (recorder, _observed) = Recorder::new();
    let runtime = FeedRuntime::new(config(), transport, FakeConnector::default(), None, recorder).unwrap();
    let (handle, join) = runtime.spawn_thread().unwrap();

    handle.shutdown().unwrap();
    join.join().unwrap().unwrap();
    assert!(matches!(handle.add_filter("x"), Err(FeedError::Shutdown)));
}

#[test]
fn test_auth_required_needs_credentials() {
    let config = config().with_auth_required(true);
    let (recorder, _observed) = Recorder::new();
    let result = FeedRuntime::new(config, FakeTransport::new(), FakeConnector::default(), None, recorder);
    assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
}

#[test]
fn test_bootstrap_from_site_config() -> Result<()> {
    let transport = FakeTransport::new();
    transport.respond(
        "-/sitelocal.json",
        HttpResponse::ok(r#"{"basic_auth_passwd": true, "notif_limit": 20, "query_default_backrange": 60}"#),
    );
    let config = ClientConfig::bootstrap(BASE, transport as Arc<dyn notif_feed::HttpTransport>)?;
    assert!(config.auth_required);
    assert_eq!(config.notif_limit, 20);
    assert_eq!(config.query_default_backrange, Duration::from_secs(60));
    assert_eq!(config.app_name, "app");
    Ok(())
}
