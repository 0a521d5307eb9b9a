//! Shared fakes for the integration tests.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use notif_feed::{
    Channel, ChannelConnector, ChannelEvent, ChannelSink, ChannelState, CloseCode, Delivery,
    DetailToggle, EventQuery, FeedEntry, FeedError, FeedObserver, FilterChange, HttpResponse,
    HttpTransport, Notification, ReconnectConfig, ReconnectingChannel, Result, RunDetails,
    BoundedFeed, StreamSynchronizer, SyncEffect,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const BASE: &str = "http://feed.test/";

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn notification(id: &str, run_id: &str, ts: f64, tags: &[&str]) -> Notification {
    Notification::new(id, run_id, ts, tags.iter().copied())
}

pub fn wire(n: &Notification) -> String {
    serde_json::to_string(n).unwrap()
}

// --- HTTP ---

/// A request as the transport saw it.
#[derive(Clone, Debug)]
pub struct Seen {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Routes by path (relative to the base); each route answers from a queue
/// whose last response repeats. Unknown paths get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    pub seen: Mutex<Vec<Seen>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, response: HttpResponse) -> &Self {
        self.routes
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests_to(&self, path: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .iter()
            .filter(|s| s.url.path().trim_start_matches('/') == path)
            .cloned()
            .collect()
    }
}

impl HttpTransport for FakeTransport {
    fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.seen.lock().push(Seen {
            url: url.clone(),
            headers: headers.to_vec(),
        });
        let path = url.path().trim_start_matches('/').to_string();
        let mut routes = self.routes.lock();
        let Some(queue) = routes.get_mut(&path) else {
            return Ok(HttpResponse::status(404));
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| FeedError::Transport(format!("no response for {path}")))
    }
}

/// `-/api/events` body for the given notifications.
pub fn history_body(notifications: &[Notification]) -> String {
    let mut grouped: HashMap<&str, Vec<serde_json::Value>> = HashMap::new();
    for n in notifications {
        grouped.entry(n.id.as_str()).or_default().push(serde_json::json!({
            "runid": n.run_id,
            "ts": n.timestamp.as_secs(),
            "tags": n.tags,
        }));
    }
    serde_json::to_string(&grouped).unwrap()
}

// --- Push channel ---

#[derive(Default)]
pub struct ConnectorLog {
    pub sinks: Vec<ChannelSink>,
    pub closed: Vec<CloseCode>,
    pub refuse: bool,
}

#[derive(Clone, Default)]
pub struct FakeConnector(pub Arc<Mutex<ConnectorLog>>);

impl FakeConnector {
    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.0.lock().refuse = true;
        connector
    }

    /// Sink of the most recently opened connection.
    pub fn sink(&self) -> ChannelSink {
        self.0.lock().sinks.last().cloned().expect("no connection opened")
    }

    pub fn opened(&self) -> usize {
        self.0.lock().sinks.len()
    }

    /// Poll until `n` connections were opened.
    pub fn wait_opened(&self, n: usize) -> ChannelSink {
        for _ in 0..500 {
            if self.opened() >= n {
                return self.sink();
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("connection {n} never opened");
    }
}

pub struct FakeChannel(Arc<Mutex<ConnectorLog>>);

impl Channel for FakeChannel {
    fn send(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, code: CloseCode) -> Result<()> {
        self.0.lock().closed.push(code);
        Ok(())
    }
}

impl ChannelConnector for FakeConnector {
    type Channel = FakeChannel;

    fn open(&self, _url: &Url, sink: ChannelSink) -> Result<FakeChannel> {
        let mut log = self.0.lock();
        if log.refuse {
            return Err(FeedError::Channel("connection refused".into()));
        }
        log.sinks.push(sink);
        Ok(FakeChannel(self.0.clone()))
    }
}

/// A synchronizer over a [`FakeConnector`], plus the receiving end of its
/// connector events.
pub fn synchronizer(
    capacity: usize,
    reconnect: ReconnectConfig,
) -> (StreamSynchronizer<FakeConnector>, FakeConnector, Receiver<ChannelEvent>) {
    let connector = FakeConnector::default();
    let (tx, rx) = unbounded();
    let channel = ReconnectingChannel::new(
        connector.clone(),
        Url::parse("ws://feed.test/-/notif").unwrap(),
        reconnect,
        tx,
    );
    let sync = StreamSynchronizer::new(channel, BoundedFeed::new(capacity), Duration::from_secs(3600));
    (sync, connector, rx)
}

/// Feed every queued connector event to the synchronizer.
pub fn pump(sync: &mut StreamSynchronizer<FakeConnector>, events: &Receiver<ChannelEvent>) -> Vec<SyncEffect> {
    events
        .try_iter()
        .flat_map(|event| sync.handle_channel_event(event))
        .collect()
}

pub fn pushed_ids(effects: &[SyncEffect]) -> Vec<(String, Delivery)> {
    effects
        .iter()
        .filter_map(|e| match e {
            SyncEffect::Pushed { origin, entry, .. } => Some((entry.notification.id.clone(), *origin)),
            _ => None,
        })
        .collect()
}

// --- Observer ---

#[derive(Clone, Debug, PartialEq)]
pub enum Observed {
    Notification { id: String, origin: Delivery, visible: bool },
    Filter { change: FilterChange, visible: usize },
    Tags(Vec<String>),
    CaughtUp { history: usize, holdback: usize, degraded: bool },
    State(ChannelState),
    Abandoned(u32),
    Toggled(String, DetailToggle),
    Details(String, std::result::Result<usize, String>),
    Search(std::result::Result<Vec<String>, String>),
}

/// Forwards every callback to the test thread.
pub struct Recorder(pub Sender<Observed>);

impl Recorder {
    pub fn new() -> (Self, Receiver<Observed>) {
        let (tx, rx) = unbounded();
        (Self(tx), rx)
    }

    fn emit(&self, observed: Observed) {
        let _ = self.0.send(observed);
    }
}

impl FeedObserver for Recorder {
    fn on_notification(&mut self, entry: &FeedEntry, origin: Delivery, _evicted: Option<&FeedEntry>) {
        self.emit(Observed::Notification {
            id: entry.notification.id.clone(),
            origin,
            visible: entry.visible,
        });
    }

    fn on_filter_changed(&mut self, change: &FilterChange, feed: &BoundedFeed) {
        self.emit(Observed::Filter {
            change: change.clone(),
            visible: feed.visible().count(),
        });
    }

    fn on_tags_discovered(&mut self, tags: &[String]) {
        self.emit(Observed::Tags(tags.to_vec()));
    }

    fn on_caught_up(&mut self, history: usize, holdback: usize, degraded: bool) {
        self.emit(Observed::CaughtUp {
            history,
            holdback,
            degraded,
        });
    }

    fn on_channel_state(&mut self, state: ChannelState) {
        self.emit(Observed::State(state));
    }

    fn on_channel_abandoned(&mut self, attempts: u32) {
        self.emit(Observed::Abandoned(attempts));
    }

    fn on_detail_toggled(&mut self, run_id: &str, toggle: DetailToggle) {
        self.emit(Observed::Toggled(run_id.to_string(), toggle));
    }

    fn on_details(&mut self, run_id: &str, result: &Result<Arc<RunDetails>>) {
        let summary = match result {
            Ok(details) => Ok(details.records.len()),
            Err(e) => Err(e.to_string()),
        };
        self.emit(Observed::Details(run_id.to_string(), summary));
    }

    fn on_search_results(&mut self, _query: &EventQuery, result: &Result<Vec<Notification>>) {
        let summary = match result {
            Ok(found) => Ok(found.iter().map(|n| n.id.clone()).collect()),
            Err(e) => Err(e.to_string()),
        };
        self.emit(Observed::Search(summary));
    }
}

/// Next observation matching `pred`, skipping others; panics after 5s.
pub fn wait_for(rx: &Receiver<Observed>, pred: impl Fn(&Observed) -> bool) -> Observed {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let left = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(left) {
            Ok(observed) if pred(&observed) => return observed,
            Ok(_) => continue,
            Err(_) => panic!("timed out waiting for observation"),
        }
    }
}
