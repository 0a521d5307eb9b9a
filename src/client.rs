//! Client configuration and the runtime tying all components together.

use crate::api::{ApiClient, ApiRequest, EventQuery, HttpTransport, SiteConfig};
use crate::channel::{ChannelConnector, ChannelEvent, ChannelState, ReconnectConfig, ReconnectingChannel};
use crate::detail::{CredentialSource, DetailCache, DEFAULT_DETAIL_CACHE_SIZE};
use crate::error::{FeedError, Result};
use crate::feed::{BoundedFeed, DetailToggle, FeedEntry, FilterChange, DEFAULT_FEED_CAPACITY};
use crate::sync::{Delivery, FetchToken, StreamSynchronizer, SyncEffect};
use crate::types::{Notification, RunDetails, Timestamp};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use url::Url;

const NOTIF_PATH: &str = "-/notif";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Where the feed is served, subpath included.
    pub base_url: Url,

    /// History loaded at startup, and the default search window.
    /// Default: 24h
    pub query_default_backrange: Duration,

    /// Feed capacity.
    /// Default: 500
    pub notif_limit: usize,

    /// Whether the detail endpoint needs a Basic credential.
    pub auth_required: bool,

    pub app_name: String,

    pub reconnect: ReconnectConfig,

    /// Number of runs whose details are memoized.
    /// Default: 256
    pub detail_cache_size: usize,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            query_default_backrange: Duration::from_secs(60 * 60 * 24),
            notif_limit: DEFAULT_FEED_CAPACITY,
            auth_required: false,
            app_name: "app".to_string(),
            reconnect: ReconnectConfig::default(),
            detail_cache_size: DEFAULT_DETAIL_CACHE_SIZE,
        })
    }

    /// Fetch `-/sitelocal.json` from `base_url` and apply it.
    pub fn bootstrap(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let mut config = Self::new(base_url)?;
        let site = ApiClient::new(config.base_url.clone(), transport).site_config()?;
        config.apply_site(&site)?;
        Ok(config)
    }

    /// Take over the server-published settings.
    pub fn apply_site(&mut self, site: &SiteConfig) -> Result<()> {
        self.query_default_backrange = Duration::try_from_secs_f64(site.query_default_backrange)
            .map_err(|e| FeedError::InvalidConfig(format!("query_default_backrange: {e}")))?;
        self.notif_limit = site.notif_limit;
        self.auth_required = site.auth_required;
        self.app_name = site.app_name.clone();
        let subpath = site.subpath.trim_end_matches('/');
        if !subpath.is_empty() {
            self.base_url.set_path(&format!("{subpath}/"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_backrange(mut self, backrange: Duration) -> Self {
        self.query_default_backrange = backrange;
        self
    }

    #[must_use]
    pub fn with_notif_limit(mut self, limit: usize) -> Self {
        self.notif_limit = limit;
        self
    }

    #[must_use]
    pub fn with_auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_detail_cache_size(mut self, size: usize) -> Self {
        self.detail_cache_size = size;
        self
    }

    /// Push-channel URL: `ws(s)://host{subpath}/-/notif`.
    pub fn notif_url(&self) -> Result<Url> {
        let mut url = self.base_url.join(NOTIF_PATH)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| FeedError::InvalidConfig(format!("cannot derive push URL from {}", self.base_url)))?;
        Ok(url)
    }
}

/// Presentation-layer callbacks. All run on the runtime thread.
#[allow(unused_variables)]
pub trait FeedObserver {
    fn on_notification(&mut self, entry: &FeedEntry, origin: Delivery, evicted: Option<&FeedEntry>) {}

    /// The active filter changed and visibility in `feed` is already updated.
    fn on_filter_changed(&mut self, change: &FilterChange, feed: &BoundedFeed) {}

    fn on_tags_discovered(&mut self, tags: &[String]) {}

    fn on_caught_up(&mut self, history: usize, holdback: usize, degraded: bool) {}

    fn on_channel_state(&mut self, state: ChannelState) {}

    /// Reconnection gave up. Only a new runtime recovers from this.
    fn on_channel_abandoned(&mut self, attempts: u32) {}

    fn on_detail_toggled(&mut self, run_id: &str, toggle: DetailToggle) {}

    fn on_details(&mut self, run_id: &str, result: &Result<Arc<RunDetails>>) {}

    fn on_search_results(&mut self, query: &EventQuery, result: &Result<Vec<Notification>>) {}
}

enum Command {
    AddFilter(String),
    RemoveFilter(String),
    ToggleFilter(String),
    ToggleDetails(String),
    FetchDetails(String),
    Search(EventQuery),
    LoadKnownTags,
    Shutdown,
}

/// Blocking work run on a worker thread.
#[derive(Clone, Debug)]
enum Job {
    History(FetchToken, ApiRequest),
    Details(String),
    Search(EventQuery),
    KnownTags,
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::History(..) => "history",
            Job::Details(_) => "details",
            Job::Search(_) => "search",
            Job::KnownTags => "tags",
        }
    }

    fn run(self, api: &ApiClient, details: &DetailCache) -> Completion {
        match self {
            Job::History(token, request) => Completion::History(token, api.history(&request)),
            Job::Details(run_id) => {
                let result = details.fetch(&run_id);
                Completion::Details(run_id, result)
            }
            Job::Search(query) => {
                let result = api.history(&ApiRequest::events(&query));
                Completion::Search(query, result)
            }
            Job::KnownTags => Completion::KnownTags(api.tags()),
        }
    }

    /// The completion reported when the job could not run at all.
    fn failed(self, error: FeedError) -> Completion {
        match self {
            Job::History(token, _) => Completion::History(token, Err(error)),
            Job::Details(run_id) => Completion::Details(run_id, Err(error)),
            Job::Search(query) => Completion::Search(query, Err(error)),
            Job::KnownTags => Completion::KnownTags(Err(error)),
        }
    }
}

enum Completion {
    History(FetchToken, Result<Vec<Notification>>),
    Details(String, Result<Arc<RunDetails>>),
    Search(EventQuery, Result<Vec<Notification>>),
    KnownTags(Result<Vec<String>>),
}

/// Cloneable handle for driving a running [`FeedRuntime`].
#[derive(Clone)]
pub struct FeedHandle {
    tx: Sender<Command>,
}

impl FeedHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| FeedError::Shutdown)
    }

    pub fn add_filter(&self, tag: impl Into<String>) -> Result<()> {
        self.send(Command::AddFilter(tag.into()))
    }

    pub fn remove_filter(&self, tag: impl Into<String>) -> Result<()> {
        self.send(Command::RemoveFilter(tag.into()))
    }

    pub fn toggle_filter(&self, tag: impl Into<String>) -> Result<()> {
        self.send(Command::ToggleFilter(tag.into()))
    }

    /// Open or close a run's detail view; opening fetches its details.
    pub fn toggle_details(&self, run_id: impl Into<String>) -> Result<()> {
        self.send(Command::ToggleDetails(run_id.into()))
    }

    pub fn fetch_details(&self, run_id: impl Into<String>) -> Result<()> {
        self.send(Command::FetchDetails(run_id.into()))
    }

    /// Ad-hoc listing; results go to `on_search_results`, not the feed.
    pub fn search(&self, query: EventQuery) -> Result<()> {
        self.send(Command::Search(query))
    }

    /// Merge the server's tag list into the known universe (once).
    pub fn load_known_tags(&self) -> Result<()> {
        self.send(Command::LoadKnownTags)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// Single-threaded event loop owning the synchronizer.
///
/// ```text
///   FeedHandle ──commands──▶ ┌─────────────┐ ──▶ FeedObserver
///   connector ──events────▶ │ FeedRuntime │
///   workers ──completions─▶ │  (one loop) │ ──▶ worker threads (HTTP)
///   reconnect timer ──────▶ └─────────────┘
/// ```
///
/// Feed state is only touched on the loop thread; workers perform the
/// blocking transport calls and post their results back.
pub struct FeedRuntime<C: ChannelConnector, O: FeedObserver> {
    config: ClientConfig,
    api: ApiClient,
    details: Arc<DetailCache>,
    sync: StreamSynchronizer<C>,
    observer: O,
    command_tx: Sender<Command>,
    commands: Receiver<Command>,
    channel_events: Receiver<ChannelEvent>,
    completion_tx: Sender<Completion>,
    completions: Receiver<Completion>,
    reconnect_at: Option<Instant>,
    tags_requested: bool,
}

impl<C: ChannelConnector, O: FeedObserver> FeedRuntime<C, O> {
    /// `credentials` is required when `config.auth_required` is set.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        connector: C,
        credentials: Option<Arc<dyn CredentialSource>>,
        observer: O,
    ) -> Result<Self> {
        let api = ApiClient::new(config.base_url.clone(), transport);
        let details = match (config.auth_required, credentials) {
            (true, Some(source)) => DetailCache::with_credentials(api.clone(), config.detail_cache_size, source),
            (true, None) => {
                return Err(FeedError::InvalidConfig(
                    "server requires credentials but no credential source was given".into(),
                ))
            }
            (false, _) => DetailCache::new(api.clone(), config.detail_cache_size),
        };

        let (event_tx, channel_events) = unbounded();
        let channel = ReconnectingChannel::new(connector, config.notif_url()?, config.reconnect.clone(), event_tx);
        let feed = BoundedFeed::new(config.notif_limit);
        let sync = StreamSynchronizer::new(channel, feed, config.query_default_backrange);

        let (command_tx, commands) = unbounded();
        let (completion_tx, completions) = unbounded();

        Ok(Self {
            config,
            api,
            details: Arc::new(details),
            sync,
            observer,
            command_tx,
            commands,
            channel_events,
            completion_tx,
            completions,
            reconnect_at: None,
            tags_requested: false,
        })
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            tx: self.command_tx.clone(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn synchronizer(&self) -> &StreamSynchronizer<C> {
        &self.sync
    }

    pub fn details(&self) -> &Arc<DetailCache> {
        &self.details
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Run until [`FeedHandle::shutdown`], then hand the observer back.
    pub fn run(mut self) -> Result<O> {
        let effects = self.sync.start(Timestamp::now())?;
        self.apply(effects);

        let commands = self.commands.clone();
        let channel_events = self.channel_events.clone();
        let completions = self.completions.clone();

        let mut running = true;
        while running {
            let timer = match self.reconnect_at {
                Some(at) => crossbeam_channel::at(at),
                None => crossbeam_channel::never(),
            };
            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => running = false,
                    Ok(command) => self.handle_command(command),
                },
                recv(channel_events) -> event => {
                    if let Ok(event) = event {
                        let effects = self.sync.handle_channel_event(event);
                        self.apply(effects);
                    }
                },
                recv(completions) -> done => {
                    if let Ok(done) = done {
                        self.complete(done);
                    }
                },
                recv(timer) -> _ => {
                    self.reconnect_at = None;
                    let effects = self.sync.on_reconnect_timer();
                    self.apply(effects);
                },
            }
        }

        tracing::info!("feed runtime shutting down");
        self.reconnect_at = None;
        let effects = self.sync.shutdown();
        self.apply(effects);
        Ok(self.observer)
    }

    fn apply(&mut self, effects: Vec<SyncEffect>) {
        for effect in effects {
            match effect {
                SyncEffect::FetchHistory { token, request } => self.spawn(Job::History(token, request)),
                SyncEffect::Pushed {
                    origin,
                    entry,
                    evicted,
                    discovered_tags,
                } => {
                    if !discovered_tags.is_empty() {
                        self.observer.on_tags_discovered(&discovered_tags);
                    }
                    self.observer.on_notification(&entry, origin, evicted.as_ref());
                }
                SyncEffect::CaughtUp {
                    history,
                    holdback,
                    degraded,
                } => self.observer.on_caught_up(history, holdback, degraded),
                SyncEffect::ChannelState(state) => self.observer.on_channel_state(state),
                SyncEffect::ScheduleReconnect { delay, .. } => {
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                SyncEffect::ChannelAbandoned { attempts } => {
                    self.reconnect_at = None;
                    self.observer.on_channel_abandoned(attempts);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddFilter(tag) => {
                let change = self.sync.feed_mut().add_filter(&tag);
                self.filter_changed(change);
            }
            Command::RemoveFilter(tag) => {
                let change = self.sync.feed_mut().remove_filter(&tag);
                self.filter_changed(change);
            }
            Command::ToggleFilter(tag) => {
                let change = self.sync.feed_mut().toggle_filter(&tag);
                self.filter_changed(change);
            }
            Command::ToggleDetails(run_id) => {
                let toggle = self.sync.feed_mut().toggle_details(&run_id);
                self.observer.on_detail_toggled(&run_id, toggle);
                if toggle == DetailToggle::Opened {
                    self.fetch_details(run_id);
                }
            }
            Command::FetchDetails(run_id) => self.fetch_details(run_id),
            Command::Search(query) => {
                let query = query.resolve(
                    Timestamp::now(),
                    self.config.query_default_backrange,
                    self.sync.feed().tags().active(),
                );
                self.spawn(Job::Search(query));
            }
            Command::LoadKnownTags => {
                if !self.tags_requested {
                    self.tags_requested = true;
                    self.spawn(Job::KnownTags);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn filter_changed(&mut self, change: Option<FilterChange>) {
        if let Some(change) = change {
            self.observer.on_filter_changed(&change, self.sync.feed());
        }
    }

    fn fetch_details(&mut self, run_id: String) {
        if let Some(hit) = self.details.cached(&run_id) {
            self.observer.on_details(&run_id, &Ok(hit));
            return;
        }
        self.spawn(Job::Details(run_id));
    }

    fn complete(&mut self, done: Completion) {
        match done {
            Completion::History(token, result) => {
                let effects = self.sync.complete_history(token, result);
                self.apply(effects);
            }
            Completion::Details(run_id, result) => {
                if let Err(e) = &result {
                    tracing::warn!(%run_id, error = %e, "detail fetch failed");
                }
                self.observer.on_details(&run_id, &result);
            }
            Completion::Search(query, result) => self.observer.on_search_results(&query, &result),
            Completion::KnownTags(Ok(tags)) => {
                let discovered = self.sync.feed_mut().observe_tags(&tags);
                if !discovered.is_empty() {
                    self.observer.on_tags_discovered(&discovered);
                }
            }
            Completion::KnownTags(Err(e)) => {
                tracing::warn!(error = %e, "tag list fetch failed");
                self.tags_requested = false;
            }
        }
    }

    fn spawn(&mut self, job: Job) {
        let what = job.name();
        let fallback = job.clone();
        let tx = self.completion_tx.clone();
        let api = self.api.clone();
        let details = Arc::clone(&self.details);
        let spawned = thread::Builder::new()
            .name(format!("notif-feed-{what}"))
            .spawn(move || {
                // The loop may be gone by now; the result is simply dropped.
                let _ = tx.send(job.run(&api, &details));
            });
        if let Err(e) = spawned {
            self.worker_unavailable(fallback, e);
        }
    }

    /// Report a job that never ran as failed, so the history seam still
    /// switches to live and every request gets its callback.
    fn worker_unavailable(&mut self, job: Job, error: io::Error) {
        let what = job.name();
        tracing::error!(what, %error, "could not spawn worker thread");
        let done = job.failed(FeedError::InvalidState(format!("no worker for {what}: {error}")));
        self.complete(done);
    }
}

impl<C, O> FeedRuntime<C, O>
where
    C: ChannelConnector + Send + 'static,
    O: FeedObserver + Send + 'static,
{
    /// Run on a dedicated thread.
    pub fn spawn_thread(self) -> Result<(FeedHandle, JoinHandle<Result<O>>)> {
        let handle = self.handle();
        let join = thread::Builder::new()
            .name("notif-feed".to_string())
            .spawn(move || self.run())
            .map_err(|e| FeedError::InvalidState(format!("cannot spawn runtime thread: {e}")))?;
        Ok((handle, join))
    }
}
