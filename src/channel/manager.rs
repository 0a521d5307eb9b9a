//! Reconnection state machine around a single push connection.

use super::types::{
    Channel, ChannelConnector, ChannelEvent, ChannelEventKind, ChannelOutput, ChannelSink,
    ChannelState, CloseCode, ConnectionId, ReconnectConfig,
};
use crate::error::{FeedError, Result};
use crossbeam_channel::Sender;
use url::Url;

/// Keeps one logical push connection alive.
///
/// The manager owns the only live [`Channel`]. Connection events are tagged
/// with a [`ConnectionId`]; once a connection is replaced, anything it still
/// reports is ignored, so consumers never see two connections at once.
/// Routing of application messages belongs to the owner and is therefore
/// unaffected by reconnects.
pub struct ReconnectingChannel<C: ChannelConnector> {
    connector: C,
    url: Url,
    config: ReconnectConfig,
    events: Sender<ChannelEvent>,
    current: Option<(ConnectionId, C::Channel)>,
    next_id: u64,
    state: ChannelState,
    /// Consecutive failed attempts since the last successful open.
    attempts: u32,
    /// Set by `close`; suppresses any further reconnects.
    closing: bool,
}

impl<C: ChannelConnector> ReconnectingChannel<C> {
    /// Idle manager; nothing is opened until [`connect`](Self::connect).
    pub fn new(connector: C, url: Url, config: ReconnectConfig, events: Sender<ChannelEvent>) -> Self {
        Self {
            connector,
            url,
            config,
            events,
            current: None,
            next_id: 1,
            state: ChannelState::Closed(CloseCode::NORMAL),
            attempts: 0,
            closing: false,
        }
    }

    /// State of the logical connection.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Push endpoint every connection is opened against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The connector opening physical connections.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The connection whose events are currently accepted.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    /// Open a new connection, replacing (and detaching) any current one.
    pub fn connect(&mut self) -> Vec<ChannelOutput> {
        if self.closing {
            return Vec::new();
        }
        if let Some((old, mut channel)) = self.current.take() {
            tracing::debug!(connection = old.0, "detaching superseded connection");
            let _ = channel.close(CloseCode::NORMAL);
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let sink = ChannelSink::new(id, self.events.clone());

        match self.connector.open(&self.url, sink) {
            Ok(channel) => {
                tracing::info!(connection = id.0, url = %self.url, "connecting push channel");
                self.current = Some((id, channel));
                self.state = ChannelState::Connecting;
                vec![ChannelOutput::StateChanged(self.state)]
            }
            Err(e) => {
                tracing::warn!(connection = id.0, error = %e, "push channel failed to open");
                self.connection_lost(CloseCode::ABNORMAL)
            }
        }
    }

    /// Apply one event reported by a connector.
    pub fn handle(&mut self, event: ChannelEvent) -> Vec<ChannelOutput> {
        if self.connection_id() != Some(event.connection) {
            tracing::debug!(connection = event.connection.0, "event from stale connection dropped");
            return Vec::new();
        }

        match event.kind {
            ChannelEventKind::Opened => {
                tracing::info!(connection = event.connection.0, "push channel open");
                self.attempts = 0;
                self.state = ChannelState::Open;
                vec![ChannelOutput::StateChanged(self.state)]
            }
            ChannelEventKind::Message(text) => vec![ChannelOutput::Message(text)],
            ChannelEventKind::Error(error) => {
                tracing::error!(connection = event.connection.0, %error, "push channel error");
                Vec::new()
            }
            ChannelEventKind::Closed(code) => {
                self.current = None;
                if self.closing || code.is_clean() {
                    tracing::info!(connection = event.connection.0, %code, "push channel closed");
                    self.state = ChannelState::Closed(code);
                    vec![ChannelOutput::StateChanged(self.state)]
                } else {
                    self.connection_lost(code)
                }
            }
        }
    }

    fn connection_lost(&mut self, code: CloseCode) -> Vec<ChannelOutput> {
        if self.attempts < self.config.max_attempts {
            self.attempts += 1;
            self.state = ChannelState::Reconnecting(self.attempts);
            tracing::warn!(
                %code,
                attempt = self.attempts,
                delay = ?self.config.delay,
                "push channel lost, reconnecting"
            );
            vec![
                ChannelOutput::StateChanged(self.state),
                ChannelOutput::ScheduleReconnect {
                    attempt: self.attempts,
                    delay: self.config.delay,
                },
            ]
        } else {
            self.state = ChannelState::Failed;
            tracing::error!(
                %code,
                attempts = self.attempts,
                "could not reconnect push channel, giving up"
            );
            vec![
                ChannelOutput::StateChanged(self.state),
                ChannelOutput::Abandoned {
                    attempts: self.attempts,
                },
            ]
        }
    }

    /// The delay requested by `ScheduleReconnect` elapsed.
    pub fn on_reconnect_timer(&mut self) -> Vec<ChannelOutput> {
        match self.state {
            ChannelState::Reconnecting(_) if !self.closing => self.connect(),
            _ => Vec::new(),
        }
    }

    /// Send a text frame on the open connection.
    pub fn send(&mut self, text: &str) -> Result<()> {
        match (&mut self.current, self.state) {
            (Some((_, channel)), ChannelState::Open) => channel.send(text),
            _ => Err(FeedError::Channel(format!(
                "cannot send while {:?}",
                self.state
            ))),
        }
    }

    /// Application-initiated shutdown with the clean close code.
    pub fn close(&mut self) -> Vec<ChannelOutput> {
        self.closing = true;
        if let Some((id, mut channel)) = self.current.take() {
            if let Err(e) = channel.close(CloseCode::NORMAL) {
                tracing::debug!(connection = id.0, error = %e, "close failed");
            }
        }
        if self.state == ChannelState::Failed || self.state == ChannelState::Closed(CloseCode::NORMAL) {
            return Vec::new();
        }
        self.state = ChannelState::Closed(CloseCode::NORMAL);
        vec![ChannelOutput::StateChanged(self.state)]
    }
}
