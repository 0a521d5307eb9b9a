//! Push-channel types: connection events, states, and the transport seam.

use crate::error::Result;
use crossbeam_channel::Sender;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Websocket-style close code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Application-initiated shutdown. Never triggers a reconnect.
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    pub fn is_clean(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Debug for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloseCode({})", self.0)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one physical connection. Events from a superseded
/// connection are dropped by the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEventKind {
    /// Handshake completed.
    Opened,
    /// One text frame.
    Message(String),
    /// Transport error. A `Closed` is expected to follow.
    Error(String),
    Closed(CloseCode),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub connection: ConnectionId,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn new(connection: ConnectionId, kind: ChannelEventKind) -> Self {
        Self { connection, kind }
    }
}

/// Where a connector reports what happens on one connection.
///
/// Every method returns `false` once nobody is listening anymore, which a
/// connector may take as a cue to stop its reader.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    connection: ConnectionId,
    tx: Sender<ChannelEvent>,
}

impl ChannelSink {
    pub fn new(connection: ConnectionId, tx: Sender<ChannelEvent>) -> Self {
        Self { connection, tx }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    fn emit(&self, kind: ChannelEventKind) -> bool {
        self.tx.send(ChannelEvent::new(self.connection, kind)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(ChannelEventKind::Opened)
    }

    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(ChannelEventKind::Message(text.into()))
    }

    pub fn error(&self, error: impl Into<String>) -> bool {
        self.emit(ChannelEventKind::Error(error.into()))
    }

    pub fn closed(&self, code: CloseCode) -> bool {
        self.emit(ChannelEventKind::Closed(code))
    }
}

/// Lifecycle of the logical push connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed(CloseCode),
    /// Waiting to retry; holds the attempt number.
    Reconnecting(u32),
    /// Retry budget exhausted. Terminal.
    Failed,
}

impl ChannelState {
    pub fn is_terminal(self) -> bool {
        match self {
            ChannelState::Failed => true,
            ChannelState::Closed(code) => code.is_clean(),
            _ => false,
        }
    }
}

/// Retry policy: fixed delay, bounded attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Wait before each reconnect attempt.
    /// Default: 10s
    pub delay: Duration,

    /// Consecutive failures tolerated before giving up.
    /// Default: 5
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

/// One live push connection.
pub trait Channel: Send {
    fn send(&mut self, text: &str) -> Result<()>;

    /// Start closing. The connector still reports the final `Closed`.
    fn close(&mut self, code: CloseCode) -> Result<()>;
}

/// Opens push connections. `open` returns as soon as the attempt is under
/// way; the handshake outcome and everything after it is reported through
/// the sink.
pub trait ChannelConnector {
    type Channel: Channel;

    fn open(&self, url: &Url, sink: ChannelSink) -> Result<Self::Channel>;
}

/// What the manager needs its owner to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelOutput {
    StateChanged(ChannelState),
    Message(String),
    /// Arm a timer and call `on_reconnect_timer` when it fires.
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Reported once, when the retry budget runs out.
    Abandoned { attempts: u32 },
}
