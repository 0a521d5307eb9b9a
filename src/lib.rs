//! # Notification Feed
//!
//! Client side of a live notification feed: loads a window of recent
//! history, follows a push channel for new notifications, and keeps a
//! bounded, tag-filterable view with lazily fetched per-run details.
//!
//! ## Core Concepts
//!
//! - **Synchronizer**: merges the history window with the live stream
//!   without losing anything received on either side
//! - **Channel**: one push connection at a time, with fixed-delay bounded
//!   reconnection
//! - **Feed**: newest-first, capacity-bounded entries whose visibility
//!   follows the active any-tag filter
//! - **Details**: per-run records fetched once and memoized, optionally
//!   behind a Basic credential
//!
//! HTTP and the push connection are supplied by the embedding application
//! through [`HttpTransport`] and [`ChannelConnector`].
//!
//! ## Example
//!
//! ```ignore
//! use notif_feed::{ClientConfig, FeedRuntime};
//!
//! let config = ClientConfig::bootstrap("http://localhost:8080/", transport.clone())?;
//! let runtime = FeedRuntime::new(config, transport, connector, None, MyView::default())?;
//! let (handle, join) = runtime.spawn_thread()?;
//!
//! handle.add_filter("deploy")?;
//! handle.toggle_details("run-42")?;
//! handle.shutdown()?;
//! let view = join.join().expect("runtime thread")?;
//! ```

pub mod api;
pub mod channel;
pub mod client;
pub mod detail;
pub mod error;
pub mod feed;
pub mod sync;
pub mod types;

// Re-exports
pub use api::{ApiClient, ApiRequest, EventQuery, HttpResponse, HttpTransport, SiteConfig};
pub use channel::{
    Channel, ChannelConnector, ChannelEvent, ChannelEventKind, ChannelSink, ChannelState,
    CloseCode, ConnectionId, ReconnectConfig, ReconnectingChannel,
};
pub use client::{ClientConfig, FeedHandle, FeedObserver, FeedRuntime};
pub use detail::{basic_credential, CredentialCache, CredentialSource, DetailCache};
pub use error::{FeedError, Result};
pub use feed::{
    BoundedFeed, DetailToggle, FeedEntry, FilterChange, FilterChangeKind, PushOutcome, TagIndex,
};
pub use sync::{Delivery, FetchToken, StreamSynchronizer, SyncEffect, SyncPhase};
pub use types::*;
