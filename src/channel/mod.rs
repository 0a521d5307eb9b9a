//! The live push channel.
//!
//! A [`ChannelConnector`] supplied by the embedding application opens
//! physical connections (usually a websocket to `-/notif`) and reports
//! what happens on them through a [`ChannelSink`]. The
//! [`ReconnectingChannel`] turns those reports into a single logical
//! stream:
//!
//! ```text
//!   Connecting ──Opened──▶ Open ──Closed(1000)──▶ Closed (terminal)
//!       ▲                   │
//!       │             Closed(other)
//!       │                   ▼
//!    timer ◀──────── Reconnecting(n)   n > max ──▶ Failed (terminal)
//! ```

mod manager;
mod types;

pub use manager::ReconnectingChannel;
pub use types::{
    Channel, ChannelConnector, ChannelEvent, ChannelEventKind, ChannelOutput, ChannelSink,
    ChannelState, CloseCode, ConnectionId, ReconnectConfig,
};
