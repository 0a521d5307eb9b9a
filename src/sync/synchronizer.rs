//! Backfill / live-stream reconciliation.

use crate::api::{ApiRequest, EventQuery};
use crate::channel::{
    ChannelConnector, ChannelEvent, ChannelOutput, ChannelState, ReconnectingChannel,
};
use crate::error::{FeedError, Result};
use crate::feed::{BoundedFeed, FeedEntry, PushOutcome};
use crate::types::{Notification, Timestamp};
use std::time::Duration;

/// Identifies one historical fetch, so a result that arrives after
/// teardown (or for a superseded request) can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FetchToken(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not started.
    Idle,
    /// History requested; live messages go to the holdback buffer.
    Backfilling,
    /// Live messages go straight to the feed.
    Live,
    /// Torn down.
    Stopped,
}

/// Which stage of the protocol delivered a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    History,
    Holdback,
    Live,
}

/// Something the runtime has to do or report after a synchronizer step.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEffect {
    /// Run this request and hand the result to `complete_history`.
    FetchHistory {
        token: FetchToken,
        request: ApiRequest,
    },
    /// A notification entered the feed.
    Pushed {
        origin: Delivery,
        entry: FeedEntry,
        evicted: Option<FeedEntry>,
        discovered_tags: Vec<String>,
    },
    /// History and holdback are flushed; delivery is now direct.
    CaughtUp {
        history: usize,
        holdback: usize,
        degraded: bool,
    },
    ChannelState(ChannelState),
    ScheduleReconnect {
        attempt: u32,
        delay: Duration,
    },
    ChannelAbandoned {
        attempts: u32,
    },
}

/// Delivers every notification from the history window and the live
/// channel into the feed: history sorted by time, then held-back live
/// messages in arrival order, then live messages as they come.
///
/// No global time order is promised across that seam; the guarantee is
/// that nothing received is lost.
pub struct StreamSynchronizer<C: ChannelConnector> {
    channel: ReconnectingChannel<C>,
    feed: BoundedFeed,
    backrange: Duration,
    phase: SyncPhase,
    holdback: Vec<Notification>,
    in_flight: Option<FetchToken>,
    next_token: u64,
}

impl<C: ChannelConnector> StreamSynchronizer<C> {
    pub fn new(channel: ReconnectingChannel<C>, feed: BoundedFeed, backrange: Duration) -> Self {
        Self {
            channel,
            feed,
            backrange,
            phase: SyncPhase::Idle,
            holdback: Vec::new(),
            in_flight: None,
            next_token: 1,
        }
    }

    /// Current protocol phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The feed being filled.
    pub fn feed(&self) -> &BoundedFeed {
        &self.feed
    }

    /// Filter and detail-view changes. Never used for pushes.
    pub fn feed_mut(&mut self) -> &mut BoundedFeed {
        &mut self.feed
    }

    /// The managed push channel.
    pub fn channel(&self) -> &ReconnectingChannel<C> {
        &self.channel
    }

    /// Live messages waiting for the history result.
    pub fn holdback_len(&self) -> usize {
        self.holdback.len()
    }

    /// Width of the startup history window.
    pub fn backrange(&self) -> Duration {
        self.backrange
    }

    /// Open the live channel and request `[now - backrange, now]`.
    pub fn start(&mut self, now: Timestamp) -> Result<Vec<SyncEffect>> {
        if self.phase != SyncPhase::Idle {
            return Err(FeedError::InvalidState(format!(
                "synchronizer already started ({:?})",
                self.phase
            )));
        }
        self.phase = SyncPhase::Backfilling;

        let mut effects = Vec::new();
        let outputs = self.channel.connect();
        self.apply_channel_outputs(outputs, &mut effects);

        let token = FetchToken(self.next_token);
        self.next_token += 1;
        self.in_flight = Some(token);
        let query = EventQuery::recent(now, self.backrange);
        tracing::info!(
            min_ts = ?query.min_ts,
            max_ts = ?query.max_ts,
            "requesting notification history"
        );
        effects.push(SyncEffect::FetchHistory {
            token,
            request: ApiRequest::events(&query),
        });
        Ok(effects)
    }

    /// Apply the historical fetch result, then flush the holdback buffer
    /// and switch to direct delivery. A failed fetch degrades to
    /// holdback-only instead of stalling.
    pub fn complete_history(
        &mut self,
        token: FetchToken,
        result: Result<Vec<Notification>>,
    ) -> Vec<SyncEffect> {
        if self.phase != SyncPhase::Backfilling || self.in_flight != Some(token) {
            tracing::debug!(?token, phase = ?self.phase, "discarding stale history result");
            return Vec::new();
        }
        self.in_flight = None;

        let mut effects = Vec::new();
        let (history, degraded) = match result {
            Ok(mut notifications) => {
                notifications.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                let count = notifications.len();
                for notification in notifications {
                    self.deliver(notification, Delivery::History, &mut effects);
                }
                (count, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "history fetch failed, continuing with live events only");
                (0, true)
            }
        };

        let held: Vec<Notification> = std::mem::take(&mut self.holdback);
        let holdback = held.len();
        for notification in held {
            self.deliver(notification, Delivery::Holdback, &mut effects);
        }

        self.phase = SyncPhase::Live;
        tracing::info!(history, holdback, degraded, "feed caught up, delivering live");
        effects.push(SyncEffect::CaughtUp {
            history,
            holdback,
            degraded,
        });
        effects
    }

    /// Route one connector event.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Vec<SyncEffect> {
        if self.phase == SyncPhase::Stopped {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let outputs = self.channel.handle(event);
        self.apply_channel_outputs(outputs, &mut effects);
        effects
    }

    /// The reconnect delay elapsed; forwards to the channel.
    pub fn on_reconnect_timer(&mut self) -> Vec<SyncEffect> {
        if self.phase == SyncPhase::Stopped {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let outputs = self.channel.on_reconnect_timer();
        self.apply_channel_outputs(outputs, &mut effects);
        effects
    }

    /// Tear down: forget the in-flight fetch, drop held-back messages and
    /// close the channel cleanly so it does not reconnect.
    pub fn shutdown(&mut self) -> Vec<SyncEffect> {
        if self.phase == SyncPhase::Stopped {
            return Vec::new();
        }
        self.phase = SyncPhase::Stopped;
        self.in_flight = None;
        if !self.holdback.is_empty() {
            tracing::debug!(dropped = self.holdback.len(), "dropping held-back messages on shutdown");
            self.holdback.clear();
        }
        self.channel
            .close()
            .into_iter()
            .filter_map(|out| match out {
                ChannelOutput::StateChanged(state) => Some(SyncEffect::ChannelState(state)),
                _ => None,
            })
            .collect()
    }

    fn apply_channel_outputs(&mut self, outputs: Vec<ChannelOutput>, effects: &mut Vec<SyncEffect>) {
        for output in outputs {
            match output {
                ChannelOutput::Message(text) => self.on_message(&text, effects),
                ChannelOutput::StateChanged(state) => effects.push(SyncEffect::ChannelState(state)),
                ChannelOutput::ScheduleReconnect { attempt, delay } => {
                    effects.push(SyncEffect::ScheduleReconnect { attempt, delay })
                }
                ChannelOutput::Abandoned { attempts } => {
                    effects.push(SyncEffect::ChannelAbandoned { attempts })
                }
            }
        }
    }

    fn on_message(&mut self, text: &str, effects: &mut Vec<SyncEffect>) {
        let notification: Notification = match serde_json::from_str(text) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "malformed live message skipped");
                return;
            }
        };
        match self.phase {
            SyncPhase::Backfilling => self.holdback.push(notification),
            SyncPhase::Live => self.deliver(notification, Delivery::Live, effects),
            SyncPhase::Idle | SyncPhase::Stopped => {
                tracing::debug!(phase = ?self.phase, "live message outside a session dropped");
            }
        }
    }

    fn deliver(&mut self, notification: Notification, origin: Delivery, effects: &mut Vec<SyncEffect>) {
        if let PushOutcome::Inserted {
            evicted,
            discovered_tags,
            ..
        } = self.feed.push(notification)
        {
            if let Some(entry) = self.feed.get(0) {
                effects.push(SyncEffect::Pushed {
                    origin,
                    entry: entry.clone(),
                    evicted,
                    discovered_tags,
                });
            }
        }
    }
}
