//! Capacity-bounded, newest-first notification collection.

use super::tags::{FilterChange, TagIndex};
use crate::types::{Notification, NotificationKey};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default number of notifications kept.
pub const DEFAULT_FEED_CAPACITY: usize = 500;

/// A held notification with its current visibility.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
    pub notification: Notification,
    pub visible: bool,
    /// Insertion counter; larger is newer.
    pub sequence: u64,
}

/// Result of [`BoundedFeed::push`].
#[derive(Clone, Debug, PartialEq)]
pub enum PushOutcome {
    Inserted {
        sequence: u64,
        visible: bool,
        /// Oldest-inserted entry pushed out by this insert.
        evicted: Option<FeedEntry>,
        /// Tags seen here for the first time.
        discovered_tags: Vec<String>,
    },
    /// Same `(id, run_id, timestamp)` is already held.
    Duplicate,
}

/// Per-run presentation state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunEntry {
    /// Notifications of this run currently in the feed.
    pub held: usize,
    /// Detail view open.
    pub expanded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailToggle {
    Opened,
    Closed,
}

/// Ordered by insertion, newest first, never longer than its capacity.
///
/// Eviction follows insertion order, not event time: a late historical
/// entry can push out one that happened after it.
#[derive(Clone, Debug)]
pub struct BoundedFeed {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
    tags: TagIndex,
    held: HashSet<NotificationKey>,
    runs: HashMap<String, RunEntry>,
    next_sequence: u64,
}

impl BoundedFeed {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self::with_tags(capacity, TagIndex::new())
    }

    pub fn with_tags(capacity: usize, tags: TagIndex) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024) + 1),
            capacity,
            tags,
            held: HashSet::new(),
            runs: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Insert at the front, evicting from the back past capacity.
    pub fn push(&mut self, notification: Notification) -> PushOutcome {
        let discovered_tags = self.tags.observe(&notification.tags);

        let key = notification.key();
        if self.held.contains(&key) {
            tracing::debug!(%key, "duplicate notification ignored");
            return PushOutcome::Duplicate;
        }

        let visible = self.tags.matches(&notification.tags);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.runs
            .entry(notification.run_id.clone())
            .or_default()
            .held += 1;
        self.held.insert(key);
        self.entries.push_front(FeedEntry {
            notification,
            visible,
            sequence,
        });

        let evicted = if self.entries.len() > self.capacity {
            self.entries.pop_back().map(|old| {
                self.forget(&old.notification);
                old
            })
        } else {
            None
        };

        PushOutcome::Inserted {
            sequence,
            visible,
            evicted,
            discovered_tags,
        }
    }

    fn forget(&mut self, notification: &Notification) {
        self.held.remove(&notification.key());
        if let Some(run) = self.runs.get_mut(&notification.run_id) {
            run.held = run.held.saturating_sub(1);
            if run.held == 0 && !run.expanded {
                self.runs.remove(&notification.run_id);
            }
        }
    }

    /// Re-derive visibility of every held entry from the active filter.
    /// Returns how many entries flipped.
    pub fn refresh_visibility(&mut self) -> usize {
        let mut flipped = 0;
        for entry in &mut self.entries {
            let visible = self.tags.matches(&entry.notification.tags);
            if visible != entry.visible {
                entry.visible = visible;
                flipped += 1;
            }
        }
        flipped
    }

    fn apply(&mut self, change: Option<FilterChange>) -> Option<FilterChange> {
        let change = change?;
        let flipped = self.refresh_visibility();
        tracing::debug!(
            tag = %change.tag,
            kind = ?change.kind,
            revision = change.revision,
            flipped,
            "filter changed"
        );
        Some(change)
    }

    pub fn add_filter(&mut self, tag: &str) -> Option<FilterChange> {
        let change = self.tags.add(tag);
        self.apply(change)
    }

    pub fn remove_filter(&mut self, tag: &str) -> Option<FilterChange> {
        let change = self.tags.remove(tag);
        self.apply(change)
    }

    pub fn toggle_filter(&mut self, tag: &str) -> Option<FilterChange> {
        let change = self.tags.toggle(tag);
        self.apply(change)
    }

    /// Feed tags learned elsewhere (e.g. the tag endpoint) into the universe.
    pub fn observe_tags<I, S>(&mut self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags.observe(tags)
    }

    /// Open or close the detail view of a run. Runs not currently in the
    /// feed can still be opened.
    pub fn toggle_details(&mut self, run_id: &str) -> DetailToggle {
        let run = self.runs.entry(run_id.to_string()).or_default();
        run.expanded = !run.expanded;
        if run.expanded {
            DetailToggle::Opened
        } else {
            if run.held == 0 {
                self.runs.remove(run_id);
            }
            DetailToggle::Closed
        }
    }

    pub fn is_expanded(&self, run_id: &str) -> bool {
        self.runs.get(run_id).is_some_and(|r| r.expanded)
    }

    pub fn run(&self, run_id: &str) -> Option<&RunEntry> {
        self.runs.get(run_id)
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn contains(&self, key: &NotificationKey) -> bool {
        self.held.contains(key)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn visible(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter().filter(|e| e.visible)
    }

    pub fn get(&self, index: usize) -> Option<&FeedEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BoundedFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
