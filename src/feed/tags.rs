//! Known-tag universe and the active any-tag filter.

use std::collections::BTreeSet;

/// How the active filter set changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterChangeKind {
    Added,
    Removed,
}

/// Emitted on every mutation of the active filter set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterChange {
    /// Monotonic counter of active-set mutations.
    pub revision: u64,
    pub tag: String,
    pub kind: FilterChangeKind,
    /// Active set after the change.
    pub active: BTreeSet<String>,
}

/// Tracks every tag seen so far and the tags the user filters on.
///
/// The active set may hold tags that were never observed (typed in by
/// hand); it is only ever changed through [`add`](Self::add),
/// [`remove`](Self::remove) and [`toggle`](Self::toggle).
#[derive(Clone, Debug, Default)]
pub struct TagIndex {
    active: BTreeSet<String>,
    known: BTreeSet<String>,
    revision: u64,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a filter tag. Surrounding whitespace is ignored; empty or
    /// already-active tags are a no-op.
    pub fn add(&mut self, tag: &str) -> Option<FilterChange> {
        let tag = tag.trim();
        if tag.is_empty() || !self.active.insert(tag.to_string()) {
            return None;
        }
        Some(self.changed(tag, FilterChangeKind::Added))
    }

    /// Deactivate a filter tag. No-op if it was not active.
    pub fn remove(&mut self, tag: &str) -> Option<FilterChange> {
        let tag = tag.trim();
        if !self.active.remove(tag) {
            return None;
        }
        Some(self.changed(tag, FilterChangeKind::Removed))
    }

    pub fn toggle(&mut self, tag: &str) -> Option<FilterChange> {
        if self.active.contains(tag.trim()) {
            self.remove(tag)
        } else {
            self.add(tag)
        }
    }

    fn changed(&mut self, tag: &str, kind: FilterChangeKind) -> FilterChange {
        self.revision += 1;
        FilterChange {
            revision: self.revision,
            tag: tag.to_string(),
            kind,
            active: self.active.clone(),
        }
    }

    /// Merge tags into the known universe and return the ones not seen
    /// before. Never touches the active set.
    pub fn observe<I, S>(&mut self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut discovered = Vec::new();
        for tag in tags {
            let tag = tag.as_ref();
            if !self.known.contains(tag) {
                self.known.insert(tag.to_string());
                discovered.push(tag.to_string());
            }
        }
        discovered
    }

    /// Any-tag match: true when no filter is active or when at least one
    /// of `tags` is active.
    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        self.active.is_empty() || tags.iter().any(|t| self.active.contains(t))
    }

    pub fn is_active(&self, tag: &str) -> bool {
        self.active.contains(tag)
    }

    pub fn active(&self) -> &BTreeSet<String> {
        &self.active
    }

    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Known tags starting with `prefix`, for completion lists.
    pub fn completions<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.known
            .range(prefix.to_string()..)
            .take_while(move |t| t.starts_with(prefix))
            .map(String::as_str)
    }
}
