//! The presentation-side state: what is in the feed and what is shown.
//!
//! - [`TagIndex`] owns the known-tag universe and the active any-tag filter
//! - [`BoundedFeed`] owns the newest-first entries and derives their
//!   visibility from the tag index
//!
//! Filter mutations go through the feed so that every change of the active
//! set is immediately followed by a visibility refresh.

mod bounded;
mod tags;

pub use bounded::{BoundedFeed, DetailToggle, FeedEntry, PushOutcome, RunEntry, DEFAULT_FEED_CAPACITY};
pub use tags::{FilterChange, FilterChangeKind, TagIndex};
