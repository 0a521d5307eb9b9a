//! Merging the history window with the live channel.
//!
//! The [`StreamSynchronizer`] is a plain state machine: it performs no I/O
//! and returns [`SyncEffect`]s for its owner to carry out (run the history
//! request, arm the reconnect timer, report pushes). Lifecycle:
//!
//! ```text
//!   Idle ──start──▶ Backfilling ──complete_history──▶ Live
//!                       │  live msgs → holdback         │ live msgs → feed
//!                       └────────── shutdown ───────────┴──▶ Stopped
//! ```

mod synchronizer;

pub use synchronizer::{Delivery, FetchToken, StreamSynchronizer, SyncEffect, SyncPhase};
