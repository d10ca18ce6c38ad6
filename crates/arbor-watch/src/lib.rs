//! Change notification for Arbor branches.
//!
//! A [`ChangeNotifier`] fans out per-path [`ChangeEvent`]s to live
//! subscribers. A subscriber that asks for `fromCtime` first receives every
//! matching event from the patch log newer than that timestamp, then live
//! events, with no gap in between: the branch engine builds the backlog and
//! registers the subscriber while holding its write lock.
//!
//! Broken or cancelled sinks are dropped silently; delivery failures never
//! reach the writer. A sink dropped for falling behind is flagged through
//! its [`LagSignal`] so the consumer can tell it apart from a cancellation.

pub mod event;
pub mod notifier;

pub use event::{replay_events, ChangeEvent, WatchOptions, LAGGED_SSE_FRAME};
pub use notifier::{ChangeNotifier, LagSignal, Subscription};
