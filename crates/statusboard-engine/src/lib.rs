//! statusboard-engine — keeps every registered destination's status
//! notification fresh.
//!
//! # Architecture
//!
//! ```text
//! Reconciler::tick()
//!   1. snapshot ConfigStore
//!   2. probe once if anything is due (or the tick is forced)
//!   3. push presence if statuses changed
//!   4. sweep: resolve every destination remotely
//!   5. prune permanently unreachable destinations (one batch)
//!   6. apply: edit in place, recreate when the message is gone,
//!      mark_updated on success
//! ```
//!
//! The chat platform sits behind [`ChatPlatform`]; destination lookups go
//! through a [`DestinationResolver`] so caching stays out of the engine.
//! [`CommandSurface`] wraps the administrative operations and shares the
//! reconciler's tick lock, so a forced refresh never overlaps a timed one.

pub mod commands;
pub mod error;
pub mod platform;
pub mod reconciler;
pub mod render;
pub mod resolver;

pub use commands::{
    CommandSurface, CreateOutcome, DebugReport, DeleteOutcome, RefreshSummary, SyncReport,
    TrackerSummary,
};
pub use error::{CommandError, CommandResult};
pub use platform::{
    ChatPlatform, CommandResponder, Destination, PlatformError, PlatformResult, Resource,
};
pub use reconciler::{Counters, CountersSnapshot, Outcome, Reconciler, TickMode, TickReport};
pub use render::{Link, NotificationField, NotificationPayload, Presence, Renderer, Severity};
pub use resolver::{CachedResolver, DestinationResolver, RemoteResolver};
