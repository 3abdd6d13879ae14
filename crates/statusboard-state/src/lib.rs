//! statusboard-state — the durable configuration store for statusboard.
//!
//! Holds one [`Tracker`] per destination (the chat channel a status
//! notification is rendered into) plus the process-wide default refresh
//! interval.
//!
//! # Architecture
//!
//! The whole [`Configuration`] lives in memory behind a single mutex and is
//! mirrored to one JSON file. Every mutation is written to disk (temp file +
//! rename) before the in-memory copy is swapped, so a command that returned
//! success is never lost to a crash.
//!
//! The `ConfigStore` is `Clone` + `Send` + `Sync` (backed by `Arc`) and can
//! be shared between the reconciliation loop and command handlers.
//!
//! Older on-disk shapes are migrated on load; see [`migrate`].

pub mod error;
pub mod migrate;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::ConfigStore;
pub use types::*;
