//! statusboard-discord — Discord implementation of the chat-platform seam.
//!
//! ```text
//! Reconciler ──► ChatPlatform ──► DiscordClient ──► REST v10
//!                                      │
//!                                      └──► presence watch ──► gateway session (not wired yet)
//! ```
//!
//! Error responses are classified from the HTTP status plus Discord's JSON
//! error code, so a deleted message (10008) and a deleted channel (10003)
//! lead the engine to different recoveries.

pub mod client;
pub mod commands;
pub mod error;
pub mod payload;

pub use client::{CurrentUser, DEFAULT_API_BASE, DiscordClient, DiscordConfig};
pub use commands::{ApplicationCommand, CommandOption, definitions};
pub use error::{DiscordError, DiscordResult};
pub use payload::MessageBody;
