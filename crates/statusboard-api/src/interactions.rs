//! Discord interactions endpoint.
//!
//! Discord delivers `/status` invocations as signed HTTP POSTs. The
//! signature is Ed25519 over `timestamp || body`, made with the
//! application's key; anything unsigned or mis-signed gets a 401.
//!
//! Discord waits three seconds for the first response. Subcommands that
//! talk to the chat platform are acknowledged with a deferred reply and
//! finished through a [`CommandResponder`] once the work is done.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use statusboard_engine::{CommandResponder, CommandSurface};

use crate::handlers::error_response;

const SIGNATURE_HEADER: &str = "x-signature-ed25519";
const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

// Interaction types.
const PING: u8 = 1;
const APPLICATION_COMMAND: u8 = 2;

// Callback types.
const PONG: u8 = 1;
const CHANNEL_MESSAGE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE: u8 = 5;

/// Only the invoking user sees the reply.
const EPHEMERAL: u32 = 1 << 6;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("public key is not hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("public key must be 32 bytes (got {0})")]
    Length(usize),

    #[error("public key is not a valid ed25519 key: {0}")]
    Invalid(#[from] ed25519_dalek::SignatureError),
}

/// Checks request signatures against the application's public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Parse the hex public key shown on the application's settings page.
    pub fn from_hex(public_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(public_key.trim())?;
        let bytes = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| KeyError::Length(bytes.len()))?;
        Ok(Self {
            key: VerifyingKey::from_bytes(&bytes)?,
        })
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> bool {
        let Ok(raw) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(raw) = <[u8; 64]>::try_from(raw.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&raw);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify(&message, &signature).is_ok()
    }
}

/// Shared state for the interactions route.
#[derive(Clone)]
pub struct InteractionState {
    pub commands: CommandSurface,
    pub verifier: Arc<SignatureVerifier>,
    pub responder: Arc<dyn CommandResponder>,
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Interaction {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    token: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    data: Option<CommandData>,
}

#[derive(Debug, Deserialize)]
struct CommandData {
    name: String,
    #[serde(default)]
    options: Vec<OptionValue>,
}

#[derive(Debug, Deserialize)]
struct OptionValue {
    name: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    options: Vec<OptionValue>,
}

fn option<'a>(options: &'a [OptionValue], name: &str) -> Option<&'a Value> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_ref())
}

// ── Dispatch ───────────────────────────────────────────────────

/// One parsed `/status` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Create { channel: String, minutes: Option<u32> },
    Delete { channel: String },
    List,
    Interval { channel: String, minutes: u32 },
    DefaultInterval { minutes: u32 },
    Refresh,
    Sync,
    Debug,
}

impl Invocation {
    /// Parse a command, falling back to the invoking channel when the
    /// `channel` option is absent. Errors are user-facing text.
    fn parse(data: &CommandData, invoked_in: Option<&str>) -> Result<Self, String> {
        if data.name != "status" {
            return Err(format!("Unknown command /{}.", data.name));
        }
        let Some(sub) = data.options.first() else {
            return Err("Pick a /status subcommand.".to_string());
        };

        let channel = || {
            option(&sub.options, "channel")
                .and_then(Value::as_str)
                .or(invoked_in)
                .map(str::to_string)
                .ok_or_else(|| "This command needs a channel.".to_string())
        };
        let minutes = || match option(&sub.options, "minutes") {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|m| u32::try_from(m).ok())
                .map(Some)
                .ok_or_else(|| "minutes must be a positive whole number.".to_string()),
        };
        let required_minutes =
            || minutes()?.ok_or_else(|| "This command needs a minutes value.".to_string());

        Ok(match sub.name.as_str() {
            "create" => Invocation::Create {
                channel: channel()?,
                minutes: minutes()?,
            },
            "delete" => Invocation::Delete { channel: channel()? },
            "list" => Invocation::List,
            "interval" => Invocation::Interval {
                channel: channel()?,
                minutes: required_minutes()?,
            },
            "default-interval" => Invocation::DefaultInterval {
                minutes: required_minutes()?,
            },
            "refresh" => Invocation::Refresh,
            "sync" => Invocation::Sync,
            "debug" => Invocation::Debug,
            other => return Err(format!("Unknown subcommand {other}.")),
        })
    }

    /// Needs a round trip to the chat platform before it can answer.
    fn is_slow(&self) -> bool {
        matches!(
            self,
            Invocation::Create { .. }
                | Invocation::Delete { .. }
                | Invocation::Refresh
                | Invocation::Sync
        )
    }
}

/// Run the command and describe the result for the invoking user.
async fn execute(commands: &CommandSurface, invocation: Invocation) -> String {
    match invocation {
        Invocation::Create { channel, minutes } => match commands.create(&channel, minutes).await {
            Ok(o) => format!(
                "Status board created in <#{}>. It refreshes every {} minute(s).",
                o.destination, o.refresh_interval
            ),
            Err(e) => e.public_message(),
        },
        Invocation::Delete { channel } => match commands.delete(&channel).await {
            Ok(o) if o.existed => format!("Status board removed from <#{channel}>."),
            Ok(_) => format!("There is no status board in <#{channel}>."),
            Err(e) => e.public_message(),
        },
        Invocation::List => {
            let trackers = commands.list();
            if trackers.is_empty() {
                return "No status boards are configured.".to_string();
            }
            let mut out = String::from("Status boards:");
            for t in trackers {
                let _ = write!(
                    out,
                    "\n<#{}> every {} minute(s), next refresh <t:{}:R>",
                    t.destination, t.refresh_interval, t.next_due_at
                );
            }
            out
        }
        Invocation::Interval { channel, minutes } => {
            match commands.set_interval(&channel, minutes) {
                Ok(()) => format!("<#{channel}> now refreshes every {minutes} minute(s)."),
                Err(e) => e.public_message(),
            }
        }
        Invocation::DefaultInterval { minutes } => match commands.set_default_interval(minutes) {
            Ok(()) => format!("New status boards will refresh every {minutes} minute(s)."),
            Err(e) => e.public_message(),
        },
        Invocation::Refresh => {
            let s = commands.refresh().await;
            format!(
                "Refreshed {} board(s). {} failed, {} pruned.",
                s.refreshed, s.failed, s.pruned
            )
        }
        Invocation::Sync => {
            let report = commands.sync().await;
            let present = report.message_present.values().filter(|p| **p).count();
            format!(
                "Refreshed {} board(s). {present} of {} notification(s) verified.",
                report.tick.refreshed(),
                report.message_present.len()
            )
        }
        Invocation::Debug => {
            let d = commands.debug();
            let c = d.counters;
            format!(
                "Boards: {}\nDefault interval: {} minute(s)\nTicks: {}, probes: {}\n\
                 Updates: {}, recreations: {}\nPruned: {}, failures: {}\nPresence pushes: {}",
                d.trackers,
                d.default_refresh_interval,
                c.ticks,
                c.probes,
                c.updates,
                c.recreations,
                c.pruned,
                c.failures,
                c.presence_pushes
            )
        }
    }
}

fn reply(content: &str) -> Response {
    Json(json!({
        "type": CHANNEL_MESSAGE,
        "data": { "content": content, "flags": EPHEMERAL },
    }))
    .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /interactions
pub async fn handle(
    State(state): State<InteractionState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signed = match (header(&headers, SIGNATURE_HEADER), header(&headers, TIMESTAMP_HEADER)) {
        (Some(signature), Some(timestamp)) => state.verifier.verify(timestamp, &body, signature),
        _ => false,
    };
    if !signed {
        warn!("rejected interaction with a bad signature");
        return error_response("invalid request signature", StatusCode::UNAUTHORIZED)
            .into_response();
    }

    let interaction: Interaction = match serde_json::from_slice(&body) {
        Ok(i) => i,
        Err(e) => {
            return error_response(&format!("malformed interaction: {e}"), StatusCode::BAD_REQUEST)
                .into_response();
        }
    };

    match interaction.kind {
        PING => Json(json!({ "type": PONG })).into_response(),
        APPLICATION_COMMAND => dispatch(state, interaction).await,
        other => {
            debug!(kind = other, "ignoring interaction");
            error_response("unsupported interaction type", StatusCode::BAD_REQUEST).into_response()
        }
    }
}

async fn dispatch(state: InteractionState, interaction: Interaction) -> Response {
    let Some(data) = &interaction.data else {
        return reply("Missing command data.");
    };
    let invocation = match Invocation::parse(data, interaction.channel_id.as_deref()) {
        Ok(i) => i,
        Err(msg) => return reply(&msg),
    };
    debug!(?invocation, "slash command received");

    if !invocation.is_slow() {
        return reply(&execute(&state.commands, invocation).await);
    }

    let token = interaction.token;
    tokio::spawn(async move {
        let content = execute(&state.commands, invocation).await;
        if let Err(e) = state.responder.edit_response(&token, &content).await {
            warn!(error = %e, "failed to complete deferred reply");
        }
    });
    Json(json!({
        "type": DEFERRED_CHANNEL_MESSAGE,
        "data": { "flags": EPHEMERAL },
    }))
    .into_response()
}
