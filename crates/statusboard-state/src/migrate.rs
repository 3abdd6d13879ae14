//! Decoding of the on-disk configuration, including older layouts.
//!
//! Two legacy shapes are still accepted:
//!
//! ```text
//! single pair   {"channel_id": 123, "message_id": 456}
//! no bookkeeping {"trackers": {"123": {"message_id": 456, "refresh_interval": 5}}}
//! ```
//!
//! The first predates multi-destination support; the second predates
//! per-destination `last_update_time`. Both decode into the current
//! [`Configuration`]; missing fields take their defaults.

use serde_json::Value;

use crate::types::*;

/// Which layout a configuration file was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Current,
    /// `{"channel_id", "message_id"}` from the single-destination era.
    SinglePair,
    /// Trackers without `last_update_time`.
    NoBookkeeping,
}

/// Decode raw file contents into a configuration.
///
/// Returns an error only when the bytes are not a JSON object at all.
pub fn decode(bytes: &[u8]) -> Result<(Configuration, Layout), serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(map) = &value else {
        return Err(serde::de::Error::custom("configuration root is not an object"));
    };

    if map.contains_key("trackers") {
        let layout = if lacks_bookkeeping(&value) {
            Layout::NoBookkeeping
        } else {
            Layout::Current
        };
        let mut config: Configuration = serde_json::from_value(value)?;
        config.normalize();
        return Ok((config, layout));
    }

    if map.contains_key("message_id") || map.contains_key("channel_id") {
        let mut config = Configuration::default();
        if let Some(interval) = map
            .get("default_refresh_interval")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
        {
            config.default_refresh_interval = interval;
        }
        config.normalize();

        match map.get("channel_id").and_then(id_from_value) {
            Some(channel) => {
                let mut tracker = Tracker::new(config.default_refresh_interval);
                tracker.message_ref = map.get("message_id").and_then(id_from_value);
                config.trackers.insert(channel, tracker);
            }
            None => {
                tracing::warn!("legacy configuration has no channel_id; message reference dropped");
            }
        }
        return Ok((config, Layout::SinglePair));
    }

    let mut config: Configuration = serde_json::from_value(value)?;
    config.normalize();
    Ok((config, Layout::Current))
}

fn lacks_bookkeeping(value: &Value) -> bool {
    value
        .get("trackers")
        .and_then(Value::as_object)
        .is_some_and(|trackers| {
            trackers
                .values()
                .any(|t| t.get("last_update_time").is_none())
        })
}
