//! Discord message bodies built from rendered notifications.

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use statusboard_engine::NotificationPayload;

/// Component type 1: a row holding up to five buttons.
const ACTION_ROW: u8 = 1;
/// Component type 2 with style 5: a link button.
const BUTTON: u8 = 2;
const LINK_STYLE: u8 = 5;
const MAX_BUTTONS_PER_ROW: usize = 5;

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<LinkButton>,
}

#[derive(Debug, Serialize)]
pub struct LinkButton {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: u8,
    pub label: String,
    pub url: String,
}

impl From<&NotificationPayload> for MessageBody {
    fn from(payload: &NotificationPayload) -> Self {
        let embed = Embed {
            title: payload.title.clone(),
            description: payload.description.clone(),
            color: payload.color,
            fields: payload
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
            footer: EmbedFooter {
                text: payload.footer.clone(),
            },
            timestamp: iso8601(payload.timestamp),
        };

        let components = payload
            .links
            .chunks(MAX_BUTTONS_PER_ROW)
            .map(|chunk| ActionRow {
                kind: ACTION_ROW,
                components: chunk
                    .iter()
                    .map(|link| LinkButton {
                        kind: BUTTON,
                        style: LINK_STYLE,
                        label: link.label.clone(),
                        url: link.url.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            embeds: vec![embed],
            components,
        }
    }
}

fn iso8601(secs: u64) -> Option<String> {
    let secs = i64::try_from(secs).ok()?;
    DateTime::from_timestamp(secs, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}
