//! Slash command definitions registered for the application.
//!
//! Everything hangs off a single `/status` command with one subcommand per
//! administrative operation. Only members with Manage Channels may use it.

use serde::Serialize;

/// Application command option types.
const SUB_COMMAND: u8 = 1;
const INTEGER: u8 = 4;
const CHANNEL: u8 = 7;

/// MANAGE_CHANNELS permission bit.
const MANAGE_CHANNELS: &str = "16";

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationCommand {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: u8,
    pub default_member_permissions: &'static str,
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandOption {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

fn subcommand(
    name: &'static str,
    description: &'static str,
    options: Vec<CommandOption>,
) -> CommandOption {
    CommandOption {
        kind: SUB_COMMAND,
        name,
        description,
        required: false,
        min_value: None,
        options,
    }
}

fn minutes(required: bool) -> CommandOption {
    CommandOption {
        kind: INTEGER,
        name: "minutes",
        description: "Refresh interval in minutes",
        required,
        min_value: Some(1),
        options: Vec::new(),
    }
}

fn channel() -> CommandOption {
    CommandOption {
        kind: CHANNEL,
        name: "channel",
        description: "Target channel (defaults to the current one)",
        required: false,
        min_value: None,
        options: Vec::new(),
    }
}

/// The full command set, in registration order.
pub fn definitions() -> Vec<ApplicationCommand> {
    vec![ApplicationCommand {
        name: "status",
        description: "Manage the service status board",
        kind: 1,
        default_member_permissions: MANAGE_CHANNELS,
        options: vec![
            subcommand(
                "create",
                "Post a status board in a channel",
                vec![channel(), minutes(false)],
            ),
            subcommand("delete", "Remove a channel's status board", vec![channel()]),
            subcommand("list", "List every status board", Vec::new()),
            subcommand(
                "interval",
                "Change a channel's refresh interval",
                vec![minutes(true), channel()],
            ),
            subcommand(
                "default-interval",
                "Change the interval used for new boards",
                vec![minutes(true)],
            ),
            subcommand("refresh", "Refresh every board now", Vec::new()),
            subcommand("sync", "Refresh every board now and verify each message", Vec::new()),
            subcommand("debug", "Show internal counters", Vec::new()),
        ],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_a_subcommand() {
        let defs = definitions();
        let names: Vec<_> = defs[0].options.iter().map(|o| o.name).collect();
        assert_eq!(
            names,
            ["create", "delete", "list", "interval", "default-interval", "refresh", "sync", "debug"]
        );
    }

    #[test]
    fn required_options_precede_optional_ones() {
        for sub in &definitions()[0].options {
            let first_optional = sub.options.iter().position(|o| !o.required);
            if let Some(i) = first_optional {
                assert!(sub.options[i..].iter().all(|o| !o.required), "{}", sub.name);
            }
        }
    }

    #[test]
    fn minutes_option_serializes_minimum() {
        let json = serde_json::to_value(definitions()).unwrap();
        let interval = &json[0]["options"][3];
        assert_eq!(interval["name"], "interval");
        assert_eq!(interval["options"][0]["min_value"], 1);
        assert_eq!(interval["options"][0]["required"], true);
        assert!(json[0]["options"][2].get("options").is_none());
    }
}
