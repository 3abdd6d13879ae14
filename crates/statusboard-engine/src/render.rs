//! Notification rendering.
//!
//! Pure mapping from a status snapshot to the payload posted into each
//! destination, plus the presence indicator derived from the same
//! snapshot. No I/O.

use serde::Serialize;

use statusboard_probe::{ServiceDefinition, ServiceStatus, StatusSnapshot};

/// Overall severity of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Healthy,
    Caution,
    Alert,
}

impl Severity {
    pub fn of(snapshot: &StatusSnapshot) -> Self {
        match snapshot.worst() {
            ServiceStatus::Operational => Severity::Healthy,
            ServiceStatus::Limited => Severity::Caution,
            ServiceStatus::IssuesDetected => Severity::Alert,
        }
    }

    /// Embed colour as 0xRRGGBB.
    pub fn color(self) -> u32 {
        match self {
            Severity::Healthy => 0x2E_CC_71,
            Severity::Caution => 0xF1_C4_0F,
            Severity::Alert => 0xE7_4C_3C,
        }
    }
}

/// Platform-wide presence indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Healthy,
    Degraded,
    Critical,
}

impl Presence {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        match Severity::of(snapshot) {
            Severity::Healthy => Presence::Healthy,
            Severity::Caution => Presence::Degraded,
            Severity::Alert => Presence::Critical,
        }
    }

    /// Short activity text shown next to the bot.
    pub fn activity(self) -> &'static str {
        match self {
            Presence::Healthy => "All services operational",
            Presence::Degraded => "Some services limited",
            Presence::Critical => "Service issues detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A labelled URL button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Everything a destination shows for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub color: u32,
    pub fields: Vec<NotificationField>,
    pub footer: String,
    /// Unix seconds; the probe time, not the render time.
    pub timestamp: u64,
    pub links: Vec<Link>,
}

/// Builds payloads. Holds only static presentation data (status page links).
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    links: Vec<Link>,
}

impl Renderer {
    pub fn new(services: &[ServiceDefinition]) -> Self {
        let links = services
            .iter()
            .filter_map(|s| {
                s.status_page.as_ref().map(|url| Link {
                    label: format!("{} Status", s.name),
                    url: url.clone(),
                })
            })
            .collect();
        Self { links }
    }

    pub fn render(&self, snapshot: &StatusSnapshot, refresh_interval: u32) -> NotificationPayload {
        let severity = Severity::of(snapshot);
        let fields = snapshot
            .statuses
            .iter()
            .map(|(service, status)| NotificationField {
                name: format!("{service} Status"),
                value: format!("```{}```", status.label()),
                inline: true,
            })
            .collect();
        let unit = if refresh_interval == 1 { "minute" } else { "minutes" };

        NotificationPayload {
            title: "Service Status Monitor".to_string(),
            description: "Current operational status of monitored services".to_string(),
            severity,
            color: severity.color(),
            fields,
            footer: format!("Refreshes every {refresh_interval} {unit} · Last updated"),
            timestamp: snapshot.taken_at,
            links: self.links.clone(),
        }
    }
}
