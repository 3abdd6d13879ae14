//! REST client implementing [`ChatPlatform`] for Discord.
//!
//! Presence is not sent over REST. Each change is published on a
//! `watch` channel for a gateway session to subscribe to. No gateway
//! session exists yet, so the daemon only logs the feed and the bot's
//! visible presence never changes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use statusboard_engine::{
    ChatPlatform, CommandResponder, Destination, NotificationPayload, PlatformError,
    PlatformResult, Presence,
};
use statusboard_probe::RetryPolicy;
use statusboard_state::MessageRef;

use crate::commands;
use crate::error::{DiscordError, DiscordResult, classify, is_retryable, transport};
use crate::payload::MessageBody;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub application_id: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl DiscordConfig {
    pub fn new(token: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            application_id: application_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// The bot account behind the token.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    retry_after: Option<f64>,
}

pub struct DiscordClient {
    http: reqwest::Client,
    config: DiscordConfig,
    presence: watch::Sender<Option<Presence>>,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> DiscordResult<Self> {
        if config.token.trim().is_empty() {
            return Err(DiscordError::Config("bot token is empty".into()));
        }
        if config.application_id.trim().is_empty() {
            return Err(DiscordError::Config("application id is empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(concat!(
                "DiscordBot (statusboard, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;
        let (presence, _) = watch::channel(None);

        Ok(Self {
            http,
            config,
            presence,
        })
    }

    /// Presence changes, `None` until the first push.
    ///
    /// Nothing forwards this feed to a Discord gateway session yet; the only
    /// subscriber is the daemon's log task.
    pub fn presence_feed(&self) -> watch::Receiver<Option<Presence>> {
        self.presence.subscribe()
    }

    /// Validate the token, retrying transient failures under `policy`.
    pub async fn connect(&self, policy: &RetryPolicy) -> DiscordResult<CurrentUser> {
        let user = policy
            .run(
                |attempt| async move {
                    if attempt > 0 {
                        debug!(attempt, "retrying discord login");
                    }
                    self.request::<CurrentUser>(Method::GET, "/users/@me", None).await
                },
                is_retryable,
            )
            .await?;
        info!(user = %user.username, id = %user.id, "connected to discord");
        Ok(user)
    }

    /// Replace the application's global slash commands.
    pub async fn register_commands(&self) -> DiscordResult<usize> {
        let defs = commands::definitions();
        let body =
            serde_json::to_value(&defs).map_err(|e| DiscordError::Config(e.to_string()))?;
        let path = format!("/applications/{}/commands", self.config.application_id);
        let registered: Vec<serde_json::Value> =
            self.request(Method::PUT, &path, Some(&body)).await?;
        info!(count = registered.len(), "slash commands registered");
        Ok(registered.len())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> PlatformResult<T> {
        let resp = self.send_raw(method, path, body).await?;
        resp.json::<T>()
            .await
            .map_err(|e| PlatformError::Other(format!("unexpected response body: {e}")))
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> PlatformResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base, path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.config.token));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let err = resp.json::<ErrorBody>().await.unwrap_or_default();
        let classified = classify(status.as_u16(), err.code, err.retry_after, &err.message);
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%method, path, retry_after = ?err.retry_after, "rate limited by discord");
        } else {
            debug!(
                %method,
                path,
                status = status.as_u16(),
                code = ?err.code,
                "discord request failed"
            );
        }
        Err(classified)
    }

    fn message_body(payload: &NotificationPayload) -> PlatformResult<serde_json::Value> {
        serde_json::to_value(MessageBody::from(payload))
            .map_err(|e| PlatformError::Other(format!("failed to encode message: {e}")))
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn fetch_destination(&self, id: &str) -> PlatformResult<Destination> {
        let channel: Channel = self
            .request(Method::GET, &format!("/channels/{id}"), None)
            .await?;
        Ok(Destination {
            id: channel.id,
            name: channel.name,
        })
    }

    async fn send(
        &self,
        dest: &Destination,
        payload: &NotificationPayload,
    ) -> PlatformResult<MessageRef> {
        let body = Self::message_body(payload)?;
        let path = format!("/channels/{}/messages", dest.id);
        let message: Message = self.request(Method::POST, &path, Some(&body)).await?;
        Ok(message.id)
    }

    async fn edit(
        &self,
        dest: &Destination,
        message: &str,
        payload: &NotificationPayload,
    ) -> PlatformResult<()> {
        let body = Self::message_body(payload)?;
        let path = format!("/channels/{}/messages/{message}", dest.id);
        self.send_raw(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }

    async fn delete(&self, dest: &Destination, message: &str) -> PlatformResult<()> {
        let path = format!("/channels/{}/messages/{message}", dest.id);
        self.send_raw(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn fetch_message(&self, dest: &Destination, message: &str) -> PlatformResult<()> {
        let path = format!("/channels/{}/messages/{message}", dest.id);
        self.send_raw(Method::GET, &path, None).await?;
        Ok(())
    }

    /// Publishes on [`DiscordClient::presence_feed`] only. Succeeds even
    /// though no gateway session consumes the feed yet.
    async fn set_presence(&self, presence: Presence) -> PlatformResult<()> {
        self.presence.send_replace(Some(presence));
        debug!(activity = presence.activity(), "presence published");
        Ok(())
    }
}

#[async_trait]
impl CommandResponder for DiscordClient {
    async fn edit_response(&self, interaction_token: &str, content: &str) -> PlatformResult<()> {
        let path = format!(
            "/webhooks/{}/{interaction_token}/messages/@original",
            self.config.application_id
        );
        let body = serde_json::json!({ "content": content });
        self.send_raw(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }
}
