use serde::{Deserialize, Serialize};

use crate::config::SlackConfig;

const ERROR_MARKER: &str = "🚨";
const INFO_MARKER: &str = "ℹ️";

/// Deployment environment. Only `production` may address real channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment(String);

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn is_production(&self) -> bool {
        self.0 == "production"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where Slack delivered a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackReceipt {
    pub channel: String,
    pub ts: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: [SectionBlock<'a>; 1],
}

#[derive(Serialize)]
struct SectionBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: BlockText<'a>,
}

#[derive(Serialize)]
struct BlockText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Reasons a post did not go through. Only ever logged.
#[derive(Debug, thiserror::Error)]
enum NotifyFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("slack returned status={status}, body={body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("slack api error: {0}")]
    Api(String),
}

/// Posts alerts through the Slack bot API.
///
/// Delivery is best-effort: a failed post is logged and reported as `None`,
/// never as an error.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    bot_token: String,
    errors_channel_id: String,
    test_alerts_channel_id: String,
    environment: Environment,
    api_base: String,
}

impl SlackNotifier {
    pub fn new(cfg: SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: cfg.bot_token,
            errors_channel_id: cfg.errors_channel_id,
            test_alerts_channel_id: cfg.test_alerts_channel_id,
            environment: Environment::new(cfg.environment),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Outside production every message goes to the test-alerts channel,
    /// whatever was asked for. In production an absent channel means the
    /// errors channel.
    pub fn resolve_channel<'a>(&'a self, channel: Option<&'a str>) -> &'a str {
        if !self.environment.is_production() {
            return &self.test_alerts_channel_id;
        }
        channel
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.errors_channel_id)
    }

    pub fn format_message(message: &str, is_error: bool) -> String {
        let marker = if is_error { ERROR_MARKER } else { INFO_MARKER };
        format!("{} {}", marker, message)
    }

    pub async fn notify(
        &self,
        message: &str,
        is_error: bool,
        channel: Option<&str>,
    ) -> Option<SlackReceipt> {
        let channel = self.resolve_channel(channel);
        let text = Self::format_message(message, is_error);

        match self.post(channel, &text).await {
            Ok(receipt) => {
                tracing::info!(
                    channel = %receipt.channel,
                    ts = %receipt.ts,
                    environment = self.environment.as_str(),
                    "sent Slack message"
                );
                Some(receipt)
            }
            Err(e) => {
                tracing::error!(channel, error = %e, "failed to send Slack message");
                None
            }
        }
    }

    /// Error-severity message to the errors channel.
    pub async fn notify_error(&self, message: &str) -> Option<SlackReceipt> {
        self.notify(message, true, Some(self.errors_channel_id.as_str())).await
    }

    async fn post(&self, channel: &str, text: &str) -> Result<SlackReceipt, NotifyFailure> {
        let body = PostMessage {
            channel,
            text,
            blocks: [SectionBlock {
                kind: "section",
                text: BlockText {
                    kind: "mrkdwn",
                    text,
                },
            }],
        };

        let resp = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyFailure::Status { status, body });
        }

        let parsed: PostMessageResponse = resp.json().await?;
        if !parsed.ok {
            return Err(NotifyFailure::Api(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        Ok(SlackReceipt {
            channel: parsed.channel.unwrap_or_else(|| channel.to_string()),
            ts: parsed.ts.unwrap_or_default(),
        })
    }
}
