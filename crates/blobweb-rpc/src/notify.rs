use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{RpcError, RpcResult};

/// A channel for plain-text operator alerts.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> RpcResult<()>;
}

/// Chat webhook settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub webhook: String,
    /// Channel to post to.
    #[serde(default)]
    pub to: Option<String>,
    /// Display name of the poster.
    #[serde(default)]
    pub from: Option<String>,
}

/// Posts `{"text", "channel", "username"}` to an incoming-webhook URL.
///
/// Uses a blocking client built per message, so it must be called off the
/// async runtime; the dispatcher sends from a plain thread.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    config: WebhookConfig,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub fn payload(&self, message: &str) -> serde_json::Value {
        json!({
            "text": message,
            "channel": self.config.to,
            "username": self.config.from,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) -> RpcResult<()> {
        if self.config.webhook.is_empty() {
            return Err(RpcError::Notify("no webhook URL configured".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        client
            .post(&self.config.webhook)
            .json(&self.payload(message))
            .send()?
            .error_for_status()?;
        debug!(webhook = %self.config.webhook, "sent notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let notifier = WebhookNotifier::new(WebhookConfig {
            webhook: "https://hooks.example.com/T000".into(),
            to: Some("#alerts".into()),
            from: Some("blobweb".into()),
        });
        let payload = notifier.payload("disk full");
        assert_eq!(payload["text"], "disk full");
        assert_eq!(payload["channel"], "#alerts");
        assert_eq!(payload["username"], "blobweb");
    }

    #[test]
    fn empty_webhook_is_an_error() {
        let notifier = WebhookNotifier::new(WebhookConfig::default());
        assert!(matches!(notifier.notify("x"), Err(RpcError::Notify(_))));
    }

    #[test]
    fn config_from_toml_style_json() {
        let config: WebhookConfig =
            serde_json::from_str(r##"{"webhook":"https://h","to":"#ops"}"##).unwrap();
        assert_eq!(config.to.as_deref(), Some("#ops"));
        assert!(config.from.is_none());
    }
}
