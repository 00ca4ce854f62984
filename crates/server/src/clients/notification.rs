use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use concierge_core::config::NotificationConfig;
use concierge_core::ports::{Collaborator, CollaboratorError, DeliveryReceipt, NotificationChannel};

/// Writes notifications to the log instead of delivering them. The default
/// backend for local runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationChannel;

#[async_trait]
impl NotificationChannel for LogNotificationChannel {
    async fn publish(
        &self,
        topic: &str,
        message: &str,
        subject: &str,
    ) -> Result<DeliveryReceipt, CollaboratorError> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            event_name = "worker.notification_logged",
            topic,
            subject,
            message_id = %message_id,
            message,
            "notification written to log"
        );
        Ok(DeliveryReceipt { message_id })
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    topic: &'a str,
    subject: &'a str,
    message: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookAck {
    #[serde(default, alias = "messageId", alias = "MessageId")]
    message_id: Option<String>,
}

/// Publishes to a pub/sub HTTP endpoint as `{topic, subject, message}`.
pub struct WebhookNotificationChannel {
    client: Client,
    url: String,
    auth_token: Option<SecretString>,
}

impl WebhookNotificationChannel {
    pub fn new(
        url: &str,
        timeout: Duration,
        auth_token: Option<SecretString>,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CollaboratorError::request(Collaborator::Notification, error))?;
        Ok(Self { client, url: url.trim().to_string(), auth_token })
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, CollaboratorError> {
        let url = config.webhook_url.as_deref().ok_or_else(|| {
            CollaboratorError::request(
                Collaborator::Notification,
                "notification.webhook_url is not configured",
            )
        })?;
        Self::new(url, Duration::from_secs(config.timeout_secs), config.auth_token.clone())
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotificationChannel {
    async fn publish(
        &self,
        topic: &str,
        message: &str,
        subject: &str,
    ) -> Result<DeliveryReceipt, CollaboratorError> {
        let mut request = self.client.post(&self.url).json(&WebhookPayload { topic, subject, message });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| CollaboratorError::request(Collaborator::Notification, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::status(Collaborator::Notification, status.as_u16()));
        }

        // Some endpoints answer 202/204 with no body; the delivery still counts.
        let body = response
            .bytes()
            .await
            .map_err(|error| CollaboratorError::decode(Collaborator::Notification, error))?;
        let ack = if body.is_empty() {
            WebhookAck::default()
        } else {
            serde_json::from_slice::<WebhookAck>(&body)
                .map_err(|error| CollaboratorError::decode(Collaborator::Notification, error))?
        };

        Ok(DeliveryReceipt {
            message_id: ack.message_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }
}
