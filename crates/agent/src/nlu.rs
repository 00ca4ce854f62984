use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use concierge_core::config::NluConfig;
use concierge_core::ports::{Collaborator, CollaboratorError};

/// Text turn forwarded to the NLU engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluRequest {
    pub bot_name: String,
    pub bot_alias: String,
    pub user_id: String,
    pub input_text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub intent_name: Option<String>,
    #[serde(default)]
    pub slots: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub dialog_state: Option<String>,
    #[serde(default)]
    pub session_attributes: BTreeMap<String, String>,
    /// Status of the HTTP exchange that produced this reply.
    #[serde(skip)]
    pub http_status: u16,
}

#[async_trait]
pub trait NluClient: Send + Sync {
    async fn post_text(&self, request: &NluRequest) -> Result<NluReply, CollaboratorError>;
}

pub struct HttpNluClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpNluClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        api_key: Option<SecretString>,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CollaboratorError::request(Collaborator::Nlu, error))?;
        let endpoint = format!("{}/post-text", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, api_key })
    }

    /// Builds a client from the `[nlu]` section; `None` when no endpoint is
    /// configured.
    pub fn from_config(config: &NluConfig) -> Result<Option<Self>, CollaboratorError> {
        match config.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
            Some(base_url) => Self::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
                config.api_key.clone(),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NluClient for HttpNluClient {
    async fn post_text(&self, request: &NluRequest) -> Result<NluReply, CollaboratorError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|error| CollaboratorError::request(Collaborator::Nlu, error))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "ingress.nlu.rejected",
                status = status.as_u16(),
                bot_name = %request.bot_name,
                "nlu engine returned non-success status"
            );
            return Err(CollaboratorError::status(Collaborator::Nlu, status.as_u16()));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| CollaboratorError::decode(Collaborator::Nlu, error))?;
        let mut reply: NluReply = serde_json::from_value(payload)
            .map_err(|error| CollaboratorError::decode(Collaborator::Nlu, error))?;
        reply.http_status = status.as_u16();
        Ok(reply)
    }
}
