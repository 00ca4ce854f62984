//! Chat gateway: relays one user utterance to the NLU engine and wraps the
//! engine's reply in the envelope the web client expects.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use concierge_core::ports::CollaboratorError;

use crate::nlu::{NluClient, NluRequest};

pub const ANONYMOUS_USER: &str = "anonymous";
pub const BAD_GATEWAY: u16 = 502;
pub const BAD_REQUEST: u16 = 400;

pub const CORS_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Headers", "Content-Type"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "OPTIONS,POST,GET"),
];

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InboundChat {
    pub messages: Vec<InboundMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    pub unstructured: InboundText,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InboundText {
    pub text: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<OutboundMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub unstructured: OutboundText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundText {
    pub id: String,
    pub text: String,
}

/// Response envelope in the proxy-integration shape. Serializing it whole
/// yields `body` as a JSON string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ChatBody,
}

impl GatewayEnvelope {
    pub fn new(status_code: u16, messages: Vec<OutboundMessage>) -> Self {
        let headers = CORS_HEADERS
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        Self { status_code, headers, body: ChatBody { messages } }
    }

    pub fn failure(status_code: u16) -> Self {
        Self::new(status_code, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyEnvelope<'a> {
    status_code: u16,
    headers: &'a BTreeMap<String, String>,
    body: String,
}

impl Serialize for GatewayEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let body = serde_json::to_string(&self.body).map_err(S::Error::custom)?;
        ProxyEnvelope { status_code: self.status_code, headers: &self.headers, body }
            .serialize(serializer)
    }
}

pub struct ChatGateway {
    client: Arc<dyn NluClient>,
    bot_name: String,
    bot_alias: String,
}

impl ChatGateway {
    pub fn new(
        client: Arc<dyn NluClient>,
        bot_name: impl Into<String>,
        bot_alias: impl Into<String>,
    ) -> Self {
        Self { client, bot_name: bot_name.into(), bot_alias: bot_alias.into() }
    }

    /// Entry point for raw HTTP bodies; undecodable input gets a 400 envelope.
    pub async fn converse_raw(&self, body: &[u8], correlation_id: &str) -> GatewayEnvelope {
        match serde_json::from_slice::<InboundChat>(body) {
            Ok(inbound) => self.converse(&inbound, correlation_id).await,
            Err(error) => {
                warn!(
                    event_name = "ingress.gateway.malformed_request",
                    correlation_id,
                    error = %error,
                    "gateway request body could not be decoded"
                );
                GatewayEnvelope::failure(BAD_REQUEST)
            }
        }
    }

    pub async fn converse(&self, inbound: &InboundChat, correlation_id: &str) -> GatewayEnvelope {
        let Some(first) = inbound.messages.first() else {
            warn!(
                event_name = "ingress.gateway.malformed_request",
                correlation_id,
                "gateway request carried no messages"
            );
            return GatewayEnvelope::failure(BAD_REQUEST);
        };

        let user_id = first
            .unstructured
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(ANONYMOUS_USER)
            .to_string();

        info!(
            event_name = "ingress.gateway.request_received",
            correlation_id,
            session_id = %user_id,
            "relaying user message to nlu engine"
        );

        let request = NluRequest {
            bot_name: self.bot_name.clone(),
            bot_alias: self.bot_alias.clone(),
            user_id: user_id.clone(),
            input_text: first.unstructured.text.clone(),
        };

        let reply = match self.client.post_text(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                let status = failure_status(&error);
                warn!(
                    event_name = "ingress.gateway.upstream_failed",
                    correlation_id,
                    session_id = %user_id,
                    status,
                    error = %error,
                    "nlu engine call failed"
                );
                return GatewayEnvelope::failure(status);
            }
        };

        if reply.http_status != 200 {
            return GatewayEnvelope::failure(reply.http_status);
        }

        let messages = reply
            .message
            .map(|text| {
                vec![OutboundMessage {
                    kind: "unstructured".to_string(),
                    unstructured: OutboundText { id: user_id.clone(), text },
                }]
            })
            .unwrap_or_default();

        info!(
            event_name = "ingress.gateway.reply_sent",
            correlation_id,
            session_id = %user_id,
            dialog_state = reply.dialog_state.as_deref().unwrap_or("unknown"),
            "nlu reply relayed"
        );
        GatewayEnvelope::new(200, messages)
    }
}

fn failure_status(error: &CollaboratorError) -> u16 {
    error.status_code().unwrap_or(BAD_GATEWAY)
}
