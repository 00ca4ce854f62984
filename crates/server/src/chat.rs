//! Conversational HTTP surface.
//!
//! - `POST    /chatbot`  - web chat relay to the NLU engine
//! - `OPTIONS /chatbot`  - CORS preflight
//! - `POST    /codehook` - NLU code hook (validation and fulfillment)

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use concierge_agent::gateway::CORS_HEADERS;
use concierge_agent::{ChatGateway, CodeHookEvent, GatewayEnvelope, IntentRouter};
use concierge_core::errors::InterfaceError;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ChatState {
    gateway: Option<Arc<ChatGateway>>,
    intents: Arc<IntentRouter>,
}

impl ChatState {
    pub fn new(gateway: Option<Arc<ChatGateway>>, intents: Arc<IntentRouter>) -> Self {
        Self { gateway, intents }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/chatbot", post(chatbot).options(preflight))
        .route("/codehook", post(codehook))
        .with_state(state)
}

pub async fn chatbot(State(state): State<ChatState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = correlation_id(&headers);
    let envelope = match &state.gateway {
        Some(gateway) => gateway.converse_raw(&body, &correlation_id).await,
        None => {
            warn!(
                event_name = "ingress.gateway.disabled",
                correlation_id = %correlation_id,
                "chat request received but no nlu endpoint is configured"
            );
            GatewayEnvelope::failure(StatusCode::SERVICE_UNAVAILABLE.as_u16())
        }
    };
    envelope_response(envelope)
}

pub async fn preflight() -> Response {
    (StatusCode::OK, cors_headers()).into_response()
}

pub async fn codehook(State(state): State<ChatState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = correlation_id(&headers);

    let event = match serde_json::from_slice::<CodeHookEvent>(&body) {
        Ok(event) => event,
        Err(error) => {
            return error_response(InterfaceError::BadRequest {
                message: format!("code hook event could not be decoded: {error}"),
                correlation_id,
            });
        }
    };

    info!(
        event_name = "ingress.codehook.request_received",
        correlation_id = %correlation_id,
        session_id = %event.user_id,
        intent_name = %event.intent_name(),
        invocation_source = ?event.invocation_source,
        "code hook event received"
    );

    match state.intents.route_event(event, &correlation_id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error_response(error.into_interface(correlation_id)),
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn cors_headers() -> HeaderMap {
    header_map(&CORS_HEADERS)
}

fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(
                event_name = "chat.response_header_skipped",
                header = %name,
                "response header is not a valid HTTP header; skipping"
            ),
        }
    }
    headers
}

fn envelope_response(envelope: GatewayEnvelope) -> Response {
    let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, cors_headers(), Json(envelope.body)).into_response()
}

fn error_response(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "ingress.codehook.rejected",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "code hook request failed"
    );
    let body = ErrorBody {
        error: error.user_message(),
        detail: error.to_string(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body)).into_response()
}
