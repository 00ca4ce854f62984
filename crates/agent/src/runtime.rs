use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use concierge_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use concierge_core::domain::reservation::{ReservationRequest, RESERVATION_MESSAGE_BODY};
use concierge_core::errors::{ApplicationError, DomainError};
use concierge_core::flows::{DialogResponse, FlowAction, FlowDefinition, FlowEngine};
use concierge_core::ports::MessageQueue;

use crate::codehook::CodeHookEvent;

const ACTOR: &str = "codehook";

#[async_trait]
pub trait IntentHandler: Send + Sync {
    fn intent_name(&self) -> &str;

    async fn handle(
        &self,
        request: &ReservationRequest,
        correlation_id: &str,
    ) -> Result<DialogResponse, ApplicationError>;
}

/// Dispatches code-hook requests to the handler registered for their intent.
#[derive(Default)]
pub struct IntentRouter {
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
}

impl IntentRouter {
    pub fn register(&mut self, handler: Arc<dyn IntentHandler>) {
        self.handlers.insert(handler.intent_name().to_string(), handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn intent_names(&self) -> Vec<&str> {
        let mut names = self.handlers.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub async fn route(
        &self,
        request: &ReservationRequest,
        correlation_id: &str,
    ) -> Result<DialogResponse, ApplicationError> {
        let handler = self
            .handlers
            .get(&request.intent_name)
            .ok_or_else(|| DomainError::UnsupportedIntent(request.intent_name.clone()))?;
        handler.handle(request, correlation_id).await
    }

    pub async fn route_event(
        &self,
        event: CodeHookEvent,
        correlation_id: &str,
    ) -> Result<DialogResponse, ApplicationError> {
        self.route(&event.into_request(), correlation_id).await
    }
}

/// Runs the dining-suggestion dialog and performs the enqueue a fulfilled
/// reservation asks for before the closing response is released.
pub struct ReservationIntentHandler<F> {
    engine: FlowEngine<F>,
    queue: Arc<dyn MessageQueue>,
    audit: Arc<dyn AuditSink>,
}

impl<F> ReservationIntentHandler<F>
where
    F: FlowDefinition,
{
    pub fn new(engine: FlowEngine<F>, queue: Arc<dyn MessageQueue>, audit: Arc<dyn AuditSink>) -> Self {
        Self { engine, queue, audit }
    }
}

#[async_trait]
impl<F> IntentHandler for ReservationIntentHandler<F>
where
    F: FlowDefinition + Send + Sync,
{
    fn intent_name(&self) -> &str {
        self.engine.intent_name()
    }

    async fn handle(
        &self,
        request: &ReservationRequest,
        correlation_id: &str,
    ) -> Result<DialogResponse, ApplicationError> {
        let context = AuditContext::new(
            Some(request.user_id.clone()),
            Some(request.intent_name.clone()),
            correlation_id,
            ACTOR,
        );
        let outcome = self
            .engine
            .apply_with_audit(request, self.audit.as_ref(), &context)
            .map_err(DomainError::from)?;

        for action in &outcome.actions {
            match action {
                FlowAction::EnqueueReservation(slots) => {
                    let cuisine = slots.cuisine.as_deref().unwrap_or_default();
                    let message_id = match self
                        .queue
                        .enqueue(RESERVATION_MESSAGE_BODY, slots.to_message_attributes())
                        .await
                    {
                        Ok(message_id) => message_id,
                        Err(error) => {
                            self.audit.emit(
                                AuditEvent::new(
                                    &context,
                                    "queue.reservation_enqueue_failed",
                                    AuditCategory::Queue,
                                    AuditOutcome::Failed,
                                )
                                .with_metadata("cuisine", cuisine)
                                .with_metadata("error", error.to_string()),
                            );
                            return Err(error.into());
                        }
                    };
                    self.audit.emit(
                        AuditEvent::new(
                            &context,
                            "queue.reservation_enqueued",
                            AuditCategory::Queue,
                            AuditOutcome::Success,
                        )
                        .with_metadata("message_id", message_id.clone())
                        .with_metadata("cuisine", cuisine),
                    );
                    info!(
                        event_name = "dialog.reservation_enqueued",
                        correlation_id,
                        session_id = %request.user_id,
                        message_id = %message_id,
                        cuisine,
                        "reservation queued for recommendation"
                    );
                }
            }
        }

        info!(
            event_name = "dialog.turn_completed",
            correlation_id,
            session_id = %request.user_id,
            from = ?outcome.from,
            to = ?outcome.to,
            "dialog turn completed"
        );
        Ok(outcome.response)
    }
}
