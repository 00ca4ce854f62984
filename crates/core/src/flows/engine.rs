use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::reservation::{
    InvocationSource, ReservationRequest, Slot, DINING_SUGGESTION_INTENT,
};
use crate::flows::states::{
    DialogAction, DialogMessage, DialogResponse, DialogState, FlowAction, FulfillmentState,
    TransitionOutcome,
};
use crate::validation::{Clock, ReservationValidator, ZonedClock};

pub const DEFAULT_CONFIRMATION_MESSAGE: &str =
    "You’re all set. Expect my suggestions shortly! Have a good day.";

pub trait FlowDefinition {
    fn intent_name(&self) -> &str;
    fn transition(
        &self,
        request: &ReservationRequest,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Dialog for the dining-suggestion intent: validate on every dialog hook,
/// enqueue on fulfillment.
#[derive(Clone, Debug)]
pub struct DiningSuggestionFlow<C = ZonedClock> {
    intent_name: String,
    validator: ReservationValidator<C>,
    confirmation_message: String,
}

impl Default for DiningSuggestionFlow<ZonedClock> {
    fn default() -> Self {
        Self::new(DINING_SUGGESTION_INTENT, ReservationValidator::default(), DEFAULT_CONFIRMATION_MESSAGE)
    }
}

impl<C> DiningSuggestionFlow<C>
where
    C: Clock,
{
    pub fn new(
        intent_name: impl Into<String>,
        validator: ReservationValidator<C>,
        confirmation_message: impl Into<String>,
    ) -> Self {
        Self {
            intent_name: intent_name.into(),
            validator,
            confirmation_message: confirmation_message.into(),
        }
    }

    pub fn validator(&self) -> &ReservationValidator<C> {
        &self.validator
    }
}

impl<C> FlowDefinition for DiningSuggestionFlow<C>
where
    C: Clock,
{
    fn intent_name(&self) -> &str {
        &self.intent_name
    }

    fn transition(
        &self,
        request: &ReservationRequest,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let from = DialogState::entry(request.invocation_source);
        let session_attributes = request.session_attributes.clone();

        match request.invocation_source {
            InvocationSource::DialogCodeHook => {
                let validation = self.validator.validate(&request.slots);
                let mut slots = request.slots.clone();

                let (to, dialog_action) = match (validation.violated_slot, &validation.message) {
                    (Some(violated_slot), Some(message)) if !validation.is_valid => {
                        slots.clear(violated_slot);
                        (
                            DialogState::Eliciting,
                            DialogAction::ElicitSlot {
                                intent_name: request.intent_name.clone(),
                                slots,
                                slot_to_elicit: violated_slot,
                                message: DialogMessage::plain_text(message.clone()),
                            },
                        )
                    }
                    _ => (DialogState::Delegating, DialogAction::Delegate { slots }),
                };

                Ok(TransitionOutcome {
                    from,
                    to,
                    response: DialogResponse { session_attributes, dialog_action },
                    actions: Vec::new(),
                    validation: Some(validation),
                })
            }
            InvocationSource::FulfillmentCodeHook => {
                let missing_slots = request.slots.missing();
                if !missing_slots.is_empty() {
                    return Err(FlowTransitionError::MissingRequiredSlots {
                        state: from,
                        missing_slots,
                    });
                }

                Ok(TransitionOutcome {
                    from,
                    to: DialogState::Fulfilling,
                    response: DialogResponse {
                        session_attributes,
                        dialog_action: DialogAction::Close {
                            fulfillment_state: FulfillmentState::Fulfilled,
                            message: DialogMessage::plain_text(self.confirmation_message.clone()),
                        },
                    },
                    actions: vec![FlowAction::EnqueueReservation(request.slots.clone())],
                    validation: None,
                })
            }
        }
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn intent_name(&self) -> &str {
        self.flow.intent_name()
    }

    pub fn apply(
        &self,
        request: &ReservationRequest,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(request)
    }

    pub fn apply_with_audit<S>(
        &self,
        request: &ReservationRequest,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(request);
        match &result {
            Ok(outcome) => {
                let mut event = AuditEvent::new(
                    audit,
                    "dialog.transition_applied",
                    AuditCategory::Dialog,
                    AuditOutcome::Success,
                )
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to));
                if let Some(slot) = outcome.validation.as_ref().and_then(|v| v.violated_slot) {
                    event = event.with_metadata("violated_slot", slot.as_str());
                }
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "dialog.transition_rejected",
                        AuditCategory::Dialog,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<DiningSuggestionFlow<ZonedClock>> {
    fn default() -> Self {
        Self::new(DiningSuggestionFlow::default())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required slots before transition from {state:?}: {missing_slots:?}")]
    MissingRequiredSlots { state: DialogState, missing_slots: Vec<Slot> },
}
