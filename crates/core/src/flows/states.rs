use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::reservation::{InvocationSource, ReservationSlots, Slot};
use crate::validation::ValidationResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    Eliciting,
    Validating,
    Delegating,
    Fulfilling,
}

impl DialogState {
    /// State a turn starts in, given who invoked the code hook.
    pub fn entry(source: InvocationSource) -> Self {
        match source {
            InvocationSource::DialogCodeHook => Self::Validating,
            InvocationSource::FulfillmentCodeHook => Self::Fulfilling,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentState {
    Fulfilled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    PlainText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogMessage {
    pub content_type: ContentType,
    pub content: String,
}

impl DialogMessage {
    pub fn plain_text(content: impl Into<String>) -> Self {
        Self { content_type: ContentType::PlainText, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DialogAction {
    ElicitSlot {
        intent_name: String,
        slots: ReservationSlots,
        slot_to_elicit: Slot,
        message: DialogMessage,
    },
    Delegate {
        slots: ReservationSlots,
    },
    Close {
        fulfillment_state: FulfillmentState,
        message: DialogMessage,
    },
}

/// Code-hook response handed back to the NLU engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogResponse {
    pub session_attributes: BTreeMap<String, String>,
    pub dialog_action: DialogAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    EnqueueReservation(ReservationSlots),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DialogState,
    pub to: DialogState,
    pub response: DialogResponse,
    pub actions: Vec<FlowAction>,
    pub validation: Option<ValidationResult>,
}
