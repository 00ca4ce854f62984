use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use concierge_core::domain::reservation::{InvocationSource, ReservationRequest, ReservationSlots};

/// Code-hook event delivered by the NLU engine on every dialog turn and on
/// fulfillment. Fields the dialog does not use (bot metadata, transcript,
/// output mode) are accepted and ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeHookEvent {
    pub current_intent: CurrentIntent,
    pub invocation_source: InvocationSource,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_attributes: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcript: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentIntent {
    pub name: String,
    #[serde(default)]
    pub slots: ReservationSlots,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_status: Option<String>,
}

impl CodeHookEvent {
    pub fn intent_name(&self) -> &str {
        &self.current_intent.name
    }

    pub fn into_request(self) -> ReservationRequest {
        ReservationRequest {
            intent_name: self.current_intent.name,
            user_id: self.user_id,
            invocation_source: self.invocation_source,
            slots: self.current_intent.slots,
            session_attributes: self.session_attributes.unwrap_or_default(),
        }
    }
}
