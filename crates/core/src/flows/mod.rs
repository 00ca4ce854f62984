pub mod engine;
pub mod states;

pub use engine::{
    DiningSuggestionFlow, FlowDefinition, FlowEngine, FlowTransitionError,
    DEFAULT_CONFIRMATION_MESSAGE,
};
pub use states::{
    ContentType, DialogAction, DialogMessage, DialogResponse, DialogState, FlowAction,
    FulfillmentState, TransitionOutcome,
};
