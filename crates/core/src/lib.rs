//! Domain core for the dining concierge: slot validation, the dialog flow,
//! collaborator ports and the recommendation resolver.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ports;
pub mod recommendation;
pub mod validation;

pub use domain::reservation::{
    InvocationSource, ReservationRequest, ReservationSlots, Slot, DINING_SUGGESTION_INTENT,
    RESERVATION_MESSAGE_BODY,
};
pub use domain::restaurant::{BusinessId, Coordinates, RestaurantRecord, SearchHit};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{DialogAction, DialogResponse, FlowAction, FlowEngine, TransitionOutcome};
pub use ports::{
    Collaborator, CollaboratorError, MessageQueue, NotificationChannel, RecordStore, SearchIndex,
};
pub use validation::{Clock, ReservationValidator, ValidationResult, ValidationRules};
