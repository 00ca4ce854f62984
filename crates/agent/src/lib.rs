//! Agent Runtime - the conversational edge of the concierge
//!
//! The NLU engine owns the conversation; this crate supplies the code it
//! calls back into and the relay in front of it:
//!
//! 1. **Gateway** (`gateway`) - forward a chat message to the NLU engine and
//!    wrap its reply for the web client
//! 2. **Code hook** (`codehook`) - decode the engine's per-turn event into a
//!    `ReservationRequest`
//! 3. **Routing** (`runtime`) - dispatch by intent name, run the dialog flow,
//!    and queue fulfilled reservations
//!
//! Slot validation and dialog transitions are deterministic and live in
//! `concierge-core`; nothing here decides whether a reservation is valid.

pub mod codehook;
pub mod gateway;
pub mod nlu;
pub mod runtime;

pub use codehook::{CodeHookEvent, CurrentIntent};
pub use gateway::{ChatGateway, GatewayEnvelope, InboundChat};
pub use nlu::{HttpNluClient, NluClient, NluReply, NluRequest};
pub use runtime::{IntentHandler, IntentRouter, ReservationIntentHandler};
