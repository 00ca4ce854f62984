use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use concierge_core::ports::{Collaborator, CollaboratorError};

pub mod memory;
pub mod reservation_queue;
pub mod restaurant;

pub use memory::{InMemoryMessageQueue, InMemoryRestaurantStore};
pub use reservation_queue::{QueueDepth, SqlReservationQueue};
pub use restaurant::SqlRestaurantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn into_collaborator(self, service: Collaborator) -> CollaboratorError {
        match self {
            Self::Database(error) => CollaboratorError::request(service, error),
            Self::Decode(message) => CollaboratorError::decode(service, message),
        }
    }
}

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}
