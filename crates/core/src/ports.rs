//! Contracts for the external services the chatbot delegates to.
//!
//! Adapters live in `concierge-db` (SQLite record store, search and queue) and
//! `concierge-server` (OpenSearch and notification HTTP clients).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::restaurant::{BusinessId, RestaurantRecord, SearchHit};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    Nlu,
    Queue,
    Search,
    RecordStore,
    Notification,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nlu => "nlu",
            Self::Queue => "queue",
            Self::Search => "search",
            Self::RecordStore => "record_store",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} request failed: {message}")]
    Request { service: Collaborator, message: String },
    #[error("{service} returned status {status}")]
    Status { service: Collaborator, status: u16 },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: Collaborator, message: String },
}

impl CollaboratorError {
    pub fn request(service: Collaborator, message: impl fmt::Display) -> Self {
        Self::Request { service, message: message.to_string() }
    }

    pub fn status(service: Collaborator, status: u16) -> Self {
        Self::Status { service, status }
    }

    pub fn decode(service: Collaborator, message: impl fmt::Display) -> Self {
        Self::Decode { service, message: message.to_string() }
    }

    pub fn service(&self) -> Collaborator {
        match self {
            Self::Request { service, .. }
            | Self::Status { service, .. }
            | Self::Decode { service, .. } => *service,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
    pub receive_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DequeueOptions {
    pub max_messages: u32,
    pub wait: Duration,
    pub visibility_timeout: Duration,
}

impl Default for DequeueOptions {
    fn default() -> Self {
        Self { max_messages: 1, wait: Duration::ZERO, visibility_timeout: Duration::from_secs(10) }
    }
}

/// At-least-once queue with visibility-timeout leases. A dequeued message is
/// hidden until its lease expires; deleting it requires the receipt handle
/// issued by the delivery that is being acknowledged.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(
        &self,
        body: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, CollaboratorError>;

    async fn dequeue(&self, options: &DequeueOptions)
        -> Result<Vec<QueueMessage>, CollaboratorError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub match_field: String,
    pub value: String,
    pub size: u32,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CollaboratorError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_key(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<RestaurantRecord>, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        message: &str,
        subject: &str,
    ) -> Result<DeliveryReceipt, CollaboratorError>;
}
