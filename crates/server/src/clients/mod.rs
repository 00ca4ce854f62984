//! HTTP adapters for the collaborators that are not served from SQLite.

pub mod notification;
pub mod opensearch;

pub use notification::{LogNotificationChannel, WebhookNotificationChannel};
pub use opensearch::OpenSearchIndex;
