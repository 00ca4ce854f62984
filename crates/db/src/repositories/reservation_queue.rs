use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use concierge_core::ports::{
    Collaborator, CollaboratorError, DequeueOptions, MessageQueue, QueueMessage,
};

use super::{format_timestamp, parse_u32, RepositoryError};
use crate::DbPool;

const LONG_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: u64,
    pub in_flight: u64,
    pub dead_lettered: u64,
}

/// Visibility-lease queue stored in SQLite.
///
/// A delivery hides the message until `visibility_timeout` elapses and issues
/// a fresh receipt handle; only the latest handle can delete it. A message
/// that is due again after `max_receive_count` deliveries is moved to the
/// dead-letter state instead of being delivered.
pub struct SqlReservationQueue {
    pool: DbPool,
    queue_name: String,
    max_receive_count: u32,
}

impl SqlReservationQueue {
    pub fn new(pool: DbPool, queue_name: impl Into<String>, max_receive_count: u32) -> Self {
        Self { pool, queue_name: queue_name.into(), max_receive_count: max_receive_count.max(1) }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub async fn send(
        &self,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, RepositoryError> {
        let message_id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        let attributes_json = serde_json::to_string(attributes)
            .map_err(|error| RepositoryError::Decode(format!("attributes: {error}")))?;

        sqlx::query(
            "INSERT INTO reservation_queue (
                id,
                queue_name,
                body,
                attributes_json,
                status,
                receive_count,
                receipt_handle,
                visible_at,
                enqueued_at
             ) VALUES (?, ?, ?, ?, 'pending', 0, NULL, ?, ?)",
        )
        .bind(&message_id)
        .bind(&self.queue_name)
        .bind(body)
        .bind(attributes_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(message_id)
    }

    pub async fn receive(
        &self,
        options: &DequeueOptions,
    ) -> Result<Vec<QueueMessage>, RepositoryError> {
        let deadline = Instant::now() + options.wait;
        loop {
            let messages = self.receive_visible(options).await?;
            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(messages);
            }
            sleep(LONG_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())))
                .await;
        }
    }

    async fn receive_visible(
        &self,
        options: &DequeueOptions,
    ) -> Result<Vec<QueueMessage>, RepositoryError> {
        let now = Utc::now();
        let now_text = format_timestamp(now);
        let rows = sqlx::query(
            "SELECT id, body, attributes_json, receive_count
             FROM reservation_queue
             WHERE queue_name = ? AND status = 'pending' AND visible_at <= ?
             ORDER BY enqueued_at ASC, id ASC
             LIMIT ?",
        )
        .bind(&self.queue_name)
        .bind(&now_text)
        .bind(i64::from(options.max_messages.max(1)))
        .fetch_all(&self.pool)
        .await?;

        let mut delivered = Vec::with_capacity(rows.len());
        for row in rows {
            let candidate = candidate_from_row(row)?;
            if candidate.receive_count >= self.max_receive_count {
                self.dead_letter(&candidate.id, &now_text).await?;
                continue;
            }

            let receipt_handle = Uuid::new_v4().to_string();
            let visible_at = lease_expiry(now, options.visibility_timeout);
            let claimed = sqlx::query(
                "UPDATE reservation_queue
                 SET receive_count = receive_count + 1, receipt_handle = ?, visible_at = ?
                 WHERE id = ? AND status = 'pending' AND visible_at <= ?",
            )
            .bind(&receipt_handle)
            .bind(format_timestamp(visible_at))
            .bind(&candidate.id)
            .bind(&now_text)
            .execute(&self.pool)
            .await?;

            // Another consumer leased it between the read and the update.
            if claimed.rows_affected() == 0 {
                continue;
            }

            delivered.push(QueueMessage {
                message_id: candidate.id,
                receipt_handle,
                body: candidate.body,
                attributes: candidate.attributes,
                receive_count: candidate.receive_count + 1,
            });
        }

        Ok(delivered)
    }

    async fn dead_letter(&self, id: &str, now: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE reservation_queue
             SET status = 'dead_letter', receipt_handle = NULL, dead_lettered_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when the handle is unknown or was superseded by a later
    /// delivery.
    pub async fn acknowledge(&self, receipt_handle: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM reservation_queue
             WHERE queue_name = ? AND receipt_handle = ? AND status = 'pending'",
        )
        .bind(&self.queue_name)
        .bind(receipt_handle)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn depth(&self) -> Result<QueueDepth, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' AND visible_at <= ? THEN 1 ELSE 0 END), 0) AS visible,
                COALESCE(SUM(CASE WHEN status = 'pending' AND visible_at > ? THEN 1 ELSE 0 END), 0) AS in_flight,
                COALESCE(SUM(CASE WHEN status = 'dead_letter' THEN 1 ELSE 0 END), 0) AS dead_lettered
             FROM reservation_queue
             WHERE queue_name = ?",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(format_timestamp(Utc::now()))
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueDepth {
            visible: count_column(&row, "visible")?,
            in_flight: count_column(&row, "in_flight")?,
            dead_lettered: count_column(&row, "dead_lettered")?,
        })
    }
}

#[async_trait]
impl MessageQueue for SqlReservationQueue {
    async fn enqueue(
        &self,
        body: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, CollaboratorError> {
        self.send(body, &attributes).await.map_err(|error| error.into_collaborator(Collaborator::Queue))
    }

    async fn dequeue(
        &self,
        options: &DequeueOptions,
    ) -> Result<Vec<QueueMessage>, CollaboratorError> {
        self.receive(options).await.map_err(|error| error.into_collaborator(Collaborator::Queue))
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), CollaboratorError> {
        let deleted = self
            .acknowledge(receipt_handle)
            .await
            .map_err(|error| error.into_collaborator(Collaborator::Queue))?;
        if deleted {
            Ok(())
        } else {
            Err(CollaboratorError::request(
                Collaborator::Queue,
                format!("receipt handle `{receipt_handle}` is not valid"),
            ))
        }
    }
}

struct Candidate {
    id: String,
    body: String,
    attributes: BTreeMap<String, String>,
    receive_count: u32,
}

fn candidate_from_row(row: SqliteRow) -> Result<Candidate, RepositoryError> {
    let id: String = row.try_get("id")?;
    let attributes_json: String = row.try_get("attributes_json")?;
    let attributes = serde_json::from_str(&attributes_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid attributes for message `{id}`: {error}"))
    })?;

    Ok(Candidate {
        body: row.try_get("body")?,
        attributes,
        receive_count: parse_u32("receive_count", row.try_get("receive_count")?)?,
        id,
    })
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u64, RepositoryError> {
    let value = row.try_get::<i64, _>(column)?;
    u64::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative count in `{column}`: {value}")))
}

fn lease_expiry(now: DateTime<Utc>, visibility_timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(visibility_timeout)
        .ok()
        .and_then(|timeout| now.checked_add_signed(timeout))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use concierge_core::ports::{Collaborator, DequeueOptions, MessageQueue};

    use super::{QueueDepth, SqlReservationQueue};
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn attributes() -> BTreeMap<String, String> {
        [("Cuisine", "italian"), ("PhoneNumber", "5551234567")]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn options(visibility_secs: u64) -> DequeueOptions {
        DequeueOptions {
            max_messages: 10,
            wait: Duration::ZERO,
            visibility_timeout: Duration::from_secs(visibility_secs),
        }
    }

    #[tokio::test]
    async fn leased_messages_are_hidden_until_deleted() {
        let pool = setup_pool().await;
        let queue = SqlReservationQueue::new(pool.clone(), "reservations", 5);

        let message_id = queue.enqueue("User reservation info", attributes()).await.expect("enqueue");
        assert_eq!(queue.depth().await.expect("depth"), QueueDepth { visible: 1, in_flight: 0, dead_lettered: 0 });

        let delivered = queue.dequeue(&options(30)).await.expect("dequeue");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message_id, message_id);
        assert_eq!(delivered[0].body, "User reservation info");
        assert_eq!(delivered[0].attributes, attributes());
        assert_eq!(delivered[0].receive_count, 1);

        assert!(queue.dequeue(&options(30)).await.expect("second dequeue").is_empty());
        assert_eq!(queue.depth().await.expect("depth").in_flight, 1);

        queue.delete(&delivered[0].receipt_handle).await.expect("delete");
        assert_eq!(queue.depth().await.expect("depth"), QueueDepth::default());

        pool.close().await;
    }

    #[tokio::test]
    async fn expired_leases_are_redelivered_with_a_fresh_receipt() {
        let pool = setup_pool().await;
        let queue = SqlReservationQueue::new(pool.clone(), "reservations", 5);
        queue.enqueue("User reservation info", attributes()).await.expect("enqueue");

        let first = queue.dequeue(&options(0)).await.expect("first dequeue");
        let second = queue.dequeue(&options(0)).await.expect("second dequeue");

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
        assert_ne!(first[0].receipt_handle, second[0].receipt_handle);

        let stale = queue.delete(&first[0].receipt_handle).await.expect_err("stale receipt");
        assert_eq!(stale.service(), Collaborator::Queue);
        queue.delete(&second[0].receipt_handle).await.expect("current receipt deletes");

        pool.close().await;
    }

    #[tokio::test]
    async fn messages_are_dead_lettered_after_max_receives() {
        let pool = setup_pool().await;
        let queue = SqlReservationQueue::new(pool.clone(), "reservations", 2);
        queue.enqueue("User reservation info", attributes()).await.expect("enqueue");

        assert_eq!(queue.dequeue(&options(0)).await.expect("receive 1").len(), 1);
        assert_eq!(queue.dequeue(&options(0)).await.expect("receive 2").len(), 1);
        assert!(queue.dequeue(&options(0)).await.expect("receive 3").is_empty());

        assert_eq!(
            queue.depth().await.expect("depth"),
            QueueDepth { visible: 0, in_flight: 0, dead_lettered: 1 }
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn queues_are_isolated_by_name() {
        let pool = setup_pool().await;
        let reservations = SqlReservationQueue::new(pool.clone(), "reservations", 5);
        let other = SqlReservationQueue::new(pool.clone(), "other", 5);
        reservations.enqueue("User reservation info", attributes()).await.expect("enqueue");

        assert!(other.dequeue(&options(30)).await.expect("dequeue other").is_empty());
        assert_eq!(reservations.dequeue(&options(30)).await.expect("dequeue").len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn dequeue_respects_max_messages() {
        let pool = setup_pool().await;
        let queue = SqlReservationQueue::new(pool.clone(), "reservations", 5);
        for _ in 0..3 {
            queue.enqueue("User reservation info", attributes()).await.expect("enqueue");
        }

        let single = DequeueOptions { max_messages: 1, ..options(30) };
        assert_eq!(queue.dequeue(&single).await.expect("dequeue").len(), 1);
        assert_eq!(queue.depth().await.expect("depth").visible, 2);

        pool.close().await;
    }
}
