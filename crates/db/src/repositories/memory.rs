use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use concierge_core::domain::restaurant::{BusinessId, RestaurantRecord, SearchHit};
use concierge_core::ports::{
    Collaborator, CollaboratorError, DequeueOptions, MessageQueue, QueueMessage, RecordStore,
    SearchIndex, SearchQuery,
};

#[derive(Default)]
pub struct InMemoryRestaurantStore {
    records: RwLock<HashMap<BusinessId, RestaurantRecord>>,
}

impl InMemoryRestaurantStore {
    pub async fn insert(&self, record: RestaurantRecord) {
        let mut records = self.records.write().await;
        records.insert(record.business_id.clone(), record);
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRestaurantStore {
    async fn get_by_key(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<RestaurantRecord>, CollaboratorError> {
        let records = self.records.read().await;
        Ok(records.get(business_id).cloned())
    }
}

#[async_trait::async_trait]
impl SearchIndex for InMemoryRestaurantStore {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CollaboratorError> {
        let needle = query.value.trim().to_lowercase();
        let records = self.records.read().await;
        let mut hits = records
            .values()
            .filter(|record| {
                let haystack = match query.match_field.as_str() {
                    "name" => &record.name,
                    _ => &record.categories,
                };
                haystack.to_lowercase().contains(&needle)
            })
            .map(|record| SearchHit {
                business_id: record.business_id.clone(),
                categories: Some(record.categories.clone()),
            })
            .collect::<Vec<_>>();
        hits.sort_by(|left, right| left.business_id.cmp(&right.business_id));
        hits.truncate(query.size as usize);
        Ok(hits)
    }
}

struct StoredMessage {
    message_id: String,
    body: String,
    attributes: BTreeMap<String, String>,
    receive_count: u32,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

/// Process-local queue with the same lease semantics as the SQLite queue,
/// minus dead-lettering and long polling.
#[derive(Default)]
pub struct InMemoryMessageQueue {
    messages: Mutex<Vec<StoredMessage>>,
}

impl InMemoryMessageQueue {
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    /// Copies of every stored message, leased or not.
    pub async fn snapshot(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|message| (message.body.clone(), message.attributes.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn enqueue(
        &self,
        body: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, CollaboratorError> {
        let message_id = Uuid::new_v4().to_string();
        self.messages.lock().await.push(StoredMessage {
            message_id: message_id.clone(),
            body: body.to_string(),
            attributes,
            receive_count: 0,
            receipt_handle: None,
            visible_at: Instant::now(),
        });
        Ok(message_id)
    }

    async fn dequeue(
        &self,
        options: &DequeueOptions,
    ) -> Result<Vec<QueueMessage>, CollaboratorError> {
        let now = Instant::now();
        let mut messages = self.messages.lock().await;
        let mut delivered = Vec::new();

        for message in messages.iter_mut().filter(|message| message.visible_at <= now) {
            if delivered.len() >= options.max_messages.max(1) as usize {
                break;
            }
            let receipt_handle = Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.receipt_handle = Some(receipt_handle.clone());
            message.visible_at = now + options.visibility_timeout;
            delivered.push(QueueMessage {
                message_id: message.message_id.clone(),
                receipt_handle,
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receive_count: message.receive_count,
            });
        }

        Ok(delivered)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), CollaboratorError> {
        let mut messages = self.messages.lock().await;
        let position = messages
            .iter()
            .position(|message| message.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                CollaboratorError::request(
                    Collaborator::Queue,
                    format!("receipt handle `{receipt_handle}` is not valid"),
                )
            })?;
        messages.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use concierge_core::domain::restaurant::{BusinessId, Coordinates, RestaurantRecord};
    use concierge_core::ports::{DequeueOptions, MessageQueue, RecordStore, SearchIndex, SearchQuery};

    use crate::repositories::{InMemoryMessageQueue, InMemoryRestaurantStore};

    fn record(id: &str, categories: &str) -> RestaurantRecord {
        RestaurantRecord {
            business_id: BusinessId(id.to_string()),
            name: format!("Restaurant {id}"),
            address: "1 Main St".to_string(),
            coordinates: Coordinates { latitude: Decimal::ZERO, longitude: Decimal::ZERO },
            rating: Decimal::new(42, 1),
            number_of_reviews: Some(10),
            zip_code: "10001".to_string(),
            categories: categories.to_string(),
            inserted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_store_searches_and_fetches() {
        let store = InMemoryRestaurantStore::default();
        store.insert(record("b", "Japanese")).await;
        store.insert(record("a", "Japanese")).await;
        store.insert(record("c", "Mexican")).await;

        let hits = store
            .search(&SearchQuery {
                match_field: "categories".to_string(),
                value: "JAPANESE".to_string(),
                size: 200,
            })
            .await
            .expect("search");
        let ids = hits.iter().map(|hit| hit.business_id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);

        let found = store.get_by_key(&BusinessId("c".to_string())).await.expect("get");
        assert_eq!(found.map(|record| record.categories), Some("Mexican".to_string()));
    }

    #[tokio::test]
    async fn in_memory_queue_leases_and_deletes() {
        let queue = InMemoryMessageQueue::default();
        queue.enqueue("User reservation info", BTreeMap::new()).await.expect("enqueue");

        let options = DequeueOptions {
            max_messages: 1,
            wait: Duration::ZERO,
            visibility_timeout: Duration::from_secs(60),
        };
        let delivered = queue.dequeue(&options).await.expect("dequeue");
        assert_eq!(delivered.len(), 1);
        assert!(queue.dequeue(&options).await.expect("hidden").is_empty());

        assert!(queue.delete("unknown").await.is_err());
        queue.delete(&delivered[0].receipt_handle).await.expect("delete");
        assert!(queue.is_empty().await);
    }
}
