use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::reservation::{ReservationSlots, Slot};
use crate::domain::restaurant::{BusinessId, RestaurantRecord};
use crate::ports::{
    CollaboratorError, DeliveryReceipt, DequeueOptions, MessageQueue, NotificationChannel,
    QueueMessage, RecordStore, SearchIndex, SearchQuery,
};
use crate::recommendation::message::NotificationFormatter;
use crate::recommendation::sampler::{sample_distinct, RandomSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecommendationSettings {
    pub match_field: String,
    pub result_window: u32,
    pub recommendation_count: usize,
    pub topic: String,
    pub subject: String,
    pub dequeue: DequeueOptions,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            match_field: "categories".to_owned(),
            result_window: 200,
            recommendation_count: 3,
            topic: "restaurantRecommendation".to_owned(),
            subject: "Restaurant Recommendation".to_owned(),
            dequeue: DequeueOptions::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
    #[error("queued message `{message_id}` has no `{slot}` attribute")]
    MissingAttribute { message_id: String, slot: Slot },
    #[error("search returned no candidates for cuisine `{cuisine}`")]
    NoCandidates { cuisine: String },
    #[error("none of the sampled candidates for cuisine `{cuisine}` exist in the record store")]
    NoRecords { cuisine: String },
    #[error("notification rendering failed: {0}")]
    Render(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub message_id: String,
    pub cuisine: String,
    pub restaurants: Vec<RestaurantRecord>,
    pub delivery: DeliveryReceipt,
}

impl Recommendation {
    pub fn business_ids(&self) -> Vec<BusinessId> {
        self.restaurants.iter().map(|record| record.business_id.clone()).collect()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub delivered: Vec<Recommendation>,
    pub failed: Vec<(String, ResolveError)>,
}

/// Turns queued reservations into delivered recommendations: search by
/// cuisine, sample, enrich from the record store, publish, then delete the
/// queue message. A message is only deleted after its notification was
/// published, so a failure anywhere leaves it for redelivery.
pub struct RecommendationResolver {
    queue: Arc<dyn MessageQueue>,
    search: Arc<dyn SearchIndex>,
    records: Arc<dyn RecordStore>,
    notifications: Arc<dyn NotificationChannel>,
    random: Arc<dyn RandomSource>,
    formatter: NotificationFormatter,
    settings: RecommendationSettings,
}

impl RecommendationResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        search: Arc<dyn SearchIndex>,
        records: Arc<dyn RecordStore>,
        notifications: Arc<dyn NotificationChannel>,
        random: Arc<dyn RandomSource>,
        formatter: NotificationFormatter,
        settings: RecommendationSettings,
    ) -> Self {
        Self { queue, search, records, notifications, random, formatter, settings }
    }

    pub fn settings(&self) -> &RecommendationSettings {
        &self.settings
    }

    pub async fn poll_once(&self) -> Result<PollReport, CollaboratorError> {
        let messages = self.queue.dequeue(&self.settings.dequeue).await?;
        let mut report = PollReport { received: messages.len(), ..PollReport::default() };

        if messages.is_empty() {
            debug!(event_name = "worker.queue_empty", "no reservation messages available");
            return Ok(report);
        }

        for message in messages {
            match self.resolve(&message).await {
                Ok(recommendation) => report.delivered.push(recommendation),
                Err(error) => {
                    warn!(
                        event_name = "worker.recommendation_failed",
                        correlation_id = %message.message_id,
                        receive_count = message.receive_count,
                        error = %error,
                        "recommendation failed; message left for redelivery"
                    );
                    report.failed.push((message.message_id.clone(), error));
                }
            }
        }

        Ok(report)
    }

    pub async fn resolve(&self, message: &QueueMessage) -> Result<Recommendation, ResolveError> {
        let reservation = ReservationSlots::from_message_attributes(&message.attributes);
        let cuisine = reservation
            .get(Slot::Cuisine)
            .ok_or_else(|| ResolveError::MissingAttribute {
                message_id: message.message_id.clone(),
                slot: Slot::Cuisine,
            })?
            .to_owned();

        let hits = self
            .search
            .search(&SearchQuery {
                match_field: self.settings.match_field.clone(),
                value: cuisine.clone(),
                size: self.settings.result_window,
            })
            .await?;
        if hits.is_empty() {
            return Err(ResolveError::NoCandidates { cuisine });
        }

        let sampled =
            sample_distinct(&hits, self.settings.recommendation_count, self.random.as_ref());
        let mut restaurants = Vec::with_capacity(sampled.len());
        for hit in &sampled {
            match self.records.get_by_key(&hit.business_id).await? {
                Some(record) => restaurants.push(record),
                None => warn!(
                    event_name = "worker.record_missing",
                    correlation_id = %message.message_id,
                    business_id = %hit.business_id,
                    "search hit has no record store entry; skipping"
                ),
            }
        }
        if restaurants.is_empty() {
            return Err(ResolveError::NoRecords { cuisine });
        }

        let body = self
            .formatter
            .render(&restaurants, &reservation)
            .map_err(|error| ResolveError::Render(error.to_string()))?;
        let delivery =
            self.notifications.publish(&self.settings.topic, &body, &self.settings.subject).await?;
        self.queue.delete(&message.receipt_handle).await?;

        info!(
            event_name = "worker.recommendation_sent",
            correlation_id = %message.message_id,
            cuisine = %cuisine,
            candidates = hits.len(),
            recommended = restaurants.len(),
            delivery_id = %delivery.message_id,
            "restaurant recommendation delivered"
        );

        Ok(Recommendation { message_id: message.message_id.clone(), cuisine, restaurants, delivery })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{RecommendationResolver, RecommendationSettings, ResolveError};
    use crate::domain::restaurant::{BusinessId, Coordinates, RestaurantRecord, SearchHit};
    use crate::ports::{
        Collaborator, CollaboratorError, DeliveryReceipt, DequeueOptions, MessageQueue,
        NotificationChannel, QueueMessage, RecordStore, SearchIndex, SearchQuery,
    };
    use crate::recommendation::message::NotificationFormatter;
    use crate::recommendation::sampler::SequenceRandomSource;

    #[derive(Default)]
    struct ScriptedQueue {
        pending: Mutex<VecDeque<QueueMessage>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageQueue for ScriptedQueue {
        async fn enqueue(
            &self,
            _body: &str,
            _attributes: BTreeMap<String, String>,
        ) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::request(Collaborator::Queue, "not used"))
        }

        async fn dequeue(
            &self,
            options: &DequeueOptions,
        ) -> Result<Vec<QueueMessage>, CollaboratorError> {
            let mut pending = self.pending.lock().map_err(|_| CollaboratorError::request(Collaborator::Queue, "poisoned"))?;
            let take = (options.max_messages as usize).min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn delete(&self, receipt_handle: &str) -> Result<(), CollaboratorError> {
            if let Ok(mut deleted) = self.deleted.lock() {
                deleted.push(receipt_handle.to_owned());
            }
            Ok(())
        }
    }

    struct FixedSearch {
        hits: Vec<SearchHit>,
        queries: Mutex<Vec<SearchQuery>>,
    }

    #[async_trait]
    impl SearchIndex for FixedSearch {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CollaboratorError> {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push(query.clone());
            }
            Ok(self.hits.clone())
        }
    }

    struct MapStore(HashMap<BusinessId, RestaurantRecord>);

    #[async_trait]
    impl RecordStore for MapStore {
        async fn get_by_key(
            &self,
            business_id: &BusinessId,
        ) -> Result<Option<RestaurantRecord>, CollaboratorError> {
            Ok(self.0.get(business_id).cloned())
        }
    }

    #[derive(Default)]
    struct CapturingChannel {
        published: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationChannel for CapturingChannel {
        async fn publish(
            &self,
            topic: &str,
            message: &str,
            subject: &str,
        ) -> Result<DeliveryReceipt, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::status(Collaborator::Notification, 502));
            }
            if let Ok(mut published) = self.published.lock() {
                published.push((topic.to_owned(), message.to_owned(), subject.to_owned()));
            }
            Ok(DeliveryReceipt { message_id: "delivery-1".to_owned() })
        }
    }

    fn record(id: &str) -> RestaurantRecord {
        RestaurantRecord {
            business_id: BusinessId(id.to_owned()),
            name: format!("Restaurant {id}"),
            address: format!("{id} Broadway"),
            coordinates: Coordinates { latitude: Decimal::new(407, 1), longitude: Decimal::new(-740, 1) },
            rating: Decimal::new(45, 1),
            number_of_reviews: None,
            zip_code: "10001".to_owned(),
            categories: "Italian".to_owned(),
            inserted_at: Utc::now(),
        }
    }

    fn message(attributes: &[(&str, &str)]) -> QueueMessage {
        QueueMessage {
            message_id: "msg-1".to_owned(),
            receipt_handle: "receipt-1".to_owned(),
            body: "User reservation info".to_owned(),
            attributes: attributes.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
            receive_count: 1,
        }
    }

    struct Fixture {
        queue: Arc<ScriptedQueue>,
        search: Arc<FixedSearch>,
        channel: Arc<CapturingChannel>,
        resolver: RecommendationResolver,
    }

    fn fixture(hit_ids: &[&str], stored_ids: &[&str], picks: Vec<usize>, fail_publish: bool) -> Fixture {
        let queue = Arc::new(ScriptedQueue::default());
        let search = Arc::new(FixedSearch {
            hits: hit_ids
                .iter()
                .map(|id| SearchHit { business_id: BusinessId((*id).to_owned()), categories: None })
                .collect(),
            queries: Mutex::new(Vec::new()),
        });
        let store = Arc::new(MapStore(
            stored_ids.iter().map(|id| (BusinessId((*id).to_owned()), record(id))).collect(),
        ));
        let channel = Arc::new(CapturingChannel { fail: fail_publish, ..CapturingChannel::default() });
        let resolver = RecommendationResolver::new(
            queue.clone(),
            search.clone(),
            store,
            channel.clone(),
            Arc::new(SequenceRandomSource::new(picks)),
            NotificationFormatter::default(),
            RecommendationSettings::default(),
        );
        Fixture { queue, search, channel, resolver }
    }

    #[tokio::test]
    async fn resolves_searches_samples_publishes_and_deletes() {
        let fixture = fixture(&["a", "b", "c", "d", "e"], &["a", "b", "c", "d", "e"], vec![4, 0, 1], false);

        let recommendation = fixture
            .resolver
            .resolve(&message(&[("Cuisine", "italian"), ("PhoneNumber", "5551234567")]))
            .await
            .expect("resolution should succeed");

        assert_eq!(
            recommendation.business_ids(),
            vec![BusinessId("e".to_owned()), BusinessId("b".to_owned()), BusinessId("d".to_owned())]
        );

        let queries = fixture.search.queries.lock().expect("lock").clone();
        assert_eq!(
            queries,
            vec![SearchQuery { match_field: "categories".to_owned(), value: "italian".to_owned(), size: 200 }]
        );

        let published = fixture.channel.published.lock().expect("lock").clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "restaurantRecommendation");
        assert_eq!(published[0].2, "Restaurant Recommendation");
        assert!(published[0].1.contains("1.\nRestaurant name: Restaurant e"));
        assert!(published[0].1.ends_with("Bon appetit"));

        assert_eq!(*fixture.queue.deleted.lock().expect("lock"), vec!["receipt-1".to_owned()]);
    }

    #[tokio::test]
    async fn missing_records_are_skipped() {
        let fixture = fixture(&["a", "b", "c"], &["b"], vec![0], false);

        let recommendation = fixture
            .resolver
            .resolve(&message(&[("Cuisine", "italian")]))
            .await
            .expect("one stored record is enough");
        assert_eq!(recommendation.business_ids(), vec![BusinessId("b".to_owned())]);
    }

    #[tokio::test]
    async fn empty_search_results_fail_without_deleting() {
        let fixture = fixture(&[], &[], vec![0], false);

        let error = fixture
            .resolver
            .resolve(&message(&[("Cuisine", "french")]))
            .await
            .expect_err("no hits should fail");

        assert_eq!(error, ResolveError::NoCandidates { cuisine: "french".to_owned() });
        assert!(fixture.queue.deleted.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn publish_failure_leaves_message_for_redelivery() {
        let fixture = fixture(&["a"], &["a"], vec![0], true);

        let error = fixture
            .resolver
            .resolve(&message(&[("Cuisine", "italian")]))
            .await
            .expect_err("publish failure should surface");

        assert!(matches!(error, ResolveError::Upstream(CollaboratorError::Status { status: 502, .. })));
        assert!(fixture.queue.deleted.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn poll_once_reports_each_message_outcome() {
        let fixture = fixture(&["a"], &["a"], vec![0], false);
        {
            let mut pending = fixture.queue.pending.lock().expect("lock");
            pending.push_back(message(&[("Cuisine", "italian")]));
        }

        let report = fixture.resolver.poll_once().await.expect("poll should succeed");
        assert_eq!(report.received, 1);
        assert_eq!(report.delivered.len(), 1);
        assert!(report.failed.is_empty());

        {
            let mut pending = fixture.queue.pending.lock().expect("lock");
            let mut without_cuisine = message(&[("Date", "2026-03-14")]);
            without_cuisine.message_id = "msg-2".to_owned();
            pending.push_back(without_cuisine);
        }
        let report = fixture.resolver.poll_once().await.expect("poll should succeed");
        assert_eq!(report.delivered.len(), 0);
        assert!(matches!(
            report.failed.as_slice(),
            [(id, ResolveError::MissingAttribute { .. })] if id == "msg-2"
        ));

        let report = fixture.resolver.poll_once().await.expect("poll should succeed");
        assert_eq!(report, Default::default());
    }
}
