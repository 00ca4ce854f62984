use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use concierge_agent::{ChatGateway, HttpNluClient, IntentRouter, ReservationIntentHandler};
use concierge_core::audit::TracingAuditSink;
use concierge_core::config::{
    AppConfig, ConfigError, LoadOptions, NotificationBackend, SearchBackend,
};
use concierge_core::flows::{DiningSuggestionFlow, FlowEngine};
use concierge_core::ports::{CollaboratorError, MessageQueue, NotificationChannel, SearchIndex};
use concierge_core::recommendation::{
    NotificationFormatter, RecommendationResolver, ThreadRandomSource,
    DEFAULT_NOTIFICATION_TEMPLATE,
};
use concierge_core::validation::{ReservationValidator, ZonedClock};
use concierge_db::{
    connect_with_settings, migrations, DbPool, SqlReservationQueue, SqlRestaurantRepository,
};

use crate::clients::{LogNotificationChannel, OpenSearchIndex, WebhookNotificationChannel};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub queue: Arc<SqlReservationQueue>,
    pub intents: Arc<IntentRouter>,
    /// `None` when no NLU endpoint is configured; the gateway route then
    /// answers 503.
    pub gateway: Option<Arc<ChatGateway>>,
    pub resolver: Arc<RecommendationResolver>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("collaborator client setup failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("notification template is invalid: {0}")]
    NotificationTemplate(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        session_id = "unknown",
        "database migrations applied"
    );

    let queue = Arc::new(SqlReservationQueue::new(
        db_pool.clone(),
        config.queue.name.clone(),
        config.queue.max_receive_count,
    ));
    let intents = Arc::new(build_intent_router(&config, queue.clone())?);
    let gateway = HttpNluClient::from_config(&config.nlu)?.map(|client| {
        Arc::new(ChatGateway::new(
            Arc::new(client),
            config.nlu.bot_name.clone(),
            config.nlu.bot_alias.clone(),
        ))
    });
    let resolver = Arc::new(build_resolver(&config, &db_pool, queue.clone())?);

    info!(
        event_name = "system.bootstrap.collaborators_ready",
        correlation_id = "bootstrap",
        session_id = "unknown",
        search_backend = ?config.search.backend,
        notification_backend = ?config.notification.backend,
        gateway_enabled = gateway.is_some(),
        "collaborator clients initialized"
    );

    Ok(Application { config, db_pool, queue, intents, gateway, resolver })
}

pub fn build_intent_router(
    config: &AppConfig,
    queue: Arc<dyn MessageQueue>,
) -> Result<IntentRouter, BootstrapError> {
    let clock = ZonedClock::new(config.dialog.timezone()?);
    let engine = FlowEngine::new(DiningSuggestionFlow::new(
        config.dialog.intent_name.clone(),
        ReservationValidator::new(config.dialog.validation_rules(), clock),
        config.dialog.confirmation_message.clone(),
    ));

    let mut router = IntentRouter::default();
    router.register(Arc::new(ReservationIntentHandler::new(
        engine,
        queue,
        Arc::new(TracingAuditSink),
    )));
    Ok(router)
}

/// Wires the recommendation pipeline against the configured search and
/// notification backends. The record store is always the SQLite table.
pub fn build_resolver(
    config: &AppConfig,
    db_pool: &DbPool,
    queue: Arc<dyn MessageQueue>,
) -> Result<RecommendationResolver, BootstrapError> {
    let records = Arc::new(SqlRestaurantRepository::new(db_pool.clone()));

    let search: Arc<dyn SearchIndex> = match config.search.backend {
        SearchBackend::Database => records.clone(),
        SearchBackend::Opensearch => Arc::new(OpenSearchIndex::from_config(&config.search)?),
    };

    let notifications: Arc<dyn NotificationChannel> = match config.notification.backend {
        NotificationBackend::Log => Arc::new(LogNotificationChannel),
        NotificationBackend::Webhook => {
            Arc::new(WebhookNotificationChannel::from_config(&config.notification)?)
        }
    };

    let formatter = NotificationFormatter::new(DEFAULT_NOTIFICATION_TEMPLATE)
        .map_err(|error| BootstrapError::NotificationTemplate(error.to_string()))?;

    Ok(RecommendationResolver::new(
        queue,
        search,
        records,
        notifications,
        Arc::new(ThreadRandomSource),
        formatter,
        config.recommendation_settings(),
    ))
}
