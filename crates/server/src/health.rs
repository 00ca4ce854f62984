use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use concierge_db::{ping, DbPool, SqlReservationQueue};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    queue: Arc<SqlReservationQueue>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, queue: Arc<SqlReservationQueue>) -> Self {
        Self { db_pool, queue }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueCheck {
    pub status: &'static str,
    pub name: String,
    pub visible: Option<u64>,
    pub in_flight: Option<u64>,
    pub dead_lettered: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub queue: QueueCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let queue = queue_check(&state.queue).await;
    let ready = database.status == "ready" && queue.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "concierge-server runtime initialized".to_string(),
        },
        database,
        queue,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            warn!(
                event_name = "system.health.database_degraded",
                correlation_id = "health",
                session_id = "unknown",
                error = %error,
                "health check database ping failed"
            );
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn queue_check(queue: &SqlReservationQueue) -> QueueCheck {
    match queue.depth().await {
        Ok(depth) => QueueCheck {
            status: "ready",
            name: queue.queue_name().to_string(),
            visible: Some(depth.visible),
            in_flight: Some(depth.in_flight),
            dead_lettered: Some(depth.dead_lettered),
        },
        Err(error) => {
            warn!(
                event_name = "system.health.queue_degraded",
                correlation_id = "health",
                session_id = "unknown",
                queue_name = queue.queue_name(),
                error = %error,
                "health check queue depth query failed"
            );
            QueueCheck {
                status: "degraded",
                name: queue.queue_name().to_string(),
                visible: None,
                in_flight: None,
                dead_lettered: None,
            }
        }
    }
}
