pub mod bootstrap;
pub mod chat;
pub mod clients;
pub mod health;
pub mod worker;

use axum::Router;

use crate::bootstrap::Application;
use crate::chat::ChatState;
use crate::health::HealthState;

/// Every HTTP route the server exposes, bound to the bootstrapped collaborators.
pub fn app_router(app: &Application) -> Router {
    chat::router(ChatState::new(app.gateway.clone(), app.intents.clone()))
        .merge(health::router(HealthState::new(app.db_pool.clone(), app.queue.clone())))
}
