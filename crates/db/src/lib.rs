pub mod connection;
pub mod ingest;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use repositories::{
    InMemoryMessageQueue, InMemoryRestaurantStore, QueueDepth, RepositoryError,
    SqlReservationQueue, SqlRestaurantRepository,
};
