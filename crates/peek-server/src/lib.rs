//! HTTP mirror for the Peek sync protocol (spec §4.6). Each `(user,
//! profile)` pair gets its own `datastore.sqlite`, opened lazily and
//! pooled by [`db::ConnectionPool`].

pub mod db;
pub mod error;
pub mod legacy_migration;
pub mod routes;

use std::sync::Arc;

use db::ConnectionPool;

pub const DATASTORE_VERSION: &str = "3";
pub const PROTOCOL_VERSION: &str = "1";

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<ConnectionPool>,
}

pub fn router(state: AppState) -> axum::Router {
    routes::router(state)
}
