//! Shared application state for all routes. The registry is built once at startup and only read afterwards.

use crate::config::EntityRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: Arc<EntityRegistry>,
}
