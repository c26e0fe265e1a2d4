//! Schema CRUD: list, form, lookup and validation behavior generated from declarative entity documents.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{load_entities, load_entity, DefaultsRegistry, EntityModel, EntityRegistry, Settings};
pub use error::{AppError, LoadError};
pub use routes::{build_router, common_routes, entity_routes};
pub use service::CrudService;
pub use state::AppState;
