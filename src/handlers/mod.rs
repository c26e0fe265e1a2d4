//! HTTP handlers for entity lists, forms and lookups.

pub mod entity;
pub use entity::*;
