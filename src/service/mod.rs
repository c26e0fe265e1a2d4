//! Entity operations over the loaded model: binding, validation, presentation and CRUD.

mod binder;
mod crud;
pub mod payload;
pub mod present;
mod validation;
pub use binder::{BindError, FormBinder, SubmittedValues};
pub use crud::CrudService;
pub use payload::*;
pub use validation::{FieldErrors, RequestValidator};
