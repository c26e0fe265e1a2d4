pub mod types;
pub mod resolved;
pub mod defaults;
pub mod loader;
pub mod validator;
pub mod settings;

pub use types::*;
pub use resolved::*;
pub use defaults::{DefaultsRegistry, MergeDefaults};
pub use loader::*;
pub use validator::*;
pub use settings::Settings;
