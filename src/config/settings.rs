//! Process settings: bind address, database, and where the schema documents live.

use crate::config::loader::read_yaml;
use crate::error::LoadError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_PATH: &str = "config/config.yaml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub paths: PathSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".into(),
            port: 8080,
            body_limit: 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            url: "postgres://localhost/schema_crud".into(),
            max_connections: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub entities: PathBuf,
    pub defaults: PathBuf,
    pub form_codes: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            entities: "config/entities".into(),
            defaults: "config/defaults".into(),
            form_codes: "config/form_codes".into(),
        }
    }
}

impl Settings {
    /// Settings file named by `CONFIG_PATH` (or the default location), then
    /// `DATABASE_URL` and `PORT` from the environment on top.
    pub fn from_env() -> Result<Self, LoadError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.into());
        let mut settings = Settings::load(Path::new(&path))?;
        settings.apply_overrides(
            std::env::var("DATABASE_URL").ok(),
            std::env::var("PORT").ok(),
        );
        Ok(settings)
    }

    /// A missing file yields the built-in defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Settings::default());
        }
        read_yaml(path)
    }

    fn apply_overrides(&mut self, database_url: Option<String>, port: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.is_empty()) {
            self.database.url = url;
        }
        if let Some(port) = port {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(port = %port, "ignoring invalid PORT"),
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
