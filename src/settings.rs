//! Layered configuration: an optional settings file plus `SISMA_` prefixed
//! environment overrides, e.g. `SISMA_CONNECTION__DATABASE=/tmp/app.db`.

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Options handed to [`crate::adapter::Adapter::connect`].
///
/// SQLite is file based, so `database` is the path (`:memory:` for a private
/// in-memory store) and `charset` becomes `PRAGMA encoding`. Hostname, port and
/// the credentials are accepted so that configuration files stay portable
/// between adapters, but the embedded driver has no use for them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub charset: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            hostname: String::from("localhost"),
            port: 0,
            username: String::new(),
            password: String::new(),
            database: String::from(":memory:"),
            charset: String::from("UTF-8"),
        }
    }
}

impl ConnectionOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    /// Passphrase the property cipher key is derived from. Without it, entities
    /// declaring encrypted properties can be neither saved nor hydrated.
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Deepest level a self-referencing tree is walked before giving up.
    pub max_tree_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { max_tree_depth: 64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionOptions,
    pub encryption: EncryptionSettings,
    pub session: SessionOptions,
}

fn environment() -> Environment {
    Environment::with_prefix("SISMA")
        .prefix_separator("_")
        .separator("__")
}

impl Settings {
    /// Reads `path` (any format the `config` crate understands, the file may be
    /// absent) and applies environment overrides on top.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment())
            .build()?;
        Ok(settings.try_deserialize::<Settings>()?)
    }
    /// Environment only.
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(environment())
            .build()?;
        Ok(settings.try_deserialize::<Settings>()?)
    }
}
