use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

use crate::config::expand_env_vars;

pub type Db = Surreal<Any>;

/// Default connect timeout for backend connections, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

pub(crate) fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_namespace() -> String {
    env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "mt".to_string())
}

fn default_database() -> String {
    env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "app".to_string())
}

/// Settings from `SURREALDB_*` variables.
///
/// Without `SURREALDB_URL` the URL falls back to the in-process `memory`
/// engine. `DataConfig::from_env` never takes that path since it only adds a
/// database entry when the variable is set; the fallback serves settings
/// built directly, e.g. `DatabaseSettings { username: None, ..Default::default() }`.
impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: default_namespace(),
            database: default_database(),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl DatabaseSettings {
    pub(crate) fn expanded(self) -> Self {
        Self {
            url: expand_env_vars(&self.url),
            namespace: expand_env_vars(&self.namespace),
            database: expand_env_vars(&self.database),
            username: self.username.as_deref().map(expand_env_vars),
            password: self.password.as_deref().map(expand_env_vars),
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

/// Open a database connection and probe it.
pub async fn create_connection(settings: &DatabaseSettings) -> Result<Db> {
    let db = surrealdb::engine::any::connect(settings.url.as_str()).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    db.use_ns(settings.namespace.as_str())
        .use_db(settings.database.as_str())
        .await?;

    db.health().await?;

    Ok(db)
}
