//! Cache-store (Redis) connections.

use anyhow::{Result, bail};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, IntoConnectionInfo};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::config::expand_env_vars;
use crate::db::{DEFAULT_CONNECT_TIMEOUT_SECONDS, default_connect_timeout};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Redis URL, e.g. `redis://:password@127.0.0.1:6379`
    pub url: String,
    /// Logical database index; overrides the one in the URL
    #[serde(default)]
    pub db: Option<i64>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            db: env::var("REDIS_DB").ok().and_then(|v| v.parse().ok()),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl CacheSettings {
    pub(crate) fn expanded(self) -> Self {
        Self {
            url: expand_env_vars(&self.url),
            db: self.db,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

/// Open a managed Redis connection and verify it answers `PING`.
///
/// The initial connect is attempted once. Reconnects after a later
/// connection loss are left to the manager.
pub async fn create_connection(settings: &CacheSettings) -> Result<ConnectionManager> {
    let mut info = settings.url.as_str().into_connection_info()?;
    if let Some(db) = settings.db {
        info.redis.db = db;
    }

    let client = Client::open(info)?;
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(0)
        .set_connection_timeout(Duration::from_secs(settings.connect_timeout_secs));
    let mut conn = ConnectionManager::new_with_config(client, config).await?;

    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    if pong != "PONG" {
        bail!("unexpected PING reply: {}", pong);
    }

    Ok(conn)
}
