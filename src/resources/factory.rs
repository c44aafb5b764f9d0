//! Connection factory: one backend connection from one set of settings.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::debug;

use crate::cache::{self, CacheSettings};
use crate::db::{self, DatabaseSettings, Db};
use crate::types::ConnectionName;

/// Category of external storage dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Persistent store (SurrealDB)
    Database,
    /// Cache store (Redis)
    Cache,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "db",
            Self::Cache => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Settings of one backend endpoint.
#[derive(Debug, Clone)]
pub enum ConnectionSettings {
    Database(DatabaseSettings),
    Cache(CacheSettings),
}

impl ConnectionSettings {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Database(_) => BackendKind::Database,
            Self::Cache(_) => BackendKind::Cache,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        let secs = match self {
            Self::Database(s) => s.connect_timeout_secs,
            Self::Cache(s) => s.connect_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Live client of a backend.
#[derive(Clone)]
pub enum Backend {
    Database(Db),
    Cache(ConnectionManager),
}

/// A live connection tagged with its logical name and kind.
#[derive(Clone)]
pub struct ConnectionHandle {
    name: ConnectionName,
    backend: Backend,
}

impl ConnectionHandle {
    pub fn new(name: ConnectionName, backend: Backend) -> Self {
        Self { name, backend }
    }

    pub fn name(&self) -> &ConnectionName {
        &self.name
    }

    pub fn kind(&self) -> BackendKind {
        match self.backend {
            Backend::Database(_) => BackendKind::Database,
            Backend::Cache(_) => BackendKind::Cache,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The database client, if this is a persistent-store handle.
    pub fn as_database(&self) -> Option<&Db> {
        match &self.backend {
            Backend::Database(db) => Some(db),
            Backend::Cache(_) => None,
        }
    }

    /// The Redis connection, if this is a cache-store handle.
    pub fn as_cache(&self) -> Option<&ConnectionManager> {
        match &self.backend {
            Backend::Cache(conn) => Some(conn),
            Backend::Database(_) => None,
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when creating a backend connection.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Connecting or probing the backend failed.
    Connect {
        kind: BackendKind,
        name: ConnectionName,
        message: String,
    },
    /// The backend did not become ready in time.
    TimedOut {
        kind: BackendKind,
        name: ConnectionName,
        after: Duration,
    },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect {
                kind,
                name,
                message,
            } => write!(f, "Failed to connect {} `{}`: {}", kind, name, message),
            Self::TimedOut { kind, name, after } => write!(
                f,
                "Connecting {} `{}` timed out after {}s",
                kind,
                name,
                after.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Creates one connection handle from one set of settings.
///
/// Implementations report failures and never retry; the registry decides
/// what to do with a failed name.
pub trait ConnectionFactory: Send + Sync {
    type Handle: Send + Sync;

    fn create(
        &self,
        name: &ConnectionName,
        settings: &ConnectionSettings,
    ) -> impl Future<Output = Result<Self::Handle, ConnectionError>> + Send;
}

/// Production factory for SurrealDB and Redis backends.
///
/// Every attempt (connect plus liveness probe) is bounded by the settings'
/// `connect_timeout_secs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendConnector;

impl ConnectionFactory for BackendConnector {
    type Handle = ConnectionHandle;

    fn create(
        &self,
        name: &ConnectionName,
        settings: &ConnectionSettings,
    ) -> impl Future<Output = Result<ConnectionHandle, ConnectionError>> + Send {
        async move {
            debug!("Connecting {} `{}`", settings.kind(), name);

            let connect = async {
                match settings {
                    ConnectionSettings::Database(s) => {
                        db::create_connection(s).await.map(Backend::Database)
                    }
                    ConnectionSettings::Cache(s) => {
                        cache::create_connection(s).await.map(Backend::Cache)
                    }
                }
            };

            let backend = with_timeout(
                settings.kind(),
                name,
                settings.connect_timeout(),
                connect,
            )
            .await?;

            Ok(ConnectionHandle::new(name.clone(), backend))
        }
    }
}

/// Bound a connection attempt by `limit`.
async fn with_timeout<T, F>(
    kind: BackendKind,
    name: &ConnectionName,
    limit: Duration,
    attempt: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ConnectionError::Connect {
            kind,
            name: name.clone(),
            message: format!("{:#}", e),
        }),
        Err(_) => Err(ConnectionError::TimedOut {
            kind,
            name: name.clone(),
            after: limit,
        }),
    }
}
