//! Named backend connections.
//!
//! The [`ResourceRegistry`] is built once at startup from a [`DataConfig`]:
//! every configured name of every backend kind is handed to a
//! [`ConnectionFactory`], all attempts running concurrently. A name whose
//! connection fails is logged and left out; the rest of the registry is
//! unaffected. After initialization the snapshot is immutable and shared
//! behind an `Arc`, so lookups never lock.
//!
//! ```ignore
//! let registry = ResourceRegistry::initialize(&DataConfig::from_env(), &BackendConnector).await;
//! let db = registry.database("default").ok_or(...)?;
//! ```

mod factory;

pub use factory::{
    Backend, BackendConnector, BackendKind, ConnectionError, ConnectionFactory, ConnectionHandle,
    ConnectionSettings,
};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{join, join_all};
use redis::aio::ConnectionManager;
use tracing::{error, info, warn};

use crate::config::DataConfig;
use crate::db::Db;
use crate::types::ConnectionName;

/// Errors returned by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No connection is registered under this kind and name.
    NotFound {
        kind: BackendKind,
        name: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, name } => {
                write!(f, "No {} connection named `{}`", kind, name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

struct Snapshot<H> {
    databases: HashMap<ConnectionName, H>,
    caches: HashMap<ConnectionName, H>,
}

/// Immutable snapshot of named backend connections.
pub struct ResourceRegistry<H = ConnectionHandle> {
    inner: Arc<Snapshot<H>>,
}

impl<H> Clone for ResourceRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Send + Sync> ResourceRegistry<H> {
    /// Registry with no connections.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Snapshot {
                databases: HashMap::new(),
                caches: HashMap::new(),
            }),
        }
    }

    /// Connect every configured backend and snapshot the ones that succeed.
    pub async fn initialize<F>(config: &DataConfig, factory: &F) -> Self
    where
        F: ConnectionFactory<Handle = H>,
    {
        let databases: Vec<_> = config
            .database
            .entries()
            .into_iter()
            .map(|(name, settings)| (name, ConnectionSettings::Database(settings)))
            .collect();
        let caches: Vec<_> = config
            .redis
            .entries()
            .into_iter()
            .map(|(name, settings)| (name, ConnectionSettings::Cache(settings)))
            .collect();

        let (databases, caches) = join(
            bootstrap(BackendKind::Database, databases, factory),
            bootstrap(BackendKind::Cache, caches, factory),
        )
        .await;

        Self {
            inner: Arc::new(Snapshot { databases, caches }),
        }
    }

    fn slots(&self, kind: BackendKind) -> &HashMap<ConnectionName, H> {
        match kind {
            BackendKind::Database => &self.inner.databases,
            BackendKind::Cache => &self.inner.caches,
        }
    }

    /// Look up a connection; `None` if the name was never registered.
    pub fn lookup(&self, kind: BackendKind, name: &str) -> Option<&H> {
        self.slots(kind).get(name)
    }

    /// Like [`lookup`](Self::lookup), but a miss is an error.
    pub fn require(&self, kind: BackendKind, name: &str) -> Result<&H, RegistryError> {
        self.lookup(kind, name).ok_or_else(|| RegistryError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    pub fn contains(&self, kind: BackendKind, name: &str) -> bool {
        self.slots(kind).contains_key(name)
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: BackendKind) -> Vec<&ConnectionName> {
        let mut names: Vec<_> = self.slots(kind).keys().collect();
        names.sort();
        names
    }

    /// Total number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.databases.len() + self.inner.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceRegistry<ConnectionHandle> {
    /// Persistent-store client registered under `name`.
    pub fn database(&self, name: &str) -> Option<&Db> {
        self.lookup(BackendKind::Database, name)
            .and_then(ConnectionHandle::as_database)
    }

    /// Cache-store connection registered under `name`.
    pub fn cache(&self, name: &str) -> Option<&ConnectionManager> {
        self.lookup(BackendKind::Cache, name)
            .and_then(ConnectionHandle::as_cache)
    }
}

/// Create every connection of one kind concurrently.
///
/// Each name fills its own slot, so completion order does not matter.
async fn bootstrap<F>(
    kind: BackendKind,
    entries: Vec<(ConnectionName, ConnectionSettings)>,
    factory: &F,
) -> HashMap<ConnectionName, F::Handle>
where
    F: ConnectionFactory,
{
    if entries.is_empty() {
        warn!("Currently no {} connections configured", kind);
        return HashMap::new();
    }

    let attempts = entries.iter().map(|(name, settings)| async move {
        (name, factory.create(name, settings).await)
    });

    let mut slots = HashMap::with_capacity(entries.len());
    for (name, result) in join_all(attempts).await {
        match result {
            Ok(handle) => {
                info!("Initialized {} connection `{}`", kind, name);
                slots.insert(name.clone(), handle);
            }
            Err(e) => {
                error!(kind = %kind, name = %name, "Failed to initialize connection: {}", e);
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use crate::config::StoreConfig;
    use crate::db::DatabaseSettings;
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Factory that fails for names starting with "broken" and records the
    /// order in which attempts complete.
    #[derive(Default)]
    struct FakeFactory {
        delays: HashMap<String, u64>,
        completed: Mutex<Vec<String>>,
    }

    impl FakeFactory {
        fn with_delays(delays: &[(&str, u64)]) -> Self {
            Self {
                delays: delays
                    .iter()
                    .map(|(n, d)| (n.to_string(), *d))
                    .collect(),
                completed: Mutex::new(Vec::new()),
            }
        }
    }

    impl ConnectionFactory for FakeFactory {
        type Handle = (BackendKind, String);

        fn create(
            &self,
            name: &ConnectionName,
            settings: &ConnectionSettings,
        ) -> impl Future<Output = Result<Self::Handle, ConnectionError>> + Send {
            async move {
                if let Some(ms) = self.delays.get(name.as_str()) {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                }
                self.completed.lock().unwrap().push(name.to_string());

                if name.as_str().starts_with("broken") {
                    return Err(ConnectionError::Connect {
                        kind: settings.kind(),
                        name: name.clone(),
                        message: "refused".to_string(),
                    });
                }
                Ok((settings.kind(), name.to_string()))
            }
        }
    }

    fn db() -> DatabaseSettings {
        DatabaseSettings {
            url: "memory".to_string(),
            username: None,
            password: None,
            ..Default::default()
        }
    }

    fn cache() -> CacheSettings {
        CacheSettings {
            url: "redis://127.0.0.1:6379".to_string(),
            db: None,
            connect_timeout_secs: 1,
        }
    }

    fn config(db_names: &[&str], cache_names: &[&str]) -> DataConfig {
        let mut database = StoreConfig::default();
        for name in db_names {
            database = database.with_named(*name, db());
        }
        let mut redis = StoreConfig::default();
        for name in cache_names {
            redis = redis.with_named(*name, cache());
        }
        DataConfig { database, redis }
    }

    #[tokio::test]
    async fn test_failures_are_excluded() {
        let config = config(
            &["default", "broken-replica", "reporting"],
            &["default", "broken-sessions"],
        );
        let registry = ResourceRegistry::initialize(&config, &FakeFactory::default()).await;

        // N = 5 configured, K = 2 failed.
        assert_eq!(registry.len(), 3);
        assert!(registry.lookup(BackendKind::Database, "broken-replica").is_none());
        assert!(registry.lookup(BackendKind::Cache, "broken-sessions").is_none());

        let handle = registry.lookup(BackendKind::Database, "reporting").unwrap();
        assert_eq!(handle, &(BackendKind::Database, "reporting".to_string()));
        let handle = registry.lookup(BackendKind::Cache, "default").unwrap();
        assert_eq!(handle, &(BackendKind::Cache, "default".to_string()));
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        let registry =
            ResourceRegistry::initialize(&config(&["orders"], &["sessions"]), &FakeFactory::default())
                .await;

        assert!(registry.contains(BackendKind::Database, "orders"));
        assert!(!registry.contains(BackendKind::Cache, "orders"));
        assert!(registry.contains(BackendKind::Cache, "sessions"));
        assert!(!registry.contains(BackendKind::Database, "sessions"));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let registry =
            ResourceRegistry::initialize(&config(&["default"], &[]), &FakeFactory::default()).await;

        assert!(registry.lookup(BackendKind::Database, "never-configured").is_none());
        assert_eq!(
            registry.require(BackendKind::Cache, "default").unwrap_err(),
            RegistryError::NotFound {
                kind: BackendKind::Cache,
                name: "default".to_string(),
            }
        );
        assert!(registry.require(BackendKind::Database, "default").is_ok());
    }

    #[tokio::test]
    async fn test_empty_config_yields_empty_registry() {
        let registry =
            ResourceRegistry::initialize(&DataConfig::default(), &FakeFactory::default()).await;
        assert!(registry.is_empty());
        assert!(registry.names(BackendKind::Database).is_empty());
        assert!(registry.lookup(BackendKind::Cache, "default").is_none());
    }

    #[tokio::test]
    async fn test_contents_independent_of_completion_order() {
        let names = ["a", "b", "broken-c", "d"];

        // Forward: "a" finishes last. Reverse: "d" finishes last.
        let forward = FakeFactory::with_delays(&[("a", 40), ("b", 30), ("broken-c", 20), ("d", 10)]);
        let reverse = FakeFactory::with_delays(&[("a", 10), ("b", 20), ("broken-c", 30), ("d", 40)]);

        let first = ResourceRegistry::initialize(&config(&names, &[]), &forward).await;
        let second = ResourceRegistry::initialize(&config(&names, &[]), &reverse).await;

        let forward_order = forward.completed.lock().unwrap().clone();
        let reverse_order = reverse.completed.lock().unwrap().clone();
        assert_ne!(forward_order, reverse_order);

        assert_eq!(
            first.names(BackendKind::Database),
            second.names(BackendKind::Database)
        );
        for name in ["a", "b", "d"] {
            assert_eq!(
                first.lookup(BackendKind::Database, name),
                second.lookup(BackendKind::Database, name)
            );
        }
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn test_default_entry_registered_under_reserved_name() {
        let config = DataConfig {
            database: StoreConfig::with_default(db()),
            redis: StoreConfig::default(),
        };
        let registry = ResourceRegistry::initialize(&config, &FakeFactory::default()).await;

        let names: Vec<&str> = registry
            .names(BackendKind::Database)
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["default"]);
    }

    #[tokio::test]
    async fn test_backend_connector_degrades_on_failure() {
        let config = DataConfig {
            database: StoreConfig::with_default(db()),
            redis: StoreConfig::with_default(CacheSettings {
                url: "not a redis url".to_string(),
                db: None,
                connect_timeout_secs: 1,
            }),
        };

        let registry = ResourceRegistry::initialize(&config, &BackendConnector).await;

        assert_eq!(registry.len(), 1);
        assert!(registry.database("default").is_some());
        assert!(registry.cache("default").is_none());
        assert!(registry.database("replica").is_none());
    }

    #[tokio::test]
    async fn test_lookups_from_many_tasks() {
        let registry =
            ResourceRegistry::initialize(&config(&["default"], &["default"]), &FakeFactory::default())
                .await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.contains(BackendKind::Database, "default")
                    && registry.contains(BackendKind::Cache, "default")
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::NotFound {
            kind: BackendKind::Database,
            name: "replica".to_string(),
        };
        assert_eq!(err.to_string(), "No db connection named `replica`");
    }
}
