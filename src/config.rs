use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, env};

use crate::cache::CacheSettings;
use crate::db::DatabaseSettings;
use crate::types::ConnectionName;

/// Reserved name of the primary connection of each backend kind.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

/// Connection settings for one backend kind.
///
/// `default` is registered under [`DEFAULT_CONNECTION_NAME`]; `named` holds
/// any additional connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig<S> {
    #[serde(default)]
    pub default: Option<S>,
    #[serde(default)]
    pub named: BTreeMap<String, S>,
}

impl<S> Default for StoreConfig<S> {
    fn default() -> Self {
        Self {
            default: None,
            named: BTreeMap::new(),
        }
    }
}

impl<S: Clone> StoreConfig<S> {
    pub fn with_default(settings: S) -> Self {
        Self {
            default: Some(settings),
            named: BTreeMap::new(),
        }
    }

    /// Add a named connection.
    pub fn with_named(mut self, name: impl Into<String>, settings: S) -> Self {
        self.named.insert(name.into(), settings);
        self
    }

    /// All configured connections keyed by name.
    ///
    /// An explicit `default` entry wins over a `named` entry called "default".
    pub fn entries(&self) -> BTreeMap<ConnectionName, S> {
        let mut entries: BTreeMap<ConnectionName, S> = self
            .named
            .iter()
            .map(|(name, settings)| (ConnectionName::new(name.as_str()), settings.clone()))
            .collect();

        if let Some(settings) = &self.default {
            entries.insert(ConnectionName::new(DEFAULT_CONNECTION_NAME), settings.clone());
        }

        entries
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.named.is_empty()
    }
}

/// Backend connections consumed by the resource registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub database: StoreConfig<DatabaseSettings>,
    #[serde(default)]
    pub redis: StoreConfig<CacheSettings>,
}

impl DataConfig {
    /// Default connections from the environment.
    ///
    /// A kind gets a `default` entry only when its URL variable is set
    /// (`SURREALDB_URL`, `REDIS_URL`).
    pub fn from_env() -> Self {
        let database = match env::var("SURREALDB_URL") {
            Ok(_) => StoreConfig::with_default(DatabaseSettings::default()),
            Err(_) => StoreConfig::default(),
        };
        let redis = match env::var("REDIS_URL") {
            Ok(_) => StoreConfig::with_default(CacheSettings::default()),
            Err(_) => StoreConfig::default(),
        };

        Self { database, redis }
    }

    /// Expand `${VAR}` references in every connection setting.
    pub fn expanded(self) -> Self {
        Self {
            database: expand_store(self.database, DatabaseSettings::expanded),
            redis: expand_store(self.redis, CacheSettings::expanded),
        }
    }
}

fn expand_store<S>(store: StoreConfig<S>, expand: fn(S) -> S) -> StoreConfig<S> {
    StoreConfig {
        default: store.default.map(expand),
        named: store
            .named
            .into_iter()
            .map(|(name, settings)| (name, expand(settings)))
            .collect(),
    }
}

/// Replace `${NAME}` with the value of environment variable `NAME`.
///
/// Unknown variables are left as written.
pub(crate) fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            match env::var(&name) {
                Ok(val) if closed => out.push_str(&val),
                _ => {
                    out.push_str("${");
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}
