// Core modules
pub mod auth;
pub mod middleware;
pub mod resources;
pub mod api;

// Backends and configuration
mod cache;
mod config;
pub mod db;
mod types;

// Re-export key types and functions
pub use auth::{
    AuthConfig, AuthError, AuthenticationStage, Identity, RequestContext, RouteSelector,
    TokenAuthenticator,
};
pub use cache::CacheSettings;
pub use config::{DEFAULT_CONNECTION_NAME, DataConfig, StoreConfig};
pub use db::{DatabaseSettings, Db};
pub use middleware::{Chain, Handler, Middleware, Next};
pub use resources::{BackendConnector, BackendKind, ConnectionFactory, ResourceRegistry};
pub use types::{ConnectionName, Operation, SubjectId};

use anyhow::Result;
use std::sync::Arc;

/// Bootstrap the registry and the authentication stage for serving.
///
/// Backend failures only shrink the registry; a missing JWT secret is an
/// error.
pub async fn build_state(auth: &AuthConfig, data: &DataConfig) -> Result<api::AppState> {
    let stage = AuthenticationStage::from_config(auth)?;
    let registry = ResourceRegistry::initialize(data, &BackendConnector).await;

    Ok(api::AppState {
        auth: Arc::new(stage),
        registry,
    })
}
