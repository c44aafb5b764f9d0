// HTTP surface: authentication layer plus a few service endpoints

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthError, AuthenticationStage, Identity, Metadata, RequestContext};
use crate::resources::{BackendKind, ResourceRegistry};

/// Header prefix of side-channel metadata propagated between services.
pub const METADATA_HEADER_PREFIX: &str = "x-md-";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthenticationStage>,
    pub registry: ResourceRegistry,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/whoami", get(whoami))
        .route("/backends", get(list_backends))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(
                    state.auth.clone(),
                    authenticate_request,
                )),
        )
        .with_state(state)
}

/// Axum middleware running the authentication stage.
///
/// The operation identifier is the request path. On success the caller's
/// [`Identity`] is stored in the request extensions.
pub async fn authenticate_request(
    State(stage): State<Arc<AuthenticationStage>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ctx = request_context(request.uri().path(), request.headers());

    match stage.authorize(&mut ctx) {
        Ok(()) => {
            if let Some(identity) = ctx.identity() {
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
        Err(err) => reject(err),
    }
}

/// Map an HTTP request onto the transport-neutral call context.
///
/// Metadata values that are not valid UTF-8 are kept (lossily decoded) so a
/// garbled credential still fails validation instead of vanishing.
fn request_context(path: &str, headers: &HeaderMap) -> RequestContext {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        if name.as_str().starts_with(METADATA_HEADER_PREFIX) {
            metadata.insert(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
    }

    let ctx = RequestContext::new(path).with_headers(headers.clone());
    if metadata.is_empty() {
        ctx
    } else {
        ctx.with_metadata(metadata)
    }
}

fn reject(err: AuthError) -> Response {
    let status = match err {
        AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        AuthError::NotAuthorized => StatusCode::FORBIDDEN,
    };

    (
        status,
        Json(serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Identity the authentication layer attached to this call.
async fn whoami(request: Request) -> Json<Value> {
    let identity = request.extensions().get::<Identity>().cloned();

    Json(serde_json::json!({
        "authenticated": identity.is_some(),
        "subject_id": identity.map(|i| i.subject_id().to_string()),
    }))
}

/// Registered backend connections by kind.
async fn list_backends(State(state): State<AppState>) -> Json<Value> {
    let names = |kind: BackendKind| -> Vec<String> {
        state
            .registry
            .names(kind)
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    };

    Json(serde_json::json!({
        "db": names(BackendKind::Database),
        "redis": names(BackendKind::Cache),
        "count": state.registry.len(),
    }))
}
