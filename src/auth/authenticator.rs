//! Bearer credential authentication.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::auth::context::{Identity, RequestContext};
use crate::auth::token::{Claims, DEFAULT_LEEWAY_SECONDS, JwtValidator, TokenValidator};

/// Transport header carrying the credential of externally originated calls.
pub const ACCESS_TOKEN: &str = "Access-Token";

/// Metadata key carrying the credential of service-to-service calls.
pub const METADATA_TOKEN_KEY: &str = "x-md-global-jwt";

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Operations that bypass authentication (exact, or prefix ending in `*`)
    pub exempt_operations: Vec<String>,
    /// Shared HS256 secret used to verify credentials
    pub jwt_secret: Option<String>,
    /// Expected token issuer
    pub jwt_issuer: Option<String>,
    /// Clock skew tolerance in seconds
    pub leeway_seconds: u64,
}

impl AuthConfig {
    /// Create a config that verifies HS256 tokens signed with `secret`.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            exempt_operations: Vec::new(),
            jwt_secret: Some(secret.into()),
            jwt_issuer: None,
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
        }
    }

    /// Add operations that bypass authentication.
    pub fn exempting<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_operations
            .extend(operations.into_iter().map(Into::into));
        self
    }

    /// Build the JWT validator described by this config.
    pub fn validator(&self) -> anyhow::Result<JwtValidator> {
        let secret = self
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT secret is not configured"))?;

        let mut validator = JwtValidator::hs256(secret.as_bytes()).with_leeway(self.leeway_seconds);
        if let Some(issuer) = &self.jwt_issuer {
            validator = validator.with_issuer(issuer);
        }
        Ok(validator)
    }
}

/// Authentication errors surfaced to callers.
///
/// Neither variant carries diagnostic detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Credential absent, empty, or failed validation
    NotAuthenticated,
    /// Credential valid but the audience check failed
    NotAuthorized,
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::NotAuthorized => "NOT_AUTHORIZED",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "Authentication required"),
            Self::NotAuthorized => write!(f, "Access not permitted"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Validates the credential of a call and produces its [`Identity`].
#[derive(Clone)]
pub struct TokenAuthenticator {
    validator: Arc<dyn TokenValidator>,
}

impl TokenAuthenticator {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    /// Authenticate the call described by `ctx`.
    ///
    /// Checks, in order: credential presence, validation, audience.
    pub fn authenticate(&self, ctx: &RequestContext) -> Result<Identity, AuthError> {
        let token = extract_credential(ctx)?;

        let claims = self.validator.parse_token(token).map_err(|e| {
            debug!(operation = %ctx.operation(), "Credential rejected: {}", e);
            AuthError::NotAuthenticated
        })?;

        check_audience(&claims)
    }
}

/// Pull the raw credential out of the call's carriers.
///
/// Service metadata is consulted first, then the transport header. A carrier
/// holding an empty value fails immediately.
fn extract_credential(ctx: &RequestContext) -> Result<&str, AuthError> {
    if let Some(token) = ctx.metadata().and_then(|md| md.get(METADATA_TOKEN_KEY)) {
        return non_empty(token);
    }

    if let Some(value) = ctx.headers().and_then(|h| h.get(ACCESS_TOKEN)) {
        let token = value.to_str().map_err(|_| AuthError::NotAuthenticated)?;
        return non_empty(token);
    }

    Err(AuthError::NotAuthenticated)
}

fn non_empty(token: &str) -> Result<&str, AuthError> {
    if token.is_empty() {
        Err(AuthError::NotAuthenticated)
    } else {
        Ok(token)
    }
}

/// The subject must appear in its own audience list.
fn check_audience(claims: &Claims) -> Result<Identity, AuthError> {
    if claims.audience.is_empty() {
        return Err(AuthError::NotAuthorized);
    }

    claims
        .audience
        .iter()
        .find(|aud| **aud == claims.subject_id)
        .map(|_| Identity::new(claims.subject_id.as_str()))
        .ok_or(AuthError::NotAuthorized)
}
