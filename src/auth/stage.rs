//! Authentication stage for the handler chain.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::auth::authenticator::{AuthConfig, AuthError, TokenAuthenticator};
use crate::auth::context::RequestContext;
use crate::auth::selector::RouteSelector;
use crate::middleware::{BoxFuture, Middleware, Next};

/// Route selection plus token authentication, as one chain stage.
#[derive(Clone)]
pub struct AuthenticationStage {
    selector: RouteSelector,
    authenticator: TokenAuthenticator,
}

impl AuthenticationStage {
    pub fn new(selector: RouteSelector, authenticator: TokenAuthenticator) -> Self {
        Self {
            selector,
            authenticator,
        }
    }

    /// Build the stage from configuration, with the JWT validator.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let validator = config.validator()?;
        Ok(Self::new(
            RouteSelector::exempt(&config.exempt_operations),
            TokenAuthenticator::new(Arc::new(validator)),
        ))
    }

    pub fn selector(&self) -> &RouteSelector {
        &self.selector
    }

    /// Decide whether the call may proceed.
    ///
    /// Exempt operations pass untouched. Otherwise the call is authenticated
    /// and, on success, its identity is recorded in `ctx`.
    pub fn authorize(&self, ctx: &mut RequestContext) -> Result<(), AuthError> {
        if !self.selector.requires_auth(ctx.operation().as_str()) {
            debug!(operation = %ctx.operation(), "Operation exempt from authentication");
            return Ok(());
        }

        let identity = self.authenticator.authenticate(ctx)?;
        ctx.set_identity(&identity);
        Ok(())
    }
}

impl Middleware for AuthenticationStage {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        request: Value,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            self.authorize(&mut ctx)?;
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authenticator::ACCESS_TOKEN;
    use crate::auth::context::ACCESS_TOKEN_ID;
    use crate::auth::token::tests::{SECRET, claims, mint};
    use crate::auth::token::JwtValidator;
    use crate::middleware::{Chain, handler_fn};
    use http::{HeaderMap, HeaderValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn stage(exempt: &[&str]) -> AuthenticationStage {
        AuthenticationStage::new(
            RouteSelector::exempt(exempt),
            TokenAuthenticator::new(Arc::new(JwtValidator::hs256(SECRET))),
        )
    }

    /// Chain whose handler counts invocations and echoes the identity.
    fn counting_chain(stage: AuthenticationStage) -> (Chain, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = handler_fn(move |ctx: RequestContext, _request: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(json!({ "identity": ctx.value(ACCESS_TOKEN_ID) })) }
        });
        (Chain::new(Arc::new(handler)).with(stage), calls)
    }

    fn with_token(operation: &str, token: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_TOKEN, HeaderValue::from_str(token).unwrap());
        RequestContext::new(operation).with_headers(headers)
    }

    fn auth_error(err: &anyhow::Error) -> Option<AuthError> {
        err.downcast_ref::<AuthError>().copied()
    }

    #[tokio::test]
    async fn test_missing_credential_never_reaches_handler() {
        let (chain, calls) = counting_chain(stage(&[]));

        let err = chain
            .call(RequestContext::new("/api.v1.Heartbeat/PingPong"), Value::Null)
            .await
            .unwrap_err();

        assert_eq!(auth_error(&err), Some(AuthError::NotAuthenticated));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_credential_never_reaches_handler() {
        let (chain, calls) = counting_chain(stage(&[]));

        let err = chain
            .call(with_token("/op", "garbage"), Value::Null)
            .await
            .unwrap_err();

        assert_eq!(auth_error(&err), Some(AuthError::NotAuthenticated));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_audience_mismatch_is_not_authorized() {
        let (chain, calls) = counting_chain(stage(&[]));
        let token = mint(&claims("u1", &["u2", "u3"]), SECRET);

        let err = chain
            .call(with_token("/op", &token), Value::Null)
            .await
            .unwrap_err();

        assert_eq!(auth_error(&err), Some(AuthError::NotAuthorized));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_invokes_handler_once_with_identity() {
        let (chain, calls) = counting_chain(stage(&[]));
        let token = mint(&claims("u1", &["u2", "u1"]), SECRET);

        let reply = chain
            .call(with_token("/op", &token), Value::Null)
            .await
            .unwrap();

        assert_eq!(reply["identity"], "u1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exempt_operation_bypasses_authentication() {
        let (chain, calls) = counting_chain(stage(&["/health"]));

        // No credential at all.
        let reply = chain
            .call(RequestContext::new("/health"), Value::Null)
            .await
            .unwrap();
        assert!(reply["identity"].is_null());

        // Invalid credential is ignored too.
        chain
            .call(with_token("/health", "garbage"), Value::Null)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config() {
        let config = AuthConfig::with_secret("secret").exempting(["/health"]);
        let stage = AuthenticationStage::from_config(&config).unwrap();
        assert!(!stage.selector().requires_auth("/health"));
        assert!(stage.selector().requires_auth("/whoami"));

        let config = AuthConfig {
            jwt_secret: None,
            ..AuthConfig::with_secret("unused")
        };
        assert!(AuthenticationStage::from_config(&config).is_err());
    }
}
