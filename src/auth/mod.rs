//! Request authentication.
//!
//! Every inbound call passes through an [`AuthenticationStage`]:
//!
//! - **Route selection**: operations on the configured allow-list skip
//!   authentication entirely
//! - **Credential extraction**: service metadata (`x-md-global-jwt`) first,
//!   then the `Access-Token` transport header
//! - **Validation**: the credential is handed to a [`TokenValidator`]; any
//!   failure is reported as [`AuthError::NotAuthenticated`]
//! - **Audience**: the token's subject must appear in its own audience list,
//!   otherwise [`AuthError::NotAuthorized`]
//!
//! On success the subject is stored in the [`RequestContext`] under
//! [`ACCESS_TOKEN_ID`] for the rest of the call.
//!
//! ## Usage
//!
//! ```ignore
//! let stage = AuthenticationStage::from_config(&AuthConfig::with_secret(secret))?;
//! let chain = Chain::new(handler).with(stage);
//! let reply = chain.call(ctx, request).await?;
//! ```

mod authenticator;
mod context;
mod selector;
mod stage;
pub mod token;

pub use authenticator::{ACCESS_TOKEN, AuthConfig, AuthError, METADATA_TOKEN_KEY, TokenAuthenticator};
pub use context::{ACCESS_TOKEN_ID, Identity, Metadata, RequestContext};
pub use selector::RouteSelector;
pub use stage::AuthenticationStage;
pub use token::{Claims, JwtValidator, TokenError, TokenValidator};
