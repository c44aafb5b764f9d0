//! Credential validation.
//!
//! The authenticator treats validation as an opaque collaborator behind
//! [`TokenValidator`]; [`JwtValidator`] is the HS256 implementation used by
//! the service.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Deserializer, Serialize};

/// Default clock skew tolerance, in seconds.
pub const DEFAULT_LEEWAY_SECONDS: u64 = 60;

/// Decoded claims of a validated credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier (`jti`)
    #[serde(rename = "jti", default)]
    pub subject_id: String,
    /// Audience entries (`aud`), a single string or an array
    #[serde(rename = "aud", default, deserialize_with = "one_or_many")]
    pub audience: Vec<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Reasons a credential failed validation.
///
/// These never leave the crate; the authenticator collapses all of them
/// into a single not-authenticated outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token could not be parsed
    Malformed(String),
    /// Token is past its expiration
    Expired,
    /// Signature did not verify
    BadSignature,
    /// Issuer did not match
    WrongIssuer,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Self::Expired => write!(f, "Token has expired"),
            Self::BadSignature => write!(f, "Token signature is invalid"),
            Self::WrongIssuer => write!(f, "Token issuer is not accepted"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Parses and validates a raw credential into [`Claims`].
///
/// Implementations are shared by every in-flight call and must be safe to
/// invoke concurrently.
pub trait TokenValidator: Send + Sync {
    fn parse_token(&self, token: &str) -> Result<Claims, TokenError>;
}

/// HS256 JWT validator with a shared secret.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Create a validator for tokens signed with `secret`.
    pub fn hs256(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = DEFAULT_LEEWAY_SECONDS;
        // Audience membership is checked by the authenticator itself.
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Only accept tokens from `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Override the clock skew tolerance.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }
}

impl TokenValidator for JwtValidator {
    fn parse_token(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}
