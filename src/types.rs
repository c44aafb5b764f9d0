//! NewType wrappers for strong typing across the gatekeeper.
//!
//! These keep semantically different strings apart (e.g., passing an
//! operation identifier where a connection name is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Subject identifier carried in a validated credential (the JWT `jti`).
    ///
    /// Once authentication succeeds this is the identity attached to the
    /// request for the rest of the call.
    SubjectId
);

newtype_string!(
    /// Operation identifier of an inbound call.
    ///
    /// For HTTP this is the request path, for RPC-style transports the
    /// fully-qualified method name (e.g., "/api.v1.Heartbeat/PingPong").
    Operation
);

newtype_string!(
    /// Logical name of a configured backend connection (e.g., "default").
    ConnectionName
);
