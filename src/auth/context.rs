//! Request-scoped context passed down the handler chain.

use std::collections::{BTreeMap, HashMap};

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::types::{Operation, SubjectId};

/// Context key under which the authenticated subject identifier is stored.
pub const ACCESS_TOKEN_ID: &str = "Access-Token-ID";

/// Authenticated identity attached to a call once its credential passed.
///
/// Lives only as long as the call; it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    subject_id: SubjectId,
}

impl Identity {
    pub fn new(subject_id: impl Into<SubjectId>) -> Self {
        Self {
            subject_id: subject_id.into(),
        }
    }

    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }
}

/// Side-channel metadata propagated between services.
///
/// Keys are case-insensitive (stored lowercase) and may carry several values,
/// the same shape as RPC metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Builder-style variant of [`Metadata::insert`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Explicit value bag for one inbound call.
///
/// Carries the operation identifier, the two credential carriers (service
/// metadata and transport headers), and string values added by stages as the
/// call moves down the chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    operation: Operation,
    metadata: Option<Metadata>,
    headers: Option<HeaderMap>,
    values: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(operation: impl Into<Operation>) -> Self {
        Self {
            operation: operation.into(),
            metadata: None,
            headers: None,
            values: HashMap::new(),
        }
    }

    /// Attach side-channel metadata (service-to-service calls).
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach transport request headers (externally originated calls).
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    /// Store a value for downstream stages.
    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Record the authenticated identity under [`ACCESS_TOKEN_ID`].
    pub fn set_identity(&mut self, identity: &Identity) {
        self.insert_value(ACCESS_TOKEN_ID, identity.subject_id().as_str());
    }

    /// Identity recorded by the authentication stage, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.value(ACCESS_TOKEN_ID).map(Identity::new)
    }
}
