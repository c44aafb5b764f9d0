//! Route selection: which operations bypass authentication.

use std::collections::HashSet;

/// Allow-list of operations exempt from authentication.
///
/// Entries are exact operation identifiers, or prefixes when they end in `*`
/// (e.g. `/api.v1.Heartbeat/*`). An empty selector exempts nothing.
#[derive(Debug, Clone, Default)]
pub struct RouteSelector {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl RouteSelector {
    /// Selector that requires authentication for every operation.
    pub fn require_all() -> Self {
        Self::default()
    }

    /// Build a selector from allow-list entries.
    pub fn exempt<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selector = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.strip_suffix('*') {
                Some(prefix) => selector.prefixes.push(prefix.to_string()),
                None => {
                    selector.exact.insert(entry.to_string());
                }
            }
        }
        selector
    }

    /// Returns `true` when `operation` must be authenticated.
    pub fn requires_auth(&self, operation: &str) -> bool {
        if self.exact.contains(operation) {
            return false;
        }
        !self
            .prefixes
            .iter()
            .any(|prefix| operation.starts_with(prefix.as_str()))
    }

    /// Number of allow-list entries.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_all_exempts_nothing() {
        let selector = RouteSelector::require_all();
        assert!(selector.is_empty());
        assert!(selector.requires_auth("/health"));
        assert!(selector.requires_auth(""));
        assert!(selector.requires_auth("/api.v1.Heartbeat/PingPong"));
    }

    #[test]
    fn test_exact_entries() {
        let selector = RouteSelector::exempt(["/health", "/api.v1.Heartbeat/PingPong"]);
        assert_eq!(selector.len(), 2);
        assert!(!selector.requires_auth("/health"));
        assert!(!selector.requires_auth("/api.v1.Heartbeat/PingPong"));
        assert!(selector.requires_auth("/health/deep"));
        assert!(selector.requires_auth("/whoami"));
    }

    #[test]
    fn test_prefix_entries() {
        let selector = RouteSelector::exempt(["/api.v1.Heartbeat/*"]);
        assert!(!selector.requires_auth("/api.v1.Heartbeat/PingPong"));
        assert!(!selector.requires_auth("/api.v1.Heartbeat/"));
        assert!(selector.requires_auth("/api.v1.Account/Login"));
    }

    #[test]
    fn test_blank_entries_are_ignored() {
        let selector = RouteSelector::exempt(["", "  "]);
        assert!(selector.is_empty());
        assert!(selector.requires_auth(""));
    }
}
