use std::collections::HashMap;

/// Memoized translation from local keys to remote ids.
///
/// Keys are domain local ids and queue-entry ids. A drain only ever adds to
/// the map, so repeated passes converge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdResolver {
    remote_ids: HashMap<String, String>,
}

impl IdResolver {
    /// Seed a resolver from persisted `(local_key, remote_id)` pairs.
    pub fn from_mappings(mappings: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            remote_ids: mappings.into_iter().collect(),
        }
    }

    /// Record a mapping. The first mapping recorded for a key wins.
    pub fn insert(&mut self, local_key: impl Into<String>, remote_id: impl Into<String>) {
        self.remote_ids
            .entry(local_key.into())
            .or_insert_with(|| remote_id.into());
    }

    pub fn resolve(&self, local_key: &str) -> Option<&str> {
        self.remote_ids.get(local_key).map(String::as_str)
    }

    pub fn contains(&self, local_key: &str) -> bool {
        self.remote_ids.contains_key(local_key)
    }

    pub fn len(&self) -> usize {
        self.remote_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remote_ids.is_empty()
    }
}
