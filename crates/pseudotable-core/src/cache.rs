//! In-process mapping cache.
//!
//! A possibly stale, possibly partial copy of one table, used only to
//! short-circuit answers that were already resolved. It is never consulted
//! to decide that a datum is unmapped.

use hashbrown::HashMap;
use tracing::warn;

/// Forward map plus an explicit reverse index keyed by identifier.
#[derive(Debug, Default, Clone)]
pub struct MappingCache {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a full-table scan.
    pub fn from_snapshot(snapshot: HashMap<String, String>) -> Self {
        let mut cache = Self::new();
        cache.extend(snapshot);
        cache
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Identifier of `datum`, if known.
    pub fn identifier(&self, datum: &str) -> Option<&str> {
        self.forward.get(datum).map(String::as_str)
    }

    /// Datum carrying `identifier`, if known.
    pub fn datum(&self, identifier: &str) -> Option<&str> {
        self.reverse.get(identifier).map(String::as_str)
    }

    pub fn contains_datum(&self, datum: &str) -> bool {
        self.forward.contains_key(datum)
    }

    /// True when every datum in `data` is cached.
    pub fn covers_data<'a, I: IntoIterator<Item = &'a String>>(&self, data: I) -> bool {
        data.into_iter().all(|d| self.forward.contains_key(d.as_str()))
    }

    /// True when every identifier in `identifiers` is cached.
    pub fn covers_identifiers<'a, I>(&self, identifiers: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        identifiers.into_iter().all(|id| self.reverse.contains_key(id.as_str()))
    }

    /// Record one mapping in both directions.
    pub fn insert(&mut self, datum: String, identifier: String) {
        if let Some(other) = self.reverse.get(&identifier) {
            if *other != datum {
                warn!(
                    identifier = %identifier,
                    first = %other,
                    second = %datum,
                    "identifier mapped to two data"
                );
                return;
            }
        }
        if let Some(previous) = self.forward.insert(datum.clone(), identifier.clone()) {
            if previous != identifier {
                self.reverse.remove(&previous);
            }
        }
        self.reverse.insert(identifier, datum);
    }

    pub fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, mappings: I) {
        for (datum, identifier) in mappings {
            self.insert(datum, identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_reverse() {
        let mut cache = MappingCache::new();
        assert!(cache.is_empty());
        cache.insert("alice".into(), "p-1".into());
        assert_eq!(cache.identifier("alice"), Some("p-1"));
        assert_eq!(cache.datum("p-1"), Some("alice"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_coverage() {
        let cache = MappingCache::from_snapshot(HashMap::from([
            ("a".to_string(), "p-a".to_string()),
            ("b".to_string(), "p-b".to_string()),
        ]));
        let data = ["a".to_string(), "b".to_string()];
        let more = ["a".to_string(), "c".to_string()];
        assert!(cache.covers_data(&data));
        assert!(!cache.covers_data(&more));
        assert!(cache.covers_identifiers(&["p-b".to_string()]));
        assert!(!cache.covers_identifiers(&["p-c".to_string()]));
    }

    #[test]
    fn test_duplicate_identifier_keeps_first_owner() {
        let mut cache = MappingCache::new();
        cache.insert("a".into(), "p-1".into());
        cache.insert("b".into(), "p-1".into());
        assert_eq!(cache.datum("p-1"), Some("a"));
        assert!(!cache.contains_datum("b"));
    }
}
