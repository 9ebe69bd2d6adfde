//! Project creation-metadata cache.
//!
//! Creation metadata (issue types, field ids, schemas and allowed values) is
//! fetched once per project and reused for field resolution. Keys are
//! project keys compared case-insensitively. Entries live until explicitly
//! invalidated.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, trace};

/// Process-scoped cache of creation metadata, keyed by project.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    entries: Arc<RwLock<HashMap<String, Arc<Value>>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(project: &str) -> String {
        project.trim().to_ascii_uppercase()
    }

    /// Get the cached metadata for `project`, if present.
    pub fn get(&self, project: &str) -> Option<Arc<Value>> {
        let entries = self.entries.read().ok()?;
        entries.get(&Self::normalize(project)).cloned()
    }

    /// Store `value` unless an entry already exists; returns the entry that
    /// ends up in the cache.
    pub fn insert_if_absent(&self, project: &str, value: Value) -> Arc<Value> {
        let key = Self::normalize(project);
        match self.entries.write() {
            Ok(mut entries) => entries.entry(key).or_insert_with(|| Arc::new(value)).clone(),
            Err(_) => Arc::new(value),
        }
    }

    /// Get the metadata for `project`, fetching it on first access.
    ///
    /// Concurrent first accesses may each fetch; the first value inserted wins
    /// and is returned to every caller.
    pub async fn get_or_fetch<F, Fut, E>(&self, project: &str, fetch: F) -> Result<Arc<Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(hit) = self.get(project) {
            trace!(project, "Metadata cache hit");
            return Ok(hit);
        }

        debug!(project, "Fetching creation metadata");
        let value = fetch().await?;
        Ok(self.insert_if_absent(project, value))
    }

    pub fn invalidate(&self, project: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&Self::normalize(project));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_keys_are_case_insensitive() {
        let cache = MetadataCache::new();
        cache.insert_if_absent("demo", json!({"projects": []}));
        assert!(cache.get("DEMO").is_some());
        assert!(cache.get(" Demo ").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = MetadataCache::new();
        cache.insert_if_absent("DEMO", json!({"v": 1}));
        let kept = cache.insert_if_absent("DEMO", json!({"v": 2}));
        assert_eq!(kept["v"], 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_fetches_once() {
        let cache = MetadataCache::new();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("DEMO", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(json!({"projects": [{"key": "DEMO"}]}))
                })
                .await
                .unwrap();
            assert_eq!(value["projects"][0]["key"], "DEMO");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetch_error_is_not_cached() {
        let cache = MetadataCache::new();
        let result = tokio_test::block_on(
            cache.get_or_fetch("DEMO", || async { Err::<Value, _>("boom") }),
        );
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = MetadataCache::new();
        cache.insert_if_absent("DEMO", json!({}));
        cache.insert_if_absent("OPS", json!({}));

        cache.invalidate("demo");
        assert!(cache.get("DEMO").is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
