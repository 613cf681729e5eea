//! Cache registry - central management for named caches.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::{CacheConfig, TypedCache};

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache '{name}' already exists as {existing}, requested {requested}")]
    TypeMismatch {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },
}

/// Central registry for managing multiple typed caches.
///
/// Components ask for a cache by name; asking twice with the same key and
/// value types returns the same underlying cache.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

/// Internal cache entry storing type-erased cache.
struct CacheEntry {
    cache: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl CacheEntry {
    fn downcast<K, V>(&self, name: &str) -> Result<TypedCache<K, V>, CacheError>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mismatch = || CacheError::TypeMismatch {
            name: name.to_string(),
            existing: self.type_name,
            requested: std::any::type_name::<TypedCache<K, V>>(),
        };

        if self.type_id != TypeId::of::<TypedCache<K, V>>() {
            return Err(mismatch());
        }

        self.cache
            .downcast_ref::<TypedCache<K, V>>()
            .cloned()
            .ok_or_else(mismatch)
    }
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an existing cache or create a new one if it doesn't exist.
    pub fn get_or_create<K, V>(
        &self,
        name: &str,
        config: CacheConfig,
    ) -> Result<TypedCache<K, V>, CacheError>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(name) {
            return existing.downcast(name);
        }

        debug!("Creating cache: {}", name);
        let cache = TypedCache::new(name, config);

        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Box::new(cache.clone()),
                type_id: TypeId::of::<TypedCache<K, V>>(),
                type_name: std::any::type_name::<TypedCache<K, V>>(),
            },
        );

        Ok(cache)
    }

    /// Names of all registered caches.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("cache_names", &self.cache_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_shared_cache() {
        let registry = CacheRegistry::new();

        let first: TypedCache<String, ()> = registry
            .get_or_create("visited_entries", CacheConfig::visited_entries())
            .unwrap();
        first.insert("https://www.fortiguard.com/encyclopedia/ips/1".to_string(), ());

        let second: TypedCache<String, ()> = registry
            .get_or_create("visited_entries", CacheConfig::visited_entries())
            .unwrap();
        assert!(second.contains(&"https://www.fortiguard.com/encyclopedia/ips/1".to_string()));
        assert_eq!(registry.cache_names(), vec!["visited_entries".to_string()]);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let registry = CacheRegistry::new();
        let _: TypedCache<String, ()> = registry
            .get_or_create("visited_entries", CacheConfig::default())
            .unwrap();

        let err = registry
            .get_or_create::<String, u64>("visited_entries", CacheConfig::default())
            .unwrap_err();
        assert!(matches!(err, CacheError::TypeMismatch { .. }));
    }
}
