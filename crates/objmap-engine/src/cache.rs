//! Accessor cache
//!
//! Memoizes the thunks built by [`invoker`](crate::invoker), keyed by a
//! signature string per member. Entries are only ever replaced by an
//! equivalent thunk: two threads missing on the same key both build and the
//! last insert wins.

use crate::Result;
use crate::invoker::{self, Constructor, Getter, MapEntryPoint, Setter};
use dashmap::DashMap;
use objmap_reflect::{PropertyInfo, TypeInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Signature of a property getter
pub fn getter_signature(owner: &TypeInfo, property: &str) -> String {
    format!("{}::{}#get", owner.name(), property)
}

/// Signature of a property setter
pub fn setter_signature(owner: &TypeInfo, property: &str) -> String {
    format!("{}::{}#set", owner.name(), property)
}

/// Signature of a default constructor
pub fn constructor_signature(ty: &TypeInfo) -> String {
    format!("{}#ctor", ty.name())
}

/// Signature of a mapping entry point
pub fn entry_point_signature(source: &TypeInfo, target: &TypeInfo) -> String {
    format!("map<{},{}>", source.name(), target.name())
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub getters: usize,
    pub setters: usize,
    pub constructors: usize,
    pub entry_points: usize,
}

impl CacheStats {
    /// Total number of cached thunks
    pub fn entries(&self) -> usize {
        self.getters + self.setters + self.constructors + self.entry_points
    }
}

/// Thread-safe memoization of accessor thunks
#[derive(Default)]
pub struct AccessorCache {
    getters: DashMap<String, Getter>,
    setters: DashMap<String, Setter>,
    constructors: DashMap<String, Constructor>,
    entry_points: DashMap<String, MapEntryPoint>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AccessorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached getter for `property` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingAccessor` for a write-only property. Failed
    /// builds are not cached.
    pub fn getter(&self, owner: &TypeInfo, property: &'static PropertyInfo) -> Result<Getter> {
        self.memoize(&self.getters, getter_signature(owner, property.name), || {
            invoker::build_getter(owner, property)
        })
    }

    /// Cached setter for `property` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingAccessor` for a read-only property.
    pub fn setter(&self, owner: &TypeInfo, property: &'static PropertyInfo) -> Result<Setter> {
        self.memoize(&self.setters, setter_signature(owner, property.name), || {
            invoker::build_setter(owner, property)
        })
    }

    /// Cached default constructor for a record type.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingAccessor` when `ty` is not a record.
    pub fn constructor(&self, ty: &TypeInfo) -> Result<Constructor> {
        self.memoize(&self.constructors, constructor_signature(ty), || {
            invoker::build_constructor(ty)
        })
    }

    /// Cached mapping entry point for one (source, target) pair.
    pub fn entry_point(&self, source: &TypeInfo, target: &TypeInfo) -> MapEntryPoint {
        let key = entry_point_signature(source, target);
        if let Some(cached) = self.lookup(&self.entry_points, &key) {
            return cached;
        }
        let built = invoker::build_map_entry_point(source, target);
        self.entry_points.insert(key, built.clone());
        built
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            getters: self.getters.len(),
            setters: self.setters.len(),
            constructors: self.constructors.len(),
            entry_points: self.entry_points.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.stats().entries()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn memoize<V: Clone>(
        &self,
        table: &DashMap<String, V>,
        key: String,
        build: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(cached) = self.lookup(table, &key) {
            return Ok(cached);
        }

        // Built outside any shard lock; a concurrent miss may overwrite
        // this entry with an equivalent thunk.
        let built = build()?;
        table.insert(key, built.clone());
        Ok(built)
    }

    fn lookup<V: Clone>(&self, table: &DashMap<String, V>, key: &str) -> Option<V> {
        match table.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Cache miss for accessor: {}", key);
                None
            }
        }
    }
}

impl std::fmt::Debug for AccessorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use objmap_reflect::{Record, Reflect, Value, record};
    use std::sync::Arc;

    #[derive(Debug, Default, Clone)]
    struct Invoice {
        number: u32,
        total: f64,
        checksum: String,
    }

    record!(Invoice { number: u32, total: f64, checksum(get): String });

    fn property(name: &str) -> &'static PropertyInfo {
        Invoice::shape().property(name).unwrap()
    }

    #[test]
    fn test_signatures() {
        let ty = Invoice::type_info();
        assert!(getter_signature(&ty, "total").ends_with("Invoice::total#get"));
        assert!(setter_signature(&ty, "total").ends_with("Invoice::total#set"));
        assert!(constructor_signature(&ty).ends_with("Invoice#ctor"));
        let entry = entry_point_signature(&ty, &i32::type_info());
        assert!(entry.starts_with("map<") && entry.ends_with(",i32>"));
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = AccessorCache::new();
        let ty = Invoice::type_info();

        let first = cache.getter(&ty, property("number")).unwrap();
        let second = cache.getter(&ty, property("number")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.getters, 1);

        let invoice = Invoice {
            number: 12,
            ..Invoice::default()
        };
        assert!(matches!(second(&invoice).unwrap(), Value::U32(12)));
    }

    #[test]
    fn test_tables_are_separate() {
        let cache = AccessorCache::new();
        let ty = Invoice::type_info();
        cache.getter(&ty, property("total")).unwrap();
        cache.setter(&ty, property("total")).unwrap();
        cache.constructor(&ty).unwrap();
        cache.entry_point(&ty, &ty);

        let stats = cache.stats();
        assert_eq!(stats.getters, 1);
        assert_eq!(stats.setters, 1);
        assert_eq!(stats.constructors, 1);
        assert_eq!(stats.entry_points, 1);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = AccessorCache::new();
        let ty = Invoice::type_info();
        let err = cache.setter(&ty, property("checksum")).err().unwrap();
        assert!(matches!(err, Error::MissingAccessor { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_first_builds() {
        let cache = AccessorCache::new();
        let ty = Invoice::type_info();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        cache.getter(&ty, property("number")).unwrap();
                        cache.constructor(&ty).unwrap();
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.getters, 1);
        assert_eq!(stats.constructors, 1);
        assert_eq!(stats.hits + stats.misses, 1600);
    }
}
