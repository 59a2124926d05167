//! Factory collaborator
//!
//! The engine asks a [`FactoryProvider`] for a pre-initialized target before
//! falling back to default construction. A provider signals "not registered"
//! with `None`; it never fails.

use dashmap::DashMap;
use objmap_reflect::{DynRecord, Record};
use std::sync::Arc;

/// Produces pre-initialized instances of one type
pub trait ObjectFactory: Send + Sync {
    fn initialize(&self) -> Box<dyn DynRecord>;
}

impl<F> ObjectFactory for F
where
    F: Fn() -> Box<dyn DynRecord> + Send + Sync,
{
    fn initialize(&self) -> Box<dyn DynRecord> {
        self()
    }
}

/// Source of target instances keyed by type identity string
pub trait FactoryProvider: Send + Sync {
    /// Produce an instance for `type_name`, or `None` when nothing is
    /// registered for it.
    fn try_create(&self, type_name: &str) -> Option<Box<dyn DynRecord>>;
}

/// Minimal provider backed by a concurrent map of factories
#[derive(Clone, Default)]
pub struct FactoryContainer {
    factories: Arc<DashMap<String, Arc<dyn ObjectFactory>>>,
}

impl FactoryContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `T`, replacing any previous one.
    pub fn register<T: Record>(&self, factory: impl ObjectFactory + 'static) -> &Self {
        self.register_named(T::type_info().name(), factory)
    }

    /// Register a typed closure for `T`.
    pub fn register_fn<T: Record>(&self, factory: impl Fn() -> T + Send + Sync + 'static) -> &Self {
        self.register::<T>(move || -> Box<dyn DynRecord> { Box::new(factory()) })
    }

    /// Register a factory under an explicit type identity string.
    ///
    /// Nothing checks that the factory's product matches `type_name`; the
    /// engine rejects a mismatch when the instance is requested.
    pub fn register_named(
        &self,
        type_name: impl Into<String>,
        factory: impl ObjectFactory + 'static,
    ) -> &Self {
        self.factories.insert(type_name.into(), Arc::new(factory));
        self
    }

    /// Remove the factory for `T`; returns whether one was registered.
    pub fn unregister<T: Record>(&self) -> bool {
        self.factories.remove(T::type_info().name()).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl FactoryProvider for FactoryContainer {
    fn try_create(&self, type_name: &str) -> Option<Box<dyn DynRecord>> {
        // Release the shard lock before running foreign code
        let factory = self
            .factories
            .get(type_name)
            .map(|entry| Arc::clone(entry.value()))?;
        Some(factory.initialize())
    }
}

impl std::fmt::Debug for FactoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        f.debug_struct("FactoryContainer")
            .field("types", &types)
            .finish()
    }
}
