//! Invocation thunk builder
//!
//! Turns member descriptors (property getters and setters, record
//! constructors, and the engine's own mapping entry point instantiated for a
//! source/target pair) into thunks with one uniform calling convention over
//! [`Value`]s and [`DynRecord`]s. Builders are pure functions of their
//! descriptor; memoization is the [`AccessorCache`](crate::AccessorCache)'s job.

use crate::engine::{MapContext, Mapper};
use objmap_reflect::{DynRecord, PropertyInfo, TypeInfo, Value};
use std::fmt;
use std::sync::Arc;

/// `(instance) -> value`
pub type Getter = Arc<dyn Fn(&dyn DynRecord) -> crate::Result<Value> + Send + Sync>;

/// `(instance, value) -> ()`
pub type Setter = Arc<dyn Fn(&mut dyn DynRecord, Value) -> crate::Result<()> + Send + Sync>;

/// `() -> instance`
pub type Constructor = Arc<dyn Fn() -> Box<dyn DynRecord> + Send + Sync>;

/// `(engine, source, existing target, context) -> target`
pub type MapEntryPoint = Arc<
    dyn Fn(
            &Mapper,
            &dyn DynRecord,
            Option<Box<dyn DynRecord>>,
            &mut MapContext<'_>,
        ) -> crate::Result<Box<dyn DynRecord>>
        + Send
        + Sync,
>;

/// Kind of member a thunk was requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    Getter,
    Setter,
    Constructor,
}

impl fmt::Display for AccessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessorKind::Getter => f.write_str("getter"),
            AccessorKind::Setter => f.write_str("setter"),
            AccessorKind::Constructor => f.write_str("constructor"),
        }
    }
}

/// Build a getter thunk for `property` declared on `owner`.
///
/// # Errors
///
/// Returns `Error::MissingAccessor` for a write-only property.
pub fn build_getter(owner: &TypeInfo, property: &'static PropertyInfo) -> crate::Result<Getter> {
    let raw = property.get.ok_or_else(|| {
        crate::Error::missing_accessor(owner.name(), property.name, AccessorKind::Getter)
    })?;
    let owner_name = owner.name();

    Ok(Arc::new(move |instance: &dyn DynRecord| {
        raw(instance.as_any()).map_err(|e| crate::Error::property(owner_name, property.name, e))
    }))
}

/// Build a setter thunk for `property` declared on `owner`.
///
/// # Errors
///
/// Returns `Error::MissingAccessor` for a read-only property.
pub fn build_setter(owner: &TypeInfo, property: &'static PropertyInfo) -> crate::Result<Setter> {
    let raw = property.set.ok_or_else(|| {
        crate::Error::missing_accessor(owner.name(), property.name, AccessorKind::Setter)
    })?;
    let owner_name = owner.name();

    Ok(Arc::new(move |instance: &mut dyn DynRecord, value: Value| {
        raw(instance.as_any_mut(), value)
            .map_err(|e| crate::Error::property(owner_name, property.name, e))
    }))
}

/// Build a default constructor thunk for a record type.
///
/// # Errors
///
/// Returns `Error::MissingAccessor` when `ty` is not a record.
pub fn build_constructor(ty: &TypeInfo) -> crate::Result<Constructor> {
    let shape = ty.as_record().ok_or_else(|| {
        crate::Error::missing_accessor(ty.name(), "new", AccessorKind::Constructor)
    })?;
    let construct = shape.construct;

    Ok(Arc::new(move || construct()))
}

/// Build the mapping entry point for one (source, target) pair.
pub fn build_map_entry_point(source: &TypeInfo, target: &TypeInfo) -> MapEntryPoint {
    let source = source.clone();
    let target = target.clone();

    Arc::new(
        move |mapper: &Mapper,
              instance: &dyn DynRecord,
              existing: Option<Box<dyn DynRecord>>,
              context: &mut MapContext<'_>| {
            mapper.map_dynamic(instance, &source, existing, &target, context)
        },
    )
}
