#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # objmap-engine
//!
//! Rule registry, accessor cache and recursive mapping engine.
//!
//! A [`Mapper`] owns a rule registry keyed by (target type, source type)
//! pairs and a cache of accessor thunks built from record shapes. Mapping a
//! source instance instantiates (or reuses) the target, descends into nested
//! record properties, then applies the registered rules in order.

pub mod cache;
pub mod config;
pub mod engine;
pub mod factory;
mod flatten;
pub mod invoker;
pub mod path;
pub mod rules;

pub use cache::{AccessorCache, CacheStats};
pub use config::{CyclePolicy, MapperConfig};
pub use engine::{MapContext, Mapper};
pub use factory::{FactoryContainer, FactoryProvider, ObjectFactory};
pub use invoker::AccessorKind;
pub use path::PropertyPath;
pub use rules::{MappingRule, SourceExpr, computed};

pub use objmap_reflect;
pub use objmap_reflect::{DynRecord, Record, Reflect, TypeInfo, Value, record};

use thiserror::Error;

/// Errors that can occur while registering rules or mapping
#[derive(Error, Debug)]
pub enum Error {
    #[error("Null source property '{path}' while mapping {source_type} -> {target_type}")]
    NullSourceProperty {
        source_type: String,
        target_type: String,
        path: String,
    },

    #[error("Unsupported collection shape {type_name} at '{path}': only arrays are mapped")]
    UnsupportedCollectionShape { type_name: String, path: String },

    #[error("Factory produced {found} where {expected} was requested")]
    FactoryResolution { expected: String, found: String },

    #[error("Missing {accessor} for {type_name}::{member}")]
    MissingAccessor {
        type_name: String,
        member: String,
        accessor: AccessorKind,
    },

    #[error("Unknown property '{property}' on {type_name}")]
    UnknownProperty { type_name: String, property: String },

    #[error("Invalid property path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Incompatible rule {source_type} -> {target_type}: {reason}")]
    IncompatibleRule {
        source_type: String,
        target_type: String,
        reason: String,
    },

    #[error("Ambiguous flattening of {source_type} into {target_type}: candidates {candidates:?}")]
    AmbiguousFlattening {
        source_type: String,
        target_type: String,
        candidates: Vec<String>,
    },

    #[error("Cyclic descent into {target_type} from {source_type}")]
    CyclicDescent {
        source_type: String,
        target_type: String,
    },

    #[error("Mapping depth limit of {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("Property {type_name}::{property}: {source}")]
    Property {
        type_name: String,
        property: String,
        #[source]
        source: objmap_reflect::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mapper state lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Reflect(#[from] objmap_reflect::Error),
}

impl Error {
    /// Build a null-source-property error.
    pub fn null_source_property(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::NullSourceProperty {
            source_type: source_type.into(),
            target_type: target_type.into(),
            path: path.into(),
        }
    }

    /// Build an unsupported-collection-shape error.
    pub fn unsupported_collection(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnsupportedCollectionShape {
            type_name: type_name.into(),
            path: path.into(),
        }
    }

    /// Build a missing-accessor error.
    pub fn missing_accessor(
        type_name: impl Into<String>,
        member: impl Into<String>,
        accessor: AccessorKind,
    ) -> Self {
        Self::MissingAccessor {
            type_name: type_name.into(),
            member: member.into(),
            accessor,
        }
    }

    /// Build an unknown-property error.
    pub fn unknown_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Build an invalid-path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build an incompatible-rule error.
    pub fn incompatible(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::IncompatibleRule {
            source_type: source_type.into(),
            target_type: target_type.into(),
            reason: reason.into(),
        }
    }

    /// Attach property context to a value conversion error.
    pub fn property(
        type_name: impl Into<String>,
        property: impl Into<String>,
        source: objmap_reflect::Error,
    ) -> Self {
        Self::Property {
            type_name: type_name.into(),
            property: property.into(),
            source,
        }
    }
}

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, Error>;
