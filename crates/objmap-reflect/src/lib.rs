#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

//! # objmap-reflect
//!
//! Runtime type information for the objmap mapping engine.
//!
//! Rust has no runtime reflection, so every type the engine maps describes
//! itself through this crate: scalars, optionals, arrays and sequences come
//! with built-in [`Reflect`] impls, and record types declare their property
//! shape with the [`record!`] macro. Values cross the engine's uniform
//! calling convention as [`Value`]s.

/// Classification of types into simple and complex, enumerable and not.
pub mod classify;
/// Record shapes, property descriptors and the `record!` macro.
pub mod record;
/// `Reflect` impls for scalars and the built-in generic containers.
pub mod reflect;
/// Type descriptors.
pub mod types;
/// Loosely typed values passed through accessor thunks.
pub mod value;

pub use record::{DynRecord, PropertyInfo, RawGetter, RawSetter, Record, RecordShape};
pub use reflect::Reflect;
pub use types::{ScalarKind, TypeInfo, TypeKind};
pub use value::Value;

use thiserror::Error;

/// Errors raised while converting between typed and dynamic values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Null value cannot be stored in {expected}")]
    NullValue { expected: String },
}

impl Error {
    /// Build a type-mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Build a null-value error for a non-nullable destination.
    pub fn null_value(expected: impl Into<String>) -> Self {
        Self::NullValue {
            expected: expected.into(),
        }
    }
}

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, Error>;
