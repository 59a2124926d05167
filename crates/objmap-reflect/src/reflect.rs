//! The `Reflect` trait and its built-in implementations

use crate::types::{ScalarKind, TypeInfo, TypeKind};
use crate::value::Value;
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::any::{TypeId, type_name};
use std::collections::{BTreeSet, VecDeque};

/// A type the engine can describe, read and write at runtime
pub trait Reflect: Sized + Send + Sync + 'static {
    /// Runtime descriptor of the type.
    fn type_info() -> TypeInfo;

    /// Copy this value into a dynamic value.
    fn to_value(&self) -> Value;

    /// Rebuild a typed value from a dynamic one.
    ///
    /// # Errors
    ///
    /// Returns an error when the value does not have this type's shape.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::scalar::<$ty>(ScalarKind::$variant)
                }

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        Value::Null => Err(Error::null_value(type_name::<$ty>())),
                        other => Err(Error::type_mismatch(type_name::<$ty>(), other.kind_name())),
                    }
                }
            }
        )*
    };
}

impl_scalar!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
    Decimal => Decimal,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
);

impl<T: Reflect> Reflect for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new(
            type_name::<Self>(),
            TypeId::of::<Self>(),
            TypeKind::Optional(Box::new(T::type_info())),
        )
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Boxes are transparent: a `Box<T>` is described and valued as `T`.
impl<T: Reflect> Reflect for Box<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }

    fn to_value(&self) -> Value {
        self.as_ref().to_value()
    }

    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new(
            type_name::<Self>(),
            TypeId::of::<Self>(),
            TypeKind::Array(Box::new(T::type_info())),
        )
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(Reflect::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Err(Error::null_value(type_name::<Self>())),
            other => Err(Error::type_mismatch(type_name::<Self>(), other.kind_name())),
        }
    }
}

impl<T: Reflect> Reflect for VecDeque<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new(
            type_name::<Self>(),
            TypeId::of::<Self>(),
            TypeKind::Sequence(Box::new(T::type_info())),
        )
    }

    fn to_value(&self) -> Value {
        Value::Sequence(self.iter().map(Reflect::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Sequence(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Err(Error::null_value(type_name::<Self>())),
            other => Err(Error::type_mismatch(type_name::<Self>(), other.kind_name())),
        }
    }
}

impl<T: Reflect + Ord> Reflect for BTreeSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new(
            type_name::<Self>(),
            TypeId::of::<Self>(),
            TypeKind::Sequence(Box::new(T::type_info())),
        )
    }

    fn to_value(&self) -> Value {
        Value::Sequence(self.iter().map(Reflect::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Sequence(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Err(Error::null_value(type_name::<Self>())),
            other => Err(Error::type_mismatch(type_name::<Self>(), other.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip_through_value() {
        let value = 42_i32.to_value();
        assert!(matches!(value, Value::I32(42)));
        assert_eq!(i32::from_value(value).unwrap(), 42);
    }

    #[test]
    fn test_scalar_rejects_null() {
        let err = String::from_value(Value::Null).unwrap_err();
        assert!(matches!(err, Error::NullValue { .. }));
    }

    #[test]
    fn test_scalar_rejects_other_kind() {
        let err = i64::from_value(Value::I32(1)).unwrap_err();
        assert_eq!(err, Error::type_mismatch("i64", "i32"));
    }

    #[test]
    fn test_option_maps_null() {
        assert!(Option::<i32>::None.to_value().is_null());
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::I32(5)).unwrap(), Some(5));
    }

    #[test]
    fn test_vec_is_array_and_deque_is_sequence() {
        assert!(matches!(vec![1_u8].to_value(), Value::Array(_)));
        assert!(matches!(VecDeque::from([1_u8]).to_value(), Value::Sequence(_)));
        assert!(matches!(Vec::<u8>::type_info().kind(), TypeKind::Array(_)));
        assert!(matches!(BTreeSet::<u8>::type_info().kind(), TypeKind::Sequence(_)));
    }

    #[test]
    fn test_vec_from_sequence_is_mismatch() {
        let err = Vec::<u8>::from_value(Value::Sequence(vec![])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_box_is_transparent() {
        assert_eq!(Box::<String>::type_info(), String::type_info());
        let boxed = Box::<String>::from_value(Value::String("x".into())).unwrap();
        assert_eq!(*boxed, "x");
    }
}
