//! Dynamic values
//!
//! A [`Value`] is what every accessor thunk reads and writes: a scalar, an
//! array, a non-array sequence, a boxed record, or null. Scalars and records
//! share the same return channel.

use crate::record::DynRecord;
use crate::types::{ScalarKind, TypeInfo, TypeKind};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Loosely typed value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Elements of a `Vec`
    Array(Vec<Value>),
    /// Elements of an enumerable that is not an array
    Sequence(Vec<Value>),
    Record(Box<dyn DynRecord>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Sequence(_) => "sequence",
            Value::Record(_) => "record",
            scalar => scalar.scalar_kind().map_or("unknown", ScalarKind::name),
        }
    }

    /// Scalar kind of this value, if it is a scalar.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        let kind = match self {
            Value::Bool(_) => ScalarKind::Bool,
            Value::I8(_) => ScalarKind::I8,
            Value::I16(_) => ScalarKind::I16,
            Value::I32(_) => ScalarKind::I32,
            Value::I64(_) => ScalarKind::I64,
            Value::U8(_) => ScalarKind::U8,
            Value::U16(_) => ScalarKind::U16,
            Value::U32(_) => ScalarKind::U32,
            Value::U64(_) => ScalarKind::U64,
            Value::F32(_) => ScalarKind::F32,
            Value::F64(_) => ScalarKind::F64,
            Value::Char(_) => ScalarKind::Char,
            Value::String(_) => ScalarKind::String,
            Value::Decimal(_) => ScalarKind::Decimal,
            Value::Date(_) => ScalarKind::Date,
            Value::DateTime(_) => ScalarKind::DateTime,
            Value::Null | Value::Array(_) | Value::Sequence(_) | Value::Record(_) => return None,
        };
        Some(kind)
    }

    /// Borrow the boxed record.
    pub fn as_record(&self) -> Option<&dyn DynRecord> {
        match self {
            Value::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }

    /// Take the boxed record, dropping any other value.
    pub fn into_record(self) -> Option<Box<dyn DynRecord>> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::I8(v) => Some(i128::from(*v)),
            Value::I16(v) => Some(i128::from(*v)),
            Value::I32(v) => Some(i128::from(*v)),
            Value::I64(v) => Some(i128::from(*v)),
            Value::U8(v) => Some(i128::from(*v)),
            Value::U16(v) => Some(i128::from(*v)),
            Value::U32(v) => Some(i128::from(*v)),
            Value::U64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Convert a scalar to `kind` along one of the lossless widenings of
    /// [`ScalarKind::widens_to`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when no such conversion exists.
    pub fn widen(self, kind: ScalarKind) -> Result<Value> {
        if self.scalar_kind() == Some(kind) {
            return Ok(self);
        }

        let found = self.kind_name();
        let allowed = self.scalar_kind().is_some_and(|from| from.widens_to(kind));
        if !allowed {
            return Err(Error::type_mismatch(kind.name(), found));
        }

        let converted = match (&self, kind) {
            (Value::F32(v), ScalarKind::F64) => Some(Value::F64(f64::from(*v))),
            (Value::Date(d), ScalarKind::DateTime) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
            _ => self.as_i128().and_then(|n| widen_integer(n, kind)),
        };

        converted.ok_or_else(|| Error::type_mismatch(kind.name(), found))
    }

    /// Convert this value so that it can be stored in a property declared as
    /// `ty`. Null passes through; arrays are converted element-wise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when a scalar cannot be widened.
    pub fn coerce_to(self, ty: &TypeInfo) -> Result<Value> {
        match (self, ty.unwrap_optional().kind()) {
            (Value::Null, _) => Ok(Value::Null),
            (value, TypeKind::Scalar(kind)) => value.widen(*kind),
            (Value::Array(items), TypeKind::Array(element)) => items
                .into_iter()
                .map(|item| item.coerce_to(element))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (value, _) => Ok(value),
        }
    }
}

fn widen_integer(n: i128, kind: ScalarKind) -> Option<Value> {
    match kind {
        ScalarKind::I8 => i8::try_from(n).ok().map(Value::I8),
        ScalarKind::I16 => i16::try_from(n).ok().map(Value::I16),
        ScalarKind::I32 => i32::try_from(n).ok().map(Value::I32),
        ScalarKind::I64 => i64::try_from(n).ok().map(Value::I64),
        ScalarKind::U8 => u8::try_from(n).ok().map(Value::U8),
        ScalarKind::U16 => u16::try_from(n).ok().map(Value::U16),
        ScalarKind::U32 => u32::try_from(n).ok().map(Value::U32),
        ScalarKind::U64 => u64::try_from(n).ok().map(Value::U64),
        // widens_to only admits 16-bit sources for f32 and 32-bit sources for f64
        ScalarKind::F32 => i16::try_from(n)
            .map(f32::from)
            .or_else(|_| u16::try_from(n).map(f32::from))
            .ok()
            .map(Value::F32),
        ScalarKind::F64 => i32::try_from(n)
            .map(f64::from)
            .or_else(|_| u32::try_from(n).map(f64::from))
            .ok()
            .map(Value::F64),
        ScalarKind::Decimal => i64::try_from(n)
            .map(Decimal::from)
            .or_else(|_| u64::try_from(n).map(Decimal::from))
            .ok()
            .map(Value::Decimal),
        _ => None,
    }
}
