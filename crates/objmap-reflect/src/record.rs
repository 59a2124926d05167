//! Record types
//!
//! A record is a struct whose properties the engine can enumerate, read and
//! write at runtime. Its [`RecordShape`] is a static table of
//! [`PropertyInfo`] descriptors, normally generated by [`record!`](crate::record!).

use crate::reflect::Reflect;
use crate::types::TypeInfo;
use crate::value::Value;
use crate::{Error, Result};
use std::any::{Any, type_name};
use std::fmt;

/// Raw property reader over an erased receiver
pub type RawGetter = fn(&dyn Any) -> Result<Value>;

/// Raw property writer over an erased receiver
pub type RawSetter = fn(&mut dyn Any, Value) -> Result<()>;

/// Descriptor of one record property
pub struct PropertyInfo {
    pub name: &'static str,
    /// Declared type of the property
    pub ty: fn() -> TypeInfo,
    /// Absent for write-only properties
    pub get: Option<RawGetter>,
    /// Absent for read-only properties
    pub set: Option<RawSetter>,
}

impl PropertyInfo {
    pub fn type_info(&self) -> TypeInfo {
        (self.ty)()
    }

    pub fn is_readable(&self) -> bool {
        self.get.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

impl fmt::Debug for PropertyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyInfo")
            .field("name", &self.name)
            .field("ty", &self.type_info().name())
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Static property table and default constructor of a record type
pub struct RecordShape {
    pub properties: &'static [PropertyInfo],
    pub construct: fn() -> Box<dyn DynRecord>,
}

impl RecordShape {
    /// Find a property by name.
    pub fn property(&self, name: &str) -> Option<&'static PropertyInfo> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn property_names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|property| property.name).collect()
    }
}

impl fmt::Debug for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordShape")
            .field("properties", &self.property_names())
            .finish()
    }
}

/// A statically typed record
pub trait Record: Reflect + Default + Clone + fmt::Debug {
    fn shape() -> &'static RecordShape;
}

/// Object-safe view of a record
pub trait DynRecord: Any + fmt::Debug + Send + Sync {
    fn record_type_info(&self) -> TypeInfo;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn clone_record(&self) -> Box<dyn DynRecord>;
}

impl<T: Record> DynRecord for T {
    fn record_type_info(&self) -> TypeInfo {
        T::type_info()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_record(&self) -> Box<dyn DynRecord> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn DynRecord> {
    fn clone(&self) -> Self {
        self.clone_record()
    }
}

/// Borrow a dynamic record as `T`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] when the record is not a `T`.
pub fn downcast_ref<T: Record>(record: &dyn DynRecord) -> Result<&T> {
    record.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::type_mismatch(type_name::<T>(), record.record_type_info().name())
    })
}

/// Mutably borrow a dynamic record as `T`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] when the record is not a `T`.
pub fn downcast_mut<T: Record>(record: &mut dyn DynRecord) -> Result<&mut T> {
    let found = record.record_type_info().name();
    record
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| Error::type_mismatch(type_name::<T>(), found))
}

/// Take ownership of a dynamic record as `T`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] when the record is not a `T`.
pub fn downcast_record<T: Record>(record: Box<dyn DynRecord>) -> Result<T> {
    let found = record.record_type_info().name();
    record
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| Error::type_mismatch(type_name::<T>(), found))
}

/// `Reflect::from_value` for records, used by [`record!`](crate::record!).
///
/// # Errors
///
/// Returns an error for null, non-record values and records of another type.
pub fn record_from_value<T: Record>(value: Value) -> Result<T> {
    match value {
        Value::Record(record) => downcast_record(record),
        Value::Null => Err(Error::null_value(type_name::<T>())),
        other => Err(Error::type_mismatch(type_name::<T>(), other.kind_name())),
    }
}

/// Receiver-mismatch error for generated accessors.
pub fn receiver_mismatch<T: 'static>() -> Error {
    Error::type_mismatch(type_name::<T>(), "foreign receiver")
}

/// Declare the property shape of an existing struct.
///
/// The struct must implement `Default`, `Clone` and `Debug`. Every listed
/// field gets a getter and a setter; `(get)` or `(set)` keeps only one.
///
/// ```
/// use objmap_reflect::record;
///
/// #[derive(Debug, Default, Clone)]
/// pub struct Customer {
///     pub id: i64,
///     pub name: String,
///     pub tags: Vec<String>,
/// }
///
/// record!(Customer { id: i64, name: String, tags(get): Vec<String> });
/// ```
#[macro_export]
macro_rules! record {
    (@get $ty:ident, $field:ident, $fty:ty) => {
        ::std::option::Option::Some(
            |receiver: &dyn ::std::any::Any| -> $crate::Result<$crate::Value> {
                let record = receiver
                    .downcast_ref::<$ty>()
                    .ok_or_else($crate::record::receiver_mismatch::<$ty>)?;
                ::std::result::Result::Ok(<$fty as $crate::Reflect>::to_value(&record.$field))
            },
        )
    };
    (@get $ty:ident, $field:ident, $fty:ty, get) => {
        $crate::record!(@get $ty, $field, $fty)
    };
    (@get $ty:ident, $field:ident, $fty:ty, set) => {
        ::std::option::Option::None
    };
    (@set $ty:ident, $field:ident, $fty:ty) => {
        ::std::option::Option::Some(
            |receiver: &mut dyn ::std::any::Any, value: $crate::Value| -> $crate::Result<()> {
                let value = <$fty as $crate::Reflect>::from_value(value)?;
                match receiver.downcast_mut::<$ty>() {
                    ::std::option::Option::Some(record) => {
                        record.$field = value;
                        ::std::result::Result::Ok(())
                    }
                    ::std::option::Option::None => {
                        ::std::result::Result::Err($crate::record::receiver_mismatch::<$ty>())
                    }
                }
            },
        )
    };
    (@set $ty:ident, $field:ident, $fty:ty, set) => {
        $crate::record!(@set $ty, $field, $fty)
    };
    (@set $ty:ident, $field:ident, $fty:ty, get) => {
        ::std::option::Option::None
    };
    ($ty:ident { $($field:ident $(($access:ident))? : $fty:ty),* $(,)? }) => {
        impl $crate::Reflect for $ty {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::record::<$ty>(<$ty as $crate::Record>::shape())
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Record(::std::boxed::Box::new(::std::clone::Clone::clone(self)))
            }

            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                $crate::record::record_from_value::<$ty>(value)
            }
        }

        impl $crate::Record for $ty {
            fn shape() -> &'static $crate::RecordShape {
                static SHAPE: $crate::RecordShape = $crate::RecordShape {
                    properties: &[
                        $(
                            $crate::PropertyInfo {
                                name: ::std::stringify!($field),
                                ty: <$fty as $crate::Reflect>::type_info,
                                get: $crate::record!(@get $ty, $field, $fty $(, $access)?),
                                set: $crate::record!(@set $ty, $field, $fty $(, $access)?),
                            },
                        )*
                    ],
                    construct: || -> ::std::boxed::Box<dyn $crate::DynRecord> {
                        ::std::boxed::Box::new(<$ty as ::std::default::Default>::default())
                    },
                };
                &SHAPE
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sample {
        id: i32,
        label: Option<String>,
        secret: String,
        sink: u8,
    }

    crate::record!(Sample {
        id: i32,
        label: Option<String>,
        secret(get): String,
        sink(set): u8,
    });

    #[test]
    fn test_shape_lists_properties_in_order() {
        let shape = Sample::shape();
        assert_eq!(shape.property_names(), vec!["id", "label", "secret", "sink"]);
        assert!(matches!(Sample::type_info().kind(), TypeKind::Record(_)));
    }

    #[test]
    fn test_access_markers() {
        let shape = Sample::shape();
        let secret = shape.property("secret").unwrap();
        assert!(secret.is_readable());
        assert!(!secret.is_writable());

        let sink = shape.property("sink").unwrap();
        assert!(!sink.is_readable());
        assert!(sink.is_writable());
    }

    #[test]
    fn test_raw_accessors() {
        let shape = Sample::shape();
        let id = shape.property("id").unwrap();
        let mut sample = Sample {
            id: 3,
            ..Sample::default()
        };

        let value = (id.get.unwrap())(&sample).unwrap();
        assert!(matches!(value, Value::I32(3)));

        (id.set.unwrap())(&mut sample, Value::I32(9)).unwrap();
        assert_eq!(sample.id, 9);
    }

    #[test]
    fn test_raw_accessor_rejects_foreign_receiver() {
        let id = Sample::shape().property("id").unwrap();
        let err = (id.get.unwrap())(&17_u64).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_construct_and_downcast() {
        let record = (Sample::shape().construct)();
        assert!(record.record_type_info().is::<Sample>());
        let sample: Sample = downcast_record(record).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_record_value_roundtrip() {
        let sample = Sample {
            id: 1,
            label: Some("a".into()),
            ..Sample::default()
        };
        let restored = Sample::from_value(sample.to_value()).unwrap();
        assert_eq!(restored, sample);
        assert!(Sample::from_value(Value::I32(1)).is_err());
    }
}
