//! Type descriptors

use crate::record::RecordShape;
use std::any::{TypeId, type_name};
use std::fmt;

/// Scalar kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Char,
    String,
    /// Fixed-point decimal (`rust_decimal::Decimal`)
    Decimal,
    /// Calendar date (`chrono::NaiveDate`)
    Date,
    /// Date and time without zone (`chrono::NaiveDateTime`)
    DateTime,
}

impl ScalarKind {
    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Char => "char",
            ScalarKind::String => "String",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Date => "NaiveDate",
            ScalarKind::DateTime => "NaiveDateTime",
        }
    }

    /// Whether this is one of the integer kinds.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::I8
                | ScalarKind::I16
                | ScalarKind::I32
                | ScalarKind::I64
                | ScalarKind::U8
                | ScalarKind::U16
                | ScalarKind::U32
                | ScalarKind::U64
        )
    }

    /// Whether a value of this kind converts to `other` without loss.
    ///
    /// These are the implicit conversions a direct rule may perform.
    pub fn widens_to(self, other: ScalarKind) -> bool {
        use ScalarKind::*;

        if self == other {
            return true;
        }

        match (self, other) {
            (I8, I16 | I32 | I64) | (I16, I32 | I64) | (I32, I64) => true,
            (U8, U16 | U32 | U64 | I16 | I32 | I64) => true,
            (U16, U32 | U64 | I32 | I64) => true,
            (U32, U64 | I64) => true,
            (I8 | I16 | U8 | U16, F32) => true,
            (I8 | I16 | I32 | U8 | U16 | U32 | F32, F64) => true,
            (from, Decimal) => from.is_integer(),
            (Date, DateTime) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structural kind of a type
#[derive(Clone)]
pub enum TypeKind {
    Scalar(ScalarKind),
    /// Nullable wrapper (`Option<T>`)
    Optional(Box<TypeInfo>),
    /// Array of elements (`Vec<T>`)
    Array(Box<TypeInfo>),
    /// Enumerable that is not an array (`VecDeque<T>`, `BTreeSet<T>`)
    Sequence(Box<TypeInfo>),
    /// Record with a static property shape
    Record(&'static RecordShape),
}

/// Runtime description of a reflected type
///
/// Equality and hashing use the type identity only.
#[derive(Clone)]
pub struct TypeInfo {
    name: &'static str,
    id: TypeId,
    kind: TypeKind,
}

impl TypeInfo {
    /// Create a descriptor.
    pub fn new(name: &'static str, id: TypeId, kind: TypeKind) -> Self {
        Self { name, id, kind }
    }

    /// Descriptor for a scalar type.
    pub fn scalar<T: 'static>(kind: ScalarKind) -> Self {
        Self::new(type_name::<T>(), TypeId::of::<T>(), TypeKind::Scalar(kind))
    }

    /// Descriptor for a record type.
    pub fn record<T: 'static>(shape: &'static RecordShape) -> Self {
        Self::new(type_name::<T>(), TypeId::of::<T>(), TypeKind::Record(shape))
    }

    /// Stable type identity string.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Whether this descriptor describes `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, TypeKind::Optional(_))
    }

    /// Peel every `Optional` layer.
    pub fn unwrap_optional(&self) -> &TypeInfo {
        match &self.kind {
            TypeKind::Optional(inner) => inner.unwrap_optional(),
            _ => self,
        }
    }

    /// Scalar kind, looking through `Optional`.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.unwrap_optional().kind {
            TypeKind::Scalar(kind) => Some(kind),
            _ => None,
        }
    }

    /// Record shape, looking through `Optional`.
    pub fn as_record(&self) -> Option<&'static RecordShape> {
        match self.unwrap_optional().kind {
            TypeKind::Record(shape) => Some(shape),
            _ => None,
        }
    }

    /// The record descriptor behind `Optional`, if this is a record type.
    pub fn record_type(&self) -> Option<TypeInfo> {
        let inner = self.unwrap_optional();
        match inner.kind {
            TypeKind::Record(_) => Some(inner.clone()),
            _ => None,
        }
    }

    /// Element descriptor of an array or sequence, looking through `Optional`.
    pub fn element(&self) -> Option<&TypeInfo> {
        match &self.unwrap_optional().kind {
            TypeKind::Array(element) | TypeKind::Sequence(element) => Some(element),
            _ => None,
        }
    }

    /// Whether a value of this type can be stored in `target` by a single
    /// assignment, possibly through an implicit widening conversion.
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        if self.id == target.id {
            return true;
        }

        match (&self.kind, &target.kind) {
            (TypeKind::Optional(source), TypeKind::Optional(target)) => {
                source.is_assignable_to(target)
            }
            (_, TypeKind::Optional(target)) => self.is_assignable_to(target),
            (TypeKind::Scalar(source), TypeKind::Scalar(target)) => source.widens_to(*target),
            (TypeKind::Array(source), TypeKind::Array(target)) => source.id == target.id,
            _ => false,
        }
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl std::hash::Hash for TypeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            TypeKind::Scalar(kind) => format!("Scalar({kind})"),
            TypeKind::Optional(inner) => format!("Optional({})", inner.name),
            TypeKind::Array(inner) => format!("Array({})", inner.name),
            TypeKind::Sequence(inner) => format!("Sequence({})", inner.name),
            TypeKind::Record(shape) => format!("Record({} properties)", shape.properties.len()),
        };
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
