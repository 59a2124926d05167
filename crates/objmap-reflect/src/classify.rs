//! Type classification
//!
//! The engine copies simple types directly and recurses into complex ones.
//! Enumerable detection exists so that collections other than arrays can be
//! rejected explicitly.

use crate::record::RecordShape;
use crate::types::{ScalarKind, TypeInfo, TypeKind};

/// Whether values of this type are copied directly.
///
/// True for every scalar (numbers, bool, char, decimal, text and the
/// date/time scalars) and for an array of text. `Option<T>` follows `T`.
pub fn is_simple(ty: &TypeInfo) -> bool {
    match ty.kind() {
        TypeKind::Scalar(_) => true,
        TypeKind::Optional(inner) => is_simple(inner),
        TypeKind::Array(element) => {
            matches!(element.kind(), TypeKind::Scalar(ScalarKind::String))
        }
        TypeKind::Sequence(_) | TypeKind::Record(_) => false,
    }
}

/// Whether values of this type need recursive mapping.
pub fn is_complex(ty: &TypeInfo) -> bool {
    !is_simple(ty)
}

/// Whether the type is iterated element by element.
pub fn is_enumerable(ty: &TypeInfo) -> bool {
    match ty.kind() {
        TypeKind::Array(_) | TypeKind::Sequence(_) => true,
        TypeKind::Optional(inner) => is_enumerable(inner),
        TypeKind::Scalar(_) | TypeKind::Record(_) => false,
    }
}

/// Whether the type is an enumerable that is not an array.
pub fn is_non_array_enumerable(ty: &TypeInfo) -> bool {
    matches!(ty.unwrap_optional().kind(), TypeKind::Sequence(_))
}

/// Shape of a complex, non-enumerable type: the records the engine
/// descends into automatically.
pub fn descent_shape(ty: &TypeInfo) -> Option<&'static RecordShape> {
    if is_simple(ty) || is_enumerable(ty) {
        return None;
    }
    ty.as_record()
}
