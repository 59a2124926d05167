//! Property paths
//!
//! A rule names its source and target properties with dotted paths such as
//! `"customer.address.city"`. A path is resolved once, at registration,
//! against the shape of its root type; the resolved form holds the cached
//! thunks for every step so that reads and writes never look anything up.

use crate::cache::AccessorCache;
use crate::invoker::{AccessorKind, Constructor, Getter, Setter};
use crate::{Error, Result};
use objmap_reflect::{DynRecord, PropertyInfo, TypeInfo, Value};
use std::fmt;
use std::str::FromStr;

/// A parsed dotted property path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parse a dotted path.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` for an empty path or an empty segment.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Err(Error::invalid_path(path, "empty path"));
        }

        let segments = path
            .split('.')
            .map(|segment| {
                let segment = segment.trim();
                if segment.is_empty() {
                    Err(Error::invalid_path(path, "empty segment"))
                } else {
                    Ok(segment.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// Build a path from already split segments.
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// What a resolved path will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One property hop of a resolved path
#[derive(Clone)]
struct PathStep {
    owner: TypeInfo,
    property: &'static PropertyInfo,
    /// Declared type of the property
    ty: TypeInfo,
    getter: Option<Getter>,
    setter: Option<Setter>,
    /// Builds a fresh intermediate record when the current one is null
    constructor: Option<Constructor>,
}

impl PathStep {
    fn getter(&self) -> Result<&Getter> {
        self.getter.as_ref().ok_or_else(|| {
            Error::missing_accessor(self.owner.name(), self.property.name, AccessorKind::Getter)
        })
    }

    fn setter(&self) -> Result<&Setter> {
        self.setter.as_ref().ok_or_else(|| {
            Error::missing_accessor(self.owner.name(), self.property.name, AccessorKind::Setter)
        })
    }

    fn constructor(&self) -> Result<&Constructor> {
        self.constructor.as_ref().ok_or_else(|| {
            Error::missing_accessor(self.ty.name(), "new", AccessorKind::Constructor)
        })
    }
}

/// A property path compiled against a root type
#[derive(Clone)]
pub struct ResolvedPath {
    path: PropertyPath,
    root: TypeInfo,
    steps: Vec<PathStep>,
}

impl ResolvedPath {
    /// Resolve `path` against `root`, fetching the thunks `access` needs
    /// from `cache`.
    ///
    /// Reading needs a getter on every step. Writing needs a setter on every
    /// step plus a getter and a constructor on every intermediate record,
    /// since nested records are read out, updated and written back.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownProperty` for a name the shape does not have,
    /// `Error::InvalidPath` when a hop goes through a non-record, and
    /// `Error::MissingAccessor` when a required accessor is absent.
    pub fn resolve(
        root: &TypeInfo,
        path: &PropertyPath,
        cache: &AccessorCache,
        access: Access,
    ) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::invalid_path(path.to_string(), "empty path"));
        }

        let mut steps = Vec::with_capacity(path.len());
        let mut owner = root.clone();

        for (index, segment) in path.segments().iter().enumerate() {
            let last = index + 1 == path.len();

            let shape = owner.as_record().ok_or_else(|| {
                Error::invalid_path(
                    path.to_string(),
                    format!("'{}' is reached through {}, which is not a record", segment, owner),
                )
            })?;
            let property = shape
                .property(segment)
                .ok_or_else(|| Error::unknown_property(owner.name(), segment.as_str()))?;

            // Records are reached through their own descriptor, not the
            // optional wrapper around them.
            let owner_record = owner.record_type().unwrap_or_else(|| owner.clone());
            let ty = property.type_info();

            let getter = match (access, last) {
                (Access::Read, _) | (Access::Write, false) => {
                    Some(cache.getter(&owner_record, property)?)
                }
                (Access::Write, true) => cache.getter(&owner_record, property).ok(),
            };
            let setter = match access {
                Access::Write => Some(cache.setter(&owner_record, property)?),
                Access::Read => None,
            };
            let constructor = match (access, last) {
                (Access::Write, false) => match ty.record_type() {
                    Some(record) => Some(cache.constructor(&record)?),
                    None => None,
                },
                _ => None,
            };

            steps.push(PathStep {
                owner: owner_record,
                property,
                ty: ty.clone(),
                getter,
                setter,
                constructor,
            });
            owner = ty;
        }

        Ok(Self {
            path: path.clone(),
            root: root.clone(),
            steps,
        })
    }

    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    pub fn root(&self) -> &TypeInfo {
        &self.root
    }

    /// Declared type of the last property
    pub fn value_type(&self) -> &TypeInfo {
        // resolve() never produces an empty step list
        match self.steps.last() {
            Some(step) => &step.ty,
            None => &self.root,
        }
    }

    /// Whether every hop has a getter
    pub fn is_readable(&self) -> bool {
        self.steps.iter().all(|step| step.getter.is_some())
    }

    /// Declared types of every hop, outermost first
    pub fn step_types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.steps.iter().map(|step| &step.ty)
    }

    /// Read the value at the end of the path.
    ///
    /// A null intermediate yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Propagates accessor failures.
    pub fn read(&self, root: &dyn DynRecord) -> Result<Value> {
        let Some((last, intermediates)) = self.steps.split_last() else {
            return Err(Error::invalid_path(self.path.to_string(), "empty path"));
        };

        let mut holder: Option<Box<dyn DynRecord>> = None;
        for step in intermediates {
            let receiver: &dyn DynRecord = match &holder {
                Some(record) => record.as_ref(),
                None => root,
            };
            match (step.getter()?)(receiver)? {
                Value::Null => return Ok(Value::Null),
                Value::Record(record) => holder = Some(record),
                other => {
                    return Err(Error::invalid_path(
                        self.path.to_string(),
                        format!("'{}' holds a {} value", step.property.name, other.kind_name()),
                    ));
                }
            }
        }

        let receiver: &dyn DynRecord = match &holder {
            Some(record) => record.as_ref(),
            None => root,
        };
        (last.getter()?)(receiver)
    }

    /// Write `value` at the end of the path, converting it to the declared
    /// type of the last property. Null intermediates are constructed.
    ///
    /// # Errors
    ///
    /// Propagates accessor and conversion failures.
    pub fn write(&self, root: &mut dyn DynRecord, value: Value) -> Result<()> {
        self.write_steps(&self.steps, root, value)
    }

    fn write_steps(
        &self,
        steps: &[PathStep],
        receiver: &mut dyn DynRecord,
        value: Value,
    ) -> Result<()> {
        let Some((step, rest)) = steps.split_first() else {
            return Ok(());
        };

        if rest.is_empty() {
            let value = value
                .coerce_to(&step.ty)
                .map_err(|e| Error::property(step.owner.name(), step.property.name, e))?;
            return (step.setter()?)(receiver, value);
        }

        let mut nested = match (step.getter()?)(&*receiver)? {
            Value::Record(record) => record,
            Value::Null => (step.constructor()?)(),
            other => {
                return Err(Error::invalid_path(
                    self.path.to_string(),
                    format!("'{}' holds a {} value", step.property.name, other.kind_name()),
                ));
            }
        };
        self.write_steps(rest, nested.as_mut(), value)?;
        (step.setter()?)(receiver, Value::Record(nested))
    }
}

impl fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("root", &self.root.name())
            .field("path", &self.path.to_string())
            .field("value_type", &self.value_type().name())
            .finish()
    }
}
