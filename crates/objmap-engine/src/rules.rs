//! Mapping rules and the rule registry
//!
//! A rule is compiled once at registration. Property rules whose source type
//! can be stored in the target property by a single assignment become
//! direct rules; the rest fall back to non-direct rules that read, transform
//! and write separately. Custom rules run a caller function verbatim.

use crate::cache::AccessorCache;
use crate::path::{Access, PropertyPath, ResolvedPath};
use crate::{Error, Result};
use dashmap::DashMap;
use objmap_reflect::record::{downcast_mut, downcast_ref};
use objmap_reflect::{DynRecord, Record, Reflect, TypeInfo, TypeKind, Value};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Skip predicate over the source instance
pub type Predicate = Arc<dyn Fn(&dyn DynRecord) -> Result<bool> + Send + Sync>;

/// Compiled `target.property := source.property`
pub type Assignment = Arc<dyn Fn(&dyn DynRecord, &mut dyn DynRecord) -> Result<()> + Send + Sync>;

/// Caller-supplied `(source, target)` function
pub type Action = Arc<dyn Fn(&dyn DynRecord, &mut dyn DynRecord) -> Result<()> + Send + Sync>;

/// Reads a source value
pub type SourceReader = Arc<dyn Fn(&dyn DynRecord) -> Result<Value> + Send + Sync>;

/// Source side of a property rule
pub enum SourceExpr<S> {
    /// Dotted property path on `S`
    Path(String),
    /// Computed value with its declared type
    Computed {
        reader: Arc<dyn Fn(&S) -> Value + Send + Sync>,
        ty: TypeInfo,
    },
}

impl<S> From<&str> for SourceExpr<S> {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl<S> From<String> for SourceExpr<S> {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl<S> fmt::Debug for SourceExpr<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceExpr::Path(path) => f.debug_tuple("Path").field(path).finish(),
            SourceExpr::Computed { ty, .. } => f.debug_struct("Computed").field("ty", ty).finish(),
        }
    }
}

/// Source expression computing a value from the whole source instance.
///
/// ```
/// use objmap_engine::{SourceExpr, computed, record};
///
/// #[derive(Debug, Default, Clone)]
/// struct Order { quantity: u32, unit_price: f64 }
/// record!(Order { quantity: u32, unit_price: f64 });
///
/// let total: SourceExpr<Order> = computed(|o: &Order| o.unit_price * f64::from(o.quantity));
/// ```
pub fn computed<S, V, F>(reader: F) -> SourceExpr<S>
where
    S: Record,
    V: Reflect,
    F: Fn(&S) -> V + Send + Sync + 'static,
{
    SourceExpr::Computed {
        reader: Arc::new(move |source: &S| reader(source).to_value()),
        ty: V::type_info(),
    }
}

/// Compiled source side of a non-direct rule
#[derive(Clone)]
pub enum CompiledSource {
    Path(ResolvedPath),
    Computed {
        reader: SourceReader,
        ty: TypeInfo,
    },
}

impl CompiledSource {
    fn compile<S: Record>(expr: SourceExpr<S>, cache: &AccessorCache) -> Result<Self> {
        match expr {
            SourceExpr::Path(path) => {
                let path = PropertyPath::parse(&path)?;
                let resolved = ResolvedPath::resolve(&S::type_info(), &path, cache, Access::Read)?;
                Ok(Self::Path(resolved))
            }
            SourceExpr::Computed { reader, ty } => Ok(Self::Computed {
                reader: Arc::new(move |source: &dyn DynRecord| {
                    let source = downcast_ref::<S>(source)?;
                    Ok(reader(source))
                }),
                ty,
            }),
        }
    }

    pub fn read(&self, source: &dyn DynRecord) -> Result<Value> {
        match self {
            CompiledSource::Path(path) => path.read(source),
            CompiledSource::Computed { reader, .. } => reader(source),
        }
    }

    /// Declared type of the value read
    pub fn value_type(&self) -> &TypeInfo {
        match self {
            CompiledSource::Path(path) => path.value_type(),
            CompiledSource::Computed { ty, .. } => ty,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CompiledSource::Path(path) => path.path().to_string(),
            CompiledSource::Computed { ty, .. } => format!("<computed {}>", ty),
        }
    }
}

/// What a rule does when it runs
#[derive(Clone)]
pub enum RuleAction {
    /// Single compiled assignment
    Direct(Assignment),
    /// Separate read, transform and write, with both declared types kept for
    /// array element resolution
    Indirect {
        source: CompiledSource,
        target: ResolvedPath,
    },
    /// Caller function, never subject to array handling
    Custom(Action),
}

/// One registered correspondence between a source and a target type
pub struct MappingRule {
    source_type: TypeInfo,
    target_type: TypeInfo,
    description: String,
    skip: Option<Predicate>,
    action: RuleAction,
}

impl MappingRule {
    /// Compile a property rule.
    ///
    /// # Errors
    ///
    /// Fails when either expression does not resolve, or when the declared
    /// types can be neither assigned directly nor mapped by a non-direct
    /// rule.
    pub fn property<S: Record, T: Record>(
        source: SourceExpr<S>,
        target: &str,
        skip: Option<Predicate>,
        cache: &AccessorCache,
    ) -> Result<Self> {
        let source_type = S::type_info();
        let target_type = T::type_info();

        let target_path = PropertyPath::parse(target)?;
        let target = ResolvedPath::resolve(&target_type, &target_path, cache, Access::Write)?;
        let source = CompiledSource::compile(source, cache)?;

        let from = source.value_type().clone();
        let to = target.value_type().clone();

        if from.is_assignable_to(&to) {
            let description = format!("{} -> {} (direct)", source.describe(), target.path());
            debug!("Compiled direct rule {} for {} -> {}", description, source_type, target_type);

            let nullable = to.is_optional();
            let (source_name, target_name) = (source_type.name(), target_type.name());
            let assignment: Assignment = Arc::new(
                move |from_record: &dyn DynRecord, to_record: &mut dyn DynRecord| {
                    let value = source.read(from_record)?;
                    if value.is_null() && !nullable {
                        return Err(Error::null_source_property(
                            source_name,
                            target_name,
                            source.describe(),
                        ));
                    }
                    target.write(to_record, value)
                },
            );

            return Ok(Self {
                source_type,
                target_type,
                description,
                skip,
                action: RuleAction::Direct(assignment),
            });
        }

        check_fallback(&source_type, &target_type, &source, &target)?;

        let description = format!("{} -> {} (non-direct)", source.describe(), target.path());
        debug!(
            "Falling back to non-direct rule {} for {} -> {}: {} is not assignable to {}",
            description, source_type, target_type, from, to
        );

        Ok(Self {
            source_type,
            target_type,
            description,
            skip,
            action: RuleAction::Indirect { source, target },
        })
    }

    /// Wrap a caller function as an unconditional custom rule.
    pub fn custom<S, T, F>(action: F) -> Self
    where
        S: Record,
        T: Record,
        F: Fn(&S, &mut T) + Send + Sync + 'static,
    {
        let source_type = S::type_info();
        let target_type = T::type_info();
        let description = format!("custom action {} -> {}", source_type, target_type);

        let action: Action = Arc::new(move |source: &dyn DynRecord, target: &mut dyn DynRecord| {
            let source = downcast_ref::<S>(source)?;
            let target = downcast_mut::<T>(target)?;
            action(source, target);
            Ok(())
        });

        Self {
            source_type,
            target_type,
            description,
            skip: None,
            action: RuleAction::Custom(action),
        }
    }

    pub fn source_type(&self) -> &TypeInfo {
        &self.source_type
    }

    pub fn target_type(&self) -> &TypeInfo {
        &self.target_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.action, RuleAction::Direct(_))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.action, RuleAction::Custom(_))
    }

    /// The (target, source) record pair a non-direct rule maps when it
    /// runs: the record types behind both sides, or behind their array
    /// elements.
    pub fn nested_pair(&self) -> Option<(TypeInfo, TypeInfo)> {
        let RuleAction::Indirect { source, target } = &self.action else {
            return None;
        };
        let (from, to) = (source.value_type(), target.value_type());
        match (from.record_type(), to.record_type()) {
            (Some(from), Some(to)) => Some((to, from)),
            _ => Some((to.element()?.record_type()?, from.element()?.record_type()?)),
        }
    }

    /// Whether the skip predicate holds for `source`. Custom rules never skip.
    ///
    /// # Errors
    ///
    /// Returns an error when `source` is not of the rule's source type.
    pub fn should_skip(&self, source: &dyn DynRecord) -> Result<bool> {
        match &self.skip {
            Some(predicate) if !self.is_custom() => predicate(source),
            _ => Ok(false),
        }
    }
}

impl fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRule")
            .field("source_type", &self.source_type.name())
            .field("target_type", &self.target_type.name())
            .field("description", &self.description)
            .field("has_skip", &self.skip.is_some())
            .finish()
    }
}

/// Typed skip predicate as a [`Predicate`]
pub fn predicate<S: Record>(skip: impl Fn(&S) -> bool + Send + Sync + 'static) -> Predicate {
    Arc::new(move |source: &dyn DynRecord| Ok(skip(downcast_ref::<S>(source)?)))
}

/// Check that a non-assignable pair can still be mapped by reading,
/// transforming and writing.
fn check_fallback(
    source_type: &TypeInfo,
    target_type: &TypeInfo,
    source: &CompiledSource,
    target: &ResolvedPath,
) -> Result<()> {
    let from = source.value_type();
    let to = target.value_type();
    let incompatible = |reason: String| -> Result<()> {
        Err(Error::incompatible(source_type.name(), target_type.name(), reason))
    };

    match (from.unwrap_optional().kind(), to.unwrap_optional().kind()) {
        (_, TypeKind::Sequence(_)) => Err(Error::unsupported_collection(
            to.name(),
            target.path().to_string(),
        )),
        (
            TypeKind::Array(from_element) | TypeKind::Sequence(from_element),
            TypeKind::Array(to_element),
        ) => {
            if elements_map(from_element, to_element) {
                Ok(())
            } else {
                incompatible(format!(
                    "elements of {} cannot be mapped to elements of {}",
                    from, to
                ))
            }
        }
        (TypeKind::Record(_), TypeKind::Record(_)) => Ok(()),
        (TypeKind::Scalar(from_kind), TypeKind::Scalar(to_kind))
            if from_kind.widens_to(*to_kind) =>
        {
            Ok(())
        }
        _ => incompatible(format!(
            "{} '{}' cannot be converted to {} '{}'",
            from,
            source.describe(),
            to,
            target.path()
        )),
    }
}

fn elements_map(from: &TypeInfo, to: &TypeInfo) -> bool {
    match (from.unwrap_optional().kind(), to.unwrap_optional().kind()) {
        (TypeKind::Record(_), TypeKind::Record(_)) => true,
        (TypeKind::Scalar(from_kind), TypeKind::Scalar(to_kind)) => from_kind.widens_to(*to_kind),
        _ => false,
    }
}

/// Key of a rule sequence: (target type, source type)
pub type RuleKey = (TypeId, TypeId);

/// Ordered rules registered for one (target, source) pair
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub target: TypeInfo,
    pub source: TypeInfo,
    pub rules: Vec<Arc<MappingRule>>,
}

/// Concurrent registry of rule sequences
#[derive(Debug, Default)]
pub struct RuleRegistry {
    sets: DashMap<RuleKey, RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to its pair's sequence, creating the sequence if needed.
    pub fn add(&self, rule: MappingRule) {
        let key = (rule.target_type.id(), rule.source_type.id());
        self.sets
            .entry(key)
            .or_insert_with(|| RuleSet {
                target: rule.target_type.clone(),
                source: rule.source_type.clone(),
                rules: Vec::new(),
            })
            .rules
            .push(Arc::new(rule));
    }

    /// Snapshot of the rules for one pair, in registration order.
    #[must_use]
    pub fn rules_for(&self, target: &TypeInfo, source: &TypeInfo) -> Vec<Arc<MappingRule>> {
        self.sets
            .get(&(target.id(), source.id()))
            .map(|set| set.rules.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, target: &TypeInfo, source: &TypeInfo) -> bool {
        self.sets.contains_key(&(target.id(), source.id()))
    }

    /// Every registered (target, source) pair
    #[must_use]
    pub fn pairs(&self) -> Vec<(TypeInfo, TypeInfo)> {
        self.sets
            .iter()
            .map(|entry| (entry.target.clone(), entry.source.clone()))
            .collect()
    }

    /// Nested (target, source) pairs mapped by the registered rules
    #[must_use]
    pub fn nested_pairs(&self) -> Vec<(TypeInfo, TypeInfo)> {
        self.sets
            .iter()
            .flat_map(|entry| {
                entry
                    .rules
                    .iter()
                    .filter_map(|rule| rule.nested_pair())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[must_use]
    pub fn rule_count(&self, target: &TypeInfo, source: &TypeInfo) -> usize {
        self.sets
            .get(&(target.id(), source.id()))
            .map_or(0, |set| set.rules.len())
    }

    /// Number of registered pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
