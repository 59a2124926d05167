//! Mapping engine
//!
//! Maps a source record into a target record:
//!
//! 1. instantiate the target (or reuse the one supplied), asking the factory
//!    collaborator first;
//! 2. descend into every nested record property of the target, mapping the
//!    source itself into it and, when flattening finds one, the nested
//!    source value registered for it;
//! 3. apply the rules registered for the exact (target, source) pair in
//!    registration order.

use crate::cache::{AccessorCache, CacheStats};
use crate::config::{CyclePolicy, MapperConfig};
use crate::factory::FactoryProvider;
use crate::flatten::{self, FlattenPlan};
use crate::path::ResolvedPath;
use crate::rules::{self, CompiledSource, MappingRule, RuleAction, RuleRegistry, SourceExpr};
use crate::{Error, Result};
use dashmap::DashMap;
use objmap_reflect::classify;
use objmap_reflect::record::downcast_record;
use objmap_reflect::{DynRecord, PropertyInfo, Record, TypeInfo, Value};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, trace};

/// Rules and caches that are dropped together by [`Mapper::clear_maps`]
#[derive(Default)]
pub(crate) struct MapperState {
    rules: RuleRegistry,
    /// Bumped after every rule registration
    generation: AtomicU64,
    cache: AccessorCache,
    /// Plans tagged with the generation they were resolved at
    flatten_plans: DashMap<(TypeId, TypeId), (u64, Arc<FlattenPlan>)>,
}

/// Per-call mapping state threaded through recursive calls
pub struct MapContext<'a> {
    state: Arc<MapperState>,
    factory: Option<&'a dyn FactoryProvider>,
    /// (target, source) pairs being mapped, outermost first
    stack: Vec<(TypeId, TypeId)>,
}

impl<'a> MapContext<'a> {
    fn new(state: Arc<MapperState>, factory: Option<&'a dyn FactoryProvider>) -> Self {
        Self {
            state,
            factory,
            stack: Vec::new(),
        }
    }

    /// Number of nested mapping calls in progress
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn factory(&self) -> Option<&'a dyn FactoryProvider> {
        self.factory
    }

    fn is_active(&self, target: &TypeInfo, source: &TypeInfo) -> bool {
        self.stack.contains(&(target.id(), source.id()))
    }

    fn push(&mut self, target: &TypeInfo, source: &TypeInfo) {
        self.stack.push((target.id(), source.id()));
    }

    fn pop(&mut self) {
        self.stack.pop();
    }
}

impl fmt::Debug for MapContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapContext")
            .field("depth", &self.depth())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Target property the engine descends into
struct Slot<'p> {
    owner: &'p TypeInfo,
    property: &'static PropertyInfo,
    /// Record type of the property
    ty: TypeInfo,
}

/// Object-graph mapping engine
///
/// Each mapper owns its rules and caches; mappers never share state.
///
/// ```
/// use objmap_engine::{Mapper, record};
///
/// #[derive(Debug, Default, Clone)]
/// struct Row { id: i32, title: String }
/// #[derive(Debug, Default, Clone)]
/// struct Card { id: i64, heading: String }
///
/// record!(Row { id: i32, title: String });
/// record!(Card { id: i64, heading: String });
///
/// let mapper = Mapper::new();
/// mapper
///     .add_map::<Row, Card>("id", "id")?
///     .add_map::<Row, Card>("title", "heading")?;
///
/// let card: Card = mapper.map(&Row { id: 7, title: "hello".into() }, None, None)?;
/// assert_eq!(card.id, 7);
/// assert_eq!(card.heading, "hello");
/// # Ok::<(), objmap_engine::Error>(())
/// ```
pub struct Mapper {
    config: MapperConfig,
    state: RwLock<Arc<MapperState>>,
}

impl Mapper {
    /// Create a mapper with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MapperConfig::default(),
            state: RwLock::new(Arc::default()),
        }
    }

    /// Create a mapper with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the configuration is invalid.
    pub fn with_config(config: MapperConfig) -> Result<Self> {
        Ok(Self {
            config: config.validate()?,
            state: RwLock::new(Arc::default()),
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    fn state(&self) -> Result<Arc<MapperState>> {
        self.state
            .read()
            .map(|state| Arc::clone(&state))
            .map_err(|_| Error::LockPoisoned)
    }

    /// Register `target := source` for mapping `S` into `T`.
    ///
    /// `source` is a property path on `S` or a [`computed`](crate::computed)
    /// value; `target` is a property path on `T`.
    ///
    /// # Errors
    ///
    /// Fails when a path does not resolve, when the pair cannot be mapped
    /// at all, or when the registration makes flattening ambiguous.
    pub fn add_map<S: Record, T: Record>(
        &self,
        source: impl Into<SourceExpr<S>>,
        target: &str,
    ) -> Result<&Self> {
        let state = self.state()?;
        let rule = MappingRule::property::<S, T>(source.into(), target, None, &state.cache)?;
        self.register(&state, rule)?;
        Ok(self)
    }

    /// Like [`add_map`](Self::add_map), but the rule is skipped for sources
    /// on which `skip` holds, leaving the target's value as it was.
    ///
    /// # Errors
    ///
    /// See [`add_map`](Self::add_map).
    pub fn add_map_when<S: Record, T: Record>(
        &self,
        source: impl Into<SourceExpr<S>>,
        target: &str,
        skip: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Result<&Self> {
        let state = self.state()?;
        let skip = rules::predicate(skip);
        let rule = MappingRule::property::<S, T>(source.into(), target, Some(skip), &state.cache)?;
        self.register(&state, rule)?;
        Ok(self)
    }

    /// Register an unconditional custom action for mapping `S` into `T`.
    ///
    /// # Errors
    ///
    /// Fails when the registration makes flattening ambiguous.
    pub fn add_action<S: Record, T: Record>(
        &self,
        action: impl Fn(&S, &mut T) + Send + Sync + 'static,
    ) -> Result<&Self> {
        let state = self.state()?;
        self.register(&state, MappingRule::custom(action))?;
        Ok(self)
    }

    fn register(&self, state: &MapperState, rule: MappingRule) -> Result<()> {
        let target = rule.target_type().clone();
        let source = rule.source_type().clone();

        // A new pair can make flattening ambiguous for any pair a mapping
        // reaches; a new nested pair can make more pairs reachable
        let nested = rule.nested_pair();
        if self.config.flattening && (!state.rules.contains(&target, &source) || nested.is_some())
        {
            let mut seeds = state.rules.pairs();
            seeds.extend(state.rules.nested_pairs());
            seeds.push((target.clone(), source.clone()));
            seeds.extend(nested);
            let has_rules = |t: &TypeInfo, s: &TypeInfo| {
                (*t == target && *s == source) || state.rules.contains(t, s)
            };
            flatten::check_ambiguity(seeds, self.config.max_flatten_depth, &has_rules)?;
        }

        debug!("Registered rule {} for {} -> {}", rule.description(), source, target);
        state.rules.add(rule);
        state.generation.fetch_add(1, Ordering::SeqCst);
        state.flatten_plans.clear();
        Ok(())
    }

    /// Drop every rule and cached thunk.
    ///
    /// Lookups see either the old state or the new one, never a mix.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockPoisoned` if the state lock is poisoned.
    pub fn clear_maps(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Error::LockPoisoned)?;
        *state = Arc::default();
        info!("Cleared all mapping rules and accessor caches");
        Ok(())
    }

    /// Number of rules registered for mapping `S` into `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::LockPoisoned` if the state lock is poisoned.
    pub fn rule_count<S: Record, T: Record>(&self) -> Result<usize> {
        Ok(self.state()?.rules.rule_count(&T::type_info(), &S::type_info()))
    }

    /// Whether any rule is registered for mapping `S` into `T`
    ///
    /// # Errors
    ///
    /// Returns `Error::LockPoisoned` if the state lock is poisoned.
    pub fn has_map<S: Record, T: Record>(&self) -> Result<bool> {
        Ok(self.state()?.rules.contains(&T::type_info(), &S::type_info()))
    }

    /// Accessor cache counters
    ///
    /// # Errors
    ///
    /// Returns `Error::LockPoisoned` if the state lock is poisoned.
    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.state()?.cache.stats())
    }

    /// Map `source` into `target`, or into a new `T` when `target` is `None`.
    ///
    /// A new target comes from `factory` when it has one registered for `T`,
    /// otherwise from `T`'s default constructor.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by instantiation, descent or a rule.
    pub fn map<S: Record, T: Record>(
        &self,
        source: &S,
        target: Option<T>,
        factory: Option<&dyn FactoryProvider>,
    ) -> Result<T> {
        let mut context = MapContext::new(self.state()?, factory);
        let existing = target.map(|target| Box::new(target) as Box<dyn DynRecord>);
        let mapped = self.map_dynamic(
            source,
            &S::type_info(),
            existing,
            &T::type_info(),
            &mut context,
        )?;
        Ok(downcast_record::<T>(mapped)?)
    }

    /// Dynamic form of [`map`](Self::map), used by the cached entry points.
    ///
    /// # Errors
    ///
    /// Returns `Error::DepthExceeded` past the configured nesting limit, and
    /// otherwise the errors of [`map`](Self::map).
    pub fn map_dynamic(
        &self,
        source: &dyn DynRecord,
        source_type: &TypeInfo,
        existing: Option<Box<dyn DynRecord>>,
        target_type: &TypeInfo,
        context: &mut MapContext<'_>,
    ) -> Result<Box<dyn DynRecord>> {
        if context.depth() >= self.config.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.config.max_depth,
            });
        }

        context.push(target_type, source_type);
        let result = self.map_frame(source, source_type, existing, target_type, context);
        context.pop();
        result
    }

    fn map_frame(
        &self,
        source: &dyn DynRecord,
        source_type: &TypeInfo,
        existing: Option<Box<dyn DynRecord>>,
        target_type: &TypeInfo,
        context: &mut MapContext<'_>,
    ) -> Result<Box<dyn DynRecord>> {
        let mut target = match existing {
            Some(target) => target,
            None => self.instantiate(target_type, context)?,
        };

        self.descend(source, source_type, target.as_mut(), target_type, context)?;

        let rules = context.state.rules.rules_for(target_type, source_type);
        for rule in &rules {
            self.apply_rule(rule, source, target.as_mut(), context)?;
        }

        Ok(target)
    }

    fn instantiate(
        &self,
        target_type: &TypeInfo,
        context: &MapContext<'_>,
    ) -> Result<Box<dyn DynRecord>> {
        let supplied = context
            .factory
            .and_then(|factory| factory.try_create(target_type.name()));

        if let Some(instance) = supplied {
            let found = instance.record_type_info();
            if found != *target_type {
                return Err(Error::FactoryResolution {
                    expected: target_type.name().to_string(),
                    found: found.name().to_string(),
                });
            }
            trace!("Factory supplied instance of {}", target_type);
            return Ok(instance);
        }

        let construct = context.state.cache.constructor(target_type)?;
        Ok(construct())
    }

    fn descend(
        &self,
        source: &dyn DynRecord,
        source_type: &TypeInfo,
        target: &mut dyn DynRecord,
        target_type: &TypeInfo,
        context: &mut MapContext<'_>,
    ) -> Result<()> {
        let Some(shape) = target_type.as_record() else {
            return Ok(());
        };

        let plan = if self.config.flattening {
            Some(self.flatten_plan(target_type, source_type, &context.state)?)
        } else {
            None
        };

        for property in shape.properties {
            let Some(ty) = flatten::descent_target(property) else {
                continue;
            };
            let slot = Slot {
                owner: target_type,
                property,
                ty,
            };

            self.descend_into(source, source_type, target, &slot, context)?;

            let Some(entry) = plan.as_ref().and_then(|plan| plan.entry(property.name)) else {
                continue;
            };
            if let Value::Record(nested) = entry.source_path.read(source)? {
                self.descend_into(nested.as_ref(), &entry.source_type, target, &slot, context)?;
            }
        }

        Ok(())
    }

    fn descend_into(
        &self,
        source: &dyn DynRecord,
        source_type: &TypeInfo,
        target: &mut dyn DynRecord,
        slot: &Slot<'_>,
        context: &mut MapContext<'_>,
    ) -> Result<()> {
        if context.is_active(&slot.ty, source_type) {
            return match self.config.cycle_policy {
                CyclePolicy::Skip => {
                    trace!(
                        "Skipping cyclic descent into {}::{} from {}",
                        slot.owner,
                        slot.property.name,
                        source_type
                    );
                    Ok(())
                }
                CyclePolicy::Fail => Err(Error::CyclicDescent {
                    source_type: source_type.name().to_string(),
                    target_type: slot.ty.name().to_string(),
                }),
            };
        }

        let state = Arc::clone(&context.state);
        let existing = if slot.property.is_readable() {
            (state.cache.getter(slot.owner, slot.property)?)(&*target)?.into_record()
        } else {
            None
        };

        let entry = state.cache.entry_point(source_type, &slot.ty);
        let mapped = entry(self, source, existing, context)?;
        (state.cache.setter(slot.owner, slot.property)?)(target, Value::Record(mapped))
    }

    fn flatten_plan(
        &self,
        target_type: &TypeInfo,
        source_type: &TypeInfo,
        state: &MapperState,
    ) -> Result<Arc<FlattenPlan>> {
        let key = (target_type.id(), source_type.id());
        // Read before resolving: rules added later bump it past this value
        let generation = state.generation.load(Ordering::SeqCst);
        if let Some(entry) = state.flatten_plans.get(&key) {
            let (built_at, plan) = entry.value();
            if *built_at == generation {
                return Ok(Arc::clone(plan));
            }
        }

        let has_rules = |t: &TypeInfo, s: &TypeInfo| state.rules.contains(t, s);
        let plan = Arc::new(flatten::resolve_plan(
            target_type,
            source_type,
            self.config.max_flatten_depth,
            &has_rules,
            &state.cache,
        )?);

        // Never replace a plan resolved at a later generation
        state
            .flatten_plans
            .entry(key)
            .and_modify(|(built_at, cached)| {
                if *built_at < generation {
                    *built_at = generation;
                    *cached = Arc::clone(&plan);
                }
            })
            .or_insert_with(|| (generation, Arc::clone(&plan)));
        Ok(plan)
    }

    fn apply_rule(
        &self,
        rule: &MappingRule,
        source: &dyn DynRecord,
        target: &mut dyn DynRecord,
        context: &mut MapContext<'_>,
    ) -> Result<()> {
        if rule.should_skip(source)? {
            trace!("Skipping rule {}", rule.description());
            return Ok(());
        }

        match rule.action() {
            RuleAction::Direct(assign) => assign(source, target),
            RuleAction::Custom(action) => action(source, target),
            RuleAction::Indirect {
                source: read,
                target: write,
            } => self.apply_indirect(rule, read, write, source, target, context),
        }
    }

    fn apply_indirect(
        &self,
        rule: &MappingRule,
        read: &CompiledSource,
        write: &ResolvedPath,
        source: &dyn DynRecord,
        target: &mut dyn DynRecord,
        context: &mut MapContext<'_>,
    ) -> Result<()> {
        let declared = write.value_type();

        match read.read(source)? {
            Value::Null => Err(Error::null_source_property(
                rule.source_type().name(),
                rule.target_type().name(),
                read.describe(),
            )),
            Value::Sequence(_) => Err(Error::unsupported_collection(
                read.value_type().name(),
                read.describe(),
            )),
            Value::Array(items) => {
                let element = declared.element().cloned().ok_or_else(|| {
                    Error::incompatible(
                        rule.source_type().name(),
                        rule.target_type().name(),
                        format!("'{}' is not an array", write.path()),
                    )
                })?;

                let present = items.iter().filter(|item| !item.is_null()).count();
                let mut mapped = Vec::with_capacity(present);
                for item in items.into_iter().filter(|item| !item.is_null()) {
                    mapped.push(self.map_element(item, &element, context)?);
                }
                write.write(target, Value::Array(mapped))
            }
            Value::Record(nested) => {
                let target_record = declared.record_type().ok_or_else(|| {
                    Error::incompatible(
                        rule.source_type().name(),
                        rule.target_type().name(),
                        format!("'{}' is not a record", write.path()),
                    )
                })?;
                let existing = if write.is_readable() {
                    write.read(&*target)?.into_record()
                } else {
                    None
                };

                let entry = context
                    .state
                    .cache
                    .entry_point(&nested.record_type_info(), &target_record);
                let mapped = entry(self, nested.as_ref(), existing, context)?;
                write.write(target, Value::Record(mapped))
            }
            scalar => write.write(target, scalar),
        }
    }

    /// Map one array element into a fresh instance of the element type.
    fn map_element(
        &self,
        item: Value,
        element: &TypeInfo,
        context: &mut MapContext<'_>,
    ) -> Result<Value> {
        match item {
            Value::Record(record) => {
                let target = element.record_type().ok_or_else(|| {
                    Error::incompatible(
                        record.record_type_info().name(),
                        element.name(),
                        "record element into a non-record array",
                    )
                })?;
                let entry = context
                    .state
                    .cache
                    .entry_point(&record.record_type_info(), &target);
                entry(self, record.as_ref(), None, context).map(Value::Record)
            }
            scalar => Ok(scalar.coerce_to(element)?),
        }
    }

    /// Copy every simple property whose name and declared type match between
    /// `S` and `T`. Rules, predicates and custom actions are not consulted.
    ///
    /// # Errors
    ///
    /// Propagates accessor failures.
    pub fn auto_map<S: Record, T: Record>(&self, source: &S, target: Option<T>) -> Result<T> {
        let state = self.state()?;
        let source_type = S::type_info();
        let target_type = T::type_info();
        let source: &dyn DynRecord = source;

        let mut target: Box<dyn DynRecord> = match target {
            Some(target) => Box::new(target),
            None => (state.cache.constructor(&target_type)?)(),
        };

        for property in T::shape().properties {
            let ty = property.type_info();
            if !classify::is_simple(&ty) || !property.is_writable() {
                continue;
            }
            let Some(source_property) = S::shape().property(property.name) else {
                continue;
            };
            if source_property.type_info() != ty || !source_property.is_readable() {
                continue;
            }

            let value = (state.cache.getter(&source_type, source_property)?)(source)?;
            (state.cache.setter(&target_type, property)?)(target.as_mut(), value)?;
        }

        Ok(downcast_record::<T>(target)?)
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self.state().map(|state| state.rules.len()).unwrap_or_default();
        f.debug_struct("Mapper")
            .field("config", &self.config)
            .field("rule_pairs", &pairs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objmap_reflect::{Reflect, record};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Src {
        value: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Dst {
        value: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Wrapper {
        inner: Src,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct WrapperView {
        inner: Dst,
    }

    record!(Src { value: i32 });
    record!(Dst { value: i32 });
    record!(Wrapper { inner: Src });
    record!(WrapperView { inner: Dst });

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_mapper_is_send_sync() {
        assert_send_sync::<Mapper>();
    }

    #[test]
    fn test_context_stack() {
        let mut context = MapContext::new(Arc::default(), None);
        let (src, dst) = (Src::type_info(), Dst::type_info());
        assert_eq!(context.depth(), 0);

        context.push(&dst, &src);
        assert!(context.is_active(&dst, &src));
        assert!(!context.is_active(&src, &dst));
        assert_eq!(context.depth(), 1);

        context.pop();
        assert!(!context.is_active(&dst, &src));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Mapper::with_config(MapperConfig::default().with_max_depth(0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_depth_limit_counts_root_call() {
        let mapper = Mapper::with_config(MapperConfig::default().with_max_depth(1)).unwrap();
        let dst: Dst = mapper.map(&Src { value: 1 }, None, None).unwrap();
        assert_eq!(dst, Dst::default());
    }

    #[test]
    fn test_registration_builds_thunks_once() {
        let mapper = Mapper::new();
        mapper.add_map::<Src, Dst>("value", "value").unwrap();
        let before = mapper.cache_stats().unwrap();
        // source getter plus the optional getter on the target property
        assert_eq!(before.getters, 2);
        assert_eq!(before.setters, 1);

        mapper.map::<Src, Dst>(&Src { value: 3 }, None, None).unwrap();
        mapper.map::<Src, Dst>(&Src { value: 4 }, None, None).unwrap();
        let after = mapper.cache_stats().unwrap();
        assert_eq!(after.getters, 2);
        assert_eq!(after.constructors, 1);
    }

    #[test]
    fn test_plan_from_older_generation_is_rebuilt() {
        let mapper = Mapper::new();
        let state = mapper.state().unwrap();
        let (target, source) = (WrapperView::type_info(), Wrapper::type_info());

        let plan = mapper.flatten_plan(&target, &source, &state).unwrap();
        assert!(plan.entry("inner").is_none());

        // A rule lands after the plan was resolved, and the cleared table
        // still receives the older plan
        let rule = MappingRule::property::<Src, Dst>("value".into(), "value", None, &state.cache)
            .unwrap();
        state.rules.add(rule);
        state.generation.fetch_add(1, Ordering::SeqCst);

        let plan = mapper.flatten_plan(&target, &source, &state).unwrap();
        assert!(plan.entry("inner").is_some());

        let view: WrapperView = mapper
            .map(&Wrapper { inner: Src { value: 5 } }, None, None)
            .unwrap();
        assert_eq!(view.inner.value, 5);
    }

    #[test]
    fn test_plan_is_reused_within_a_generation() {
        let mapper = Mapper::new();
        mapper.add_map::<Src, Dst>("value", "value").unwrap();
        let state = mapper.state().unwrap();
        let (target, source) = (WrapperView::type_info(), Wrapper::type_info());

        let first = mapper.flatten_plan(&target, &source, &state).unwrap();
        let second = mapper.flatten_plan(&target, &source, &state).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
