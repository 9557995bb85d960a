//! Bean factory: definitions, the singleton cache and the creation protocol.
//!
//! The factory owns everything a refresh builds. Each refresh of an
//! [`ApplicationContext`](crate::ApplicationContext) creates a fresh
//! factory; the previous one is destroyed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::definition::{AnyArc, BeanClass, BeanDefinition, Capability};
use crate::error::{DiError, DiResult};
use crate::internal::{CreationGuard, DisposableRegistry};
use crate::observer::Observers;
use crate::processor::{BeanPostProcessor, Hook, HookSet};
use crate::registry::{BeanDefinitionRegistry, DefinitionMap};
use crate::scope::BeanRole;

pub mod context;
pub mod lookup;

pub use context::BeanContext;
pub use lookup::BeanLookup;

/// Prefix that selects a factory bean itself rather than its product.
pub const FACTORY_BEAN_PREFIX: &str = "&";

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Bean whose product, not itself, is what `get_bean(name)` returns.
///
/// `get_bean("&name")` returns the factory bean.
pub trait FactoryBean: Send + Sync {
    fn get_object(&self) -> DiResult<AnyArc>;

    /// Class metadata of the product, used for proxy decisions.
    fn object_class(&self) -> BeanClass;

    /// Singleton products are cached by the factory.
    fn is_singleton(&self) -> bool {
        true
    }

    /// Create the product during pre-instantiation instead of on first lookup.
    fn is_eager_init(&self) -> bool {
        false
    }
}

/// What post-processors see about the bean they are handling.
#[derive(Debug, Clone, Copy)]
pub struct BeanMeta<'a> {
    pub name: &'a str,
    pub class: &'a BeanClass,
    pub capability: Capability,
    pub role: BeanRole,
    pub singleton: bool,
    pub preserve_target_class: bool,
    /// `None` for factory-bean products
    pub definition: Option<&'a BeanDefinition>,
}

impl<'a> BeanMeta<'a> {
    pub fn of(definition: &'a BeanDefinition) -> Self {
        Self {
            name: &definition.name,
            class: &definition.class,
            capability: definition.capability,
            role: definition.role,
            singleton: definition.is_singleton(),
            preserve_target_class: definition.preserve_target_class,
            definition: Some(definition),
        }
    }

    /// Key for per-bean caches: factory beans are keyed `&name` so they never
    /// collide with their products.
    pub fn cache_key(&self) -> String {
        if self.capability == Capability::FactoryBean {
            format!("{FACTORY_BEAN_PREFIX}{}", self.name)
        } else {
            self.name.to_string()
        }
    }
}

struct RegisteredProcessor {
    processor: Arc<dyn BeanPostProcessor>,
    hooks: HookSet,
}

/// Options fixed when a factory is created.
#[derive(Clone)]
pub(crate) struct FactoryOptions {
    pub(crate) allow_bean_definition_overriding: bool,
    pub(crate) allow_circular_references: bool,
    pub(crate) observers: Observers,
    pub(crate) parent: Option<ParentLookup>,
}

/// Lookup consulted for names this factory does not define.
pub type ParentLookup = Arc<dyn BeanLookup + Send + Sync>;

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            allow_bean_definition_overriding: true,
            allow_circular_references: true,
            observers: Observers::new(),
            parent: None,
        }
    }
}

/// Bean factory with a three-level singleton cache.
///
/// Singletons move through three caches while they are created: a raw
/// instance waiting to be exposed early, the early reference handed to
/// beans that reference it circularly, and finally the complete instance.
/// Creation of singletons is serialized by a reentrant lock so a lazy
/// singleton requested from several threads is created exactly once.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{BeanDefinition, BeanDefinitionRegistry, BeanFactory, BeanLookup};
/// use std::sync::Arc;
///
/// let factory = BeanFactory::new();
/// factory
///     .register_bean_definition(BeanDefinition::of::<String, _>("greeting", |_| Ok("hello".to_string())))
///     .unwrap();
///
/// let first = factory.get_bean_as::<String>("greeting").unwrap();
/// let second = factory.get_bean_as::<String>("greeting").unwrap();
/// assert_eq!(first.as_str(), "hello");
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct BeanFactory {
    id: u64,
    this: Weak<BeanFactory>,
    definitions: RwLock<DefinitionMap>,
    allow_circular_references: bool,
    singletons: RwLock<IndexMap<String, AnyArc>>,
    early_singletons: RwLock<HashMap<String, AnyArc>>,
    singleton_factories: RwLock<HashMap<String, (AnyArc, Arc<BeanDefinition>)>>,
    manual_singletons: RwLock<IndexMap<String, Capability>>,
    in_creation: RwLock<HashSet<String>>,
    creation_lock: ReentrantMutex<()>,
    processors: RwLock<Vec<RegisteredProcessor>>,
    hooks: RwLock<HookSet>,
    disposables: Mutex<DisposableRegistry>,
    factory_products: RwLock<HashMap<String, AnyArc>>,
    in_destruction: AtomicBool,
    incompletely_processed: Mutex<Vec<String>>,
    observers: Observers,
    parent: Option<ParentLookup>,
}

impl BeanFactory {
    /// Factory with default options: overriding and circular references allowed.
    pub fn new() -> Arc<Self> {
        Self::with_options(FactoryOptions::default())
    }

    pub(crate) fn with_options(options: FactoryOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            definitions: RwLock::new(DefinitionMap::new(options.allow_bean_definition_overriding)),
            allow_circular_references: options.allow_circular_references,
            singletons: RwLock::new(IndexMap::new()),
            early_singletons: RwLock::new(HashMap::new()),
            singleton_factories: RwLock::new(HashMap::new()),
            manual_singletons: RwLock::new(IndexMap::new()),
            in_creation: RwLock::new(HashSet::new()),
            creation_lock: ReentrantMutex::new(()),
            processors: RwLock::new(Vec::new()),
            hooks: RwLock::new(HookSet::default()),
            disposables: Mutex::new(DisposableRegistry::default()),
            factory_products: RwLock::new(HashMap::new()),
            in_destruction: AtomicBool::new(false),
            incompletely_processed: Mutex::new(Vec::new()),
            observers: options.observers,
            parent: options.parent,
        })
    }

    /// Factory that falls back to `parent` for names it does not define.
    pub fn with_parent(parent: ParentLookup) -> Arc<Self> {
        Self::with_options(FactoryOptions {
            parent: Some(parent),
            ..FactoryOptions::default()
        })
    }

    pub fn parent(&self) -> Option<&ParentLookup> {
        self.parent.as_ref()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Weak handle for components that must call back into the factory.
    pub fn weak(&self) -> Weak<BeanFactory> {
        self.this.clone()
    }

    pub fn allows_circular_references(&self) -> bool {
        self.allow_circular_references
    }

    // ----- Definitions -----

    /// Registry view, or `None` once the configuration is frozen.
    pub fn as_registry(&self) -> Option<&dyn BeanDefinitionRegistry> {
        if self.is_configuration_frozen() {
            None
        } else {
            Some(self)
        }
    }

    pub fn freeze_configuration(&self) {
        self.definitions.write().freeze();
    }

    pub fn is_configuration_frozen(&self) -> bool {
        self.definitions.read().is_frozen()
    }

    /// Rewrites a definition in place; used by factory post-processors.
    pub fn modify_bean_definition(&self, name: &str, f: impl FnOnce(&mut BeanDefinition)) -> DiResult<()> {
        self.definitions.write().modify(name, f)
    }

    pub(crate) fn definition(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    pub fn bean_class(&self, name: &str) -> Option<BeanClass> {
        self.definitions.read().get(transformed_name(name)).map(|d| d.class.clone())
    }

    pub fn order_of(&self, name: &str) -> crate::OrderMarker {
        self.definitions
            .read()
            .get(name)
            .map(|d| d.order)
            .unwrap_or_default()
    }

    /// Names of beans whose capability satisfies `capability`, definitions
    /// first in registration order, then manual singletons.
    pub fn bean_names_for(&self, capability: Capability) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read()
            .values()
            .filter(|d| d.capability.satisfies(capability))
            .map(|d| d.name.clone())
            .collect();
        let definitions = self.definitions.read();
        names.extend(
            self.manual_singletons
                .read()
                .iter()
                .filter(|(name, cap)| cap.satisfies(capability) && !definitions.contains(name))
                .map(|(name, _)| name.clone()),
        );
        names
    }

    pub fn is_capability_match(&self, name: &str, capability: Capability) -> bool {
        self.capability_of(transformed_name(name))
            .is_some_and(|c| c.satisfies(capability))
    }

    fn capability_of(&self, name: &str) -> Option<Capability> {
        if let Some(def) = self.definitions.read().get(name) {
            return Some(def.capability);
        }
        self.manual_singletons.read().get(name).copied()
    }

    // ----- Post-processors -----

    /// Appends a bean post-processor; an already registered instance moves
    /// to the end.
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let hooks = HookSet::of(processor.hooks());
        let mut processors = self.processors.write();
        processors.retain(|r| !same_processor(&r.processor, &processor));
        tracing::trace!(processor = processor.name(), "registering bean post-processor");
        processors.push(RegisteredProcessor { processor, hooks });
        *self.hooks.write() = processors.iter().fold(HookSet::default(), |acc, r| acc.union(r.hooks));
    }

    pub fn bean_post_processor_count(&self) -> usize {
        self.processors.read().len()
    }

    pub fn bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.processors.read().iter().map(|r| r.processor.clone()).collect()
    }

    fn processors_with(&self, hook: Hook) -> Vec<Arc<dyn BeanPostProcessor>> {
        if !self.hooks.read().contains(hook) {
            return Vec::new();
        }
        self.processors
            .read()
            .iter()
            .filter(|r| r.hooks.contains(hook))
            .map(|r| r.processor.clone())
            .collect()
    }

    /// Records a bean that missed some post-processors.
    pub(crate) fn record_incompletely_processed(&self, name: &str) {
        self.incompletely_processed.lock().push(name.to_string());
    }

    /// Beans created before every bean post-processor was registered.
    pub fn incompletely_processed_beans(&self) -> Vec<String> {
        self.incompletely_processed.lock().clone()
    }

    // ----- Singletons -----

    /// Registers a fully built singleton that bypasses the creation protocol.
    pub fn register_singleton(&self, name: &str, bean: AnyArc) -> DiResult<()> {
        self.register_singleton_as(name, bean, Capability::Bean)
    }

    /// Registers a manual singleton with an explicit capability; the stored
    /// form must match it.
    pub fn register_singleton_as(&self, name: &str, bean: AnyArc, capability: Capability) -> DiResult<()> {
        let _lock = self.creation_lock.lock();
        let mut singletons = self.singletons.write();
        if singletons.contains_key(name) {
            return Err(DiError::Configuration(format!(
                "Could not register object under bean name '{name}': there is already an object bound"
            )));
        }
        singletons.insert(name.to_string(), bean);
        self.manual_singletons.write().insert(name.to_string(), capability);
        Ok(())
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.singletons.read().contains_key(name)
    }

    pub fn singleton_names(&self) -> Vec<String> {
        self.singletons.read().keys().cloned().collect()
    }

    pub fn singleton_count(&self) -> usize {
        self.singletons.read().len()
    }

    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.in_creation.read().contains(name)
    }

    /// Looks in this factory and then in the parent.
    pub fn contains_bean(&self, name: &str) -> bool {
        self.contains_local_bean(name) || self.parent.as_ref().is_some_and(|parent| parent.contains_bean(name))
    }

    pub fn contains_local_bean(&self, name: &str) -> bool {
        let name = transformed_name(name);
        self.contains_singleton(name) || self.definitions.read().contains(name)
    }

    /// Records that `dependent` uses `bean`; dependents are destroyed first.
    pub fn register_dependent_bean(&self, bean: &str, dependent: &str) {
        self.disposables
            .lock()
            .register_dependent(transformed_name(bean), transformed_name(dependent));
    }

    pub fn dependents_of(&self, bean: &str) -> Vec<String> {
        self.disposables.lock().dependents_of(bean)
    }

    fn add_singleton(&self, name: &str, bean: AnyArc) {
        self.singletons.write().insert(name.to_string(), bean);
        self.early_singletons.write().remove(name);
        self.singleton_factories.write().remove(name);
    }

    fn remove_singleton(&self, name: &str) {
        self.singletons.write().shift_remove(name);
        self.early_singletons.write().remove(name);
        self.singleton_factories.write().remove(name);
        self.factory_products.write().remove(name);
        self.manual_singletons.write().shift_remove(name);
    }

    fn get_singleton(&self, name: &str, allow_early: bool) -> DiResult<Option<AnyArc>> {
        if let Some(bean) = self.singletons.read().get(name).cloned() {
            return Ok(Some(bean));
        }
        if !self.is_currently_in_creation(name) {
            return Ok(None);
        }

        // Only the creating thread may see an early reference; others wait
        // here until the bean is complete.
        let _lock = self.creation_lock.lock();
        if let Some(bean) = self.singletons.read().get(name).cloned() {
            return Ok(Some(bean));
        }
        if let Some(bean) = self.early_singletons.read().get(name).cloned() {
            return Ok(Some(bean));
        }
        if !allow_early {
            return Ok(None);
        }
        let Some((raw, definition)) = self.singleton_factories.write().remove(name) else {
            return Ok(None);
        };
        let early = self.early_bean_reference(raw, &definition)?;
        self.early_singletons.write().insert(name.to_string(), early.clone());
        Ok(Some(early))
    }

    // ----- Lookup -----

    /// Returns the bean registered under `name`, creating it if needed.
    ///
    /// `&name` returns a factory bean itself.
    pub fn get_bean(&self, name: &str) -> DiResult<AnyArc> {
        let bean_name = transformed_name(name);

        if let Some(shared) = self.get_singleton(bean_name, true)? {
            return self.object_for_instance(shared, name, bean_name);
        }

        let Some(definition) = self.definition(bean_name) else {
            return match &self.parent {
                Some(parent) => parent.get_bean(name),
                None => Err(DiError::NotFound(bean_name.to_string())),
            };
        };

        for dependency in &definition.depends_on {
            if self.disposables.lock().is_dependent(bean_name, dependency) {
                return Err(DiError::Circular(vec![
                    bean_name.to_string(),
                    dependency.clone(),
                    bean_name.to_string(),
                ]));
            }
            self.register_dependent_bean(dependency, bean_name);
            self.get_bean(dependency)
                .map_err(|e| DiError::creating(bean_name, e))?;
        }

        let instance = if definition.is_singleton() {
            self.get_or_create_singleton(&definition)?
        } else {
            let _guard = CreationGuard::enter(self.id, bean_name)?;
            let started = Instant::now();
            let bean = self.create_bean(&definition)?;
            if !self.observers.is_empty() {
                self.observers.bean_created(bean_name, started.elapsed());
            }
            bean
        };
        self.object_for_instance(instance, name, bean_name)
    }

    fn get_or_create_singleton(&self, definition: &Arc<BeanDefinition>) -> DiResult<AnyArc> {
        let name = definition.name.as_str();
        let _lock = self.creation_lock.lock();
        if let Some(bean) = self.singletons.read().get(name).cloned() {
            return Ok(bean);
        }
        if self.in_destruction.load(Ordering::Acquire) {
            return Err(DiError::LifecycleState(format!(
                "Singleton bean creation not allowed while singletons of this factory are in destruction (bean '{name}')"
            )));
        }

        let guard = CreationGuard::enter(self.id, name)?;
        tracing::debug!(bean = name, "creating shared instance of singleton bean");
        self.in_creation.write().insert(name.to_string());
        let started = Instant::now();
        let result = self.create_bean(definition);
        self.in_creation.write().remove(name);
        drop(guard);

        match result {
            Ok(bean) => {
                self.add_singleton(name, bean.clone());
                if !self.observers.is_empty() {
                    self.observers.bean_created(name, started.elapsed());
                }
                Ok(bean)
            }
            Err(err) => {
                self.destroy_singleton(name);
                Err(err)
            }
        }
    }

    fn object_for_instance(&self, instance: AnyArc, requested: &str, bean_name: &str) -> DiResult<AnyArc> {
        let is_factory = self.capability_of(bean_name) == Some(Capability::FactoryBean);
        if requested.starts_with(FACTORY_BEAN_PREFIX) {
            if !is_factory {
                return Err(DiError::TypeMismatch {
                    bean: requested.to_string(),
                    expected: "FactoryBean",
                });
            }
            return Ok(instance);
        }
        if !is_factory {
            return Ok(instance);
        }

        let factory_bean = instance
            .downcast_ref::<Arc<dyn FactoryBean>>()
            .cloned()
            .ok_or_else(|| DiError::TypeMismatch {
                bean: bean_name.to_string(),
                expected: "FactoryBean",
            })?;

        if factory_bean.is_singleton() && self.contains_singleton(bean_name) {
            if let Some(product) = self.factory_products.read().get(bean_name).cloned() {
                return Ok(product);
            }
            let _lock = self.creation_lock.lock();
            if let Some(product) = self.factory_products.read().get(bean_name).cloned() {
                return Ok(product);
            }
            let product = self.product_of(factory_bean.as_ref(), bean_name)?;
            self.factory_products
                .write()
                .insert(bean_name.to_string(), product.clone());
            return Ok(product);
        }
        self.product_of(factory_bean.as_ref(), bean_name)
    }

    fn product_of(&self, factory_bean: &dyn FactoryBean, bean_name: &str) -> DiResult<AnyArc> {
        let product = factory_bean
            .get_object()
            .map_err(|e| DiError::creating(bean_name, e))?;
        let class = factory_bean.object_class();
        let role = self
            .definition(bean_name)
            .map(|d| d.role)
            .unwrap_or_default();
        let meta = BeanMeta {
            name: bean_name,
            class: &class,
            capability: Capability::Bean,
            role,
            singleton: factory_bean.is_singleton(),
            preserve_target_class: false,
            definition: None,
        };
        self.apply_after_initialization(product, &meta)
            .map_err(|e| DiError::creating(bean_name, e))
    }

    // ----- Creation protocol -----

    fn create_bean(&self, definition: &Arc<BeanDefinition>) -> DiResult<AnyArc> {
        let meta = BeanMeta::of(definition);
        if let Some(bean) = self
            .resolve_before_instantiation(&meta)
            .map_err(|e| DiError::creating(&definition.name, e))?
        {
            return Ok(bean);
        }
        self.do_create_bean(definition, &meta)
            .map_err(|e| DiError::creating(&definition.name, e))
    }

    fn resolve_before_instantiation(&self, meta: &BeanMeta<'_>) -> DiResult<Option<AnyArc>> {
        for processor in self.processors_with(Hook::BeforeInstantiation) {
            if let Some(bean) = processor.before_instantiation(self, meta)? {
                tracing::trace!(bean = meta.name, processor = processor.name(), "instantiation short-circuited");
                return self.apply_after_initialization(bean, meta).map(Some);
            }
        }
        Ok(None)
    }

    fn do_create_bean(&self, definition: &Arc<BeanDefinition>, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let name = definition.name.as_str();
        let ctx = BeanContext::new(self, definition);
        let raw = (definition.ctor)(&ctx)?;

        for processor in self.processors_with(Hook::MergedDefinition) {
            processor.merged_definition(meta)?;
        }

        let early_exposure =
            definition.is_singleton() && self.allow_circular_references && self.is_currently_in_creation(name);
        if early_exposure {
            tracing::trace!(bean = name, "eagerly caching bean to allow resolving circular references");
            self.singleton_factories
                .write()
                .insert(name.to_string(), (raw.clone(), definition.clone()));
        }

        self.populate_bean(&raw, definition, meta, &ctx)?;
        let mut exposed = self.initialize_bean(raw.clone(), definition, meta)?;

        if early_exposure {
            let early = self.early_singletons.read().get(name).cloned();
            if let Some(early) = early {
                if same_instance(&exposed, &raw) {
                    exposed = early;
                } else {
                    let injected: Vec<String> = self
                        .dependents_of(name)
                        .into_iter()
                        .filter(|d| self.contains_singleton(d) || self.is_currently_in_creation(d))
                        .collect();
                    if !injected.is_empty() {
                        return Err(DiError::Instantiation {
                            bean: name.to_string(),
                            message: format!(
                                "Bean has been injected into other beans [{}] in its raw version as part of a \
                                 circular reference, but has eventually been wrapped",
                                injected.join(", ")
                            ),
                        });
                    }
                }
            }
        }

        if definition.is_singleton() {
            self.register_disposable_if_necessary(&raw, &exposed, definition, meta);
        }
        Ok(exposed)
    }

    fn populate_bean(
        &self,
        raw: &AnyArc,
        definition: &BeanDefinition,
        meta: &BeanMeta<'_>,
        ctx: &BeanContext<'_>,
    ) -> DiResult<()> {
        for processor in self.processors_with(Hook::AfterInstantiation) {
            if !processor.after_instantiation(raw, meta)? {
                return Ok(());
            }
        }
        if let Some(populate) = &definition.populate {
            populate(raw, ctx)?;
        }
        Ok(())
    }

    fn initialize_bean(&self, raw: AnyArc, definition: &BeanDefinition, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let mut current = raw;
        for processor in self.processors_with(Hook::BeforeInitialization) {
            current = processor.before_initialization(self, current, meta)?;
        }
        if let Some(init) = &definition.init {
            init(&current)?;
        }
        self.apply_after_initialization(current, meta)
    }

    fn apply_after_initialization(&self, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let mut current = bean;
        for processor in self.processors_with(Hook::AfterInitialization) {
            current = processor.after_initialization(self, current, meta)?;
        }
        Ok(current)
    }

    fn early_bean_reference(&self, raw: AnyArc, definition: &BeanDefinition) -> DiResult<AnyArc> {
        let meta = BeanMeta::of(definition);
        let mut current = raw;
        for processor in self.processors_with(Hook::EarlyReference) {
            current = processor.early_bean_reference(self, current, &meta)?;
        }
        Ok(current)
    }

    /// Builds a bean from its definition without post-processors and
    /// without caching it.
    ///
    /// Used for targets fetched through a prototype target source.
    pub fn create_raw_bean(&self, definition: &BeanDefinition) -> DiResult<AnyArc> {
        let _guard = CreationGuard::enter(self.id, &definition.name)?;
        let ctx = BeanContext::new(self, definition);
        let raw = (definition.ctor)(&ctx).map_err(|e| DiError::creating(&definition.name, e))?;
        if let Some(populate) = &definition.populate {
            populate(&raw, &ctx).map_err(|e| DiError::creating(&definition.name, e))?;
        }
        if let Some(init) = &definition.init {
            init(&raw).map_err(|e| DiError::creating(&definition.name, e))?;
        }
        Ok(raw)
    }

    /// Eagerly creates every non-lazy singleton in registration order.
    pub fn pre_instantiate_singletons(&self) -> DiResult<()> {
        let names = self.definitions.read().names();
        tracing::debug!(count = names.len(), "pre-instantiating singletons");
        for name in names {
            let Some(definition) = self.definition(&name) else {
                continue;
            };
            if !definition.is_singleton() || definition.lazy {
                continue;
            }
            if definition.capability == Capability::FactoryBean {
                let factory_bean = self.get_bean(&format!("{FACTORY_BEAN_PREFIX}{name}"))?;
                let eager = factory_bean
                    .downcast_ref::<Arc<dyn FactoryBean>>()
                    .is_some_and(|fb| fb.is_eager_init());
                if eager {
                    self.get_bean(&name)?;
                }
            } else {
                self.get_bean(&name)?;
            }
        }
        Ok(())
    }

    // ----- Destruction -----

    fn register_disposable_if_necessary(
        &self,
        raw: &AnyArc,
        exposed: &AnyArc,
        definition: &BeanDefinition,
        meta: &BeanMeta<'_>,
    ) {
        let processors: Vec<_> = self
            .processors_with(Hook::BeforeDestruction)
            .into_iter()
            .filter(|p| p.requires_destruction(meta))
            .collect();
        if definition.destroy.is_none() && processors.is_empty() {
            return;
        }

        let name = definition.name.clone();
        let destroy = definition.destroy.clone();
        let raw = raw.clone();
        let exposed = exposed.clone();
        self.disposables.lock().register(
            &definition.name,
            Box::new(move || {
                for processor in processors {
                    if let Err(error) = processor.before_destruction(&exposed, &name) {
                        tracing::warn!(bean = %name, processor = processor.name(), %error, "destruction hook failed");
                    }
                }
                if let Some(destroy) = destroy {
                    tracing::trace!(bean = %name, "invoking destroy callback");
                    if let Err(error) = destroy(&raw) {
                        tracing::warn!(bean = %name, %error, "destroy callback failed");
                    }
                }
            }),
        );
    }

    /// Destroys one singleton after its dependents.
    pub fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let (disposer, dependents) = self.disposables.lock().take(name);
        for dependent in dependents {
            self.destroy_singleton(&dependent);
        }
        if let Some(disposer) = disposer {
            tracing::trace!(bean = name, "destroying singleton");
            disposer();
        }
    }

    /// Destroys all singletons in reverse registration order and clears
    /// every cache. Calling it again destroys nothing further.
    pub fn destroy_singletons(&self) {
        let _lock = self.creation_lock.lock();
        tracing::debug!(factory = self.id, "destroying singletons");
        self.in_destruction.store(true, Ordering::Release);

        let names = self.disposables.lock().names_in_destruction_order();
        for name in names {
            self.destroy_singleton(&name);
        }

        self.disposables.lock().clear();
        self.singletons.write().clear();
        self.early_singletons.write().clear();
        self.singleton_factories.write().clear();
        self.factory_products.write().clear();
        self.manual_singletons.write().clear();
        self.in_destruction.store(false, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn disposable_count(&self) -> usize {
        self.disposables.lock().len()
    }
}

impl BeanDefinitionRegistry for BeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> DiResult<()> {
        let name = definition.name.clone();
        let replaced = self.definitions.read().contains(&name);
        self.definitions.write().insert(definition)?;
        if replaced && self.contains_singleton(&name) {
            self.destroy_singleton(&name);
        }
        tracing::trace!(bean = %name, "registered bean definition");
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> DiResult<BeanDefinition> {
        let removed = self.definitions.write().remove(name)?;
        if self.contains_singleton(name) {
            self.destroy_singleton(name);
        }
        Ok(removed)
    }

    fn bean_definition(&self, name: &str) -> Option<BeanDefinition> {
        self.definitions.read().get(name).map(|d| BeanDefinition::clone(d))
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains(name)
    }

    fn bean_definition_names(&self) -> Vec<String> {
        self.definitions.read().names()
    }

    fn bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }
}

impl BeanLookup for BeanFactory {
    fn get_bean(&self, name: &str) -> DiResult<AnyArc> {
        BeanFactory::get_bean(self, name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        BeanFactory::contains_bean(self, name)
    }
}

impl fmt::Debug for BeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanFactory")
            .field("id", &self.id)
            .field("definitions", &self.definitions.read().names())
            .field("singletons", &self.singleton_names())
            .field("post_processors", &self.bean_post_processor_count())
            .finish()
    }
}

/// Strips the factory-bean prefix.
pub(crate) fn transformed_name(name: &str) -> &str {
    name.trim_start_matches(FACTORY_BEAN_PREFIX)
}

/// Identity comparison that ignores vtable pointers.
pub(crate) fn same_instance(a: &AnyArc, b: &AnyArc) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn same_processor(a: &Arc<dyn BeanPostProcessor>, b: &Arc<dyn BeanPostProcessor>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
