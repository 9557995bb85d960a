//! Post-processor contracts and the ordered invocation pipeline.
//!
//! Three kinds of processor take part in a refresh:
//!
//! * [`BeanDefinitionRegistryPostProcessor`]: may add, remove or rewrite
//!   definitions before anything else runs.
//! * [`BeanFactoryPostProcessor`]: may rewrite definitions once the registry
//!   is complete.
//! * [`BeanPostProcessor`]: intercepts every bean instance the factory
//!   creates afterwards.
//!
//! Each processor bean carries an [`OrderMarker`](crate::OrderMarker) on its
//! definition; the [`delegate`] runs or registers them tier by tier.

use std::fmt;
use std::sync::Arc;

use crate::definition::AnyArc;
use crate::error::DiResult;
use crate::factory::{BeanFactory, BeanMeta};
use crate::registry::BeanDefinitionRegistry;

pub mod delegate;

pub use delegate::{invoke_bean_factory_post_processors, register_bean_post_processors, PropertyPlaceholderConfigurer};

/// Hook that rewrites the factory configuration after all definitions are
/// loaded.
pub trait BeanFactoryPostProcessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn post_process_bean_factory(&self, factory: &BeanFactory) -> DiResult<()>;
}

/// Factory post-processor that also sees the definition registry first.
pub trait BeanDefinitionRegistryPostProcessor: BeanFactoryPostProcessor {
    fn post_process_bean_definition_registry(&self, registry: &dyn BeanDefinitionRegistry) -> DiResult<()>;
}

/// Programmatic factory post-processor handed to the context builder.
///
/// Given processors run before any processor bean and in the order they were
/// added.
#[derive(Clone)]
pub enum FactoryProcessor {
    Registry(Arc<dyn BeanDefinitionRegistryPostProcessor>),
    Plain(Arc<dyn BeanFactoryPostProcessor>),
}

impl FactoryProcessor {
    pub(crate) fn post_process_bean_factory(&self, factory: &BeanFactory) -> DiResult<()> {
        match self {
            FactoryProcessor::Registry(p) => p.post_process_bean_factory(factory),
            FactoryProcessor::Plain(p) => p.post_process_bean_factory(factory),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FactoryProcessor::Registry(p) => p.name(),
            FactoryProcessor::Plain(p) => p.name(),
        }
    }
}

impl fmt::Debug for FactoryProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryProcessor::Registry(p) => f.debug_tuple("Registry").field(&p.name()).finish(),
            FactoryProcessor::Plain(p) => f.debug_tuple("Plain").field(&p.name()).finish(),
        }
    }
}

/// Bean creation stage a [`BeanPostProcessor`] participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// May short-circuit construction entirely
    BeforeInstantiation,
    /// Sees the definition right after construction
    MergedDefinition,
    /// May veto property population
    AfterInstantiation,
    /// Wraps an early reference exposed for a circular reference
    EarlyReference,
    BeforeInitialization,
    AfterInitialization,
    BeforeDestruction,
}

impl Hook {
    const fn bit(self) -> u8 {
        match self {
            Hook::BeforeInstantiation => 1,
            Hook::MergedDefinition => 1 << 1,
            Hook::AfterInstantiation => 1 << 2,
            Hook::EarlyReference => 1 << 3,
            Hook::BeforeInitialization => 1 << 4,
            Hook::AfterInitialization => 1 << 5,
            Hook::BeforeDestruction => 1 << 6,
        }
    }
}

/// Set of [`Hook`]s, computed once when a processor is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet(u8);

impl HookSet {
    pub fn of(hooks: &[Hook]) -> Self {
        Self(hooks.iter().fold(0, |acc, h| acc | h.bit()))
    }

    pub fn contains(&self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub(crate) fn union(self, other: HookSet) -> Self {
        Self(self.0 | other.0)
    }
}

const DEFAULT_HOOKS: &[Hook] = &[Hook::BeforeInitialization, Hook::AfterInitialization];

/// Intercepts bean instances created by the factory.
///
/// Every method has a pass-through default. [`hooks`](Self::hooks) declares
/// which ones the factory should actually call; it is read once at
/// registration time.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{
///     AnyArc, ApplicationContext, BeanDefinition, BeanFactory, BeanMeta, BeanPostProcessor,
///     DiResult, Hook,
/// };
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<String>>);
///
/// impl BeanPostProcessor for Recorder {
///     fn hooks(&self) -> &'static [Hook] {
///         &[Hook::AfterInitialization]
///     }
///
///     fn after_initialization(&self, _: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
///         self.0.lock().unwrap().push(meta.name.to_string());
///         Ok(bean)
///     }
/// }
///
/// let recorder = Arc::new(Recorder::default());
/// let shared = recorder.clone();
/// let context = ApplicationContext::builder()
///     .definition(BeanDefinition::bean_post_processor("recorder", move |_| Ok(shared.clone() as Arc<dyn BeanPostProcessor>)))
///     .definition(BeanDefinition::of::<u8, _>("byte", |_| Ok(1)))
///     .build();
/// context.refresh().unwrap();
///
/// assert_eq!(*recorder.0.lock().unwrap(), vec!["byte".to_string()]);
/// ```
pub trait BeanPostProcessor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn hooks(&self) -> &'static [Hook] {
        DEFAULT_HOOKS
    }

    /// Returning `Some` skips normal construction; the result still goes
    /// through after-initialization hooks.
    fn before_instantiation(&self, factory: &BeanFactory, meta: &BeanMeta<'_>) -> DiResult<Option<AnyArc>> {
        let _ = (factory, meta);
        Ok(None)
    }

    fn merged_definition(&self, meta: &BeanMeta<'_>) -> DiResult<()> {
        let _ = meta;
        Ok(())
    }

    /// Returning `false` skips property population.
    fn after_instantiation(&self, bean: &AnyArc, meta: &BeanMeta<'_>) -> DiResult<bool> {
        let _ = (bean, meta);
        Ok(true)
    }

    fn early_bean_reference(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let _ = (factory, meta);
        Ok(bean)
    }

    fn before_initialization(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let _ = (factory, meta);
        Ok(bean)
    }

    fn after_initialization(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let _ = (factory, meta);
        Ok(bean)
    }

    /// Whether a singleton described by `meta` needs this processor's
    /// destruction hook.
    fn requires_destruction(&self, meta: &BeanMeta<'_>) -> bool {
        let _ = meta;
        true
    }

    fn before_destruction(&self, bean: &AnyArc, name: &str) -> DiResult<()> {
        let _ = (bean, name);
        Ok(())
    }
}
