//! Ordered invocation of factory post-processors and registration of bean
//! post-processors.
//!
//! Both entry points partition processor beans by their
//! [`OrderMarker`]: `PriorityOrdered` first, then `Ordered`, then the rest in
//! discovery order. Registry post-processors are looked up again after every
//! pass, so a processor that registers another processor bean gets it invoked
//! within the same refresh.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::environment::{resolve_placeholders_with, Environment, ENVIRONMENT_BEAN_NAME};
use crate::definition::{AnyArc, BeanDefinition, Capability, PropertyValue};
use crate::error::DiResult;
use crate::factory::{BeanFactory, BeanLookup, BeanMeta};
use crate::order::{sort_by_order, OrderMarker, LOWEST_PRECEDENCE};
use crate::processor::{
    BeanDefinitionRegistryPostProcessor, BeanFactoryPostProcessor, BeanPostProcessor, FactoryProcessor, Hook,
};
use crate::registry::BeanDefinitionRegistry;
use crate::scope::BeanRole;

type RegistryProcessorBean = (String, OrderMarker, Arc<dyn BeanDefinitionRegistryPostProcessor>);

/// Runs every factory post-processor known to `factory`.
///
/// `given` are the programmatic processors from the context builder; they
/// run before any processor bean. When the factory configuration is frozen
/// the registry passes are skipped and only factory callbacks run.
pub fn invoke_bean_factory_post_processors(factory: &BeanFactory, given: &[FactoryProcessor]) -> DiResult<()> {
    let mut processed: HashSet<String> = HashSet::new();

    if let Some(registry) = factory.as_registry() {
        let mut regular: Vec<Arc<dyn BeanFactoryPostProcessor>> = Vec::new();
        let mut registry_processors: Vec<Arc<dyn BeanDefinitionRegistryPostProcessor>> = Vec::new();

        for processor in given {
            match processor {
                FactoryProcessor::Registry(p) => {
                    tracing::trace!(processor = p.name(), "invoking given registry post-processor");
                    p.post_process_bean_definition_registry(registry)?;
                    registry_processors.push(p.clone());
                }
                FactoryProcessor::Plain(p) => regular.push(p.clone()),
            }
        }

        let current = registry_processor_beans(factory, &mut processed, |order| order.is_priority())?;
        invoke_registry_processors(&current, registry, &mut registry_processors)?;

        let current = registry_processor_beans(factory, &mut processed, |order| {
            order.is_priority() || order.is_ordered()
        })?;
        invoke_registry_processors(&current, registry, &mut registry_processors)?;

        // Remaining processors until no new ones appear.
        loop {
            let current = registry_processor_beans(factory, &mut processed, |_| true)?;
            if current.is_empty() {
                break;
            }
            invoke_registry_processors(&current, registry, &mut registry_processors)?;
        }

        for processor in &registry_processors {
            processor.post_process_bean_factory(factory)?;
        }
        for processor in &regular {
            processor.post_process_bean_factory(factory)?;
        }
    } else {
        tracing::debug!("bean factory configuration is frozen; invoking given processors only");
        for processor in given {
            processor.post_process_bean_factory(factory)?;
        }
    }

    let mut priority: Vec<(OrderMarker, FactoryProcessor)> = Vec::new();
    let mut ordered_names: Vec<String> = Vec::new();
    let mut plain_names: Vec<String> = Vec::new();
    for name in factory.bean_names_for(Capability::FactoryPostProcessor) {
        if processed.contains(&name) {
            continue;
        }
        match factory.order_of(&name) {
            order @ OrderMarker::PriorityOrdered(_) => priority.push((order, factory_processor_bean(factory, &name)?)),
            OrderMarker::Ordered(_) => ordered_names.push(name),
            OrderMarker::Unordered => plain_names.push(name),
        }
    }

    sort_by_order(&mut priority, |(order, _)| *order);
    invoke_factory_callbacks(factory, &priority)?;

    let mut ordered = Vec::with_capacity(ordered_names.len());
    for name in &ordered_names {
        ordered.push((factory.order_of(name), factory_processor_bean(factory, name)?));
    }
    sort_by_order(&mut ordered, |(order, _)| *order);
    invoke_factory_callbacks(factory, &ordered)?;

    let mut plain = Vec::with_capacity(plain_names.len());
    for name in &plain_names {
        plain.push((OrderMarker::Unordered, factory_processor_bean(factory, name)?));
    }
    invoke_factory_callbacks(factory, &plain)?;

    Ok(())
}

fn registry_processor_beans(
    factory: &BeanFactory,
    processed: &mut HashSet<String>,
    accept: impl Fn(OrderMarker) -> bool,
) -> DiResult<Vec<RegistryProcessorBean>> {
    let mut current = Vec::new();
    for name in factory.bean_names_for(Capability::RegistryPostProcessor) {
        if processed.contains(&name) {
            continue;
        }
        let order = factory.order_of(&name);
        if !accept(order) {
            continue;
        }
        let processor = factory.get_bean_trait::<dyn BeanDefinitionRegistryPostProcessor>(&name)?;
        processed.insert(name.clone());
        current.push((name, order, processor));
    }
    sort_by_order(&mut current, |(_, order, _)| *order);
    Ok(current)
}

fn invoke_registry_processors(
    current: &[RegistryProcessorBean],
    registry: &dyn BeanDefinitionRegistry,
    accumulated: &mut Vec<Arc<dyn BeanDefinitionRegistryPostProcessor>>,
) -> DiResult<()> {
    for (name, _, processor) in current {
        tracing::debug!(bean = %name, "invoking bean definition registry post-processor");
        processor.post_process_bean_definition_registry(registry)?;
        accumulated.push(processor.clone());
    }
    Ok(())
}

fn factory_processor_bean(factory: &BeanFactory, name: &str) -> DiResult<FactoryProcessor> {
    if factory.is_capability_match(name, Capability::RegistryPostProcessor) {
        Ok(FactoryProcessor::Registry(
            factory.get_bean_trait::<dyn BeanDefinitionRegistryPostProcessor>(name)?,
        ))
    } else {
        Ok(FactoryProcessor::Plain(factory.get_bean_trait::<dyn BeanFactoryPostProcessor>(name)?))
    }
}

fn invoke_factory_callbacks(factory: &BeanFactory, processors: &[(OrderMarker, FactoryProcessor)]) -> DiResult<()> {
    for (_, processor) in processors {
        tracing::debug!(processor = processor.name(), "invoking bean factory post-processor");
        processor.post_process_bean_factory(factory)?;
    }
    Ok(())
}

/// Instantiates and registers every bean post-processor bean.
///
/// A checker goes first and reports beans created before the chain is
/// complete. Processors using the merged-definition hook are moved to the
/// end, and `detector` is registered last of all.
pub fn register_bean_post_processors(
    factory: &BeanFactory,
    detector: Option<Arc<dyn BeanPostProcessor>>,
) -> DiResult<()> {
    let names = factory.bean_names_for(Capability::BeanPostProcessor);

    // The checker counts itself.
    let target = factory.bean_post_processor_count() + 1 + names.len();
    factory.add_bean_post_processor(Arc::new(BeanPostProcessorChecker { target }));

    let mut priority: Vec<(OrderMarker, Arc<dyn BeanPostProcessor>)> = Vec::new();
    let mut internal: Vec<(OrderMarker, Arc<dyn BeanPostProcessor>)> = Vec::new();
    let mut ordered_names: Vec<String> = Vec::new();
    let mut plain_names: Vec<String> = Vec::new();

    for name in names {
        match factory.order_of(&name) {
            order @ OrderMarker::PriorityOrdered(_) => {
                let processor = factory.get_bean_trait::<dyn BeanPostProcessor>(&name)?;
                if processor.hooks().contains(&Hook::MergedDefinition) {
                    internal.push((order, processor.clone()));
                }
                priority.push((order, processor));
            }
            OrderMarker::Ordered(_) => ordered_names.push(name),
            OrderMarker::Unordered => plain_names.push(name),
        }
    }

    sort_by_order(&mut priority, |(order, _)| *order);
    register_all(factory, &priority);

    let mut ordered = Vec::with_capacity(ordered_names.len());
    for name in &ordered_names {
        let order = factory.order_of(name);
        let processor = factory.get_bean_trait::<dyn BeanPostProcessor>(name)?;
        if processor.hooks().contains(&Hook::MergedDefinition) {
            internal.push((order, processor.clone()));
        }
        ordered.push((order, processor));
    }
    sort_by_order(&mut ordered, |(order, _)| *order);
    register_all(factory, &ordered);

    let mut plain = Vec::with_capacity(plain_names.len());
    for name in &plain_names {
        let processor = factory.get_bean_trait::<dyn BeanPostProcessor>(name)?;
        if processor.hooks().contains(&Hook::MergedDefinition) {
            internal.push((OrderMarker::Unordered, processor.clone()));
        }
        plain.push((OrderMarker::Unordered, processor));
    }
    register_all(factory, &plain);

    sort_by_order(&mut internal, |(order, _)| *order);
    register_all(factory, &internal);

    if let Some(detector) = detector {
        factory.add_bean_post_processor(detector);
    }
    Ok(())
}

fn register_all(factory: &BeanFactory, processors: &[(OrderMarker, Arc<dyn BeanPostProcessor>)]) {
    for (_, processor) in processors {
        factory.add_bean_post_processor(processor.clone());
    }
}

/// Logs beans created while bean post-processors are still being
/// registered; such beans may miss auto-proxying.
#[derive(Debug)]
struct BeanPostProcessorChecker {
    target: usize,
}

impl BeanPostProcessor for BeanPostProcessorChecker {
    fn name(&self) -> &str {
        "BeanPostProcessorChecker"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::AfterInitialization]
    }

    fn after_initialization(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let infrastructure = meta.capability == Capability::BeanPostProcessor || meta.role == BeanRole::Infrastructure;
        if !infrastructure && factory.bean_post_processor_count() < self.target {
            tracing::info!(
                bean = meta.name,
                class = meta.class.type_name(),
                "bean is not eligible for getting processed by all bean post-processors \
                 (for example: not eligible for auto-proxying)"
            );
            factory.record_incompletely_processed(meta.name);
        }
        Ok(bean)
    }
}

/// Factory post-processor that resolves `${key}` and `${key:default}`
/// placeholders in text constructor arguments and property values.
///
/// Keys are looked up in the context environment first, then in the local
/// properties given here.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{
///     ApplicationContext, BeanDefinition, BeanLookup, ContextSettings, PropertyPlaceholderConfigurer,
///     PropertyValue,
/// };
///
/// struct Pool { size: usize, name: String }
///
/// let mut settings = ContextSettings::default();
/// settings.properties.insert("pool.size".into(), "8".into());
///
/// let context = ApplicationContext::builder()
///     .settings(settings)
///     .definition(PropertyPlaceholderConfigurer::new().property("pool.name", "main").definition("placeholders"))
///     .definition(
///         BeanDefinition::of::<Pool, _>("pool", |ctx| {
///             Ok(Pool { size: ctx.property_parsed("size")?, name: ctx.property_text("name")?.to_string() })
///         })
///         .property("size", PropertyValue::text("${pool.size}"))
///         .property("name", PropertyValue::text("${pool.name:fallback}")),
///     )
///     .build();
/// context.refresh().unwrap();
///
/// let pool = context.get_bean_as::<Pool>("pool").unwrap();
/// assert_eq!(pool.size, 8);
/// assert_eq!(pool.name, "main");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PropertyPlaceholderConfigurer {
    local: IndexMap<String, String>,
    ignore_unresolvable: bool,
}

impl PropertyPlaceholderConfigurer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.local.insert(key.into(), value.into());
        self
    }

    /// Leave unresolvable placeholders untouched instead of failing.
    pub fn ignore_unresolvable(mut self, ignore: bool) -> Self {
        self.ignore_unresolvable = ignore;
        self
    }

    /// Infrastructure definition that registers this configurer.
    pub fn definition(self, name: impl Into<String>) -> BeanDefinition {
        BeanDefinition::factory_post_processor(name, move |_| Ok(Arc::new(self.clone()) as Arc<dyn BeanFactoryPostProcessor>))
            .order(OrderMarker::PriorityOrdered(LOWEST_PRECEDENCE))
            .role(BeanRole::Infrastructure)
    }

    fn resolve(&self, environment: Option<&Environment>, text: &str) -> DiResult<String> {
        resolve_placeholders_with(
            text,
            |key| {
                environment
                    .and_then(|env| env.property(key))
                    .or_else(|| self.local.get(key).cloned())
            },
            self.ignore_unresolvable,
        )
    }

    fn resolve_value(&self, environment: Option<&Environment>, value: &PropertyValue) -> DiResult<Option<PropertyValue>> {
        match value {
            PropertyValue::Text(text) if text.contains("${") => {
                Ok(Some(PropertyValue::Text(self.resolve(environment, text)?)))
            }
            _ => Ok(None),
        }
    }
}

impl BeanFactoryPostProcessor for PropertyPlaceholderConfigurer {
    fn name(&self) -> &str {
        "PropertyPlaceholderConfigurer"
    }

    fn post_process_bean_factory(&self, factory: &BeanFactory) -> DiResult<()> {
        let environment = if factory.contains_local_bean(ENVIRONMENT_BEAN_NAME) {
            Some(factory.get_bean_as::<Environment>(ENVIRONMENT_BEAN_NAME)?)
        } else {
            None
        };
        let environment = environment.as_deref();

        for name in factory.bean_definition_names() {
            let Some(definition) = factory.definition(&name) else {
                continue;
            };

            let mut args = Vec::new();
            for (index, value) in definition.constructor_args().iter().enumerate() {
                if let Some(resolved) = self.resolve_value(environment, value)? {
                    args.push((index, resolved));
                }
            }
            let mut properties = Vec::new();
            for (index, (_, value)) in definition.property_values().iter().enumerate() {
                if let Some(resolved) = self.resolve_value(environment, value)? {
                    properties.push((index, resolved));
                }
            }
            if args.is_empty() && properties.is_empty() {
                continue;
            }

            tracing::trace!(bean = %name, "resolved placeholders in bean definition");
            factory.modify_bean_definition(&name, |definition| {
                for (index, value) in args {
                    definition.constructor_args_mut()[index] = value;
                }
                for (index, value) in properties {
                    definition.property_values_mut()[index].1 = value;
                }
            })?;
        }
        Ok(())
    }
}
