//! Bean post-processor that wraps advised beans in proxies.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::aop::advice::{Advice, MethodInterceptor};
use crate::aop::advisor::{Advisor, AdvisorAdapterRegistry, Aspect};
use crate::aop::pointcut::{simple_match, Pointcut};
use crate::aop::proxy::{PrototypeTargetSource, ProxyConfig, ProxyHandle, ProxyKind, SingletonTargetSource, TargetSource};
use crate::config::ProxySettings;
use crate::definition::{AnyArc, BeanDefinition, Capability, ProxyBinding};
use crate::error::{DiError, DiResult};
use crate::factory::{BeanFactory, BeanLookup, BeanMeta};
use crate::order::{OrderMarker, HIGHEST_PRECEDENCE};
use crate::processor::{BeanPostProcessor, Hook};
use crate::scope::BeanRole;

/// Name under which a context registers its auto-proxy creator.
pub const AUTO_PROXY_CREATOR_BEAN_NAME: &str = "internalAutoProxyCreator";

/// Supplies a custom target source for a bean before it is constructed.
///
/// A bean that gets one is proxied immediately and never built through the
/// normal creation protocol.
pub trait TargetSourceCreator: Send + Sync {
    fn target_source(&self, factory: &BeanFactory, meta: &BeanMeta<'_>) -> DiResult<Option<Arc<dyn TargetSource>>>;
}

/// Gives beans whose names match one of the `*` patterns a
/// [`PrototypeTargetSource`]: every proxied call runs on a fresh target.
#[derive(Debug, Clone)]
pub struct PrototypeTargetSourceCreator {
    patterns: Vec<String>,
}

impl PrototypeTargetSourceCreator {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl TargetSourceCreator for PrototypeTargetSourceCreator {
    fn target_source(&self, factory: &BeanFactory, meta: &BeanMeta<'_>) -> DiResult<Option<Arc<dyn TargetSource>>> {
        let Some(definition) = meta.definition else {
            return Ok(None);
        };
        if definition.capability() != Capability::Bean || !self.patterns.iter().any(|p| simple_match(p, meta.name)) {
            return Ok(None);
        }
        Ok(Some(Arc::new(PrototypeTargetSource::new(
            factory.weak(),
            Arc::new(definition.clone()),
        ))))
    }
}

/// Wraps every bean matched by at least one advisor in a proxy.
///
/// Decisions are cached per bean: a bean judged not worth proxying is never
/// evaluated again, and a bean already wrapped as an early reference for a
/// circular dependency is not wrapped a second time after initialization.
///
/// Advisors come from `Advisor` beans and from the advisors built by
/// `Aspect` beans; `interceptor_names` in the settings name common
/// interceptors applied to every proxied bean.
pub struct AutoProxyCreator {
    settings: ProxySettings,
    adapters: Arc<AdvisorAdapterRegistry>,
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
    advised_beans: RwLock<HashMap<String, bool>>,
    proxy_types: RwLock<HashMap<String, ProxyKind>>,
    early_proxy_references: RwLock<HashMap<String, usize>>,
    target_sourced_beans: RwLock<HashSet<String>>,
    aspect_advisors: RwLock<HashMap<String, Vec<Advisor>>>,
}

impl AutoProxyCreator {
    pub fn new(settings: ProxySettings, adapters: Arc<AdvisorAdapterRegistry>) -> Self {
        Self {
            settings,
            adapters,
            target_source_creators: Vec::new(),
            advised_beans: RwLock::new(HashMap::new()),
            proxy_types: RwLock::new(HashMap::new()),
            early_proxy_references: RwLock::new(HashMap::new()),
            target_sourced_beans: RwLock::new(HashSet::new()),
            aspect_advisors: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.target_source_creators.push(creator);
        self
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Infrastructure definition registering this creator.
    pub fn definition(self: &Arc<Self>) -> BeanDefinition {
        let creator = self.clone();
        BeanDefinition::bean_post_processor(AUTO_PROXY_CREATOR_BEAN_NAME, move |_| {
            Ok(creator.clone() as Arc<dyn BeanPostProcessor>)
        })
        .order(OrderMarker::Ordered(HIGHEST_PRECEDENCE))
        .role(BeanRole::Infrastructure)
        .aop_infrastructure()
    }

    /// Proxy strategy used for a bean, keyed like the decision cache.
    pub fn proxy_kind(&self, cache_key: &str) -> Option<ProxyKind> {
        self.proxy_types.read().get(cache_key).copied()
    }

    /// `Some(true)` proxied, `Some(false)` left alone, `None` not evaluated.
    pub fn advised(&self, cache_key: &str) -> Option<bool> {
        self.advised_beans.read().get(cache_key).copied()
    }

    fn wrap_if_necessary(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        if self.target_sourced_beans.read().contains(meta.name) {
            return Ok(bean);
        }
        let key = meta.cache_key();
        if self.advised(&key) == Some(false) {
            return Ok(bean);
        }
        if is_infrastructure(meta) || should_skip(meta) {
            self.advised_beans.write().insert(key, false);
            return Ok(bean);
        }

        let specific = self.eligible_advisors(factory, meta)?;
        let common = if specific.is_empty() && !has_binding(meta) {
            Vec::new()
        } else {
            self.common_advisors(factory)?
        };
        if specific.is_empty() && common.is_empty() {
            tracing::trace!(bean = meta.name, "no advisors apply; not proxying");
            self.advised_beans.write().insert(key, false);
            return Ok(bean);
        }

        self.advised_beans.write().insert(key.clone(), true);
        let target_source = Arc::new(SingletonTargetSource::new(bean));
        let (proxy, kind) = self.create_proxy(meta, target_source, specific, common)?;
        self.proxy_types.write().insert(key, kind);
        Ok(proxy)
    }

    fn eligible_advisors(&self, factory: &BeanFactory, meta: &BeanMeta<'_>) -> DiResult<Vec<Advisor>> {
        let mut eligible: Vec<Advisor> = self
            .candidate_advisors(factory)?
            .into_iter()
            .filter(|advisor| advisor.applies_to(meta.class))
            .collect();
        eligible.sort_by_key(Advisor::order);
        Ok(eligible)
    }

    fn candidate_advisors(&self, factory: &BeanFactory) -> DiResult<Vec<Advisor>> {
        let mut advisors = Vec::new();
        for name in factory.bean_names_for(Capability::Advisor) {
            if factory.is_currently_in_creation(&name) {
                tracing::trace!(advisor = %name, "skipping advisor that is currently in creation");
                continue;
            }
            let advisor = factory.get_bean_as::<Advisor>(&name)?;
            advisors.push(Advisor::clone(&advisor));
        }

        for name in factory.bean_names_for(Capability::Aspect) {
            if let Some(cached) = self.aspect_advisors.read().get(&name) {
                advisors.extend(cached.iter().cloned());
                continue;
            }
            if factory.is_currently_in_creation(&name) {
                tracing::trace!(aspect = %name, "skipping aspect that is currently in creation");
                continue;
            }
            let aspect = factory.get_bean_trait::<dyn Aspect>(&name)?;
            let order = aspect.order();
            let mut built = aspect.advisors()?;
            for advisor in &mut built {
                advisor.default_order(order);
            }
            tracing::debug!(aspect = %name, advisors = built.len(), "built advisors from aspect");
            self.aspect_advisors.write().insert(name, built.clone());
            advisors.extend(built);
        }
        Ok(advisors)
    }

    fn common_advisors(&self, factory: &BeanFactory) -> DiResult<Vec<Advisor>> {
        self.settings
            .interceptor_names
            .iter()
            .map(|name| {
                let bean = factory.get_bean(name)?;
                self.adapters.wrap(name, &bean)
            })
            .collect()
    }

    fn create_proxy(
        &self,
        meta: &BeanMeta<'_>,
        target_source: Arc<dyn TargetSource>,
        specific: Vec<Advisor>,
        common: Vec<Advisor>,
    ) -> DiResult<(AnyArc, ProxyKind)> {
        let advisors: Vec<Advisor> = if self.settings.apply_common_interceptors_first {
            common.into_iter().chain(specific).collect()
        } else {
            specific.into_iter().chain(common).collect()
        };
        let (binding, kind) = self.choose_binding(meta)?;
        tracing::debug!(
            bean = meta.name,
            proxy = ?kind,
            advisors = advisors.len(),
            "creating proxy"
        );

        let handle = ProxyHandle::new(ProxyConfig {
            bean_name: meta.name.to_string(),
            class: meta.class.clone(),
            target_source,
            target_view: match kind {
                ProxyKind::Interface(_) => binding.view(),
                ProxyKind::Class(_) => None,
            },
            advisors,
            adapters: self.adapters.clone(),
            expose_proxy: self.settings.expose_proxy,
            frozen: self.settings.frozen,
        });
        Ok((binding.build(handle), kind))
    }

    fn choose_binding<'m>(&self, meta: &BeanMeta<'m>) -> DiResult<(&'m ProxyBinding, ProxyKind)> {
        let class = meta.class;
        let force_class = self.settings.proxy_target_class || meta.preserve_target_class;
        if !force_class {
            if let Some(binding) = class.interfaces().first() {
                return Ok((binding, ProxyKind::Interface(binding.name())));
            }
        }
        if let Some(binding) = class.class_proxy() {
            return Ok((binding, ProxyKind::Class(binding.name())));
        }
        // Trait-object targets can only be proxied through their interface.
        if class.is_trait_object() {
            if let Some(binding) = class.interfaces().first() {
                return Ok((binding, ProxyKind::Interface(binding.name())));
            }
        }
        let message = if force_class && !class.interfaces().is_empty() {
            "target-class proxying is required but no class proxy binding is declared"
        } else {
            "no interface or class proxy binding is declared"
        };
        Err(DiError::ProxyCreation {
            bean: meta.name.to_string(),
            message: message.to_string(),
        })
    }
}

impl BeanPostProcessor for AutoProxyCreator {
    fn name(&self) -> &str {
        "AutoProxyCreator"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::BeforeInstantiation, Hook::EarlyReference, Hook::AfterInitialization]
    }

    fn before_instantiation(&self, factory: &BeanFactory, meta: &BeanMeta<'_>) -> DiResult<Option<AnyArc>> {
        let key = meta.cache_key();
        if !self.target_sourced_beans.read().contains(meta.name) {
            if self.advised_beans.read().contains_key(&key) {
                return Ok(None);
            }
            if is_infrastructure(meta) || should_skip(meta) {
                self.advised_beans.write().insert(key, false);
                return Ok(None);
            }
        }

        for creator in &self.target_source_creators {
            let Some(target_source) = creator.target_source(factory, meta)? else {
                continue;
            };
            self.target_sourced_beans.write().insert(meta.name.to_string());
            let specific = self.eligible_advisors(factory, meta)?;
            let common = self.common_advisors(factory)?;
            let (proxy, kind) = self.create_proxy(meta, target_source, specific, common)?;
            self.proxy_types.write().insert(key, kind);
            return Ok(Some(proxy));
        }
        Ok(None)
    }

    fn early_bean_reference(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        self.early_proxy_references
            .write()
            .insert(meta.cache_key(), address_of(&bean));
        self.wrap_if_necessary(factory, bean, meta)
    }

    fn after_initialization(&self, factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        let early = self.early_proxy_references.write().remove(&meta.cache_key());
        if early == Some(address_of(&bean)) {
            return Ok(bean);
        }
        self.wrap_if_necessary(factory, bean, meta)
    }
}

impl fmt::Debug for AutoProxyCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoProxyCreator")
            .field("settings", &self.settings)
            .field("advised_beans", &self.advised_beans.read().len())
            .field("proxies", &self.proxy_types.read().len())
            .finish()
    }
}

fn address_of(bean: &AnyArc) -> usize {
    Arc::as_ptr(bean) as *const () as usize
}

/// Advice, advisors, aspects, pointcuts and container processors are never
/// proxied.
fn is_infrastructure(meta: &BeanMeta<'_>) -> bool {
    if meta.class.is_aop_infrastructure() {
        return true;
    }
    if matches!(
        meta.capability,
        Capability::Advisor
            | Capability::Aspect
            | Capability::BeanPostProcessor
            | Capability::FactoryPostProcessor
            | Capability::RegistryPostProcessor
            | Capability::EventMulticaster
    ) {
        return true;
    }
    let type_id = meta.class.type_id();
    type_id == TypeId::of::<Advice>()
        || type_id == TypeId::of::<Advisor>()
        || type_id == TypeId::of::<Arc<dyn MethodInterceptor>>()
        || type_id == TypeId::of::<Arc<dyn Pointcut>>()
}

/// Beans registered as `<type>.ORIGINAL` hold an original instance and are
/// left alone.
fn should_skip(meta: &BeanMeta<'_>) -> bool {
    meta.name
        .strip_prefix(meta.class.type_name())
        .is_some_and(|rest| rest == ".ORIGINAL")
}

fn has_binding(meta: &BeanMeta<'_>) -> bool {
    !meta.class.interfaces().is_empty() || meta.class.class_proxy().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BeanDefinitionRegistry;
    use parking_lot::Mutex;

    trait Greeter: Send + Sync {
        fn greet(&self) -> DiResult<String>;
    }

    struct Plain;

    impl Greeter for Plain {
        fn greet(&self) -> DiResult<String> {
            Ok("hi".into())
        }
    }

    struct GreeterProxy(ProxyHandle);

    impl Greeter for GreeterProxy {
        fn greet(&self) -> DiResult<String> {
            self.0.invoke::<dyn Greeter, _>("greet", &[], |t| t.greet())
        }
    }

    fn greeter(name: &str) -> BeanDefinition {
        BeanDefinition::trait_object::<dyn Greeter, _>(name, |_| Ok(Arc::new(Plain) as Arc<dyn Greeter>))
            .methods(&["greet"])
            .interface_proxy::<dyn Greeter, _>("Greeter", |h| Arc::new(GreeterProxy(h)))
    }

    fn factory_with(creator: &Arc<AutoProxyCreator>) -> Arc<BeanFactory> {
        let factory = BeanFactory::new();
        factory.add_bean_post_processor(creator.clone());
        factory
    }

    fn creator(settings: ProxySettings) -> Arc<AutoProxyCreator> {
        Arc::new(AutoProxyCreator::new(settings, Arc::new(AdvisorAdapterRegistry::new())))
    }

    #[test]
    fn unadvised_bean_is_returned_unchanged_and_cached() {
        let apc = creator(ProxySettings::default());
        let factory = factory_with(&apc);
        factory.register_bean_definition(greeter("greeter")).unwrap();

        let bean = factory.get_bean_trait::<dyn Greeter>("greeter").unwrap();
        assert_eq!(bean.greet().unwrap(), "hi");
        assert_eq!(apc.advised("greeter"), Some(false));
        assert_eq!(apc.proxy_kind("greeter"), None);
    }

    #[test]
    fn matched_bean_is_proxied_once() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let apc = creator(ProxySettings::default());
        let factory = factory_with(&apc);
        factory.register_bean_definition(greeter("greeter")).unwrap();
        factory
            .register_bean_definition(BeanDefinition::advisor("counting", move |_| {
                let counter = counter.clone();
                Advisor::expression(
                    "execution(* Greeter.greet(..))",
                    Advice::before(move |_| {
                        *counter.lock() += 1;
                        Ok(())
                    }),
                )
            }))
            .unwrap();

        let first = factory.get_bean("greeter").unwrap();
        let second = factory.get_bean("greeter").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let proxy = factory.get_bean_trait::<dyn Greeter>("greeter").unwrap();
        assert_eq!(proxy.greet().unwrap(), "hi");
        assert_eq!(*calls.lock(), 1);
        assert_eq!(apc.proxy_kind("greeter"), Some(ProxyKind::Interface("Greeter")));
        assert_eq!(apc.advised("counting"), Some(false));
    }

    #[test]
    fn advised_bean_without_binding_fails_proxy_creation() {
        struct Bare;
        let apc = creator(ProxySettings::default());
        let factory = factory_with(&apc);
        factory
            .register_bean_definition(BeanDefinition::of::<Bare, _>("bare", |_| Ok(Bare)).methods(&["run"]))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::advisor("all", |_| {
                Ok(Advisor::for_all(Advice::before(|_| Ok(()))))
            }))
            .unwrap();

        assert!(matches!(factory.get_bean("bare"), Err(DiError::ProxyCreation { .. })));
    }

    #[test]
    fn original_instance_names_are_skipped() {
        let apc = creator(ProxySettings::default());
        let name = format!("{}.ORIGINAL", std::any::type_name::<dyn Greeter>());
        let def = greeter(&name);
        let meta = BeanMeta::of(&def);
        let factory = factory_with(&apc);
        assert!(apc.before_instantiation(&factory, &meta).unwrap().is_none());
        assert_eq!(apc.advised(&name), Some(false));
    }

    #[test]
    fn prototype_target_source_builds_target_per_call() {
        let built = Arc::new(Mutex::new(0));
        let counter = built.clone();
        let apc = Arc::new(
            AutoProxyCreator::new(ProxySettings::default(), Arc::new(AdvisorAdapterRegistry::new()))
                .with_target_source_creator(Arc::new(PrototypeTargetSourceCreator::new(["pooled*"]))),
        );
        let factory = factory_with(&apc);
        factory
            .register_bean_definition(
                BeanDefinition::trait_object::<dyn Greeter, _>("pooledGreeter", move |_| {
                    *counter.lock() += 1;
                    Ok(Arc::new(Plain) as Arc<dyn Greeter>)
                })
                .interface_proxy::<dyn Greeter, _>("Greeter", |h| Arc::new(GreeterProxy(h))),
            )
            .unwrap();

        let proxy = factory.get_bean_trait::<dyn Greeter>("pooledGreeter").unwrap();
        assert_eq!(*built.lock(), 0);
        proxy.greet().unwrap();
        proxy.greet().unwrap();
        assert_eq!(*built.lock(), 2);
    }
}
