//! Application context: the refresh lifecycle around a [`BeanFactory`].
//!
//! [`ApplicationContext::refresh`] runs the twelve [`RefreshPhase`]s in
//! order under the context monitor. Any failure aborts the refresh,
//! destroys the singletons created so far and leaves the context inactive.
//! [`ApplicationContext::close`] publishes the closed event, stops
//! lifecycle beans and destroys every singleton; it is idempotent and a
//! closed context cannot be refreshed again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::aop::{AdvisorAdapterRegistry, AutoProxyCreator, TargetSourceCreator};
use crate::config::{ContextSettings, ProxySettings};
use crate::definition::{AnyArc, BeanDefinition, Capability};
use crate::error::{DiError, DiResult};
use crate::event::{
    ApplicationEvent, ApplicationEventMulticaster, ApplicationListener, ApplicationListenerDetector, EventKind,
    ListenerHub, SimpleEventMulticaster, APPLICATION_EVENT_MULTICASTER_BEAN_NAME,
};
use crate::factory::{BeanFactory, BeanLookup, FactoryOptions, ParentLookup};
use crate::lifecycle::DefaultLifecycleProcessor;
use crate::message::{MessageSource, StaticMessageSource, MESSAGE_SOURCE_BEAN_NAME};
use crate::observer::{ContextObserver, Observers};
use crate::processor::{
    invoke_bean_factory_post_processors, register_bean_post_processors, BeanPostProcessor, FactoryProcessor,
};
use crate::registry::BeanDefinitionRegistry;

pub mod environment;

pub use environment::{Environment, PropertySource, ENVIRONMENT_BEAN_NAME};

/// Name of the lifecycle processor singleton.
pub const LIFECYCLE_PROCESSOR_BEAN_NAME: &str = "lifecycleProcessor";

/// Phases of [`ApplicationContext::refresh`], in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshPhase {
    PrepareRefresh,
    ObtainBeanFactory,
    PrepareBeanFactory,
    PostProcessBeanFactory,
    InvokeFactoryPostProcessors,
    RegisterBeanPostProcessors,
    InitMessageSource,
    InitEventMulticaster,
    OnRefresh,
    RegisterListeners,
    FinishBeanFactoryInitialization,
    FinishRefresh,
}

impl RefreshPhase {
    pub const ALL: &'static [RefreshPhase] = &[
        RefreshPhase::PrepareRefresh,
        RefreshPhase::ObtainBeanFactory,
        RefreshPhase::PrepareBeanFactory,
        RefreshPhase::PostProcessBeanFactory,
        RefreshPhase::InvokeFactoryPostProcessors,
        RefreshPhase::RegisterBeanPostProcessors,
        RefreshPhase::InitMessageSource,
        RefreshPhase::InitEventMulticaster,
        RefreshPhase::OnRefresh,
        RefreshPhase::RegisterListeners,
        RefreshPhase::FinishBeanFactoryInitialization,
        RefreshPhase::FinishRefresh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RefreshPhase::PrepareRefresh => "prepare-refresh",
            RefreshPhase::ObtainBeanFactory => "obtain-bean-factory",
            RefreshPhase::PrepareBeanFactory => "prepare-bean-factory",
            RefreshPhase::PostProcessBeanFactory => "post-process-bean-factory",
            RefreshPhase::InvokeFactoryPostProcessors => "invoke-factory-post-processors",
            RefreshPhase::RegisterBeanPostProcessors => "register-bean-post-processors",
            RefreshPhase::InitMessageSource => "init-message-source",
            RefreshPhase::InitEventMulticaster => "init-event-multicaster",
            RefreshPhase::OnRefresh => "on-refresh",
            RefreshPhase::RegisterListeners => "register-listeners",
            RefreshPhase::FinishBeanFactoryInitialization => "finish-bean-factory-initialization",
            RefreshPhase::FinishRefresh => "finish-refresh",
        }
    }
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies bean definitions to each fresh factory.
///
/// Stands in for configuration parsers; closures taking the registry
/// implement it directly.
pub trait DefinitionSource: Send + Sync {
    fn load(&self, registry: &dyn BeanDefinitionRegistry) -> DiResult<()>;
}

impl<F> DefinitionSource for F
where
    F: Fn(&dyn BeanDefinitionRegistry) -> DiResult<()> + Send + Sync,
{
    fn load(&self, registry: &dyn BeanDefinitionRegistry) -> DiResult<()> {
        self(registry)
    }
}

/// Extension points around the refresh and close sequences.
pub trait ContextHooks: Send + Sync {
    /// Adds or replaces property sources before required properties are
    /// validated.
    fn init_property_sources(&self, environment: &mut Environment) -> DiResult<()> {
        let _ = environment;
        Ok(())
    }

    /// Runs after the factory is prepared, before any factory
    /// post-processor.
    fn post_process_bean_factory(&self, factory: &BeanFactory) -> DiResult<()> {
        let _ = factory;
        Ok(())
    }

    /// Runs once the message source and multicaster exist, before
    /// singletons are created.
    fn on_refresh(&self, factory: &BeanFactory) -> DiResult<()> {
        let _ = factory;
        Ok(())
    }

    /// Runs at the end of close, after singletons are destroyed.
    fn on_close(&self) {}
}

/// Builder for [`ApplicationContext`].
#[derive(Default)]
pub struct ContextBuilder {
    settings: ContextSettings,
    definitions: Vec<BeanDefinition>,
    sources: Vec<Arc<dyn DefinitionSource>>,
    factory_processors: Vec<FactoryProcessor>,
    listeners: Vec<Arc<dyn ApplicationListener>>,
    observers: Observers,
    hooks: Vec<Arc<dyn ContextHooks>>,
    adapters: Option<Arc<AdvisorAdapterRegistry>>,
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
    parent: Option<ApplicationContext>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: ContextSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.settings.display_name = name.into();
        self
    }

    /// Definition registered into every fresh factory.
    pub fn definition(mut self, definition: BeanDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn definitions(mut self, definitions: impl IntoIterator<Item = BeanDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    pub fn source(mut self, source: impl DefinitionSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Factory post-processor invoked before any processor bean.
    pub fn factory_processor(mut self, processor: FactoryProcessor) -> Self {
        self.factory_processors.push(processor);
        self
    }

    /// Listener that is not a bean.
    pub fn listener(mut self, listener: Arc<dyn ApplicationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ContextObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ContextHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    /// Registers an [`AutoProxyCreator`] with these settings on every refresh.
    pub fn enable_auto_proxy(mut self, settings: ProxySettings) -> Self {
        self.settings.proxy = Some(settings);
        self
    }

    /// Adapter registry shared by every proxy this context creates.
    pub fn advisor_adapters(mut self, adapters: Arc<AdvisorAdapterRegistry>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.target_source_creators.push(creator);
        self
    }

    /// Parent context: its beans resolve names this context does not
    /// define, its property sources follow this context's own, it receives
    /// every event published here and it answers message codes this
    /// context cannot.
    pub fn parent(mut self, parent: ApplicationContext) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> ApplicationContext {
        let hub = Arc::new(ListenerHub::default());
        for listener in self.listeners {
            hub.add(listener);
        }
        let detector = Arc::new(ApplicationListenerDetector::new(hub.clone()));
        ApplicationContext {
            inner: Arc::new(ContextInner {
                display_name: self.settings.display_name.clone(),
                settings: self.settings,
                definitions: self.definitions,
                sources: self.sources,
                factory_processors: self.factory_processors,
                observers: self.observers,
                hooks: self.hooks,
                adapters: self.adapters.unwrap_or_default(),
                target_source_creators: self.target_source_creators,
                parent: self.parent,
                monitor: ReentrantMutex::new(()),
                refreshing: AtomicBool::new(false),
                active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown_hook: AtomicBool::new(false),
                startup_time: Mutex::new(None),
                environment: RwLock::new(Environment::new()),
                factory: RwLock::new(None),
                hub,
                detector,
                early_listeners: Mutex::new(None),
                early_events: Mutex::new(None),
                message_source: RwLock::new(None),
                lifecycle: RwLock::new(None),
                auto_proxy: RwLock::new(None),
            }),
        }
    }
}

struct ContextInner {
    display_name: String,
    settings: ContextSettings,
    definitions: Vec<BeanDefinition>,
    sources: Vec<Arc<dyn DefinitionSource>>,
    factory_processors: Vec<FactoryProcessor>,
    observers: Observers,
    hooks: Vec<Arc<dyn ContextHooks>>,
    adapters: Arc<AdvisorAdapterRegistry>,
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
    parent: Option<ApplicationContext>,
    monitor: ReentrantMutex<()>,
    refreshing: AtomicBool,
    active: AtomicBool,
    closed: AtomicBool,
    shutdown_hook: AtomicBool,
    startup_time: Mutex<Option<SystemTime>>,
    environment: RwLock<Environment>,
    factory: RwLock<Option<Arc<BeanFactory>>>,
    hub: Arc<ListenerHub>,
    detector: Arc<ApplicationListenerDetector>,
    early_listeners: Mutex<Option<Vec<Arc<dyn ApplicationListener>>>>,
    early_events: Mutex<Option<Vec<ApplicationEvent>>>,
    message_source: RwLock<Option<Arc<dyn MessageSource>>>,
    lifecycle: RwLock<Option<Arc<DefaultLifecycleProcessor>>>,
    auto_proxy: RwLock<Option<Arc<AutoProxyCreator>>>,
}

/// Clears the re-entry flag when a refresh ends, however it ends.
struct RefreshFlag<'a>(&'a AtomicBool);

impl Drop for RefreshFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ContextInner {
    fn refresh(&self) -> DiResult<()> {
        let _monitor = self.monitor.lock();
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return Err(DiError::LifecycleState(format!(
                "Refresh of '{}' is already in progress",
                self.display_name
            )));
        }
        let _flag = RefreshFlag(&self.refreshing);
        if self.closed.load(Ordering::Acquire) {
            return Err(DiError::LifecycleState(format!(
                "'{}' has been closed already and cannot be refreshed",
                self.display_name
            )));
        }

        let started = Instant::now();
        for &phase in RefreshPhase::ALL {
            let phase_started = Instant::now();
            self.observers.phase_started(phase);
            if let Err(error) = self.run_phase(phase) {
                self.cancel_refresh(phase, &error);
                return Err(error);
            }
            self.observers.phase_completed(phase, phase_started.elapsed());
        }
        tracing::info!(context = %self.display_name, elapsed = ?started.elapsed(), "context refreshed");
        Ok(())
    }

    fn run_phase(&self, phase: RefreshPhase) -> DiResult<()> {
        tracing::debug!(context = %self.display_name, phase = phase.as_str(), "refresh phase");
        match phase {
            RefreshPhase::PrepareRefresh => self.prepare_refresh(),
            RefreshPhase::ObtainBeanFactory => self.obtain_fresh_bean_factory(),
            RefreshPhase::PrepareBeanFactory => self.prepare_bean_factory(),
            RefreshPhase::PostProcessBeanFactory => {
                let factory = self.current_factory()?;
                self.hooks.iter().try_for_each(|h| h.post_process_bean_factory(&factory))
            }
            RefreshPhase::InvokeFactoryPostProcessors => {
                let factory = self.current_factory()?;
                invoke_bean_factory_post_processors(&factory, &self.factory_processors)
            }
            RefreshPhase::RegisterBeanPostProcessors => {
                let factory = self.current_factory()?;
                register_bean_post_processors(&factory, Some(self.detector.clone() as Arc<dyn BeanPostProcessor>))
            }
            RefreshPhase::InitMessageSource => self.init_message_source(),
            RefreshPhase::InitEventMulticaster => self.init_event_multicaster(),
            RefreshPhase::OnRefresh => {
                let factory = self.current_factory()?;
                self.hooks.iter().try_for_each(|h| h.on_refresh(&factory))
            }
            RefreshPhase::RegisterListeners => self.register_listeners(),
            RefreshPhase::FinishBeanFactoryInitialization => {
                let factory = self.current_factory()?;
                factory.freeze_configuration();
                factory.pre_instantiate_singletons()
            }
            RefreshPhase::FinishRefresh => self.finish_refresh(),
        }
    }

    fn prepare_refresh(&self) -> DiResult<()> {
        *self.startup_time.lock() = Some(SystemTime::now());
        self.active.store(true, Ordering::Release);
        tracing::debug!(context = %self.display_name, "refreshing");

        let mut environment = Environment::from_settings(&self.settings);
        if let Some(parent) = &self.parent {
            environment.merge(&parent.environment());
        }
        for hook in &self.hooks {
            hook.init_property_sources(&mut environment)?;
        }
        environment.validate_required_properties()?;
        *self.environment.write() = environment;

        {
            let mut early = self.early_listeners.lock();
            match early.as_ref() {
                Some(listeners) => self.hub.reset(listeners.clone()),
                None => *early = Some(self.hub.listeners()),
            }
        }
        *self.early_events.lock() = Some(Vec::new());
        Ok(())
    }

    fn obtain_fresh_bean_factory(&self) -> DiResult<()> {
        if let Some(previous) = self.factory.write().take() {
            previous.destroy_singletons();
        }
        let factory = BeanFactory::with_options(FactoryOptions {
            allow_bean_definition_overriding: self.settings.allow_bean_definition_overriding,
            allow_circular_references: self.settings.allow_circular_references,
            observers: self.observers.clone(),
            parent: self.parent.clone().map(|parent| Arc::new(parent) as ParentLookup),
        });
        for definition in &self.definitions {
            factory.register_bean_definition(definition.clone())?;
        }
        for source in &self.sources {
            source.load(&*factory)?;
        }
        tracing::debug!(
            context = %self.display_name,
            definitions = factory.bean_definition_count(),
            "loaded bean definitions"
        );
        *self.factory.write() = Some(factory);
        Ok(())
    }

    fn prepare_bean_factory(&self) -> DiResult<()> {
        let factory = self.current_factory()?;
        let environment: AnyArc = Arc::new(self.environment.read().clone());
        factory.register_singleton(ENVIRONMENT_BEAN_NAME, environment)?;
        factory.add_bean_post_processor(self.detector.clone());

        if let Some(settings) = &self.settings.proxy {
            let creator = self
                .target_source_creators
                .iter()
                .cloned()
                .fold(AutoProxyCreator::new(settings.clone(), self.adapters.clone()), |apc, tsc| {
                    apc.with_target_source_creator(tsc)
                });
            let creator = Arc::new(creator);
            factory.register_bean_definition(creator.definition())?;
            *self.auto_proxy.write() = Some(creator);
        }
        Ok(())
    }

    fn init_message_source(&self) -> DiResult<()> {
        let factory = self.current_factory()?;
        let source = if factory.contains_local_bean(MESSAGE_SOURCE_BEAN_NAME) {
            let source = factory.get_bean_trait::<dyn MessageSource>(MESSAGE_SOURCE_BEAN_NAME)?;
            tracing::trace!("using message source bean");
            source
        } else {
            let source: Arc<dyn MessageSource> = Arc::new(StaticMessageSource::new());
            factory.register_singleton_as(MESSAGE_SOURCE_BEAN_NAME, Arc::new(source.clone()), Capability::MessageSource)?;
            tracing::trace!("no message source bean; using an empty one");
            source
        };
        *self.message_source.write() = Some(source);
        Ok(())
    }

    fn init_event_multicaster(&self) -> DiResult<()> {
        let factory = self.current_factory()?;
        let multicaster = if factory.contains_local_bean(APPLICATION_EVENT_MULTICASTER_BEAN_NAME) {
            factory.get_bean_trait::<dyn ApplicationEventMulticaster>(APPLICATION_EVENT_MULTICASTER_BEAN_NAME)?
        } else {
            let multicaster: Arc<dyn ApplicationEventMulticaster> = Arc::new(SimpleEventMulticaster::new(factory.weak()));
            factory.register_singleton_as(
                APPLICATION_EVENT_MULTICASTER_BEAN_NAME,
                Arc::new(multicaster.clone()),
                Capability::EventMulticaster,
            )?;
            multicaster
        };
        self.hub.set_multicaster(Some(multicaster));
        Ok(())
    }

    fn register_listeners(&self) -> DiResult<()> {
        let factory = self.current_factory()?;
        let multicaster = self.multicaster()?;
        for listener in self.hub.listeners() {
            multicaster.add_listener(listener);
        }
        for name in factory.bean_names_for(Capability::Listener) {
            multicaster.add_listener_bean(&name);
        }
        let early = self.early_events.lock().take();
        for event in early.into_iter().flatten() {
            multicaster.multicast_event(&event);
        }
        Ok(())
    }

    fn finish_refresh(&self) -> DiResult<()> {
        let factory = self.current_factory()?;
        let lifecycle = Arc::new(DefaultLifecycleProcessor::new(factory.weak()));
        factory.register_singleton(LIFECYCLE_PROCESSOR_BEAN_NAME, lifecycle.clone())?;
        *self.lifecycle.write() = Some(lifecycle.clone());
        lifecycle.on_refresh()?;
        self.publish_event(ApplicationEvent::new(EventKind::ContextRefreshed, self.display_name.clone()))
    }

    fn cancel_refresh(&self, phase: RefreshPhase, error: &DiError) {
        tracing::warn!(
            context = %self.display_name,
            phase = phase.as_str(),
            %error,
            "exception encountered during context initialization; cancelling refresh attempt"
        );
        if let Some(factory) = self.factory.read().clone() {
            factory.destroy_singletons();
        }
        *self.early_events.lock() = None;
        self.hub.set_multicaster(None);
        self.active.store(false, Ordering::Release);
        self.observers.refresh_failed(phase, error);
    }

    fn close(&self) {
        let _monitor = self.monitor.lock();
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::debug!(context = %self.display_name, "closing");

        if let Err(error) = self.publish_event(ApplicationEvent::new(EventKind::ContextClosed, self.display_name.clone())) {
            tracing::warn!(%error, "exception thrown from application listener handling the closed event");
        }
        if let Some(lifecycle) = self.lifecycle.write().take() {
            lifecycle.on_close();
        }
        if let Some(factory) = self.factory.write().take() {
            factory.destroy_singletons();
        }
        for hook in &self.hooks {
            hook.on_close();
        }

        if let Some(listeners) = self.early_listeners.lock().clone() {
            self.hub.reset(listeners);
        }
        self.hub.set_multicaster(None);
        *self.message_source.write() = None;
        *self.auto_proxy.write() = None;
        self.active.store(false, Ordering::Release);
        self.observers.context_closed(&self.display_name);
    }

    fn publish_event(&self, event: ApplicationEvent) -> DiResult<()> {
        if !self.active.load(Ordering::Acquire) {
            return Err(self.inactive_error());
        }
        let buffered = {
            let mut early = self.early_events.lock();
            match early.as_mut() {
                Some(buffer) => {
                    buffer.push(event.clone());
                    true
                }
                None => false,
            }
        };
        if !buffered {
            self.multicaster()?.multicast_event(&event);
        }
        match &self.parent {
            Some(parent) => parent.publish_event(event),
            None => Ok(()),
        }
    }

    fn multicaster(&self) -> DiResult<Arc<dyn ApplicationEventMulticaster>> {
        self.hub.multicaster().ok_or_else(|| {
            DiError::LifecycleState(format!(
                "ApplicationEventMulticaster not initialized; call 'refresh' before multicasting events via '{}'",
                self.display_name
            ))
        })
    }

    fn current_factory(&self) -> DiResult<Arc<BeanFactory>> {
        self.factory
            .read()
            .clone()
            .ok_or_else(|| DiError::LifecycleState("Bean factory not initialized".to_string()))
    }

    fn active_factory(&self) -> DiResult<Arc<BeanFactory>> {
        if self.active.load(Ordering::Acquire) {
            if let Some(factory) = self.factory.read().clone() {
                return Ok(factory);
            }
        }
        Err(self.inactive_error())
    }

    fn inactive_error(&self) -> DiError {
        let state = if self.closed.load(Ordering::Acquire) {
            "has been closed already"
        } else {
            "has not been refreshed yet"
        };
        DiError::LifecycleState(format!("'{}' {state}", self.display_name))
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if self.shutdown_hook.load(Ordering::Acquire) {
            self.close();
        }
    }
}

/// Bean container with an ordered refresh lifecycle.
///
/// Cloning is cheap; clones share the same context.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, DiError};
///
/// struct Repository;
/// struct Service { repository: std::sync::Arc<Repository> }
///
/// let context = ApplicationContext::builder()
///     .display_name("shop")
///     .definition(BeanDefinition::of::<Repository, _>("repository", |_| Ok(Repository)))
///     .definition(BeanDefinition::of::<Service, _>("service", |ctx| {
///         Ok(Service { repository: ctx.get_bean_as::<Repository>("repository")? })
///     }))
///     .build();
///
/// context.refresh().unwrap();
/// let service = context.get_bean_as::<Service>("service").unwrap();
/// assert!(std::sync::Arc::ptr_eq(&service.repository, &context.get_bean_as::<Repository>("repository").unwrap()));
///
/// context.close();
/// assert!(matches!(context.get_bean("service"), Err(DiError::LifecycleState(_))));
/// ```
#[derive(Clone)]
pub struct ApplicationContext {
    inner: Arc<ContextInner>,
}

impl ApplicationContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Runs the full refresh sequence; see [`RefreshPhase`].
    pub fn refresh(&self) -> DiResult<()> {
        self.inner.refresh()
    }

    /// Closes the context. Further calls do nothing.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Closes the context when the last handle is dropped. Returns `false`
    /// if the hook was already registered.
    pub fn register_shutdown_hook(&self) -> bool {
        !self.inner.shutdown_hook.swap(true, Ordering::AcqRel)
    }

    /// Starts every lifecycle bean, including those without auto-startup.
    pub fn start(&self) -> DiResult<()> {
        self.inner.active_factory()?;
        if let Some(lifecycle) = self.inner.lifecycle.read().clone() {
            lifecycle.start()?;
        }
        self.publish_event(ApplicationEvent::new(EventKind::ContextStarted, self.display_name()))
    }

    pub fn stop(&self) -> DiResult<()> {
        self.inner.active_factory()?;
        if let Some(lifecycle) = self.inner.lifecycle.read().clone() {
            lifecycle.stop();
        }
        self.publish_event(ApplicationEvent::new(EventKind::ContextStopped, self.display_name()))
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lifecycle
            .read()
            .as_ref()
            .is_some_and(|lifecycle| lifecycle.is_running())
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn parent(&self) -> Option<&ApplicationContext> {
        self.inner.parent.as_ref()
    }

    /// Time the last refresh started.
    pub fn startup_time(&self) -> Option<SystemTime> {
        *self.inner.startup_time.lock()
    }

    /// Snapshot of the environment built by the last refresh.
    pub fn environment(&self) -> Environment {
        self.inner.environment.read().clone()
    }

    pub fn bean_factory(&self) -> DiResult<Arc<BeanFactory>> {
        self.inner.active_factory()
    }

    /// Auto-proxy creator of the current refresh, when auto-proxying is
    /// enabled.
    pub fn auto_proxy_creator(&self) -> Option<Arc<AutoProxyCreator>> {
        self.inner.auto_proxy.read().clone()
    }

    /// Publishes `event` to every listener; events published during refresh
    /// are delivered once listeners are registered.
    pub fn publish_event(&self, event: ApplicationEvent) -> DiResult<()> {
        self.inner.publish_event(event)
    }

    /// Adds a listener that is not a bean.
    pub fn add_listener(&self, listener: Arc<dyn ApplicationListener>) {
        self.inner.hub.add(listener);
    }

    pub fn get_message(&self, code: &str, args: &[&dyn fmt::Display], default: Option<&str>) -> DiResult<String> {
        self.inner.active_factory()?;
        let source = self.inner.message_source.read().clone().ok_or_else(|| {
            DiError::LifecycleState("MessageSource not initialized; call 'refresh' first".to_string())
        })?;
        match (&self.inner.parent, source.message(code, args, None)) {
            (Some(parent), Err(DiError::Configuration(_))) => parent.get_message(code, args, default),
            (None, Err(DiError::Configuration(_))) if default.is_some() => source.message(code, args, default),
            (_, resolved) => resolved,
        }
    }

    /// Whether this context itself, ignoring the parent, holds `name`.
    pub fn contains_local_bean(&self, name: &str) -> bool {
        self.inner
            .factory
            .read()
            .as_ref()
            .is_some_and(|factory| factory.contains_local_bean(name))
    }

    pub fn bean_definition_names(&self) -> DiResult<Vec<String>> {
        Ok(self.inner.active_factory()?.bean_definition_names())
    }

    pub fn bean_names_for(&self, capability: Capability) -> DiResult<Vec<String>> {
        Ok(self.inner.active_factory()?.bean_names_for(capability))
    }
}

impl BeanLookup for ApplicationContext {
    fn get_bean(&self, name: &str) -> DiResult<AnyArc> {
        self.inner.active_factory()?.get_bean(name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.inner
            .factory
            .read()
            .as_ref()
            .is_some_and(|factory| factory.contains_bean(name))
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("display_name", &self.inner.display_name)
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .field("parent", &self.parent().map(ApplicationContext::display_name))
            .field("startup_time", &self.startup_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    #[test]
    fn phases_are_listed_in_execution_order() {
        assert_eq!(RefreshPhase::ALL.len(), 12);
        assert_eq!(RefreshPhase::ALL[0], RefreshPhase::PrepareRefresh);
        assert_eq!(RefreshPhase::ALL[11].to_string(), "finish-refresh");
    }

    #[test]
    fn access_before_refresh_and_after_close_fails() {
        let context = ApplicationContext::builder()
            .definition(BeanDefinition::of::<u8, _>("byte", |_| Ok(7)))
            .build();
        let err = context.get_bean("byte").unwrap_err();
        assert!(err.to_string().contains("has not been refreshed yet"));

        context.refresh().unwrap();
        assert_eq!(*context.get_bean_as::<u8>("byte").unwrap(), 7);

        context.close();
        let err = context.get_bean("byte").unwrap_err();
        assert!(err.to_string().contains("has been closed already"));
        assert!(matches!(context.refresh(), Err(DiError::LifecycleState(_))));
    }

    #[test]
    fn refresh_from_inside_refresh_is_rejected() {
        struct Reenter(PlMutex<Option<ApplicationContext>>, PlMutex<Option<DiError>>);
        impl ContextHooks for Reenter {
            fn on_refresh(&self, _: &BeanFactory) -> DiResult<()> {
                if let Some(context) = self.0.lock().take() {
                    *self.1.lock() = context.refresh().err();
                }
                Ok(())
            }
        }

        let hooks = Arc::new(Reenter(PlMutex::new(None), PlMutex::new(None)));
        let context = ApplicationContext::builder().hooks(hooks.clone()).build();
        *hooks.0.lock() = Some(context.clone());
        context.refresh().unwrap();

        assert!(matches!(hooks.1.lock().take(), Some(DiError::LifecycleState(_))));
    }

    #[test]
    fn events_published_during_refresh_are_replayed_after_listener_registration() {
        struct Publisher(PlMutex<Option<ApplicationContext>>);
        impl ContextHooks for Publisher {
            fn on_refresh(&self, _: &BeanFactory) -> DiResult<()> {
                match self.0.lock().take() {
                    Some(context) => context.publish_event(ApplicationEvent::custom("early", "test")),
                    None => Ok(()),
                }
            }
        }

        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        let hooks = Arc::new(Publisher(PlMutex::new(None)));
        let context = ApplicationContext::builder()
            .hooks(hooks.clone())
            .listener(Arc::new(move |e: &ApplicationEvent| -> DiResult<()> {
                sink.lock().push(e.kind().name().to_string());
                Ok(())
            }))
            .build();
        *hooks.0.lock() = Some(context.clone());

        context.refresh().unwrap();
        assert_eq!(*seen.lock(), vec!["early".to_string(), "ContextRefreshed".to_string()]);
    }

    #[test]
    fn default_infrastructure_singletons_exist_after_refresh() {
        let context = ApplicationContext::builder().build();
        context.refresh().unwrap();
        for name in [
            ENVIRONMENT_BEAN_NAME,
            MESSAGE_SOURCE_BEAN_NAME,
            APPLICATION_EVENT_MULTICASTER_BEAN_NAME,
            LIFECYCLE_PROCESSOR_BEAN_NAME,
        ] {
            assert!(context.contains_bean(name), "{name}");
        }
        assert!(context.get_bean_trait::<dyn MessageSource>(MESSAGE_SOURCE_BEAN_NAME).is_ok());
        assert!(context.get_bean_as::<DefaultLifecycleProcessor>(LIFECYCLE_PROCESSOR_BEAN_NAME).is_ok());
    }

    #[test]
    fn shutdown_hook_registration_is_idempotent() {
        let context = ApplicationContext::builder().build();
        assert!(context.register_shutdown_hook());
        assert!(!context.register_shutdown_hook());
    }
}
