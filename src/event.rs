//! Application events, listeners and the multicaster that delivers them.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use indexmap::IndexSet;
use parking_lot::RwLock;

use crate::definition::{AnyArc, Capability};
use crate::error::DiResult;
use crate::factory::{BeanFactory, BeanLookup, BeanMeta};
use crate::processor::{BeanPostProcessor, Hook};

/// Name of the multicaster singleton.
pub const APPLICATION_EVENT_MULTICASTER_BEAN_NAME: &str = "applicationEventMulticaster";

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    ContextRefreshed,
    ContextStarted,
    ContextStopped,
    ContextClosed,
    /// Application-defined event
    Custom(String),
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::ContextRefreshed => "ContextRefreshed",
            EventKind::ContextStarted => "ContextStarted",
            EventKind::ContextStopped => "ContextStopped",
            EventKind::ContextClosed => "ContextClosed",
            EventKind::Custom(name) => name,
        }
    }
}

/// Event delivered to [`ApplicationListener`]s.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationEvent, EventKind};
///
/// let event = ApplicationEvent::custom("orderPlaced", "checkout").with_payload(42u64);
/// assert_eq!(event.kind(), &EventKind::Custom("orderPlaced".into()));
/// assert_eq!(event.source(), "checkout");
/// assert_eq!(event.payload::<u64>(), Some(&42));
/// assert_eq!(event.payload::<String>(), None);
/// ```
#[derive(Clone)]
pub struct ApplicationEvent {
    kind: EventKind,
    source: String,
    timestamp: SystemTime,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ApplicationEvent {
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            timestamp: SystemTime::now(),
            payload: None,
        }
    }

    pub fn custom(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(EventKind::Custom(name.into()), source)
    }

    pub fn with_payload<P: Send + Sync + 'static>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Display name of the publisher.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn payload<P: 'static>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<P>())
    }
}

impl fmt::Debug for ApplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationEvent")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("timestamp", &self.timestamp)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Receives application events.
///
/// Closures taking `&ApplicationEvent` implement it directly.
pub trait ApplicationListener: Send + Sync {
    fn on_event(&self, event: &ApplicationEvent) -> DiResult<()>;

    /// Filters the events this listener is called for.
    fn supports(&self, kind: &EventKind) -> bool {
        let _ = kind;
        true
    }
}

impl<F> ApplicationListener for F
where
    F: Fn(&ApplicationEvent) -> DiResult<()> + Send + Sync,
{
    fn on_event(&self, event: &ApplicationEvent) -> DiResult<()> {
        self(event)
    }
}

/// Manages listeners and delivers events to them.
pub trait ApplicationEventMulticaster: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn ApplicationListener>);

    /// Adds a listener bean, resolved from the factory at delivery time.
    fn add_listener_bean(&self, name: &str);

    fn remove_listener(&self, listener: &Arc<dyn ApplicationListener>);

    fn remove_listener_bean(&self, name: &str);

    fn remove_all_listeners(&self);

    /// Delivers `event` to every listener that supports it.
    fn multicast_event(&self, event: &ApplicationEvent);
}

/// Synchronous multicaster: listeners run on the publishing thread in
/// registration order. Listener failures are logged and do not reach the
/// publisher.
pub struct SimpleEventMulticaster {
    factory: Weak<BeanFactory>,
    listeners: RwLock<Vec<Arc<dyn ApplicationListener>>>,
    listener_beans: RwLock<IndexSet<String>>,
}

impl SimpleEventMulticaster {
    pub fn new(factory: Weak<BeanFactory>) -> Self {
        Self {
            factory,
            listeners: RwLock::new(Vec::new()),
            listener_beans: RwLock::new(IndexSet::new()),
        }
    }

    /// Current listeners, instances first, then resolved listener beans,
    /// without duplicates.
    pub fn listeners(&self) -> Vec<Arc<dyn ApplicationListener>> {
        let mut all: Vec<Arc<dyn ApplicationListener>> = self.listeners.read().clone();
        let names: Vec<String> = self.listener_beans.read().iter().cloned().collect();
        if names.is_empty() {
            return all;
        }
        let Some(factory) = self.factory.upgrade() else {
            return all;
        };
        for name in names {
            match factory.get_bean_trait::<dyn ApplicationListener>(&name) {
                Ok(listener) => {
                    if !all.iter().any(|l| same_listener(l, &listener)) {
                        all.push(listener);
                    }
                }
                Err(error) => tracing::warn!(listener = %name, %error, "skipping listener bean that could not be resolved"),
            }
        }
        all
    }
}

impl ApplicationEventMulticaster for SimpleEventMulticaster {
    fn add_listener(&self, listener: Arc<dyn ApplicationListener>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    fn add_listener_bean(&self, name: &str) {
        self.listener_beans.write().insert(name.to_string());
    }

    fn remove_listener(&self, listener: &Arc<dyn ApplicationListener>) {
        self.listeners.write().retain(|l| !same_listener(l, listener));
    }

    fn remove_listener_bean(&self, name: &str) {
        self.listener_beans.write().shift_remove(name);
    }

    fn remove_all_listeners(&self) {
        self.listeners.write().clear();
        self.listener_beans.write().clear();
    }

    fn multicast_event(&self, event: &ApplicationEvent) {
        tracing::trace!(event = event.kind().name(), "multicasting event");
        for listener in self.listeners() {
            if !listener.supports(event.kind()) {
                continue;
            }
            if let Err(error) = listener.on_event(event) {
                tracing::warn!(event = event.kind().name(), %error, "application listener failed");
            }
        }
    }
}

impl fmt::Debug for SimpleEventMulticaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleEventMulticaster")
            .field("listeners", &self.listeners.read().len())
            .field("listener_beans", &*self.listener_beans.read())
            .finish()
    }
}

fn same_listener(a: &Arc<dyn ApplicationListener>, b: &Arc<dyn ApplicationListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Listeners known to a context: added before refresh or detected among
/// created beans, forwarded to the multicaster once it exists.
#[derive(Default)]
pub(crate) struct ListenerHub {
    listeners: RwLock<Vec<Arc<dyn ApplicationListener>>>,
    multicaster: RwLock<Option<Arc<dyn ApplicationEventMulticaster>>>,
}

impl ListenerHub {
    pub(crate) fn add(&self, listener: Arc<dyn ApplicationListener>) {
        if let Some(multicaster) = self.multicaster.read().as_ref() {
            multicaster.add_listener(listener.clone());
        }
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn ApplicationListener>, bean_name: &str) {
        if let Some(multicaster) = self.multicaster.read().as_ref() {
            multicaster.remove_listener(listener);
            multicaster.remove_listener_bean(bean_name);
        }
        self.listeners.write().retain(|l| !same_listener(l, listener));
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ApplicationListener>> {
        self.listeners.read().clone()
    }

    /// Restores the listener set captured before a refresh.
    pub(crate) fn reset(&self, listeners: Vec<Arc<dyn ApplicationListener>>) {
        *self.listeners.write() = listeners;
    }

    pub(crate) fn set_multicaster(&self, multicaster: Option<Arc<dyn ApplicationEventMulticaster>>) {
        *self.multicaster.write() = multicaster;
    }

    pub(crate) fn multicaster(&self) -> Option<Arc<dyn ApplicationEventMulticaster>> {
        self.multicaster.read().clone()
    }
}

/// Registers singleton listener beans with the context once they are fully
/// initialized (proxied if advised) and unregisters them on destruction.
pub(crate) struct ApplicationListenerDetector {
    hub: Arc<ListenerHub>,
}

impl ApplicationListenerDetector {
    pub(crate) fn new(hub: Arc<ListenerHub>) -> Self {
        Self { hub }
    }
}

impl BeanPostProcessor for ApplicationListenerDetector {
    fn name(&self) -> &str {
        "ApplicationListenerDetector"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::AfterInitialization, Hook::BeforeDestruction]
    }

    fn after_initialization(&self, _factory: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        if meta.capability != Capability::Listener {
            return Ok(bean);
        }
        if !meta.singleton {
            tracing::warn!(
                bean = meta.name,
                "listener bean is not a singleton; it is delivered events only when looked up by name"
            );
            return Ok(bean);
        }
        if let Some(listener) = bean.downcast_ref::<Arc<dyn ApplicationListener>>() {
            self.hub.add(listener.clone());
        }
        Ok(bean)
    }

    fn requires_destruction(&self, meta: &BeanMeta<'_>) -> bool {
        meta.capability == Capability::Listener
    }

    fn before_destruction(&self, bean: &AnyArc, name: &str) -> DiResult<()> {
        if let Some(listener) = bean.downcast_ref::<Arc<dyn ApplicationListener>>() {
            self.hub.remove(listener, name);
        }
        Ok(())
    }
}
