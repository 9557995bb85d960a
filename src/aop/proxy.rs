//! Proxy runtime: the handle generated proxies delegate through, target
//! sources and the thread-local exposed proxy.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::aop::advice::{JoinPoint, MethodInterceptor, MethodInvocation, Outcome};
use crate::aop::advisor::{Advisor, AdvisorAdapterRegistry};
use crate::definition::{AnyArc, BeanClass, BeanDefinition, TargetView};
use crate::error::{DiError, DiResult};
use crate::factory::BeanFactory;

/// Supplies the object a proxy delegates to.
pub trait TargetSource: Send + Sync {
    /// True when every call sees the same target.
    fn is_static(&self) -> bool;

    fn target(&self) -> DiResult<AnyArc>;

    /// Hands a target back after a call.
    fn release(&self, target: AnyArc) {
        let _ = target;
    }
}

/// Always returns the one target it was built with.
pub struct SingletonTargetSource {
    target: AnyArc,
}

impl SingletonTargetSource {
    pub fn new(target: AnyArc) -> Self {
        Self { target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn is_static(&self) -> bool {
        true
    }

    fn target(&self) -> DiResult<AnyArc> {
        Ok(self.target.clone())
    }
}

/// Builds a fresh target from the bean definition for every call.
///
/// Targets are built without bean post-processors, so they are never
/// proxied themselves.
pub struct PrototypeTargetSource {
    factory: Weak<BeanFactory>,
    definition: Arc<BeanDefinition>,
}

impl PrototypeTargetSource {
    pub fn new(factory: Weak<BeanFactory>, definition: Arc<BeanDefinition>) -> Self {
        Self { factory, definition }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn is_static(&self) -> bool {
        false
    }

    fn target(&self) -> DiResult<AnyArc> {
        let factory = self.factory.upgrade().ok_or_else(|| {
            DiError::LifecycleState(format!(
                "Bean factory for prototype target '{}' has been dropped",
                self.definition.name()
            ))
        })?;
        factory.create_raw_bean(&self.definition)
    }
}

/// How a proxy was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// Wrapper implementing the named interface
    Interface(&'static str),
    /// Instance of the concrete type delegating through the handle
    Class(&'static str),
}

pub(crate) struct ProxyConfig {
    pub(crate) bean_name: String,
    pub(crate) class: BeanClass,
    pub(crate) target_source: Arc<dyn TargetSource>,
    pub(crate) target_view: Option<TargetView>,
    pub(crate) advisors: Vec<Advisor>,
    pub(crate) adapters: Arc<AdvisorAdapterRegistry>,
    pub(crate) expose_proxy: bool,
    pub(crate) frozen: bool,
}

type Chain = Arc<[Arc<dyn MethodInterceptor>]>;

struct ProxyState {
    bean_name: String,
    class: BeanClass,
    target_source: Arc<dyn TargetSource>,
    target_view: Option<TargetView>,
    advisors: RwLock<Vec<Advisor>>,
    adapters: Arc<AdvisorAdapterRegistry>,
    expose_proxy: bool,
    frozen: bool,
    chains: RwLock<HashMap<&'static str, Chain>>,
    self_ref: OnceLock<Arc<dyn Any + Send + Sync>>,
}

/// Advised-call dispatcher held by every generated proxy.
///
/// A proxy method forwards to [`invoke`](Self::invoke) (interface proxies)
/// or [`invoke_class`](Self::invoke_class) (class proxies), naming the
/// method and passing a closure that calls the same method on the target.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::aop::ProxyHandle;
/// use ferrous_context::DiResult;
/// use std::sync::Arc;
///
/// pub trait Greeter: Send + Sync {
///     fn greet(&self, name: &str) -> DiResult<String>;
/// }
///
/// struct GreeterProxy(ProxyHandle);
///
/// impl Greeter for GreeterProxy {
///     fn greet(&self, name: &str) -> DiResult<String> {
///         self.0.invoke::<dyn Greeter, _>("greet", &[&name], |target| target.greet(name))
///     }
/// }
///
/// // Registered on a trait-object bean definition with
/// // `.interface_proxy::<dyn Greeter, _>("Greeter", |h| Arc::new(GreeterProxy(h)))`.
/// ```
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<ProxyState>,
}

impl ProxyHandle {
    pub(crate) fn new(config: ProxyConfig) -> Self {
        Self {
            inner: Arc::new(ProxyState {
                bean_name: config.bean_name,
                class: config.class,
                target_source: config.target_source,
                target_view: config.target_view,
                advisors: RwLock::new(config.advisors),
                adapters: config.adapters,
                expose_proxy: config.expose_proxy,
                frozen: config.frozen,
                chains: RwLock::new(HashMap::new()),
                self_ref: OnceLock::new(),
            }),
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.inner.bean_name
    }

    pub fn target_class(&self) -> &BeanClass {
        &self.inner.class
    }

    pub fn advisors(&self) -> Vec<Advisor> {
        self.inner.advisors.read().clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen
    }

    pub fn is_proxy_exposed(&self) -> bool {
        self.inner.expose_proxy
    }

    pub fn is_static_target(&self) -> bool {
        self.inner.target_source.is_static()
    }

    /// Adds an advisor to a live proxy; fails when the proxy configuration
    /// is frozen.
    pub fn add_advisor(&self, advisor: Advisor) -> DiResult<()> {
        if self.inner.frozen {
            return Err(DiError::Configuration(format!(
                "Cannot add advisor to proxy for bean '{}': configuration is frozen",
                self.inner.bean_name
            )));
        }
        self.inner.advisors.write().push(advisor);
        self.inner.chains.write().clear();
        Ok(())
    }

    pub(crate) fn bind_self<X: ?Sized + Send + Sync + 'static>(&self, proxy: Weak<X>) {
        let _ = self.inner.self_ref.set(Arc::new(proxy));
    }

    /// Runs `method` through the advice chain on an interface target.
    pub fn invoke<I, R>(&self, method: &'static str, args: &[&dyn fmt::Debug], call: impl Fn(&I) -> DiResult<R>) -> DiResult<R>
    where
        I: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        let raw = self.inner.target_source.target()?;
        let target = match &self.inner.target_view {
            Some(view) => view(raw.clone()),
            None => Some(raw.clone()),
        };
        let typed = target
            .as_ref()
            .and_then(|t| t.downcast_ref::<Arc<I>>())
            .cloned()
            .ok_or_else(|| self.target_mismatch::<Arc<I>>())?;
        let result = self.run(method, args, || call(&*typed));
        self.inner.target_source.release(raw);
        result
    }

    /// Runs `method` through the advice chain on a concrete target `T`.
    pub fn invoke_class<T, R>(&self, method: &'static str, args: &[&dyn fmt::Debug], call: impl Fn(&T) -> DiResult<R>) -> DiResult<R>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
    {
        let raw = self.inner.target_source.target()?;
        let typed = raw
            .clone()
            .downcast::<T>()
            .map_err(|_| self.target_mismatch::<T>())?;
        let result = self.run(method, args, || call(&*typed));
        self.inner.target_source.release(raw);
        result
    }

    fn run<R: Send + 'static>(
        &self,
        method: &'static str,
        args: &[&dyn fmt::Debug],
        call: impl Fn() -> DiResult<R>,
    ) -> DiResult<R> {
        let chain = self.chain_for(method)?;
        let _exposed = self
            .inner
            .expose_proxy
            .then(|| ExposedProxy::push(self.inner.self_ref.get().cloned()));

        if chain.is_empty() {
            return call();
        }

        let join_point = JoinPoint::new(&self.inner.bean_name, self.inner.class.type_name(), method, args);
        let mut target = || call().map(|value| Box::new(value) as Outcome);
        let outcome = MethodInvocation::new(&join_point, &chain[..], &mut target).proceed()?;
        outcome.downcast::<R>().map(|value| *value).map_err(|_| {
            DiError::invocation(
                method,
                format!("advice replaced the return value with one that is not {}", type_name::<R>()),
            )
        })
    }

    fn chain_for(&self, method: &'static str) -> DiResult<Chain> {
        if let Some(chain) = self.inner.chains.read().get(method) {
            return Ok(chain.clone());
        }
        let mut interceptors = Vec::new();
        for advisor in self.inner.advisors.read().iter() {
            if advisor.matches(&self.inner.class, method) {
                interceptors.extend(self.inner.adapters.interceptors(advisor)?);
            }
        }
        let chain: Chain = interceptors.into();
        self.inner.chains.write().insert(method, chain.clone());
        Ok(chain)
    }

    fn target_mismatch<T: ?Sized>(&self) -> DiError {
        DiError::TypeMismatch {
            bean: self.inner.bean_name.clone(),
            expected: type_name::<T>(),
        }
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("bean_name", &self.inner.bean_name)
            .field("class", &self.inner.class.type_name())
            .field("advisors", &self.inner.advisors.read().len())
            .field("expose_proxy", &self.inner.expose_proxy)
            .field("frozen", &self.inner.frozen)
            .finish()
    }
}

thread_local! {
    static CURRENT_PROXY: RefCell<Vec<Option<Arc<dyn Any + Send + Sync>>>> = const { RefCell::new(Vec::new()) };
}

struct ExposedProxy;

impl ExposedProxy {
    fn push(proxy: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        CURRENT_PROXY.with(|stack| stack.borrow_mut().push(proxy));
        ExposedProxy
    }
}

impl Drop for ExposedProxy {
    fn drop(&mut self) {
        CURRENT_PROXY.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Access to the proxy currently executing on this thread.
///
/// Only available while a proxy created with `expose_proxy` is running a
/// call. Target code uses it to call its own methods through the proxy so
/// advice applies to the inner call too.
pub struct AopContext;

impl AopContext {
    /// The exposed proxy, typed as `P` (`dyn Trait` for interface proxies,
    /// the concrete type for class proxies).
    pub fn current_proxy<P: ?Sized + Send + Sync + 'static>() -> DiResult<Arc<P>> {
        let current = CURRENT_PROXY.with(|stack| stack.borrow().last().cloned().flatten());
        let Some(current) = current else {
            return Err(DiError::LifecycleState(
                "Cannot find current proxy: set 'expose_proxy' to true on the proxy settings to make it \
                 available, and call AopContext::current_proxy() on the thread running the advised call"
                    .to_string(),
            ));
        };
        let weak = current.downcast_ref::<Weak<P>>().ok_or_else(|| DiError::TypeMismatch {
            bean: "current proxy".to_string(),
            expected: type_name::<P>(),
        })?;
        weak.upgrade()
            .ok_or_else(|| DiError::LifecycleState("Current proxy has already been dropped".to_string()))
    }

    /// Whether an exposed proxy is running a call on this thread.
    pub fn is_active() -> bool {
        CURRENT_PROXY.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aop::advice::Advice;
    use parking_lot::Mutex;

    trait Counter: Send + Sync {
        fn next(&self) -> DiResult<u32>;
    }

    struct Simple(Mutex<u32>);

    impl Counter for Simple {
        fn next(&self) -> DiResult<u32> {
            let mut n = self.0.lock();
            *n += 1;
            Ok(*n)
        }
    }

    struct CounterProxy(ProxyHandle);

    impl Counter for CounterProxy {
        fn next(&self) -> DiResult<u32> {
            self.0.invoke::<dyn Counter, _>("next", &[], |t| t.next())
        }
    }

    fn handle(advisors: Vec<Advisor>, expose: bool, frozen: bool) -> ProxyHandle {
        let target: Arc<dyn Counter> = Arc::new(Simple(Mutex::new(0)));
        ProxyHandle::new(ProxyConfig {
            bean_name: "counter".into(),
            class: BeanClass::of_trait::<dyn Counter>(),
            target_source: Arc::new(SingletonTargetSource::new(Arc::new(target))),
            target_view: None,
            advisors,
            adapters: Arc::new(AdvisorAdapterRegistry::new()),
            expose_proxy: expose,
            frozen,
        })
    }

    #[test]
    fn advice_runs_around_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let proxy = CounterProxy(handle(
            vec![Advisor::for_all(Advice::before(move |jp| {
                sink.lock().push(jp.method());
                Ok(())
            }))],
            false,
            false,
        ));
        assert_eq!(proxy.next().unwrap(), 1);
        assert_eq!(proxy.next().unwrap(), 2);
        assert_eq!(*log.lock(), vec!["next", "next"]);
    }

    #[test]
    fn frozen_proxy_rejects_new_advisors() {
        let live = handle(Vec::new(), false, false);
        live.add_advisor(Advisor::for_all(Advice::after(|_| Ok(())))).unwrap();
        assert_eq!(live.advisors().len(), 1);

        let frozen = handle(Vec::new(), false, true);
        assert!(matches!(
            frozen.add_advisor(Advisor::for_all(Advice::after(|_| Ok(())))),
            Err(DiError::Configuration(_))
        ));
    }

    #[test]
    fn exposed_proxy_is_visible_only_during_the_call() {
        let h = handle(Vec::new(), true, false);
        let proxy: Arc<dyn Counter> = Arc::new(CounterProxy(h.clone()));
        h.bind_self(Arc::downgrade(&proxy));

        assert!(AopContext::current_proxy::<dyn Counter>().is_err());
        let seen = h
            .invoke::<dyn Counter, _>("next", &[], |_| Ok(AopContext::current_proxy::<dyn Counter>().is_ok()))
            .unwrap();
        assert!(seen);
        assert!(!AopContext::is_active());
    }

    #[test]
    fn wrong_target_type_is_a_mismatch() {
        let h = handle(Vec::new(), false, false);
        assert!(matches!(
            h.invoke_class::<String, _>("len", &[], |s| Ok(s.len())),
            Err(DiError::TypeMismatch { .. })
        ));
    }
}
