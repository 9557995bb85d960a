//! Start/stop lifecycle for beans and the processor that drives it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::definition::Capability;
use crate::error::{DiError, DiResult};
use crate::factory::{BeanFactory, BeanLookup};

/// Bean with a start/stop lifecycle, such as a scheduler or a listener
/// socket.
///
/// Beans are started in ascending [`phase`](Self::phase) order and stopped
/// in descending order. Auto-startup beans start when the context finishes
/// its refresh.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, BeanDefinition, BeanLookup, DiResult, Lifecycle};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Poller(AtomicBool);
///
/// impl Lifecycle for Poller {
///     fn start(&self) -> DiResult<()> {
///         self.0.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///     fn stop(&self) -> DiResult<()> {
///         self.0.store(false, Ordering::SeqCst);
///         Ok(())
///     }
///     fn is_running(&self) -> bool {
///         self.0.load(Ordering::SeqCst)
///     }
/// }
///
/// let context = ApplicationContext::builder()
///     .definition(BeanDefinition::lifecycle("poller", |_| Ok(Arc::new(Poller::default()) as Arc<dyn Lifecycle>)))
///     .build();
/// context.refresh().unwrap();
///
/// let poller = context.get_bean_trait::<dyn Lifecycle>("poller").unwrap();
/// assert!(poller.is_running());
/// context.close();
/// assert!(!poller.is_running());
/// ```
pub trait Lifecycle: Send + Sync {
    fn start(&self) -> DiResult<()>;

    fn stop(&self) -> DiResult<()>;

    fn is_running(&self) -> bool;

    fn phase(&self) -> i32 {
        0
    }

    /// Start automatically on refresh rather than only on an explicit
    /// context start.
    fn is_auto_startup(&self) -> bool {
        true
    }
}

/// Starts and stops every [`Lifecycle`] bean of a factory by phase.
///
/// Dependencies declared with `depends_on` are started before the beans
/// that depend on them and stopped after them.
pub struct DefaultLifecycleProcessor {
    factory: Weak<BeanFactory>,
    running: AtomicBool,
}

type LifecycleBeans = IndexMap<String, Arc<dyn Lifecycle>>;

impl DefaultLifecycleProcessor {
    pub fn new(factory: Weak<BeanFactory>) -> Self {
        Self {
            factory,
            running: AtomicBool::new(false),
        }
    }

    /// Starts auto-startup beans after a refresh.
    pub fn on_refresh(&self) -> DiResult<()> {
        self.start_beans(true)?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops every running bean before the factory is destroyed.
    pub fn on_close(&self) {
        self.stop_beans();
        self.running.store(false, Ordering::Release);
    }

    pub fn start(&self) -> DiResult<()> {
        self.start_beans(false)?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    pub fn stop(&self) {
        self.stop_beans();
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn factory(&self) -> DiResult<Arc<BeanFactory>> {
        self.factory
            .upgrade()
            .ok_or_else(|| DiError::LifecycleState("Bean factory has already been released".to_string()))
    }

    fn lifecycle_beans(&self, factory: &BeanFactory) -> DiResult<LifecycleBeans> {
        let mut beans = IndexMap::new();
        for name in factory.bean_names_for(Capability::Lifecycle) {
            let bean = factory.get_bean_trait::<dyn Lifecycle>(&name)?;
            beans.insert(name, bean);
        }
        Ok(beans)
    }

    fn start_beans(&self, auto_startup_only: bool) -> DiResult<()> {
        let factory = self.factory()?;
        let beans = self.lifecycle_beans(&factory)?;
        let mut phases: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        for (name, bean) in &beans {
            if !auto_startup_only || bean.is_auto_startup() {
                phases.entry(bean.phase()).or_default().push(name);
            }
        }

        let mut started = HashSet::new();
        for (phase, names) in phases {
            tracing::debug!(phase, count = names.len(), "starting lifecycle beans");
            for name in names {
                self.do_start(&factory, &beans, name, &mut started)?;
            }
        }
        Ok(())
    }

    fn do_start(
        &self,
        factory: &BeanFactory,
        beans: &LifecycleBeans,
        name: &str,
        started: &mut HashSet<String>,
    ) -> DiResult<()> {
        if !started.insert(name.to_string()) {
            return Ok(());
        }
        let Some(bean) = beans.get(name) else {
            return Ok(());
        };
        if let Some(definition) = factory.definition(name) {
            for dependency in definition.dependencies() {
                self.do_start(factory, beans, dependency, started)?;
            }
        }
        if !bean.is_running() {
            tracing::trace!(bean = name, "starting bean");
            bean.start().map_err(|e| DiError::LifecycleState(format!("Failed to start bean '{name}': {e}")))?;
        }
        Ok(())
    }

    fn stop_beans(&self) {
        let (factory, beans) = match self.factory().and_then(|f| self.lifecycle_beans(&f).map(|b| (f, b))) {
            Ok(found) => found,
            Err(error) => {
                tracing::warn!(%error, "could not collect lifecycle beans to stop");
                return;
            }
        };

        let mut phases: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        for (name, bean) in &beans {
            phases.entry(bean.phase()).or_default().push(name);
        }

        let mut stopped = HashSet::new();
        for (phase, names) in phases.into_iter().rev() {
            tracing::debug!(phase, count = names.len(), "stopping lifecycle beans");
            for name in names {
                self.do_stop(&factory, &beans, name, &mut stopped);
            }
        }
    }

    fn do_stop(&self, factory: &BeanFactory, beans: &LifecycleBeans, name: &str, stopped: &mut HashSet<String>) {
        if !stopped.insert(name.to_string()) {
            return;
        }
        let Some(bean) = beans.get(name) else {
            return;
        };
        for dependent in factory.dependents_of(name) {
            self.do_stop(factory, beans, &dependent, stopped);
        }
        if bean.is_running() {
            tracing::trace!(bean = name, "stopping bean");
            if let Err(error) = bean.stop() {
                tracing::warn!(bean = name, %error, "failed to stop bean");
            }
        }
    }
}

impl fmt::Debug for DefaultLifecycleProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultLifecycleProcessor")
            .field("running", &self.is_running())
            .finish()
    }
}
