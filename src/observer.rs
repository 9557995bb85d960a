//! Diagnostic observers for context refresh and bean creation.
//!
//! Observers receive synchronous callbacks from the refresh orchestrator and
//! the bean factory. They are registered on the
//! [`ContextBuilder`](crate::ContextBuilder) and shared with every factory the
//! context builds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::RefreshPhase;
use crate::error::DiError;

/// Observer of context lifecycle events.
///
/// All methods have empty defaults; implement the ones you care about.
/// Calls happen on the refreshing thread, so keep them cheap.
///
/// # Examples
///
/// ```rust
/// use ferrous_context::{ApplicationContext, ContextObserver, RefreshPhase};
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Default)]
/// struct PhaseLog(Mutex<Vec<RefreshPhase>>);
///
/// impl ContextObserver for PhaseLog {
///     fn phase_started(&self, phase: RefreshPhase) {
///         self.0.lock().unwrap().push(phase);
///     }
/// }
///
/// let log = Arc::new(PhaseLog::default());
/// let context = ApplicationContext::builder().observer(log.clone()).build();
/// context.refresh().unwrap();
///
/// assert_eq!(log.0.lock().unwrap().as_slice(), RefreshPhase::ALL);
/// ```
pub trait ContextObserver: Send + Sync {
    fn phase_started(&self, phase: RefreshPhase) {
        let _ = phase;
    }

    fn phase_completed(&self, phase: RefreshPhase, elapsed: Duration) {
        let _ = (phase, elapsed);
    }

    /// A refresh aborted in `phase`; created singletons are being destroyed.
    fn refresh_failed(&self, phase: RefreshPhase, error: &DiError) {
        let _ = (phase, error);
    }

    /// A singleton or prototype finished its full creation protocol.
    fn bean_created(&self, name: &str, elapsed: Duration) {
        let _ = (name, elapsed);
    }

    fn context_closed(&self, display_name: &str) {
        let _ = display_name;
    }
}

/// Observer that forwards every event to `tracing`.
///
/// Phases log at `debug`, bean creation at `trace`, failures at `warn`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "ferrous-context".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextObserver for LoggingObserver {
    fn phase_started(&self, phase: RefreshPhase) {
        tracing::debug!(target: "ferrous_context::observer", prefix = %self.prefix, phase = phase.as_str(), "phase started");
    }

    fn phase_completed(&self, phase: RefreshPhase, elapsed: Duration) {
        tracing::debug!(
            target: "ferrous_context::observer",
            prefix = %self.prefix,
            phase = phase.as_str(),
            elapsed_us = elapsed.as_micros() as u64,
            "phase completed"
        );
    }

    fn refresh_failed(&self, phase: RefreshPhase, error: &DiError) {
        tracing::warn!(target: "ferrous_context::observer", prefix = %self.prefix, phase = phase.as_str(), %error, "refresh failed");
    }

    fn bean_created(&self, name: &str, elapsed: Duration) {
        tracing::trace!(
            target: "ferrous_context::observer",
            prefix = %self.prefix,
            bean = name,
            elapsed_us = elapsed.as_micros() as u64,
            "bean created"
        );
    }

    fn context_closed(&self, display_name: &str) {
        tracing::debug!(target: "ferrous_context::observer", prefix = %self.prefix, context = display_name, "context closed");
    }
}

/// Observer that counts events.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    phases_completed: AtomicU64,
    refresh_failures: AtomicU64,
    beans_created: AtomicU64,
    creation_nanos: AtomicU64,
    closes: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases_completed(&self) -> u64 {
        self.phases_completed.load(Ordering::Relaxed)
    }

    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }

    pub fn beans_created(&self) -> u64 {
        self.beans_created.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Mean creation time over all observed beans.
    pub fn average_creation_time(&self) -> Option<Duration> {
        let count = self.beans_created();
        if count == 0 {
            return None;
        }
        Some(Duration::from_nanos(self.creation_nanos.load(Ordering::Relaxed) / count))
    }

    pub fn reset(&self) {
        self.phases_completed.store(0, Ordering::Relaxed);
        self.refresh_failures.store(0, Ordering::Relaxed);
        self.beans_created.store(0, Ordering::Relaxed);
        self.creation_nanos.store(0, Ordering::Relaxed);
        self.closes.store(0, Ordering::Relaxed);
    }
}

impl ContextObserver for MetricsObserver {
    fn phase_completed(&self, _phase: RefreshPhase, _elapsed: Duration) {
        self.phases_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn refresh_failed(&self, _phase: RefreshPhase, _error: &DiError) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn bean_created(&self, _name: &str, elapsed: Duration) {
        self.beans_created.fetch_add(1, Ordering::Relaxed);
        self.creation_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    fn context_closed(&self, _display_name: &str) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fan-out over the registered observers.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ContextObserver>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn ContextObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn phase_started(&self, phase: RefreshPhase) {
        for o in &self.observers {
            o.phase_started(phase);
        }
    }

    pub(crate) fn phase_completed(&self, phase: RefreshPhase, elapsed: Duration) {
        for o in &self.observers {
            o.phase_completed(phase, elapsed);
        }
    }

    pub(crate) fn refresh_failed(&self, phase: RefreshPhase, error: &DiError) {
        for o in &self.observers {
            o.refresh_failed(phase, error);
        }
    }

    pub(crate) fn bean_created(&self, name: &str, elapsed: Duration) {
        for o in &self.observers {
            o.bean_created(name, elapsed);
        }
    }

    pub(crate) fn context_closed(&self, display_name: &str) {
        for o in &self.observers {
            o.context_closed(display_name);
        }
    }
}
