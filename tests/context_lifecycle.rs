use crossbeam_utils::thread;
use ferrous_context::{
    ApplicationContext, ApplicationEvent, ApplicationListener, BeanDefinition, BeanLookup, ContextObserver,
    ContextSettings, DiError, DiResult, EventKind, Lifecycle, MessageSource, MetricsObserver, RefreshPhase,
    StaticMessageSource,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default)]
struct PhaseRecorder {
    started: Mutex<Vec<RefreshPhase>>,
    completed: Mutex<Vec<RefreshPhase>>,
    failed: Mutex<Option<RefreshPhase>>,
    closed: AtomicUsize,
}

impl ContextObserver for PhaseRecorder {
    fn phase_started(&self, phase: RefreshPhase) {
        self.started.lock().push(phase);
    }

    fn phase_completed(&self, phase: RefreshPhase, _elapsed: std::time::Duration) {
        self.completed.lock().push(phase);
    }

    fn refresh_failed(&self, phase: RefreshPhase, _error: &DiError) {
        *self.failed.lock() = Some(phase);
    }

    fn context_closed(&self, _display_name: &str) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn tracked(name: &'static str, log: &Log) -> BeanDefinition {
    let created = log.clone();
    let destroyed = log.clone();
    BeanDefinition::of::<String, _>(name, move |_| {
        created.lock().push(format!("create {name}"));
        Ok(name.to_string())
    })
    .destroy::<String, _>(move |value| {
        destroyed.lock().push(format!("destroy {value}"));
        Ok(())
    })
}

fn event_listener(log: &Log) -> BeanDefinition {
    let log = log.clone();
    BeanDefinition::listener("eventLog", move |_| {
        let log = log.clone();
        Ok(Arc::new(move |event: &ApplicationEvent| -> DiResult<()> {
            log.lock().push(event.kind().name().to_string());
            Ok(())
        }) as Arc<dyn ApplicationListener>)
    })
}

// ===== Refresh =====

#[test]
fn test_refresh_runs_twelve_phases_in_order() {
    let recorder = Arc::new(PhaseRecorder::default());
    let metrics = Arc::new(MetricsObserver::new());
    let context = ApplicationContext::builder()
        .observer(recorder.clone())
        .observer(metrics.clone())
        .definition(BeanDefinition::of::<u32, _>("answer", |_| Ok(42)))
        .build();

    context.refresh().unwrap();

    assert_eq!(*recorder.started.lock(), RefreshPhase::ALL.to_vec());
    assert_eq!(*recorder.completed.lock(), RefreshPhase::ALL.to_vec());
    assert_eq!(metrics.phases_completed(), 12);
    assert!(metrics.beans_created() >= 1);
    assert!(context.is_active());
    assert!(context.startup_time().is_some());
}

#[test]
fn test_failed_refresh_destroys_created_singletons() {
    let log = new_log();
    let recorder = Arc::new(PhaseRecorder::default());
    let context = ApplicationContext::builder()
        .observer(recorder.clone())
        .definition(tracked("good", &log))
        .definition(BeanDefinition::of::<String, _>("bad", |_| {
            Err(DiError::Configuration("broken on purpose".into()))
        }))
        .build();

    let err = context.refresh().unwrap_err();
    assert!(matches!(err, DiError::Instantiation { .. }), "{err}");
    assert_eq!(*log.lock(), vec!["create good", "destroy good"]);
    assert_eq!(*recorder.failed.lock(), Some(RefreshPhase::FinishBeanFactoryInitialization));
    assert!(!context.is_active());
    assert!(matches!(context.get_bean("good"), Err(DiError::LifecycleState(_))));
}

#[test]
fn test_missing_required_property_fails_before_any_bean() {
    let log = new_log();
    let mut settings = ContextSettings::default();
    settings.required_properties = vec!["db.url".into()];
    let recorder = Arc::new(PhaseRecorder::default());
    let context = ApplicationContext::builder()
        .settings(settings)
        .observer(recorder.clone())
        .definition(tracked("bean", &log))
        .build();

    assert!(matches!(context.refresh(), Err(DiError::Configuration(_))));
    assert_eq!(*recorder.failed.lock(), Some(RefreshPhase::PrepareRefresh));
    assert!(log.lock().is_empty());
}

#[test]
fn test_second_refresh_replaces_singletons() {
    let log = new_log();
    let context = ApplicationContext::builder().definition(tracked("bean", &log)).build();

    context.refresh().unwrap();
    let first = context.get_bean_as::<String>("bean").unwrap();
    context.refresh().unwrap();
    let second = context.get_bean_as::<String>("bean").unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*log.lock(), vec!["create bean", "destroy bean", "create bean"]);
}

#[test]
fn test_concurrent_lookup_creates_lazy_singleton_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let context = ApplicationContext::builder()
        .definition(
            BeanDefinition::of::<Vec<u64>, _>("table", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok((0..64).collect())
            })
            .lazy(true),
        )
        .build();
    context.refresh().unwrap();

    let seen: Vec<Arc<Vec<u64>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|_| context.get_bean_as::<Vec<u64>>("table").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(seen.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

// ===== Close =====

#[test]
fn test_close_is_idempotent() {
    let log = new_log();
    let recorder = Arc::new(PhaseRecorder::default());
    let context = ApplicationContext::builder()
        .observer(recorder.clone())
        .definition(tracked("bean", &log))
        .definition(event_listener(&log))
        .build();
    context.refresh().unwrap();

    context.close();
    context.close();

    let destroyed = log.lock().iter().filter(|l| l.starts_with("destroy")).count();
    let closed_events = log.lock().iter().filter(|l| *l == "ContextClosed").count();
    assert_eq!(destroyed, 1);
    assert_eq!(closed_events, 1);
    assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    assert!(context.is_closed());
    assert!(!context.is_active());
}

#[test]
fn test_closing_unrefreshed_context_does_nothing() {
    let context = ApplicationContext::builder().build();
    context.close();
    assert!(!context.is_closed());
    context.refresh().unwrap();
    assert!(context.is_active());
}

#[test]
fn test_closed_context_cannot_be_refreshed() {
    let context = ApplicationContext::builder().build();
    context.refresh().unwrap();
    context.close();
    match context.refresh() {
        Err(DiError::LifecycleState(msg)) => assert!(msg.contains("closed")),
        other => panic!("expected lifecycle error, got {other:?}"),
    }
}

#[test]
fn test_shutdown_hook_closes_on_last_drop() {
    let log = new_log();
    let context = ApplicationContext::builder().definition(tracked("bean", &log)).build();
    context.refresh().unwrap();
    assert!(context.register_shutdown_hook());
    assert!(!context.register_shutdown_hook());

    let clone = context.clone();
    drop(context);
    assert!(!log.lock().iter().any(|l| l.starts_with("destroy")));
    drop(clone);
    assert_eq!(log.lock().last().map(String::as_str), Some("destroy bean"));
}

#[test]
fn test_drop_without_shutdown_hook_leaves_beans_alone() {
    let log = new_log();
    let context = ApplicationContext::builder().definition(tracked("bean", &log)).build();
    context.refresh().unwrap();
    drop(context);
    assert!(!log.lock().iter().any(|l| l.starts_with("destroy")));
}

// ===== Events =====

#[test]
fn test_listener_beans_receive_context_events() {
    let log = new_log();
    let context = ApplicationContext::builder().definition(event_listener(&log)).build();

    context.refresh().unwrap();
    context.publish_event(ApplicationEvent::custom("orderPlaced", "test")).unwrap();
    context.start().unwrap();
    context.stop().unwrap();
    context.close();

    assert_eq!(
        *log.lock(),
        vec!["ContextRefreshed", "orderPlaced", "ContextStarted", "ContextStopped", "ContextClosed"]
    );
}

#[test]
fn test_listener_filtering_and_payloads() {
    struct OrdersOnly(Mutex<Vec<u64>>);
    impl ApplicationListener for OrdersOnly {
        fn on_event(&self, event: &ApplicationEvent) -> DiResult<()> {
            if let Some(id) = event.payload::<u64>() {
                self.0.lock().push(*id);
            }
            Ok(())
        }

        fn supports(&self, kind: &EventKind) -> bool {
            kind == &EventKind::Custom("orderPlaced".into())
        }
    }

    let orders = Arc::new(OrdersOnly(Mutex::new(Vec::new())));
    let context = ApplicationContext::builder().listener(orders.clone()).build();
    context.refresh().unwrap();

    context.publish_event(ApplicationEvent::custom("orderPlaced", "shop").with_payload(7u64)).unwrap();
    context.publish_event(ApplicationEvent::custom("orderCancelled", "shop").with_payload(8u64)).unwrap();
    assert_eq!(*orders.0.lock(), vec![7]);
}

#[test]
fn test_failing_listener_does_not_abort_refresh() {
    let context = ApplicationContext::builder()
        .listener(Arc::new(|_: &ApplicationEvent| -> DiResult<()> {
            Err(DiError::Configuration("listener failure".into()))
        }))
        .build();
    context.refresh().unwrap();
    context.close();
    assert!(context.is_closed());
}

#[test]
fn test_publish_before_refresh_fails() {
    let context = ApplicationContext::builder().build();
    assert!(matches!(
        context.publish_event(ApplicationEvent::custom("x", "y")),
        Err(DiError::LifecycleState(_))
    ));
}

#[test]
fn test_publish_after_failed_refresh_fails() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let context = ApplicationContext::builder()
        .listener(Arc::new(move |_: &ApplicationEvent| -> DiResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .definition(BeanDefinition::of::<String, _>("broken", |_| {
            Err(DiError::Configuration("broken on purpose".into()))
        }))
        .build();
    assert!(context.refresh().is_err());
    assert!(!context.is_active());

    match context.publish_event(ApplicationEvent::custom("late", "test")) {
        Err(DiError::LifecycleState(msg)) => assert!(msg.contains("not been refreshed")),
        other => panic!("expected lifecycle error, got {other:?}"),
    }
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn test_publish_after_close_fails() {
    let context = ApplicationContext::builder().build();
    context.refresh().unwrap();
    context.close();
    match context.publish_event(ApplicationEvent::custom("late", "test")) {
        Err(DiError::LifecycleState(msg)) => assert!(msg.contains("closed")),
        other => panic!("expected lifecycle error, got {other:?}"),
    }
}

// ===== Lifecycle =====

struct Service {
    name: &'static str,
    phase: i32,
    auto: bool,
    running: AtomicBool,
    log: Log,
}

impl Lifecycle for Service {
    fn start(&self) -> DiResult<()> {
        self.log.lock().push(format!("start {}", self.name));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> DiResult<()> {
        self.log.lock().push(format!("stop {}", self.name));
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn phase(&self) -> i32 {
        self.phase
    }

    fn is_auto_startup(&self) -> bool {
        self.auto
    }
}

fn service(name: &'static str, phase: i32, auto: bool, log: &Log) -> BeanDefinition {
    let log = log.clone();
    BeanDefinition::lifecycle(name, move |_| {
        Ok(Arc::new(Service {
            name,
            phase,
            auto,
            running: AtomicBool::new(false),
            log: log.clone(),
        }) as Arc<dyn Lifecycle>)
    })
}

#[test]
fn test_lifecycle_beans_follow_phases_and_dependencies() {
    let log = new_log();
    let context = ApplicationContext::builder()
        .definition(service("web", 10, true, &log))
        .definition(service("cache", 0, true, &log).depends_on("db"))
        .definition(service("db", 0, true, &log))
        .definition(service("admin", 0, false, &log))
        .build();

    context.refresh().unwrap();
    assert_eq!(*log.lock(), vec!["start db", "start cache", "start web"]);
    assert!(context.is_running());

    log.lock().clear();
    context.start().unwrap();
    assert_eq!(*log.lock(), vec!["start admin"]);

    log.lock().clear();
    context.close();
    assert_eq!(*log.lock(), vec!["stop web", "stop cache", "stop db", "stop admin"]);
    assert!(!context.is_running());
}

// ===== Messages =====

#[test]
fn test_message_source_bean_is_used() {
    let context = ApplicationContext::builder()
        .definition(BeanDefinition::message_source("messageSource", |_| {
            Ok(Arc::new(StaticMessageSource::new().with_message("welcome", "Hello {0}")) as Arc<dyn MessageSource>)
        }))
        .build();
    context.refresh().unwrap();

    assert_eq!(context.get_message("welcome", &[&"Ada"], None).unwrap(), "Hello Ada");
    assert_eq!(context.get_message("other", &[], Some("fallback")).unwrap(), "fallback");
    assert!(matches!(context.get_message("other", &[], None), Err(DiError::Configuration(_))));
}

#[test]
fn test_default_message_source_only_serves_defaults() {
    let context = ApplicationContext::builder().build();
    assert!(matches!(
        context.get_message("x", &[], Some("d")),
        Err(DiError::LifecycleState(_))
    ));
    context.refresh().unwrap();
    assert_eq!(context.get_message("x", &[&1], Some("value {0}")).unwrap(), "value 1");
}
