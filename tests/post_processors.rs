use ferrous_context::processor::invoke_bean_factory_post_processors;
use ferrous_context::{
    AnyArc, ApplicationContext, BeanDefinition, BeanDefinitionRegistry, BeanDefinitionRegistryPostProcessor,
    BeanFactory, BeanFactoryPostProcessor, BeanLookup, BeanMeta, BeanPostProcessor, ContextSettings, DiResult,
    FactoryProcessor, Hook, OrderMarker, PropertyPlaceholderConfigurer, PropertyValue,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use serial_test::serial;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

struct Recording {
    label: String,
    log: Log,
}

impl BeanFactoryPostProcessor for Recording {
    fn post_process_bean_factory(&self, _: &BeanFactory) -> DiResult<()> {
        self.log.lock().push(format!("factory:{}", self.label));
        Ok(())
    }
}

impl BeanDefinitionRegistryPostProcessor for Recording {
    fn post_process_bean_definition_registry(&self, _: &dyn BeanDefinitionRegistry) -> DiResult<()> {
        self.log.lock().push(format!("registry:{}", self.label));
        Ok(())
    }
}

fn recording(label: &str, log: &Log) -> Arc<Recording> {
    Arc::new(Recording {
        label: label.to_string(),
        log: log.clone(),
    })
}

fn registry_bean(name: &str, order: OrderMarker, log: &Log) -> BeanDefinition {
    let processor = recording(name, log);
    BeanDefinition::registry_post_processor(name, move |_| {
        Ok(processor.clone() as Arc<dyn BeanDefinitionRegistryPostProcessor>)
    })
    .order(order)
}

fn factory_bean(name: &str, order: OrderMarker, log: &Log) -> BeanDefinition {
    let processor = recording(name, log);
    BeanDefinition::factory_post_processor(name, move |_| Ok(processor.clone() as Arc<dyn BeanFactoryPostProcessor>))
        .order(order)
}

#[test]
fn test_registry_processors_run_priority_then_ordered_then_rest() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let context = ApplicationContext::builder()
        .definition(registry_bean("unordered", OrderMarker::Unordered, &log))
        .definition(registry_bean("ordered", OrderMarker::Ordered(1), &log))
        .definition(registry_bean("priority", OrderMarker::PriorityOrdered(1), &log))
        .factory_processor(FactoryProcessor::Plain(recording("given", &log)))
        .build();
    context.refresh().unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "registry:priority",
            "registry:ordered",
            "registry:unordered",
            "factory:priority",
            "factory:ordered",
            "factory:unordered",
            "factory:given",
        ]
    );
}

struct Spawner {
    log: Log,
}

impl BeanFactoryPostProcessor for Spawner {
    fn post_process_bean_factory(&self, _: &BeanFactory) -> DiResult<()> {
        Ok(())
    }
}

impl BeanDefinitionRegistryPostProcessor for Spawner {
    fn post_process_bean_definition_registry(&self, registry: &dyn BeanDefinitionRegistry) -> DiResult<()> {
        self.log.lock().push("registry:spawner".into());
        registry.register_bean_definition(registry_bean("spawned", OrderMarker::Unordered, &self.log))?;
        registry.register_bean_definition(factory_bean("spawnedPlain", OrderMarker::Ordered(0), &self.log))
    }
}

#[test]
fn test_processor_registered_by_processor_runs_in_same_refresh() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let spawner_log = log.clone();
    let context = ApplicationContext::builder()
        .definition(BeanDefinition::registry_post_processor("spawner", move |_| {
            Ok(Arc::new(Spawner { log: spawner_log.clone() }) as Arc<dyn BeanDefinitionRegistryPostProcessor>)
        }))
        .build();
    context.refresh().unwrap();

    assert_eq!(
        *log.lock(),
        vec!["registry:spawner", "registry:spawned", "factory:spawned", "factory:spawnedPlain"]
    );
}

struct Tagging {
    label: &'static str,
    log: Log,
}

impl BeanPostProcessor for Tagging {
    fn hooks(&self) -> &'static [Hook] {
        &[Hook::AfterInitialization]
    }

    fn after_initialization(&self, _: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        if meta.name == "target" {
            self.log.lock().push(self.label.to_string());
        }
        Ok(bean)
    }
}

fn tagging(label: &'static str, order: OrderMarker, log: &Log) -> BeanDefinition {
    let log = log.clone();
    BeanDefinition::bean_post_processor(label, move |_| {
        Ok(Arc::new(Tagging { label, log: log.clone() }) as Arc<dyn BeanPostProcessor>)
    })
    .order(order)
}

#[test]
fn test_bean_post_processors_apply_in_tier_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let context = ApplicationContext::builder()
        .definition(tagging("plain", OrderMarker::Unordered, &log))
        .definition(tagging("late", OrderMarker::Ordered(20), &log))
        .definition(tagging("early", OrderMarker::Ordered(10), &log))
        .definition(tagging("first", OrderMarker::PriorityOrdered(100), &log))
        .definition(BeanDefinition::of::<u8, _>("target", |_| Ok(1)))
        .build();
    context.refresh().unwrap();

    assert_eq!(*log.lock(), vec!["first", "early", "late", "plain"]);
    assert!(context.bean_factory().unwrap().incompletely_processed_beans().is_empty());
}

// ===== Placeholders =====

struct Endpoint {
    url: String,
    pool: usize,
}

fn endpoint() -> BeanDefinition {
    BeanDefinition::of::<Endpoint, _>("endpoint", |ctx| {
        Ok(Endpoint {
            url: ctx.property_text("url")?.to_string(),
            pool: ctx.arg_parsed(0)?,
        })
    })
    .arg(PropertyValue::text("${db.pool:2}"))
    .property("url", PropertyValue::text("jdbc:${db.host}/${db.name}"))
}

#[test]
#[serial]
fn test_placeholders_resolve_from_context_properties_and_environment() {
    std::env::set_var("FERROUS_PP_DB_HOST", "db.internal");
    let mut settings = ContextSettings::default();
    settings.env_prefix = Some("FERROUS_PP_".into());
    settings.properties.insert("db.name".into(), "orders".into());

    let context = ApplicationContext::builder()
        .settings(settings)
        .definition(PropertyPlaceholderConfigurer::new().definition("placeholders"))
        .definition(endpoint())
        .build();
    let refreshed = context.refresh();
    std::env::remove_var("FERROUS_PP_DB_HOST");
    refreshed.unwrap();

    let endpoint = context.get_bean_as::<Endpoint>("endpoint").unwrap();
    assert_eq!(endpoint.url, "jdbc:db.internal/orders");
    assert_eq!(endpoint.pool, 2);
}

#[test]
#[serial]
fn test_unresolvable_placeholder_aborts_refresh() {
    let context = ApplicationContext::builder()
        .definition(PropertyPlaceholderConfigurer::new().property("db.name", "orders").definition("placeholders"))
        .definition(endpoint())
        .build();
    assert!(context.refresh().is_err());
    assert!(!context.is_active());
}

// ===== Ordering property =====

fn marker(tier: u8, value: i32) -> OrderMarker {
    match tier {
        0 => OrderMarker::PriorityOrdered(value),
        1 => OrderMarker::Ordered(value),
        _ => OrderMarker::Unordered,
    }
}

proptest! {
    #[test]
    fn factory_processors_run_sorted_by_tier_then_value(specs in prop::collection::vec((0u8..3, -5i32..5), 1..10)) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let factory = BeanFactory::new();
        for (index, (tier, value)) in specs.iter().enumerate() {
            factory
                .register_bean_definition(factory_bean(&format!("p{index}"), marker(*tier, *value), &log))
                .unwrap();
        }

        invoke_bean_factory_post_processors(&factory, &[]).unwrap();

        let mut expected: Vec<usize> = (0..specs.len()).collect();
        expected.sort_by_key(|&i| {
            let (tier, value) = specs[i];
            (tier, if tier < 2 { value } else { 0 })
        });
        let expected: Vec<String> = expected.into_iter().map(|i| format!("factory:p{i}")).collect();
        prop_assert_eq!(log.lock().clone(), expected);
    }
}
