//! Bean lifecycle demo - one refresh from definitions to shutdown
//!
//! This example demonstrates:
//! - Placeholder resolution from context properties
//! - A registry post-processor adding a definition during refresh
//! - A bean post-processor observing every created bean
//! - Phased lifecycle beans, listeners and the message source
//! - Closing through the shutdown hook when the last handle drops

use ferrous_context::{
    AnyArc, ApplicationContext, ApplicationEvent, ApplicationListener, BeanDefinition,
    BeanDefinitionRegistry, BeanDefinitionRegistryPostProcessor, BeanFactory, BeanFactoryPostProcessor,
    BeanLookup, BeanMeta, BeanPostProcessor, ContextSettings, DiResult, Hook, Lifecycle, MessageSource,
    MetricsObserver, OrderMarker, PropertyPlaceholderConfigurer, PropertyValue, StaticMessageSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Database {
    url: String,
}

struct Scheduler {
    running: AtomicBool,
}

impl Lifecycle for Scheduler {
    fn start(&self) -> DiResult<()> {
        println!("  scheduler started");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> DiResult<()> {
        println!("  scheduler stopped");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn phase(&self) -> i32 {
        10
    }
}

/// Adds an audit bean unless one is defined already.
struct AuditRegistrar;

impl BeanFactoryPostProcessor for AuditRegistrar {
    fn post_process_bean_factory(&self, _: &BeanFactory) -> DiResult<()> {
        Ok(())
    }
}

impl BeanDefinitionRegistryPostProcessor for AuditRegistrar {
    fn post_process_bean_definition_registry(&self, registry: &dyn BeanDefinitionRegistry) -> DiResult<()> {
        if !registry.contains_bean_definition("audit") {
            println!("  registering 'audit'");
            registry.register_bean_definition(BeanDefinition::of::<String, _>("audit", |_| Ok("audit-log".into())))?;
        }
        Ok(())
    }
}

struct Announcer;

impl BeanPostProcessor for Announcer {
    fn hooks(&self) -> &'static [Hook] {
        &[Hook::AfterInitialization]
    }

    fn after_initialization(&self, _: &BeanFactory, bean: AnyArc, meta: &BeanMeta<'_>) -> DiResult<AnyArc> {
        println!("  initialized '{}' ({})", meta.name, meta.class.simple_name());
        Ok(bean)
    }
}

fn main() -> DiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut settings = ContextSettings::default();
    settings.display_name = "inventory".into();
    settings.properties.insert("db.host".into(), "localhost".into());
    settings.required_properties.push("db.host".into());

    let metrics = Arc::new(MetricsObserver::new());
    let context = ApplicationContext::builder()
        .settings(settings)
        .observer(metrics.clone())
        .definition(PropertyPlaceholderConfigurer::new().definition("placeholders"))
        .definition(
            BeanDefinition::registry_post_processor("auditRegistrar", |_| {
                Ok(Arc::new(AuditRegistrar) as Arc<dyn BeanDefinitionRegistryPostProcessor>)
            })
            .order(OrderMarker::Ordered(0)),
        )
        .definition(BeanDefinition::bean_post_processor("announcer", |_| {
            Ok(Arc::new(Announcer) as Arc<dyn BeanPostProcessor>)
        }))
        .definition(
            BeanDefinition::of::<Database, _>("database", |ctx| Ok(Database { url: ctx.property_text("url")?.into() }))
                .property("url", PropertyValue::text("postgres://${db.host}:${db.port:5432}/inventory"))
                .destroy::<Database, _>(|db| {
                    println!("  closing {}", db.url);
                    Ok(())
                }),
        )
        .definition(
            BeanDefinition::lifecycle("scheduler", |_| {
                Ok(Arc::new(Scheduler { running: AtomicBool::new(false) }) as Arc<dyn Lifecycle>)
            })
            .depends_on("database"),
        )
        .definition(BeanDefinition::listener("eventLog", |_| {
            Ok(Arc::new(|event: &ApplicationEvent| -> DiResult<()> {
                println!("  event {} from {}", event.kind().name(), event.source());
                Ok(())
            }) as Arc<dyn ApplicationListener>)
        }))
        .definition(BeanDefinition::message_source("messageSource", |_| {
            Ok(Arc::new(StaticMessageSource::new().with_message("stock.low", "Only {0} left of {1}")) as Arc<dyn MessageSource>)
        }))
        .build();
    context.register_shutdown_hook();

    println!("refreshing");
    context.refresh()?;

    let database = context.get_bean_as::<Database>("database")?;
    println!("database url: {}", database.url);
    println!("audit bean: {}", context.get_bean_as::<String>("audit")?);
    println!("{}", context.get_message("stock.low", &[&3, &"widgets"], None)?);
    context.publish_event(ApplicationEvent::custom("stockChecked", "main").with_payload(3u32))?;

    println!(
        "phases: {}, beans created: {}, average creation: {:?}",
        metrics.phases_completed(),
        metrics.beans_created(),
        metrics.average_creation_time()
    );

    println!("dropping the context");
    drop(database);
    drop(context);
    println!("closes recorded: {}", metrics.closes());
    Ok(())
}
