use ferrous_context::{
    ApplicationContext, ApplicationEvent, ApplicationListener, BeanDefinition, BeanLookup, ContextSettings, DiError,
    DiResult, MessageSource, PropertyPlaceholderConfigurer, PropertyValue, StaticMessageSource,
};
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(label: &'static str, log: &Log) -> Arc<dyn ApplicationListener> {
    let log = log.clone();
    Arc::new(move |event: &ApplicationEvent| -> DiResult<()> {
        log.lock().push(format!("{label}:{}:{}", event.kind().name(), event.source()));
        Ok(())
    })
}

fn messages(name: &'static str, entries: &[(&'static str, &'static str)]) -> BeanDefinition {
    let entries = entries.to_vec();
    BeanDefinition::message_source(name, move |_| {
        let source = entries
            .iter()
            .fold(StaticMessageSource::new(), |source, (code, text)| source.with_message(*code, *text));
        Ok(Arc::new(source) as Arc<dyn MessageSource>)
    })
}

fn parent_context() -> ApplicationContext {
    let mut settings = ContextSettings::default();
    settings.display_name = "parent".into();
    settings.properties.insert("db.url".into(), "postgres://shared".into());
    let parent = ApplicationContext::builder()
        .settings(settings)
        .definition(BeanDefinition::of::<String, _>("shared", |_| Ok("from parent".into())))
        .definition(BeanDefinition::of::<String, _>("name", |_| Ok("parent".into())))
        .definition(messages("messageSource", &[("greeting", "Hello {0}"), ("farewell", "Bye")]))
        .build();
    parent.refresh().unwrap();
    parent
}

#[test]
fn test_child_resolves_undefined_beans_from_parent() {
    struct Repository {
        url: Arc<String>,
    }

    let parent = parent_context();
    let child = ApplicationContext::builder()
        .display_name("child")
        .parent(parent.clone())
        .definition(BeanDefinition::of::<String, _>("name", |_| Ok("child".into())))
        .definition(BeanDefinition::of::<Repository, _>("repository", |ctx| {
            Ok(Repository { url: ctx.get_bean_as::<String>("shared")? })
        }))
        .build();
    child.refresh().unwrap();

    assert_eq!(child.get_bean_as::<String>("name").unwrap().as_str(), "child");
    assert_eq!(parent.get_bean_as::<String>("name").unwrap().as_str(), "parent");

    let shared = parent.get_bean_as::<String>("shared").unwrap();
    assert!(Arc::ptr_eq(&child.get_bean_as::<String>("shared").unwrap(), &shared));
    assert!(Arc::ptr_eq(&child.get_bean_as::<Repository>("repository").unwrap().url, &shared));

    assert!(child.contains_bean("shared"));
    assert!(!child.contains_local_bean("shared"));
    assert!(!parent.contains_bean("repository"));
    assert!(matches!(child.get_bean("missing"), Err(DiError::NotFound(_))));
    assert_eq!(child.parent().map(ApplicationContext::display_name), Some("parent"));
}

#[test]
fn test_child_events_reach_parent_listeners_only_upwards() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let parent = ApplicationContext::builder()
        .display_name("parent")
        .listener(recorder("parent", &log))
        .build();
    parent.refresh().unwrap();
    let child = ApplicationContext::builder()
        .display_name("child")
        .parent(parent.clone())
        .listener(recorder("child", &log))
        .build();
    child.refresh().unwrap();
    log.lock().clear();

    child.publish_event(ApplicationEvent::custom("orderPlaced", "shop")).unwrap();
    parent.publish_event(ApplicationEvent::custom("priceChanged", "catalog")).unwrap();
    child.close();

    assert_eq!(
        *log.lock(),
        vec![
            "child:orderPlaced:shop",
            "parent:orderPlaced:shop",
            "parent:priceChanged:catalog",
            "child:ContextClosed:child",
            "parent:ContextClosed:child",
        ]
    );
    assert!(parent.is_active());
}

#[test]
fn test_child_refresh_requires_refreshed_parent() {
    let parent = ApplicationContext::builder().display_name("parent").build();
    let child = ApplicationContext::builder().parent(parent.clone()).build();

    assert!(matches!(child.refresh(), Err(DiError::LifecycleState(_))));
    assert!(!child.is_active());

    parent.refresh().unwrap();
    child.refresh().unwrap();
    assert!(child.is_active());
}

#[test]
fn test_messages_fall_back_to_parent() {
    let parent = parent_context();
    let child = ApplicationContext::builder()
        .parent(parent.clone())
        .definition(messages("messageSource", &[("farewell", "See you")]))
        .build();
    child.refresh().unwrap();

    assert_eq!(child.get_message("farewell", &[], None).unwrap(), "See you");
    assert_eq!(child.get_message("greeting", &[&"Ada"], None).unwrap(), "Hello Ada");
    assert_eq!(child.get_message("unknown", &[], Some("fallback")).unwrap(), "fallback");
    assert!(matches!(child.get_message("unknown", &[], None), Err(DiError::Configuration(_))));
}

#[test]
fn test_child_without_message_source_uses_parent_messages() {
    let parent = parent_context();
    let child = ApplicationContext::builder().parent(parent.clone()).build();
    child.refresh().unwrap();

    assert_eq!(child.get_message("greeting", &[&"Grace"], None).unwrap(), "Hello Grace");
    assert!(child.contains_local_bean("messageSource"));
}

#[test]
fn test_child_environment_includes_parent_properties() {
    struct Endpoint {
        url: String,
    }

    let parent = parent_context();
    let mut settings = ContextSettings::default();
    settings.properties.insert("db.pool".into(), "4".into());
    settings.required_properties.push("db.url".into());
    let child = ApplicationContext::builder()
        .settings(settings)
        .parent(parent.clone())
        .definition(PropertyPlaceholderConfigurer::new().definition("placeholders"))
        .definition(
            BeanDefinition::of::<Endpoint, _>("endpoint", |ctx| Ok(Endpoint { url: ctx.property_text("url")?.into() }))
                .property("url", PropertyValue::text("${db.url}?pool=${db.pool}")),
        )
        .build();
    child.refresh().unwrap();

    assert_eq!(child.environment().property("db.url").as_deref(), Some("postgres://shared"));
    assert_eq!(child.get_bean_as::<Endpoint>("endpoint").unwrap().url, "postgres://shared?pool=4");
    assert_eq!(parent.environment().property("db.pool"), None);
}
