#![cfg(feature = "config")]

use ferrous_context::{ApplicationContext, BeanLookup, ContextSettings, DiError, Environment, ENVIRONMENT_BEAN_NAME};
use std::io::Write;

const SETTINGS: &str = r#"{
    "display_name": "orders",
    "allow_circular_references": false,
    "required_properties": ["db.url"],
    "properties": { "db.url": "postgres://orders", "db.pool": "4" },
    "proxy": { "expose_proxy": true, "interceptor_names": [] }
}"#;

#[test]
fn test_context_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SETTINGS.as_bytes()).unwrap();

    let settings = ContextSettings::from_json_file(file.path()).unwrap();
    let context = ApplicationContext::builder().settings(settings).build();
    context.refresh().unwrap();

    assert_eq!(context.display_name(), "orders");
    assert_eq!(context.environment().property("db.pool").as_deref(), Some("4"));
    let environment = context.get_bean_as::<Environment>(ENVIRONMENT_BEAN_NAME).unwrap();
    assert_eq!(environment.required_property("db.url").unwrap(), "postgres://orders");

    let creator = context.auto_proxy_creator().unwrap();
    assert!(creator.settings().expose_proxy);
    assert!(creator.settings().apply_common_interceptors_first);
}

#[test]
fn test_required_property_missing_from_file_fails_refresh() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{ "required_properties": ["db.url"] }"#).unwrap();

    let settings = ContextSettings::from_json_file(file.path()).unwrap();
    let context = ApplicationContext::builder().settings(settings).build();
    match context.refresh() {
        Err(DiError::Configuration(msg)) => assert!(msg.contains("db.url")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn test_unreadable_settings_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(ContextSettings::from_json_file(&missing), Err(DiError::Configuration(_))));
}
