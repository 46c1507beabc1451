//! Opening sessions against named connections.

use std::env;
use worksession_core::{
    CoreError, EnvSettings, JsonFileSettings, MemorySettings, Session, SessionConfig,
};
use worksession_testkit::prelude::*;

#[test]
fn unknown_connection_fails_fast() {
    let settings = MemorySettings::new().with_connection("main", "memory", "orders");
    let err = Session::open(&settings, "reporting", &memory_connector(), SessionConfig::default())
        .unwrap_err();
    match err {
        CoreError::ConfigurationMissing { name, reason } => {
            assert_eq!(name, "reporting");
            assert_eq!(reason, "not configured");
        }
        other => panic!("expected ConfigurationMissing, got {other:?}"),
    }
}

#[test]
fn invalid_connection_fails_fast() {
    let settings = MemorySettings::new().with_connection("main", "memory", "");
    let err = Session::open(&settings, "main", &memory_connector(), SessionConfig::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
}

#[test]
fn json_settings_open_a_session() {
    let (_dir, path) = settings_file(
        r#"{
            "connections": {
                "main": { "provider": "memory", "connection_string": "orders" },
                "broken": { "provider": "memory", "connection_string": "" }
            }
        }"#,
    );
    let settings = JsonFileSettings::new(&path);

    let mut session =
        Session::open(&settings, "main", &memory_connector(), SessionConfig::default()).unwrap();
    session.add(order(1, 10)).unwrap();
    assert_eq!(session.save().unwrap(), 1);

    assert!(matches!(
        Session::open(&settings, "broken", &memory_connector(), SessionConfig::default()),
        Err(CoreError::ConfigurationMissing { .. })
    ));
}

#[test]
fn malformed_settings_file_is_a_configuration_error() {
    let (_dir, path) = settings_file(r#"{ "connections": ["main"] }"#);
    let settings = JsonFileSettings::new(&path);
    let err = Session::open(&settings, "main", &memory_connector(), SessionConfig::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
}

#[test]
fn environment_settings_open_a_session() {
    env::set_var("WS_SESSION_IT_MAIN_PROVIDER", "memory");
    env::set_var("WS_SESSION_IT_MAIN_CONNECTION_STRING", "orders");
    let settings = EnvSettings::with_prefix("WS_SESSION_IT");

    let session =
        Session::open(&settings, "main", &memory_connector(), SessionConfig::default()).unwrap();
    assert_eq!(session.connection().connection_string, "orders");
}

#[test]
fn connector_errors_propagate() {
    let settings = MemorySettings::new().with_connection("main", "postgres", "host=db");
    let connector = |d: &worksession_core::ConnectionDescriptor| {
        Err::<std::sync::Arc<dyn worksession_core::DataStore>, _>(CoreError::configuration_missing(
            d.name.clone(),
            format!("provider {} is not available", d.provider),
        ))
    };
    let err = Session::open(&settings, "main", &connector, SessionConfig::default()).unwrap_err();
    assert!(err.to_string().contains("provider postgres is not available"));
}
