//! End-to-end tests of the transport attachment protocol.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use serde_json::json;

use logstack::{
    Config, Error, Identity, Kind, Level, Logger, TransportConfig, TransportEntry,
};

fn logger_with_full_identity() -> Logger {
    Logger::with_identity(Identity::new(
        Some("svc1".into()),
        Some("billing".into()),
        Some("2.3.0".into()),
    ))
}

#[test]
fn valid_options_attach_exactly_one_sink() {
    let mut logger = Logger::with_identity(Identity::default());
    logger
        .attach(Kind::Console, json!({ "level": "debug", "colorize": false }))
        .unwrap();
    assert_eq!(logger.attached(Kind::Console), 1);
}

#[test]
fn additive_mode_grows_the_attachment_count() {
    let mut logger = Logger::with_identity(Identity::default());
    logger.attach(Kind::Console, json!({})).unwrap();
    logger
        .attach_additive(Kind::Console, json!({ "level": "error" }))
        .unwrap();
    assert_eq!(logger.attached(Kind::Console), 2);
}

#[test]
fn unknown_key_fails_and_leaves_state_unchanged() {
    let mut logger = Logger::with_identity(Identity::default());
    let err = logger
        .attach(Kind::Console, json!({ "colour": true }))
        .unwrap_err();
    assert!(matches!(err, Error::Validation { kind: Kind::Console, .. }));
    assert_eq!(logger.attached(Kind::Console), 0);
}

#[test]
fn reattaching_a_kind_replaces_its_sink() {
    let mut logger = Logger::with_identity(Identity::default());
    logger.attach(Kind::Console, json!({ "level": "info" })).unwrap();
    logger.attach(Kind::Console, json!({ "level": "warn" })).unwrap();
    assert_eq!(logger.attached(Kind::Console), 1);
    match logger.attachment_config(Kind::Console).unwrap() {
        TransportConfig::Console(o) => assert_eq!(o.level, Level::warn),
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn papertrail_requires_the_logger_name() {
    let mut logger = Logger::with_identity(Identity::default());
    let options = json!({ "host": "logs.example.com", "port": 6514 });
    let err = logger.attach(Kind::Papertrail, options.clone()).unwrap_err();
    assert!(matches!(err, Error::MissingIdentity("name")));
    assert_eq!(logger.attached(Kind::Papertrail), 0);

    logger.set_name("svc1");
    logger.attach(Kind::Papertrail, options).unwrap();
    match logger.attachment_config(Kind::Papertrail).unwrap() {
        TransportConfig::Papertrail(o) => assert_eq!(o.program, "svc1"),
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn explicit_papertrail_program_is_kept() {
    let mut logger = logger_with_full_identity();
    logger
        .attach(
            Kind::Papertrail,
            json!({ "host": "h", "port": 1, "program": "custom" }),
        )
        .unwrap();
    match logger.attachment_config(Kind::Papertrail).unwrap() {
        TransportConfig::Papertrail(o) => assert_eq!(o.program, "custom"),
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn stackdriver_without_project_source_is_missing_credentials() {
    if logstack::credentials::default_path().is_some() {
        // A credentials path in the environment would legitimately satisfy
        // the precondition.
        return;
    }
    let mut logger = logger_with_full_identity();
    let err = logger.attach(Kind::Stackdriver, json!({})).unwrap_err();
    assert!(matches!(err, Error::MissingCredentials));
}

#[test]
fn stackdriver_with_explicit_project_id_fills_identity_defaults() {
    let mut logger = logger_with_full_identity();
    logger
        .attach(Kind::Stackdriver, json!({ "projectId": "p1" }))
        .unwrap();
    match logger.attachment_config(Kind::Stackdriver).unwrap() {
        TransportConfig::Stackdriver(o) => {
            assert_eq!(o.project_id, "p1");
            assert_eq!(o.log_name, "billing");
            assert_eq!(o.service_context.service, "svc1");
            assert_eq!(o.service_context.version, "2.3.0");
            assert_eq!(o.service_context.resource_type, "api");
        }
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn stackdriver_identity_preconditions_checked_in_order() {
    let mut logger = Logger::with_identity(Identity::default());
    let err = logger
        .attach(Kind::Stackdriver, json!({ "projectId": "p1" }))
        .unwrap_err();
    assert!(matches!(err, Error::MissingIdentity("name")));

    logger.set_name("svc1");
    let err = logger
        .attach(Kind::Stackdriver, json!({ "projectId": "p1" }))
        .unwrap_err();
    assert!(matches!(err, Error::MissingIdentity("serviceType")));

    logger.set_service_type("billing");
    let err = logger
        .attach(Kind::Stackdriver, json!({ "projectId": "p1" }))
        .unwrap_err();
    assert!(matches!(err, Error::MissingIdentity("apiVersion")));

    logger.set_api_version("2.3.0");
    logger
        .attach(Kind::Stackdriver, json!({ "projectId": "p1" }))
        .unwrap();
}

#[test]
fn bulk_apply_honors_switch_and_shorthand_forms() {
    let mut logger = Logger::with_identity(Identity::default());
    let mut map = BTreeMap::new();
    map.insert("console".to_string(), TransportEntry::Switch(true));
    map.insert(
        "file".to_string(),
        TransportEntry::Shorthand("disabled".to_string()),
    );
    map.insert("papertrail".to_string(), TransportEntry::Switch(false));
    logger.apply(&map).unwrap();

    assert_eq!(logger.attached(Kind::Console), 1);
    assert_eq!(logger.attached(Kind::File), 0);
    assert_eq!(logger.attached(Kind::Papertrail), 0);
    match logger.attachment_config(Kind::Console).unwrap() {
        TransportConfig::Console(o) => assert_eq!(o.level, Level::info),
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn bulk_apply_rejects_unknown_shorthand() {
    let mut logger = Logger::with_identity(Identity::default());
    let mut map = BTreeMap::new();
    map.insert(
        "console".to_string(),
        TransportEntry::Shorthand("bogus".to_string()),
    );
    let err = logger.apply(&map).unwrap_err();
    match err {
        Error::UnknownShorthand { kind, value } => {
            assert_eq!(kind, Kind::Console);
            assert_eq!(value, "bogus");
        }
        other => panic!("expected UnknownShorthand, got {other}"),
    }
    assert_eq!(logger.attached(Kind::Console), 0);
}

#[test]
fn earlier_attachments_survive_a_later_failure() {
    let mut logger = logger_with_full_identity();
    let config: Config = serde_json::from_value(json!({
        "name": "svc1",
        "transports": {
            "console": true,
            "papertrail": { "host": "h" }
        }
    }))
    .unwrap();
    // BTreeMap order applies console first, then fails on papertrail.
    let err = logger.apply(&config.transports).unwrap_err();
    assert!(matches!(err, Error::Validation { kind: Kind::Papertrail, .. }));
    assert_eq!(logger.attached(Kind::Console), 1);
}

#[test]
fn file_transport_writes_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc1.log");
    let mut logger = Logger::with_identity(Identity::default());
    logger
        .attach(Kind::File, json!({ "filename": path }))
        .unwrap();
    logger.log(Level::info, "first record");
    logger.log(Level::warn, "second record");
    drop(logger);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("first record"), "got: {content}");
    assert!(content.contains("second record"), "got: {content}");
}

#[test]
fn file_level_filter_drops_lower_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc1.log");
    let mut logger = Logger::with_identity(Identity::default());
    logger
        .attach(Kind::File, json!({ "filename": path, "level": "warn" }))
        .unwrap();
    logger.log(Level::info, "quiet record");
    logger.log(Level::error, "loud record");
    drop(logger);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("quiet record"), "got: {content}");
    assert!(content.contains("loud record"), "got: {content}");
}

#[test]
fn construction_from_config_applies_transports() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc1.log");
    let config: Config = serde_json::from_value(json!({
        "name": "svc1",
        "serviceType": "billing",
        "apiVersion": "2.3.0",
        "transports": {
            "file": { "filename": path },
            "stackdriver": "disabled"
        }
    }))
    .unwrap();
    let logger = Logger::new(config).unwrap();
    assert_eq!(logger.attached(Kind::File), 1);
    assert_eq!(logger.attached(Kind::Stackdriver), 0);
    assert_eq!(logger.identity().name(), Some("svc1"));
}
