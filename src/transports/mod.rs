//! The closed set of transport kinds and the schema registry behind them.
//!
//! Each kind owns a typed options struct; validation is a serde pass with
//! `deny_unknown_fields`, so unknown keys, missing required keys and
//! out-of-set values all surface as [`Error::Validation`]. Default injection
//! is a pure function over a copy of the caller's options and never mutates
//! caller-owned data.

pub mod console;
pub mod elasticsearch;
pub mod file;
pub mod papertrail;
pub mod stackdriver;

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use slog::{Drain, Key, Level as SlogLevel, Never, OwnedKVList, Record, KV};
use strum_macros::{Display, EnumString};

use crate::config::Level;
use crate::credentials;
use crate::error::{Error, Result};
use crate::identity::Identity;

/// The closed set of transport kinds.
///
/// String forms are the lowercase kind names used as keys in a bulk
/// transport mapping; the networked kinds also parse from the role names
/// `remote-shipper`, `search-index` and `cloud-logging`. Anything else is
/// [`Error::UnknownKind`]; arbitrary sinks go through the custom escape
/// hatch instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Console,
    File,
    #[strum(to_string = "papertrail", serialize = "remote-shipper")]
    Papertrail,
    #[strum(to_string = "elasticsearch", serialize = "search-index")]
    Elasticsearch,
    #[strum(to_string = "stackdriver", serialize = "cloud-logging")]
    Stackdriver,
}

/// A validated, default-filled configuration for one transport kind.
///
/// Values of this type always satisfy their kind's schema; no
/// partially-validated options ever reach a sink constructor.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Console(console::ConsoleOptions),
    File(file::FileOptions),
    Papertrail(papertrail::PapertrailOptions),
    Elasticsearch(elasticsearch::ElasticsearchOptions),
    Stackdriver(stackdriver::StackdriverOptions),
}

impl TransportConfig {
    pub fn kind(&self) -> Kind {
        match self {
            TransportConfig::Console(_) => Kind::Console,
            TransportConfig::File(_) => Kind::File,
            TransportConfig::Papertrail(_) => Kind::Papertrail,
            TransportConfig::Elasticsearch(_) => Kind::Elasticsearch,
            TransportConfig::Stackdriver(_) => Kind::Stackdriver,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            TransportConfig::Console(o) => o.level,
            TransportConfig::File(o) => o.level,
            TransportConfig::Papertrail(o) => o.level,
            TransportConfig::Elasticsearch(o) => o.level,
            TransportConfig::Stackdriver(o) => o.level,
        }
    }
}

/// Runs a kind's schema over raw options.
pub fn validate(kind: Kind, options: Value) -> Result<TransportConfig> {
    let invalid = |source| Error::Validation { kind, source };
    Ok(match kind {
        Kind::Console => {
            TransportConfig::Console(serde_json::from_value(options).map_err(invalid)?)
        }
        Kind::File => TransportConfig::File(serde_json::from_value(options).map_err(invalid)?),
        Kind::Papertrail => {
            TransportConfig::Papertrail(serde_json::from_value(options).map_err(invalid)?)
        }
        Kind::Elasticsearch => {
            let opts: elasticsearch::ElasticsearchOptions =
                serde_json::from_value(options).map_err(invalid)?;
            opts.check()?;
            TransportConfig::Elasticsearch(opts)
        }
        Kind::Stackdriver => {
            TransportConfig::Stackdriver(serde_json::from_value(options).map_err(invalid)?)
        }
    })
}

/// Injects the kind's derived defaults into a copy of the caller's options.
///
/// Reads the identity as it is at attachment time. Defaults never overwrite
/// caller-supplied fields; for the stackdriver `serviceContext` the merge is
/// per nested field. Identity preconditions are checked here, before any
/// default is computed.
pub fn with_defaults(kind: Kind, identity: &Identity, options: &Value) -> Result<Value> {
    match kind {
        Kind::Papertrail => {
            let name = identity.require_name()?;
            let mut map = match options_map(options) {
                Some(map) => map,
                None => return Ok(options.clone()),
            };
            map.entry("program").or_insert_with(|| json!(name));
            Ok(Value::Object(map))
        }
        Kind::Stackdriver => {
            let (name, service_type, api_version) = identity.require_all()?;
            let mut map = match options_map(options) {
                Some(map) => map,
                None => return Ok(options.clone()),
            };
            if !map.contains_key("projectId") {
                let path = map
                    .get("keyFilename")
                    .and_then(Value::as_str)
                    .map(std::path::PathBuf::from)
                    .or_else(credentials::default_path)
                    .ok_or(Error::MissingCredentials)?;
                let project_id = credentials::project_id_from_file(&path)?;
                map.insert("projectId".to_owned(), json!(project_id));
            }
            map.entry("logName").or_insert_with(|| json!(service_type));
            let context = map
                .entry("serviceContext")
                .or_insert_with(|| json!({}));
            if let Some(context) = context.as_object_mut() {
                context.entry("service").or_insert_with(|| json!(name));
                context.entry("version").or_insert_with(|| json!(api_version));
                context
                    .entry("resourceType")
                    .or_insert_with(|| json!(stackdriver::DEFAULT_RESOURCE_TYPE));
            }
            Ok(Value::Object(map))
        }
        Kind::Console | Kind::File | Kind::Elasticsearch => Ok(options.clone()),
    }
}

// Non-objects pass through untouched so the schema pass reports them.
fn options_map(options: &Value) -> Option<Map<String, Value>> {
    match options {
        Value::Object(map) => Some(map.clone()),
        Value::Null => Some(Map::new()),
        _ => None,
    }
}

/// Constructs the sink for a validated configuration and seals it behind the
/// per-sink level filter and stderr fallback.
pub fn build(config: &TransportConfig) -> Result<SealedDrain> {
    match config {
        TransportConfig::Console(o) => Ok(seal(console::drain(o), o.level, o.silent)),
        TransportConfig::File(o) => {
            let drain = file::drain(o).map_err(|e| Error::Sink {
                kind: Kind::File,
                source: Box::new(e),
            })?;
            Ok(seal(drain, o.level, false))
        }
        TransportConfig::Papertrail(o) => Ok(seal(papertrail::drain(o), o.level, false)),
        TransportConfig::Elasticsearch(o) => {
            let drain = elasticsearch::drain(o).map_err(|e| Error::Sink {
                kind: Kind::Elasticsearch,
                source: Box::new(e),
            })?;
            Ok(seal(drain, o.level, false))
        }
        TransportConfig::Stackdriver(o) => Ok(seal(stackdriver::drain(o), o.level, false)),
    }
}

/// A drain ready to join the fan-out: level-filtered, error-swallowing,
/// shareable across root rebuilds.
pub type SealedDrain = Arc<dyn Drain<Ok = (), Err = Never> + Send + Sync>;

/// Swallows sink errors so one failing destination never poisons the others,
/// reporting them on stderr instead.
#[derive(Clone)]
pub(crate) struct FallbackToStderr<D: Drain> {
    drain: D,
}

impl<D: Drain> Drain for FallbackToStderr<D>
where
    D::Err: fmt::Display,
{
    type Ok = ();
    type Err = ();

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> std::result::Result<(), ()> {
        if let Err(err) = self.drain.log(record, logger_values) {
            eprintln!("a sink could not log to its destination: {}", err);
        }
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: SlogLevel) -> bool {
        self.drain.is_enabled(level)
    }
}

pub(crate) fn seal<D>(drain: D, level: Level, silent: bool) -> SealedDrain
where
    D: Drain + Send + 'static,
    D::Err: fmt::Display,
{
    let drain = Mutex::new(drain)
        .filter(move |_: &Record| !silent)
        .filter_level(level.to_slog())
        .map(|drain| FallbackToStderr { drain })
        .fuse();
    Arc::new(drain)
}

/// Seals an externally constructed sink for the custom escape hatch: no
/// schema, no level filter, only the stderr fallback.
pub(crate) fn seal_custom<D>(drain: D) -> SealedDrain
where
    D: Drain + Send + 'static,
    D::Err: fmt::Display,
{
    let drain = Mutex::new(drain)
        .map(|drain| FallbackToStderr { drain })
        .fuse();
    Arc::new(drain)
}

// Flattens a record's own key/value pairs and the logger context into string
// pairs for the structured sinks.
#[derive(Default)]
pub(crate) struct FieldSerializer {
    map: HashMap<String, String>,
}

impl slog::Serializer for FieldSerializer {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.map.insert(key.to_string(), value);
        Ok(())
    }
}

pub(crate) fn record_fields(record: &Record, values: &OwnedKVList) -> HashMap<String, String> {
    let mut serializer = FieldSerializer::default();
    let _ = record.kv().serialize(record, &mut serializer);
    let _ = values.serialize(record, &mut serializer);
    serializer.map
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn full_identity() -> Identity {
        Identity::new(
            Some("svc1".into()),
            Some("billing".into()),
            Some("2.3.0".into()),
        )
    }

    #[test]
    fn kind_parses_lowercase_names() {
        assert_eq!("console".parse::<Kind>().unwrap(), Kind::Console);
        assert_eq!("stackdriver".parse::<Kind>().unwrap(), Kind::Stackdriver);
        assert!("syslog".parse::<Kind>().is_err());
        assert_eq!(Kind::Papertrail.to_string(), "papertrail");
    }

    #[test]
    fn kind_accepts_role_name_aliases() {
        assert_eq!("remote-shipper".parse::<Kind>().unwrap(), Kind::Papertrail);
        assert_eq!("search-index".parse::<Kind>().unwrap(), Kind::Elasticsearch);
        assert_eq!("cloud-logging".parse::<Kind>().unwrap(), Kind::Stackdriver);
        // the concrete name stays the canonical display form
        assert_eq!(Kind::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(Kind::Stackdriver.to_string(), "stackdriver");
    }

    #[test]
    fn validate_rejects_unknown_key() {
        let err = validate(Kind::Console, json!({ "colour": true })).unwrap_err();
        assert!(matches!(err, Error::Validation { kind: Kind::Console, .. }));
    }

    #[test]
    fn validate_rejects_missing_required_key() {
        let err = validate(Kind::Papertrail, json!({ "host": "h", "program": "p" })).unwrap_err();
        assert!(matches!(err, Error::Validation { kind: Kind::Papertrail, .. }));
    }

    #[test]
    fn validate_rejects_out_of_set_level() {
        let err = validate(Kind::Console, json!({ "level": "loud" })).unwrap_err();
        assert!(matches!(err, Error::Validation { kind: Kind::Console, .. }));
    }

    #[test]
    fn validate_fills_declared_defaults() {
        let config = validate(Kind::Console, json!({})).unwrap();
        match config {
            TransportConfig::Console(o) => {
                assert_eq!(o.level, Level::info);
                assert!(o.colorize);
                assert!(o.timestamp);
                assert!(!o.silent);
            }
            other => panic!("expected console config, got {other:?}"),
        }
    }

    #[test]
    fn papertrail_program_defaults_from_identity_name() {
        let identity = full_identity();
        let raw = json!({ "host": "logs.example.com", "port": 6514 });
        let filled = with_defaults(Kind::Papertrail, &identity, &raw).unwrap();
        assert_eq!(filled["program"], json!("svc1"));
        // caller-supplied program wins
        let raw = json!({ "host": "h", "port": 1, "program": "custom" });
        let filled = with_defaults(Kind::Papertrail, &identity, &raw).unwrap();
        assert_eq!(filled["program"], json!("custom"));
    }

    #[test]
    fn papertrail_without_name_is_a_missing_identity_error() {
        let identity = Identity::default();
        let raw = json!({ "host": "h", "port": 1 });
        let err = with_defaults(Kind::Papertrail, &identity, &raw).unwrap_err();
        assert!(matches!(err, Error::MissingIdentity("name")));
    }

    #[test]
    fn with_defaults_never_mutates_caller_options() {
        let identity = full_identity();
        let raw = json!({ "host": "h", "port": 1 });
        let before = raw.clone();
        let _ = with_defaults(Kind::Papertrail, &identity, &raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn stackdriver_defaults_derive_from_identity() {
        let identity = full_identity();
        let raw = json!({ "projectId": "p1" });
        let filled = with_defaults(Kind::Stackdriver, &identity, &raw).unwrap();
        assert_eq!(filled["logName"], json!("billing"));
        assert_eq!(filled["serviceContext"]["service"], json!("svc1"));
        assert_eq!(filled["serviceContext"]["version"], json!("2.3.0"));
        assert_eq!(filled["serviceContext"]["resourceType"], json!("api"));
    }

    #[test]
    fn stackdriver_deep_merge_keeps_caller_context_fields() {
        let identity = full_identity();
        let raw = json!({
            "projectId": "p1",
            "serviceContext": { "service": "override" }
        });
        let filled = with_defaults(Kind::Stackdriver, &identity, &raw).unwrap();
        assert_eq!(filled["serviceContext"]["service"], json!("override"));
        assert_eq!(filled["serviceContext"]["version"], json!("2.3.0"));
        assert_eq!(filled["serviceContext"]["resourceType"], json!("api"));
    }

    #[test]
    fn stackdriver_identity_fields_checked_in_order() {
        let mut identity = Identity::default();
        identity.set_name("svc1");
        let raw = json!({ "projectId": "p1" });
        let err = with_defaults(Kind::Stackdriver, &identity, &raw).unwrap_err();
        assert!(matches!(err, Error::MissingIdentity("serviceType")));
    }

    #[test]
    fn stackdriver_project_id_from_key_file() {
        use std::io::Write;
        let mut key = tempfile::NamedTempFile::new().unwrap();
        write!(key, r#"{{"project_id": "from-file"}}"#).unwrap();
        let identity = full_identity();
        let raw = json!({ "keyFilename": key.path() });
        let filled = with_defaults(Kind::Stackdriver, &identity, &raw).unwrap();
        assert_eq!(filled["projectId"], json!("from-file"));
    }

    #[test]
    fn stackdriver_without_any_project_source_is_missing_credentials() {
        // The environment fallback only applies when the variable is set;
        // keep it out of this process' environment for the assertion to hold.
        if credentials::default_path().is_some() {
            return;
        }
        let identity = full_identity();
        let err = with_defaults(Kind::Stackdriver, &identity, &json!({})).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials));
    }
}
