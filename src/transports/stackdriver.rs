use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};
use serde::Deserialize;
use serde_json::json;
use slog::{Drain, OwnedKVList, Record};

use crate::config::Level;
use crate::transports::record_fields;

/// Fallback `resource.type` when the caller supplies none.
pub const DEFAULT_RESOURCE_TYPE: &str = "api";

/// Options for the stackdriver transport.
///
/// `projectId`, `logName` and the `serviceContext` fields are required by
/// the schema; the attachment protocol fills them in from the logger
/// identity and the credentials file before validation, so callers normally
/// only supply overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StackdriverOptions {
    pub project_id: String,
    pub log_name: String,
    pub service_context: ServiceContext,
    #[serde(default)]
    pub level: Level,
    /// Service account key file the project id was (or can be) derived from.
    pub key_filename: Option<PathBuf>,
    /// Labels applied to every entry, merged with per-record fields.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceContext {
    pub service: String,
    pub version: String,
    pub resource_type: String,
}

/// Serializes one `LogEntry` write request per record as a JSON line, for
/// pickup by an external agent that ships process output to Google Logging.
pub struct StackdriverDrain {
    log_name: String,
    resource: MonitoredResource,
    service_context: serde_json::Value,
    labels: HashMap<String, String>,
    out: Mutex<Box<dyn Write + Send>>,
}

pub(crate) fn drain(options: &StackdriverOptions) -> StackdriverDrain {
    StackdriverDrain::with_writer(options, Box::new(io::stdout()))
}

// https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity
fn severity(level: slog::Level) -> String {
    match level {
        slog::Level::Critical => "CRITICAL".into(),
        slog::Level::Error => "ERROR".into(),
        slog::Level::Warning => "WARNING".into(),
        slog::Level::Info => "INFO".into(),
        slog::Level::Debug | slog::Level::Trace => "DEBUG".into(),
    }
}

impl StackdriverDrain {
    pub(crate) fn with_writer(
        options: &StackdriverOptions,
        out: Box<dyn Write + Send>,
    ) -> StackdriverDrain {
        StackdriverDrain {
            log_name: format!(
                "projects/{}/logs/{}",
                options.project_id, options.log_name
            ),
            resource: MonitoredResource {
                type_: Some(options.service_context.resource_type.clone()),
                labels: None,
            },
            service_context: json!({
                "service": options.service_context.service,
                "version": options.service_context.version,
            }),
            labels: options.labels.clone(),
            out: Mutex::new(out),
        }
    }

    fn entry(&self, record: &Record, values: &OwnedKVList) -> LogEntry {
        let mut labels = self.labels.clone();
        labels.extend(record_fields(record, values));

        let json_payload = HashMap::from([
            ("message".to_string(), json!(format!("{}", record.msg()))),
            ("serviceContext".to_string(), self.service_context.clone()),
        ]);

        LogEntry {
            json_payload: Some(json_payload),
            labels: Some(labels),
            severity: Some(severity(record.level())),
            timestamp: Some(Utc::now()),
            resource: Some(self.resource.clone()),
            ..Default::default()
        }
    }
}

impl Drain for StackdriverDrain {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> io::Result<()> {
        let body = WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            entries: Some(vec![self.entry(record, values)]),
            ..Default::default()
        };
        let line = serde_json::to_string(&body).map_err(io::Error::other)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("stackdriver writer poisoned"))?;
        writeln!(out, "{line}")
    }
}
