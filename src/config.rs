use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::transports::Kind;

/// Log level shared by every transport kind.
///
/// A closed, case-sensitive set; any other string fails validation. The
/// `verbose` and `silly` members exist for configuration written against
/// loggers that distinguish them, and map onto the nearest slog level.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Level {
    error,
    warn,
    info,
    verbose,
    debug,
    silly,
}

impl Level {
    pub fn to_slog(self) -> slog::Level {
        match self {
            Level::error => slog::Level::Error,
            Level::warn => slog::Level::Warning,
            Level::info => slog::Level::Info,
            Level::verbose | Level::debug => slog::Level::Debug,
            Level::silly => slog::Level::Trace,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::info
    }
}

/// Construction-time configuration: the identity fields plus a mapping from
/// transport kind name to options or shorthand.
///
/// ```json
/// {
///   "name": "svc1",
///   "serviceType": "billing",
///   "apiVersion": "2.3.0",
///   "transports": {
///     "console": true,
///     "file": { "filename": "svc1.log", "maxsize": 10485760 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub name: Option<String>,
    pub service_type: Option<String>,
    pub api_version: Option<String>,
    #[serde(default)]
    pub transports: BTreeMap<String, TransportEntry>,
}

/// One entry in the bulk transport mapping: a full options object, a boolean
/// switch, or the string shorthands "enabled" / "disabled".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransportEntry {
    Switch(bool),
    Shorthand(String),
    Options(Value),
}

impl TransportEntry {
    /// Normalizes the entry to either raw options to attach with, or `None`
    /// meaning the kind is skipped entirely.
    pub(crate) fn normalize(&self, kind: Kind) -> Result<Option<Value>> {
        match self {
            TransportEntry::Switch(true) => Ok(Some(json!({}))),
            TransportEntry::Switch(false) => Ok(None),
            TransportEntry::Shorthand(s) if s == "enabled" => Ok(Some(json!({}))),
            TransportEntry::Shorthand(s) if s == "disabled" => Ok(None),
            TransportEntry::Shorthand(s) => Err(Error::UnknownShorthand {
                kind,
                value: s.clone(),
            }),
            TransportEntry::Options(v) => Ok(Some(v.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_parses_only_exact_members() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::warn);
        assert_eq!("silly".parse::<Level>().unwrap(), Level::silly);
        assert!("WARN".parse::<Level>().is_err());
        assert!("warning".parse::<Level>().is_err());
    }

    #[test]
    fn level_maps_onto_slog() {
        assert_eq!(Level::warn.to_slog(), slog::Level::Warning);
        assert_eq!(Level::verbose.to_slog(), slog::Level::Debug);
        assert_eq!(Level::silly.to_slog(), slog::Level::Trace);
    }

    #[test]
    fn config_accepts_shorthand_and_options() {
        let config: Config = serde_json::from_value(json!({
            "name": "svc1",
            "serviceType": "billing",
            "transports": {
                "console": true,
                "file": "disabled",
                "papertrail": { "host": "logs.example.com", "port": 514 }
            }
        }))
        .unwrap();
        assert_eq!(config.name.as_deref(), Some("svc1"));
        assert_eq!(config.transports.len(), 3);
    }

    #[test]
    fn config_rejects_unknown_top_level_field() {
        let res: std::result::Result<Config, _> = serde_json::from_value(json!({ "nome": "svc1" }));
        assert!(res.is_err());
    }

    #[test]
    fn normalize_switch_and_shorthand() {
        let on = TransportEntry::Switch(true).normalize(Kind::Console).unwrap();
        assert_eq!(on, Some(json!({})));
        let off = TransportEntry::Switch(false).normalize(Kind::Console).unwrap();
        assert_eq!(off, None);
        let enabled = TransportEntry::Shorthand("enabled".into())
            .normalize(Kind::File)
            .unwrap();
        assert_eq!(enabled, Some(json!({})));
        let disabled = TransportEntry::Shorthand("disabled".into())
            .normalize(Kind::File)
            .unwrap();
        assert_eq!(disabled, None);
    }

    #[test]
    fn normalize_rejects_unknown_shorthand() {
        let err = TransportEntry::Shorthand("bogus".into())
            .normalize(Kind::Console)
            .unwrap_err();
        match err {
            Error::UnknownShorthand { kind, value } => {
                assert_eq!(kind, Kind::Console);
                assert_eq!(value, "bogus");
            }
            other => panic!("expected UnknownShorthand, got {other}"),
        }
    }
}
