//! Assembles an [slog](https://crates.io/crates/slog) logger from a
//! declarative description of transport destinations.
//!
//! Five transport kinds are supported: `console`, `file`, `papertrail`,
//! `elasticsearch` and `stackdriver`. Options for each kind are validated
//! against a closed schema, per-kind defaults are derived from the logger's
//! identity (name, service type, API version), and the resulting sink is
//! attached to the logger with replace-or-add semantics: by default at most
//! one sink per kind is active and re-attaching a kind swaps its sink out.
//!
//! ```
//! use logstack::{Config, Kind, Level, Logger};
//! use serde_json::json;
//!
//! let mut logger = Logger::new(Config::default())?;
//! logger.set_name("svc1");
//! logger.attach(Kind::Console, json!({ "level": "info", "colorize": false }))?;
//! logger.log(Level::info, "ready");
//! # Ok::<(), logstack::Error>(())
//! ```
//!
//! Bulk configuration accepts the shorthand forms `true` / `"enabled"`
//! (attach with defaults) and `false` / `"disabled"` (skip):
//!
//! ```
//! use logstack::{Config, Logger};
//!
//! let config: Config = serde_json::from_value(serde_json::json!({
//!     "name": "svc1",
//!     "transports": { "console": true, "file": "disabled" }
//! }))?;
//! let logger = Logger::new(config)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Sinks the registry does not know about go through the custom escape
//! hatch, [`Logger::attach_custom`], which performs no validation.

pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod logger;
pub mod transports;

pub use config::{Config, Level, TransportEntry};
pub use error::{Error, Result};
pub use identity::Identity;
pub use logger::{Logger, SinkKey};
pub use transports::{Kind, TransportConfig};
