//! The logger object and its transport attachment protocol.
//!
//! Attaching a transport runs five steps in order: identity preconditions,
//! pure default injection, schema validation, the replacement policy, and
//! finally sink construction. Any failure aborts the call before the
//! attachment set changes, so a failed attach never leaves a half-attached
//! sink behind. After every successful change the slog root is rebuilt as an
//! async fan-out over the attached sinks.

use std::collections::BTreeMap;
use std::fmt;

use slog::{o, Drain, Never, OwnedKVList, Record};
use slog_async::Async;

use crate::config::{Config, Level, TransportEntry};
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::transports::{self, Kind, SealedDrain, TransportConfig};

/// Key under which a sink is attached: a member of the closed kind set, or a
/// caller-chosen name for the custom escape hatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKey {
    Kind(Kind),
    Custom(String),
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKey::Kind(kind) => kind.fmt(f),
            SinkKey::Custom(name) => name.fmt(f),
        }
    }
}

struct Attachment {
    key: SinkKey,
    // Custom attachments bypass the schema and carry no config.
    config: Option<TransportConfig>,
    drain: SealedDrain,
}

// Sends every record to all attached sinks. Per-sink level filtering and
// error fallback are already sealed into each drain.
#[derive(Clone)]
struct Fanout {
    drains: Vec<SealedDrain>,
}

impl Drain for Fanout {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> std::result::Result<(), Never> {
        for drain in &self.drains {
            let _ = drain.log(record, values);
        }
        Ok(())
    }
}

/// A logger assembled from declarative transport configuration.
///
/// Holds the identity triple, the attachment set and the slog root built
/// from it. Reconfiguration happens through `&mut self`; emission goes
/// through the shared [`slog::Logger`] handle.
pub struct Logger {
    identity: Identity,
    attachments: Vec<Attachment>,
    root: slog::Logger,
}

impl Logger {
    /// Assembles a logger from a [`Config`]: identity first, then every
    /// transport in the mapping.
    ///
    /// Fails on the first transport entry that does not validate.
    pub fn new(config: Config) -> Result<Self> {
        let mut logger = Self::with_identity(Identity::new(
            config.name,
            config.service_type,
            config.api_version,
        ));
        logger.apply(&config.transports)?;
        Ok(logger)
    }

    /// A logger with no transports attached yet.
    pub fn with_identity(identity: Identity) -> Self {
        let mut logger = Self {
            identity,
            attachments: Vec::new(),
            root: slog::Logger::root(slog::Discard, o!()),
        };
        logger.rebuild();
        logger
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_name(&mut self, value: impl Into<String>) {
        self.identity.set_name(value);
    }

    pub fn set_service_type(&mut self, value: impl Into<String>) {
        self.identity.set_service_type(value);
    }

    pub fn set_api_version(&mut self, value: impl Into<String>) {
        self.identity.set_api_version(value);
    }

    /// Attaches a transport, replacing any sink previously attached under
    /// the same kind. Reconfiguring a kind is idempotent in effect: the last
    /// attach wins.
    pub fn attach(&mut self, kind: Kind, options: serde_json::Value) -> Result<()> {
        self.attach_with(kind, options, false)
    }

    /// Attaches a transport without removing existing sinks of the kind.
    pub fn attach_additive(&mut self, kind: Kind, options: serde_json::Value) -> Result<()> {
        self.attach_with(kind, options, true)
    }

    fn attach_with(&mut self, kind: Kind, options: serde_json::Value, additive: bool) -> Result<()> {
        let options = transports::with_defaults(kind, &self.identity, &options)?;
        let config = transports::validate(kind, options)?;
        let drain = transports::build(&config)?;
        if !additive {
            self.attachments.retain(|a| a.key != SinkKey::Kind(kind));
        }
        self.attachments.push(Attachment {
            key: SinkKey::Kind(kind),
            config: Some(config),
            drain,
        });
        self.rebuild();
        Ok(())
    }

    /// Attaches an externally constructed sink under a caller-chosen key,
    /// bypassing the schema registry. Always additive; the caller owns
    /// correctness and removal.
    pub fn attach_custom<D>(&mut self, key: impl Into<String>, drain: D)
    where
        D: Drain + Send + 'static,
        D::Err: fmt::Display,
    {
        self.attachments.push(Attachment {
            key: SinkKey::Custom(key.into()),
            config: None,
            drain: transports::seal_custom(drain),
        });
        self.rebuild();
    }

    /// Removes every sink attached under the kind. Returns whether anything
    /// was removed.
    pub fn detach(&mut self, kind: Kind) -> bool {
        self.remove(&SinkKey::Kind(kind))
    }

    /// Removes every custom sink attached under the key.
    pub fn detach_custom(&mut self, key: &str) -> bool {
        self.remove(&SinkKey::Custom(key.to_string()))
    }

    fn remove(&mut self, key: &SinkKey) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.key != *key);
        let removed = self.attachments.len() != before;
        if removed {
            self.rebuild();
        }
        removed
    }

    /// Applies a bulk transport mapping. Kinds absent from the mapping are
    /// left untouched; `false`/"disabled" entries are skipped without
    /// removing an existing attachment.
    pub fn apply(&mut self, transports: &BTreeMap<String, TransportEntry>) -> Result<()> {
        for (name, entry) in transports {
            let kind = name
                .parse::<Kind>()
                .map_err(|_: strum::ParseError| Error::UnknownKind(name.clone()))?;
            if let Some(options) = entry.normalize(kind)? {
                self.attach(kind, options)?;
            }
        }
        Ok(())
    }

    /// Number of sinks attached under the kind.
    pub fn attached(&self, kind: Kind) -> usize {
        self.attachments
            .iter()
            .filter(|a| a.key == SinkKey::Kind(kind))
            .count()
    }

    /// The validated configuration of the most recently attached sink of the
    /// kind, if any.
    pub fn attachment_config(&self, kind: Kind) -> Option<&TransportConfig> {
        self.attachments
            .iter()
            .rev()
            .find(|a| a.key == SinkKey::Kind(kind))
            .and_then(|a| a.config.as_ref())
    }

    /// Keys of all attachments, in attachment order.
    pub fn keys(&self) -> impl Iterator<Item = &SinkKey> {
        self.attachments.iter().map(|a| &a.key)
    }

    /// The assembled slog handle, for structured emission with the slog
    /// macros. Rebuilt on every attach/detach; clones taken earlier keep
    /// logging to the attachment set of their time.
    pub fn handle(&self) -> &slog::Logger {
        &self.root
    }

    /// Convenience plain-message emission.
    pub fn log(&self, level: Level, msg: &str) {
        match level {
            Level::error => slog::error!(self.root, "{}", msg),
            Level::warn => slog::warn!(self.root, "{}", msg),
            Level::info => slog::info!(self.root, "{}", msg),
            Level::verbose | Level::debug => slog::debug!(self.root, "{}", msg),
            Level::silly => slog::trace!(self.root, "{}", msg),
        }
    }

    fn rebuild(&mut self) {
        let fanout = Fanout {
            drains: self.attachments.iter().map(|a| a.drain.clone()).collect(),
        };
        let drain = Async::new(fanout.fuse()).build().fuse();
        self.root = slog::Logger::root(drain, o!());
    }
}
