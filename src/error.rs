use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transports::Kind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating transport options or attaching sinks.
///
/// Every variant aborts only the attach call that raised it; sinks attached
/// by earlier calls stay attached. Nothing here is retried at this layer.
#[derive(Error, Debug)]
pub enum Error {
    /// The options object failed the schema of its transport kind: an unknown
    /// key, a missing required key, a wrong type or an out-of-set value.
    #[error("invalid options for the {kind} transport: {source}")]
    Validation {
        kind: Kind,
        #[source]
        source: serde_json::Error,
    },

    /// A transport was attached before the logger identity field it derives
    /// its defaults from was set.
    #[error("logger identity field '{0}' must be set before this transport can be attached")]
    MissingIdentity(&'static str),

    /// The stackdriver transport could not resolve a project id: no explicit
    /// `projectId`, no `keyFilename` and no credentials path in the environment.
    #[error("no project id configured and no credentials file to derive one from")]
    MissingCredentials,

    #[error("could not read credentials file {path}: {source}")]
    CredentialsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credentials file {path} is not valid JSON: {source}")]
    CredentialsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credentials file {path} carries no project_id field")]
    NoProjectId { path: PathBuf },

    /// A string shorthand in a bulk transport mapping was neither "enabled"
    /// nor "disabled".
    #[error("unknown shorthand '{value}' for the {kind} transport, expected \"enabled\" or \"disabled\"")]
    UnknownShorthand { kind: Kind, value: String },

    /// A transport mapping referenced a name outside the closed kind set.
    #[error("unknown transport kind '{0}'")]
    UnknownKind(String),

    /// An option deserialized fine but failed a post check, e.g. a malformed
    /// cluster URL.
    #[error("invalid value for {kind} option '{field}': {reason}")]
    InvalidOption {
        kind: Kind,
        field: &'static str,
        reason: String,
    },

    /// The sink constructor itself failed, e.g. the log file could not be
    /// opened or the HTTP client could not be built.
    #[error("could not construct the {kind} sink: {source}")]
    Sink {
        kind: Kind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}
