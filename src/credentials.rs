//! Project id resolution for the stackdriver transport.
//!
//! A service account key file carries the project it belongs to in its
//! `project_id` field. When the caller gives no explicit `projectId` option,
//! the file named by the `keyFilename` option, or failing that by the
//! `GOOGLE_APPLICATION_CREDENTIALS` environment variable, is read once per
//! attach call. Read or parse failures are fatal to that call and never
//! retried.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};

/// Environment variable holding the default credentials file path.
pub const CREDENTIALS_PATH_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// The credentials path supplied by the environment, if any.
pub fn default_path() -> Option<PathBuf> {
    env::var_os(CREDENTIALS_PATH_VAR).map(PathBuf::from)
}

/// Extracts the `project_id` field from a credentials file.
pub fn project_id_from_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::CredentialsRead {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| Error::CredentialsParse {
        path: path.to_path_buf(),
        source,
    })?;
    value
        .get("project_id")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::NoProjectId {
            path: path.to_path_buf(),
        })
}
