//! Failure kinds that callers branch on.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The archive could not be opened or decoded.
    #[error("could not read archive {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive was read but cannot become a ledger row. It is retried next run.
    #[error("rejected {path}: {reason}")]
    Rejected { path: PathBuf, reason: String },

    /// No scored submission exists for the configuration.
    #[error("no scored submission for configuration {0}")]
    NotFound(String),

    /// A submission names a configuration that was not loaded for this run.
    #[error("configuration {0} is not loaded")]
    UnknownConfig(String),

    /// A file an external tool needs is missing.
    #[error("required input {0} does not exist")]
    MissingInput(PathBuf),

    /// An external tool could not be started.
    #[error("could not run \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("\"{command}\" failed with {status}")]
    ToolFailed { command: String, status: ExitStatus },

    /// `analyze` succeeded but its output lacks an expected marker.
    #[error("failed to find {marker} in analyze output:\n{output}")]
    MissingMarker {
        marker: &'static str,
        output: String,
    },
}
