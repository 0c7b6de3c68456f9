//! A library for ingesting districting submissions and publishing the best result per configuration.

pub mod archive;
pub mod best;
pub mod configuration;
pub mod db_util;
pub mod distribution;
pub mod error;
pub mod failures;
pub mod ingest;
pub mod measure;
pub mod publish;
pub mod render;
pub mod report;
pub mod scan;
pub mod staleness;
mod tool;

pub use error::Error;

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Suffix that marks a file under the solutions root as a submission archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Archive member holding the URL-encoded submission variables.
pub const MEMBER_VARS: &str = "vars";
/// Archive member holding the solution payload accepted by `analyze` and `drend`.
pub const MEMBER_SOLUTION: &str = "solution";
/// Archive member holding the client's binary run log.
pub const MEMBER_BINLOG: &str = "binlog";

/// Dispatch weight given to configurations without any scored result.
pub const MAX_WEIGHT: f64 = 10.0;
/// How many positive scores a configuration needs before it gets a send threshold.
pub const SEND_THRESHOLD_RANK: usize = 10;

/// One ingested archive as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub submission_id: u64,
    /// The `vars` member exactly as submitted.
    pub vars: String,
    /// Archive modification time in seconds since the epoch.
    pub unixtime: i64,
    pub kmpp: Option<f64>,
    pub spread: Option<i64>,
    /// Archive path relative to the solutions root. Unique across the ledger.
    pub path: String,
    pub config: String,
}

/// A submission that has been validated but not yet written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub vars: String,
    pub unixtime: i64,
    pub score: Option<Score>,
    pub path: String,
    pub config: String,
}

/// The numbers `analyze` reports for one solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Kilometers per person; lower is more compact.
    pub kmpp: f64,
    /// Most populous district minus least populous district.
    pub spread: i64,
}

/// A named scoring scenario: one region and one legislative body.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// `<REGION>_<variant>`, e.g. `MA_Congress`.
    pub name: String,
    /// The region's data directory, e.g. `data/MA`.
    pub data_dir: PathBuf,
    /// Binary problem definition passed to the tools as `-P`.
    pub config_input: PathBuf,
    pub district_count: u32,
    /// Arguments passed to `drend` ahead of the output and solution flags.
    pub render_args: Vec<String>,
    /// The data root this configuration was discovered under.
    pub data_root: PathBuf,
}

impl Configuration {
    /// The region code, e.g. `MA` for `MA_Congress`.
    pub fn region(&self) -> &str {
        split_config_name(&self.name).0
    }

    /// The body within the region, e.g. `Congress` for `MA_Congress`.
    pub fn variant(&self) -> &str {
        split_config_name(&self.name).1
    }
}

/// All configurations loaded for this run, ordered by name.
pub type Configurations = BTreeMap<String, Configuration>;

/// Split `<REGION>_<variant>` at the first underscore.
pub fn split_config_name(name: &str) -> (&str, &str) {
    name.split_once('_').unwrap_or((name, ""))
}

/// How eagerly new work for one configuration should be handed to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionEntry {
    pub config: String,
    pub send_anything: bool,
    pub weight: f64,
    pub kmpp_send_threshold: Option<f64>,
}
