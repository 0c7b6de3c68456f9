//! Bring new submission archives into the ledger.

use crate::archive::extract_members;
use crate::db_util;
use crate::measure::Measure;
use crate::scan::{ArchivePath, scan_archives};
use crate::{Configurations, Error, MEMBER_SOLUTION, MEMBER_VARS, NewSubmission, SubmissionRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::sqlite::SqliteConnection;
use log::{debug, info, warn};
use std::fs;
use std::path::Path;

/// What one pass over the solutions root did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Archives found by the scan.
    pub seen: usize,
    /// Archives already in the ledger.
    pub skipped: usize,
    pub added: usize,
    pub failed: usize,
    /// The pass stopped at an unreadable archive before the scan ended.
    pub stopped: bool,
}

/// Scores and records archives against a fixed set of configurations.
pub struct Ingestor<'a> {
    configs: &'a Configurations,
    measure: &'a dyn Measure,
}

impl<'a> Ingestor<'a> {
    pub fn new(configs: &'a Configurations, measure: &'a dyn Measure) -> Self {
        Self { configs, measure }
    }

    /// Scan `root` and add every archive the ledger has not seen yet.
    ///
    /// An archive that is rejected (no `vars`, no configuration, or a solution the scorer
    /// refuses) is logged and skipped. Any other failure is skipped with `keep_going` and
    /// stops the pass without it. Rows already written stay written either way, and a
    /// failed archive leaves no row so the next pass retries it. The completion stamp is
    /// only written when the scan reached the end.
    ///
    /// # Errors
    /// Only ledger lookups and metadata writes are fatal.
    pub fn update_ledger(
        &self,
        conn: &mut SqliteConnection,
        root: &Path,
        keep_going: bool,
    ) -> Result<IngestStats> {
        db_util::set_var(conn, db_util::VAR_INGEST_START, &Utc::now().to_rfc3339())?;
        let mut stats = IngestStats::default();

        for archive in scan_archives(root) {
            stats.seen += 1;
            if db_util::get_submission_by_path(conn, &archive.relative)?.is_some() {
                stats.skipped += 1;
                continue;
            }
            match self.ingest_archive(conn, &archive) {
                Ok(record) => {
                    info!("added {} as {}", archive.relative, record.submission_id);
                    stats.added += 1;
                }
                Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Rejected { .. })) => {
                    warn!("{e:#}");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!("failed to process {}: {e:#}", archive.full.display());
                    stats.failed += 1;
                    if !keep_going {
                        warn!("stopping ingestion at {}", archive.relative);
                        stats.stopped = true;
                        break;
                    }
                }
            }
        }

        if !stats.stopped {
            db_util::set_var(conn, db_util::VAR_INGEST_COMPLETE, &Utc::now().to_rfc3339())?;
        }
        info!(
            "ingest: {} archives, {} already known, {} added, {} failed",
            stats.seen, stats.skipped, stats.added, stats.failed
        );
        Ok(stats)
    }

    /// Read, score and record one archive. The caller has already checked the ledger.
    pub fn ingest_archive(
        &self,
        conn: &mut SqliteConnection,
        archive: &ArchivePath,
    ) -> Result<SubmissionRecord> {
        let new = self.read_submission(archive)?;
        debug!(
            "{} {} kmpp={:?} spread={:?} from {}",
            new.config,
            new.unixtime,
            new.score.map(|s| s.kmpp),
            new.score.map(|s| s.spread),
            new.path
        );
        db_util::insert_submission(conn, new)
    }

    /// Turn an archive into a ledger row without touching the ledger.
    ///
    /// # Errors
    /// [`Error::Rejected`] when the archive's contents cannot make a row; anything else
    /// means the archive could not be read at all.
    pub fn read_submission(&self, archive: &ArchivePath) -> Result<NewSubmission> {
        let rejected = |reason: String| Error::Rejected {
            path: archive.full.clone(),
            reason,
        };
        let unixtime = modified_unixtime(&archive.full)?;
        let mut members = extract_members(&archive.full, &[MEMBER_VARS, MEMBER_SOLUTION])?;
        let vars_raw = members
            .remove(MEMBER_VARS)
            .ok_or_else(|| rejected(format!("no \"{MEMBER_VARS}\" member")))?;
        let vars = String::from_utf8_lossy(&vars_raw).into_owned();
        let config = self
            .config_for_vars(&vars)
            .ok_or_else(|| rejected(format!("no config in {vars:?}")))?;

        let score = match members.get(MEMBER_SOLUTION) {
            Some(solution) => {
                let configuration = self
                    .configs
                    .get(&config)
                    .ok_or_else(|| rejected(Error::UnknownConfig(config.clone()).to_string()))?;
                let score = self
                    .measure
                    .measure(solution, configuration)
                    .map_err(|e| rejected(format!("failed to analyze solution: {e}")))?;
                Some(score)
            }
            None => None,
        };

        Ok(NewSubmission {
            vars,
            unixtime,
            score,
            path: archive.relative.clone(),
            config,
        })
    }

    /// The configuration a submission's variables name, either directly or through the
    /// client's local path.
    pub fn config_for_vars(&self, vars: &str) -> Option<String> {
        let first = |key: &str| {
            form_urlencoded::parse(vars.as_bytes())
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.into_owned())
        };

        if let Some(config) = first("config") {
            return Some(config);
        }
        if first("localpath").is_some()
            && let Some(remote) = first("path")
        {
            debug!("remotepath={remote}");
            return self
                .configs
                .keys()
                .find(|name| remote.contains(name.as_str()))
                .cloned();
        }
        None
    }
}

fn modified_unixtime(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("could not stat {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified).timestamp())
}
