//! Interfaces between the application code and the ledger database.
//!
//! The ledger is a single SQLite file with one writer per run. Every insert commits on
//! its own, so an archive that made it into the ledger before a crash is found by the
//! next run's lookup and never processed twice.

use crate::{Error, NewSubmission, SubmissionRecord};
use anyhow::{Result, anyhow};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeMap;

mod conversions;
mod meta;
mod submissions;

pub use meta::{get_var, set_var};
pub use submissions::{
    get_best_submission_for_config, get_counts_by_config, get_submission_by_path,
    get_top_scores_for_config, get_unscored_submissions_for_config, insert_submission,
};

/// Metadata key stamped when an ingestion run starts.
pub const VAR_INGEST_START: &str = "last_ingest_start";
/// Metadata key stamped when an ingestion run finishes.
pub const VAR_INGEST_COMPLETE: &str = "last_ingest_complete";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vars TEXT NOT NULL,
        unixtime INTEGER NOT NULL,
        kmpp REAL,
        spread INTEGER,
        path TEXT NOT NULL,
        config TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS submissions_path_unique ON submissions (path)",
    "CREATE INDEX IF NOT EXISTS submissions_config ON submissions (config)",
    "CREATE TABLE IF NOT EXISTS vars (name TEXT PRIMARY KEY, value TEXT)",
];

/// Open the ledger at `database_url`, creating tables and indexes if they are missing.
/// Use `:memory:` for a throwaway ledger.
///
/// # Errors
/// Returns an error if the database cannot be opened or the schema cannot be created.
pub fn get_database_connection(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| anyhow!("could not open ledger {database_url}: {e}"))?;
    ensure_schema(&mut conn)?;
    Ok(conn)
}

fn ensure_schema(conn: &mut SqliteConnection) -> Result<()> {
    for statement in SCHEMA {
        diesel::sql_query(*statement)
            .execute(conn)
            .map_err(|e| anyhow!("could not create ledger schema: {e}"))?;
    }
    Ok(())
}
