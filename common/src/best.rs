//! The best submission so far for every configuration.

use crate::db_util;
use crate::{Configurations, Error, SubmissionRecord};
use anyhow::Result;
use diesel::sqlite::SqliteConnection;
use log::warn;

/// Ledger view of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub config: String,
    /// Submissions recorded, scored or not.
    pub count: u64,
    /// Lowest-kmpp scored submission, if there is one.
    pub best: Option<SubmissionRecord>,
}

/// Summaries for every loaded configuration, in name order, including ones with no
/// submissions at all. Ledger rows for configurations that are not loaded are ignored.
pub fn get_best_configs(
    conn: &mut SqliteConnection,
    configs: &Configurations,
) -> Result<Vec<ConfigSummary>> {
    let counts = db_util::get_counts_by_config(conn)?;
    for name in counts.keys().filter(|name| !configs.contains_key(*name)) {
        warn!("ledger has submissions for {name}, which is not loaded");
    }

    let mut summaries = Vec::with_capacity(configs.len());
    for name in configs.keys() {
        let count = counts.get(name).copied().unwrap_or(0);
        let best = if count == 0 {
            None
        } else {
            match db_util::get_best_submission_for_config(conn, name) {
                Ok(record) => Some(record),
                Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::NotFound(_))) => None,
                Err(e) => return Err(e),
            }
        };
        summaries.push(ConfigSummary {
            config: name.clone(),
            count,
            best,
        });
    }
    Ok(summaries)
}

/// The scored configuration whose best submission arrived most recently.
pub fn newest_winner(summaries: &[ConfigSummary]) -> Option<&ConfigSummary> {
    summaries
        .iter()
        .filter_map(|s| s.best.as_ref().map(|best| (best.submission_id, s)))
        .max_by_key(|(id, _)| *id)
        .map(|(_, s)| s)
}
