//! Tell the work dispatcher which configurations need more attention.
//!
//! Configurations with no scored result get the most work. Scored ones are weighted by
//! how few submissions they have, and once ten good results exist clients only send
//! results that beat the tenth best.

use crate::best::ConfigSummary;
use crate::publish::write_atomic;
use crate::{DistributionEntry, MAX_WEIGHT, SEND_THRESHOLD_RANK, db_util};
use anyhow::{Context, Result};
use diesel::sqlite::SqliteConnection;
use itertools::{Itertools, MinMaxResult};
use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Weight for a configuration with `count` submissions when counts range over
/// `[min_count, max_count]`: `MAX_WEIGHT` at the minimum falling linearly to 1 at the
/// maximum. When every count is the same, the midpoint.
#[allow(clippy::cast_precision_loss)]
pub fn count_weight(count: u64, min_count: u64, max_count: u64) -> f64 {
    if max_count <= min_count {
        return (MAX_WEIGHT + 1.0) / 2.0;
    }
    let above_min = count.saturating_sub(min_count) as f64;
    let range = (max_count - min_count) as f64;
    MAX_WEIGHT - (MAX_WEIGHT - 1.0) * above_min / range
}

/// Policy entries for every summarized configuration, in the same order.
pub fn compute_distribution(
    conn: &mut SqliteConnection,
    summaries: &[ConfigSummary],
) -> Result<Vec<DistributionEntry>> {
    let (min_count, max_count) = match summaries
        .iter()
        .map(|s| s.count)
        .filter(|&c| c > 0)
        .minmax()
    {
        MinMaxResult::NoElements => (0, 0),
        MinMaxResult::OneElement(c) => (c, c),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let total: u64 = summaries.iter().map(|s| s.count).sum();
    debug!("{total} submissions, {min_count}..={max_count} per configuration");

    let mut entries = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let (send_anything, weight) = if summary.best.is_some() {
            (false, count_weight(summary.count, min_count, max_count))
        } else {
            (true, MAX_WEIGHT)
        };

        let mut kmpp_send_threshold = None;
        if summary.count >= SEND_THRESHOLD_RANK as u64 {
            let top = db_util::get_top_scores_for_config(conn, &summary.config, SEND_THRESHOLD_RANK, true)?;
            if top.len() == SEND_THRESHOLD_RANK {
                kmpp_send_threshold = top.last().copied();
            } else {
                warn!(
                    "{} count={} but fetched {} scores",
                    summary.config,
                    summary.count,
                    top.len()
                );
            }
        }

        entries.push(DistributionEntry {
            config: summary.config.clone(),
            send_anything,
            weight,
            kmpp_send_threshold,
        });
    }
    Ok(entries)
}

/// The policy file text: each entry's directives, then `manual` with `#` lines dropped.
pub fn render_distribution_policy(entries: &[DistributionEntry], manual: Option<&str>) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{}:sendAnything:{}", entry.config, entry.send_anything);
        let _ = writeln!(out, "{}:weight:{:.6}", entry.config, entry.weight);
        if let Some(threshold) = entry.kmpp_send_threshold {
            let _ = writeln!(out, "{}:kmppSendThreshold:{threshold:.6}", entry.config);
        }
    }
    for line in manual.into_iter().flat_map(str::lines) {
        if line.starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Hand-written directives live beside the generated file with a `_manual` suffix.
pub fn manual_override_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("_manual");
    PathBuf::from(name)
}

/// Write the policy for `entries` to `path`, appending `<path>_manual` if it exists.
pub fn write_distribution_policy(path: &Path, entries: &[DistributionEntry]) -> Result<()> {
    let manual_path = manual_override_path(path);
    let manual = match fs::read_to_string(&manual_path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("could not read {}", manual_path.display()));
        }
    };
    write_atomic(path, render_distribution_policy(entries, manual.as_deref()).as_bytes())
}
