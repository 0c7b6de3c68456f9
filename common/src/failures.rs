//! Diagnostics for configurations that have submissions but no usable solution.
//!
//! Clients that never produced a solution still upload their run log. Dumping those logs
//! gives (spread, kmpp) points showing how close the runs came.

use crate::archive::extract_members;
use crate::publish::write_atomic;
use crate::scan::archive_location;
use crate::tool::run_with_stdin;
use crate::{Error, MEMBER_BINLOG, db_util};
use anyhow::Result;
use diesel::sqlite::SqliteConnection;
use log::{debug, info, warn};
use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Points sampled from each run log.
pub const SAMPLES_PER_LOG: usize = 10;
/// Logs with more points than this only contribute their latter half.
const KEEP_LATTER_HALF_OVER: usize = 20;

/// Turns a binary run log into text.
pub trait BinlogDump {
    fn dump(&self, binlog: &[u8]) -> Result<String, Error>;
}

/// Runs `<bindir>/dumpBinLog` with the log on stdin.
pub struct DumpBinLogTool {
    dump_bin_log: PathBuf,
}

impl DumpBinLogTool {
    pub fn new(bindir: &Path) -> Self {
        Self {
            dump_bin_log: bindir.join("dumpBinLog"),
        }
    }
}

impl BinlogDump for DumpBinLogTool {
    fn dump(&self, binlog: &[u8]) -> Result<String, Error> {
        let stdout = run_with_stdin(&mut Command::new(&self.dump_bin_log), binlog)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePoint {
    pub spread: i64,
    pub kmpp: f64,
}

pub struct FailureAnalyzer<'a> {
    dump: &'a dyn BinlogDump,
    point_re: Regex,
}

impl<'a> FailureAnalyzer<'a> {
    pub fn new(dump: &'a dyn BinlogDump) -> Result<Self> {
        Ok(Self {
            dump,
            point_re: Regex::new(r"kmpp=([.0-9]+).*minPop=([0-9]+).*maxPop=([0-9]+)")?,
        })
    }

    /// Every point in a dumped log, in log order.
    pub fn parse_points(&self, dumped: &str) -> Vec<FailurePoint> {
        dumped
            .lines()
            .filter_map(|line| {
                let caps = self.point_re.captures(line)?;
                let kmpp = caps[1].parse::<f64>().ok()?;
                let min_pop = caps[2].parse::<i64>().ok()?;
                let max_pop = caps[3].parse::<i64>().ok()?;
                Some(FailurePoint {
                    spread: max_pop - min_pop,
                    kmpp,
                })
            })
            .collect()
    }

    /// Sample the unscored submissions of `config` and write them to `out`.
    /// Returns how many points were written.
    pub fn analyze_config<R: Rng + ?Sized>(
        &self,
        conn: &mut SqliteConnection,
        soldir: &Path,
        config: &str,
        out: &Path,
        rng: &mut R,
    ) -> Result<usize> {
        let mut samples = Vec::new();
        let mut best_spread = Vec::new();

        for record in db_util::get_unscored_submissions_for_config(conn, config)? {
            let archive = archive_location(soldir, &record.path);
            let points = match self.points_for_archive(&archive) {
                Ok(Some(points)) => points,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{config}: could not read run log from {}: {e:#}", archive.display());
                    continue;
                }
            };
            info!("processing {config} binlog from {}", archive.display());
            if let Some(best) = points.iter().min_by_key(|p| p.spread) {
                best_spread.push(*best);
            }
            if let Some(sampled) = sample_points(&points, rng) {
                samples.extend(sampled);
            }
        }

        info!("writing {}", out.display());
        write_atomic(out, render_failures_csv(&samples, &best_spread).as_bytes())?;
        Ok(samples.len() + best_spread.len())
    }

    fn points_for_archive(&self, archive: &Path) -> Result<Option<Vec<FailurePoint>>> {
        let mut members = extract_members(archive, &[MEMBER_BINLOG])?;
        let Some(binlog) = members.remove(MEMBER_BINLOG) else {
            debug!("no binlog in {}", archive.display());
            return Ok(None);
        };
        let dumped = self.dump.dump(&binlog)?;
        Ok(Some(self.parse_points(&dumped)))
    }
}

/// Pick [`SAMPLES_PER_LOG`] points from one log, favouring the later part of long runs.
/// Logs too short to sample give `None`.
pub fn sample_points<R: Rng + ?Sized>(points: &[FailurePoint], rng: &mut R) -> Option<Vec<FailurePoint>> {
    let pool = if points.len() > KEEP_LATTER_HALF_OVER {
        &points[points.len() / 2..]
    } else if points.len() < SAMPLES_PER_LOG {
        return None;
    } else {
        points
    };
    Some(pool.choose_multiple(rng, SAMPLES_PER_LOG).copied().collect())
}

pub fn render_failures_csv(samples: &[FailurePoint], best_spread: &[FailurePoint]) -> String {
    let mut out = String::from("kind,spread,kmpp\n");
    let rows = samples
        .iter()
        .map(|p| ("sample", p))
        .chain(best_spread.iter().map(|p| ("best_spread", p)));
    for (kind, point) in rows {
        let _ = writeln!(out, "{kind},{},{}", point.spread, point.kmpp);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_archive;
    use crate::{NewSubmission, Score};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use tempfile::TempDir;

    /// Treats the run log as already dumped text.
    struct PassThrough;

    impl BinlogDump for PassThrough {
        fn dump(&self, binlog: &[u8]) -> Result<String, Error> {
            Ok(String::from_utf8_lossy(binlog).into_owned())
        }
    }

    fn log_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("gen {i} kmpp={}.5 std=1 minPop={} maxPop=1000\n", 30 - i % 10, 900 + i))
            .collect()
    }

    fn points(n: usize) -> Vec<FailurePoint> {
        (0..n)
            .map(|i| FailurePoint {
                spread: i64::try_from(i).unwrap(),
                kmpp: 1.0,
            })
            .collect()
    }

    #[test_log::test]
    fn test_parse_points() {
        let dump = PassThrough;
        let analyzer = FailureAnalyzer::new(&dump).unwrap();

        let parsed = analyzer.parse_points("header\ngen 1 kmpp=21.25 minPop=100 maxPop=130\nkmpp=x\n");

        assert_eq!(
            parsed,
            vec![FailurePoint {
                spread: 30,
                kmpp: 21.25
            }]
        );
    }

    #[test_log::test]
    fn test_sample_points() {
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(sample_points(&points(9), &mut rng), None);

        let mut ten = sample_points(&points(10), &mut rng).unwrap();
        ten.sort_by_key(|p| p.spread);
        assert_eq!(ten, points(10));

        let long = sample_points(&points(40), &mut rng).unwrap();
        assert_eq!(long.len(), SAMPLES_PER_LOG);
        assert!(long.iter().all(|p| p.spread >= 20));
    }

    #[test_log::test]
    fn test_analyze_config_writes_csv() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir.path().join("long.tar.gz"), &[("vars", "config=B_X"), ("binlog", log_lines(30).as_str())]);
        write_archive(&dir.path().join("short.tar.gz"), &[("vars", "config=B_X"), ("binlog", log_lines(3).as_str())]);
        write_archive(&dir.path().join("none.tar.gz"), &[("vars", "config=B_X")]);
        let mut conn = db_util::get_database_connection(":memory:").unwrap();
        for (path, score) in [
            ("long.tar.gz", None),
            ("short.tar.gz", None),
            ("none.tar.gz", None),
            ("missing.tar.gz", None),
            ("scored.tar.gz", Some(Score { kmpp: 1.0, spread: 1 })),
        ] {
            db_util::insert_submission(
                &mut conn,
                NewSubmission {
                    vars: String::new(),
                    unixtime: 0,
                    score,
                    path: path.to_string(),
                    config: "B_X".to_string(),
                },
            )
            .unwrap();
        }
        let dump = PassThrough;
        let analyzer = FailureAnalyzer::new(&dump).unwrap();
        let out = dir.path().join("report/B_X/failures.csv");

        let written = analyzer
            .analyze_config(&mut conn, dir.path(), "B_X", &out, &mut StdRng::seed_from_u64(1))
            .unwrap();

        // ten samples from the long log, one lowest-spread point from each log
        assert_eq!(written, 12);
        let csv = fs::read_to_string(&out).unwrap();
        assert!(csv.starts_with("kind,spread,kmpp\n"));
        assert_eq!(csv.lines().filter(|l| l.starts_with("sample,")).count(), 10);
        assert_eq!(csv.lines().filter(|l| l.starts_with("best_spread,")).count(), 2);
        assert!(csv.contains("best_spread,71,21.5\n"));
    }
}
