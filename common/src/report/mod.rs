//! Build the published tree of best results.
//!
//! ```text
//! <outdir>/index.html
//! <outdir>/report.css
//! <outdir>/<REGION>/index.html
//! <outdir>/<config>/<id>/{index.html,map.png,map500.png,solution.dsz,solution.csv.gz,solution.zip,race.html}
//! <outdir>/<config>/{index.html,map.png,...}    current best, linked from <id>/
//! <outdir>/<config>/failures.csv                when nothing has scored
//! ```
//!
//! Every artifact is rebuilt only when it is missing or older than what it is made from,
//! and tool output is staged and renamed into place so readers never see partial files.

mod package;
pub mod pages;

pub use package::package_csv_zip;
pub use pages::Pages;

use crate::archive::extract_members;
use crate::best::ConfigSummary;
use crate::failures::{BinlogDump, FailureAnalyzer};
use crate::publish::{Staged, publish, write_atomic};
use crate::render::{Render, SolutionSource};
use crate::scan::archive_location;
use crate::staleness::needs_update;
use crate::{Configuration, Configurations, MEMBER_SOLUTION, SubmissionRecord, db_util, split_config_name};
use anyhow::{Context, Result, anyhow};
use chrono::Local;
use diesel::sqlite::SqliteConnection;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Files mirrored from `<config>/<id>/` to `<config>/` for the current best.
pub const PUBLISHED_ARTIFACTS: [&str; 6] = [
    "map.png",
    "map500.png",
    "index.html",
    "solution.dsz",
    "solution.csv.gz",
    "solution.zip",
];

pub const FAILURES_CSV: &str = "failures.csv";
const EXTRA_HTML: &str = "extra.html";

/// Knobs for building the published tree.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub outdir: PathBuf,
    /// Root the ledger's archive paths are relative to.
    pub soldir: PathBuf,
    pub templates: Option<PathBuf>,
    pub root_url: String,
    pub site_url: String,
    /// Rebuild every artifact.
    pub redraw: bool,
    /// Rebuild index pages.
    pub rehtml: bool,
    /// Only build configuration directories for these names. Empty means all.
    pub config_filter: Vec<String>,
}

/// What happened to one configuration's directory.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOutcome {
    /// Not in the configuration filter.
    Filtered,
    /// No submissions at all.
    Empty,
    /// The best submission's artifacts were built and published.
    Published { submission_id: u64 },
    /// No usable solution; failure points were written instead.
    FailureAnalysis { points: usize },
    /// No usable solution, and `failures.csv` is newer than every unscored archive.
    FailuresCurrent,
}

/// Paths of everything built for one submission.
struct SubmissionDir {
    dir: PathBuf,
    dsz: PathBuf,
    race: PathBuf,
    csv_gz: PathBuf,
    zip: PathBuf,
    map: PathBuf,
    map500: PathBuf,
    index: PathBuf,
}

impl SubmissionDir {
    fn new(dir: PathBuf) -> Self {
        Self {
            dsz: dir.join("solution.dsz"),
            race: dir.join("race.html"),
            csv_gz: dir.join("solution.csv.gz"),
            zip: dir.join("solution.zip"),
            map: dir.join("map.png"),
            map500: dir.join("map500.png"),
            index: dir.join("index.html"),
            dir,
        }
    }
}

fn read_optional_html(path: &Path) -> Option<String> {
    path.is_file().then(|| fs::read_to_string(path).ok()).flatten()
}

/// Log an artifact that could not be built. It stays stale and is retried next run.
fn artifact_result(config: &str, artifact: &Path, result: Result<()>) {
    if let Err(e) = result {
        error!("{config}: could not build {}: {e:#}", artifact.display());
    }
}

pub struct Reporter<'a> {
    options: &'a ReportOptions,
    configs: &'a Configurations,
    render: &'a dyn Render,
    failures: FailureAnalyzer<'a>,
    pages: Pages,
}

impl<'a> Reporter<'a> {
    pub fn new(
        options: &'a ReportOptions,
        configs: &'a Configurations,
        render: &'a dyn Render,
        dump: &'a dyn BinlogDump,
    ) -> Result<Self> {
        Ok(Self {
            options,
            configs,
            render,
            failures: FailureAnalyzer::new(dump)?,
            pages: Pages::new(options.templates.clone(), &options.root_url, &options.site_url),
        })
    }

    /// Build the whole tree. A configuration that fails is logged and left for the next
    /// run; the others still get built.
    pub fn build_tree(&self, conn: &mut SqliteConnection, summaries: &[ConfigSummary]) -> Result<()> {
        let outdir = &self.options.outdir;
        fs::create_dir_all(outdir).with_context(|| format!("could not create {}", outdir.display()))?;

        let mut regions = BTreeSet::new();
        for summary in summaries {
            match self.build_config_dir(conn, summary, summaries) {
                Ok(outcome) => debug!("{}: {outcome:?}", summary.config),
                Err(e) => error!("{}: {e:#}", summary.config),
            }
            if summary.best.is_some() {
                regions.insert(split_config_name(&summary.config).0);
            }
        }

        for region in regions {
            if let Err(e) = self.write_region_page(region, summaries) {
                error!("{region}: {e:#}");
            }
        }

        let index = outdir.join("index.html");
        write_atomic(&index, self.pages.site_index(summaries, &generated_time()).as_bytes())?;
        debug!("wrote {}", index.display());

        if let Some(css) = self.pages.stylesheet() {
            let dest = outdir.join(pages::STYLESHEET);
            if needs_update(&dest, &[&css], false) {
                debug!("{} -> {}", css.display(), dest.display());
                write_atomic(&dest, &fs::read(&css)?)?;
            }
        }
        Ok(())
    }

    /// Build `<outdir>/<config>/` for one configuration.
    pub fn build_config_dir(
        &self,
        conn: &mut SqliteConnection,
        summary: &ConfigSummary,
        summaries: &[ConfigSummary],
    ) -> Result<ConfigOutcome> {
        let filter = &self.options.config_filter;
        if !filter.is_empty() && !filter.contains(&summary.config) {
            debug!("skipping {}, not in the configuration filter", summary.config);
            return Ok(ConfigOutcome::Filtered);
        }
        if summary.count == 0 {
            return Ok(ConfigOutcome::Empty);
        }
        let Some(best) = &summary.best else {
            warn!("no solution for {}", summary.config);
            return self.analyze_failures(conn, &summary.config);
        };
        let config = self
            .configs
            .get(&summary.config)
            .ok_or_else(|| anyhow!("configuration {} is not loaded", summary.config))?;

        let sdir = SubmissionDir::new(
            self.options
                .outdir
                .join(&summary.config)
                .join(best.submission_id.to_string()),
        );
        fs::create_dir_all(&sdir.dir)
            .with_context(|| format!("could not create {}", sdir.dir.display()))?;
        debug!("{} -> {}", summary.config, sdir.dir.display());

        if !self.write_solution(best, &sdir)? {
            error!("no solution in best submission {} for {}", best.path, summary.config);
            return self.analyze_failures(conn, &summary.config);
        }
        self.build_artifacts(config, &sdir);
        self.write_config_page(best, summaries, &sdir);

        let config_dir = self.options.outdir.join(&summary.config);
        for name in PUBLISHED_ARTIFACTS {
            publish(&sdir.dir.join(name), &config_dir.join(name))?;
        }
        Ok(ConfigOutcome::Published {
            submission_id: best.submission_id,
        })
    }

    /// Make sure `solution.dsz` is current. Returns false if the archive has no solution.
    fn write_solution(&self, best: &SubmissionRecord, sdir: &SubmissionDir) -> Result<bool> {
        let archive = archive_location(&self.options.soldir, &best.path);
        if !needs_update(&sdir.dsz, &[&archive], self.options.redraw) {
            return Ok(true);
        }
        let mut members = extract_members(&archive, &[MEMBER_SOLUTION])?;
        let Some(solution) = members.remove(MEMBER_SOLUTION) else {
            return Ok(false);
        };
        debug!("write {}", sdir.dsz.display());
        write_atomic(&sdir.dsz, &solution)?;
        Ok(true)
    }

    /// Export, zip, map and thumbnail, each rebuilt on its own schedule.
    fn build_artifacts(&self, config: &Configuration, sdir: &SubmissionDir) {
        let redraw = self.options.redraw;
        let name = config.name.as_str();

        if needs_update(&sdir.race, &[&sdir.dsz], redraw)
            || needs_update(&sdir.csv_gz, &[&sdir.dsz], redraw)
        {
            artifact_result(name, &sdir.csv_gz, self.export(config, sdir));
        }

        if sdir.csv_gz.exists() && needs_update(&sdir.zip, &[&sdir.csv_gz], redraw) {
            let entry = format!("{name}.csv");
            artifact_result(name, &sdir.zip, package_csv_zip(&sdir.csv_gz, &sdir.zip, &entry));
        }

        if needs_update(&sdir.map, &[&sdir.dsz], redraw) {
            let result = Staged::new(&sdir.map).and_then(|staged| {
                self.render
                    .render_map(config, staged.path(), SolutionSource::Path(&sdir.dsz))?;
                staged.commit()
            });
            artifact_result(name, &sdir.map, result);
        }

        if sdir.map.exists() && needs_update(&sdir.map500, &[&sdir.map], redraw) {
            let result = Staged::new(&sdir.map500).and_then(|staged| {
                self.render.resize(&sdir.map, staged.path())?;
                staged.commit()
            });
            artifact_result(name, &sdir.map500, result);
        }
    }

    fn export(&self, config: &Configuration, sdir: &SubmissionDir) -> Result<()> {
        let race = Staged::new(&sdir.race)?;
        let csv_gz = Staged::new(&sdir.csv_gz)?;
        self.render
            .export(config, &sdir.dsz, race.path(), csv_gz.path())?;
        race.commit()?;
        csv_gz.commit()
    }

    fn write_config_page(&self, best: &SubmissionRecord, summaries: &[ConfigSummary], sdir: &SubmissionDir) {
        let extra = self.options.outdir.join(&best.config).join(EXTRA_HTML);
        let force = self.options.redraw || self.options.rehtml;
        if !needs_update(&sdir.index, &[&sdir.dsz, &sdir.race, &extra], force) {
            return;
        }
        let page = self.pages.config_page(
            best,
            summaries,
            read_optional_html(&sdir.race).as_deref(),
            read_optional_html(&extra).as_deref(),
        );
        artifact_result(&best.config, &sdir.index, write_atomic(&sdir.index, page.as_bytes()));
    }

    fn write_region_page(&self, region: &str, summaries: &[ConfigSummary]) -> Result<()> {
        let dir = self.options.outdir.join(region);
        let extra = read_optional_html(&dir.join(EXTRA_HTML));
        let Some(page) = self.pages.region_page(region, summaries, extra.as_deref()) else {
            warn!("no active variations for {region}");
            return Ok(());
        };
        write_atomic(&dir.join("index.html"), page.as_bytes())
    }

    fn analyze_failures(&self, conn: &mut SqliteConnection, config: &str) -> Result<ConfigOutcome> {
        let out = self.options.outdir.join(config).join(FAILURES_CSV);
        let archives: Vec<PathBuf> = db_util::get_unscored_submissions_for_config(conn, config)?
            .iter()
            .map(|record| archive_location(&self.options.soldir, &record.path))
            .collect();
        if !needs_update(&out, &archives, self.options.redraw) {
            debug!("{config}: {} is current", out.display());
            return Ok(ConfigOutcome::FailuresCurrent);
        }
        let points = self
            .failures
            .analyze_config(conn, &self.options.soldir, config, &out, &mut rand::rng())?;
        info!("{config}: {points} failure points");
        Ok(ConfigOutcome::FailureAnalysis { points })
    }

    /// Write the flat operator report to `path`.
    pub fn write_summary_report(&self, path: &Path, summaries: &[ConfigSummary]) -> Result<()> {
        write_atomic(path, self.pages.summary_report(summaries, &generated_time()).as_bytes())
    }
}

fn generated_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()
}
