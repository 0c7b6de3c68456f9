//! Scheduled ingestion and publishing for bdistricting.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use bdist_common::best::get_best_configs;
use bdist_common::configuration::load_datadir_configurations;
use bdist_common::db_util;
use bdist_common::distribution::{compute_distribution, write_distribution_policy};
use bdist_common::failures::DumpBinLogTool;
use bdist_common::ingest::Ingestor;
use bdist_common::measure::AnalyzeTool;
use bdist_common::render::DrendTool;
use bdist_common::report::{ReportOptions, Reporter};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Data directory holding <xx>/config/<variant> files
    #[arg(long, default_value = "data", env = "BDIST_DATADIR")]
    datadir: PathBuf,

    /// Directory containing analyze, drend and dumpBinLog
    #[arg(long, default_value = "bin", env = "BDIST_BINDIR")]
    bindir: PathBuf,

    /// Directory to scan for submission archives
    #[arg(long, default_value = ".", env = "BDIST_SOLDIR")]
    soldir: PathBuf,

    /// Ledger database file
    #[arg(long, default_value = ".status.sqlite3", env = "DATABASE_URL")]
    database_url: String,

    /// Keep going after an archive cannot be read
    #[arg(short, long, env = "BDIST_KEEP_GOING")]
    keep_going: bool,

    /// Skip scanning for new archives
    #[arg(long, env = "BDIST_NO_UPDATE")]
    no_update: bool,

    /// Write a single-page summary report here
    #[arg(long, env = "BDIST_REPORT")]
    report: Option<PathBuf>,

    /// Build the published tree of best results here
    #[arg(long, env = "BDIST_OUTDIR")]
    outdir: Option<PathBuf>,

    /// Write the client distribution policy here
    #[arg(long, env = "BDIST_CONFIG_OVERRIDE")]
    config_override: Option<PathBuf>,

    /// Directory with page templates, report.css and google_analytics
    #[arg(long, env = "BDIST_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Prefix for links within the site
    #[arg(long, default_value = "/", env = "BDIST_ROOT_URL")]
    root_url: String,

    /// Prefix for absolute links shared off the site
    #[arg(long, default_value = "http://bdistricting.com/", env = "BDIST_SITE_URL")]
    site_url: String,

    /// Rebuild every artifact
    #[arg(long)]
    redraw: bool,

    /// Rebuild every index page
    #[arg(long)]
    rehtml: bool,

    /// Only build these configurations (repeatable)
    #[arg(long = "config")]
    configs: Vec<String>,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    // the ledger is the one thing we can't run without
    let mut conn = db_util::get_database_connection(&cli.database_url)
        .context("could not open the ledger")?;
    info!("ledger {} open", cli.database_url);

    let configs = load_datadir_configurations(&cli.datadir)?;
    info!("loaded {} configurations from {}", configs.len(), cli.datadir.display());

    if !cli.no_update {
        let analyze = AnalyzeTool::new(&cli.bindir)?;
        let stats = Ingestor::new(&configs, &analyze).update_ledger(&mut conn, &cli.soldir, cli.keep_going)?;
        if stats.stopped {
            warn!("ingestion stopped early; use --keep-going to skip unreadable archives");
        }
    }

    if cli.report.is_none() && cli.outdir.is_none() && cli.config_override.is_none() {
        return Ok(());
    }
    let summaries = get_best_configs(&mut conn, &configs)?;

    if let Some(path) = &cli.config_override {
        let entries = compute_distribution(&mut conn, &summaries)?;
        write_distribution_policy(path, &entries)?;
        info!("wrote distribution policy to {}", path.display());
    }

    let options = ReportOptions {
        outdir: cli.outdir.clone().unwrap_or_default(),
        soldir: cli.soldir.clone(),
        templates: cli.templates.clone(),
        root_url: cli.root_url.clone(),
        site_url: cli.site_url.clone(),
        redraw: cli.redraw,
        rehtml: cli.rehtml,
        config_filter: cli.configs.clone(),
    };
    let render = DrendTool::new(&cli.bindir);
    let dump = DumpBinLogTool::new(&cli.bindir);
    let reporter = Reporter::new(&options, &configs, &render, &dump)?;

    if let Some(path) = &cli.report {
        reporter.write_summary_report(path, &summaries)?;
        info!("wrote summary report to {}", path.display());
    }

    if let Some(outdir) = &cli.outdir {
        reporter.build_tree(&mut conn, &summaries)?;
        info!("published best results under {}", outdir.display());
    }

    Ok(())
}
