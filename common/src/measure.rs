//! Score a solution with the external `analyze` tool.

use crate::tool::run_with_stdin;
use crate::{Configuration, Error, Score};
use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Anything that can turn a solution payload into a score.
pub trait Measure {
    /// Score `solution` against `config`.
    ///
    /// # Errors
    /// Fails if the scorer cannot run, exits nonzero, or reports something unparseable.
    fn measure(&self, solution: &[u8], config: &Configuration) -> Result<Score, Error>;
}

/// Runs `<bindir>/analyze` with the solution on stdin.
pub struct AnalyzeTool {
    analyze: PathBuf,
    kmpp_re: Regex,
    max_min_re: Regex,
}

impl AnalyzeTool {
    pub fn new(bindir: &Path) -> Result<Self> {
        Ok(Self {
            analyze: bindir.join("analyze"),
            kmpp_re: Regex::new(r"([0-9.]+)\s+Km/person")?,
            max_min_re: Regex::new(r"max=([0-9]+).*min=([0-9]+)")?,
        })
    }

    /// The analyze binary this tool runs.
    pub fn binary(&self) -> &Path {
        &self.analyze
    }

    fn command(&self, config: &Configuration) -> Command {
        let mut command = Command::new(&self.analyze);
        command
            .arg("-P")
            .arg(&config.config_input)
            .arg("-d")
            .arg(config.district_count.to_string())
            .arg("--loadSolution")
            .arg("-");
        command
    }

    /// Pull the kmpp and population spread out of analyze's text output.
    ///
    /// # Errors
    /// Returns [`Error::MissingMarker`] naming whichever marker is absent.
    pub fn parse_output(&self, output: &str) -> Result<Score, Error> {
        let missing = |marker| Error::MissingMarker {
            marker,
            output: output.to_string(),
        };

        let kmpp = self
            .kmpp_re
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .ok_or_else(|| missing("kmpp"))?;

        let (max, min) = self
            .max_min_re
            .captures(output)
            .and_then(|c| Some((c[1].parse::<i64>().ok()?, c[2].parse::<i64>().ok()?)))
            .ok_or_else(|| missing("max/min"))?;

        Ok(Score {
            kmpp,
            spread: max - min,
        })
    }
}

impl Measure for AnalyzeTool {
    fn measure(&self, solution: &[u8], config: &Configuration) -> Result<Score, Error> {
        let stdout = run_with_stdin(&mut self.command(config), solution)?;
        self.parse_output(&String::from_utf8_lossy(&stdout))
    }
}
