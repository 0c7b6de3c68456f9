//! Draw maps and derived exports with the external `drend`, `convert` and `analyze` tools.

use crate::tool::{run, run_with_stdin};
use crate::{Configuration, Error};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use zip::ZipArchive;

/// Where `drend` gets the solution from.
#[derive(Debug, Clone, Copy)]
pub enum SolutionSource<'a> {
    /// A solution file already on disk.
    Path(&'a Path),
    /// Raw solution bytes, streamed on stdin.
    Bytes(&'a [u8]),
}

/// Everything the report needs drawn or exported. Outputs are written to exactly the
/// paths given; callers decide where those live.
pub trait Render {
    /// Draw the district map for a solution as a PNG.
    fn render_map(
        &self,
        config: &Configuration,
        png: &Path,
        solution: SolutionSource<'_>,
    ) -> Result<(), Error>;

    /// Shrink a map to fit 500x500.
    fn resize(&self, png: &Path, thumbnail: &Path) -> Result<(), Error>;

    /// Write the per-district demographic breakdown as an HTML fragment plus a gzipped CSV export.
    fn export(
        &self,
        config: &Configuration,
        solution: &Path,
        race_html: &Path,
        csv_gz: &Path,
    ) -> Result<(), Error>;
}

const COMPARE_COLUMNS: &str = ":5,7,8,9,10,11,12,13";
const COMPARE_LABELS: &str = "total,white,black,native,asian,pacific,other,mixed";

/// Runs the real tools from a bin directory.
pub struct DrendTool {
    drend: PathBuf,
    analyze: PathBuf,
    convert: PathBuf,
}

impl DrendTool {
    pub fn new(bindir: &Path) -> Self {
        Self {
            drend: bindir.join("drend"),
            analyze: bindir.join("analyze"),
            convert: PathBuf::from("convert"),
        }
    }

    fn map_command(&self, config: &Configuration, png: &Path, solution: SolutionSource<'_>) -> Command {
        let mut command = Command::new(&self.drend);
        command.args(&config.render_args).arg("--pngout").arg(png).arg("--loadSolution");
        match solution {
            SolutionSource::Path(path) => command.arg(path),
            SolutionSource::Bytes(_) => command.arg("-"),
        };
        command
    }

    fn resize_command(&self, png: &Path, thumbnail: &Path) -> Command {
        let mut command = Command::new(&self.convert);
        command.arg(png).arg("-resize").arg("500x500").arg(thumbnail);
        command
    }

    fn export_command(
        &self,
        config: &Configuration,
        solution: &Path,
        race_html: &Path,
        csv_gz: &Path,
    ) -> Command {
        let mut command = Command::new(&self.analyze);
        command
            .args(["--compare", COMPARE_COLUMNS])
            .args(["--labels", COMPARE_LABELS])
            .args(["--dsort", "1", "--notext"])
            .arg("--html")
            .arg(race_html)
            .arg("-P")
            .arg(&config.config_input)
            .arg("-d")
            .arg(config.district_count.to_string())
            .arg("--loadSolution")
            .arg(solution)
            .arg("--export")
            .arg(csv_gz);
        command
    }
}

/// Location of the region's 2010 census part 1 zip and the member inside it.
pub fn census_part1(config: &Configuration) -> (PathBuf, String) {
    let region = config.region().to_lowercase();
    (
        config.data_dir.join("zips").join(format!("{region}2010.pl.zip")),
        format!("{region}000012010.pl"),
    )
}

fn read_census_part1(config: &Configuration) -> Result<Vec<u8>, Error> {
    let (zip_path, member) = census_part1(config);
    if !zip_path.exists() {
        return Err(Error::MissingInput(zip_path));
    }
    let extraction_error = |source| Error::Extraction {
        path: zip_path.clone(),
        source,
    };
    let file = File::open(&zip_path).map_err(extraction_error)?;
    let mut zip = ZipArchive::new(file).map_err(|e| extraction_error(std::io::Error::other(e)))?;
    let mut entry = zip
        .by_name(&member)
        .map_err(|e| extraction_error(std::io::Error::other(e)))?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data).map_err(extraction_error)?;
    Ok(data)
}

impl Render for DrendTool {
    fn render_map(
        &self,
        config: &Configuration,
        png: &Path,
        solution: SolutionSource<'_>,
    ) -> Result<(), Error> {
        let mut command = self.map_command(config, png, solution);
        match solution {
            SolutionSource::Path(path) if !path.exists() => {
                Err(Error::MissingInput(path.to_path_buf()))
            }
            SolutionSource::Path(_) => run(&mut command),
            SolutionSource::Bytes(bytes) => run_with_stdin(&mut command, bytes).map(|_| ()),
        }
    }

    fn resize(&self, png: &Path, thumbnail: &Path) -> Result<(), Error> {
        if !png.exists() {
            return Err(Error::MissingInput(png.to_path_buf()));
        }
        run(&mut self.resize_command(png, thumbnail))
    }

    fn export(
        &self,
        config: &Configuration,
        solution: &Path,
        race_html: &Path,
        csv_gz: &Path,
    ) -> Result<(), Error> {
        if !solution.exists() {
            return Err(Error::MissingInput(solution.to_path_buf()));
        }
        let census = read_census_part1(config)?;
        let mut command = self.export_command(config, solution, race_html, csv_gz);
        run_with_stdin(&mut command, &census).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::describe;
    use tempfile::TempDir;

    fn config(data_dir: &Path) -> Configuration {
        Configuration {
            name: "MA_Congress".to_string(),
            data_dir: data_dir.to_path_buf(),
            config_input: PathBuf::from("data/MA/ma.pb"),
            district_count: 9,
            render_args: vec!["--mppb".to_string(), "data/MA/ma.mppb".to_string()],
            data_root: PathBuf::from("data"),
        }
    }

    #[test_log::test]
    fn test_map_command() {
        let tool = DrendTool::new(Path::new("bin"));
        let config = config(Path::new("data/MA"));

        let from_file = tool.map_command(&config, Path::new("out.png"), SolutionSource::Path(Path::new("s.dsz")));
        assert_eq!(
            describe(&from_file),
            "bin/drend --mppb data/MA/ma.mppb --pngout out.png --loadSolution s.dsz"
        );

        let from_bytes = tool.map_command(&config, Path::new("out.png"), SolutionSource::Bytes(b"x"));
        assert!(describe(&from_bytes).ends_with("--loadSolution -"));
    }

    #[test_log::test]
    fn test_resize_command() {
        let tool = DrendTool::new(Path::new("bin"));
        let command = tool.resize_command(Path::new("map.png"), Path::new("map500.png"));
        assert_eq!(describe(&command), "convert map.png -resize 500x500 map500.png");
    }

    #[test_log::test]
    fn test_export_command() {
        let tool = DrendTool::new(Path::new("bin"));
        let command = tool.export_command(
            &config(Path::new("data/MA")),
            Path::new("solution.dsz"),
            Path::new("race.html"),
            Path::new("solution.csv.gz"),
        );
        assert_eq!(
            describe(&command),
            "bin/analyze --compare :5,7,8,9,10,11,12,13 \
             --labels total,white,black,native,asian,pacific,other,mixed \
             --dsort 1 --notext --html race.html -P data/MA/ma.pb -d 9 \
             --loadSolution solution.dsz --export solution.csv.gz"
        );
    }

    #[test_log::test]
    fn test_census_part1_location() {
        let (zip_path, member) = census_part1(&config(Path::new("data/MA")));
        assert_eq!(zip_path, PathBuf::from("data/MA/zips/ma2010.pl.zip"));
        assert_eq!(member, "ma000012010.pl");
    }

    #[test_log::test]
    fn test_read_census_part1() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        assert!(matches!(read_census_part1(&config), Err(Error::MissingInput(_))));

        std::fs::create_dir_all(dir.path().join("zips")).unwrap();
        let file = File::create(dir.path().join("zips/ma2010.pl.zip")).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("ma000012010.pl", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut writer, b"MA,1,2,3\n").unwrap();
        writer.finish().unwrap();

        assert_eq!(read_census_part1(&config).unwrap(), b"MA,1,2,3\n");
    }

    #[test_log::test]
    fn test_missing_inputs_are_reported_before_running() {
        let dir = TempDir::new().unwrap();
        let tool = DrendTool::new(Path::new("/nonexistent"));
        let config = config(dir.path());
        let gone = dir.path().join("gone");

        let map = tool.render_map(&config, &dir.path().join("m.png"), SolutionSource::Path(&gone));
        assert!(matches!(map, Err(Error::MissingInput(_))));
        assert!(matches!(tool.resize(&gone, &dir.path().join("t.png")), Err(Error::MissingInput(_))));
        let export = tool.export(&config, &gone, &dir.path().join("r.html"), &dir.path().join("c.csv.gz"));
        assert!(matches!(export, Err(Error::MissingInput(_))));
    }
}
