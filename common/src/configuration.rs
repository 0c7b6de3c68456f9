//! Discover configurations from the data directory convention.
//!
//! Every file `<datadir>/<xx>/config/<variant>` defines configuration `<XX>_<variant>`.
//! The file holds `<scope>:<args>` lines where scope is `common`, `solve` or `drend`.
//! `solve` (with `common`) must supply `-P <problem input>` and `-d <districts>`;
//! `common` followed by `drend` makes up the rendering arguments. `$DATA` expands to
//! the data root.

use crate::{Configuration, Configurations};
use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Editor droppings and hidden files that live next to real configuration files.
fn is_ignored_file(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('#') || name.ends_with('~')
}

/// Load every configuration under `datadir`, keyed and ordered by name.
/// Malformed configuration files are logged and skipped.
///
/// # Errors
/// Returns an error if `datadir` or one of its `config` directories cannot be listed.
pub fn load_datadir_configurations(datadir: &Path) -> Result<Configurations> {
    let mut configs = Configurations::new();
    let entries = fs::read_dir(datadir)
        .with_context(|| format!("could not list data dir {}", datadir.display()))?;

    for entry in entries {
        let region_dir = entry?.path();
        let Some(region) = region_dir.file_name().map(|n| n.to_string_lossy().to_uppercase())
        else {
            continue;
        };
        let config_dir = region_dir.join("config");
        if !config_dir.is_dir() {
            debug!("no {}", config_dir.display());
            continue;
        }

        let variants = fs::read_dir(&config_dir)
            .with_context(|| format!("could not list {}", config_dir.display()))?;
        for variant_entry in variants {
            let config_path = variant_entry?.path();
            let variant = config_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if variant.is_empty() || is_ignored_file(&variant) || !config_path.is_file() {
                debug!("ignore {}", config_path.display());
                continue;
            }

            let name = format!("{region}_{variant}");
            let parsed = fs::read_to_string(&config_path)
                .map_err(anyhow::Error::from)
                .and_then(|text| parse_configuration(&name, &region_dir, datadir, &text));
            match parsed {
                Ok(config) => {
                    debug!("set config {name}");
                    configs.insert(name, config);
                }
                Err(e) => warn!("skipping {}: {e:#}", config_path.display()),
            }
        }
    }

    Ok(configs)
}

/// Build a configuration from the text of its config file.
///
/// # Errors
/// Returns an error if a line has no scope or the problem input or district count is missing.
pub fn parse_configuration(
    name: &str,
    data_dir: &Path,
    data_root: &Path,
    text: &str,
) -> Result<Configuration> {
    let data = data_root.to_string_lossy();
    let mut common = Vec::new();
    let mut solve = Vec::new();
    let mut drend = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (scope, args) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("line without a scope: {line:?}"))?;
        let tokens = args
            .replace("$DATA", &data)
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();
        match scope.trim() {
            "common" => common.extend(tokens),
            "solve" => solve.extend(tokens),
            "drend" => drend.extend(tokens),
            other => debug!("{name}: ignoring {other} args"),
        }
    }

    let solve_args = common.iter().chain(solve.iter());
    let config_input = flag_value(solve_args.clone(), "-P")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("{name} has no -P problem input"))?;
    let district_count = flag_value(solve_args, "-d")
        .ok_or_else(|| anyhow!("{name} has no -d district count"))?
        .parse::<u32>()
        .with_context(|| format!("{name} has a bad -d district count"))?;

    let mut render_args = common;
    render_args.extend(drend);

    Ok(Configuration {
        name: name.to_string(),
        data_dir: data_dir.to_path_buf(),
        config_input,
        district_count,
        render_args,
        data_root: data_root.to_path_buf(),
    })
}

/// The token following the first occurrence of `flag`.
fn flag_value<'a>(args: impl Iterator<Item = &'a String>, flag: &str) -> Option<&'a str> {
    args.tuple_windows()
        .find(|(arg, _)| arg.as_str() == flag)
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MA_CONGRESS: &str = "\
# Massachusetts, 9 congressional districts
common: -P $DATA/MA/ma.pb
solve: -d 9
drend: --mppb $DATA/MA/ma.mppb --mask $DATA/MA/ma.mask
";

    #[test_log::test]
    fn test_parse_configuration() {
        let config =
            parse_configuration("MA_Congress", Path::new("data/MA"), Path::new("data"), MA_CONGRESS)
                .unwrap();

        assert_eq!(config.name, "MA_Congress");
        assert_eq!(config.region(), "MA");
        assert_eq!(config.variant(), "Congress");
        assert_eq!(config.config_input, PathBuf::from("data/MA/ma.pb"));
        assert_eq!(config.district_count, 9);
        assert_eq!(
            config.render_args,
            vec![
                "-P",
                "data/MA/ma.pb",
                "--mppb",
                "data/MA/ma.mppb",
                "--mask",
                "data/MA/ma.mask"
            ]
        );
    }

    #[test_log::test]
    fn test_parse_configuration_requires_inputs() {
        let no_districts = parse_configuration("X_Y", Path::new("d/X"), Path::new("d"), "common: -P x.pb");
        assert!(no_districts.is_err());

        let no_input = parse_configuration("X_Y", Path::new("d/X"), Path::new("d"), "solve: -d 3");
        assert!(no_input.is_err());

        let no_scope = parse_configuration("X_Y", Path::new("d/X"), Path::new("d"), "-P x.pb -d 3");
        assert!(no_scope.is_err());
    }

    #[test_log::test]
    fn test_load_datadir_configurations() {
        let root = TempDir::new().unwrap();
        let ma = root.path().join("ma/config");
        let ny = root.path().join("NY/config");
        fs::create_dir_all(&ma).unwrap();
        fs::create_dir_all(&ny).unwrap();
        fs::create_dir_all(root.path().join("zips")).unwrap();
        fs::write(ma.join("Congress"), MA_CONGRESS).unwrap();
        fs::write(ma.join("Congress~"), MA_CONGRESS).unwrap();
        fs::write(ny.join("Senate"), "common: -P ny.pb\nsolve: -d 63\n").unwrap();
        fs::write(ny.join("Broken"), "solve: -d 63\n").unwrap();

        let configs = load_datadir_configurations(root.path()).unwrap();

        assert_eq!(
            configs.keys().collect::<Vec<_>>(),
            vec!["MA_Congress", "NY_Senate"]
        );
        assert_eq!(configs["NY_Senate"].district_count, 63);
        assert_eq!(configs["MA_Congress"].data_dir, root.path().join("ma"));
        assert_eq!(configs["MA_Congress"].data_root, root.path());
    }
}
