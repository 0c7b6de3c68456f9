//! Put files into the public tree without readers ever seeing a partial write.
//!
//! Everything lands under a temporary name in the destination directory first and is
//! then renamed over the destination, which is atomic on one filesystem.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempPath};

fn parent_dir(dest: &Path) -> Result<&Path> {
    match dest.parent() {
        Some(p) if p.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(p) => Ok(p),
        None => Err(anyhow!("{} has no parent directory", dest.display())),
    }
}

/// Create an empty, world-readable temporary file in `dir`.
fn stage_in(dir: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(prefix).suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    builder
        .tempfile_in(dir)
        .with_context(|| format!("could not stage into {}", dir.display()))
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Make `dest` a copy of `src`: hard link `src` under a temporary name beside `dest`
/// (or copy it when linking is not possible), then rename over `dest`.
///
/// Returns `Ok(false)` without touching `dest` if `src` is missing or `dest` already
/// is `src`.
pub fn publish(src: &Path, dest: &Path) -> Result<bool> {
    if !src.exists() {
        warn!("cannot publish missing {}", src.display());
        return Ok(false);
    }
    if same_file(src, dest) {
        debug!("{} is already published", dest.display());
        return Ok(false);
    }

    let dir = parent_dir(dest)?;
    fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;

    // Reserve a unique name, then swap the placeholder for a link to src.
    let staging = stage_in(dir, ".publish", "")?.into_temp_path();
    fs::remove_file(&staging)?;
    if let Err(e) = fs::hard_link(src, &staging) {
        debug!("hard link {} failed ({e}), copying", src.display());
        fs::copy(src, &staging)
            .with_context(|| format!("could not copy {}", src.display()))?;
    }
    staging
        .persist(dest)
        .with_context(|| format!("could not publish {}", dest.display()))?;

    debug!("published {} as {}", src.display(), dest.display());
    Ok(true)
}

/// Replace `dest` with `contents` in one step.
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<()> {
    let dir = parent_dir(dest)?;
    fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;

    let mut tmp = stage_in(dir, ".write", "")?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .with_context(|| format!("could not write {}", dest.display()))?;
    Ok(())
}

/// A staging path beside a destination for a tool to write into.
///
/// The staged file is removed on drop unless [`Staged::commit`] moves it over the
/// destination. The staging name keeps the destination's extension since some tools
/// pick their output format from it.
pub struct Staged {
    path: TempPath,
    dest: PathBuf,
}

impl Staged {
    pub fn new(dest: &Path) -> Result<Self> {
        let dir = parent_dir(dest)?;
        fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = file_name.find('.').map_or("", |i| &file_name[i..]);
        let path = stage_in(dir, ".staged", suffix)?.into_temp_path();

        Ok(Self {
            path,
            dest: dest.to_path_buf(),
        })
    }

    /// Where the tool should write.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Move the staged file over the destination.
    pub fn commit(self) -> Result<()> {
        let Self { path, dest } = self;
        path.persist(&dest)
            .with_context(|| format!("could not publish {}", dest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect()
    }

    #[test_log::test]
    fn test_publish_replaces_dest() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("17/map.png");
        let dest = dir.path().join("map.png");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        assert!(publish(&src, &dest).unwrap());

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test_log::test]
    fn test_publish_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.png");
        let dest = dir.path().join("sub/dest.png");
        fs::write(&src, b"content").unwrap();

        assert!(publish(&src, &dest).unwrap());
        #[cfg(unix)]
        assert!(!publish(&src, &dest).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"content");
    }

    #[test_log::test]
    fn test_publish_missing_src_leaves_dest() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.png");
        fs::write(&dest, b"old").unwrap();

        assert!(!publish(&dir.path().join("gone.png"), &dest).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
    }

    #[test_log::test]
    fn test_write_atomic() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a/b/index.html");

        write_atomic(&dest, b"one").unwrap();
        write_atomic(&dest, b"two").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"two");
        assert!(leftovers(&dir.path().join("a/b")).is_empty());
    }

    #[cfg(unix)]
    #[test_log::test]
    fn test_written_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("index.html");

        write_atomic(&dest, b"page").unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o044, 0o044);
    }

    #[test_log::test]
    fn test_uncommitted_stage_leaves_dest_untouched() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("solution.csv.gz");
        fs::write(&dest, b"old").unwrap();

        let staged = Staged::new(&dest).unwrap();
        assert!(staged.path().to_string_lossy().ends_with(".csv.gz"));
        fs::write(staged.path(), b"half").unwrap();
        drop(staged);

        assert_eq!(fs::read(&dest).unwrap(), b"old");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test_log::test]
    fn test_committed_stage_replaces_dest() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("map.png");

        let staged = Staged::new(&dest).unwrap();
        fs::write(staged.path(), b"png").unwrap();
        staged.commit().unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"png");
    }
}
