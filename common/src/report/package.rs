//! Repackage the gzipped CSV export as a zip for people who can't open `.gz`.

use crate::publish::Staged;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write the decompressed contents of `csv_gz` to `zip_path` as the single entry `entry_name`.
/// `zip_path` is replaced only once the zip is complete.
pub fn package_csv_zip(csv_gz: &Path, zip_path: &Path, entry_name: &str) -> Result<()> {
    let mut csv = Vec::new();
    GzDecoder::new(File::open(csv_gz).with_context(|| format!("could not open {}", csv_gz.display()))?)
        .read_to_end(&mut csv)
        .with_context(|| format!("could not decompress {}", csv_gz.display()))?;
    debug!(
        "got {} bytes from {}, to zip entry {entry_name}",
        csv.len(),
        csv_gz.display()
    );

    let staged = Staged::new(zip_path)?;
    let mut zip = ZipWriter::new(File::create(staged.path())?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options)?;
    zip.write_all(&csv)?;
    zip.finish()?;
    staged.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test_log::test]
    fn test_package_csv_zip() {
        let dir = TempDir::new().unwrap();
        let csv_gz = dir.path().join("solution.csv.gz");
        let mut gz = GzEncoder::new(File::create(&csv_gz).unwrap(), Compression::default());
        gz.write_all(b"district,total\n1,635606\n").unwrap();
        gz.finish().unwrap();
        let zip_path = dir.path().join("solution.zip");

        package_csv_zip(&csv_gz, &zip_path, "MA_Congress.csv").unwrap();

        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("MA_Congress.csv").unwrap();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert_eq!(text, "district,total\n1,635606\n");
    }

    #[test_log::test]
    fn test_bad_input_leaves_no_zip() {
        let dir = TempDir::new().unwrap();
        let csv_gz = dir.path().join("solution.csv.gz");
        fs::write(&csv_gz, b"not gzip").unwrap();
        let zip_path = dir.path().join("solution.zip");

        assert!(package_csv_zip(&csv_gz, &zip_path, "x.csv").is_err());
        assert!(!zip_path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
