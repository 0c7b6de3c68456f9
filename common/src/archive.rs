//! Pull selected members out of a submission archive.

use crate::Error;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;

/// Read the members named in `names` from the `.tar.gz` at `path` into memory.
/// Members that are not in the archive are simply absent from the result.
///
/// # Errors
/// Returns [`Error::Extraction`] if the archive cannot be opened or decoded.
pub fn extract_members(path: &Path, names: &[&str]) -> Result<HashMap<String, Vec<u8>>, Error> {
    let extraction_error = |source: std::io::Error| Error::Extraction {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(extraction_error)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut out = HashMap::new();

    for entry in archive.entries().map_err(extraction_error)? {
        let mut entry = entry.map_err(extraction_error)?;
        let name = entry
            .path()
            .map_err(extraction_error)?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        if !names.contains(&name.as_str()) {
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(extraction_error)?;
        out.insert(name, data);
    }

    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    /// Write a `.tar.gz` holding `members` to `path`.
    pub(crate) fn write_archive(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test_log::test]
    fn test_extract_requested_members() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.tar.gz");
        write_archive(
            &path,
            &[
                ("vars", "config=MA_Congress"),
                ("solution", "\x01\x02"),
                ("binlog", "log"),
            ],
        );

        let members = extract_members(&path, &["vars", "solution"]).unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members["vars"], b"config=MA_Congress");
        assert_eq!(members["solution"], b"\x01\x02");
    }

    #[test_log::test]
    fn test_extract_absent_member_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.tar.gz");
        write_archive(&path, &[("vars", "config=MA_Congress")]);

        let members = extract_members(&path, &["vars", "solution"]).unwrap();

        assert!(members.contains_key("vars"));
        assert!(!members.contains_key("solution"));
    }

    #[test_log::test]
    fn test_extract_unreadable_archive_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.tar.gz");
        std::fs::write(&path, b"this is not gzip").unwrap();

        let result = extract_members(&path, &["vars"]);

        assert!(matches!(result, Err(Error::Extraction { .. })));
        let missing = extract_members(&dir.path().join("missing.tar.gz"), &["vars"]);
        assert!(matches!(missing, Err(Error::Extraction { .. })));
    }
}
