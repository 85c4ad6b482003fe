//! I/O utility functions

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling temp path: `report.yaml` becomes `report.yaml.tmp`
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write content to a file atomically using write-then-rename pattern.
///
/// The content is first written to a temporary file next to the target, then
/// renamed over it, so readers never observe a partially written report.
///
/// ```ignore
/// atomic_write(&study_dir.join("study_report.yaml"), &yaml)?;
/// ```
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let temp_path = temp_path(path);
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("study_report.yaml");

        atomic_write(&path, "study: cavity\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "study: cavity\n");
        assert!(!dir.path().join("study_report.yaml.tmp").exists());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("design.csv");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
