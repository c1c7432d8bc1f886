//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use walkdir::WalkDir;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Directories under `base` matching a glob pattern, sorted.
pub fn glob_dirs(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = base.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    let mut results = Vec::new();
    for entry in glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))? {
        match entry {
            Ok(path) if path.is_dir() => results.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("glob error: {}", e),
        }
    }

    results.sort();
    Ok(results)
}

/// Count files under `dir` (recursively) with the given extension.
///
/// Unreadable entries are skipped.
pub fn count_files_with_extension(dir: &Path, extension: &str) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/report.json");
        write_string(&path, "{}").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_count_files_with_extension() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("owner")).unwrap();
        fs::write(src.join("main.ts"), "").unwrap();
        fs::write(src.join("owner/owner.service.ts"), "").unwrap();
        fs::write(src.join("owner/README.md"), "").unwrap();

        assert_eq!(count_files_with_extension(&src, "ts"), 2);
        assert_eq!(count_files_with_extension(&src, "js"), 0);
    }

    #[test]
    fn test_glob_dirs_only_returns_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("TEST_CASE_2_backend")).unwrap();
        fs::create_dir(tmp.path().join("TEST_CASE_1_backend")).unwrap();
        fs::write(tmp.path().join("TEST_CASE_3_backend"), "not a dir").unwrap();
        fs::create_dir(tmp.path().join("other")).unwrap();

        let dirs = glob_dirs(tmp.path(), "TEST_CASE_*_backend").unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["TEST_CASE_1_backend", "TEST_CASE_2_backend"]);
    }

    #[test]
    fn test_read_missing_file_has_context() {
        let err = read_to_string(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read file"));
    }
}
