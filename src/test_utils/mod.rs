//! Test utilities for rust-acquire
//!
//! Common helpers shared by the unit test modules.

#![cfg(test)]

use anyhow::Result;
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

/// Creates a temporary directory that is automatically cleaned up
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a temporary file with the given content
pub fn create_temp_file(content: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

/// Creates a test file structure in a temporary directory
pub fn create_test_file_structure() -> Result<TempDir> {
    let temp_dir = create_temp_dir()?;
    let base_path = temp_dir.path();

    fs::create_dir_all(base_path.join("dir1/subdir1"))?;
    fs::create_dir_all(base_path.join("dir2"))?;

    fs::write(base_path.join("file1.txt"), b"Test content 1")?;
    fs::write(base_path.join("file2.log"), b"Test log content")?;
    fs::write(base_path.join("dir1/file3.txt"), b"Test content 3")?;
    fs::write(base_path.join("dir1/subdir1/file4.txt"), b"Test content 4")?;
    fs::write(base_path.join("dir2/file5.log"), b"Another log file")?;

    Ok(temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_file() {
        let file = create_temp_file(b"evidence").unwrap();
        assert_eq!(fs::read(file.path()).unwrap(), b"evidence");
    }

    #[test]
    fn test_file_structure_layout() {
        let dir = create_test_file_structure().unwrap();
        assert!(dir.path().join("dir1/subdir1/file4.txt").is_file());
        assert!(dir.path().join("dir2/file5.log").is_file());
    }
}
