//! Local filesystem driver
//!
//! The only driver that bypasses the HTTP transport. Paths are
//! tilde-expanded on every operation; wildcard resolution delegates to
//! platform globbing with `*` held to one path component and `**`
//! recursing.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use arbiter_core::{Error, Result};

use crate::driver::Driver;

/// Replaces a leading `~` with `$HOME`.
pub fn expand_tilde(path: &str) -> String {
    match path.strip_prefix('~') {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}{}", home, rest),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    }
}

/// Creates `path` and any missing parents; succeeds if it already exists.
pub fn mkdirp(path: &str) -> Result<()> {
    let path = expand_tilde(path);
    std::fs::create_dir_all(&path).map_err(|e| Error::io(path, e))
}

/// The local filesystem backend.
#[derive(Debug, Default)]
pub struct Fs;

impl Fs {
    pub fn new() -> Self {
        Fs
    }

    /// Reads bytes `offset..end` of a local file. The GCS resumable
    /// upload streams file chunks through this.
    pub fn get_binary_chunk(&self, path: &str, offset: u64, end: u64) -> Result<Vec<u8>> {
        let path = expand_tilde(path);
        let mut file = File::open(&path)
            .map_err(|e| Error::NotFound(format!("could not read file {}: {}", path, e)))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io(&path, e))?;

        let len = end.saturating_sub(offset) as usize;
        let mut data = vec![0u8; len];
        file.read_exact(&mut data).map_err(|e| Error::io(&path, e))?;
        Ok(data)
    }
}

impl Driver for Fs {
    fn protocol(&self) -> &str {
        "fs"
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let path = expand_tilde(path);
        std::fs::read(&path)
            .map_err(|e| Error::NotFound(format!("could not read file {}: {}", path, e)))
    }

    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = expand_tilde(path);
        std::fs::write(&path, data).map_err(|e| Error::io(path, e))
    }

    fn size(&self, path: &str) -> Result<u64> {
        let path = expand_tilde(path);
        let meta = std::fs::metadata(&path)
            .map_err(|e| Error::NotFound(format!("could not stat {}: {}", path, e)))?;
        Ok(meta.len())
    }

    fn glob(&self, path: &str, _verbose: bool) -> Result<Vec<String>> {
        let pattern = expand_tilde(path);
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };

        let entries = glob::glob_with(&pattern, options)
            .map_err(|e| Error::Config(format!("invalid glob pattern {:?}: {}", path, e)))?;

        let mut results = Vec::new();
        for entry in entries.flatten() {
            // Only files resolve; directories are traversal structure.
            if entry.is_file() {
                results.push(entry.to_string_lossy().into_owned());
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap();
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde("~/data"), format!("{}/data", home));
        assert_eq!(expand_tilde("/no/tilde"), "/no/tilde");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let fs = Fs::new();
        assert!(matches!(
            fs.get("/definitely/not/here.bin"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(fs.try_get("/definitely/not/here.bin"), None);
    }
}
