//! The uniform driver contract
//!
//! Every backend satisfies [`Driver`]. Drivers are constructed once at
//! registry build time, are immutable afterwards (token caches
//! encapsulate their own locking), and are called concurrently from many
//! threads. Paths handed to a driver have their routing prefix already
//! stripped.

use arbiter_core::{path, Error, Result};
use tracing::info;

use crate::drivers::fs::expand_tilde;

/// Capability surface shared by every storage backend.
pub trait Driver: Send + Sync {
    /// The scheme this driver is routed by, e.g. `s3`.
    fn protocol(&self) -> &str;

    /// The credential profile this instance was built with.
    fn profile(&self) -> &str {
        path::DEFAULT_PROFILE
    }

    /// The registry key: `protocol` for the default profile, otherwise
    /// `protocol+profile`.
    fn profiled_protocol(&self) -> String {
        path::profiled(self.protocol(), self.profile())
    }

    /// False only for the local filesystem driver.
    fn is_remote(&self) -> bool {
        true
    }

    /// Fetches the full contents at `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Fetches the full contents, or `None` on any non-success. Never
    /// fails for I/O reasons.
    fn try_get(&self, path: &str) -> Option<Vec<u8>> {
        self.get(path).ok()
    }

    /// Creates or overwrites `path` with `data`.
    fn put(&self, path: &str, data: &[u8]) -> Result<()>;

    /// The content length of `path` in bytes.
    fn size(&self, path: &str) -> Result<u64>;

    /// The content length, or `None` on any non-success.
    fn try_size(&self, path: &str) -> Option<u64> {
        self.size(path).ok()
    }

    /// Fetches `length` bytes starting at `offset`. Only drivers built
    /// on the HTTP transport support ranged reads.
    fn get_range(&self, path: &str, _offset: u64, _length: u64) -> Result<Vec<u8>> {
        Err(Error::Unsupported(format!(
            "ranged read of {}://{} - driver is not HTTP-derived",
            self.protocol(),
            path
        )))
    }

    /// Copies `src` to `dst` within this driver. The default fetches and
    /// re-writes; backends with a native copy primitive override.
    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let data = self.get(src)?;
        self.put(dst, &data)
    }

    /// Resolves a wildcard path (ending in `*` for one level or `**`
    /// recursively) to the matching object paths. Drivers that cannot
    /// enumerate fail with [`Error::Unsupported`].
    fn glob(&self, path: &str, verbose: bool) -> Result<Vec<String>> {
        let _ = verbose;
        Err(Error::Unsupported(format!(
            "cannot glob {}://{}",
            self.protocol(),
            path
        )))
    }

    /// Resolves a possibly-globbed path. Non-wildcard paths resolve to a
    /// single-element list: remote paths re-prefixed with
    /// `scheme[+profile]://`, local paths tilde-expanded.
    fn resolve(&self, path: &str, verbose: bool) -> Result<Vec<String>> {
        if path.len() > 1 && path.ends_with('*') {
            if verbose {
                info!(driver = %self.profiled_protocol(), path, "resolving");
            }
            let results = self.glob(path, verbose)?;
            if verbose {
                info!(count = results.len(), "resolved");
            }
            Ok(results)
        } else if self.is_remote() {
            Ok(vec![format!("{}://{}", self.profiled_protocol(), path)])
        } else {
            Ok(vec![expand_tilde(path)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Driver for Fixed {
        fn protocol(&self) -> &str {
            "mem"
        }

        fn get(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(b"fixed".to_vec())
        }

        fn put(&self, path: &str, _data: &[u8]) -> Result<()> {
            Err(Error::PermissionDenied(path.to_string()))
        }

        fn size(&self, _path: &str) -> Result<u64> {
            Err(Error::NotFound("nothing here".to_string()))
        }
    }

    #[test]
    fn test_try_variants_never_fail() {
        let driver = Fixed;
        assert_eq!(driver.try_get("x"), Some(b"fixed".to_vec()));
        assert_eq!(driver.try_size("x"), None);
    }

    #[test]
    fn test_defaults() {
        let driver = Fixed;
        assert!(driver.is_remote());
        assert_eq!(driver.profiled_protocol(), "mem");
        assert!(matches!(
            driver.get_range("x", 0, 4),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            driver.glob("x/*", false),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_resolve_plain_remote_path() {
        let driver = Fixed;
        let resolved = driver.resolve("bucket/obj.txt", false).unwrap();
        assert_eq!(resolved, vec!["mem://bucket/obj.txt".to_string()]);
    }

    #[test]
    fn test_resolve_bare_asterisk_is_not_a_glob() {
        // A path of just "*" is below the minimum wildcard length.
        let driver = Fixed;
        let resolved = driver.resolve("*", false).unwrap();
        assert_eq!(resolved, vec!["mem://*".to_string()]);
    }
}
