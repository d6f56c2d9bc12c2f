//! Path routing
//!
//! A path of the form `scheme[+profile]://remainder` is routed to the
//! driver registered for `scheme` under the named credential profile.
//! Anything without a `://` delimiter is a local filesystem path.

/// Separator between the routing prefix and the driver-relative remainder.
pub const DELIMITER: &str = "://";

/// The profile selected when a scheme carries no `+profile` suffix.
pub const DEFAULT_PROFILE: &str = "default";

/// Splits a path into `(scheme, profile, remainder)`.
///
/// Without a delimiter the path is a filesystem path:
/// `("fs", "default", path)`.
pub fn parse_type(path: &str) -> (&str, &str, &str) {
    match path.find(DELIMITER) {
        Some(pos) => {
            let (scheme, profile) = split_profile(&path[..pos]);
            (scheme, profile, &path[pos + DELIMITER.len()..])
        }
        None => ("fs", DEFAULT_PROFILE, path),
    }
}

/// Splits a routing prefix like `s3+backup` into scheme and profile.
pub fn split_profile(prefix: &str) -> (&str, &str) {
    match prefix.split_once('+') {
        Some((scheme, profile)) if !profile.is_empty() => (scheme, profile),
        Some((scheme, _)) => (scheme, DEFAULT_PROFILE),
        None => (prefix, DEFAULT_PROFILE),
    }
}

/// Returns the driver-relative remainder of a path, i.e. everything after
/// `://` - or the path itself when no delimiter is present.
pub fn strip_type(path: &str) -> &str {
    parse_type(path).2
}

/// Returns the scheme of a path, defaulting to `fs`.
pub fn protocol(path: &str) -> &str {
    parse_type(path).0
}

/// Builds the registry key for a scheme and profile: the bare scheme for
/// the default profile, `scheme+profile` otherwise.
pub fn profiled(scheme: &str, profile: &str) -> String {
    if profile == DEFAULT_PROFILE {
        scheme.to_string()
    } else {
        format!("{}+{}", scheme, profile)
    }
}

/// True when the path's scheme routes to a driver built on the HTTP
/// transport. Local paths (no delimiter, or `fs`/`file`) are not.
pub fn is_http_derived(path: &str) -> bool {
    if !path.contains(DELIMITER) {
        return false;
    }
    matches!(
        protocol(path),
        "http" | "https" | "s3" | "gs" | "az" | "dbx" | "od"
    )
}

/// True when the path routes to the local filesystem driver.
pub fn is_local(path: &str) -> bool {
    matches!(protocol(path), "fs" | "file")
}

/// A driver-relative glob pattern, split from its trailing wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobPattern<'a> {
    /// Everything before the wildcard, trailing `/` preserved.
    pub prefix: &'a str,
    /// `**` recurses into sub-prefixes; `*` stays at one level.
    pub recursive: bool,
}

/// Splits a pattern ending in `*` or `**` into its [`GlobPattern`] parts.
///
/// Returns `None` when the path carries no trailing wildcard.
pub fn parse_glob(path: &str) -> Option<GlobPattern<'_>> {
    let path = path.strip_suffix('*')?;
    match path.strip_suffix('*') {
        Some(prefix) => Some(GlobPattern {
            prefix,
            recursive: true,
        }),
        None => Some(GlobPattern {
            prefix: path,
            recursive: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_remote() {
        assert_eq!(
            parse_type("s3://bucket/key.txt"),
            ("s3", "default", "bucket/key.txt")
        );
        assert_eq!(
            parse_type("s3+backup://bucket/key.txt"),
            ("s3", "backup", "bucket/key.txt")
        );
        assert_eq!(parse_type("https://host/path"), ("https", "default", "host/path"));
    }

    #[test]
    fn test_parse_type_local() {
        assert_eq!(parse_type("/var/data/a.bin"), ("fs", "default", "/var/data/a.bin"));
        assert_eq!(parse_type("~/data"), ("fs", "default", "~/data"));
        assert_eq!(parse_type(""), ("fs", "default", ""));
    }

    #[test]
    fn test_strip_type() {
        assert_eq!(strip_type("gs://bucket/obj"), "bucket/obj");
        assert_eq!(strip_type("relative/path"), "relative/path");
    }

    #[test]
    fn test_profiled() {
        assert_eq!(profiled("s3", "default"), "s3");
        assert_eq!(profiled("s3", "backup"), "s3+backup");
    }

    #[test]
    fn test_http_derivation() {
        assert!(is_http_derived("http://arbitercpp.com"));
        assert!(is_http_derived("s3://bucket/obj"));
        assert!(is_http_derived("az+prod://container/blob"));
        assert!(!is_http_derived("~/data"));
        assert!(!is_http_derived("."));
        assert!(!is_http_derived("file:///tmp/x"));
    }

    #[test]
    fn test_is_local() {
        assert!(is_local("/tmp/x"));
        assert!(is_local("file:///tmp/x"));
        assert!(is_local("fs:///tmp/x"));
        assert!(!is_local("od://docs/x"));
    }

    #[test]
    fn test_parse_glob() {
        assert_eq!(parse_glob("bucket/dir/x.txt"), None);
        assert_eq!(
            parse_glob("bucket/dir/*"),
            Some(GlobPattern {
                prefix: "bucket/dir/",
                recursive: false
            })
        );
        assert_eq!(
            parse_glob("bucket/dir/**"),
            Some(GlobPattern {
                prefix: "bucket/dir/",
                recursive: true
            })
        );
        assert_eq!(
            parse_glob("bucket/**"),
            Some(GlobPattern {
                prefix: "bucket/",
                recursive: true
            })
        );
    }
}
