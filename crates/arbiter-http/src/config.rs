//! Transport configuration
//!
//! Options come from the `http` object of the configuration document and
//! from environment variables, env winning. Several spellings are
//! honored per key because the variables accumulated over time.

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

/// Seconds without data transfer before a request is abandoned.
const DEFAULT_TIMEOUT: u64 = 5;

static DUMPED: Once = Once::new();

/// Settings applied to every handle a pool constructs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Emit the configuration dump and per-request events.
    pub verbose: bool,
    /// Low-speed (read) timeout in seconds; a sliding window, not a
    /// whole-request deadline.
    pub timeout: u64,
    /// Follow 3xx redirects.
    pub follow_redirect: bool,
    /// Verify TLS peer certificates.
    pub verify_peer: bool,
    /// Extra CA bundle file.
    pub ca_bundle: Option<PathBuf>,
    /// Extra CA certificate file.
    pub ca_info: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            verbose: false,
            timeout: DEFAULT_TIMEOUT,
            follow_redirect: true,
            verify_peer: true,
            ca_bundle: None,
            ca_info: None,
        }
    }
}

impl TransportConfig {
    /// Builds the configuration from the top-level configuration
    /// document, then layers environment variables on top.
    pub fn from_value(config: &Value) -> Self {
        let mut out = TransportConfig::default();

        if let Some(verbose) = config.get("verbose").and_then(Value::as_bool) {
            out.verbose = verbose;
        }

        if let Some(http) = config.get("http") {
            if let Some(timeout) = http.get("timeout").and_then(Value::as_u64) {
                out.timeout = timeout;
            }
            if let Some(follow) = http.get("followRedirect").and_then(Value::as_bool) {
                out.follow_redirect = follow;
            }
            if let Some(verify) = http.get("verifyPeer").and_then(Value::as_bool) {
                out.verify_peer = verify;
            }
            let bundle = http
                .get("caBundle")
                .or_else(|| http.get("caPath"))
                .and_then(Value::as_str);
            if let Some(bundle) = bundle {
                out.ca_bundle = Some(PathBuf::from(bundle));
            }
            if let Some(info) = http.get("caInfo").and_then(Value::as_str) {
                out.ca_info = Some(PathBuf::from(info));
            }
        }

        if let Some(v) = env_flag(&["VERBOSE", "CURL_VERBOSE", "ARBITER_VERBOSE"]) {
            out.verbose = v;
        }
        if let Some(v) = env_first(&["CURL_TIMEOUT", "ARBITER_HTTP_TIMEOUT"]) {
            if let Ok(timeout) = v.parse() {
                out.timeout = timeout;
            }
        }
        if let Some(v) = env_flag(&[
            "CURL_FOLLOWLOCATION",
            "CURL_FOLLOW_LOCATION",
            "ARBITER_FOLLOW_REDIRECT",
        ]) {
            out.follow_redirect = v;
        }
        if let Some(v) = env_flag(&[
            "CURL_SSL_VERIFYPEER",
            "CURL_VERIFY_PEER",
            "ARBITER_VERIFY_PEER",
        ]) {
            out.verify_peer = v;
        }
        if let Some(v) = env_first(&["CURL_CA_PATH", "CURL_CA_BUNDLE", "ARBITER_CA_PATH"]) {
            out.ca_bundle = Some(PathBuf::from(v));
        }
        if let Some(v) = env_first(&["CURL_CAINFO", "CURL_CA_INFO", "ARBITER_CA_INFO"]) {
            out.ca_info = Some(PathBuf::from(v));
        }

        if out.verbose {
            DUMPED.call_once(|| {
                debug!(
                    timeout = out.timeout,
                    follow_redirect = out.follow_redirect,
                    verify_peer = out.verify_peer,
                    ca_bundle = ?out.ca_bundle,
                    ca_info = ?out.ca_info,
                    "transport configured"
                );
            });
        }

        out
    }

    /// The low-speed timeout as a [`Duration`].
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| std::env::var(key).ok())
}

fn env_flag(keys: &[&str]) -> Option<bool> {
    env_first(keys).and_then(|v| v.parse::<i64>().ok().map(|n| n != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, 5);
        assert!(config.follow_redirect);
        assert!(config.verify_peer);
        assert!(config.ca_bundle.is_none());
    }

    #[test]
    fn test_from_document() {
        let config = TransportConfig::from_value(&json!({
            "verbose": true,
            "http": {
                "timeout": 30,
                "followRedirect": false,
                "verifyPeer": false,
                "caBundle": "/etc/ssl/certs",
                "caInfo": "/etc/ssl/ca.pem"
            }
        }));
        assert!(config.verbose);
        assert_eq!(config.timeout, 30);
        assert!(!config.follow_redirect);
        assert!(!config.verify_peer);
        assert_eq!(config.ca_bundle, Some(PathBuf::from("/etc/ssl/certs")));
        assert_eq!(config.ca_info, Some(PathBuf::from("/etc/ssl/ca.pem")));
    }

    #[test]
    fn test_ca_path_alias() {
        let config = TransportConfig::from_value(&json!({
            "http": { "caPath": "/alt/bundle.pem" }
        }));
        assert_eq!(config.ca_bundle, Some(PathBuf::from("/alt/bundle.pem")));
    }
}
