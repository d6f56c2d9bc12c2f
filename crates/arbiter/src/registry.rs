//! Driver registry and dispatch
//!
//! [`Arbiter`] is built once from a configuration document (one
//! top-level key per scheme, with an optional `+profile` suffix for
//! alternate credential sets) plus the environment, and is immutable
//! afterwards. The filesystem driver is always registered; the generic
//! HTTP drivers always exist; cloud drivers appear only when their
//! credentials resolve.

use std::collections::HashMap;
use std::sync::Arc;

use arbiter_core::{path, Error, Result};
use arbiter_http::{Pool, TransportConfig};
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::drivers::{Az, Fs, Gs, Http, Od, S3};

/// Transport handles shared by every remote driver.
const POOL_CONCURRENCY: usize = 8;

/// Default retry count for server errors.
const POOL_RETRY: usize = 4;

/// The dispatch facade: routes `scheme[+profile]://` paths to their
/// drivers and forwards the uniform operations.
pub struct Arbiter {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl Arbiter {
    /// Builds a registry from environment variables alone.
    pub fn new() -> Result<Self> {
        Self::with_config(Value::Null)
    }

    /// Builds a registry from a configuration document and the
    /// environment. Cloud schemes without resolvable credentials are
    /// skipped; a present-but-malformed scheme entry is an error.
    pub fn with_config(config: Value) -> Result<Self> {
        let transport = TransportConfig::from_value(&config);
        let pool = Arc::new(Pool::new(POOL_CONCURRENCY, POOL_RETRY, &transport)?);

        let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();

        let fs: Arc<dyn Driver> = Arc::new(Fs::new());
        drivers.insert("fs".to_string(), fs.clone());
        drivers.insert("file".to_string(), fs);

        drivers.insert(
            "http".to_string(),
            Arc::new(Http::new(pool.clone(), "http")),
        );
        drivers.insert(
            "https".to_string(),
            Arc::new(Http::new(pool.clone(), "https")),
        );

        for (profile, options) in scheme_entries(&config, "s3") {
            if let Some(driver) = S3::create(pool.clone(), &options, &profile)? {
                drivers.insert(path::profiled("s3", &profile), Arc::new(driver));
            } else {
                debug!(profile = %profile, "s3 credentials not found; driver not registered");
            }
        }
        for (profile, options) in scheme_entries(&config, "az") {
            if let Some(driver) = Az::create(pool.clone(), &options, &profile)? {
                drivers.insert(path::profiled("az", &profile), Arc::new(driver));
            } else {
                debug!(profile = %profile, "az credentials not found; driver not registered");
            }
        }
        for (profile, options) in scheme_entries(&config, "gs") {
            if let Some(driver) = Gs::create(pool.clone(), &options, &profile)? {
                drivers.insert(path::profiled("gs", &profile), Arc::new(driver));
            } else {
                debug!(profile = %profile, "gs credentials not found; driver not registered");
            }
        }
        for (profile, options) in scheme_entries(&config, "od") {
            if let Some(driver) = Od::create(pool.clone(), &options, &profile)? {
                drivers.insert(path::profiled("od", &profile), Arc::new(driver));
            } else {
                debug!(profile = %profile, "od credentials not found; driver not registered");
            }
        }

        Ok(Arbiter { drivers })
    }

    /// The driver a full path routes to.
    pub fn driver_for(&self, full_path: &str) -> Result<&Arc<dyn Driver>> {
        let (scheme, profile, _) = path::parse_type(full_path);
        let key = path::profiled(scheme, profile);
        self.drivers
            .get(&key)
            .ok_or_else(|| Error::Config(format!("no driver registered for {}", key)))
    }

    pub fn get(&self, full_path: &str) -> Result<Vec<u8>> {
        self.driver_for(full_path)?.get(path::strip_type(full_path))
    }

    /// Full contents as UTF-8 text.
    pub fn get_string(&self, full_path: &str) -> Result<String> {
        String::from_utf8(self.get(full_path)?)
            .map_err(|e| Error::Backend(format!("{} is not valid UTF-8: {}", full_path, e)))
    }

    pub fn try_get(&self, full_path: &str) -> Option<Vec<u8>> {
        self.driver_for(full_path)
            .ok()?
            .try_get(path::strip_type(full_path))
    }

    pub fn put(&self, full_path: &str, data: &[u8]) -> Result<()> {
        self.driver_for(full_path)?
            .put(path::strip_type(full_path), data)
    }

    pub fn size(&self, full_path: &str) -> Result<u64> {
        self.driver_for(full_path)?
            .size(path::strip_type(full_path))
    }

    pub fn try_size(&self, full_path: &str) -> Option<u64> {
        self.driver_for(full_path)
            .ok()?
            .try_size(path::strip_type(full_path))
    }

    pub fn get_range(&self, full_path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.driver_for(full_path)?
            .get_range(path::strip_type(full_path), offset, length)
    }

    /// Copies one object. Within a single driver instance the driver's
    /// own copy runs (Azure's is server-side); across drivers it is a
    /// fetch and re-write.
    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.driver_for(src)?;
        let to = self.driver_for(dst)?;

        if from.profiled_protocol() == to.profiled_protocol() {
            from.copy(path::strip_type(src), path::strip_type(dst))
        } else {
            let data = from.get(path::strip_type(src))?;
            to.put(path::strip_type(dst), &data)
        }
    }

    /// Resolves a possibly-globbed path; see [`Driver::resolve`].
    pub fn resolve(&self, full_path: &str, verbose: bool) -> Result<Vec<String>> {
        self.driver_for(full_path)?
            .resolve(path::strip_type(full_path), verbose)
    }

    pub fn is_remote(&self, full_path: &str) -> Result<bool> {
        Ok(self.driver_for(full_path)?.is_remote())
    }

    pub fn is_local(&self, full_path: &str) -> Result<bool> {
        Ok(!self.is_remote(full_path)?)
    }

    /// True when the path's scheme rides on the HTTP transport.
    pub fn is_http_derived(&self, full_path: &str) -> bool {
        path::is_http_derived(full_path)
    }
}

/// The `(profile, options)` pairs to attempt for a scheme: every
/// configured `scheme` / `scheme+profile` key, plus an env-only default
/// when the document has none.
fn scheme_entries(config: &Value, scheme: &str) -> Vec<(String, Value)> {
    let mut entries = Vec::new();
    let mut saw_default = false;

    if let Some(map) = config.as_object() {
        for (key, value) in map {
            let (key_scheme, profile) = path::split_profile(key);
            if key_scheme == scheme {
                if profile == path::DEFAULT_PROFILE {
                    saw_default = true;
                }
                entries.push((profile.to_string(), value.clone()));
            }
        }
    }

    if !saw_default {
        entries.push((path::DEFAULT_PROFILE.to_string(), Value::Null));
    }
    entries
}
