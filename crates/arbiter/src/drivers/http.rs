//! Generic HTTP(S) driver
//!
//! Wraps the transport pool with the uniform driver contract, and
//! provides the raw `internal_*` request surface the cloud drivers build
//! their signed requests on. No enumeration: plain HTTP has no listing
//! protocol, so `glob` stays unsupported.

use std::sync::Arc;

use arbiter_core::{path, Error, Result};
use arbiter_http::{Headers, Pool, Query, Response};

use crate::driver::Driver;

/// Driver for `http://` and `https://` paths, and the transport layer of
/// every cloud driver.
pub struct Http {
    pool: Arc<Pool>,
    protocol: &'static str,
}

impl Http {
    pub fn new(pool: Arc<Pool>, protocol: &'static str) -> Self {
        Http { pool, protocol }
    }

    /// Prefixes bare paths with this driver's scheme; fully-qualified
    /// URLs pass through untouched.
    fn typed(&self, path: &str) -> String {
        if path.contains(path::DELIMITER) {
            path.to_string()
        } else {
            format!("{}://{}", self.protocol, path)
        }
    }

    /// GET returning the raw response, whatever the status.
    pub fn internal_get(&self, path: &str, headers: &Headers, query: &Query) -> Result<Response> {
        self.pool.acquire().get(&self.typed(path), headers, query)
    }

    /// GET with a per-call retry override.
    pub fn internal_get_with_retry(
        &self,
        path: &str,
        headers: &Headers,
        query: &Query,
        retry: usize,
    ) -> Result<Response> {
        self.pool
            .acquire()
            .get_with_retry(&self.typed(path), headers, query, retry)
    }

    /// HEAD returning the raw response.
    pub fn internal_head(&self, path: &str, headers: &Headers, query: &Query) -> Result<Response> {
        self.pool.acquire().head(&self.typed(path), headers, query)
    }

    /// PUT returning the raw response.
    pub fn internal_put(
        &self,
        path: &str,
        data: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        self.pool
            .acquire()
            .put(&self.typed(path), data, headers, query)
    }

    /// POST returning the raw response.
    pub fn internal_post(
        &self,
        path: &str,
        data: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        self.pool
            .acquire()
            .post(&self.typed(path), data, headers, query)
    }

    /// GET with caller-supplied headers and query, failing on non-2xx.
    pub fn get_with(&self, path: &str, headers: &Headers, query: &Query) -> Result<Vec<u8>> {
        let res = self.internal_get(path, headers, query)?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read {}", self.typed(path))))
        }
    }

    /// PUT with caller-supplied headers and query, failing on non-2xx.
    pub fn put_with(
        &self,
        path: &str,
        data: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<()> {
        let res = self.internal_put(path, data, headers, query)?;
        if res.ok() {
            Ok(())
        } else {
            Err(res.to_error(format!("could not write {}", self.typed(path))))
        }
    }

    /// Content length via HEAD, when the server reports one.
    pub fn size_with(&self, path: &str, headers: &Headers, query: &Query) -> Result<u64> {
        let res = self.internal_head(path, headers, query)?;
        if !res.ok() {
            return Err(res.to_error(format!("could not stat {}", self.typed(path))));
        }
        res.content_length().ok_or_else(|| {
            Error::Backend(format!("no Content-Length from {}", self.typed(path)))
        })
    }
}

impl Driver for Http {
    fn protocol(&self) -> &str {
        self.protocol
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.get_with(path, &Headers::new(), &Query::new())
    }

    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        self.put_with(path, data, &Headers::new(), &Query::new())
    }

    fn size(&self, path: &str) -> Result<u64> {
        self.size_with(path, &Headers::new(), &Query::new())
    }

    fn get_range(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let mut headers = Headers::new();
        // Inclusive end.
        headers.insert(
            "Range".to_string(),
            format!("bytes={}-{}", offset, offset + length - 1),
        );
        self.get_with(path, &headers, &Query::new())
    }
}
