//! The bounded handle pool
//!
//! A [`Pool`] pre-allocates a fixed number of handles. [`Pool::acquire`]
//! blocks on a condition variable until the free list is non-empty and
//! hands back a [`Resource`]: an exclusive scoped borrow that releases
//! its handle and signals one waiter on drop. All request execution runs
//! through [`Resource::exec`], which retries server errors with
//! exponential backoff.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use arbiter_core::{Error, Result};
use tracing::debug;

use crate::{Handle, Headers, Query, Response, TransportConfig};

/// A bounded set of reusable HTTP handles.
pub struct Pool {
    handles: Vec<Handle>,
    free: Mutex<Vec<usize>>,
    cv: Condvar,
    retry: usize,
}

impl Pool {
    /// Builds `concurrent` handles sharing one transport configuration.
    /// `retry` is the default retry count applied by [`Resource::exec`].
    pub fn new(concurrent: usize, retry: usize, config: &TransportConfig) -> Result<Self> {
        if concurrent == 0 {
            return Err(Error::Config("pool concurrency must be non-zero".to_string()));
        }

        let handles = (0..concurrent)
            .map(|_| Handle::new(config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Pool {
            free: Mutex::new((0..handles.len()).collect()),
            handles,
            cv: Condvar::new(),
            retry,
        })
    }

    /// Blocks until a handle is free, then borrows it exclusively.
    pub fn acquire(&self) -> Resource<'_> {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(id) = free.pop() {
                return Resource { pool: self, id };
            }
            free = self.cv.wait(free).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The default retry count.
    pub fn retry(&self) -> usize {
        self.retry
    }

    fn release(&self, id: usize) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        free.push(id);
        drop(free);
        self.cv.notify_one();
    }
}

/// An exclusively borrowed handle; the borrow lasts as long as the HTTP
/// operation and returns to the pool on drop.
pub struct Resource<'a> {
    pool: &'a Pool,
    id: usize,
}

impl Resource<'_> {
    fn handle(&self) -> &Handle {
        &self.pool.handles[self.id]
    }

    pub fn get(&self, url: &str, headers: &Headers, query: &Query) -> Result<Response> {
        self.get_with_retry(url, headers, query, self.pool.retry)
    }

    /// GET with a per-call retry override.
    pub fn get_with_retry(
        &self,
        url: &str,
        headers: &Headers,
        query: &Query,
        retry: usize,
    ) -> Result<Response> {
        self.exec(|| self.handle().get(url, headers, query), retry)
    }

    pub fn head(&self, url: &str, headers: &Headers, query: &Query) -> Result<Response> {
        self.exec(|| self.handle().head(url, headers, query), self.pool.retry)
    }

    pub fn put(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        self.put_with_retry(url, body, headers, query, self.pool.retry)
    }

    /// PUT with a per-call retry override.
    pub fn put_with_retry(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
        query: &Query,
        retry: usize,
    ) -> Result<Response> {
        self.exec(|| self.handle().put(url, body, headers, query), retry)
    }

    pub fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        self.exec(|| self.handle().post(url, body, headers, query), self.pool.retry)
    }

    /// Runs `f`, retrying while the response is a 5xx (genuine or
    /// synthetic) with a `2^tries * 500 ms` sleep before each retry,
    /// until `retry` retries have been spent.
    fn exec(&self, f: impl Fn() -> Result<Response>, retry: usize) -> Result<Response> {
        let mut tries: usize = 0;
        loop {
            if tries > 0 {
                let backoff = Duration::from_millis(500u64 << tries.min(16));
                std::thread::sleep(backoff);
            }

            let res = f()?;
            if !res.server_error() || tries >= retry {
                return Ok(res);
            }

            tries += 1;
            debug!(code = res.code(), tries, "retrying after server error");
        }
    }
}

impl Drop for Resource<'_> {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = TransportConfig::default();
        assert!(matches!(Pool::new(0, 0, &config), Err(Error::Config(_))));
    }

    #[test]
    fn test_acquire_release_cycles() {
        let config = TransportConfig::default();
        let pool = Pool::new(2, 0, &config).unwrap();

        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        // A third borrow must be satisfiable once one is returned.
        let c = pool.acquire();
        drop(b);
        drop(c);

        let free = pool.free.lock().unwrap();
        assert_eq!(free.len(), 2);
    }
}
