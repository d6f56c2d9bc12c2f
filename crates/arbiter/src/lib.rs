//! Arbiter - uniform storage access
//!
//! One programmatic surface for reading, writing, sizing, and
//! enumerating byte blobs on the local filesystem, generic HTTP(S)
//! endpoints, Amazon S3, Google Cloud Storage, Azure Blob Storage, and
//! OneDrive. Paths carry a `scheme[+profile]://` prefix that routes each
//! operation to the right backend; a path without `://` is a local
//! filesystem path.
//!
//! ```no_run
//! # fn main() -> arbiter::Result<()> {
//! let arbiter = arbiter::Arbiter::new()?;
//!
//! arbiter.put("s3://bucket/greeting.txt", b"hello")?;
//! let bytes = arbiter.get("s3://bucket/greeting.txt")?;
//! assert_eq!(bytes, b"hello");
//!
//! for path in arbiter.resolve("s3://bucket/logs/**", false)? {
//!     println!("{}: {} bytes", path, arbiter.size(&path)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Everything blocks the calling thread; concurrency is plain OS
//! threads sharing the [`Arbiter`] value. Remote requests run through a
//! bounded pool of reusable HTTP handles with retry-with-backoff on
//! server errors.

pub mod driver;
pub mod drivers;
pub mod registry;

pub use arbiter_core::{crypto, ini, path, time, Error, Result, Time};
pub use arbiter_http::{Headers, Pool, Query, Resource, Response, TransportConfig};

pub use driver::Driver;
pub use registry::Arbiter;
