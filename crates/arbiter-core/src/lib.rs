//! Arbiter core - shared leaf utilities
//!
//! This crate holds everything the transport and driver layers both need
//! but that carries no I/O of its own:
//!
//! - **Error taxonomy** - the uniform [`Error`] kinds every driver maps into
//! - **Path routing** - `scheme[+profile]://` parsing and classification
//! - **Time** - the RFC-822 / ISO-8601 formats request signers emit
//! - **INI** - the credential-file dialect used by `~/.aws/credentials`
//! - **Crypto** - HMAC/SHA/MD5 digests and Base64/hex codecs for signers

pub mod crypto;
pub mod error;
pub mod ini;
pub mod path;
pub mod time;

pub use error::{Error, Result};
pub use time::Time;
