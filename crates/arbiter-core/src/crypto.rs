//! Digests and codecs used by the request signers
//!
//! Thin helpers over the RustCrypto crates so signer code reads as the
//! algorithms are written down in the provider docs: SigV4 is an
//! HMAC-SHA256 chain over hex digests, SharedKey is HMAC-SHA256 over a
//! Base64-decoded key, Content-MD5 is a Base64 MD5.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Lower-case hex SHA-256, the form SigV4 embeds in canonical requests.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// MD5 digest.
pub fn md5(data: &[u8]) -> Vec<u8> {
    Md5::digest(data).to_vec()
}

/// Standard (padded) Base64 encoding.
pub fn encode_base64(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Standard Base64 decoding.
pub fn decode_base64(s: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(s)
        .map_err(|e| Error::Crypto(format!("invalid base64: {}", e)))
}

/// Lower-case hex encoding.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}
