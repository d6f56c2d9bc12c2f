//! AWS Signature Version 4
//!
//! Canonical request → string-to-sign → HMAC-SHA256 key chain →
//! `Authorization` header, exactly as AWS documents it. The pieces are
//! split out so each stage is testable against the published vectors.

use arbiter_core::{crypto, time, Time};
use arbiter_http::{sanitize_component, Headers, Query};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credential material for one signing operation. Stateless: every
/// request signs independently.
pub struct V4<'a> {
    pub access: &'a str,
    pub secret: &'a str,
    pub token: Option<&'a str>,
    pub region: &'a str,
}

impl V4<'_> {
    /// Signs a request and returns the full header set to send,
    /// `Authorization` included. `uri` is the canonical (already
    /// percent-encoded, `/`-preserving) path; `query` holds raw values,
    /// encoded here the same way the request line must encode them.
    pub fn sign(
        &self,
        verb: &str,
        host: &str,
        uri: &str,
        query: &Query,
        user_headers: &Headers,
        body: &[u8],
        time: &Time,
    ) -> Headers {
        let payload_hash = crypto::sha256_hex(body);
        let amz_date = time.format(time::ISO8601_BASIC);
        let date = time.format(time::DATE_BASIC);

        let mut headers = user_headers.clone();
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        if let Some(token) = self.token {
            headers.insert("x-amz-security-token".to_string(), token.to_string());
        }

        let (canonical_headers, signed_headers) = canonicalize_headers(&headers);
        let request = canonical_request(
            verb,
            uri,
            &canonical_query(query),
            &canonical_headers,
            &signed_headers,
            &payload_hash,
        );
        let scope = scope(&date, self.region, "s3");
        let to_sign = string_to_sign(&amz_date, &scope, &request);
        let key = signing_key(self.secret, &date, self.region, "s3");
        let signature = crypto::encode_hex(&crypto::hmac_sha256(&key, to_sign.as_bytes()));

        headers.insert(
            "Authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access, scope, signed_headers, signature
            ),
        );
        headers
    }
}

/// Sorted `k=v&...` with keys and values percent-encoded. Used both for
/// signing and for the request line, so the two cannot drift apart.
pub fn canonical_query(query: &Query) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", sanitize_component(k), sanitize_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lower-cases names, trims values, sorts. Returns the canonical block
/// (one `name:value\n` per header) and the `;`-joined signed-header list.
fn canonicalize_headers(headers: &Headers) -> (String, String) {
    let mut entries: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    entries.sort();

    let canonical = entries
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect::<String>();
    let signed = entries
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}

fn canonical_request(
    verb: &str,
    uri: &str,
    canonical_query: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        verb, uri, canonical_query, canonical_headers, signed_headers, payload_hash
    )
}

fn scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, service)
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        crypto::sha256_hex(canonical_request.as_bytes())
    )
}

/// The kSecret → kDate → kRegion → kService → kSigning HMAC chain.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let key = crypto::hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let key = crypto::hmac_sha256(&key, region.as_bytes());
    let key = crypto::hmac_sha256(&key, service.as_bytes());
    crypto::hmac_sha256(&key, b"aws4_request")
}
