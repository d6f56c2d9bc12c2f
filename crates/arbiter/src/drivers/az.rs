//! Azure Blob Storage driver
//!
//! Two authorization modes. With a SAS token configured, its query
//! parameters are merged into every request and nothing is signed. With
//! a storage key, each request carries a SharedKey `Authorization`
//! header computed over the canonicalized headers and resource. Copy is
//! the one operation with a native server-side primitive
//! (`x-ms-copy-source`).

use std::sync::Arc;

use arbiter_core::{crypto, path, time as timefmt, Error, Result, Time};
use arbiter_http::{find_header, sanitize, sanitize_component, Headers, Pool, Query, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::drivers::http::Http;

const API_VERSION: &str = "2019-12-12";

/// The Azure Blob backend.
pub struct Az {
    http: Http,
    profile: String,
    account: String,
    key: Option<String>,
    sas: Option<Query>,
    base_url: String,
    precheck: bool,
    base_headers: Headers,
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Resource {
    container: String,
    blob: String,
}

impl Resource {
    fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((container, blob)) => Resource {
                container: container.to_string(),
                blob: blob.to_string(),
            },
            None => Resource {
                container: raw.to_string(),
                blob: String::new(),
            },
        }
    }

    /// The URI path below the account: `/container[/blob]`, encoded.
    fn uri_path(&self) -> String {
        if self.blob.is_empty() {
            format!("/{}", self.container)
        } else {
            format!("/{}/{}", self.container, sanitize(&self.blob))
        }
    }

    fn url(&self, base: &str) -> String {
        format!("{}{}", base, self.uri_path())
    }
}

impl Az {
    /// Builds the driver from configuration and the `AZURE_*`/`AZ_*`
    /// environment. The storage account is mandatory; beyond it, either
    /// an access key or a SAS token must be present or the driver is not
    /// registered.
    pub fn create(pool: Arc<Pool>, options: &Value, profile: &str) -> Result<Option<Az>> {
        let Some(account) = setting(options, "account", &["AZURE_STORAGE_ACCOUNT", "AZ_STORAGE_ACCOUNT"])
        else {
            return Ok(None);
        };

        let key = setting(
            options,
            "key",
            &["AZURE_STORAGE_ACCESS_KEY", "AZ_STORAGE_ACCESS_KEY"],
        );
        let sas = setting(options, "sas", &["AZURE_SAS_TOKEN", "AZ_SAS_TOKEN"])
            .map(|raw| parse_sas(&raw));
        if key.is_none() && sas.is_none() {
            debug!(account = %account, "no azure key or sas token; driver not registered");
            return Ok(None);
        }

        let service = setting(
            options,
            "service",
            &[
                "AZURE_SERVICE",
                "AZURE_DEFAULT_SERVICE",
                "AZ_SERVICE",
                "AZ_DEFAULT_SERVICE",
            ],
        )
        .unwrap_or_else(|| "blob".to_string());
        let endpoint = setting(options, "endpoint", &["AZURE_ENDPOINT", "AZ_ENDPOINT"])
            .unwrap_or_else(|| "core.windows.net".to_string());

        // An endpoint with a scheme is an emulator-style base URL and
        // addresses the account by path instead of subdomain.
        let base_url = if endpoint.contains(path::DELIMITER) {
            format!("{}/{}", endpoint.trim_end_matches('/'), account)
        } else {
            format!("https://{}.{}.{}", account, service, endpoint)
        };

        let mut base_headers = Headers::new();
        match options.get("headers") {
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    if let Some(value) = value.as_str() {
                        base_headers.insert(name.clone(), value.to_string());
                    }
                }
            }
            Some(_) => debug!("az headers option is not an object; skipping"),
            None => {}
        }

        Ok(Some(Az {
            http: Http::new(pool, "https"),
            profile: profile.to_string(),
            account,
            key,
            sas,
            base_url,
            precheck: options
                .get("precheck")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            base_headers,
            verbose: options
                .get("verbose")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }))
    }

    fn shared_key_headers(
        &self,
        verb: &str,
        resource: &Resource,
        query: &Query,
        user_headers: &Headers,
        body_len: usize,
        time: &Time,
    ) -> Result<Headers> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Config("azure shared key not configured".to_string()))?;

        let mut headers = user_headers.clone();
        let mut ms = Headers::new();
        ms.insert("x-ms-date".to_string(), time.format(timefmt::RFC822));
        ms.insert("x-ms-version".to_string(), API_VERSION.to_string());

        if verb == "PUT" || verb == "POST" {
            if find_header(&headers, "Content-Type").is_none() {
                headers.insert(
                    "Content-Type".to_string(),
                    "application/octet-stream".to_string(),
                );
            }
            headers.insert("Content-Length".to_string(), body_len.to_string());
            ms.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());
        }

        // Canonical headers: every x-ms-* header plus Content-MD5,
        // lower-cased, trimmed, sorted.
        let mut canonical: Headers = ms
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        for (name, value) in &headers {
            let lower = name.to_ascii_lowercase();
            if lower.starts_with("x-ms-") || lower == "content-md5" {
                canonical.insert(lower, value.trim().to_string());
            }
        }
        let canonical_headers = canonical
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut canonical_resource = format!("/{}{}", self.account, resource.uri_path());
        for (name, value) in query {
            canonical_resource.push_str(&format!("\n{}:{}", sanitize_component(name), value));
        }

        let to_sign = string_to_sign(verb, &headers, &canonical_headers, &canonical_resource);
        let signature = crypto::encode_base64(&crypto::hmac_sha256(
            &crypto::decode_base64(key)?,
            to_sign.as_bytes(),
        ));

        headers.insert(
            "Authorization".to_string(),
            format!("SharedKey {}:{}", self.account, signature),
        );
        headers.extend(ms);
        Ok(headers)
    }

    fn request(
        &self,
        verb: &str,
        raw: &str,
        user_headers: &Headers,
        query: &Query,
        body: &[u8],
    ) -> Result<Response> {
        let resource = Resource::parse(raw);
        let url = resource.url(&self.base_url);

        let mut headers = self.base_headers.clone();
        headers.extend(user_headers.clone());

        if let Some(sas) = &self.sas {
            if verb == "PUT" || verb == "POST" {
                if find_header(&headers, "Content-Type").is_none() {
                    headers.insert(
                        "Content-Type".to_string(),
                        "application/octet-stream".to_string(),
                    );
                }
                headers.insert("Content-Length".to_string(), body.len().to_string());
                headers.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());
            }
            let mut merged = sas.clone();
            merged.extend(query.clone());
            self.dispatch(verb, &url, &headers, &merged, body)
        } else {
            let signed =
                self.shared_key_headers(verb, &resource, query, &headers, body.len(), &Time::now())?;
            self.dispatch(verb, &url, &signed, query, body)
        }
    }

    fn dispatch(
        &self,
        verb: &str,
        url: &str,
        headers: &Headers,
        query: &Query,
        body: &[u8],
    ) -> Result<Response> {
        match verb {
            "GET" => self.http.internal_get(url, headers, query),
            "HEAD" => self.http.internal_head(url, headers, query),
            "PUT" => self.http.internal_put(url, body, headers, query),
            other => Err(Error::Unsupported(format!("az verb {}", other))),
        }
    }

    fn put_with(&self, path: &str, data: &[u8], extra: &Headers) -> Result<()> {
        let mut headers = extra.clone();
        if path.ends_with(".json") {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if !data.is_empty() {
            headers.insert(
                "Content-MD5".to_string(),
                crypto::encode_base64(&crypto::md5(data)),
            );
        }

        let res = self.request("PUT", path, &headers, &Query::new(), data)?;
        if res.ok() {
            Ok(())
        } else {
            Err(res.to_error(format!("could not write az://{}", path)))
        }
    }
}

/// The SharedKey string-to-sign: verb, eleven standard-header lines
/// (zero `Content-Length` emitted as empty), canonical headers, and the
/// canonical resource.
fn string_to_sign(
    verb: &str,
    headers: &Headers,
    canonical_headers: &str,
    canonical_resource: &str,
) -> String {
    let get = |name: &str| find_header(headers, name).unwrap_or("");
    let content_length = match get("Content-Length") {
        "" | "0" => "",
        length => length,
    };

    format!(
        "{verb}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}",
        get("Content-Encoding"),
        get("Content-Language"),
        content_length,
        get("Content-MD5"),
        get("Content-Type"),
        get("Date"),
        get("If-Modified-Since"),
        get("If-Match"),
        get("If-None-Match"),
        get("If-Unmodified-Since"),
        get("Range"),
        canonical_headers,
        canonical_resource,
    )
}

/// Splits a SAS token string (with or without a leading `?`) into query
/// parameters.
fn parse_sas(raw: &str) -> Query {
    raw.trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn setting(options: &Value, key: &str, env_keys: &[&str]) -> Option<String> {
    if let Some(value) = options.get(key).and_then(Value::as_str) {
        return Some(value.to_string());
    }
    env_keys
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    blobs: Option<Blobs>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Blobs {
    #[serde(default)]
    blob: Vec<Blob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Blob {
    name: String,
}

impl Driver for Az {
    fn protocol(&self) -> &str {
        "az"
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        if self.precheck {
            let head = self.request("HEAD", path, &Headers::new(), &Query::new(), b"")?;
            if !head.ok() {
                return Err(head.to_error(format!("could not read az://{}", path)));
            }
        }

        let res = self.request("GET", path, &Headers::new(), &Query::new(), b"")?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read az://{}", path)))
        }
    }

    fn get_range(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let mut headers = Headers::new();
        headers.insert(
            "Range".to_string(),
            format!("bytes={}-{}", offset, offset + length - 1),
        );
        let res = self.request("GET", path, &headers, &Query::new(), b"")?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read range of az://{}", path)))
        }
    }

    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        self.put_with(path, data, &Headers::new())
    }

    fn size(&self, path: &str) -> Result<u64> {
        let res = self.request("HEAD", path, &Headers::new(), &Query::new(), b"")?;
        if !res.ok() {
            return Err(res.to_error(format!("could not stat az://{}", path)));
        }
        res.content_length()
            .ok_or_else(|| Error::Backend(format!("no Content-Length from az://{}", path)))
    }

    /// Server-side copy: a zero-body put to `dst` carrying the source
    /// blob URL in `x-ms-copy-source`.
    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let mut headers = Headers::new();
        headers.insert(
            "x-ms-copy-source".to_string(),
            Resource::parse(src).url(&self.base_url),
        );
        self.put_with(dst, &[], &headers)
    }

    fn glob(&self, path: &str, verbose: bool) -> Result<Vec<String>> {
        let pattern = path::parse_glob(path)
            .ok_or_else(|| Error::Config(format!("invalid glob pattern: {}", path)))?;
        let resource = Resource::parse(pattern.prefix);
        let prefix = resource.blob.clone();

        let mut query = Query::new();
        query.insert("restype".to_string(), "container".to_string());
        query.insert("comp".to_string(), "list".to_string());
        if !prefix.is_empty() {
            query.insert("prefix".to_string(), prefix.clone());
        }

        let mut results = Vec::new();
        loop {
            if verbose || self.verbose {
                debug!(container = %resource.container, "listing page");
            }

            let res = self.request("GET", &resource.container, &Headers::new(), &query, b"")?;
            if !res.ok() {
                return Err(res.to_error(format!("could not list az://{}", resource.container)));
            }

            let listing: EnumerationResults = quick_xml::de::from_str(&res.text())
                .map_err(|e| Error::Backend(format!("malformed container listing: {}", e)))?;
            let blobs = listing
                .blobs
                .ok_or_else(|| Error::Backend("container listing without Blobs node".to_string()))?;

            for blob in blobs.blob {
                let relative = blob.name.get(prefix.len()..).unwrap_or("");
                if pattern.recursive || !relative.contains('/') {
                    results.push(format!(
                        "{}://{}/{}",
                        self.profiled_protocol(),
                        resource.container,
                        blob.name
                    ));
                }
            }

            match listing.next_marker {
                Some(marker) if !marker.is_empty() => {
                    query.insert("marker".to_string(), marker);
                }
                _ => break,
            }
        }

        Ok(results)
    }
}
