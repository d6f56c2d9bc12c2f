//! Amazon S3 driver
//!
//! Every request is SigV4-signed (see [`sign`]); credentials come from
//! the discovery chain in [`creds`]. Without an endpoint override the
//! driver speaks virtual-hosted style to
//! `{bucket}.s3.{region}.amazonaws.com`; an override (MinIO and friends)
//! switches to path-style URLs.

mod creds;
mod sign;

pub use creds::Credentials;

use std::sync::Arc;

use arbiter_core::{path, Error, Result, Time};
use arbiter_http::{sanitize, Headers, Pool, Query, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::drivers::http::Http;
use sign::{canonical_query, V4};

/// The S3 backend.
pub struct S3 {
    http: Http,
    profile: String,
    creds: Credentials,
    region: String,
    endpoint: Option<String>,
    verbose: bool,
}

/// A driver-relative path split at the first `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resource {
    bucket: String,
    object: String,
}

impl Resource {
    fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((bucket, object)) => Resource {
                bucket: bucket.to_string(),
                object: object.to_string(),
            },
            None => Resource {
                bucket: raw.to_string(),
                object: String::new(),
            },
        }
    }
}

impl S3 {
    /// Builds the driver if the credential chain yields anything;
    /// `Ok(None)` means S3 is simply not available in this process.
    pub fn create(pool: Arc<Pool>, options: &Value, profile: &str) -> Result<Option<S3>> {
        let Some(creds) = creds::resolve(options, profile, &pool) else {
            return Ok(None);
        };

        let region = creds::region(options, profile);
        let endpoint = options.get("endpoint").and_then(Value::as_str).map(|e| {
            let e = e.trim_end_matches('/');
            if e.contains(path::DELIMITER) {
                e.to_string()
            } else {
                format!("https://{}", e)
            }
        });
        let verbose = options
            .get("verbose")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Some(S3 {
            http: Http::new(pool, "https"),
            profile: profile.to_string(),
            creds,
            region,
            endpoint,
            verbose,
        }))
    }

    /// Full URL, host (for signing), and canonical URI of a resource.
    fn address(&self, resource: &Resource) -> (String, String, String) {
        let object = sanitize(&resource.object);
        match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .split(path::DELIMITER)
                    .nth(1)
                    .unwrap_or(endpoint)
                    .to_string();
                let uri = if object.is_empty() {
                    format!("/{}", resource.bucket)
                } else {
                    format!("/{}/{}", resource.bucket, object)
                };
                (format!("{}{}", endpoint, uri), host, uri)
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", resource.bucket, self.region);
                let uri = format!("/{}", object);
                (format!("https://{}{}", host, uri), host, uri)
            }
        }
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
        let (url, host, uri) = self.address(&resource);

        let signer = V4 {
            access: &self.creds.access,
            secret: &self.creds.secret,
            token: self.creds.token.as_deref(),
            region: &self.region,
        };
        let headers = signer.sign(verb, &host, &uri, query, user_headers, body, &Time::now());

        // The canonical query doubles as the request query, so the signed
        // and transmitted forms are byte-identical.
        let url = match canonical_query(query) {
            q if q.is_empty() => url,
            q => format!("{}?{}", url, q),
        };

        let none = Query::new();
        match verb {
            "GET" => self.http.internal_get(&url, &headers, &none),
            "HEAD" => self.http.internal_head(&url, &headers, &none),
            "PUT" => self.http.internal_put(&url, body, &headers, &none),
            other => Err(Error::Unsupported(format!("s3 verb {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    is_truncated: Option<bool>,
    #[serde(default)]
    contents: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
}

impl Driver for S3 {
    fn protocol(&self) -> &str {
        "s3"
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let res = self.request("GET", path, &Headers::new(), &Query::new(), b"")?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read s3://{}", path)))
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
            Err(res.to_error(format!("could not read range of s3://{}", path)))
        }
    }

    fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/octet-stream".to_string(),
        );
        let res = self.request("PUT", path, &headers, &Query::new(), data)?;
        if res.ok() {
            Ok(())
        } else {
            Err(res.to_error(format!("could not write s3://{}", path)))
        }
    }

    fn size(&self, path: &str) -> Result<u64> {
        let res = self.request("HEAD", path, &Headers::new(), &Query::new(), b"")?;
        if !res.ok() {
            return Err(res.to_error(format!("could not stat s3://{}", path)));
        }
        res.content_length()
            .ok_or_else(|| Error::Backend(format!("no Content-Length from s3://{}", path)))
    }

    fn glob(&self, path: &str, verbose: bool) -> Result<Vec<String>> {
        let pattern = path::parse_glob(path)
            .ok_or_else(|| Error::Config(format!("invalid glob pattern: {}", path)))?;
        let resource = Resource::parse(pattern.prefix);
        let prefix = resource.object.clone();

        let mut query = Query::new();
        if !prefix.is_empty() {
            query.insert("prefix".to_string(), prefix.clone());
        }

        let mut results = Vec::new();
        loop {
            if verbose || self.verbose {
                debug!(bucket = %resource.bucket, "listing page");
            }

            let res = self.request("GET", &resource.bucket, &Headers::new(), &query, b"")?;
            if !res.ok() {
                return Err(res.to_error(format!("could not list s3://{}", resource.bucket)));
            }

            let listing: ListBucketResult = quick_xml::de::from_str(&res.text())
                .map_err(|e| Error::Backend(format!("malformed bucket listing: {}", e)))?;

            let mut last_key = None;
            for entry in listing.contents {
                // The prefix may span directories; non-recursive globs
                // only take the level directly after it.
                let relative = entry.key.get(prefix.len()..).unwrap_or("");
                if pattern.recursive || !relative.contains('/') {
                    results.push(format!(
                        "{}://{}/{}",
                        self.profiled_protocol(),
                        resource.bucket,
                        entry.key
                    ));
                }
                last_key = Some(entry.key);
            }

            if listing.is_truncated == Some(true) {
                let marker = last_key.ok_or_else(|| {
                    Error::Backend("truncated bucket listing without keys".to_string())
                })?;
                query.insert("marker".to_string(), marker);
            } else {
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_http::TransportConfig;
    use serde_json::json;

    fn pool() -> Arc<Pool> {
        Arc::new(Pool::new(1, 0, &TransportConfig::default()).unwrap())
    }

    fn driver(endpoint: Option<&str>) -> S3 {
        let mut options = json!({
            "access": "AKIDEXAMPLE",
            "secret": "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "region": "eu-central-1"
        });
        if let Some(endpoint) = endpoint {
            options["endpoint"] = json!(endpoint);
        }
        S3::create(pool(), &options, "default").unwrap().unwrap()
    }

    #[test]
    fn test_resource_parse() {
        assert_eq!(
            Resource::parse("bucket/dir/obj.txt"),
            Resource {
                bucket: "bucket".to_string(),
                object: "dir/obj.txt".to_string()
            }
        );
        assert_eq!(
            Resource::parse("bucket"),
            Resource {
                bucket: "bucket".to_string(),
                object: String::new()
            }
        );
    }

    #[test]
    fn test_virtual_hosted_address() {
        let s3 = driver(None);
        let (url, host, uri) = s3.address(&Resource::parse("bucket/a b.txt"));
        assert_eq!(host, "bucket.s3.eu-central-1.amazonaws.com");
        assert_eq!(uri, "/a%20b.txt");
        assert_eq!(url, "https://bucket.s3.eu-central-1.amazonaws.com/a%20b.txt");
    }

    #[test]
    fn test_path_style_address_with_endpoint() {
        let s3 = driver(Some("http://127.0.0.1:9000"));
        let (url, host, uri) = s3.address(&Resource::parse("bucket/obj.txt"));
        assert_eq!(host, "127.0.0.1:9000");
        assert_eq!(uri, "/bucket/obj.txt");
        assert_eq!(url, "http://127.0.0.1:9000/bucket/obj.txt");
    }

    #[test]
    fn test_schemeless_endpoint_defaults_to_https() {
        let s3 = driver(Some("minio.internal:9000"));
        let (url, _, _) = s3.address(&Resource::parse("b/o"));
        assert_eq!(url, "https://minio.internal:9000/b/o");
    }

    #[test]
    fn test_listing_parse() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Prefix>dir/</Prefix>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>dir/one.txt</Key><Size>10</Size></Contents>
  <Contents><Key>dir/sub/two.txt</Key><Size>20</Size></Contents>
</ListBucketResult>"#;
        let listing: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(listing.is_truncated, Some(true));
        assert_eq!(listing.contents.len(), 2);
        assert_eq!(listing.contents[0].key, "dir/one.txt");
    }

    #[test]
    fn test_empty_listing_parse() {
        let xml = r#"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let listing: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(listing.is_truncated, Some(false));
        assert!(listing.contents.is_empty());
    }
}
