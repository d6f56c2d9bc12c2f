//! A reusable HTTP handle
//!
//! One [`Handle`] wraps one persistent blocking client whose connection
//! state is reused across requests. Handles are built once by the pool
//! and borrowed exclusively, so per-request setup is just URL and header
//! assembly. Network-layer failures never error out of a verb method;
//! they come back as synthetic 500 responses so the pool's retry loop
//! handles them uniformly.

use std::time::Duration;

use arbiter_core::{Error, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect;
use tracing::{debug, warn};

use crate::{build_query_string, Headers, Query, Response, TransportConfig};

/// Connection establishment deadline, separate from the data timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// One exclusive, reusable client connection state.
pub struct Handle {
    client: Client,
    verbose: bool,
}

impl Handle {
    /// Builds a handle from the transport configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout_duration())
            .redirect(if config.follow_redirect {
                redirect::Policy::limited(10)
            } else {
                redirect::Policy::none()
            })
            .danger_accept_invalid_certs(!config.verify_peer);

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| Error::io(path.display().to_string(), e))?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| Error::Config(format!("invalid CA bundle {:?}: {}", path, e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(path) = &config.ca_info {
            let pem = std::fs::read(path).map_err(|e| Error::io(path.display().to_string(), e))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("invalid CA certificate {:?}: {}", path, e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Handle {
            client,
            verbose: config.verbose,
        })
    }

    pub fn get(&self, url: &str, headers: &Headers, query: &Query) -> Result<Response> {
        let url = full_url(url, query);
        if self.verbose {
            debug!(%url, "GET");
        }
        let request = self.client.get(&url).headers(header_map(headers)?);
        self.execute(request, true)
    }

    pub fn head(&self, url: &str, headers: &Headers, query: &Query) -> Result<Response> {
        let url = full_url(url, query);
        if self.verbose {
            debug!(%url, "HEAD");
        }
        let request = self.client.head(&url).headers(header_map(headers)?);
        self.execute(request, false)
    }

    pub fn put(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        let url = full_url(url, query);
        if self.verbose {
            debug!(%url, bytes = body.len(), "PUT");
        }
        let request = self
            .client
            .put(&url)
            .headers(header_map(headers)?)
            .body(body.to_vec());
        self.execute(request, true)
    }

    pub fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
        query: &Query,
    ) -> Result<Response> {
        let url = full_url(url, query);
        if self.verbose {
            debug!(%url, bytes = body.len(), "POST");
        }
        let request = self
            .client
            .post(&url)
            .headers(header_map(headers)?)
            .body(body.to_vec());
        self.execute(request, true)
    }

    /// Runs the request, collecting status, trimmed headers, and body.
    /// Transport failures become synthetic 500s; a gzip body that cannot
    /// be decoded is a hard error rather than raw bytes.
    fn execute(&self, request: RequestBuilder, read_body: bool) -> Result<Response> {
        let res = match request.send() {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "transport failure");
                return Ok(Response::synthetic_error(e.to_string()));
            }
        };

        let code = res.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in res.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
            headers.insert(name.as_str().to_string(), value);
        }

        let data = if read_body {
            match res.bytes() {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => {
                    warn!(error = %e, "body transfer failure");
                    return Ok(Response::synthetic_error(e.to_string()));
                }
            }
        } else {
            Vec::new()
        };

        let data = match crate::find_header(&headers, "Content-Encoding") {
            Some(encoding) if encoding.eq_ignore_ascii_case("gzip") && !data.is_empty() => {
                decompress(&data)?
            }
            _ => data,
        };

        Ok(Response::new(code, data, headers))
    }
}

fn full_url(url: &str, query: &Query) -> String {
    let mut full = url.to_string();
    full.push_str(&build_query_string(query));
    full
}

fn header_map(headers: &Headers) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, val) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {:?}: {}", key, e)))?;
        let value = HeaderValue::from_str(val)
            .map_err(|e| Error::Config(format!("invalid value for header {:?}: {}", key, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(feature = "gzip")]
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::with_capacity(data.len() * 2);
    flate2::read::GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::Backend(format!("failed to decompress gzip body: {}", e)))?;
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
fn decompress(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::Backend(
        "response is gzip-encoded, but gzip support was not built".to_string(),
    ))
}
