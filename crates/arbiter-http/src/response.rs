//! HTTP responses
//!
//! An immutable (status, body, headers) triple. The transport fabricates
//! a 500 for network-layer failures so the retry loop treats them like
//! any other server error; the `synthetic` marker keeps them
//! distinguishable once retries are exhausted and an [`Error`] must be
//! chosen.

use arbiter_core::Error;

use crate::{find_header, Headers};

/// The result of one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct Response {
    code: u16,
    data: Vec<u8>,
    headers: Headers,
    synthetic: bool,
}

impl Response {
    /// A response received from the wire.
    pub fn new(code: u16, data: Vec<u8>, headers: Headers) -> Self {
        Response {
            code,
            data,
            headers,
            synthetic: false,
        }
    }

    /// A fabricated 500 standing in for a transport failure; the message
    /// becomes the body.
    pub fn synthetic_error(message: impl Into<String>) -> Self {
        Response {
            code: 500,
            data: message.into().into_bytes(),
            headers: Headers::new(),
            synthetic: true,
        }
    }

    /// 2xx.
    pub fn ok(&self) -> bool {
        self.code / 100 == 2
    }

    /// 4xx.
    pub fn client_error(&self) -> bool {
        self.code / 100 == 4
    }

    /// 5xx - the only retryable class.
    pub fn server_error(&self) -> bool {
        self.code / 100 == 5
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The `Content-Length` header, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }

    /// The body as lossy UTF-8, for diagnostics.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Classifies a non-2xx response into the error taxonomy.
    pub fn to_error(&self, context: impl Into<String>) -> Error {
        let mut context = context.into();
        if !self.data.is_empty() {
            let body = self.text();
            let body = body.trim();
            if !body.is_empty() {
                context = format!("{}: {}", context, body);
            }
        }
        Error::from_status(self.code, self.synthetic, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifiers() {
        assert!(Response::new(200, vec![], Headers::new()).ok());
        assert!(Response::new(204, vec![], Headers::new()).ok());
        assert!(Response::new(404, vec![], Headers::new()).client_error());
        assert!(Response::new(503, vec![], Headers::new()).server_error());
        assert!(!Response::new(301, vec![], Headers::new()).ok());
    }

    #[test]
    fn test_synthetic_maps_to_network_error() {
        let res = Response::synthetic_error("connection refused");
        assert!(res.server_error());
        assert!(matches!(res.to_error("GET x"), Error::Network(_)));

        let real = Response::new(500, vec![], Headers::new());
        assert!(matches!(real.to_error("GET x"), Error::Backend(_)));
    }

    #[test]
    fn test_content_length() {
        let mut headers = Headers::new();
        headers.insert("content-length".to_string(), "123".to_string());
        let res = Response::new(200, vec![], headers);
        assert_eq!(res.content_length(), Some(123));
    }

    #[test]
    fn test_error_includes_body() {
        let res = Response::new(409, b"already exists".to_vec(), Headers::new());
        let err = res.to_error("PUT x");
        assert_eq!(err.to_string(), "client error (409): PUT x: already exists");
    }
}
