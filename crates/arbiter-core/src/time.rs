//! Timestamps in the formats request signers emit
//!
//! S3's SigV4 wants ISO-8601 basic (`20260801T120000Z`) plus a bare date
//! for the credential scope; Azure's SharedKey wants RFC-822 with a
//! literal `GMT`; token expiry math wants Unix seconds. [`Time`] wraps a
//! UTC instant and produces all of them.

use std::fmt;
use std::ops::Sub;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// `2016-03-18T04:24:54Z`
pub const ISO8601: &str = "%Y-%m-%dT%H:%M:%SZ";

/// `20160318T042454Z` - the `x-amz-date` form.
pub const ISO8601_BASIC: &str = "%Y%m%dT%H%M%SZ";

/// `20160318` - the SigV4 credential-scope date.
pub const DATE_BASIC: &str = "%Y%m%d";

/// `Fri, 18 Mar 2016 04:24:54 GMT` - the `x-ms-date` form.
pub const RFC822: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A UTC instant with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time(DateTime<Utc>);

impl Time {
    /// The current instant.
    pub fn now() -> Self {
        Time(Utc::now())
    }

    /// Builds a `Time` from Unix seconds.
    pub fn from_unix(secs: i64) -> Self {
        Time(
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }

    /// Parses an ISO-8601 timestamp like `2016-03-18T04:24:54Z`.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_format(s, ISO8601)
    }

    /// Parses a timestamp in the given `strftime` format, interpreted as UTC.
    pub fn parse_format(s: &str, format: &str) -> Result<Self> {
        let naive = NaiveDateTime::parse_from_str(s, format)
            .map_err(|e| Error::Config(format!("failed to parse {:?} as {}: {}", s, format, e)))?;
        Ok(Time(naive.and_utc()))
    }

    /// Formats in the given `strftime` format.
    pub fn format(&self, format: &str) -> String {
        self.0.format(format).to_string()
    }

    /// Seconds since the Unix epoch.
    pub fn as_unix(&self) -> i64 {
        self.0.timestamp()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(ISO8601))
    }
}

impl Sub for Time {
    type Output = i64;

    /// Difference in whole seconds.
    fn sub(self, other: Time) -> i64 {
        self.as_unix() - other.as_unix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let a = Time::now();
        let b = Time::parse(&a.to_string()).unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a - b, 0);
    }

    #[test]
    fn test_epoch() {
        let epoch = Time::parse("1970-01-01T00:00:00Z").unwrap();
        assert_eq!(epoch.as_unix(), 0);
        assert_eq!(Time::from_unix(0), epoch);
    }

    #[test]
    fn test_difference() {
        let x = Time::parse("2016-03-18T03:14:42Z").unwrap();
        let y = Time::parse("2016-03-18T04:24:54Z").unwrap();
        let delta = 1 * 60 * 60 + 10 * 60 + 12;
        assert_eq!(y - x, delta);
        assert_eq!(x - y, -delta);
    }

    #[test]
    fn test_signer_formats() {
        let t = Time::parse("2015-08-30T12:36:00Z").unwrap();
        assert_eq!(t.format(ISO8601_BASIC), "20150830T123600Z");
        assert_eq!(t.format(DATE_BASIC), "20150830");
        assert_eq!(t.format(RFC822), "Sun, 30 Aug 2015 12:36:00 GMT");
    }

    #[test]
    fn test_parse_failure() {
        assert!(Time::parse("yesterday-ish").is_err());
    }
}
