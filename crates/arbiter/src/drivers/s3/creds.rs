//! AWS credential discovery
//!
//! First match wins: explicit configuration, environment, the shared
//! credentials file, EC2 instance metadata, the ECS container endpoint,
//! and finally an STS web-identity exchange. The network probes run with
//! zero retries so a non-EC2 host fails them in one connect timeout.

use arbiter_core::{ini, Error, Result};
use arbiter_http::{sanitize_component, Headers, Pool, Query};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::drivers::fs::expand_tilde;

const IMDS_URL: &str = "http://169.254.169.254/latest/meta-data/iam/security-credentials/";
const ECS_BASE: &str = "http://169.254.170.2";
const STS_URL: &str = "https://sts.amazonaws.com/";

/// A resolved AWS credential set.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access: String,
    pub secret: String,
    pub token: Option<String>,
}

/// Walks the credential chain. `None` means the driver should simply not
/// be registered.
pub fn resolve(options: &Value, profile: &str, pool: &Pool) -> Option<Credentials> {
    if let Some(creds) = from_options(options) {
        debug!("s3 credentials from configuration");
        return Some(creds);
    }
    if let Some(creds) = from_env() {
        debug!("s3 credentials from environment");
        return Some(creds);
    }
    if let Some(creds) = from_shared_file(profile) {
        debug!("s3 credentials from shared credentials file");
        return Some(creds);
    }
    if let Some(creds) = from_instance_metadata(pool) {
        debug!("s3 credentials from instance metadata");
        return Some(creds);
    }
    if let Some(creds) = from_container_endpoint(pool) {
        debug!("s3 credentials from container endpoint");
        return Some(creds);
    }
    match from_web_identity(pool) {
        Ok(Some(creds)) => {
            debug!("s3 credentials from web identity");
            Some(creds)
        }
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, "web identity exchange failed");
            None
        }
    }
}

/// The bucket region: configuration, environment, then the shared config
/// file, defaulting to `us-east-1`.
pub fn region(options: &Value, profile: &str) -> String {
    if let Some(region) = options.get("region").and_then(Value::as_str) {
        return region.to_string();
    }
    if let Some(region) = env("AWS_REGION").or_else(|| env("AWS_DEFAULT_REGION")) {
        return region;
    }
    if let Some(region) = region_from_config_file(profile) {
        return region;
    }
    "us-east-1".to_string()
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn from_options(options: &Value) -> Option<Credentials> {
    let access = options.get("access")?.as_str()?.to_string();
    let secret = options.get("secret")?.as_str()?.to_string();
    let token = options
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Credentials {
        access,
        secret,
        token,
    })
}

fn from_env() -> Option<Credentials> {
    Some(Credentials {
        access: env("AWS_ACCESS_KEY_ID")?,
        secret: env("AWS_SECRET_ACCESS_KEY")?,
        token: env("AWS_SESSION_TOKEN"),
    })
}

/// The profile whose section is read: an explicit driver profile wins,
/// then `AWS_PROFILE`/`AWS_DEFAULT_PROFILE`, then `default`.
fn file_profile(profile: &str) -> String {
    if profile != arbiter_core::path::DEFAULT_PROFILE {
        return profile.to_string();
    }
    env("AWS_PROFILE")
        .or_else(|| env("AWS_DEFAULT_PROFILE"))
        .unwrap_or_else(|| "default".to_string())
}

fn from_shared_file(profile: &str) -> Option<Credentials> {
    let contents = std::fs::read_to_string(expand_tilde("~/.aws/credentials")).ok()?;
    let parsed = ini::parse(&contents);
    let section = parsed.get(&file_profile(profile))?;
    Some(Credentials {
        access: section.get("aws_access_key_id")?.clone(),
        secret: section.get("aws_secret_access_key")?.clone(),
        token: section.get("aws_session_token").cloned(),
    })
}

fn region_from_config_file(profile: &str) -> Option<String> {
    let contents = std::fs::read_to_string(expand_tilde("~/.aws/config")).ok()?;
    let parsed = ini::parse(&contents);
    let profile = file_profile(profile);
    // The config file spells non-default sections "[profile name]".
    let section = parsed
        .get(&profile)
        .or_else(|| parsed.get(&format!("profile {}", profile)))?;
    section.get("region").cloned()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

impl From<RoleCredentials> for Credentials {
    fn from(role: RoleCredentials) -> Self {
        Credentials {
            access: role.access_key_id,
            secret: role.secret_access_key,
            token: role.token,
        }
    }
}

fn probe(pool: &Pool, url: &str) -> Option<Vec<u8>> {
    let res = pool
        .acquire()
        .get_with_retry(url, &Headers::new(), &Query::new(), 0)
        .ok()?;
    res.ok().then(|| res.into_data())
}

fn from_instance_metadata(pool: &Pool) -> Option<Credentials> {
    // Standard SDK opt-out; spares non-EC2 hosts the probe timeout.
    if env("AWS_EC2_METADATA_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return None;
    }

    let listing = probe(pool, IMDS_URL)?;
    let listing = String::from_utf8_lossy(&listing);
    let role = listing.lines().next()?.trim();
    if role.is_empty() {
        return None;
    }

    let body = probe(pool, &format!("{}{}", IMDS_URL, role))?;
    let role: RoleCredentials = serde_json::from_slice(&body).ok()?;
    Some(role.into())
}

fn from_container_endpoint(pool: &Pool) -> Option<Credentials> {
    let relative = env("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")?;
    let body = probe(pool, &format!("{}{}", ECS_BASE, relative))?;
    let role: RoleCredentials = serde_json::from_slice(&body).ok()?;
    Some(role.into())
}

#[derive(Debug, Deserialize)]
struct WebIdentityResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResult")]
    result: WebIdentityResult,
}

#[derive(Debug, Deserialize)]
struct WebIdentityResult {
    #[serde(rename = "Credentials")]
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

/// `AssumeRoleWithWebIdentity` is the one chain entry that can fail
/// meaningfully: the env vars assert intent, so a bad exchange is
/// reported rather than silently skipped.
fn from_web_identity(pool: &Pool) -> Result<Option<Credentials>> {
    let (Some(token_file), Some(role_arn)) =
        (env("AWS_WEB_IDENTITY_TOKEN_FILE"), env("AWS_ROLE_ARN"))
    else {
        return Ok(None);
    };

    let token = std::fs::read_to_string(&token_file)
        .map_err(|e| Error::io(&token_file, e))?
        .trim()
        .to_string();

    let body = format!(
        "Action=AssumeRoleWithWebIdentity&Version=2011-06-15\
         &RoleArn={}&RoleSessionName=arbiter&WebIdentityToken={}",
        sanitize_component(&role_arn),
        sanitize_component(&token)
    );
    let mut headers = Headers::new();
    headers.insert(
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    );

    let res = pool
        .acquire()
        .post(STS_URL, body.as_bytes(), &headers, &Query::new())?;
    if !res.ok() {
        return Err(res.to_error("web identity exchange"));
    }

    let parsed: WebIdentityResponse = quick_xml::de::from_str(&res.text())
        .map_err(|e| Error::Backend(format!("malformed STS response: {}", e)))?;
    let creds = parsed.result.credentials;
    Ok(Some(Credentials {
        access: creds.access_key_id,
        secret: creds.secret_access_key,
        token: Some(creds.session_token),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_options() {
        let options = json!({ "access": "AKID", "secret": "SECRET", "token": "TOK" });
        let creds = from_options(&options).unwrap();
        assert_eq!(creds.access, "AKID");
        assert_eq!(creds.secret, "SECRET");
        assert_eq!(creds.token.as_deref(), Some("TOK"));

        assert!(from_options(&json!({ "access": "AKID" })).is_none());
    }

    #[test]
    fn test_region_from_options() {
        assert_eq!(region(&json!({ "region": "ap-south-1" }), "default"), "ap-south-1");
    }

    #[test]
    fn test_sts_response_parsing() {
        let xml = r#"
<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <Credentials>
      <SessionToken>AQoDYXdzEE0a8ANXXXXXXXXNO1ewxE5TijQyp</SessionToken>
      <SecretAccessKey>wJalrXUtnFEMI/K7MDENG/bPxRfiCYzEXAMPLEKEY</SecretAccessKey>
      <Expiration>2014-10-24T23:00:23Z</Expiration>
      <AccessKeyId>ASgeIAIOSFODNN7EXAMPLE</AccessKeyId>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
</AssumeRoleWithWebIdentityResponse>"#;
        let parsed: WebIdentityResponse = quick_xml::de::from_str(xml).unwrap();
        let creds = parsed.result.credentials;
        assert_eq!(creds.access_key_id, "ASgeIAIOSFODNN7EXAMPLE");
        assert_eq!(creds.session_token, "AQoDYXdzEE0a8ANXXXXXXXXNO1ewxE5TijQyp");
    }

    #[test]
    fn test_role_credentials_parsing() {
        let json = r#"{
            "Code": "Success",
            "AccessKeyId": "ASIAEXAMPLE",
            "SecretAccessKey": "secret",
            "Token": "token",
            "Expiration": "2026-08-01T12:00:00Z"
        }"#;
        let role: RoleCredentials = serde_json::from_str(json).unwrap();
        let creds: Credentials = role.into();
        assert_eq!(creds.access, "ASIAEXAMPLE");
        assert_eq!(creds.token.as_deref(), Some("token"));
    }
}
