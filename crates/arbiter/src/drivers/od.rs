//! OneDrive driver (Microsoft Graph)
//!
//! Credentials are an OAuth2 refresh-token grant: the access token is
//! cached behind a mutex and re-exchanged at the tenant token endpoint
//! when under two minutes of validity remain. Objects are addressed as
//! `root:/<path>` items on Graph v1.0; listing walks `:/children` pages
//! through `@odata.nextLink`, recursing into folder items. The driver is
//! read-only - the source service exposes no upload surface here.

use std::sync::{Arc, Mutex, PoisonError};

use arbiter_core::{path, Error, Result, Time};
use arbiter_http::{sanitize, sanitize_component, Headers, Pool, Query};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::drivers::http::Http;

const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Refresh when under this many seconds of validity remain.
const REFRESH_WINDOW: i64 = 120;

/// Tokens granted against this scope set survive refresh rotation.
const SCOPE: &str = "offline_access+files.readwrite.all+user.read+user.readwrite\
                     +user.readbasic.all+user.read.all+directory.read.all\
                     +directory.accessasuser.all";

#[derive(Debug, Deserialize)]
struct OdConfig {
    access_token: String,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    tenant_id: String,
    redirect_uri: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

struct Tokens {
    access: String,
    refresh: String,
    expiry: i64,
}

struct Auth {
    client_id: String,
    client_secret: String,
    tenant: String,
    redirect: String,
    login_base: String,
    state: Mutex<Tokens>,
}

impl Auth {
    fn new(config: OdConfig) -> Self {
        Auth {
            client_id: config.client_id,
            client_secret: config.client_secret,
            tenant: config.tenant_id,
            redirect: config.redirect_uri,
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            state: Mutex::new(Tokens {
                access: config.access_token,
                refresh: config.refresh_token,
                // Treated as already stale so the first use re-exchanges.
                expiry: 0,
            }),
        }
    }

    fn headers(&self, http: &Http) -> Result<Headers> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.maybe_refresh(&mut state, http)?;

        let mut headers = Headers::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", state.access),
        );
        Ok(headers)
    }

    fn maybe_refresh(&self, state: &mut Tokens, http: &Http) -> Result<()> {
        let now = Time::now().as_unix();
        if state.expiry - now > REFRESH_WINDOW {
            return Ok(());
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant);
        let body = format!(
            "grant_type=refresh_token&refresh_token={}&client_id={}\
             &client_secret={}&scope={}&redirect_uri={}",
            sanitize_component(&state.refresh),
            sanitize_component(&self.client_id),
            sanitize_component(&self.client_secret),
            SCOPE,
            sanitize_component(&self.redirect),
        );

        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("Accept".to_string(), "application/json".to_string());

        let res = http.internal_post(&url, body.as_bytes(), &headers, &Query::new())?;
        if !res.ok() {
            return Err(res.to_error("onedrive token refresh"));
        }
        let granted: RefreshResponse = serde_json::from_slice(res.data())
            .map_err(|e| Error::Backend(format!("malformed token response: {}", e)))?;

        debug!("onedrive access token refreshed");
        state.access = granted.access_token;
        if let Some(refresh) = granted.refresh_token {
            state.refresh = refresh;
        }
        state.expiry = now + 3599;
        Ok(())
    }
}

/// The OneDrive backend.
pub struct Od {
    http: Http,
    profile: String,
    auth: Auth,
    base_url: String,
}

impl Od {
    /// Builds the driver from the `od` configuration object; `Ok(None)`
    /// when none is present.
    pub fn create(pool: Arc<Pool>, options: &Value, profile: &str) -> Result<Option<Od>> {
        if options.is_null() {
            return Ok(None);
        }
        let config: OdConfig = serde_json::from_value(options.clone())
            .map_err(|e| Error::Config(format!("malformed onedrive configuration: {}", e)))?;

        Ok(Some(Od {
            http: Http::new(pool, "https"),
            profile: profile.to_string(),
            auth: Auth::new(config),
            base_url: DEFAULT_GRAPH_BASE.to_string(),
        }))
    }

    fn item_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/me/drive/root", self.base_url)
        } else {
            format!("{}/me/drive/root:/{}", self.base_url, sanitize(path))
        }
    }

    fn content_url(&self, path: &str) -> String {
        format!("{}:/content", self.item_url(path))
    }

    fn children_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/children", self.item_url(path))
        } else {
            format!("{}:/children", self.item_url(path))
        }
    }

    fn auth_headers(&self) -> Result<Headers> {
        self.auth.headers(&self.http)
    }

    /// Lists one directory, following pagination, recursing into folder
    /// items when asked. Only file items land in `results`.
    fn walk(
        &self,
        dir: &str,
        recursive: bool,
        verbose: bool,
        results: &mut Vec<String>,
    ) -> Result<()> {
        let mut page_url = self.children_url(dir);
        loop {
            if verbose {
                debug!(dir, "listing page");
            }

            let res = self
                .http
                .internal_get(&page_url, &self.auth_headers()?, &Query::new())?;
            if !res.ok() {
                return Err(res.to_error(format!("could not list od://{}", dir)));
            }

            let listing: ChildrenResponse = serde_json::from_slice(res.data())
                .map_err(|e| Error::Backend(format!("malformed children listing: {}", e)))?;

            for item in listing.value {
                let child = if dir.is_empty() {
                    item.name
                } else {
                    format!("{}/{}", dir, item.name)
                };

                if item.folder.is_some() {
                    if recursive {
                        self.walk(&child, recursive, verbose, results)?;
                    }
                } else {
                    results.push(format!("{}://{}", self.profiled_protocol(), child));
                }
            }

            match listing.next_link {
                Some(next) if !next.is_empty() => page_url = next,
                _ => break,
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct DriveItem {
    name: String,
    folder: Option<FolderFacet>,
}

#[derive(Deserialize)]
struct FolderFacet {}

#[derive(Deserialize)]
struct ItemMetadata {
    size: Option<u64>,
}

impl Driver for Od {
    fn protocol(&self) -> &str {
        "od"
    }

    fn profile(&self) -> &str {
        &self.profile
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .internal_get(&self.content_url(path), &self.auth_headers()?, &Query::new())?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read od://{}", path)))
        }
    }

    fn get_range(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let mut headers = self.auth_headers()?;
        headers.insert(
            "Range".to_string(),
            format!("bytes={}-{}", offset, offset + length - 1),
        );
        let res = self
            .http
            .internal_get(&self.content_url(path), &headers, &Query::new())?;
        if res.ok() {
            Ok(res.into_data())
        } else {
            Err(res.to_error(format!("could not read range of od://{}", path)))
        }
    }

    fn put(&self, path: &str, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported(format!(
            "od driver is read-only; cannot write od://{}",
            path
        )))
    }

    /// Size comes from item metadata; Graph serves `:/content` through a
    /// redirect, so HEAD Content-Length is not reliable here.
    fn size(&self, path: &str) -> Result<u64> {
        let mut headers = self.auth_headers()?;
        headers.insert("Accept".to_string(), "application/json".to_string());

        let res = self
            .http
            .internal_get(&self.item_url(path), &headers, &Query::new())?;
        if !res.ok() {
            return Err(res.to_error(format!("could not stat od://{}", path)));
        }

        let metadata: ItemMetadata = serde_json::from_slice(res.data())
            .map_err(|e| Error::Backend(format!("malformed item metadata: {}", e)))?;
        metadata
            .size
            .ok_or_else(|| Error::Backend(format!("no size in metadata of od://{}", path)))
    }

    fn glob(&self, path: &str, verbose: bool) -> Result<Vec<String>> {
        let pattern = path::parse_glob(path)
            .ok_or_else(|| Error::Config(format!("invalid glob pattern: {}", path)))?;
        let dir = pattern.prefix.trim_end_matches('/');

        let mut results = Vec::new();
        self.walk(dir, pattern.recursive, verbose, &mut results)?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_http::TransportConfig;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_server() -> (tokio::runtime::Runtime, MockServer) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let server = rt.block_on(MockServer::start());
        (rt, server)
    }

    fn test_driver(server: &MockServer) -> Od {
        let pool = Arc::new(Pool::new(2, 0, &TransportConfig::default()).unwrap());
        let options = json!({
            "access_token": "stale-token",
            "refresh_token": "refresh-1",
            "client_id": "client-id",
            "client_secret": "client-secret",
            "tenant_id": "common",
            "redirect_uri": "http://localhost/redirect"
        });
        let mut od = Od::create(pool, &options, "default").unwrap().unwrap();
        od.base_url = server.uri();
        od.auth.login_base = server.uri();
        od
    }

    fn mount_token_grant(rt: &tokio::runtime::Runtime, server: &MockServer) {
        rt.block_on(
            Mock::given(method("POST"))
                .and(url_path("/common/oauth2/v2.0/token"))
                .and(body_string_contains("grant_type=refresh_token"))
                .and(body_string_contains("refresh_token=refresh-1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": "fresh-token",
                    "refresh_token": "refresh-2",
                    "expires_in": 3599
                })))
                .mount(server),
        );
    }

    #[test]
    fn test_missing_config_skips_driver() {
        let pool = Arc::new(Pool::new(1, 0, &TransportConfig::default()).unwrap());
        assert!(Od::create(pool, &Value::Null, "default").unwrap().is_none());
    }

    #[test]
    fn test_partial_config_is_config_error() {
        let pool = Arc::new(Pool::new(1, 0, &TransportConfig::default()).unwrap());
        let options = json!({ "access_token": "x" });
        assert!(matches!(
            Od::create(pool, &options, "default"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_get_refreshes_token_first() {
        let (rt, server) = mock_server();
        let od = test_driver(&server);
        mount_token_grant(&rt, &server);

        rt.block_on(
            Mock::given(method("GET"))
                .and(url_path("/me/drive/root:/docs/report.bin:/content"))
                .and(header("Authorization", "Bearer fresh-token"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
                .mount(&server),
        );

        assert_eq!(od.get("docs/report.bin").unwrap(), vec![1u8, 2, 3]);

        // The refresh token rotated with the grant.
        let state = od.auth.state.lock().unwrap();
        assert_eq!(state.refresh, "refresh-2");
        assert!(state.expiry > Time::now().as_unix() + 3000);
    }

    #[test]
    fn test_size_from_metadata() {
        let (rt, server) = mock_server();
        let od = test_driver(&server);
        mount_token_grant(&rt, &server);

        rt.block_on(
            Mock::given(method("GET"))
                .and(url_path("/me/drive/root:/docs/report.bin"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "name": "report.bin",
                    "size": 4096
                })))
                .mount(&server),
        );

        assert_eq!(od.size("docs/report.bin").unwrap(), 4096);
    }

    #[test]
    fn test_recursive_walk() {
        let (rt, server) = mock_server();
        let od = test_driver(&server);
        mount_token_grant(&rt, &server);

        rt.block_on(async {
            Mock::given(method("GET"))
                .and(url_path("/me/drive/root:/docs:/children"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [
                        { "name": "a.txt" },
                        { "name": "sub", "folder": { "childCount": 1 } }
                    ]
                })))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(url_path("/me/drive/root:/docs/sub:/children"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [ { "name": "b.txt" } ]
                })))
                .mount(&server)
                .await;
        });

        let results = od.glob("docs/**", false).unwrap();
        assert_eq!(
            results,
            vec!["od://docs/a.txt".to_string(), "od://docs/sub/b.txt".to_string()]
        );

        // Non-recursive: folders are traversed structure, not results.
        let shallow = od.glob("docs/*", false).unwrap();
        assert_eq!(shallow, vec!["od://docs/a.txt".to_string()]);
    }

    #[test]
    fn test_put_unsupported() {
        let (_rt, server) = mock_server();
        let od = test_driver(&server);
        assert!(matches!(
            od.put("docs/new.txt", b"data"),
            Err(Error::Unsupported(_))
        ));
    }
}
