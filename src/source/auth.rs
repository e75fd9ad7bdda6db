//! OAuth2 for the Drive source: consent URL, code exchange, and a token
//! provider that refreshes shortly before expiry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::http::{build_client, read_body, send};
use super::SourceError;
use crate::config::DriveOptions;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const REAUTH_HINT: &str = "foodgallery authorize";
const REFRESH_MARGIN_SECS: i64 = 60;
const TOKEN_CONTEXT: &str = "oauth token request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Fresh,
    Stale,
}

impl TokenState {
    pub fn of(token: Option<&StoredToken>, now: i64) -> Self {
        match token {
            None => TokenState::Missing,
            Some(token) if token.expires_at > now + REFRESH_MARGIN_SECS => TokenState::Fresh,
            Some(_) => TokenState::Stale,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredToken>, SourceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SourceError::Io {
                    context: format!("reading token {}", self.path.display()),
                    source,
                })
            }
        };
        let token = serde_json::from_str(&raw).map_err(|source| SourceError::Decode {
            context: "stored oauth token",
            source,
        })?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), SourceError> {
        let io_err = |context: String| move |source| SourceError::Io { context, source };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(format!("creating {}", parent.display())))?;
        }
        let content = serde_json::to_string_pretty(token).map_err(|source| SourceError::Decode {
            context: "stored oauth token",
            source,
        })?;
        fs::write(&self.path, content)
            .map_err(io_err(format!("writing token {}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), expires_at = token.expires_at, "saved oauth token");
        Ok(())
    }
}

#[derive(Debug)]
pub struct OAuthClient {
    client: Client,
    options: DriveOptions,
}

impl OAuthClient {
    pub fn new(options: DriveOptions) -> Result<Self, SourceError> {
        let client = build_client(options.timeout())?;
        Ok(Self { client, options })
    }

    pub fn new_state() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn authorization_url(&self, state: &str) -> Result<Url, SourceError> {
        self.require_client()?;
        Url::parse_with_params(
            &self.options.auth_url,
            &[
                ("client_id", self.options.client_id.as_str()),
                ("redirect_uri", self.options.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|err| SourceError::Config(format!("invalid auth_url: {err}")))
    }

    pub fn exchange_code(&self, code: &str) -> Result<StoredToken, SourceError> {
        self.require_client()?;
        self.request_token(
            &[
                ("client_id", self.options.client_id.as_str()),
                ("client_secret", self.options.client_secret.as_str()),
                ("code", code.trim()),
                ("redirect_uri", self.options.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ],
            None,
        )
    }

    pub fn refresh(&self, refresh_token: &str) -> Result<StoredToken, SourceError> {
        self.require_client()?;
        self.request_token(
            &[
                ("client_id", self.options.client_id.as_str()),
                ("client_secret", self.options.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            Some(refresh_token),
        )
    }

    fn require_client(&self) -> Result<(), SourceError> {
        if self.options.client_id.trim().is_empty() || self.options.client_secret.trim().is_empty() {
            return Err(SourceError::Config(
                "source.drive.client_id and client_secret are required".to_string(),
            ));
        }
        Ok(())
    }

    fn request_token(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<&str>,
    ) -> Result<StoredToken, SourceError> {
        let resp = send(self.client.post(&self.options.token_url).form(form), TOKEN_CONTEXT)?;
        let status = resp.status();
        let body = read_body(resp, TOKEN_CONTEXT)?;
        if status.is_server_error() {
            tracing::warn!(%status, body = %body.trim(), "token endpoint unavailable");
            return Err(SourceError::Http {
                context: TOKEN_CONTEXT,
                status,
            });
        }
        if !status.is_success() {
            return Err(SourceError::OAuth(format_oauth_error(status, &body)));
        }
        let token: TokenResponse = serde_json::from_str(&body).map_err(|source| SourceError::Decode {
            context: "oauth token response",
            source,
        })?;
        let refresh_token = token
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string))
            .ok_or_else(|| {
                SourceError::OAuth("token response carried no refresh token".to_string())
            })?;
        Ok(StoredToken {
            access_token: token.access_token,
            refresh_token,
            expires_at: now_unix() + token.expires_in,
        })
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn format_oauth_error(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    let summary = match serde_json::from_str::<TokenErrorResponse>(trimmed) {
        Ok(TokenErrorResponse {
            error,
            error_description: Some(desc),
        }) => format!("{desc} ({error})"),
        Ok(TokenErrorResponse { error, .. }) => error,
        Err(_) => {
            let mut out = trimmed.replace(['\n', '\r'], " ");
            if out.len() > 240 {
                let cut = (0..=240).rev().find(|i| out.is_char_boundary(*i)).unwrap_or(0);
                out.truncate(cut);
                out.push_str("...");
            }
            out
        }
    };
    format!("HTTP {status}: {summary}")
}

/// Hands out access tokens, refreshing and persisting them as needed.
#[derive(Debug)]
pub struct TokenProvider {
    oauth: OAuthClient,
    store: TokenStore,
    cached: Mutex<Option<StoredToken>>,
}

impl TokenProvider {
    pub fn new(oauth: OAuthClient, store: TokenStore) -> Self {
        Self {
            oauth,
            store,
            cached: Mutex::new(None),
        }
    }

    pub fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.cached.lock();
        if cached.is_none() {
            *cached = self.store.load()?;
        }
        let refresh_token = match cached.as_ref() {
            None => return Err(auth_required()),
            Some(token) if TokenState::of(Some(token), now_unix()) == TokenState::Fresh => {
                return Ok(token.access_token.clone());
            }
            Some(token) => token.refresh_token.clone(),
        };
        match self.oauth.refresh(&refresh_token) {
            Ok(updated) => {
                self.store.save(&updated)?;
                let access = updated.access_token.clone();
                *cached = Some(updated);
                tracing::info!("refreshed drive access token");
                Ok(access)
            }
            Err(SourceError::OAuth(reason)) => {
                tracing::warn!(%reason, "refresh token rejected");
                *cached = None;
                Err(auth_required())
            }
            // The stored token stays usable for the next attempt.
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                Err(err)
            }
        }
    }

    /// Drops the cached token so the next call re-reads the store.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    pub fn describe(&self) -> Result<String, SourceError> {
        let token = {
            let cached = self.cached.lock();
            match cached.as_ref() {
                Some(token) => Some(token.clone()),
                None => self.store.load()?,
            }
        };
        let now = now_unix();
        Ok(match TokenState::of(token.as_ref(), now) {
            TokenState::Missing => format!("no token at {}", self.store.path().display()),
            TokenState::Fresh => {
                let secs = token.map(|t| t.expires_at - now).unwrap_or_default();
                format!("token valid for {}m", secs / 60)
            }
            TokenState::Stale => "token expired, refresh pending".to_string(),
        })
    }
}

fn auth_required() -> SourceError {
    SourceError::AuthRequired {
        reauth: REAUTH_HINT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_support::{unreachable_url, TestServer};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn options(temp: &TempDir) -> DriveOptions {
        DriveOptions {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            token_path: temp.path().join("token.json"),
            ..DriveOptions::default()
        }
    }

    #[test]
    fn token_freshness_leaves_a_minute_of_margin() {
        let token = StoredToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: 1_000,
        };
        assert_eq!(TokenState::of(None, 0), TokenState::Missing);
        assert_eq!(TokenState::of(Some(&token), 900), TokenState::Fresh);
        assert_eq!(TokenState::of(Some(&token), 940), TokenState::Stale);
        assert_eq!(TokenState::of(Some(&token), 2_000), TokenState::Stale);
    }

    #[test]
    fn store_round_trips_and_reports_missing() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = TokenStore::new(temp.path().join("nested").join("token.json"));
        assert_eq!(store.load()?, None);

        let token = StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: 42,
        };
        store.save(&token)?;
        assert_eq!(store.load()?, Some(token));
        Ok(())
    }

    #[test]
    fn fresh_stored_token_is_served_without_network() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let opts = options(&temp);
        let store = TokenStore::new(opts.token_path.clone());
        store.save(&StoredToken {
            access_token: "live".into(),
            refresh_token: "r".into(),
            expires_at: now_unix() + 3_600,
        })?;
        let provider = TokenProvider::new(OAuthClient::new(opts)?, store);
        assert_eq!(provider.access_token()?, "live");
        assert!(provider.describe()?.starts_with("token valid for"));
        Ok(())
    }

    #[test]
    fn missing_token_asks_for_authorization() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let opts = options(&temp);
        let store = TokenStore::new(opts.token_path.clone());
        let provider = TokenProvider::new(OAuthClient::new(opts)?, store);
        let err = provider.access_token().expect_err("no token");
        assert_matches!(err, SourceError::AuthRequired { ref reauth } if reauth == REAUTH_HINT);
        Ok(())
    }

    #[test]
    fn consent_url_requests_offline_readonly_access() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let client = OAuthClient::new(options(&temp))?;
        let url = client.authorization_url("state-1")?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("scope".into(), DRIVE_SCOPE.into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("state".into(), "state-1".into())));
        assert!(pairs.contains(&("client_id".into(), "client-123".into())));

        let anonymous = OAuthClient::new(DriveOptions::default())?;
        assert_matches!(anonymous.authorization_url("s"), Err(SourceError::Config(_)));
        Ok(())
    }

    fn stale_provider(temp: &TempDir, token_url: String) -> anyhow::Result<TokenProvider> {
        let opts = DriveOptions {
            token_url,
            timeout_secs: 5,
            ..options(temp)
        };
        let store = TokenStore::new(opts.token_path.clone());
        store.save(&StoredToken {
            access_token: "old".into(),
            refresh_token: "refresh-1".into(),
            expires_at: now_unix() - 10,
        })?;
        Ok(TokenProvider::new(OAuthClient::new(opts)?, store))
    }

    #[test]
    fn stale_token_is_refreshed_and_persisted() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![(
            200,
            r#"{"access_token": "new", "expires_in": 3600, "token_type": "Bearer"}"#.into(),
        )])?;
        let provider = stale_provider(&temp, format!("{}/token", server.base_url()))?;

        assert_eq!(provider.access_token()?, "new");
        let stored = TokenStore::new(temp.path().join("token.json")).load()?;
        assert_matches!(stored, Some(ref token) if token.refresh_token == "refresh-1" && token.access_token == "new");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].line.starts_with("POST /token"));
        assert!(requests[0].body.contains("grant_type=refresh_token"));
        assert!(requests[0].body.contains("refresh_token=refresh-1"));
        Ok(())
    }

    #[test]
    fn unreachable_token_endpoint_is_a_transport_failure() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let provider = stale_provider(&temp, format!("{}/token", unreachable_url()?))?;

        let err = provider.access_token().expect_err("refresh cannot succeed");
        assert_matches!(err, SourceError::Transport { .. });
        assert_eq!(provider.describe()?, "token expired, refresh pending");
        assert!(TokenStore::new(temp.path().join("token.json")).load()?.is_some());
        Ok(())
    }

    #[test]
    fn token_endpoint_outage_is_not_an_authorization_problem() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![(503, "{}".into())])?;
        let provider = stale_provider(&temp, format!("{}/token", server.base_url()))?;

        let err = provider.access_token().expect_err("outage");
        assert_matches!(err, SourceError::Http { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.is_auth());
        Ok(())
    }

    #[test]
    fn rejected_refresh_token_asks_for_authorization() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![(
            400,
            r#"{"error": "invalid_grant", "error_description": "Token has been revoked."}"#.into(),
        )])?;
        let provider = stale_provider(&temp, format!("{}/token", server.base_url()))?;

        let err = provider.access_token().expect_err("revoked");
        assert_matches!(err, SourceError::AuthRequired { ref reauth } if reauth == REAUTH_HINT);
        Ok(())
    }

    #[test]
    fn oauth_errors_are_summarized() {
        assert_eq!(
            format_oauth_error(
                StatusCode::BAD_REQUEST,
                r#"{"error": "invalid_grant", "error_description": "Bad Request"}"#
            ),
            "HTTP 400 Bad Request: Bad Request (invalid_grant)"
        );
        assert_eq!(format_oauth_error(StatusCode::UNAUTHORIZED, "  "), "HTTP 401 Unauthorized");
    }
}
