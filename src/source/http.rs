use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::{CachePolicy, SourceError};

pub(super) fn build_client(timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(concat!("foodgallery/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|source| SourceError::Transport {
            context: "building http client",
            source,
        })
}

pub(super) fn apply_cache_policy(request: RequestBuilder, cache: CachePolicy) -> RequestBuilder {
    match cache {
        CachePolicy::Default => request,
        CachePolicy::Bypass => request
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache"),
    }
}

pub(super) fn send(request: RequestBuilder, context: &'static str) -> Result<Response, SourceError> {
    request
        .send()
        .map_err(|source| SourceError::Transport { context, source })
}

/// Maps 401/403 to [`SourceError::AuthRequired`] and any other non-success
/// status to [`SourceError::Http`].
pub(super) fn ensure_ok(
    resp: Response,
    context: &'static str,
    reauth: &str,
) -> Result<Response, SourceError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SourceError::AuthRequired {
            reauth: reauth.to_string(),
        });
    }
    if !status.is_success() {
        return Err(SourceError::Http { context, status });
    }
    Ok(resp)
}

pub(super) fn read_body(resp: Response, context: &'static str) -> Result<String, SourceError> {
    resp.text()
        .map_err(|source| SourceError::Transport { context, source })
}

pub(super) fn decode<T: DeserializeOwned>(body: &str, context: &'static str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|source| SourceError::Decode { context, source })
}
