use reqwest::blocking::Client;
use reqwest::header;
use time::{OffsetDateTime, UtcOffset};

use super::http::{apply_cache_policy, build_client, decode, read_body, send};
use super::wire::{listing_from_document, GalleryDocument};
use super::{already_resolved, CachePolicy, ItemSource, SourceError};
use crate::config::{BackendOptions, SourceKind};
use crate::gallery::{Item, Listing, PendingItem, Thumbnail};

const LISTING_CONTEXT: &str = "gallery listing";

/// First-party HTTP backend serving `/api/gallery-data`, already grouped by
/// date.
#[derive(Debug)]
pub struct BackendSource {
    client: Client,
    options: BackendOptions,
    offset: UtcOffset,
}

impl BackendSource {
    pub fn new(options: BackendOptions, offset: UtcOffset) -> Result<Self, SourceError> {
        if options.base_url.is_empty() {
            return Err(SourceError::Config("source.backend.base_url is empty".to_string()));
        }
        let client = build_client(options.timeout())?;
        Ok(Self {
            client,
            options,
            offset,
        })
    }

    fn listing_url(&self) -> String {
        format!("{}/api/gallery-data", self.options.base_url)
    }

    fn reauth_url(&self) -> String {
        format!("{}/authorize", self.options.base_url)
    }
}

/// `fetched_millis` is the listing's fetch time, so every reload asks for
/// fresh thumbnails.
pub fn thumbnail_url(base_url: &str, id: &str, fetched_millis: i64) -> Thumbnail {
    Thumbnail::new(format!("{base_url}/api/thumbnail/{id}?t={fetched_millis}"))
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Interprets a response body. A non-success status wins over the body
/// unless the body carries the server's own error message.
fn interpret(
    status: reqwest::StatusCode,
    body: &str,
    reauth: &str,
) -> Result<GalleryDocument, SourceError> {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::AuthRequired {
            reauth: reauth.to_string(),
        });
    }
    if !status.is_success() {
        if let Ok(GalleryDocument {
            error: Some(message),
            ..
        }) = serde_json::from_str::<GalleryDocument>(body)
        {
            return Err(SourceError::Backend(message));
        }
        return Err(SourceError::Http {
            context: LISTING_CONTEXT,
            status,
        });
    }
    decode(body, LISTING_CONTEXT)
}

impl ItemSource for BackendSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Backend
    }

    fn list_all(&self, cache: CachePolicy) -> Result<Listing, SourceError> {
        let mut request = self.client.get(self.listing_url());
        if let Some(token) = &self.options.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(cookie) = &self.options.session_cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = apply_cache_policy(request, cache);

        tracing::debug!(url = %self.listing_url(), ?cache, "requesting gallery data");
        let resp = send(request, LISTING_CONTEXT)?;
        let status = resp.status();
        let body = read_body(resp, LISTING_CONTEXT)?;
        let doc = interpret(status, &body, &self.reauth_url())?;

        let base = self.options.base_url.as_str();
        let fetched_millis = now_millis();
        listing_from_document(doc, self.offset, &|id, _| thumbnail_url(base, id, fetched_millis))
    }

    fn fetch_detail(&self, pending: &PendingItem) -> Result<Item, SourceError> {
        Err(already_resolved(pending))
    }

    fn check(&self) -> Result<String, SourceError> {
        let auth = match (&self.options.bearer_token, &self.options.session_cookie) {
            (Some(_), _) => "bearer token",
            (None, Some(_)) => "session cookie",
            (None, None) => "no credentials",
        };
        Ok(format!("{} ({auth})", self.options.base_url))
    }
}
