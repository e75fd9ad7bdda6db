//! Where gallery items come from.
//!
//! Every source lists everything it knows in one call and, for flat
//! listings, resolves each image's metadata on demand.

use std::sync::Arc;

use reqwest::StatusCode;
use time::UtcOffset;

use crate::config::{SourceConfig, SourceKind};
use crate::gallery::{Item, Listing, PendingItem};

pub mod auth;
pub mod backend;
pub mod drive;
pub mod fixture;
mod http;
#[cfg(test)]
mod test_support;
pub mod wire;

pub use self::backend::BackendSource;
pub use self::drive::DriveSource;
pub use self::fixture::FixtureSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Default,
    /// Ask every cache between us and the origin for a fresh copy.
    Bypass,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("authorization required (re-authorize via {reauth})")]
    AuthRequired { reauth: String },
    #[error("{context} failed with HTTP {status}")]
    Http {
        context: &'static str,
        status: StatusCode,
    },
    #[error("{context} request failed")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("server reported an error: {0}")]
    Backend(String),
    #[error("decoding {context}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("metadata unavailable for {name}: {reason}")]
    Metadata { name: String, reason: String },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("oauth token request failed: {0}")]
    OAuth(String),
    #[error("source misconfigured: {0}")]
    Config(String),
}

impl SourceError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SourceError::AuthRequired { .. })
    }

    pub fn reauth_hint(&self) -> Option<&str> {
        match self {
            SourceError::AuthRequired { reauth } => Some(reauth),
            _ => None,
        }
    }
}

pub trait ItemSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetches the complete listing.
    fn list_all(&self, cache: CachePolicy) -> Result<Listing, SourceError>;

    /// Resolves one image of a flat listing into a renderable item.
    fn fetch_detail(&self, pending: &PendingItem) -> Result<Item, SourceError>;

    /// Cheap local health check for the periodic diagnostic task.
    fn check(&self) -> Result<String, SourceError> {
        Ok("ready".to_string())
    }
}

pub fn build_source(config: &SourceConfig, offset: UtcOffset) -> Result<Arc<dyn ItemSource>, SourceError> {
    let source: Arc<dyn ItemSource> = match config.kind {
        SourceKind::Backend => Arc::new(BackendSource::new(config.backend.clone(), offset)?),
        SourceKind::Drive => Arc::new(DriveSource::new(config.drive.clone())?),
        SourceKind::Fixture => Arc::new(FixtureSource::new(config.fixture.path.clone(), offset)),
    };
    tracing::info!(kind = %config.kind, "item source ready");
    Ok(source)
}

/// Used by sources whose listings arrive fully resolved.
fn already_resolved(pending: &PendingItem) -> SourceError {
    SourceError::Metadata {
        name: pending.name.clone(),
        reason: "this source lists resolved items only".to_string(),
    }
}
