use std::fs;
use std::path::PathBuf;

use time::UtcOffset;

use super::wire::{listing_from_document, GalleryDocument};
use super::{already_resolved, CachePolicy, ItemSource, SourceError};
use crate::config::SourceKind;
use crate::gallery::{Item, Listing, PendingItem, Thumbnail};

/// A gallery-data document saved on disk. Re-read on every listing so edits
/// show up on the next refresh.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
    offset: UtcOffset,
}

impl FixtureSource {
    pub fn new(path: PathBuf, offset: UtcOffset) -> Self {
        Self { path, offset }
    }
}

impl ItemSource for FixtureSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Fixture
    }

    fn list_all(&self, _cache: CachePolicy) -> Result<Listing, SourceError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            context: format!("reading gallery fixture {}", self.path.display()),
            source,
        })?;
        let doc: GalleryDocument = serde_json::from_str(&raw).map_err(|source| SourceError::Decode {
            context: "gallery fixture",
            source,
        })?;
        listing_from_document(doc, self.offset, &|id, _| Thumbnail::new(format!("fixture:{id}")))
    }

    fn fetch_detail(&self, pending: &PendingItem) -> Result<Item, SourceError> {
        Err(already_resolved(pending))
    }

    fn check(&self) -> Result<String, SourceError> {
        if self.path.is_file() {
            Ok(format!("fixture {}", self.path.display()))
        } else {
            Ok(format!("fixture {} is missing", self.path.display()))
        }
    }
}
