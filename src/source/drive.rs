//! Google Drive folder source. The listing is flat: one pending entry per
//! captured image, with its analysis document fetched on demand.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::auth::{OAuthClient, TokenProvider, TokenStore};
use super::http::{apply_cache_policy, build_client, decode, ensure_ok, read_body, send};
use super::wire::{item_from_drive_metadata, DriveMetadata};
use super::{CachePolicy, ItemSource, SourceError};
use crate::config::{DriveOptions, SourceKind};
use crate::gallery::{Item, ItemId, Listing, PendingItem, Thumbnail};

static IMAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"optimized_food_container_(\d+)\.").expect("image name pattern compiles")
});
static METADATA_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(analysis|metadata)_(\d+)\.json$").expect("metadata name pattern compiles")
});

const LIST_CONTEXT: &str = "drive folder listing";
const METADATA_CONTEXT: &str = "drive metadata download";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Pairs each captured image with its analysis document (preferred) or plain
/// metadata document. Images without either are left out. The result is
/// newest first.
pub fn build_pending(files: &[DriveFile]) -> Vec<PendingItem> {
    let mut documents: HashMap<&str, (bool, &str)> = HashMap::new();
    for file in files {
        let Some(caps) = METADATA_NAME.captures(&file.name) else {
            continue;
        };
        let (Some(prefix), Some(token)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let is_analysis = prefix.as_str() == "analysis";
        let entry = documents.entry(token.as_str()).or_insert((is_analysis, file.id.as_str()));
        if is_analysis && !entry.0 {
            *entry = (true, file.id.as_str());
        }
    }

    let mut pending: Vec<PendingItem> = files
        .iter()
        .filter(|file| file.mime_type.starts_with("image/"))
        .filter_map(|file| {
            let caps = IMAGE_NAME.captures(&file.name)?;
            let token = caps.get(1)?.as_str();
            let millis: i64 = token.parse().ok()?;
            let Some((_, detail_id)) = documents.get(token) else {
                tracing::debug!(name = %file.name, "image has no analysis document, skipping");
                return None;
            };
            Some(PendingItem {
                id: ItemId::new(file.id.clone()),
                name: file.name.clone(),
                captured_millis: millis,
                detail_ref: Some(detail_id.to_string()),
            })
        })
        .collect();
    pending.sort_by(|a, b| b.captured_millis.cmp(&a.captured_millis));
    pending
}

pub fn view_url(file_id: &str) -> Thumbnail {
    Thumbnail::new(format!("https://drive.google.com/file/d/{file_id}/view"))
}

#[derive(Debug)]
pub struct DriveSource {
    client: Client,
    options: DriveOptions,
    tokens: TokenProvider,
}

impl DriveSource {
    pub fn new(options: DriveOptions) -> Result<Self, SourceError> {
        if options.folder_id.trim().is_empty() {
            return Err(SourceError::Config("source.drive.folder_id is empty".to_string()));
        }
        let client = build_client(options.timeout())?;
        let tokens = TokenProvider::new(
            OAuthClient::new(options.clone())?,
            TokenStore::new(options.token_path.clone()),
        );
        Ok(Self {
            client,
            options,
            tokens,
        })
    }

    fn list_page(
        &self,
        token: &str,
        page_token: Option<&str>,
        cache: CachePolicy,
    ) -> Result<FileList, SourceError> {
        let query = format!(
            "'{}' in parents and (mimeType contains 'image/' or mimeType contains 'application/json') and trashed = false",
            self.options.folder_id
        );
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", "nextPageToken, files(id, name, modifiedTime, mimeType)"),
            ("pageSize", PAGE_SIZE),
            ("orderBy", "modifiedTime desc"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token));
        }
        let request = self
            .client
            .get(format!("{}/files", self.options.api_base))
            .bearer_auth(token)
            .query(&params);
        let resp = send(apply_cache_policy(request, cache), LIST_CONTEXT)?;
        let resp = self.checked(resp, LIST_CONTEXT)?;
        let body = read_body(resp, LIST_CONTEXT)?;
        decode(&body, LIST_CONTEXT)
    }

    fn checked(
        &self,
        resp: reqwest::blocking::Response,
        context: &'static str,
    ) -> Result<reqwest::blocking::Response, SourceError> {
        ensure_ok(resp, context, super::auth::REAUTH_HINT).inspect_err(|err| {
            if err.is_auth() {
                self.tokens.invalidate();
            }
        })
    }
}

impl ItemSource for DriveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Drive
    }

    fn list_all(&self, cache: CachePolicy) -> Result<Listing, SourceError> {
        let token = self.tokens.access_token()?;
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_page(&token, page_token.as_deref(), cache)?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        let pending = build_pending(&files);
        tracing::debug!(files = files.len(), images = pending.len(), "listed drive folder");
        Ok(Listing::Flat(pending))
    }

    fn fetch_detail(&self, pending: &PendingItem) -> Result<Item, SourceError> {
        let detail_id = pending.detail_ref.as_deref().ok_or_else(|| SourceError::Metadata {
            name: pending.name.clone(),
            reason: "no analysis document".to_string(),
        })?;
        let token = self.tokens.access_token()?;
        let request = self
            .client
            .get(format!("{}/files/{detail_id}", self.options.api_base))
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let resp = send(request, METADATA_CONTEXT)?;
        let resp = self.checked(resp, METADATA_CONTEXT)?;
        let body = read_body(resp, METADATA_CONTEXT)?;
        let meta: DriveMetadata = serde_json::from_str(&body).map_err(|err| SourceError::Metadata {
            name: pending.name.clone(),
            reason: err.to_string(),
        })?;
        Ok(item_from_drive_metadata(pending, meta, view_url(pending.id.as_str())))
    }

    fn check(&self) -> Result<String, SourceError> {
        let token = self.tokens.describe()?;
        Ok(format!("drive folder {} ({token})", self.options.folder_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::auth::StoredToken;
    use crate::source::test_support::TestServer;
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    fn store_token(temp: &TempDir, access: &str) -> anyhow::Result<()> {
        TokenStore::new(temp.path().join("token.json")).save(&StoredToken {
            access_token: access.into(),
            refresh_token: "refresh".into(),
            expires_at: OffsetDateTime::now_utc().unix_timestamp() + 3_600,
        })?;
        Ok(())
    }

    fn source_for(server: &TestServer, temp: &TempDir) -> anyhow::Result<DriveSource> {
        store_token(temp, "live")?;
        let options = DriveOptions {
            folder_id: "folder-1".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            api_base: server.base_url().to_string(),
            token_path: temp.path().join("token.json"),
            timeout_secs: 5,
            ..DriveOptions::default()
        };
        Ok(DriveSource::new(options)?)
    }

    fn file(id: &str, name: &str, mime: &str) -> DriveFile {
        DriveFile {
            id: id.into(),
            name: name.into(),
            mime_type: mime.into(),
            modified_time: None,
        }
    }

    #[test]
    fn pending_prefers_analysis_documents_and_sorts_newest_first() {
        let files = vec![
            file("m-old", "metadata_1000.json", "application/json"),
            file("img-old", "optimized_food_container_1000.jpg", "image/jpeg"),
            file("img-new", "optimized_food_container_2000.png", "image/png"),
            file("m-new", "metadata_2000.json", "application/json"),
            file("a-new", "analysis_2000.json", "application/json"),
            file("img-orphan", "optimized_food_container_3000.jpg", "image/jpeg"),
            file("stray", "holiday.jpg", "image/jpeg"),
        ];
        let pending = build_pending(&files);
        let summary: Vec<(&str, i64, Option<&str>)> = pending
            .iter()
            .map(|p| (p.id.as_str(), p.captured_millis, p.detail_ref.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("img-new", 2000, Some("a-new")),
                ("img-old", 1000, Some("m-old")),
            ]
        );
    }

    #[test]
    fn file_list_decodes_drive_field_names() -> anyhow::Result<()> {
        let list: FileList = serde_json::from_str(
            r#"{"nextPageToken": "p2", "files": [
                {"id": "1", "name": "analysis_5.json", "mimeType": "application/json",
                 "modifiedTime": "2024-05-03T12:00:00.000Z"}
            ]}"#,
        )?;
        assert_eq!(list.next_page_token.as_deref(), Some("p2"));
        assert_eq!(list.files[0].mime_type, "application/json");
        Ok(())
    }

    #[test]
    fn listing_follows_page_tokens() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![
            (
                200,
                r#"{"nextPageToken": "page-2", "files": [
                    {"id": "img-1", "name": "optimized_food_container_1000.jpg", "mimeType": "image/jpeg"},
                    {"id": "a-1", "name": "analysis_1000.json", "mimeType": "application/json"}
                ]}"#
                .into(),
            ),
            (
                200,
                r#"{"files": [
                    {"id": "img-2", "name": "optimized_food_container_2000.jpg", "mimeType": "image/jpeg"},
                    {"id": "m-2", "name": "metadata_2000.json", "mimeType": "application/json"}
                ]}"#
                .into(),
            ),
        ])?;
        let source = source_for(&server, &temp)?;

        let listing = source.list_all(CachePolicy::Bypass)?;
        let Listing::Flat(pending) = listing else {
            panic!("drive listings are flat");
        };
        let ids: Vec<(&str, Option<&str>)> = pending
            .iter()
            .map(|p| (p.id.as_str(), p.detail_ref.as_deref()))
            .collect();
        assert_eq!(ids, vec![("img-2", Some("m-2")), ("img-1", Some("a-1"))]);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert!(request.target().starts_with("/files?"));
            assert!(request.target().contains("folder-1"));
            assert_eq!(request.header("authorization"), Some("Bearer live"));
            assert_eq!(request.header("cache-control"), Some("no-cache"));
        }
        assert!(!requests[0].target().contains("pageToken"));
        assert!(requests[1].target().contains("pageToken=page-2"));
        Ok(())
    }

    #[test]
    fn metadata_is_downloaded_per_item() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![
            (
                200,
                r#"{"timestamp": "2024-05-03T12:00:00", "weight_grams": 310,
                    "nutritional_info": {"calories (kcal)": 450, "protein (g)": "22",
                                         "food_identified_short": "Curry"}}"#
                    .into(),
            ),
            (200, "<html>not json</html>".into()),
        ])?;
        let source = source_for(&server, &temp)?;
        let pending = PendingItem {
            id: ItemId::new("img-1"),
            name: "optimized_food_container_1714737600000.jpg".into(),
            captured_millis: 1_714_737_600_000,
            detail_ref: Some("a-1".into()),
        };

        let item = source.fetch_detail(&pending)?;
        assert_eq!(item.calories_kcal(), Some(450.0));
        assert_eq!(item.thumbnail, view_url("img-1"));
        let nutrition = item.nutrition.expect("nutrition");
        assert_eq!(nutrition.food_identified, "Curry");
        assert_eq!(nutrition.total_weight_grams.map(|m| m.to_string()), Some("310".to_string()));

        let err = source.fetch_detail(&pending).expect_err("bad document");
        assert_matches!(err, SourceError::Metadata { ref name, .. } if *name == pending.name);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].target().starts_with("/files/a-1?"));
        assert!(requests[0].target().contains("alt=media"));
        Ok(())
    }

    #[test]
    fn unauthorized_response_rereads_the_token_store() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let server = TestServer::start(vec![(401, String::new()), (200, r#"{"files": []}"#.into())])?;
        let source = source_for(&server, &temp)?;

        let err = source.list_all(CachePolicy::Default).expect_err("unauthorized");
        assert!(err.is_auth());

        store_token(&temp, "second")?;
        assert_matches!(source.list_all(CachePolicy::Default)?, Listing::Flat(ref pending) if pending.is_empty());

        let requests = server.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer live"));
        assert_eq!(requests[1].header("authorization"), Some("Bearer second"));
        Ok(())
    }

    #[test]
    fn empty_folder_id_is_a_config_error() {
        assert_matches!(
            DriveSource::new(DriveOptions::default()),
            Err(SourceError::Config(_))
        );
    }
}
