use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::gallery::BatchMode;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "FoodGallery";
const APP_NAME: &str = "foodgallery";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub token_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("FOODGALLERY_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("FOODGALLERY_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_dir = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.join("state"));

        Ok(Self::from_roots(config_dir, config_file, data_dir, cache_dir, state_dir))
    }

    pub fn from_roots(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        cache_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        let log_dir = state_dir.join("logs");
        let token_path = state_dir.join("drive-token.json");
        Self {
            config_dir,
            config_file,
            data_dir,
            cache_dir,
            state_dir,
            log_dir,
            token_path,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.cache_dir,
            &self.state_dir,
            &self.log_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tick_rate_ms: u64,
    pub source: SourceConfig,
    pub gallery: GalleryOptions,
    pub schedule: ScheduleOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 250,
            source: SourceConfig::default(),
            gallery: GalleryOptions::default(),
            schedule: ScheduleOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.source
            .resolve(paths)
            .context("resolving source paths")?;
        if self.gallery.batch_size == 0 {
            tracing::warn!("gallery.batch_size of 0 in config, using 1");
            self.gallery.batch_size = 1;
        }
        if self.tick_rate_ms == 0 {
            tracing::warn!("tick_rate_ms of 0 in config, using 250");
            self.tick_rate_ms = 250;
        }
        Ok(())
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceKind {
    /// First-party gallery-data API
    #[default]
    Backend,
    /// Google Drive folder listing plus per-image metadata files
    Drive,
    /// Gallery-data JSON document on disk
    Fixture,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub backend: BackendOptions,
    pub drive: DriveOptions,
    pub fixture: FixtureOptions,
}

impl SourceConfig {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.drive.token_path.as_os_str().is_empty() {
            self.drive.token_path = paths.token_path.clone();
        }
        if self.fixture.path.as_os_str().is_empty() {
            self.fixture.path = paths.data_dir.join("gallery-data.json");
        }
        self.backend.base_url = self.backend.base_url.trim_end_matches('/').to_string();
        if self.kind == SourceKind::Drive && self.drive.folder_id.trim().is_empty() {
            tracing::warn!("drive source selected but source.drive.folder_id is empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    pub base_url: String,
    pub bearer_token: Option<String>,
    /// Sent verbatim as the `Cookie` header, e.g. `session=...`.
    pub session_cookie: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            bearer_token: None,
            session_cookie: None,
            timeout_secs: 30,
        }
    }
}

impl BackendOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveOptions {
    pub folder_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub auth_url: String,
    pub token_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub token_path: PathBuf,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://127.0.0.1:8085/oauth2callback".to_string(),
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            timeout_secs: 30,
            token_path: PathBuf::new(),
        }
    }
}

impl DriveOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureOptions {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryOptions {
    pub batch_size: usize,
    pub batch_mode: BatchMode,
}

impl Default for GalleryOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_mode: BatchMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Full reload period; 0 disables it.
    pub reload_interval_secs: u64,
    /// Source health check period; 0 disables it.
    pub diagnostic_interval_secs: u64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            reload_interval_secs: 300,
            diagnostic_interval_secs: 30,
        }
    }
}

impl ScheduleOptions {
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }

    pub fn diagnostic_interval(&self) -> Option<Duration> {
        (self.diagnostic_interval_secs > 0)
            .then(|| Duration::from_secs(self.diagnostic_interval_secs))
    }
}
