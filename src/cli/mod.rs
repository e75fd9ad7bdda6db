use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use time::UtcOffset;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{AppConfig, ConfigLoader, SourceKind};
use crate::source;

pub mod commands;

use self::commands::{AuthorizeArgs, ListArgs};

#[derive(Parser, Debug)]
#[command(
    name = "foodgallery",
    version,
    about = "Terminal gallery for food photos and their nutrition analysis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over FOODGALLERY_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Where to read items from, overriding the config file
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Items (or dates) rendered per "load more"
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive gallery (default)
    Tui,
    /// Print the gallery as text
    List(ListArgs),
    /// Print per-date calorie totals
    Buckets,
    /// Authorize Google Drive access for the drive source
    Authorize(AuthorizeArgs),
}

pub fn run() -> Result<()> {
    // Must be read before any other thread exists.
    let offset = local_offset();
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("FOODGALLERY_CONFIG", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_dir.join("foodgallery.log"));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let mut config = loader.load_or_init()?;
    apply_overrides(&mut config, cli.source, cli.batch_size);
    tracing::debug!(config = %paths.config_file.display(), source = %config.source.kind, %offset, "starting");

    match command {
        Commands::Authorize(args) => commands::authorize(&config.source.drive, args),
        Commands::Tui => {
            let source = source::build_source(&config.source, offset).context("building item source")?;
            let mut app = App::new(&config, source, offset)?;
            commands::run_tui(&mut app)
        }
        Commands::List(args) => {
            let source = source::build_source(&config.source, offset).context("building item source")?;
            commands::list_gallery(&config, source, offset, args)
        }
        Commands::Buckets => {
            let source = source::build_source(&config.source, offset).context("building item source")?;
            commands::print_buckets(&config, source, offset)
        }
    }
}

fn apply_overrides(config: &mut AppConfig, source: Option<SourceKind>, batch_size: Option<usize>) {
    if let Some(kind) = source {
        config.source.kind = kind;
    }
    if let Some(size) = batch_size {
        if size == 0 {
            tracing::warn!("--batch-size 0 is not usable, using 1");
        }
        config.gallery.batch_size = size.max(1);
    }
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}
