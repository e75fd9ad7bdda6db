use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::UtcOffset;

use crate::app::App;
use crate::config::{AppConfig, DriveOptions};
use crate::gallery::{GalleryView, NoticeKind, Phase};
use crate::session::{Schedule, SessionController, Worker};
use crate::source::auth::{OAuthClient, TokenStore};
use crate::source::ItemSource;

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Keep loading until every item is shown
    #[arg(long)]
    pub all: bool,
    /// Number of batches to load (ignored with --all)
    #[arg(long, default_value_t = 1)]
    pub batches: usize,
}

#[derive(Args, Debug, Clone)]
pub struct AuthorizeArgs {
    /// Authorization code returned by the consent page
    #[arg(long)]
    pub code: Option<String>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn list_gallery(
    config: &AppConfig,
    source: Arc<dyn ItemSource>,
    offset: UtcOffset,
    args: ListArgs,
) -> Result<()> {
    let batches = if args.all { None } else { Some(args.batches.max(1)) };
    let session = load_session(config, source, offset, batches)?;
    print!("{}", render_listing(&session));
    Ok(())
}

pub fn print_buckets(config: &AppConfig, source: Arc<dyn ItemSource>, offset: UtcOffset) -> Result<()> {
    let session = load_session(config, source, offset, None)?;
    print!("{}", render_buckets(session.view()));
    Ok(())
}

pub fn authorize(options: &DriveOptions, args: AuthorizeArgs) -> Result<()> {
    let client = OAuthClient::new(options.clone()).context("building oauth client")?;
    match args.code {
        Some(code) => {
            let token = client
                .exchange_code(&code)
                .context("exchanging authorization code")?;
            let store = TokenStore::new(options.token_path.clone());
            store.save(&token).context("saving oauth token")?;
            println!("Saved Drive token to {}", store.path().display());
        }
        None => {
            let state = OAuthClient::new_state();
            let url = client
                .authorization_url(&state)
                .context("building consent url")?;
            println!("Open this URL, approve access, then run:");
            println!("  foodgallery authorize --code <CODE>\n");
            println!("{url}");
        }
    }
    Ok(())
}

/// Drives a session synchronously. `batches: None` loads until exhausted.
fn load_session(
    config: &AppConfig,
    source: Arc<dyn ItemSource>,
    offset: UtcOffset,
    batches: Option<usize>,
) -> Result<SessionController<GalleryView>> {
    let mut session = SessionController::new(
        Worker::inline(source),
        &config.gallery,
        Schedule::default(),
        offset,
        GalleryView::default(),
    );
    session.start();
    session.poll();

    if let Some(notice) = session
        .view()
        .placeholder()
        .filter(|notice| notice.kind == NoticeKind::Error)
    {
        let detail = session.snapshot().message.unwrap_or_default();
        bail!("{} ({detail})", notice.message);
    }

    let mut loaded = 1;
    while session.phase() != Phase::Exhausted && batches.map_or(true, |limit| loaded < limit) {
        if !session.load_more() {
            break;
        }
        session.poll();
        loaded += 1;
    }
    tracing::debug!(loaded, phase = %session.phase(), "cli session settled");
    Ok(session)
}

fn render_listing(session: &SessionController<GalleryView>) -> String {
    let mut out = session.view().render_text();
    let status = session.snapshot();
    if status.total == 0 {
        out.push_str("No images found.\n");
        return out;
    }
    let _ = writeln!(
        out,
        "\nShowing {} of {} items ({} remaining{})",
        status.rendered,
        status.total,
        status.remaining,
        if status.unresolved > 0 {
            format!(", {} skipped", status.unresolved)
        } else {
            String::new()
        }
    );
    out
}

fn render_buckets(view: &GalleryView) -> String {
    if view.sections().is_empty() {
        return "No images found.\n".to_string();
    }
    let mut out = String::new();
    for section in view.sections() {
        let _ = writeln!(
            out,
            "{}  {}",
            section.header.key,
            section.header.calorie_label()
        );
    }
    out
}
