use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;
use time::UtcOffset;

use crate::config::AppConfig;
use crate::gallery::{GalleryView, Phase};
use crate::session::{Schedule, SessionController, Worker};
use crate::source::ItemSource;
use crate::ui;

pub mod state;

pub use state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    SelectFirst,
    SelectLast,
    LoadMore,
    Refresh,
}

pub struct App {
    session: SessionController<GalleryView>,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    /// Builds the app around a background worker for `source`.
    pub fn new(config: &AppConfig, source: Arc<dyn ItemSource>, offset: UtcOffset) -> Result<Self> {
        let worker = Worker::spawn(source).context("spawning gallery worker thread")?;
        Ok(Self::with_worker(config, worker, offset))
    }

    pub fn with_worker(config: &AppConfig, worker: Worker, offset: UtcOffset) -> Self {
        let schedule = Schedule::from_options(&config.schedule, Instant::now());
        let session = SessionController::new(
            worker,
            &config.gallery,
            schedule,
            offset,
            GalleryView::default(),
        );
        Self {
            session,
            state: AppState::default(),
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: config.tick_rate(),
        }
    }

    pub fn session(&self) -> &SessionController<GalleryView> {
        &self.session
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn run(&mut self) -> Result<()> {
        self.session.start();
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    if self.state.is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected));
                    }
                    let status = self.session.snapshot();
                    ui::draw_app(
                        frame,
                        self.session.view(),
                        &status,
                        &self.state,
                        &mut self.list_state,
                    );
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick(Instant::now());
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Refresh)
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('g') | KeyCode::Home => Some(Action::SelectFirst),
            KeyCode::Char('G') | KeyCode::End => Some(Action::SelectLast),
            KeyCode::Char('l') | KeyCode::Char(' ') if plain => Some(Action::LoadMore),
            KeyCode::Enter => Some(Action::LoadMore),
            KeyCode::Char('r') if plain => Some(Action::Refresh),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::SelectFirst => self.state.select_first(),
            Action::SelectLast => self.state.select_last(),
            Action::LoadMore => {
                if self.session.phase() == Phase::Exhausted {
                    self.state
                        .set_status_message(Some("Everything is already on screen."));
                } else if !self.session.load_more() {
                    tracing::debug!("load more ignored");
                } else {
                    self.state.clear_status_message();
                }
            }
            Action::Refresh => {
                self.session.refresh();
                self.state.select_first();
                self.state.set_status_message(Some("Refreshing gallery..."));
            }
        }
        self.sync_rows();
    }

    pub fn on_tick(&mut self, now: Instant) {
        let handled = self.session.tick(now);
        if handled > 0 {
            if let Some(message) = self.session.snapshot().message {
                self.state.set_status_message(Some(message));
            }
        }
        self.sync_rows();
    }

    fn sync_rows(&mut self) {
        let rows = self.session.view().rows().len();
        self.state.sync_rows(rows);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, count: usize) -> anyhow::Result<Arc<dyn ItemSource>> {
        let items: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"id": "p{i}", "name": "p{i}.jpg", "timestamp": "2024-05-03T0{}:00:00",
                        "nutritionalInfo": {{"calories": 100}}}}"#,
                    i % 10
                )
            })
            .collect();
        let doc = format!(
            r#"{{"dates": {{"2024-05-03": {{"data": [{}]}}}}}}"#,
            items.join(",")
        );
        let path = dir.path().join("gallery.json");
        fs::write(&path, doc)?;
        Ok(Arc::new(FixtureSource::new(path, UtcOffset::UTC)))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn app(source: Arc<dyn ItemSource>, batch_size: usize) -> App {
        let mut config = AppConfig::default();
        config.gallery.batch_size = batch_size;
        config.gallery.batch_mode = crate::gallery::BatchMode::ByItem;
        App::with_worker(&config, Worker::inline(source), UtcOffset::UTC)
    }

    #[test]
    fn keys_drive_paging_and_selection() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(fixture(&temp, 5)?, 2);
        app.session.start();
        app.on_tick(Instant::now());
        assert_eq!(app.session().snapshot().rendered, 2);
        // header, two cards, control
        assert_eq!(app.state().row_count(), 4);

        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session().snapshot().rendered, 5);
        assert_eq!(app.session().phase(), Phase::Exhausted);

        press(&mut app, KeyCode::Char('G'));
        assert_eq!(app.state().selected, 5);
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.state().selected, 4);

        press(&mut app, KeyCode::Char(' '));
        assert_eq!(
            app.state().status_message(),
            Some("Everything is already on screen.")
        );
        Ok(())
    }

    #[test]
    fn refresh_and_quit_keys() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(fixture(&temp, 3)?, 10);
        app.session.start();
        app.on_tick(Instant::now());
        assert_eq!(app.session().view().card_count(), 3);

        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.session().view().card_count(), 0);
        assert_eq!(app.state().status_message(), Some("Refreshing gallery..."));
        app.on_tick(Instant::now());
        assert_eq!(app.session().view().card_count(), 3);

        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
        Ok(())
    }
}
