//! One gallery lifetime: fetch the listing, page through it, reload on a
//! timer, start over on refresh.

use std::time::Instant;

use time::{OffsetDateTime, UtcOffset};

use crate::config::{GalleryOptions, SourceKind};
use crate::gallery::pagination::BATCH_ERROR_MESSAGE;
use crate::gallery::{
    assemble_sections, BatchOutcome, BatchPlan, BatchTicket, Batcher, DateBuckets, DisplayTree,
    Listing, Notice, PaginationController, Phase,
};
use crate::source::{CachePolicy, SourceError};

pub mod schedule;
pub mod worker;

pub use self::schedule::{Schedule, ScheduledTask};
pub use self::worker::{Job, ResolvedBatch, Worker, WorkerEvent};

pub const LOADING_MESSAGE: &str = "Loading fresh images...";

/// Point-in-time summary for status lines and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub kind: SourceKind,
    pub phase: Phase,
    pub fetching: bool,
    pub rendered: usize,
    pub unresolved: usize,
    pub total: usize,
    pub remaining: usize,
    pub last_reload: Option<OffsetDateTime>,
    pub message: Option<String>,
    pub last_check: Option<String>,
}

pub struct SessionController<D: DisplayTree> {
    worker: Worker,
    batcher: Batcher,
    pagination: PaginationController,
    listing: Option<Listing>,
    /// Running buckets for flat listings, filled as details resolve.
    resolved: DateBuckets,
    view: D,
    schedule: Schedule,
    offset: UtcOffset,
    fetching: Option<u64>,
    in_flight: Option<BatchTicket>,
    last_reload: Option<OffsetDateTime>,
    message: Option<String>,
    last_check: Option<String>,
}

impl<D: DisplayTree> SessionController<D> {
    pub fn new(
        worker: Worker,
        options: &GalleryOptions,
        schedule: Schedule,
        offset: UtcOffset,
        view: D,
    ) -> Self {
        Self {
            worker,
            batcher: Batcher::new(options.batch_size, options.batch_mode),
            pagination: PaginationController::new(offset),
            listing: None,
            resolved: DateBuckets::new(),
            view,
            schedule,
            offset,
            fetching: None,
            in_flight: None,
            last_reload: None,
            message: None,
            last_check: None,
        }
    }

    pub fn view(&self) -> &D {
        &self.view
    }

    pub fn phase(&self) -> Phase {
        self.pagination.phase()
    }

    pub fn listing_total(&self) -> usize {
        self.listing.as_ref().map(Listing::total_items).unwrap_or(0)
    }

    /// Nothing fetched or resolving in the background.
    pub fn is_settled(&self) -> bool {
        self.fetching.is_none() && self.in_flight.is_none()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn start(&mut self) {
        self.reload(CachePolicy::Default);
    }

    /// Clears everything on screen and in memory, then fetches a new listing.
    pub fn reload(&mut self, cache: CachePolicy) {
        let generation = self.pagination.reset();
        self.listing = None;
        self.resolved.clear();
        self.in_flight = None;
        self.view.replace_content(Some(Notice::loading(LOADING_MESSAGE)));
        self.fetching = Some(generation);
        tracing::info!(generation, ?cache, "reloading gallery");
        self.worker.submit(Job::Fetch { generation, cache });
    }

    /// User-initiated reload that also bypasses intermediary caches.
    pub fn refresh(&mut self) {
        self.schedule.postpone_reload(Instant::now());
        self.reload(CachePolicy::Bypass);
    }

    /// Starts the next batch. Returns false when there is nothing to start:
    /// no listing yet, or a batch already in flight.
    pub fn load_more(&mut self) -> bool {
        let Some(listing) = self.listing.as_ref() else {
            tracing::debug!("load more before the listing arrived");
            return false;
        };
        let total = listing.total_items();
        let Some(ticket) = self.pagination.begin_batch(&mut self.view, total) else {
            return false;
        };
        let plan = self
            .batcher
            .next_batch(listing, self.pagination.render_state(), self.offset);
        match plan {
            BatchPlan::Ready(sections) => {
                let outcome = Ok::<_, SourceError>(BatchOutcome {
                    sections,
                    unresolved: Vec::new(),
                });
                self.pagination
                    .complete_batch(ticket, &mut self.view, outcome, total);
            }
            BatchPlan::NeedsDetail(pending) => {
                self.in_flight = Some(ticket);
                self.worker.submit(Job::Resolve {
                    generation: ticket.generation(),
                    pending,
                });
            }
            BatchPlan::Exhausted => {
                self.pagination.complete_batch(
                    ticket,
                    &mut self.view,
                    Ok::<_, SourceError>(BatchOutcome::default()),
                    total,
                );
            }
        }
        true
    }

    /// Applies every finished background job. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.worker.try_next() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Runs due scheduled tasks, then drains finished jobs.
    pub fn tick(&mut self, now: Instant) -> usize {
        for task in self.schedule.due(now) {
            tracing::debug!(%task, "scheduled task due");
            match task {
                ScheduledTask::Reload => self.reload(CachePolicy::Default),
                ScheduledTask::Diagnostic => self.worker.submit(Job::Diagnose),
            }
        }
        self.poll()
    }

    pub fn snapshot(&self) -> SessionStatus {
        let total = self.listing_total();
        let state = self.pagination.render_state();
        SessionStatus {
            kind: self.worker.source().kind(),
            phase: self.pagination.phase(),
            fetching: self.fetching.is_some(),
            rendered: state.rendered_count(),
            unresolved: state.unresolved_count(),
            total,
            remaining: state.remaining(total),
            last_reload: self.last_reload,
            message: self.message.clone(),
            last_check: self.last_check.clone(),
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Listed { generation, result } => {
                if self.fetching != Some(generation) {
                    tracing::debug!(generation, "dropping listing from before the last reset");
                    return;
                }
                self.fetching = None;
                self.on_listing(result);
            }
            WorkerEvent::Resolved { generation, result } => {
                let ticket = match self.in_flight {
                    Some(ticket) if ticket.generation() == generation => ticket,
                    _ => {
                        tracing::debug!(generation, "dropping resolved batch without a matching ticket");
                        return;
                    }
                };
                self.in_flight = None;
                let outcome = result.map(|batch| {
                    let (sections, mut unresolved) =
                        assemble_sections(&mut self.resolved, batch.items, self.offset);
                    unresolved.extend(batch.unresolved);
                    BatchOutcome {
                        sections,
                        unresolved,
                    }
                });
                if let Err(err) = &outcome {
                    self.message = Some(failure_message(err));
                }
                let total = self.listing_total();
                self.pagination
                    .complete_batch(ticket, &mut self.view, outcome, total);
            }
            WorkerEvent::Diagnosed { result } => match result {
                Ok(report) => {
                    tracing::info!(%report, "source check");
                    self.last_check = Some(report);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "source check failed");
                    self.last_check = Some(err.to_string());
                }
            },
        }
    }

    fn on_listing(&mut self, result: Result<Listing, SourceError>) {
        match result {
            Ok(listing) => {
                self.last_reload = Some(OffsetDateTime::now_utc().to_offset(self.offset));
                self.view.replace_content(None);
                let total = listing.total_items();
                self.message = Some(if total == 0 {
                    "No images found".to_string()
                } else {
                    format!("{total} items listed")
                });
                self.listing = Some(listing);
                self.load_more();
            }
            Err(err) => {
                let notice = match err.reauth_hint() {
                    Some(hint) => Notice::error(format!("Authorization required. Re-authorize via {hint}")),
                    None => Notice::error(BATCH_ERROR_MESSAGE),
                };
                self.view.replace_content(Some(notice));
                self.message = Some(failure_message(&err));
            }
        }
    }
}

impl<D: DisplayTree> Drop for SessionController<D> {
    fn drop(&mut self) {
        self.schedule.cancel();
        tracing::debug!("gallery session closed");
    }
}

fn failure_message(err: &SourceError) -> String {
    match err.reauth_hint() {
        Some(hint) => format!("authorization required: run {hint}"),
        None => err.to_string(),
    }
}
