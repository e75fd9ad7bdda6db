use time::UtcOffset;

use super::batcher::BatchSection;
use super::model::ItemId;
use super::render::{DisplayTree, LoadMoreControl, Notice, RenderState, Renderer};

pub const BATCH_ERROR_MESSAGE: &str = "Error loading images. Please try refreshing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Exhausted,
}

/// Proof that a batch was started; handed back on completion. Tickets from
/// before the last reset are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTicket {
    generation: u64,
}

impl BatchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub sections: Vec<BatchSection>,
    pub unresolved: Vec<ItemId>,
}

/// Owns the dedup set and the busy flag, and keeps the "load more" control
/// in step with them.
#[derive(Debug)]
pub struct PaginationController {
    state: RenderState,
    phase: Phase,
    generation: u64,
    renderer: Renderer,
}

impl PaginationController {
    pub fn new(offset: UtcOffset) -> Self {
        Self {
            state: RenderState::default(),
            phase: Phase::Idle,
            generation: 0,
            renderer: Renderer::new(offset),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn render_state(&self) -> &RenderState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn remaining(&self, listing_total: usize) -> usize {
        self.state.remaining(listing_total)
    }

    /// IDLE -> LOADING. Returns `None` without touching anything when a batch
    /// is already in flight.
    pub fn begin_batch<D>(&mut self, view: &mut D, listing_total: usize) -> Option<BatchTicket>
    where
        D: DisplayTree + ?Sized,
    {
        if self.state.is_busy() {
            tracing::debug!("load more ignored; batch already in flight");
            return None;
        }
        self.state.set_busy(true);
        self.phase = Phase::Loading;
        let remaining = self.state.remaining(listing_total);
        if remaining > 0 {
            view.show_control(LoadMoreControl::loading(remaining));
        }
        Some(BatchTicket {
            generation: self.generation,
        })
    }

    /// LOADING -> IDLE or EXHAUSTED. A failed batch leaves an inline notice and
    /// still releases the busy flag.
    pub fn complete_batch<D, E>(
        &mut self,
        ticket: BatchTicket,
        view: &mut D,
        outcome: Result<BatchOutcome, E>,
        listing_total: usize,
    ) -> Phase
    where
        D: DisplayTree + ?Sized,
        E: std::fmt::Display,
    {
        if ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping batch from before the last reset"
            );
            return self.phase;
        }

        match outcome {
            Ok(outcome) => {
                for id in outcome.unresolved {
                    self.state.mark_unresolved(id);
                }
                let mut created = 0;
                for section in &outcome.sections {
                    created += self.renderer.render_date_section(
                        view,
                        &mut self.state,
                        section.key,
                        section.summary,
                        &section.items,
                    );
                }
                tracing::info!(
                    sections = outcome.sections.len(),
                    created,
                    rendered = self.state.rendered_count(),
                    "batch rendered"
                );
            }
            Err(err) => {
                tracing::error!(error = %err, "batch render failed");
                view.append_notice(Notice::error(BATCH_ERROR_MESSAGE));
            }
        }

        self.state.set_busy(false);
        self.refresh_control(view, listing_total)
    }

    /// Re-derives the control from the current counts.
    pub fn refresh_control<D>(&mut self, view: &mut D, listing_total: usize) -> Phase
    where
        D: DisplayTree + ?Sized,
    {
        if self.state.is_busy() {
            return self.phase;
        }
        let remaining = self.state.remaining(listing_total);
        if remaining > 0 {
            view.show_control(LoadMoreControl::ready(remaining));
            self.phase = Phase::Idle;
        } else {
            view.remove_control();
            self.phase = Phase::Exhausted;
        }
        self.phase
    }

    /// Back to an empty IDLE state. Outstanding tickets become stale.
    pub fn reset(&mut self) -> u64 {
        self.state.reset();
        self.phase = Phase::Idle;
        self.generation += 1;
        self.generation
    }
}
