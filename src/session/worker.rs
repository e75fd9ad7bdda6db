use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError};

use crate::gallery::{Item, ItemId, Listing, PendingItem};
use crate::source::{CachePolicy, ItemSource, SourceError};

#[derive(Debug)]
pub enum Job {
    Fetch { generation: u64, cache: CachePolicy },
    Resolve { generation: u64, pending: Vec<PendingItem> },
    Diagnose,
}

/// Items resolved for one batch. Per-item failures are reported as
/// unresolved ids; only an authorization failure fails the whole batch.
#[derive(Debug, Default)]
pub struct ResolvedBatch {
    pub items: Vec<Item>,
    pub unresolved: Vec<ItemId>,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Listed {
        generation: u64,
        result: Result<Listing, SourceError>,
    },
    Resolved {
        generation: u64,
        result: Result<ResolvedBatch, SourceError>,
    },
    Diagnosed {
        result: Result<String, SourceError>,
    },
}

/// Runs source calls off the UI thread. The inline flavour runs each job as
/// it is submitted, which keeps the CLI and tests deterministic.
pub struct Worker {
    source: Arc<dyn ItemSource>,
    mode: Mode,
}

enum Mode {
    Inline {
        queued: VecDeque<WorkerEvent>,
    },
    Threaded {
        /// Dropped to stop the worker; nothing is ever sent on it.
        stop: Option<Sender<()>>,
        jobs: Option<Sender<Job>>,
        events: Receiver<WorkerEvent>,
        handle: Option<JoinHandle<()>>,
    },
}

impl Worker {
    pub fn inline(source: Arc<dyn ItemSource>) -> Self {
        Self {
            source,
            mode: Mode::Inline {
                queued: VecDeque::new(),
            },
        }
    }

    pub fn spawn(source: Arc<dyn ItemSource>) -> std::io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (event_tx, event_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread_source = Arc::clone(&source);
        let handle = thread::Builder::new()
            .name("gallery-worker".to_string())
            .spawn(move || {
                'jobs: loop {
                    select! {
                        recv(stop_rx) -> _ => break 'jobs,
                        recv(job_rx) -> job => {
                            let Ok(job) = job else { break 'jobs };
                            // Both arms may be ready at once; queued jobs never outrun a stop.
                            if stop_requested(&stop_rx) {
                                break 'jobs;
                            }
                            let event = run_job(thread_source.as_ref(), job);
                            if event_tx.send(event).is_err() {
                                break 'jobs;
                            }
                        }
                    }
                }
                tracing::debug!("gallery worker exiting");
            })?;
        Ok(Self {
            source,
            mode: Mode::Threaded {
                stop: Some(stop_tx),
                jobs: Some(job_tx),
                events: event_rx,
                handle: Some(handle),
            },
        })
    }

    pub fn source(&self) -> &dyn ItemSource {
        self.source.as_ref()
    }

    pub fn submit(&mut self, job: Job) {
        match &mut self.mode {
            Mode::Inline { queued } => queued.push_back(run_job(self.source.as_ref(), job)),
            Mode::Threaded { jobs, .. } => {
                let sent = jobs.as_ref().map(|tx| tx.send(job).is_ok()).unwrap_or(false);
                if !sent {
                    tracing::error!("gallery worker is gone; job dropped");
                }
            }
        }
    }

    pub fn try_next(&mut self) -> Option<WorkerEvent> {
        match &mut self.mode {
            Mode::Inline { queued } => queued.pop_front(),
            Mode::Threaded { events, .. } => match events.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("gallery worker disconnected");
                    None
                }
            },
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Mode::Threaded {
            stop, jobs, handle, ..
        } = &mut self.mode
        {
            // The job in flight runs to completion; queued jobs are discarded.
            drop(stop.take());
            drop(jobs.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::error!("gallery worker panicked");
                }
            }
        }
    }
}

fn stop_requested(stop: &Receiver<()>) -> bool {
    matches!(stop.try_recv(), Err(TryRecvError::Disconnected))
}

fn run_job(source: &dyn ItemSource, job: Job) -> WorkerEvent {
    match job {
        Job::Fetch { generation, cache } => {
            let result = source.list_all(cache);
            match &result {
                Ok(listing) => tracing::info!(
                    generation,
                    items = listing.total_items(),
                    kind = %source.kind(),
                    "listing fetched"
                ),
                Err(err) => tracing::error!(generation, error = %err, "listing fetch failed"),
            }
            WorkerEvent::Listed { generation, result }
        }
        Job::Resolve {
            generation,
            pending,
        } => WorkerEvent::Resolved {
            generation,
            result: resolve_batch(source, &pending),
        },
        Job::Diagnose => WorkerEvent::Diagnosed {
            result: source.check(),
        },
    }
}

fn resolve_batch(source: &dyn ItemSource, pending: &[PendingItem]) -> Result<ResolvedBatch, SourceError> {
    let mut batch = ResolvedBatch::default();
    for entry in pending {
        match source.fetch_detail(entry) {
            Ok(item) => batch.items.push(item),
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                tracing::warn!(name = %entry.name, error = %err, "skipping item without metadata");
                batch.unresolved.push(entry.id.clone());
            }
        }
    }
    tracing::debug!(
        resolved = batch.items.len(),
        skipped = batch.unresolved.len(),
        "resolved batch details"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ItemSource for SlowSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Fixture
        }

        fn list_all(&self, _cache: CachePolicy) -> Result<Listing, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(Listing::Flat(Vec::new()))
        }

        fn fetch_detail(&self, pending: &PendingItem) -> Result<Item, SourceError> {
            Err(SourceError::Metadata {
                name: pending.name.clone(),
                reason: "not used".to_string(),
            })
        }
    }

    fn slow_source(delay: Duration) -> Arc<SlowSource> {
        Arc::new(SlowSource {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn threaded_worker_delivers_events() -> anyhow::Result<()> {
        let source = slow_source(Duration::ZERO);
        let mut worker = Worker::spawn(source.clone())?;
        worker.submit(Job::Fetch {
            generation: 7,
            cache: CachePolicy::Default,
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        let event = loop {
            if let Some(event) = worker.try_next() {
                break event;
            }
            assert!(Instant::now() < deadline, "worker never answered");
            thread::sleep(Duration::from_millis(5));
        };
        assert!(matches!(
            event,
            WorkerEvent::Listed {
                generation: 7,
                result: Ok(_)
            }
        ));
        Ok(())
    }

    #[test]
    fn dropping_the_worker_discards_queued_jobs() -> anyhow::Result<()> {
        let source = slow_source(Duration::from_millis(300));
        let mut worker = Worker::spawn(source.clone())?;
        for generation in 0..5 {
            worker.submit(Job::Fetch {
                generation,
                cache: CachePolicy::Default,
            });
        }
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        drop(worker);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(600), "drop waited {elapsed:?}");
        assert!(source.calls.load(Ordering::SeqCst) <= 1);
        Ok(())
    }
}
