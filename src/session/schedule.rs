use std::time::{Duration, Instant};

use crate::config::ScheduleOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScheduledTask {
    Reload,
    Diagnostic,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    every: Duration,
    next_due: Instant,
}

impl Interval {
    fn new(every: Duration, now: Instant) -> Self {
        Self {
            every,
            next_due: now + every,
        }
    }

    /// Fires at most once per call, even after a long stall.
    fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.every;
        true
    }
}

/// Periodic tasks of one session, driven from the tick loop.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    reload: Option<Interval>,
    diagnostic: Option<Interval>,
}

impl Schedule {
    pub fn new(reload: Option<Duration>, diagnostic: Option<Duration>, now: Instant) -> Self {
        Self {
            reload: reload.map(|every| Interval::new(every, now)),
            diagnostic: diagnostic.map(|every| Interval::new(every, now)),
        }
    }

    pub fn from_options(options: &ScheduleOptions, now: Instant) -> Self {
        Self::new(options.reload_interval(), options.diagnostic_interval(), now)
    }

    pub fn due(&mut self, now: Instant) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        if self.reload.as_mut().is_some_and(|i| i.poll(now)) {
            due.push(ScheduledTask::Reload);
        }
        if self.diagnostic.as_mut().is_some_and(|i| i.poll(now)) {
            due.push(ScheduledTask::Diagnostic);
        }
        due
    }

    /// Pushes the reload deadline out by a full period, e.g. after a manual
    /// refresh.
    pub fn postpone_reload(&mut self, now: Instant) {
        if let Some(reload) = &mut self.reload {
            reload.next_due = now + reload.every;
        }
    }

    pub fn cancel(&mut self) {
        self.reload = None;
        self.diagnostic = None;
    }

    pub fn is_active(&self) -> bool {
        self.reload.is_some() || self.diagnostic.is_some()
    }
}
