// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Cancellable periodic background jobs.
//!
//! A [`PeriodicTask`] runs a job on a fixed period. A tick that arrives
//! while the previous run is still active is skipped and counted, never
//! queued, so a slow sweep cannot pile up behind itself.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Counters for one periodic task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// Runs started.
    pub runs: u64,
    /// Ticks skipped because a run was still active.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicU64,
    skipped: AtomicU64,
}

/// A named job repeated on a fixed period.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl PeriodicTask {
    /// Creates a task that has not been started yet.
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns `true` while the tick loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> TaskStats {
        TaskStats {
            runs: self.counters.runs.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Starts the tick loop. The first run happens one period from now.
    pub fn start<F, Fut>(&self, job: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);

        let name = self.name.clone();
        let period = self.period;
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::clone(&self.running);
        let in_flight = Arc::clone(&self.in_flight);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            info!(task = %name, period_ms = period.as_millis() as u64, "Periodic task started");

            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        if in_flight
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_err()
                        {
                            counters.skipped.fetch_add(1, Ordering::Relaxed);
                            debug!(task = %name, "Previous run still active, skipping tick");
                            continue;
                        }

                        counters.runs.fetch_add(1, Ordering::Relaxed);
                        let run = job();
                        let in_flight = Arc::clone(&in_flight);
                        tokio::spawn(async move {
                            run.await;
                            in_flight.store(false, Ordering::Release);
                        });
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!(task = %name, "Periodic task stopped");
        })
    }

    /// Stops the tick loop. A run already in flight completes on its own.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}
