//! Wall-clock payout scheduler.
//!
//! Fires at the top of every hour divisible by the payment interval. Each
//! firing checks the readiness gate, then awaits one `transfer_balances`
//! call. A failed run is logged and the loop carries on.
//!
//! The wait for the next boundary is cut into sleeps of at most
//! [`MAX_SLEEP`], and the wall clock is read again after each one. A host
//! suspend, an NTP step or a DST change therefore moves the firing by at
//! most that much. When the clock jumps past one or more boundaries, a
//! single run fires and the schedule resumes from the new time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::gate::ReadinessGate;
use crate::metrics::{MetricsPusher, RunReport};
use crate::schedule::PaymentInterval;
use crate::task::TaskManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    SkippedNotReady,
    SkippedInFlight,
}

/// Clears the in-flight flag when the run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One gated, non-overlapping invocation of the payout task.
pub struct PayoutJob {
    gate: ReadinessGate,
    task_manager: Arc<dyn TaskManager>,
    metrics: Option<MetricsPusher>,
    in_flight: AtomicBool,
}

impl PayoutJob {
    pub fn new(
        gate: ReadinessGate,
        task_manager: Arc<dyn TaskManager>,
        metrics: Option<MetricsPusher>,
    ) -> Self {
        Self {
            gate,
            task_manager,
            metrics,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn fire(&self) -> TickOutcome {
        if !self.gate.is_ready() {
            tracing::error!("Connection to node is not established; skipping payout run");
            return TickOutcome::SkippedNotReady;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("Previous payout run is still in progress; skipping");
            return TickOutcome::SkippedInFlight;
        }
        let _in_flight = InFlight(&self.in_flight);

        tracing::info!("Starting payout run");
        let started = Instant::now();

        let outcome = match self.task_manager.transfer_balances().await {
            Ok(()) => {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Payout run completed");
                TickOutcome::Completed
            }
            Err(e) => {
                tracing::error!(error = ?e, "Payout run failed");
                TickOutcome::Failed
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .push(&RunReport {
                    success: outcome == TickOutcome::Completed,
                    duration: started.elapsed(),
                    finished_at: Utc::now(),
                })
                .await;
        }

        outcome
    }
}

/// Longest single sleep between wall-clock readings.
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Source of local wall-clock time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Scheduler {
    job: Arc<PayoutJob>,
    interval: PaymentInterval,
    clock: Clock,
}

impl Scheduler {
    /// Scheduler driven by host local time.
    pub fn new(job: Arc<PayoutJob>, interval: PaymentInterval) -> Self {
        Self::with_clock(job, interval, Arc::new(|| Local::now().naive_local()))
    }

    pub fn with_clock(job: Arc<PayoutJob>, interval: PaymentInterval, clock: Clock) -> Self {
        Self {
            job,
            interval,
            clock,
        }
    }

    /// Run until `cancel` fires. A run already in progress is finished first.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_hours = self.interval.hours(),
            firing_hours = ?self.interval.firing_hours(),
            "Scheduler started"
        );

        let mut target = self.interval.next_firing_after((self.clock)());
        tracing::debug!(next_run = %target, "Next payout run scheduled");

        loop {
            let now = (self.clock)();
            if now >= target {
                self.job.fire().await;
                // Never fire the same boundary twice if the clock steps back.
                target = self.interval.next_firing_after((self.clock)().max(target));
                tracing::debug!(next_run = %target, "Next payout run scheduled");
                continue;
            }

            let wait = (target - now).to_std().unwrap_or_default().min(MAX_SLEEP);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
