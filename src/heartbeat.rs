use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::schedule::PaymentInterval;

/// Human readable `"9h 55m"` form of a minute count.
pub fn format_remaining(minutes: u32) -> String {
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

/// Log a countdown to the next payout run every `every` until cancelled.
///
/// Recomputes from the wall clock each time; it never looks at the scheduler.
pub async fn run(interval: PaymentInterval, every: Duration, cancel: CancellationToken) {
    tracing::info!(every_secs = every.as_secs(), "Heartbeat started");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Heartbeat stopping");
                break;
            }
            _ = ticker.tick() => {
                let now = Local::now();
                let minutes_remaining = interval.minutes_until_next(now.hour(), now.minute());
                tracing::info!(
                    minutes_remaining,
                    "Next payout run in {}",
                    format_remaining(minutes_remaining)
                );
            }
        }
    }
}
