//! Payment interval and wall-clock schedule arithmetic.
//!
//! Both the scheduler and the heartbeat derive their timing from here, each
//! from the current clock reading, so neither depends on the other's timer.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::error::ConfigError;

const HOURS_PER_DAY: u32 = 24;

/// Hours between two scheduled payout runs, in `1..=24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentInterval(u32);

impl PaymentInterval {
    /// Derive the interval as `24 / payouts_per_day`.
    ///
    /// Signed input so that a negative setting is reported as out of range.
    pub fn from_payouts_per_day(payouts_per_day: i64) -> Result<Self, ConfigError> {
        let per_day = match u32::try_from(payouts_per_day) {
            Ok(n) if (1..=HOURS_PER_DAY).contains(&n) => n,
            _ => return Err(ConfigError::IntervalOutOfRange { payouts_per_day }),
        };
        if HOURS_PER_DAY % per_day != 0 {
            return Err(ConfigError::IntervalNotWhole { payouts_per_day });
        }
        Ok(Self(HOURS_PER_DAY / per_day))
    }

    pub fn hours(self) -> u32 {
        self.0
    }

    /// True when a run is due at the top of `hour`.
    pub fn is_firing_hour(self, hour: u32) -> bool {
        hour % self.0 == 0
    }

    /// Hours of the day at which runs fire, ascending.
    pub fn firing_hours(self) -> Vec<u32> {
        (0..HOURS_PER_DAY).filter(|h| self.is_firing_hour(*h)).collect()
    }

    /// The first firing instant strictly after `now`.
    pub fn next_firing_after(self, now: NaiveDateTime) -> NaiveDateTime {
        let mut candidate = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now)
            + Duration::hours(1);
        while !self.is_firing_hour(candidate.hour()) {
            candidate += Duration::hours(1);
        }
        candidate
    }

    /// Minutes left until the next firing, computed from the clock face.
    ///
    /// Exactly on a boundary this is 0 rather than a full interval.
    pub fn minutes_until_next(self, hour: u32, minute: u32) -> u32 {
        let span = self.0 * 60;
        let remaining = (self.0 - hour % self.0) * 60 - minute;
        if remaining == span {
            0
        } else {
            remaining
        }
    }
}
