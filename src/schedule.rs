//! Recurring run schedule
//!
//! Equivalent to a cron entry of the form `M1,M2 H1-H2 * * *` evaluated in
//! a fixed UTC offset (Asia/Seoul by default).

use crate::config::ScheduleSettings;
use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Days, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    offset: FixedOffset,
}

impl Schedule {
    /// # Errors
    /// Returns `ConfigError::Invalid` for empty lists, out-of-range values
    /// or an impossible offset
    pub fn new(mut minutes: Vec<u32>, mut hours: Vec<u32>, offset_hours: i32) -> ConfigResult<Self> {
        minutes.sort_unstable();
        minutes.dedup();
        hours.sort_unstable();
        hours.dedup();

        if minutes.is_empty() || minutes.iter().any(|m| *m > 59) {
            return Err(ConfigError::Invalid("schedule minutes must be in 0..=59".into()));
        }
        if hours.is_empty() || hours.iter().any(|h| *h > 23) {
            return Err(ConfigError::Invalid("schedule hours must be in 0..=23".into()));
        }
        let offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ConfigError::Invalid(format!("invalid UTC offset: {} hours", offset_hours))
        })?;

        Ok(Self {
            minutes,
            hours,
            offset,
        })
    }

    pub fn from_settings(settings: &ScheduleSettings) -> ConfigResult<Self> {
        Self::new(
            settings.minutes.clone(),
            settings.hours.clone(),
            settings.utc_offset_hours,
        )
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();

        // Every day has a fire time, so today or tomorrow always matches
        for day in [today, today.checked_add_days(Days::new(1))?] {
            for hour in &self.hours {
                for minute in &self.minutes {
                    let Some(time) = NaiveTime::from_hms_opt(*hour, *minute, 0) else {
                        continue;
                    };
                    let Some(candidate) = self.offset.from_local_datetime(&day.and_time(time)).single()
                    else {
                        continue;
                    };
                    if candidate > local {
                        return Some(candidate.with_timezone(&Utc));
                    }
                }
            }
        }
        None
    }

    /// Time left until the next fire time, from the wall clock
    pub fn wait_from_now(&self) -> Option<(DateTime<Utc>, Duration)> {
        let now = Utc::now();
        let next = self.next_after(now)?;
        Some((next, (next - now).to_std().unwrap_or_default()))
    }
}

/// Why [`run_until`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Interrupted,
    /// `next_wait` had no further fire time
    Exhausted,
}

/// Sleep for each wait `next_wait` yields, then run `job`, until `shutdown`
/// resolves.
///
/// `shutdown` is polled first and stays armed across iterations, so it
/// also cancels a job in flight.
pub async fn run_until<W, S, J, F>(mut next_wait: W, shutdown: S, mut job: J) -> Stop
where
    W: FnMut() -> Option<Duration>,
    S: Future<Output = ()>,
    J: FnMut() -> F,
    F: Future<Output = ()>,
{
    let mut shutdown = pin!(shutdown);
    loop {
        let Some(wait) = next_wait() else {
            return Stop::Exhausted;
        };
        let tick = async {
            tokio::time::sleep(wait).await;
            job().await;
        };
        tokio::select! {
            biased;
            _ = &mut shutdown => return Stop::Interrupted,
            _ = tick => {}
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            minutes: vec![0, 30],
            hours: (9..=18).collect(),
            offset: FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}
