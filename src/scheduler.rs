//! Cron-driven operation: sleep until the next scheduled time, then run
//! cycles until the backlog is drained. A run that overlaps the next
//! scheduled time is coalesced; the following fire time is computed after
//! the run finishes.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::CycleEngine;

pub struct CycleSchedule {
    schedule: Schedule,
    expr: String,
}

impl CycleSchedule {
    /// Parse a six or seven field cron expression (seconds first).
    pub fn parse(expr: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expr)
            .with_context(|| format!("Invalid cron expression: {:?}", expr))?;
        Ok(Self {
            schedule,
            expr: expr.to_string(),
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Run the engine on `schedule` until `cancel` fires.
pub async fn run_scheduler(
    engine: &mut CycleEngine,
    schedule: &CycleSchedule,
    cancel: &CancellationToken,
) {
    info!("Scheduler started with cron {:?}", schedule.expr());
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_fire(now) else {
            warn!("Cron {:?} has no future fire time, stopping", schedule.expr());
            break;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("Next scheduled run at {}", next);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown requested, scheduler stopping");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        let cycles = engine.run_continuous(None, cancel).await;
        info!("Scheduled run finished after {} cycles", cycles);
        if cancel.is_cancelled() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_accepts_daily_expression() {
        let schedule = CycleSchedule::parse("0 0 2 * * *").unwrap();
        assert_eq!(schedule.expr(), "0 0 2 * * *");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CycleSchedule::parse("not a cron").is_err());
        assert!(CycleSchedule::parse("99 99 99 * * *").is_err());
    }

    #[test]
    fn test_next_fire_is_the_following_2am() {
        let schedule = CycleSchedule::parse("0 0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap();
        let next = schedule.next_fire(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fire_same_day_before_2am() {
        let schedule = CycleSchedule::parse("0 0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 10, 1, 0, 0).unwrap();
        let next = schedule.next_fire(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap());
    }
}
