//! Weekly report schedule in the configured local clock.

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, TimeZone, Weekday};
use tracing::{info, warn};

use crate::analysis::{MarketSelection, StockBot};
use crate::config::{ScheduleConfig, parse_clock};
use crate::watchlist::MarketId;

const STARTUP_MESSAGE: &str = "🤖 **Stock pulse bot started**\nScheduled analysis is now running";

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub market: MarketId,
    pub weekdays: Vec<Weekday>,
    pub at: NaiveTime,
}

impl ScheduledJob {
    pub fn selection(&self) -> MarketSelection {
        match self.market {
            MarketId::Tw => MarketSelection::Tw,
            MarketId::Us => MarketSelection::Us,
        }
    }

    /// First run strictly after `now`.
    pub fn next_after(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let offset = now.offset();
        (0..=7u64).find_map(|days| {
            let date = now.date_naive().checked_add_days(Days::new(days))?;
            if !self.weekdays.contains(&date.weekday()) {
                return None;
            }
            let candidate = offset.from_local_datetime(&date.and_time(self.at)).single()?;
            (candidate > now).then_some(candidate)
        })
    }
}

/// Taiwan after its close on weekdays; US the following local morning,
/// Tuesday through Saturday.
pub fn default_jobs(schedule: &ScheduleConfig) -> Result<Vec<ScheduledJob>> {
    use Weekday::*;
    Ok(vec![
        ScheduledJob {
            market: MarketId::Tw,
            weekdays: vec![Mon, Tue, Wed, Thu, Fri],
            at: parse_clock(&schedule.tw_market_close)?,
        },
        ScheduledJob {
            market: MarketId::Us,
            weekdays: vec![Tue, Wed, Thu, Fri, Sat],
            at: parse_clock(&schedule.us_market_close)?,
        },
    ])
}

/// Earliest upcoming job; ties go to the job listed first.
pub fn next_run(now: DateTime<FixedOffset>, jobs: &[ScheduledJob]) -> Option<(DateTime<FixedOffset>, &ScheduledJob)> {
    jobs.iter()
        .filter_map(|job| Some((job.next_after(now)?, job)))
        .min_by_key(|(at, _)| *at)
}

pub async fn run_scheduler(bot: &StockBot) -> Result<()> {
    let jobs = default_jobs(&bot.config().schedule)?;
    for job in &jobs {
        info!(market = job.market.key(), weekdays = ?job.weekdays, at = %job.at, "scheduled daily report");
    }

    bot.notifier().send_text(STARTUP_MESSAGE).await;

    let mut last_run: Option<DateTime<FixedOffset>> = None;
    loop {
        // A timer that fires a little early must not repeat the same slot.
        let now = match last_run {
            Some(last) => bot.now().max(last),
            None => bot.now(),
        };
        let Some((at, job)) = next_run(now, &jobs) else {
            bail!("no scheduled jobs");
        };
        info!(market = job.market.key(), at = %at, "next report");

        let wait = (at - bot.now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping scheduler");
                return Ok(());
            }
        }

        bot.send_daily_report(job.selection()).await;
        last_run = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taipei(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn jobs() -> Vec<ScheduledJob> {
        default_jobs(&ScheduleConfig::default()).unwrap()
    }

    #[test]
    fn monday_morning_runs_taiwan_first() {
        // 2024-05-06 is a Monday; no US job on Mondays.
        let jobs = jobs();
        let (at, job) = next_run(taipei(2024, 5, 6, 9, 0), &jobs).unwrap();
        assert_eq!(at, taipei(2024, 5, 6, 14, 30));
        assert_eq!(job.market, MarketId::Tw);
    }

    #[test]
    fn after_taiwan_close_waits_for_us_morning() {
        let jobs = jobs();
        let (at, job) = next_run(taipei(2024, 5, 6, 14, 30), &jobs).unwrap();
        assert_eq!(at, taipei(2024, 5, 7, 5, 30));
        assert_eq!(job.market, MarketId::Us);
    }

    #[test]
    fn saturday_after_us_report_skips_to_monday() {
        let jobs = jobs();
        let (at, job) = next_run(taipei(2024, 5, 11, 6, 0), &jobs).unwrap();
        assert_eq!(at, taipei(2024, 5, 13, 14, 30));
        assert_eq!(job.market, MarketId::Tw);
    }

    #[test]
    fn same_weekday_next_week() {
        let job = ScheduledJob {
            market: MarketId::Us,
            weekdays: vec![Weekday::Mon],
            at: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        };
        assert_eq!(job.next_after(taipei(2024, 5, 6, 9, 0)), Some(taipei(2024, 5, 13, 8, 0)));
        assert_eq!(job.selection(), MarketSelection::Us);
    }

    #[test]
    fn invalid_clock_is_rejected() {
        let schedule = ScheduleConfig {
            tw_market_close: "25:00".into(),
            us_market_close: "05:30".into(),
        };
        assert!(default_jobs(&schedule).is_err());
        assert!(next_run(taipei(2024, 5, 6, 9, 0), &[]).is_none());
    }
}
