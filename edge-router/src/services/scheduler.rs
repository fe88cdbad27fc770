use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::services::sync::FeedbackSyncService;

/// Daily trigger time: 02:00 local.
const RUN_HOUR: u32 = 2;
const RUN_MINUTE: u32 = 0;
/// A tick that fires within this window after its scheduled time still runs.
const MISFIRE_GRACE_SECS: i64 = 3600;

fn next_run_after(now: DateTime<Local>) -> DateTime<Local> {
    let run_time = NaiveTime::from_hms_opt(RUN_HOUR, RUN_MINUTE, 0)
        .unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(run_time);
    let candidate = today
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        let tomorrow = now.date_naive() + ChronoDuration::days(1);
        tomorrow
            .and_time(run_time)
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or(now + ChronoDuration::days(1))
    }
}

/// Spawns the daily feedback-sync job.
///
/// Single-instance: an in-flight run makes an overlapping trigger a no-op
/// (coalesced). Ticks landing more than the grace window past their slot are
/// skipped as misfires. Sync failures are logged and never crash the server.
pub fn start_feedback_scheduler(sync: Arc<FeedbackSyncService>) -> JoinHandle<()> {
    let in_flight = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let next_run = next_run_after(now);
            let wait = (next_run - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            info!(next_run = %next_run, "Feedback sync scheduled");
            tokio::time::sleep(wait).await;

            let lateness = (Local::now() - next_run).num_seconds();
            if lateness > MISFIRE_GRACE_SECS {
                warn!(lateness_secs = lateness, "Skipping misfired feedback sync tick");
                continue;
            }

            if in_flight.swap(true, Ordering::SeqCst) {
                info!("Feedback sync already running; coalescing trigger");
                continue;
            }
            match sync.run_once().await {
                Ok(summary) => info!(
                    sent = summary.sent,
                    accepted = summary.accepted,
                    duplicates = summary.duplicates,
                    skipped = summary.skipped,
                    "feedback_sync summary"
                ),
                Err(err) => warn!(error = %err, "feedback_sync failed"),
            }
            in_flight.store(false, Ordering::SeqCst);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn next_run_is_today_before_two_am() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 0, 30, 0).single().expect("time");
        let next = next_run_after(now);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.date_naive(), now.date_naive());
    }

    #[test]
    fn next_run_is_tomorrow_after_two_am() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).single().expect("time");
        let next = next_run_after(now);
        assert_eq!(next.hour(), 2);
        assert_eq!(
            next.date_naive(),
            now.date_naive() + ChronoDuration::days(1)
        );
    }

    #[test]
    fn next_run_is_strictly_in_the_future() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 2, 0, 0).single().expect("time");
        assert!(next_run_after(now) > now);
    }
}
