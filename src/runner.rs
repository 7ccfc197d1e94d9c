//! One redemption run per invocation, optionally repeated on a schedule.
use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregator::query_keys;
use crate::database_ops::KeyStore;
use crate::notify::{notify_best_effort, Notifier};
use crate::orchestrator::{Orchestrator, RedeemOptions};
use crate::shift::RedemptionClient;
use crate::summary::{RunSummary, SUMMARY_TITLE};

/// Shortest allowed gap between scheduled runs.
pub const MIN_SCHEDULE: Duration = Duration::from_secs(2 * 60 * 60);

/// Long-lived collaborators, built once per process and reused by every run.
pub struct Session {
    pub store: Box<dyn KeyStore>,
    pub client: Box<dyn RedemptionClient>,
    pub notifier: Box<dyn Notifier>,
}

impl Session {
    pub async fn run_once(
        &mut self,
        opts: &RedeemOptions,
        budget: &mut u32,
        summary: &mut RunSummary,
    ) -> Result<()> {
        run_once(
            self.store.as_mut(),
            self.client.as_ref(),
            self.notifier.as_ref(),
            opts,
            budget,
            summary,
        )
        .await
    }

    /// Run every `every` until Ctrl-C. The first run happens one interval
    /// from now; the caller has usually just finished one.
    pub async fn run_scheduled(
        &mut self,
        opts: &RedeemOptions,
        budget: &mut u32,
        every: Duration,
    ) -> Result<()> {
        tokio::select! {
            _ = self.schedule_loop(opts, budget, every) => Ok(()),
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("interrupted");
                Ok(())
            }
        }
    }

    async fn schedule_loop(&mut self, opts: &RedeemOptions, budget: &mut u32, every: Duration) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut summary = RunSummary::default();
            if let Err(err) = self.run_once(opts, budget, &mut summary).await {
                error!(error = %format!("{err:#}"), "scheduled run failed");
            }
            info!(hours = every.as_secs_f64() / 3600.0, "next run scheduled");
        }
    }
}

/// Clamp a requested schedule to [`MIN_SCHEDULE`].
pub fn schedule_interval(hours: f64) -> Duration {
    let requested = Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(Duration::ZERO);
    if requested < MIN_SCHEDULE {
        warn!(requested_hours = hours, "Running this tool every less than 2 hours would result in too many requests. Scheduling changed to run every 2 hours!");
        return MIN_SCHEDULE;
    }
    requested
}

/// Perform one complete run inside a single store transaction.
///
/// Whatever happens, `summary` is sent to `notifier` exactly once at the end.
/// A top-level failure is appended to the summary, the transaction is rolled
/// back and the error is returned.
pub async fn run_once(
    store: &mut dyn KeyStore,
    client: &dyn RedemptionClient,
    notifier: &dyn Notifier,
    opts: &RedeemOptions,
    budget: &mut u32,
    summary: &mut RunSummary,
) -> Result<()> {
    let outcome = run_in_transaction(store, client, notifier, opts, budget, summary).await;
    if let Err(err) = &outcome {
        error!(error = %format!("{err:#}"), "redemption run failed");
        summary.record_error(format!("{err:#}"));
        if let Err(rb) = store.rollback().await {
            warn!(error = %rb, "rollback after failed run also failed");
        }
    }

    notify_best_effort(notifier, SUMMARY_TITLE, &summary.render()).await;
    if let Some(status) = client.last_status() {
        debug!(%status, "last redemption status");
    }
    outcome
}

async fn run_in_transaction(
    store: &mut dyn KeyStore,
    client: &dyn RedemptionClient,
    notifier: &dyn Notifier,
    opts: &RedeemOptions,
    budget: &mut u32,
    summary: &mut RunSummary,
) -> Result<()> {
    store.begin().await?;
    client.ensure_session().await?;
    let keys = query_keys(store, &opts.games).await?;
    Orchestrator::new(store, client, notifier)
        .redeem_all(&keys, opts, budget, summary)
        .await;
    store.commit().await?;
    Ok(())
}
