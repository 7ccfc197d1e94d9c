//! Drives redemption of every (code, game, platform) permutation for one run.
use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::aggregator::KeyMap;
use crate::database_ops::KeyStore;
use crate::models::{Game, Key, Platform};
use crate::notify::{notify_best_effort, Notifier};
use crate::shift::{RedemptionClient, Status};
use crate::summary::RunSummary;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(60);
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub const TRY_LATER_TITLE: &str = "SHiFT Redemption: Try Later";
pub const TRY_LATER_BODY: &str = "Redemption stopped: SHiFT hourly limit reached.";

/// Sleep schedule for consecutive SLOWDOWN answers on one permutation.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Delay to wait now; doubles the following one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoldenFilter {
    #[default]
    Any,
    GoldenOnly,
    NonGoldenOnly,
}

#[derive(Debug, Clone)]
pub struct RedeemOptions {
    pub games: Vec<Game>,
    pub platforms: Vec<Platform>,
    pub filter: GoldenFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    AlreadyRedeemed,
    NotGolden,
    Golden,
    BudgetExhausted,
    BudgetInsufficient,
}

fn skip_reason(key: &Key, golden: u32, filter: GoldenFilter, budget: u32) -> Option<Skip> {
    if key.redeemed {
        return Some(Skip::AlreadyRedeemed);
    }
    match filter {
        GoldenFilter::GoldenOnly if golden == 0 => return Some(Skip::NotGolden),
        GoldenFilter::NonGoldenOnly if golden > 0 => return Some(Skip::Golden),
        _ => {}
    }
    if golden > 0 {
        if budget == 0 {
            return Some(Skip::BudgetExhausted);
        }
        if golden > budget {
            return Some(Skip::BudgetInsufficient);
        }
    }
    None
}

/// Every distinct code crossed with the requested games and platforms.
///
/// Triples present in `keys` keep their stored reward and redemption flag;
/// the rest become placeholders.
pub fn permutations(keys: &KeyMap, games: &[Game], platforms: &[Platform]) -> Vec<Key> {
    let mut codes: IndexSet<&str> = IndexSet::new();
    let mut known: HashMap<(&str, Game, Platform), &Key> = HashMap::new();
    for key in keys.values().flat_map(|by_platform| by_platform.values()).flatten() {
        codes.insert(key.code.as_str());
        known.entry(key.triple()).or_insert(key);
    }

    let mut out = Vec::with_capacity(codes.len() * games.len() * platforms.len());
    for code in &codes {
        for game in games {
            for platform in platforms {
                let key = match known.get(&(*code, *game, *platform)) {
                    Some(key) => (*key).clone(),
                    None => Key::placeholder(*code, *game, *platform),
                };
                out.push(key);
            }
        }
    }
    out
}

pub struct Orchestrator<'a> {
    store: &'a mut dyn KeyStore,
    client: &'a dyn RedemptionClient,
    notifier: &'a dyn Notifier,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a mut dyn KeyStore,
        client: &'a dyn RedemptionClient,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
        }
    }

    /// Attempt each permutation once. Per-permutation failures land in
    /// `summary`; `budget` shrinks by the golden units of each success.
    pub async fn redeem_all(
        &mut self,
        keys: &KeyMap,
        opts: &RedeemOptions,
        budget: &mut u32,
        summary: &mut RunSummary,
    ) {
        if opts.filter == GoldenFilter::GoldenOnly && *budget == 0 {
            info!("Not redeeming anything because the golden key limit is 0");
            return;
        }

        for key in permutations(keys, &opts.games, &opts.platforms) {
            let golden = key.golden_units();
            if let Some(reason) = skip_reason(&key, golden, opts.filter, *budget) {
                debug!(code = %key.code, game = %key.game, platform = %key.platform,
                    ?reason, "skipping");
                continue;
            }

            match self.redeem_with_backoff(&key).await {
                Ok(Status::Success) => {
                    *budget -= golden;
                    summary.record_success(&key);
                    if golden > 0 {
                        info!(remaining = *budget, "Redeeming another {budget} golden keys");
                    }
                }
                Ok(Status::TryLater) => {
                    summary.record_failure();
                    notify_best_effort(self.notifier, TRY_LATER_TITLE, TRY_LATER_BODY).await;
                }
                Ok(_) => summary.record_failure(),
                Err(err) => {
                    warn!(code = %key.code, platform = %key.platform, error = %err,
                        "redemption attempt failed");
                    summary.record_error(format!("{} ({}): {err:#}", key.code, key.platform));
                }
            }
        }
        info!("No more keys left!");
    }

    async fn redeem_with_backoff(&mut self, key: &Key) -> Result<Status> {
        let mut backoff = Backoff::default();
        loop {
            let status = self.attempt(key).await?;
            if status != Status::SlowDown {
                return Ok(status);
            }
            let delay = backoff.next_delay();
            info!(code = %key.code, platform = %key.platform, delay_secs = delay.as_secs(),
                "Trying again in {} seconds", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&mut self, key: &Key) -> Result<Status> {
        info!(
            "Trying to redeem {} ({}) on platform {}",
            key.reward, key.code, key.platform
        );
        let status = self
            .client
            .redeem(&key.code, key.game, key.platform)
            .await?;
        debug!(%status, code = %key.code, "redeem returned");

        if status.is_terminal() && !key.synthesized {
            self.store.mark_redeemed(key).await?;
        }
        info!("  {}", status.message(key));

        if status == Status::Success {
            notify_best_effort(
                self.notifier,
                &format!("SHiFT Key Redeemed: {}", key.reward),
                &format!("Redeemed {} ({}) on {}", key.reward, key.code, key.platform),
            )
            .await;
        }
        Ok(status)
    }
}
