//! Reconciles discovered keys with known keys and distributes them across
//! concrete platforms.
use std::collections::BTreeMap;

use anyhow::Result;
use itertools::Itertools;
use tracing::info;

use crate::database_ops::KeyStore;
use crate::models::{Game, Key, Platform};

/// `game -> platform -> keys`, restricted to concrete platforms.
pub type KeyMap = BTreeMap<Game, BTreeMap<Platform, Vec<Key>>>;

/// Refresh the store from its sources and return the known keys for `games`,
/// with universal keys copied onto every concrete platform.
///
/// Logs how many keys arrived this run and the golden-key total available on
/// each (game, platform); the totals include already redeemed keys.
pub async fn query_keys(store: &mut dyn KeyStore, games: &[Game]) -> Result<KeyMap> {
    let before = store.list_keys().await?.len();
    store.refresh().await?;
    let keys = store.list_keys().await?;

    let diff = keys.len().saturating_sub(before);
    if diff == 0 {
        info!("done. (no new keys)");
    } else {
        info!("done. ({diff} new keys)");
    }

    let map = distribute(keys, games);
    for (game, platform, golden) in golden_counts(&map) {
        info!(
            %game, %platform, golden,
            "You have {golden} golden {} keys to redeem for {}",
            game.id().to_uppercase(),
            platform.id().to_uppercase()
        );
    }
    Ok(map)
}

/// Group `keys` by game (dropping games not in `games`) and by platform.
///
/// Every requested game gets an entry for every concrete platform, even when
/// empty. Universal keys are copied onto each concrete platform and never
/// appear themselves; concrete keys come first in each list.
pub fn distribute(keys: Vec<Key>, games: &[Game]) -> KeyMap {
    let mut map: KeyMap = games
        .iter()
        .map(|g| (*g, Platform::concrete().map(|p| (p, Vec::new())).collect()))
        .collect();

    let by_game = keys
        .into_iter()
        .filter(|k| games.contains(&k.game))
        .into_group_map_by(|k| k.game);

    for (game, game_keys) in by_game {
        let Some(platforms) = map.get_mut(&game) else {
            continue;
        };
        let (universal, concrete): (Vec<Key>, Vec<Key>) =
            game_keys.into_iter().partition(|k| k.platform.is_universal());
        for key in concrete {
            if let Some(list) = platforms.get_mut(&key.platform) {
                list.push(key);
            }
        }
        // A concrete row for the same code (e.g. one already marked redeemed)
        // takes the place of the universal copy.
        for key in universal {
            for (platform, list) in platforms.iter_mut() {
                if !list.iter().any(|k| k.code == key.code) {
                    list.push(key.with_platform(*platform));
                }
            }
        }
    }
    map
}

/// Golden keys available per (game, platform), redeemed or not.
///
/// Counted after [`distribute`], so a universal key shadowed by a stored
/// concrete row of the same code contributes once on that platform.
pub fn golden_counts(map: &KeyMap) -> Vec<(Game, Platform, u32)> {
    map.iter()
        .flat_map(|(game, platforms)| {
            platforms.iter().map(move |(platform, keys)| {
                let golden = keys.iter().map(Key::golden_units).sum::<u32>();
                (*game, *platform, golden)
            })
        })
        .collect()
}
