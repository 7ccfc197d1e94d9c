use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalog::{Game, Platform};

/// Reward text given to permutations that no feed described.
pub const PLACEHOLDER_REWARD: &str = "Reddit code";

static GOLDEN_KEYS_RE: OnceLock<Regex> = OnceLock::new();

fn golden_keys_re() -> &'static Regex {
    GOLDEN_KEYS_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+)?\s*golden\s+keys?\b").expect("golden key pattern is valid")
    })
}

/// Number of golden keys a reward description grants.
///
/// "5 Golden Keys" -> 5, "Golden Key" -> 1, anything without the phrase -> 0.
/// A leading number that does not fit is treated as non-golden.
pub fn golden_units(reward: &str) -> u32 {
    let Some(caps) = golden_keys_re().captures(reward) else {
        return 0;
    };
    match caps.get(1) {
        Some(n) => n.as_str().parse::<u32>().unwrap_or(0),
        None => 1,
    }
}

/// One redeemable code for one (game, platform) pair.
///
/// The (code, game, platform) triple identifies redemption state. Values are
/// not mutated in place; `with_*` builders return an adjusted copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub code: String,
    pub reward: String,
    pub game: Game,
    pub platform: Platform,
    #[serde(default)]
    pub redeemed: bool,
    /// Built for a permutation with no stored record; never persisted.
    #[serde(skip)]
    pub synthesized: bool,
}

impl Key {
    pub fn new(code: impl Into<String>, reward: impl Into<String>, game: Game, platform: Platform) -> Self {
        Self {
            code: code.into(),
            reward: reward.into(),
            game,
            platform,
            redeemed: false,
            synthesized: false,
        }
    }

    /// Stand-in for a permutation no discovered record covers.
    pub fn placeholder(code: impl Into<String>, game: Game, platform: Platform) -> Self {
        Self {
            synthesized: true,
            ..Self::new(code, PLACEHOLDER_REWARD, game, platform)
        }
    }

    pub fn with_platform(&self, platform: Platform) -> Self {
        Self {
            platform,
            ..self.clone()
        }
    }

    #[cfg(test)]
    pub fn with_redeemed(&self, redeemed: bool) -> Self {
        Self {
            redeemed,
            ..self.clone()
        }
    }

    pub fn golden_units(&self) -> u32 {
        golden_units(&self.reward)
    }

    pub fn triple(&self) -> (&str, Game, Platform) {
        (self.code.as_str(), self.game, self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_golden_units_from_reward_text() {
        assert_eq!(golden_units("Reddit code"), 0);
        assert_eq!(golden_units("Golden Key"), 1);
        assert_eq!(golden_units("5 Golden Keys"), 5);
        assert_eq!(golden_units("3 golden keys + cosmetic"), 3);
        assert_eq!(golden_units("Diamond Key"), 0);
    }

    #[test]
    fn oversized_counts_are_not_golden() {
        assert_eq!(golden_units("99999999999999999999 Golden Keys"), 0);
    }

    #[test]
    fn with_platform_keeps_other_fields() {
        let key = Key::new("AAAA", "3 Golden Keys", Game::Bl3, Platform::Universal).with_redeemed(true);
        let steam = key.with_platform(Platform::Steam);
        assert_eq!(steam.platform, Platform::Steam);
        assert_eq!(steam.code, key.code);
        assert_eq!(steam.reward, key.reward);
        assert_eq!(steam.game, key.game);
        assert!(steam.redeemed);
        assert_eq!(key.platform, Platform::Universal);
    }
}
