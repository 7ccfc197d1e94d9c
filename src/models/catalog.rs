use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Games the SHiFT service issues codes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Bl1,
    Bl2,
    Blps,
    Bl3,
    Ttw,
    Gdfll,
    Bl4,
}

impl Game {
    pub const ALL: [Game; 7] = [
        Game::Bl1,
        Game::Bl2,
        Game::Blps,
        Game::Bl3,
        Game::Ttw,
        Game::Gdfll,
        Game::Bl4,
    ];

    /// Short identifier used on the command line and in the key database.
    pub fn id(self) -> &'static str {
        match self {
            Game::Bl1 => "bl1",
            Game::Bl2 => "bl2",
            Game::Blps => "blps",
            Game::Bl3 => "bl3",
            Game::Ttw => "ttw",
            Game::Gdfll => "gdfll",
            Game::Bl4 => "bl4",
        }
    }

    /// Title as rendered above the redemption forms on the SHiFT website.
    pub fn title(self) -> &'static str {
        match self {
            Game::Bl1 => "Borderlands: Game of the Year Edition",
            Game::Bl2 => "Borderlands 2",
            Game::Blps => "Borderlands: The Pre-Sequel",
            Game::Bl3 => "Borderlands 3",
            Game::Ttw => "Tiny Tina's Wonderlands",
            Game::Gdfll => "Godfall",
            Game::Bl4 => "Borderlands 4",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Game {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Game::ALL
            .into_iter()
            .find(|g| g.id() == needle)
            .ok_or_else(|| anyhow!("unknown game `{s}`"))
    }
}

/// Platforms a code can be redeemed on. `Universal` is a sentinel for
/// "every concrete platform" and is expanded before redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Steam,
    Epic,
    Psn,
    Xboxlive,
    Stadia,
    Nintendo,
    Universal,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Steam,
        Platform::Epic,
        Platform::Psn,
        Platform::Xboxlive,
        Platform::Stadia,
        Platform::Nintendo,
        Platform::Universal,
    ];

    /// Every platform except `Universal`.
    pub fn concrete() -> impl Iterator<Item = Platform> {
        Self::ALL.into_iter().filter(|p| !p.is_universal())
    }

    pub fn is_universal(self) -> bool {
        self == Platform::Universal
    }

    /// Service identifier posted with a redemption form. Also the storage id.
    pub fn id(self) -> &'static str {
        match self {
            Platform::Steam => "steam",
            Platform::Epic => "epic",
            Platform::Psn => "psn",
            Platform::Xboxlive => "xboxlive",
            Platform::Stadia => "stadia",
            Platform::Nintendo => "nintendo",
            Platform::Universal => "universal",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.id() == needle)
            .ok_or_else(|| anyhow!("unknown platform `{s}`"))
    }
}
