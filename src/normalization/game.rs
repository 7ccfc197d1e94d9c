use strsim::jaro_winkler;

use crate::models::Game;

/// Minimum similarity score (Jaro-Winkler) required for a feed title to be
/// treated as one of the known games.
pub const MIN_GAME_SIMILARITY: f64 = 0.88;

/// Canonicalized game title used for fuzzy comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameKey {
    normalized: String,
    numeric_sig: Option<String>,
}

impl GameKey {
    /// Build a normalized comparison key from a raw game label.
    ///
    /// Normalization steps:
    /// - lowercase and remove punctuation/whitespace
    /// - drop edition suffixes ("goty", "gameoftheyearedition", "remastered")
    /// - expand the "bl" shorthand to "borderlands"
    /// - record the numeric signature so Borderlands 2 ≠ Borderlands 3
    pub fn new(raw: &str) -> Self {
        let alnum_only: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        let expanded = expand_shorthand(strip_edition_suffixes(&alnum_only));
        let digits: String = expanded.chars().filter(|c| c.is_ascii_digit()).collect();
        let numeric_sig = if digits.is_empty() { None } else { Some(digits) };

        Self {
            normalized: expanded,
            numeric_sig,
        }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether the numeric signatures are compatible (both empty or equal).
    pub fn numeric_compatible(&self, other: &Self) -> bool {
        match (&self.numeric_sig, &other.numeric_sig) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn similarity(&self, other: &Self) -> f64 {
        jaro_winkler(self.normalized(), other.normalized())
    }
}

fn strip_edition_suffixes(input: &str) -> &str {
    const SUFFIXES: [&str; 4] = ["gameoftheyearedition", "goty", "remastered", "enhanced"];
    let mut out = input;
    for suffix in SUFFIXES {
        if let Some(rest) = out.strip_suffix(suffix) {
            out = rest;
        }
    }
    out
}

fn expand_shorthand(input: &str) -> String {
    match input.strip_prefix("bl") {
        Some(rest) => format!("borderlands{rest}"),
        None => input.to_string(),
    }
}

/// Resolve a free-text game label ("Borderlands 3", "BL3", "bl3") to a known game.
pub fn resolve_game(label: &str) -> Option<Game> {
    if let Ok(game) = label.parse::<Game>() {
        return Some(game);
    }
    let probe = GameKey::new(label);
    if probe.normalized().is_empty() {
        return None;
    }
    // "borderlandsps" is how the Pre-Sequel shorthand normalizes
    if probe.normalized() == "borderlandsps" || probe.normalized() == "tps" {
        return Some(Game::Blps);
    }
    if probe.normalized() == "ttw" {
        return Some(Game::Ttw);
    }

    Game::ALL
        .into_iter()
        .map(|g| (g, GameKey::new(g.title())))
        .filter(|(_, key)| key.numeric_compatible(&probe))
        .map(|(g, key)| (g, key.similarity(&probe)))
        .filter(|(_, score)| *score >= MIN_GAME_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(g, _)| g)
}
