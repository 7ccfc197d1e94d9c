use std::collections::BTreeSet;

use crate::models::{Game, Key, Platform};

pub const SUMMARY_TITLE: &str = "SHiFT Redemption Summary";

/// Per-run tally, sent as one notification when the run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub redeemed: u32,
    pub failed: u32,
    pub games: BTreeSet<Game>,
    pub platforms: BTreeSet<Platform>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn record_success(&mut self, key: &Key) {
        self.redeemed += 1;
        self.games.insert(key.game);
        self.platforms.insert(key.platform);
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// A failure that also carries a message for the report.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(message.into());
    }

    pub fn render(&self) -> String {
        let mut body = format!(
            "Redeemed: {}\nFailed: {}\nGames: {}\nPlatforms: {}\n",
            self.redeemed,
            self.failed,
            join_or_none(self.games.iter().map(|g| g.id())),
            join_or_none(self.platforms.iter().map(|p| p.id())),
        );
        if !self.errors.is_empty() {
            body.push_str("Errors:\n");
            body.push_str(&self.errors.join("\n"));
        }
        body
    }
}

/// Ids sorted alphabetically, or `None` when empty.
fn join_or_none<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let mut ids: Vec<&str> = items.collect();
    ids.sort_unstable();
    let joined = ids.join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_renders_none_markers() {
        assert_eq!(
            RunSummary::default().render(),
            "Redeemed: 0\nFailed: 0\nGames: None\nPlatforms: None\n"
        );
    }

    #[test]
    fn platforms_render_in_id_order() {
        let mut summary = RunSummary::default();
        for platform in [Platform::Xboxlive, Platform::Steam, Platform::Epic] {
            summary.record_success(&Key::new("A", "Skin", Game::Ttw, platform));
        }
        summary.record_success(&Key::new("A", "Skin", Game::Bl2, Platform::Steam));
        assert!(summary.render().contains("Games: bl2, ttw\nPlatforms: epic, steam, xboxlive\n"));
    }

    #[test]
    fn successes_collect_games_and_platforms() {
        let mut summary = RunSummary::default();
        summary.record_success(&Key::new("A", "Golden Key", Game::Bl3, Platform::Steam));
        summary.record_success(&Key::new("B", "Golden Key", Game::Bl3, Platform::Epic));
        summary.record_failure();
        summary.record_error("B (epic): connection reset");

        assert_eq!(summary.redeemed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(
            summary.render(),
            "Redeemed: 2\nFailed: 2\nGames: bl3\nPlatforms: epic, steam\nErrors:\nB (epic): connection reset"
        );
    }
}
