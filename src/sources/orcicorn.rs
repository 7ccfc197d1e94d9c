use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_loose_date, KeySource};
use crate::models::Key;
use crate::normalization::game::resolve_game;
use crate::normalization::platform::resolve_platforms;

pub const DEFAULT_FEED_URL: &str = "https://shift.orcicorn.com/shift-code/index.json";

/// Community-maintained JSON feed of SHiFT codes with reward, game and
/// platform annotations.
#[derive(Debug, Clone)]
pub struct OrcicornSource {
    http: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedBody {
    Many(Vec<FeedDocument>),
    One(FeedDocument),
}

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    codes: Vec<FeedCode>,
}

#[derive(Debug, Deserialize)]
struct FeedCode {
    code: String,
    #[serde(default)]
    reward: Option<String>,
    #[serde(default)]
    game: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    expires: Option<String>,
}

impl OrcicornSource {
    pub fn new(url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("autoshift/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            http,
            url: url.unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
        })
    }
}

#[async_trait]
impl KeySource for OrcicornSource {
    fn name(&self) -> &'static str {
        "orcicorn"
    }

    async fn fetch(&self) -> Result<Vec<Key>> {
        let resp = self
            .http
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("code feed returned {status} for {}", self.url));
        }
        let body = resp.text().await?;
        let keys = parse_feed(&body, Utc::now())?;
        info!(url = %self.url, count = keys.len(), "code feed parsed");
        Ok(keys)
    }
}

/// Turn a feed document into keys, one per resolved platform, dropping
/// expired entries and entries for unknown games or platforms.
pub fn parse_feed(body: &str, now: DateTime<Utc>) -> Result<Vec<Key>> {
    let parsed: FeedBody = serde_json::from_str(body).context("decoding code feed")?;
    let documents = match parsed {
        FeedBody::Many(docs) => docs,
        FeedBody::One(doc) => vec![doc],
    };

    let mut keys = Vec::new();
    for entry in documents.into_iter().flat_map(|d| d.codes) {
        let code = entry.code.trim();
        if code.is_empty() {
            continue;
        }
        if let Some(expires) = entry.expires.as_deref().and_then(parse_loose_date) {
            if expires < now {
                debug!(code, %expires, "skipping expired code");
                continue;
            }
        }
        let Some(game) = entry.game.as_deref().and_then(resolve_game) else {
            debug!(code, game = ?entry.game, "skipping code for unknown game");
            continue;
        };
        let reward = entry
            .reward
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("Unknown reward");
        for platform in resolve_platforms(entry.platform.as_deref().unwrap_or("Universal")) {
            keys.push(Key::new(code, reward, game, platform));
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Game, Platform};
    use chrono::TimeZone;

    const FEED: &str = r#"[{
        "meta": {"version": "0.1"},
        "codes": [
            {"code": "AAAAA-AAAAA-AAAAA-AAAAA-AAAAA", "reward": "3 Golden Keys",
             "game": "Borderlands 3", "platform": "Universal", "expires": "Unknown"},
            {"code": "BBBBB-BBBBB-BBBBB-BBBBB-BBBBB", "reward": "Golden Key",
             "game": "Borderlands 2", "platform": "PC", "expires": "2020-01-01T00:00:00+00:00"},
            {"code": "CCCCC-CCCCC-CCCCC-CCCCC-CCCCC", "reward": "Skin",
             "game": "Borderlands 2", "platform": "PC"},
            {"code": "DDDDD-DDDDD-DDDDD-DDDDD-DDDDD", "reward": "Skin",
             "game": "Minecraft", "platform": "Steam"}
        ]
    }]"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parses_resolves_and_filters_expired() {
        let keys = parse_feed(FEED, now()).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].game, Game::Bl3);
        assert_eq!(keys[0].platform, Platform::Universal);
        assert_eq!(keys[0].golden_units(), 3);
        assert!(keys[1..].iter().all(|k| k.code.starts_with("CCCCC")));
        assert_eq!(keys[1].platform, Platform::Steam);
        assert_eq!(keys[2].platform, Platform::Epic);
    }

    #[test]
    fn accepts_a_single_document() {
        let body = r#"{"codes": [{"code": "X", "game": "bl3", "platform": "steam"}]}"#;
        let keys = parse_feed(body, now()).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].reward, "Unknown reward");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        assert!(parse_feed("<html>", now()).is_err());
    }
}
