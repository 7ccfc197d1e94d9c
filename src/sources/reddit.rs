use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use super::{parse_loose_date, KeySource};
use crate::models::{Game, Key, Platform, PLACEHOLDER_REWARD};
use crate::util::html::html_unescape;

pub const DEFAULT_REDDIT_URL: &str = "https://www.reddit.com/r/Borderlandsshiftcodes/.rss";

/// Codes posted to a subreddit, read from its RSS/Atom feed.
///
/// Posts carry no reward or platform data, so every code is emitted as a
/// universal placeholder for the configured game.
#[derive(Debug, Clone)]
pub struct RedditSource {
    http: Client,
    url: String,
    game: Game,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static feed pattern is valid"))
}

fn code_re() -> &'static Regex {
    static CODE: OnceLock<Regex> = OnceLock::new();
    regex(&CODE, r"[A-Z0-9]{5}(?:-[A-Z0-9]{5}){4}")
}

fn expiry_re() -> &'static Regex {
    static EXPIRY: OnceLock<Regex> = OnceLock::new();
    regex(
        &EXPIRY,
        r"(?i)(?:exp(?:ires|iration)?|valid until|until)\s*[-:]*\s*([^\n<]+)",
    )
}

impl RedditSource {
    pub fn new(url: Option<String>, game: Game) -> Result<Self> {
        let http = Client::builder()
            .user_agent("ShiftCodeChecker/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .context("building reddit http client")?;
        Ok(Self {
            http,
            url: url.unwrap_or_else(|| DEFAULT_REDDIT_URL.to_string()),
            game,
        })
    }
}

#[async_trait]
impl KeySource for RedditSource {
    fn name(&self) -> &'static str {
        "reddit"
    }

    async fn fetch(&self) -> Result<Vec<Key>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("reddit feed returned {status} for {}", self.url));
        }
        let body = resp.text().await?;
        let codes = valid_codes(&body, Utc::now());
        info!(url = %self.url, count = codes.len(), "reddit feed parsed");
        Ok(codes
            .into_iter()
            .map(|code| Key::new(code, PLACEHOLDER_REWARD, self.game, Platform::Universal))
            .collect())
    }
}

/// Split a feed into post bodies (Atom `<entry>` or RSS `<item>`), unescaped.
fn post_bodies(xml: &str) -> Vec<String> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    static CONTENT: OnceLock<Regex> = OnceLock::new();
    let entry = regex(&ENTRY, r"(?s)<(?:entry|item)\b[^>]*>(.*?)</(?:entry|item)>");
    let content = regex(
        &CONTENT,
        r"(?s)<(?:content|summary|description)\b[^>]*>(.*?)</(?:content|summary|description)>",
    );
    entry
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let inner = m.as_str();
            let text = content
                .captures(inner)
                .and_then(|c| c.get(1))
                .map(|c| c.as_str())
                .unwrap_or(inner);
            let text = text
                .trim()
                .trim_start_matches("<![CDATA[")
                .trim_end_matches("]]>");
            html_unescape(text)
        })
        .collect()
}

/// Codes and optional expiration mentioned in one post.
pub fn parse_post(body: &str) -> (Vec<String>, Option<DateTime<Utc>>) {
    let codes = code_re()
        .find_iter(body)
        .map(|m| m.as_str().to_string())
        .collect();
    let expires = expiry_re()
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_loose_date(m.as_str()));
    (codes, expires)
}

/// Distinct codes from posts that have not expired, in feed order.
pub fn valid_codes(xml: &str, now: DateTime<Utc>) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    for body in post_bodies(xml) {
        let (codes, expires) = parse_post(&body);
        if codes.is_empty() {
            continue;
        }
        if let Some(exp) = expires.filter(|exp| *exp < now) {
            debug!(expired = %exp, count = codes.len(), "skipping expired post");
            continue;
        }
        seen.extend(codes);
    }
    seen.into_iter().collect()
}
