//! Discovery sources feeding the key store.
pub mod orcicorn;
pub mod reddit;

use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;

use crate::models::Key;

pub use orcicorn::OrcicornSource;
pub use reddit::RedditSource;

/// Produces (code, reward, game, platform) records. Expired codes are
/// filtered out here, before they reach the store.
#[async_trait]
pub trait KeySource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self) -> Result<Vec<Key>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Orcicorn,
    Reddit,
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orcicorn" | "feed" | "json" => Ok(SourceKind::Orcicorn),
            "reddit" | "rss" => Ok(SourceKind::Reddit),
            other => Err(anyhow!("unknown key source `{other}`")),
        }
    }
}

/// Parse the free-form dates feeds use for expirations.
///
/// Accepts RFC 3339 timestamps and common written dates ("March 3, 2025",
/// "3rd March 2025", "03/03/2025", "2025-03-03"). Bare dates mean end of day
/// UTC. Returns `None` for anything else ("Unknown", "soon", dates without a
/// year).
pub fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let ordinal = ORDINAL.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("ordinal pattern is valid")
    });
    let cleaned = ordinal.replace_all(raw, "$1");
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', ';', ')', '!']))
        .collect();

    const FORMATS: [&str; 10] = [
        "%B %d, %Y",
        "%B %d %Y",
        "%b %d, %Y",
        "%b %d %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
    for take in (1..=words.len().min(3)).rev() {
        let candidate = words[..take].join(" ");
        for fmt in FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, fmt) {
                return Some(date.and_time(end_of_day).and_utc());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn parses_written_and_numeric_dates() {
        let d = parse_loose_date("March 3, 2025 10 AM PST").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2025, 3, 3));
        let d = parse_loose_date("3rd March 2025").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2025, 3, 3));
        let d = parse_loose_date("12/31/2024").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 12, 31));
        assert_eq!(
            parse_loose_date("2025-01-02T10:00:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn unknown_dates_are_none() {
        assert_eq!(parse_loose_date("Unknown"), None);
        assert_eq!(parse_loose_date("March 3"), None);
        assert_eq!(parse_loose_date(""), None);
    }

    #[test]
    fn source_kinds_parse() {
        assert_eq!("Reddit".parse::<SourceKind>().unwrap(), SourceKind::Reddit);
        assert_eq!("orcicorn".parse::<SourceKind>().unwrap(), SourceKind::Orcicorn);
        assert!("twitter".parse::<SourceKind>().is_err());
    }
}
