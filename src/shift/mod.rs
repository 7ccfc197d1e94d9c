//! Redemption client seam: the SHiFT website client and the outcome of a single
//! redemption attempt.
pub mod client;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Game, Key, Platform};

pub use client::ShiftClient;

/// Outcome of one redemption attempt as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Code was already used on this account.
    Redeemed,
    Expired,
    /// Code does not exist or is not available for this game/platform.
    Invalid,
    /// Per-request throttling; retry the same permutation after a pause.
    SlowDown,
    /// Account-level throttling; stop trying this permutation for the run.
    TryLater,
    /// Anything the client could not classify.
    Unknown(String),
}

impl Status {
    /// Outcomes after which a triple is never attempted again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Redeemed | Status::Expired | Status::Invalid
        )
    }

    /// Human readable message for `key`.
    pub fn message(&self, key: &Key) -> String {
        match self {
            Status::Success => format!("Redeemed {}", key.reward),
            Status::Redeemed => format!("Already redeemed {}", key.reward),
            Status::Expired => format!("This code expired by now.. ({})", key.reward),
            Status::Invalid => format!("The code `{}` is invalid", key.code),
            Status::SlowDown => "Too many requests".to_string(),
            Status::TryLater => {
                "To continue to redeem SHiFT codes, please launch a SHiFT-enabled title first!"
                    .to_string()
            }
            Status::Unknown(msg) => format!("An unknown Error occured: {msg}"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => f.write_str("SUCCESS"),
            Status::Redeemed => f.write_str("REDEEMED"),
            Status::Expired => f.write_str("EXPIRED"),
            Status::Invalid => f.write_str("INVALID"),
            Status::SlowDown => f.write_str("SLOWDOWN"),
            Status::TryLater => f.write_str("TRYLATER"),
            Status::Unknown(msg) => write!(f, "UNKNOWN({msg})"),
        }
    }
}

/// Performs the authenticated redemption of one code for one (game, platform).
///
/// `Err` is reserved for transport, session and parsing failures; every
/// service-side verdict is a `Status`.
#[async_trait]
pub trait RedemptionClient: Send + Sync {
    /// Establish (or reuse) an authenticated session.
    async fn ensure_session(&self) -> Result<()> {
        Ok(())
    }

    async fn redeem(&self, code: &str, game: Game, platform: Platform) -> Result<Status>;

    /// Status returned by the most recent `redeem` call, if any.
    fn last_status(&self) -> Option<Status>;
}
