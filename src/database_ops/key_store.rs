use anyhow::Result;
use async_trait::async_trait;

use crate::models::Key;

/// Persistence for discovered keys and their redemption state.
///
/// A run brackets its work with `begin` and `commit`/`rollback`; every call in
/// between goes through that one transaction.
#[async_trait]
pub trait KeyStore: Send {
    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;

    /// Pull keys from the discovery sources. Returns how many rows were new.
    async fn refresh(&mut self) -> Result<usize>;

    async fn list_keys(&mut self) -> Result<Vec<Key>>;

    /// Record the (code, game, platform) triple of `key` as consumed.
    async fn mark_redeemed(&mut self, key: &Key) -> Result<()>;
}
