use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn};

use super::key_store::KeyStore;
use crate::models::{Game, Key, Platform};
use crate::sources::KeySource;

/// Embedded schema migrations: (version, description, sql).
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "create_keys",
    include_str!("../../migrations/0001_create_keys.sql"),
)];

/// SQLite-backed key store.
///
/// The pool holds a single connection: while a run transaction is open every
/// query goes through it, so nothing else can observe a half-finished run.
pub struct KeyDb {
    pub pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    sources: Vec<Box<dyn KeySource>>,
}

impl KeyDb {
    /// Open (creating if needed) the database file at `path` and apply migrations.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    /// Connect using a `sqlite:` URL (e.g. `sqlite::memory:`).
    pub async fn connect_url(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite url `{url}`"))?
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("opening key database")?;
        Self::run_migrations(&pool).await?;
        info!("key database ready");
        Ok(Self {
            pool,
            tx: None,
            sources: Vec::new(),
        })
    }

    /// Discovery sources consulted by `refresh`.
    pub fn with_sources(mut self, sources: Vec<Box<dyn KeySource>>) -> Self {
        self.sources = sources;
        self
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT,
                installed_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
             )",
        )
        .execute(pool)
        .await?;

        let applied: HashSet<i64> = sqlx::query("SELECT version FROM _migrations")
            .fetch_all(pool)
            .await?
            .iter()
            .map(|r| r.try_get::<i64, _>(0))
            .collect::<Result<_, _>>()?;

        for (version, description, sql) in MIGRATIONS {
            if applied.contains(version) {
                continue;
            }
            info!(version, description, "applying migration");
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {version} ({description}) failed"))?;
            sqlx::query("INSERT INTO _migrations (version, description) VALUES (?, ?)")
                .bind(*version)
                .bind(*description)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Ok(())
    }

    /// Insert keys not seen before; existing triples keep their state.
    pub async fn insert_keys(&mut self, keys: &[Key]) -> Result<usize> {
        let mut inserted = 0usize;
        for key in keys {
            let query = sqlx::query(
                "INSERT OR IGNORE INTO keys (code, reward, game, platform) VALUES (?, ?, ?, ?)",
            )
            .bind(&key.code)
            .bind(&key.reward)
            .bind(key.game.id())
            .bind(key.platform.id());
            let result = match self.tx.as_mut() {
                Some(tx) => query.execute(&mut **tx).await?,
                None => query.execute(&self.pool).await?,
            };
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl KeyStore for KeyDb {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await.context("starting run transaction")?);
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.context("committing run transaction")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.context("rolling back run transaction")?;
        }
        Ok(())
    }

    async fn refresh(&mut self) -> Result<usize> {
        let mut discovered: Vec<Key> = Vec::new();
        for source in &self.sources {
            match source.fetch().await {
                Ok(keys) => {
                    debug!(source = source.name(), count = keys.len(), "fetched keys");
                    discovered.extend(keys);
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "key source failed; skipping");
                }
            }
        }
        self.insert_keys(&discovered).await
    }

    async fn list_keys(&mut self) -> Result<Vec<Key>> {
        let query = sqlx::query(
            "SELECT code, reward, game, platform, redeemed FROM keys ORDER BY id",
        );
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let game: String = row.try_get("game")?;
            let platform: String = row.try_get("platform")?;
            let (Ok(game), Ok(platform)) = (game.parse::<Game>(), platform.parse::<Platform>())
            else {
                warn!(%game, %platform, "skipping stored key with unknown game/platform");
                continue;
            };
            keys.push(Key {
                code: row.try_get("code")?,
                reward: row.try_get("reward")?,
                game,
                platform,
                redeemed: row.try_get("redeemed")?,
                synthesized: false,
            });
        }
        Ok(keys)
    }

    async fn mark_redeemed(&mut self, key: &Key) -> Result<()> {
        let query = sqlx::query(
            "INSERT INTO keys (code, reward, game, platform, redeemed) VALUES (?, ?, ?, ?, 1) \
             ON CONFLICT(code, game, platform) DO UPDATE SET redeemed = 1",
        )
        .bind(&key.code)
        .bind(&key.reward)
        .bind(key.game.id())
        .bind(key.platform.id());
        match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        debug!(code = %key.code, game = %key.game, platform = %key.platform, "marked redeemed");
        Ok(())
    }
}
