//! In-memory collaborators for unit tests.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::database_ops::KeyStore;
use crate::models::{Game, Key, Platform};
use crate::notify::Notifier;
use crate::shift::{RedemptionClient, Status};
use crate::sources::KeySource;

pub struct StaticSource {
    keys: Vec<Key>,
    fail: bool,
}

impl StaticSource {
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            keys: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl KeySource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<Key>> {
        if self.fail {
            return Err(anyhow!("source unavailable"));
        }
        Ok(self.keys.clone())
    }
}

/// Key store with the same transaction semantics as the SQLite one: changes
/// made after `begin` are visible immediately and kept only on `commit`.
#[derive(Default)]
pub struct MemoryKeyStore {
    committed: Vec<Key>,
    staged: Option<Vec<Key>>,
    pending: Vec<Key>,
    pub marked: Vec<Key>,
    pub refreshes: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub fail_listing: bool,
}

impl MemoryKeyStore {
    /// Keys already stored before the test starts.
    pub fn with_keys(mut self, keys: Vec<Key>) -> Self {
        self.committed = keys;
        self
    }

    /// Keys the next `refresh` discovers.
    pub fn with_pending(mut self, keys: Vec<Key>) -> Self {
        self.pending = keys;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn keys(&self) -> &[Key] {
        self.staged.as_deref().unwrap_or(&self.committed)
    }

    fn current(&mut self) -> &mut Vec<Key> {
        match self.staged.as_mut() {
            Some(staged) => staged,
            None => &mut self.committed,
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn begin(&mut self) -> Result<()> {
        if self.staged.is_none() {
            self.staged = Some(self.committed.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(staged) = self.staged.take() {
            self.committed = staged;
        }
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        self.rollbacks += 1;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<usize> {
        self.refreshes += 1;
        let pending = std::mem::take(&mut self.pending);
        let current = self.current();
        let mut inserted = 0;
        for key in pending {
            if !current.iter().any(|k| k.triple() == key.triple()) {
                current.push(key);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_keys(&mut self) -> Result<Vec<Key>> {
        if self.fail_listing {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.keys().to_vec())
    }

    async fn mark_redeemed(&mut self, key: &Key) -> Result<()> {
        let current = self.current();
        match current.iter_mut().find(|k| k.triple() == key.triple()) {
            Some(stored) => stored.redeemed = true,
            None => current.push(key.with_redeemed(true)),
        }
        self.marked.push(key.clone());
        Ok(())
    }
}

type Triple = (String, Game, Platform);

/// Redemption client answering from a per-triple script, falling back to a
/// fixed status once a script runs out.
pub struct ScriptedClient {
    default: Status,
    scripts: Mutex<HashMap<Triple, VecDeque<Result<Status, String>>>>,
    calls: Mutex<Vec<Triple>>,
    last: Mutex<Option<Status>>,
    session_error: Option<String>,
}

impl ScriptedClient {
    pub fn new(default: Status) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            last: Mutex::new(None),
            session_error: None,
        }
    }

    pub fn script(
        self,
        code: &str,
        game: Game,
        platform: Platform,
        answers: Vec<Result<Status, String>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((code.to_string(), game, platform), answers.into());
        self
    }

    pub fn failing_session(mut self, message: &str) -> Self {
        self.session_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Triple> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedemptionClient for ScriptedClient {
    async fn ensure_session(&self) -> Result<()> {
        match &self.session_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn redeem(&self, code: &str, game: Game, platform: Platform) -> Result<Status> {
        let triple = (code.to_string(), game, platform);
        self.calls.lock().unwrap().push(triple.clone());
        let answer = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&triple)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(self.default.clone()));
        let status = answer.map_err(|message| anyhow!(message))?;
        *self.last.lock().unwrap() = Some(status.clone());
        Ok(status)
    }

    fn last_status(&self) -> Option<Status> {
        self.last.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|(title, _)| title).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
