use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::source::TieredKeySource;

#[derive(Debug, Clone, Copy)]
pub struct KeyPoolConfig {
    /// How long a key sits out after a rate/quota failure.
    pub cooldown: Duration,
    /// Elapsed time after which a selection triggers a reload.
    pub staleness: Duration,
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(24 * 60 * 60),
            staleness: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct KeyRecord {
    secret: String,
    fail_count: u32,
    cooldown_until: Option<Instant>,
    last_used_at: Option<OffsetDateTime>,
}

impl KeyRecord {
    fn fresh(secret: String) -> Self {
        Self {
            secret,
            fail_count: 0,
            cooldown_until: None,
            last_used_at: None,
        }
    }

    fn usable(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) => until <= now,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    records: Vec<KeyRecord>,
    cursor: usize,
    loaded_at: Option<Instant>,
}

/// Round-robin key pool with lazy cooldown checking. All mutating
/// operations are short synchronous critical sections; file I/O for
/// reloads happens before the lock is taken.
pub struct KeyStore {
    source: TieredKeySource,
    config: KeyPoolConfig,
    inner: Mutex<PoolInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub cooling: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub key: String,
    pub fail_count: u32,
    pub cooling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
}

impl KeyStore {
    pub fn new(source: TieredKeySource, config: KeyPoolConfig) -> Self {
        Self {
            source,
            config,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Picks the next usable key, reloading first when the on-disk
    /// set may have changed. Returns `None` only for an empty pool.
    ///
    /// When every key is cooling down this still hands one out
    /// (availability over correctness): slot 0 is returned and the
    /// cursor moves to 1 so the next exhausted scan starts elsewhere.
    pub async fn select(&self) -> Option<String> {
        if self.is_stale() {
            self.reload().await;
        }

        let mut inner = self.lock();
        let len = inner.records.len();
        if len == 0 {
            return None;
        }

        let now = Instant::now();
        let cursor = inner.cursor;
        for i in 0..len {
            let idx = (cursor + i) % len;
            if inner.records[idx].usable(now) {
                inner.records[idx].last_used_at = Some(OffsetDateTime::now_utc());
                inner.cursor = (idx + 1) % len;
                return Some(inner.records[idx].secret.clone());
            }
        }

        let record = &mut inner.records[0];
        record.last_used_at = Some(OffsetDateTime::now_utc());
        let secret = record.secret.clone();
        warn!(key = %mask_secret(&secret), "all keys cooling down, forcing selection");
        inner.cursor = if len > 1 { 1 } else { 0 };
        Some(secret)
    }

    /// Quarantines every slot holding this secret. Unknown secrets
    /// are a no-op.
    pub fn mark_failure(&self, secret: &str) {
        let until = Instant::now() + self.config.cooldown;
        let mut inner = self.lock();
        let mut hit = false;
        for record in inner.records.iter_mut().filter(|r| r.secret == secret) {
            record.fail_count += 1;
            record.cooldown_until = Some(until);
            hit = true;
        }
        if hit {
            warn!(
                key = %mask_secret(secret),
                cooldown_secs = self.config.cooldown.as_secs(),
                "key quarantined after rate/quota failure"
            );
        }
    }

    /// Clears failure state for this secret; other records are
    /// untouched. Unknown secrets are a no-op.
    pub fn mark_success(&self, secret: &str) {
        let mut inner = self.lock();
        for record in inner.records.iter_mut().filter(|r| r.secret == secret) {
            record.fail_count = 0;
            record.cooldown_until = None;
        }
    }

    /// Re-reads the highest-priority non-empty tier file and replaces
    /// the record list. Status carries over for secrets present in
    /// both the old and new sets; the cursor resets only when it
    /// would land out of bounds. When no candidate qualifies the
    /// current set is kept.
    pub async fn reload(&self) {
        let loaded = self.source.load().await;

        let mut inner = self.lock();
        inner.loaded_at = Some(Instant::now());
        let Some(loaded) = loaded else {
            warn!(
                keys = inner.records.len(),
                "no key file available, keeping current pool"
            );
            return;
        };

        let old = std::mem::take(&mut inner.records);
        let mut by_secret: HashMap<String, KeyRecord> = HashMap::new();
        for record in old {
            by_secret.entry(record.secret.clone()).or_insert(record);
        }

        inner.records = loaded
            .secrets
            .into_iter()
            .map(|secret| match by_secret.get(&secret) {
                Some(prev) => KeyRecord {
                    secret,
                    fail_count: prev.fail_count,
                    cooldown_until: prev.cooldown_until,
                    last_used_at: prev.last_used_at,
                },
                None => KeyRecord::fresh(secret),
            })
            .collect();
        if inner.cursor >= inner.records.len() {
            inner.cursor = 0;
        }
        info!(
            path = %loaded.path.display(),
            keys = inner.records.len(),
            "key pool reloaded"
        );
    }

    /// Administrative reset: every key usable again, cursor at 0.
    pub fn reset_all(&self) {
        let mut inner = self.lock();
        for record in inner.records.iter_mut() {
            record.fail_count = 0;
            record.cooldown_until = None;
        }
        inner.cursor = 0;
        info!(keys = inner.records.len(), "key pool reset");
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        let now = Instant::now();
        let total = inner.records.len();
        let available = inner.records.iter().filter(|r| r.usable(now)).count();
        PoolStats {
            total,
            available,
            cooling: total - available,
        }
    }

    pub fn detailed_status(&self) -> Vec<KeyStatus> {
        let inner = self.lock();
        let now = Instant::now();
        inner
            .records
            .iter()
            .map(|record| {
                let remaining = record
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map(|until| until.duration_since(now).as_secs());
                KeyStatus {
                    key: mask_secret(&record.secret),
                    fail_count: record.fail_count,
                    cooling: remaining.is_some(),
                    cooldown_remaining_secs: remaining,
                    last_used_at: record
                        .last_used_at
                        .and_then(|at| at.format(&Rfc3339).ok()),
                }
            })
            .collect()
    }

    fn is_stale(&self) -> bool {
        let inner = self.lock();
        match inner.loaded_at {
            Some(at) => at.elapsed() >= self.config.staleness,
            None => true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        // The lock is only held across synchronous sections; poisoning
        // would mean a panic mid-update, which we treat as fatal.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Masked form safe for logs and admin output: first and last four
/// characters with the middle elided.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
