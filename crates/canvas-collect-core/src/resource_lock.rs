//! Process-local mutual exclusion keyed by `team:tag`.
//!
//! An entry older than the TTL is treated as unlocked by `acquire`, so a run
//! that crashed without releasing self-heals. The periodic sweep only trims
//! memory; `acquire` is authoritative.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle, time::Instant};

pub const LOCK_TTL: Duration = Duration::from_secs(3 * 60);
pub const LOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    acquired_at: Instant,
}

struct LockSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct ResourceLock {
    ttl: Duration,
    entries: Mutex<HashMap<String, LockEntry>>,
    sweeper: Mutex<Option<LockSweeper>>,
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("ttl", &self.ttl)
            .field("held", &self.lock_entries().len())
            .finish()
    }
}

impl ResourceLock {
    /// Builds a lock table without a background sweep.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Builds a lock table and spawns its sweep task on the current tokio runtime.
    pub fn with_sweeper(ttl: Duration, sweep_interval: Duration) -> Arc<Self> {
        let lock = Arc::new(Self::new(ttl));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let weak = Arc::downgrade(&lock);
        let period = sweep_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    _ = interval.tick() => {
                        let Some(lock) = weak.upgrade() else {
                            return;
                        };
                        let removed = lock.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "resource lock sweep removed expired entries");
                        }
                    }
                }
            }
        });
        *lock.lock_sweeper() = Some(LockSweeper {
            shutdown_tx,
            handle,
        });
        lock
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Atomically claims `key`; returns false while a live entry exists.
    pub fn acquire(&self, key: &str) -> bool {
        self.claim(key).is_some()
    }

    /// Claims `key` and returns a guard that releases it on drop.
    pub fn try_guard(self: &Arc<Self>, key: &str) -> Option<ResourceLockGuard> {
        let acquired_at = self.claim(key)?;
        Some(ResourceLockGuard {
            lock: Arc::clone(self),
            key: key.to_string(),
            acquired_at,
        })
    }

    /// Releasing an absent key is a no-op.
    pub fn release(&self, key: &str) {
        self.lock_entries().remove(key);
    }

    /// Releases `key` only while it still carries the claim made at
    /// `acquired_at`; an entry re-acquired after expiry belongs to its new holder.
    pub fn release_if_owner(&self, key: &str, acquired_at: Instant) -> bool {
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.acquired_at == acquired_at => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn claim(&self, key: &str) -> Option<Instant> {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        if let Some(existing) = entries.get(key) {
            if now.duration_since(existing.acquired_at) <= self.ttl {
                return None;
            }
        }
        entries.insert(key.to_string(), LockEntry { acquired_at: now });
        Some(now)
    }

    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock_entries()
            .get(key)
            .is_some_and(|entry| now.duration_since(entry.acquired_at) <= self.ttl)
    }

    /// Physical entry count, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes TTL-expired entries and returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.acquired_at) <= self.ttl);
        before - entries.len()
    }

    /// Stops the background sweep; held keys stay held.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.lock_sweeper().take() {
            let _ = sweeper.shutdown_tx.send(true);
            drop(sweeper.handle);
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.lock_sweeper()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.handle.is_finished())
    }

    /// Test helper: drops every entry and stops the sweep.
    pub fn clear_for_test(&self) {
        self.lock_entries().clear();
        self.shutdown();
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<LockSweeper>> {
        self.sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Releases its key when dropped, including on error and panic unwinding,
/// unless the entry expired and another holder has claimed it since.
#[derive(Debug)]
pub struct ResourceLockGuard {
    lock: Arc<ResourceLock>,
    key: String,
    acquired_at: Instant,
}

impl ResourceLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ResourceLockGuard {
    fn drop(&mut self) {
        if !self.lock.release_if_owner(&self.key, self.acquired_at) {
            tracing::warn!(
                key = self.key.as_str(),
                "resource lock entry expired before release"
            );
        }
    }
}
