//! Concurrent TTL cache of per-indicator verdicts.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    malicious: bool,
    expires: Instant,
}

/// Indicator (domain or address) to "is malicious" with a fixed TTL.
///
/// Expired entries are dropped lazily on read, and in one sweep at most
/// once per TTL through [`purge_if_due`](Self::purge_if_due).
#[derive(Debug)]
pub struct VerdictCache {
    ttl: Duration,
    entries: DashMap<String, CachedVerdict>,
    last_purge: Mutex<Instant>,
}

impl VerdictCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            last_purge: Mutex::new(Instant::now()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, ioc: &str) -> Option<bool> {
        self.get_at(ioc, Instant::now())
    }

    pub fn insert(&self, ioc: impl Into<String>, malicious: bool) {
        self.insert_at(ioc, malicious, Instant::now());
    }

    pub fn remove(&self, ioc: &str) {
        self.entries.remove(ioc);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(Instant::now())
    }

    /// Sweep expired entries when a full TTL has passed since the last sweep.
    pub fn purge_if_due(&self) -> usize {
        self.purge_if_due_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_if_due_at(&self, now: Instant) -> usize {
        {
            let mut last = self.last_purge.lock();
            if now.saturating_duration_since(*last) < self.ttl {
                return 0;
            }
            *last = now;
        }
        self.purge_at(now)
    }

    fn purge_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.expires > now);
        before.saturating_sub(self.entries.len())
    }

    fn get_at(&self, ioc: &str, now: Instant) -> Option<bool> {
        let verdict = self.entries.get(ioc).map(|e| *e.value())?;
        if now >= verdict.expires {
            self.entries.remove_if(ioc, |_, v| v.expires <= now);
            return None;
        }
        Some(verdict.malicious)
    }

    fn insert_at(&self, ioc: impl Into<String>, malicious: bool, now: Instant) {
        self.entries.insert(
            ioc.into(),
            CachedVerdict {
                malicious,
                expires: now + self.ttl,
            },
        );
    }
}
