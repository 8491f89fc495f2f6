use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use scad_bus::Fingerprint;

use crate::stl::StlArtifact;

const DEFAULT_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Clone)]
struct CacheEntry {
    artifact: Arc<StlArtifact>,
    byte_len: u64,
}

/// Content-addressable STL cache with single-flight coalescing: concurrent
/// requests for the same fingerprint block on one render rather than
/// dispatching N backend invocations.
///
/// Mirrors a process-wide `OnceLock<Mutex<HashMap<...>>>`-style
/// capability cache, generalized with LRU eviction under a byte budget and
/// a leader/follower gate for in-flight renders instead of single-shot
/// probes.
pub struct Cache {
    inner: Mutex<Inner>,
    budget_bytes: u64,
}

struct Inner {
    entries: HashMap<Fingerprint, CacheEntry>,
    order: VecDeque<Fingerprint>,
    in_flight: HashMap<Fingerprint, broadcast::Sender<()>>,
    used_bytes: u64,
}

/// Outcome of attempting to start a render for a fingerprint.
pub enum Admission {
    /// No cached entry and no in-flight render: caller must render and
    /// call [`Cache::commit`] or [`Cache::abandon`] when done.
    Leader,
    /// Another caller is already rendering this fingerprint; await the
    /// returned guard, then call [`Cache::lookup`] again.
    Follower(FollowerGuard),
}

pub struct FollowerGuard {
    rx: broadcast::Receiver<()>,
}

impl FollowerGuard {
    /// Waits for the in-flight leader to finish (success or failure). The
    /// cache should be looked up again afterward; a failed leader leaves
    /// no entry, and the caller becomes the new leader.
    pub async fn wait(mut self) {
        let _ = self.rx.recv().await;
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_BUDGET_BYTES)
    }

    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                in_flight: HashMap::new(),
                used_bytes: 0,
            }),
            budget_bytes,
        }
    }

    pub fn lookup(&self, fingerprint: Fingerprint) -> Option<Arc<StlArtifact>> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let artifact = inner.entries.get(&fingerprint).map(|e| e.artifact.clone());
        if artifact.is_some() {
            inner.order.retain(|fp| *fp != fingerprint);
            inner.order.push_back(fingerprint);
        }
        artifact
    }

    /// Either grants leadership for this fingerprint or returns a guard to
    /// await the current leader's completion.
    pub fn begin(&self, fingerprint: Fingerprint) -> Admission {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if let Some(sender) = inner.in_flight.get(&fingerprint) {
            return Admission::Follower(FollowerGuard {
                rx: sender.subscribe(),
            });
        }
        let (tx, _rx) = broadcast::channel(1);
        inner.in_flight.insert(fingerprint, tx);
        Admission::Leader
    }

    /// Commits a successfully rendered artifact and wakes any followers.
    /// Per the error-handling design, this is the only path that writes a
    /// cache entry — failed renders call [`Cache::abandon`] instead.
    pub fn commit(&self, fingerprint: Fingerprint, artifact: Arc<StlArtifact>) {
        let byte_len = artifact.bytes.len() as u64;
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.insert(
            fingerprint,
            CacheEntry {
                artifact,
                byte_len,
            },
        );
        inner.order.retain(|fp| *fp != fingerprint);
        inner.order.push_back(fingerprint);
        inner.used_bytes += byte_len;
        evict_to_budget(&mut inner, self.budget_bytes);
        if let Some(tx) = inner.in_flight.remove(&fingerprint) {
            let _ = tx.send(());
        }
    }

    /// Releases leadership without writing a cache entry (render failed).
    /// No negative cache is kept: the next caller for this fingerprint
    /// becomes the new leader and retries from scratch.
    pub fn abandon(&self, fingerprint: Fingerprint) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if let Some(tx) = inner.in_flight.remove(&fingerprint) {
            let _ = tx.send(());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_to_budget(inner: &mut Inner, budget_bytes: u64) {
    while inner.used_bytes > budget_bytes {
        let Some(oldest) = inner.order.pop_front() else {
            break;
        };
        if let Some(entry) = inner.entries.remove(&oldest) {
            inner.used_bytes = inner.used_bytes.saturating_sub(entry.byte_len);
            debug!(fingerprint = %oldest, byte_len = entry.byte_len, "evicted cache entry over budget");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(bytes: &[u8]) -> Arc<StlArtifact> {
        Arc::new(StlArtifact::detect(bytes.to_vec()))
    }

    #[test]
    fn lookup_misses_until_committed() {
        let cache = Cache::new();
        let fp = Fingerprint::from_raw(1);
        assert!(cache.lookup(fp).is_none());
        cache.commit(fp, artifact(b"solid a\nendsolid a\n"));
        assert!(cache.lookup(fp).is_some());
    }

    #[test]
    fn second_begin_for_same_fingerprint_yields_follower() {
        let cache = Cache::new();
        let fp = Fingerprint::from_raw(2);
        assert!(matches!(cache.begin(fp), Admission::Leader));
        assert!(matches!(cache.begin(fp), Admission::Follower(_)));
    }

    #[tokio::test]
    async fn follower_wakes_after_leader_commits() {
        let cache = Arc::new(Cache::new());
        let fp = Fingerprint::from_raw(3);
        assert!(matches!(cache.begin(fp), Admission::Leader));
        let Admission::Follower(guard) = cache.begin(fp) else {
            panic!("expected follower");
        };

        let cache_clone = cache.clone();
        tokio::spawn(async move {
            cache_clone.commit(fp, artifact(b"solid b\nendsolid b\n"));
        });

        guard.wait().await;
        assert!(cache.lookup(fp).is_some());
    }

    #[test]
    fn abandon_frees_leadership_without_caching() {
        let cache = Cache::new();
        let fp = Fingerprint::from_raw(4);
        assert!(matches!(cache.begin(fp), Admission::Leader));
        cache.abandon(fp);
        assert!(cache.lookup(fp).is_none());
        assert!(matches!(cache.begin(fp), Admission::Leader));
    }

    #[test]
    fn evicts_oldest_entry_past_budget() {
        let cache = Cache::with_budget(10);
        let fp1 = Fingerprint::from_raw(5);
        let fp2 = Fingerprint::from_raw(6);
        cache.commit(fp1, artifact(b"0123456789"));
        cache.commit(fp2, artifact(b"abcdefghij"));
        assert!(cache.lookup(fp1).is_none());
        assert!(cache.lookup(fp2).is_some());
    }
}
