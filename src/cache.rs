use super::network::program::{Entry, LedgerAccount};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// The ledger account does not exist yet
    Uninitialized,
    Ready,
    /// Last fetch failed; entries may be stale
    Unknown,
}

/// Full ledger state as last observed. Entries keep the remote storage order.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub entries: Vec<Entry>,
    pub total_entries: u64,
    pub status: SnapshotStatus,
}

impl LedgerSnapshot {
    pub fn unknown() -> Self {
        Self {
            entries: Vec::new(),
            total_entries: 0,
            status: SnapshotStatus::Unknown,
        }
    }

    pub fn uninitialized() -> Self {
        Self {
            status: SnapshotStatus::Uninitialized,
            ..Self::unknown()
        }
    }

    pub fn entry(&self, payload_ref: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.payload_ref == payload_ref)
    }
}

impl From<LedgerAccount> for LedgerSnapshot {
    fn from(account: LedgerAccount) -> Self {
        Self {
            entries: account.entries,
            total_entries: account.total_entries,
            status: SnapshotStatus::Ready,
        }
    }
}

/// Holds the current snapshot. Every write swaps in a whole new
/// snapshot, so readers never see a partial update.
#[derive(Clone)]
pub struct SnapshotCache {
    current: Arc<watch::Sender<Arc<LedgerSnapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(LedgerSnapshot::unknown()));
        Self {
            current: Arc::new(current),
        }
    }

    pub fn current(&self) -> LedgerSnapshot {
        LedgerSnapshot::clone(&self.current.borrow())
    }

    pub fn replace(&self, snapshot: LedgerSnapshot) {
        self.current.send_replace(Arc::new(snapshot));
    }

    /// Keeps the entries but flags them as possibly stale.
    pub fn mark_unknown(&self) {
        let stale = LedgerSnapshot {
            status: SnapshotStatus::Unknown,
            ..self.current()
        };
        self.replace(stale);
    }

    /// Receiver that wakes on every replacement
    pub fn subscribe(&self) -> watch::Receiver<Arc<LedgerSnapshot>> {
        self.current.subscribe()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Pubkey;

    fn entry(link: &str) -> Entry {
        Entry {
            payload_ref: link.into(),
            owner: Pubkey::default(),
            vote_count: 3,
        }
    }

    #[test]
    fn starts_unknown_and_empty() {
        let cache = SnapshotCache::new();
        assert_eq!(cache.current(), LedgerSnapshot::unknown());
    }

    #[test]
    fn mark_unknown_keeps_entries() {
        let cache = SnapshotCache::new();
        cache.replace(LedgerSnapshot::from(LedgerAccount {
            total_entries: 1,
            entries: vec![entry("a.gif")],
        }));

        cache.mark_unknown();
        let snapshot = cache.current();
        assert_eq!(snapshot.status, SnapshotStatus::Unknown);
        assert_eq!(snapshot.entries, vec![entry("a.gif")]);
        assert_eq!(snapshot.total_entries, 1);
    }

    #[tokio::test]
    async fn subscribers_see_replacements() {
        let cache = SnapshotCache::new();
        let mut rx = cache.subscribe();

        cache.replace(LedgerSnapshot::uninitialized());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, SnapshotStatus::Uninitialized);
    }
}
