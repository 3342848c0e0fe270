// # Concurrent Entry Store
//
// Change-detecting map from resource identity to DnsRecord.
//
// ## Concurrency
//
// - Writers (`set_entry`, `remove_entry`) take the write lock
// - `render` takes the read lock for the whole render, so a snapshot never
//   mixes states from before and after a write
// - No method holds the lock across an await point other than acquiring it
//
// ## Render Order
//
// Entries are rendered ordered by identity. Consumers must not rely on
// the order; it is stable only so consecutive snapshots diff cleanly.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::record::DnsRecord;

/// Shared, lock-guarded store of DNS records keyed by resource identity
///
/// Cloning is cheap and yields a handle to the same store.
///
/// # Example
///
/// ```rust
/// use hostsync_core::store::{DnsRecord, EntryStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = EntryStore::new();
///     let record = DnsRecord::new("192.168.1.2", ["google.com"]);
///
///     assert!(store.set_entry("abc", record.clone()).await);
///     assert!(!store.set_entry("abc", record).await);
///     assert!(store.render().await.contains("192.168.1.2\tgoogle.com"));
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    inner: Arc<RwLock<BTreeMap<String, DnsRecord>>>,
}

impl EntryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`
    ///
    /// # Returns
    ///
    /// `false` (and no mutation) if an equal record is already stored for
    /// `id`, `true` otherwise.
    pub async fn set_entry(&self, id: impl Into<String>, record: DnsRecord) -> bool {
        let id = id.into();
        let mut guard = self.inner.write().await;
        if guard.get(&id) == Some(&record) {
            return false;
        }
        guard.insert(id, record);
        true
    }

    /// Remove the entry for `id`
    ///
    /// # Returns
    ///
    /// `true` if an entry was present and removed, `false` otherwise.
    pub async fn remove_entry(&self, id: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.remove(id).is_some()
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Render the store as hosts-format zone content
    ///
    /// One newline-terminated line per entry: the address followed by each
    /// hostname, tab-separated.
    pub async fn render(&self) -> String {
        let guard = self.inner.read().await;
        let mut out = String::new();
        for record in guard.values() {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }

    /// Get the record stored for `id`
    pub async fn get(&self, id: &str) -> Option<DnsRecord> {
        self.inner.read().await.get(id).cloned()
    }

    /// Get the number of entries in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
