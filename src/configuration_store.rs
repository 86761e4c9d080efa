use std::sync::{Arc, RwLock};

use crate::Snapshot;

/// `ConfigurationStore` provides a Sync storage for the configuration snapshot that allows
/// concurrent access for readers and writers.
///
/// Writers replace the snapshot wholesale. Readers keep the `Arc` they got for the whole
/// resolution, so a refresh never changes a resolution halfway through.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl ConfigurationStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, or `None` if none has been loaded yet.
    pub fn get_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| {
                log::warn!(target: "prebid", "snapshot lock poisoned, reading last stored snapshot");
                poisoned.into_inner()
            })
            .clone()
    }

    /// Install `snapshot`, returning the one it replaces.
    ///
    /// The slot only ever holds a complete snapshot, so a lock poisoned by a panicking writer is
    /// recovered and the refresh still applies.
    pub fn set_snapshot(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.snapshot.write().unwrap_or_else(|poisoned| {
            log::warn!(target: "prebid", "snapshot lock poisoned, replacing snapshot anyway");
            poisoned.into_inner()
        });
        slot.replace(snapshot)
    }
}
