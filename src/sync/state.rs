//! Remote state tracking: which remote paths are believed current, and as of when.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::scan::{FileRecord, Inventory};

/// Case-insensitive key for a forward-slash relative path.
///
/// Inventory and remote state both key on this so their comparisons agree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathKey(String);

impl PathKey {
    pub fn new(relative: &str) -> Self {
        PathKey(relative.to_lowercase())
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    /// Path as last seen, with its original case, for remote commands.
    path: String,
    synced_at: DateTime<Utc>,
}

/// Mapping relative path -> local instant at which the remote copy was known current.
///
/// Starts unset. The first pass seeds it from the local inventory so
/// pre-existing files count as already mirrored; `reset` makes it empty so
/// every local file is uploaded again.
#[derive(Debug, Default)]
pub struct RemoteState {
    entries: Option<BTreeMap<PathKey, Tracked>>,
}

impl RemoteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.entries.is_some()
    }

    /// Treat every inventoried file as already uploaded at its own timestamp.
    /// No-op once the state is set.
    pub fn seed_from(&mut self, inventory: &Inventory) {
        if self.entries.is_some() {
            return;
        }
        let entries = inventory
            .iter()
            .map(|record| {
                (
                    PathKey::new(&record.relative),
                    Tracked {
                        path: record.relative.clone(),
                        synced_at: record.modified,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(files = entries.len(), "Seeded remote state from local inventory");
        self.entries = Some(entries);
    }

    /// Forget everything; the next pass uploads every local file.
    pub fn reset(&mut self) {
        self.entries = Some(BTreeMap::new());
    }

    /// Set to empty if still unset, leaving existing entries alone.
    pub fn ensure_initialized(&mut self) {
        self.entries.get_or_insert_with(BTreeMap::new);
    }

    pub fn synced_at(&self, relative: &str) -> Option<DateTime<Utc>> {
        self.entries
            .as_ref()?
            .get(&PathKey::new(relative))
            .map(|tracked| tracked.synced_at)
    }

    pub fn record(&mut self, relative: &str, synced_at: DateTime<Utc>) {
        self.entries.get_or_insert_with(BTreeMap::new).insert(
            PathKey::new(relative),
            Tracked {
                path: relative.to_string(),
                synced_at,
            },
        );
    }

    pub fn remove(&mut self, relative: &str) -> Option<DateTime<Utc>> {
        self.entries
            .as_mut()?
            .remove(&PathKey::new(relative))
            .map(|tracked| tracked.synced_at)
    }

    /// True when `record` is unknown remotely or changed after its last upload.
    pub fn needs_upload(&self, record: &FileRecord) -> bool {
        match self.synced_at(&record.relative) {
            Some(synced_at) => record.modified > synced_at,
            None => true,
        }
    }

    /// Tracked paths (original case) absent from `inventory`.
    pub fn orphans(&self, inventory: &Inventory) -> Vec<String> {
        self.entries
            .iter()
            .flatten()
            .filter(|(key, _)| !inventory.contains_key(key))
            .map(|(_, tracked)| tracked.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, BTreeMap::len)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
