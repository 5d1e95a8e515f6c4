//! A concurrent keyed store of pod records.
//!
//! Admission calls mutate these maps from the provider's tasks while the
//! offer and update handlers read and move records from the event loop, so
//! every compound operation takes the write lock for its full duration.
//! Snapshots are copies; the map may change after one is returned.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::messages::TaskInfo;
use crate::pod::Pod;

/// A pod together with its launch-group template. Once the record reaches
/// the running map the agent assignment and resources inside `tasks` are
/// frozen.
#[derive(Clone, Debug)]
pub struct PodRecord {
    pub pod: Pod,
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Default)]
pub struct PodMap {
    items: RwLock<HashMap<String, PodRecord>>,
}

impl PodMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` under `key`, replacing any previous record.
    pub fn set(&self, key: impl Into<String>, record: PodRecord) {
        self.items
            .write()
            .expect("pod map lock poisoned")
            .insert(key.into(), record);
    }

    pub fn remove(&self, key: &str) {
        self.items
            .write()
            .expect("pod map lock poisoned")
            .remove(key);
    }

    pub fn get(&self, key: &str) -> Option<PodRecord> {
        self.items
            .read()
            .expect("pod map lock poisoned")
            .get(key)
            .cloned()
    }

    /// Removes and returns the record under `key` in one atomic step.
    pub fn get_and_remove(&self, key: &str) -> Option<PodRecord> {
        self.items
            .write()
            .expect("pod map lock poisoned")
            .remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.items
            .read()
            .expect("pod map lock poisoned")
            .contains_key(key)
    }

    pub fn count(&self) -> usize {
        self.items.read().expect("pod map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Snapshot of all keys. Ordering is unspecified but the snapshot itself
    /// is consistent.
    pub fn keys(&self) -> Vec<String> {
        self.items
            .read()
            .expect("pod map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshot of all records.
    pub fn values(&self) -> Vec<PodRecord> {
        self.items
            .read()
            .expect("pod map lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of all entries.
    pub fn iter(&self) -> Vec<(String, PodRecord)> {
        self.items
            .read()
            .expect("pod map lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
