//! Module twin: the last-known desired-properties document pushed by the cloud.
//!
//! `TwinCell` is shared by `Arc` with everything that reads configuration. Each
//! patch produces a new immutable `TwinDocument`; the cell swaps the `Arc` under
//! a write lock, so readers hold either the old or the new snapshot, never a mix.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::recording::START_RECORDING_FIELD;

/// Metadata key the hub adds to every twin document and patch.
pub const VERSION_FIELD: &str = "$version";

/// Immutable snapshot of the twin's desired properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwinDocument {
    pub version: Option<i64>,
    pub properties: Map<String, Value>,
}

impl TwinDocument {
    /// Build a document from a full twin (non-object input yields an empty document).
    pub fn from_value(value: &Value) -> Self {
        let mut doc = Self::default();
        doc.merge(value);
        doc
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// JSON merge-patch: objects merge recursively, `null` removes a key.
    fn merge(&mut self, patch: &Value) {
        let Value::Object(patch) = patch else {
            return;
        };
        for (key, value) in patch {
            if key == VERSION_FIELD {
                self.version = value.as_i64();
                continue;
            }
            merge_entry(&mut self.properties, key, value);
        }
    }
}

fn merge_entry(target: &mut Map<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Null => {
            target.remove(key);
        }
        Value::Object(patch) => {
            let slot = target
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(inner) = slot {
                for (k, v) in patch {
                    merge_entry(inner, k, v);
                }
            }
        }
        other => {
            target.insert(key.to_string(), other.clone());
        }
    }
}

/// Recording trigger carried by a patch, if any. `null` (a delete) is not a trigger.
pub fn recording_trigger(patch: &Value) -> Option<&Value> {
    patch.get(START_RECORDING_FIELD).filter(|v| !v.is_null())
}

/// Atomically swappable holder of the current twin snapshot.
pub struct TwinCell {
    current: RwLock<Arc<TwinDocument>>,
}

impl Default for TwinCell {
    fn default() -> Self {
        Self::new()
    }
}

impl TwinCell {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TwinDocument::default())),
        }
    }

    /// Current snapshot. Empty document until the first twin or patch arrives.
    pub async fn snapshot(&self) -> Arc<TwinDocument> {
        self.current.read().await.clone()
    }

    /// Replace the whole document (initial twin fetch).
    pub async fn replace(&self, full: &Value) -> Arc<TwinDocument> {
        let next = Arc::new(TwinDocument::from_value(full));
        *self.current.write().await = next.clone();
        next
    }

    /// Merge a desired-properties patch and publish the result.
    pub async fn apply_patch(&self, patch: &Value) -> Arc<TwinDocument> {
        let mut guard = self.current.write().await;
        let mut next = TwinDocument::clone(&guard);
        next.merge(patch);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }
}
