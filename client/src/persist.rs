use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use duka_common::cart::CartItem;
use serde::{Deserialize, Serialize};

/// The persisted cart snapshot, written after every local mutation under a
/// key namespaced by identity (`anonymous` / `user:{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Keyed snapshot storage. The local cart store is the exclusive writer of
/// its own key; no other component touches it. Writes are fire-and-forget:
/// implementations log failures instead of returning them.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Option<CartSnapshot>;
    fn save(&self, key: &str, snapshot: &CartSnapshot);
    fn remove(&self, key: &str);
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<HashMap<String, CartSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> Option<CartSnapshot> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn save(&self, key: &str, snapshot: &CartSnapshot) {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), snapshot.clone());
    }

    fn remove(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }
}

/// JSON files under a data directory, one per identity key.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/duka/cart-user-42.json`.
    pub fn in_data_dir(app_name: &str) -> Option<Self> {
        dirs::data_dir().map(|base| Self::new(base.join(app_name)))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Identity keys contain ':', which is not filename-safe everywhere.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        self.dir.join(format!("cart-{safe}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &str) -> Option<CartSnapshot> {
        let path = self.path_for(key);
        let data = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&data) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("discarding unreadable cart snapshot {}: {e}", path.display());
                None
            }
        }
    }

    fn save(&self, key: &str, snapshot: &CartSnapshot) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("failed to create snapshot dir {}: {e}", self.dir.display());
            return;
        }
        match serde_json::to_string_pretty(snapshot) {
            Ok(data) => {
                if let Err(e) = std::fs::write(&path, data) {
                    tracing::warn!("failed to write cart snapshot {}: {e}", path.display());
                }
            }
            Err(e) => tracing::warn!("failed to serialize cart snapshot: {e}"),
        }
    }

    fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("failed to remove cart snapshot {}: {e}", path.display());
            }
        }
    }
}
