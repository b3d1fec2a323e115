//! # User registry
//!
//! Concurrent map from connection identity to nickname. Multi-reader /
//! single-writer: an `RwLock` suffices since writes (nick changes, connect,
//! disconnect) are rare relative to reads (every broadcast resolves a nick).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::ConnId;

const ANONYMOUS: &str = "Anonymous";

pub struct UserRegistry {
    nicks: RwLock<HashMap<ConnId, String>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            nicks: RwLock::new(HashMap::new()),
        }
    }

    /// Set (or overwrite) the nickname for `id`.
    pub fn set(&self, id: ConnId, nick: String) {
        self.nicks.write().unwrap().insert(id, nick);
    }

    /// Current nickname for `id`, or the `"Anonymous"` sentinel.
    pub fn get(&self, id: ConnId) -> String {
        self.nicks
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    /// Remove `id`. No-op if absent.
    pub fn remove(&self, id: ConnId) {
        self.nicks.write().unwrap().remove(&id);
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.nicks.read().unwrap().contains_key(&id)
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
