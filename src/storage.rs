//! Opaque key-value storage collaborator.
//!
//! The engine persists nothing itself; small state that must survive a
//! reload (the sync status record) goes through this interface. The browser
//! host backs it with its local key-value store; tests and embedders can use
//! [`MemoryStorage`].

use std::collections::HashMap;
use std::sync::Mutex;

pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

/// In-memory `Storage` implementation.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().unwrap().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove_item(&self, key: &str) {
        self.items.lock().unwrap().remove(key);
    }
}
