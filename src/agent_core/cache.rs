//! Session-scoped memo of successful tool results.

use std::collections::HashMap;

use serde_json::Value;

use super::request_key::RequestKey;

/// `RequestKey -> last successful result`.
///
/// Only the dispatcher writes to it. Nothing is evicted automatically; the
/// host calls `clear()` when the session should forget.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<RequestKey, Value>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RequestKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: RequestKey, result: Value) {
        self.entries.insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
