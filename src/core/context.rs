//! Story context: the shared key-value state read and written by nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::value::Value;

/// Flat, mutable story-wide state. Entries are only ever added or
/// overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryContext {
    entries: BTreeMap<String, Value>,
}

impl StoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: BTreeMap<String, Value>) -> Self {
        Self { entries: seed }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a dotted path (`player.name`) through nested maps.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut value = self.entries.get(parts.next()?)?;
        for part in parts {
            match value {
                Value::Map(inner) => value = inner.get(part)?,
                _ => return None,
            }
        }
        Some(value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Merge `updates` into the store, overwriting existing keys.
    pub fn set_many<I, K>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in updates {
            self.entries.insert(key.into(), value);
        }
    }

    /// A detached copy of the current state.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}
