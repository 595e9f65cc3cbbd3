//! Decision cache.
//!
//! One coarse mutex around a map; critical sections are a single get or
//! insert. A poisoned lock is read as a miss and recovered for writes.

use crate::condition::Context;
use crate::decision::Decision;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// What the cache key covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyMode {
    /// `(subject, action, resource)`; the context is ignored, so a cached
    /// decision is returned even when the context differs.
    #[default]
    Triple,
    /// The triple plus a canonical serialization of the context.
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    subject: String,
    action: String,
    resource: String,
    context: Option<String>,
}

impl CacheKey {
    pub fn new(mode: CacheKeyMode, subject: &str, action: &str, resource: &str, context: &Context) -> Self {
        let context = match mode {
            CacheKeyMode::Triple => None,
            CacheKeyMode::Context => {
                serde_json::to_string(&canonical(&serde_json::Value::Object(context.clone()))).ok()
            }
        };
        CacheKey {
            subject: subject.to_owned(),
            action: action.to_owned(),
            resource: resource.to_owned(),
            context,
        }
    }
}

/// Rebuild objects with keys in sorted order at every level.
fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonical(&map[key]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}

#[derive(Debug, Default)]
pub struct DecisionCache {
    entries: Mutex<HashMap<CacheKey, Decision>>,
}

impl DecisionCache {
    pub fn new() -> Self {
        DecisionCache::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, decision: Decision) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, decision);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
