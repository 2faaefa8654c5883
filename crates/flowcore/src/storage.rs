//! Name-addressed value storage shared by all actors of a flow instance.
//!
//! Flow-local items live in a stack of frames: local scopes push a frame on
//! entry and pop it on exit, and reads and writes always target the top frame.
//! Global items live in a map shared by every flow created from the same
//! runtime.

use crate::{ExecutionError, Value};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const GLOBAL_PREFIX: &str = "global:";

/// Namespace a storage name lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    Flow,
    Global,
}

/// Fully resolved storage name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageName {
    name: String,
    scope: StorageScope,
}

impl StorageName {
    /// Parses an already variable-expanded name; `global:` selects the global namespace
    pub fn parse(raw: &str) -> Result<Self, ExecutionError> {
        let raw = raw.trim();
        let (scope, name) = match raw.strip_prefix(GLOBAL_PREFIX) {
            Some(rest) => (StorageScope::Global, rest.trim()),
            None => (StorageScope::Flow, raw),
        };
        if name.is_empty() {
            return Err(ExecutionError::Failed(format!(
                "invalid storage name '{}'",
                raw
            )));
        }
        Ok(Self {
            name: name.to_string(),
            scope,
        })
    }

    pub fn flow(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: StorageScope::Flow,
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: StorageScope::Global,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> StorageScope {
        self.scope
    }
}

impl fmt::Display for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            StorageScope::Flow => write!(f, "{}", self.name),
            StorageScope::Global => write!(f, "{}{}", GLOBAL_PREFIX, self.name),
        }
    }
}

/// Global namespace, cheap to clone and share between flow instances
pub type GlobalStorage = Arc<DashMap<String, Value>>;

/// Storage table owned by one flow instance
#[derive(Debug)]
pub struct StorageTable {
    frames: Vec<HashMap<String, Value>>,
    global: GlobalStorage,
}

impl StorageTable {
    pub fn new() -> Self {
        Self::with_global(Arc::new(DashMap::new()))
    }

    pub fn with_global(global: GlobalStorage) -> Self {
        Self {
            frames: vec![HashMap::new()],
            global,
        }
    }

    pub fn global(&self) -> &GlobalStorage {
        &self.global
    }

    /// Reads a value; a missing name is a [`ExecutionError::MissingStorage`]
    pub fn get(&self, name: &StorageName) -> Result<Value, ExecutionError> {
        let found = match name.scope {
            StorageScope::Flow => self.top().get(&name.name).cloned(),
            StorageScope::Global => self.global.get(&name.name).map(|v| v.value().clone()),
        };
        found.ok_or_else(|| ExecutionError::MissingStorage {
            name: name.to_string(),
        })
    }

    pub fn has(&self, name: &StorageName) -> bool {
        match name.scope {
            StorageScope::Flow => self.top().contains_key(&name.name),
            StorageScope::Global => self.global.contains_key(&name.name),
        }
    }

    /// Stores a value, overwriting any previous one
    pub fn put(&mut self, name: &StorageName, value: Value) {
        match name.scope {
            StorageScope::Flow => {
                self.top_mut().insert(name.name.clone(), value);
            }
            StorageScope::Global => {
                self.global.insert(name.name.clone(), value);
            }
        }
    }

    pub fn remove(&mut self, name: &StorageName) -> Option<Value> {
        match name.scope {
            StorageScope::Flow => self.top_mut().remove(&name.name),
            StorageScope::Global => self.global.remove(&name.name).map(|(_, v)| v),
        }
    }

    /// Names in the active flow-local frame, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.top().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Opens a local frame holding `initial`
    pub fn push_frame(&mut self, initial: HashMap<String, Value>) {
        self.frames.push(initial);
    }

    /// Closes the innermost local frame; the flow frame itself is never popped
    pub fn pop_frame(&mut self) -> Option<HashMap<String, Value>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Snapshot of the active flow-local frame
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.top().clone()
    }

    /// Releases all flow-local items
    pub fn clear(&mut self) {
        self.frames.truncate(1);
        self.frames[0].clear();
    }

    fn top(&self) -> &HashMap<String, Value> {
        // the flow frame is created in the constructor and never popped
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut HashMap<String, Value> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl Default for StorageTable {
    fn default() -> Self {
        Self::new()
    }
}
