use crate::types::Index;
use std::sync::{Arc, RwLock};

/// Source names reported by the device, shared by every zone's source list
#[derive(Debug, Clone, Default)]
pub struct SourceNames {
    names: Arc<RwLock<Vec<String>>>,
}

impl SourceNames {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder used until the device reports a name
    pub fn placeholder(index: Index) -> String {
        format!("Source {}", index)
    }

    /// Record a name, growing the list with placeholders as needed
    pub fn set(&self, index: Index, name: impl Into<String>) {
        let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
        while names.len() <= index {
            let next = names.len();
            names.push(Self::placeholder(next));
        }
        names[index] = name.into();
    }

    /// Get the name at an index, if the list reaches that far
    pub fn get(&self, index: Index) -> Option<String> {
        self.read().get(index).cloned()
    }

    /// Find the index of a source by name
    pub fn position(&self, name: &str) -> Option<Index> {
        self.read().iter().position(|n| n == name)
    }

    /// Get a snapshot of all names in index order
    pub fn list(&self) -> Vec<String> {
        self.read().clone()
    }

    /// Get the number of known sources
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
        self.names.read().unwrap_or_else(|e| e.into_inner())
    }
}
