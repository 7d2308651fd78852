//! Case-insensitive member lookup

use std::collections::HashMap;

/// Lowercase name → canonical member name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFold {
    names: HashMap<String, String>,
}

impl CaseFold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `canonical`. An existing entry for the same folded name wins.
    pub fn insert(&mut self, canonical: &str) {
        self.names
            .entry(canonical.to_lowercase())
            .or_insert_with(|| canonical.to_string());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.names.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
