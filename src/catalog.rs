//! Catalog Index
//!
//! Static item metadata keyed by identifier, loaded once at startup and
//! immutable afterwards. The identifier is the stable join key between
//! catalog metadata and ledger-tracked item state: every other component
//! correlates through it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ItemId;

/// Display metadata for a single catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeta {
    pub id: ItemId,
    pub name: String,
    pub picture: String,
    pub description: String,
}

#[derive(Debug)]
pub enum CatalogError {
    Unreadable(String),
    Malformed(String),
    DuplicateId(ItemId),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Unreadable(msg) => write!(f, "catalog source unreadable: {}", msg),
            CatalogError::Malformed(msg) => write!(f, "malformed catalog: {}", msg),
            CatalogError::DuplicateId(id) => write!(f, "duplicate catalog id: {}", id),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Read-only catalog; safe to share across components without
/// synchronization once built. Construction is all-or-nothing: a malformed
/// record or a repeated identifier fails the whole load.
pub struct CatalogIndex {
    items: Vec<ItemMeta>,
    by_id: HashMap<ItemId, usize>,
}

impl CatalogIndex {
    pub fn from_items(items: Vec<ItemMeta>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if by_id.insert(item.id, idx).is_some() {
                return Err(CatalogError::DuplicateId(item.id));
            }
        }
        Ok(CatalogIndex { items, by_id })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let items: Vec<ItemMeta> =
            serde_json::from_str(raw).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        Self::from_items(items)
    }

    /// Load from a JSON file of `[{id, name, picture, description}, ...]`
    pub fn load(path: &str) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Unreadable(format!("{}: {}", path, e)))?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemMeta> {
        self.by_id.get(&id).map(|&idx| &self.items[idx])
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Identifiers in catalog order
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|i| i.id).collect()
    }

    /// Entries in catalog order
    pub fn iter(&self) -> std::slice::Iter<'_, ItemMeta> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"[
        {"id": 0, "name": "Dawn", "picture": "images/dawn.png", "description": "First light"},
        {"id": 1, "name": "Dusk", "picture": "images/dusk.png", "description": "Last light"}
    ]"#;

    #[test]
    fn loads_and_indexes_by_id() {
        let catalog = CatalogIndex::from_json_str(GOOD).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap().name, "Dusk");
        assert!(catalog.get(5).is_none());
        assert_eq!(catalog.ids(), vec![0, 1]);
    }

    #[test]
    fn duplicate_id_fails_whole_load() {
        let raw = r#"[
            {"id": 3, "name": "A", "picture": "a.png", "description": "a"},
            {"id": 3, "name": "B", "picture": "b.png", "description": "b"}
        ]"#;
        match CatalogIndex::from_json_str(raw) {
            Err(CatalogError::DuplicateId(3)) => {}
            other => panic!("expected DuplicateId(3), got {:?}", other.err()),
        }
    }

    #[test]
    fn malformed_source_fails_whole_load() {
        let raw = r#"[{"id": "not-a-number", "name": "A"}]"#;
        assert!(matches!(
            CatalogIndex::from_json_str(raw),
            Err(CatalogError::Malformed(_))
        ));
    }
}
