//! AssetRegistry: every asset currently placed in the scene, in load order,
//! plus the per-kind id counters.

use crate::error::ControlError;
use crate::scene::NodeHandle;
use crate::types::{AssetInfo, AssetKind, GeoAnchor};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single loaded asset. Owns the anchored group handle; the decoded node
/// lives inside that group's subtree.
#[derive(Debug)]
pub struct AssetRecord {
    pub id: String,
    pub kind: AssetKind,
    pub source_url: String,
    pub placement: GeoAnchor,
    pub visible: bool,
    pub opacity: f64,
    group: NodeHandle,
}

impl AssetRecord {
    pub fn new(
        id: impl Into<String>,
        kind: AssetKind,
        source_url: impl Into<String>,
        placement: GeoAnchor,
        group: NodeHandle,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source_url: source_url.into(),
            placement,
            visible: true,
            opacity: 1.0,
            group,
        }
    }

    pub fn group(&self) -> &NodeHandle {
        &self.group
    }

    /// Give up the group handle so the caller can detach it.
    pub fn into_group(self) -> NodeHandle {
        self.group
    }

    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            url: self.source_url.clone(),
            longitude: self.placement.longitude,
            latitude: self.placement.latitude,
            altitude: self.placement.altitude,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered id → record mapping. Ids are `<kind>-<n>` with an independent,
/// never-decreasing counter per kind, so an id is never handed out twice.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    records: HashMap<String, AssetRecord>,
    order: Vec<String>,
    next_splat: u64,
    next_model: u64,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id for `kind`.
    pub fn allocate(&mut self, kind: AssetKind) -> String {
        let counter = match kind {
            AssetKind::Splat => &mut self.next_splat,
            AssetKind::Model => &mut self.next_model,
        };
        *counter += 1;
        format!("{}-{}", kind.id_prefix(), counter)
    }

    /// Insert a record under its own id.
    ///
    /// On `DuplicateId` the record is handed back so its group can still be
    /// released.
    pub fn insert(&mut self, record: AssetRecord) -> Result<(), (ControlError, AssetRecord)> {
        if self.records.contains_key(&record.id) {
            return Err((ControlError::DuplicateId(record.id.clone()), record));
        }
        self.order.push(record.id.clone());
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Remove and return a record. Does not touch the scene; the caller owns
    /// detaching the returned group.
    pub fn remove(&mut self, id: &str) -> Option<AssetRecord> {
        let record = self.records.remove(id)?;
        self.order.retain(|i| i != id);
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<&AssetRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AssetRecord> {
        self.records.get_mut(id)
    }

    /// Ids in insertion order, optionally restricted to one kind.
    pub fn list(&self, kind: Option<AssetKind>) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| match kind {
                Some(k) => self.records.get(*id).is_some_and(|r| r.kind == k),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}
