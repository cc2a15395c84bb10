//! Module registry for tracking module identity during discovery
//!
//! The ModuleRegistry is the single source of truth for module identity
//! within one build. It maps canonical paths to ids and holds each module's
//! slot, which starts out reserved and is later completed with its record.
//! A registry is created per build and never shared between builds.

use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    dependency_graph::{DependencyGraph, ModuleId, ModuleRecord},
    error::BuildResult,
    types::FxIndexMap,
};

/// Discovery state of one canonical path
#[derive(Debug)]
enum Slot {
    /// Id assigned, module still being processed
    Reserved(ModuleId),
    /// Fully discovered and compiled
    Complete(ModuleRecord),
}

impl Slot {
    fn id(&self) -> ModuleId {
        match self {
            Self::Reserved(id) => *id,
            Self::Complete(record) => record.id,
        }
    }
}

/// Result of asking the registry for a path's id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First sighting; the caller now owns processing of this module
    New(ModuleId),
    /// Already reserved or complete; nothing to do
    Existing(ModuleId),
}

impl Reservation {
    pub fn id(self) -> ModuleId {
        match self {
            Self::New(id) | Self::Existing(id) => id,
        }
    }
}

/// Central registry for module identity within one build
#[derive(Debug)]
pub struct ModuleRegistry {
    /// Canonical path -> slot, in reservation order
    slots: FxIndexMap<PathBuf, Slot>,
    /// Next id to hand out
    next_id: u32,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Create a new empty module registry; the first reservation gets id 1
    pub fn new() -> Self {
        Self {
            slots: FxIndexMap::default(),
            next_id: ModuleId::ENTRY.as_u32(),
        }
    }

    /// Insert-if-absent: reserve an id for `path` unless it already has one
    pub fn reserve(&mut self, path: &Path) -> Reservation {
        if let Some(slot) = self.slots.get(path) {
            return Reservation::Existing(slot.id());
        }

        let id = ModuleId::new(self.next_id);
        self.next_id += 1;
        self.slots.insert(path.to_path_buf(), Slot::Reserved(id));
        debug!("Reserved module id {id} for {}", path.display());
        Reservation::New(id)
    }

    /// Replace a reservation with its finished record.
    ///
    /// Panics if the record's path was never reserved under the record's id,
    /// or was already completed.
    pub fn complete(&mut self, record: ModuleRecord) {
        match self.slots.get_mut(&record.path) {
            Some(slot @ Slot::Reserved(_)) if slot.id() == record.id => {
                *slot = Slot::Complete(record);
            }
            Some(slot) => panic!(
                "Attempting to complete module {} ({}) but its slot holds id {} in state {}",
                record.id,
                record.path.display(),
                slot.id(),
                if matches!(slot, Slot::Complete(_)) { "complete" } else { "reserved" }
            ),
            None => panic!(
                "Attempting to complete unreserved module {} ({})",
                record.id,
                record.path.display()
            ),
        }
    }

    /// Get module id by canonical path
    #[cfg(test)]
    pub fn get_id_by_path(&self, path: &Path) -> Option<ModuleId> {
        self.slots.get(path).map(Slot::id)
    }

    /// Whether the module at `path` has been fully processed
    #[cfg(test)]
    pub fn is_complete(&self, path: &Path) -> bool {
        matches!(self.slots.get(path), Some(Slot::Complete(_)))
    }

    /// Get a completed record by canonical path
    #[cfg(test)]
    pub fn get_record(&self, path: &Path) -> Option<&ModuleRecord> {
        match self.slots.get(path) {
            Some(Slot::Complete(record)) => Some(record),
            _ => None,
        }
    }

    /// Get total number of modules in the registry, reserved or complete
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consume the registry into a closed dependency graph.
    ///
    /// Reservations that were never completed are dropped; any record that
    /// still points at one makes the graph fail its closedness check.
    pub fn into_graph(self) -> BuildResult<DependencyGraph> {
        let records = self.slots.into_values().filter_map(|slot| match slot {
            Slot::Complete(record) => Some(record),
            Slot::Reserved(id) => {
                debug!("Dropping incomplete reservation for module {id}");
                None
            }
        });
        DependencyGraph::from_records(records)
    }
}
