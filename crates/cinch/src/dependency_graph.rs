//! Module dependency graph
//!
//! A [`DependencyGraph`] is the closed result of module discovery: one
//! [`ModuleRecord`] per canonical path, where every path named in a record's
//! dependencies is itself a record in the graph.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::trace;
use petgraph::{algo::tarjan_scc, graph::DiGraph};
use rustc_hash::FxHashMap;

use crate::{
    error::{BuildError, BuildResult},
    types::FxIndexMap,
};

/// Unique identifier for a module, assigned in first-discovery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    /// The entry module of every build
    pub const ENTRY: Self = Self(1);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value of the ModuleId
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discovered, compiled module. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Canonical absolute path, the module's identity
    pub path: PathBuf,
    /// Literal specifier as written in this module -> resolved canonical path,
    /// in source order
    pub dependencies: FxIndexMap<String, PathBuf>,
    /// Original source text
    pub source: String,
    /// Lowered factory body
    pub compiled_code: String,
}

/// Closed graph of module records keyed by canonical path
#[derive(Debug, Default)]
pub struct DependencyGraph {
    records: FxIndexMap<PathBuf, ModuleRecord>,
}

impl DependencyGraph {
    /// Build a graph from completed records, ordered by id.
    ///
    /// Fails if any record names a dependency path that has no record.
    pub fn from_records(records: impl IntoIterator<Item = ModuleRecord>) -> BuildResult<Self> {
        let mut records: Vec<ModuleRecord> = records.into_iter().collect();
        records.sort_by_key(|record| record.id);

        let graph = Self {
            records: records
                .into_iter()
                .map(|record| (record.path.clone(), record))
                .collect(),
        };

        if let Some((importer, specifier, target)) = graph.verify_closed() {
            return Err(BuildError::DanglingEdge {
                importer: importer.to_path_buf(),
                specifier: specifier.to_owned(),
                target: target.to_path_buf(),
            });
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get a record by canonical path
    pub fn get(&self, path: &Path) -> Option<&ModuleRecord> {
        self.records.get(path)
    }

    /// Id assigned to a canonical path
    pub fn id_of(&self, path: &Path) -> Option<ModuleId> {
        self.records.get(path).map(|record| record.id)
    }

    /// The record with id 1
    pub fn entry(&self) -> Option<&ModuleRecord> {
        self.records.values().find(|r| r.id == ModuleId::ENTRY)
    }

    /// All records in ascending id order
    pub fn records_by_id(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.values()
    }

    /// First dependency edge whose target is missing from the graph, as
    /// `(importer, specifier, target)`
    pub fn verify_closed(&self) -> Option<(&Path, &str, &Path)> {
        self.records.values().find_map(|record| {
            record
                .dependencies
                .iter()
                .find(|(_, target)| !self.records.contains_key(target.as_path()))
                .map(|(specifier, target)| {
                    (record.path.as_path(), specifier.as_str(), target.as_path())
                })
        })
    }

    /// Translate a record's specifier -> path mapping into specifier -> id
    pub fn specifier_ids(&self, record: &ModuleRecord) -> BuildResult<FxIndexMap<String, ModuleId>> {
        record
            .dependencies
            .iter()
            .map(|(specifier, target)| {
                let id = self.id_of(target).ok_or_else(|| BuildError::DanglingEdge {
                    importer: record.path.clone(),
                    specifier: specifier.clone(),
                    target: target.clone(),
                })?;
                trace!("{} : '{specifier}' -> {id}", record.path.display());
                Ok((specifier.clone(), id))
            })
            .collect()
    }

    /// Groups of modules that import each other, directly or transitively.
    ///
    /// Each group is sorted by id and groups are ordered by their smallest
    /// id. A module importing itself forms a group of one.
    pub fn find_cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut graph = DiGraph::<ModuleId, ()>::new();
        let nodes: FxHashMap<&Path, _> = self
            .records
            .values()
            .map(|record| (record.path.as_path(), graph.add_node(record.id)))
            .collect();

        for record in self.records.values() {
            let from = nodes[record.path.as_path()];
            for target in record.dependencies.values() {
                if let Some(&to) = nodes.get(target.as_path()) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut cycles: Vec<Vec<ModuleId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut ids: Vec<ModuleId> = component.into_iter().map(|n| graph[n]).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort_by_key(|ids| ids[0]);
        cycles
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(id: u32, path: &str, deps: &[(&str, &str)]) -> ModuleRecord {
        ModuleRecord {
            id: ModuleId::new(id),
            path: PathBuf::from(path),
            dependencies: deps
                .iter()
                .map(|(spec, target)| ((*spec).to_owned(), PathBuf::from(target)))
                .collect(),
            source: String::new(),
            compiled_code: String::new(),
        }
    }

    #[test]
    fn test_records_ordered_by_id() {
        let graph = DependencyGraph::from_records([
            record(3, "/p/c.js", &[]),
            record(1, "/p/main.js", &[("./b", "/p/b.js")]),
            record(2, "/p/b.js", &[("./c", "/p/c.js")]),
        ])
        .unwrap();

        let ids: Vec<u32> = graph.records_by_id().map(|r| r.id.as_u32()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(graph.entry().unwrap().path, PathBuf::from("/p/main.js"));
        assert_eq!(graph.id_of(Path::new("/p/c.js")), Some(ModuleId::new(3)));
    }

    #[test]
    fn test_dangling_edge_is_rejected() {
        let err = DependencyGraph::from_records([record(1, "/p/main.js", &[("./x", "/p/x.js")])])
            .unwrap_err();
        assert!(matches!(err, BuildError::DanglingEdge { ref specifier, .. } if specifier == "./x"));
    }

    #[test]
    fn test_specifier_ids_share_target() {
        let graph = DependencyGraph::from_records([
            record(1, "/p/main.js", &[("./lib/a", "/p/lib/a.js"), ("./app", "/p/app.js")]),
            record(2, "/p/lib/a.js", &[]),
            record(3, "/p/app.js", &[("./lib/a.js", "/p/lib/a.js")]),
        ])
        .unwrap();

        let main = graph.get(Path::new("/p/main.js")).unwrap();
        let app = graph.get(Path::new("/p/app.js")).unwrap();
        assert_eq!(graph.specifier_ids(main).unwrap()["./lib/a"], ModuleId::new(2));
        assert_eq!(graph.specifier_ids(app).unwrap()["./lib/a.js"], ModuleId::new(2));
    }

    #[test]
    fn test_find_cycles() {
        let graph = DependencyGraph::from_records([
            record(1, "/p/main.js", &[("./a", "/p/a.js"), ("./self", "/p/self.js")]),
            record(2, "/p/a.js", &[("./b", "/p/b.js")]),
            record(3, "/p/b.js", &[("./a", "/p/a.js")]),
            record(4, "/p/self.js", &[("./self", "/p/self.js")]),
        ])
        .unwrap();

        assert_eq!(
            graph.find_cycles(),
            vec![
                vec![ModuleId::new(2), ModuleId::new(3)],
                vec![ModuleId::new(4)],
            ]
        );
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let graph = DependencyGraph::from_records([
            record(1, "/p/main.js", &[("./a", "/p/a.js")]),
            record(2, "/p/a.js", &[]),
        ])
        .unwrap();
        assert!(graph.find_cycles().is_empty());
    }
}
