//! Module graph construction
//!
//! Walks the import graph depth-first from the entry module. Every module is
//! reserved in the build's [`ModuleRegistry`] before its dependencies are
//! visited, so a module reached again through a cycle or a second importer is
//! recognized immediately and never read or compiled twice.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, trace};

use crate::{
    dependency_graph::{DependencyGraph, ModuleId, ModuleRecord},
    error::{BuildError, BuildResult},
    module_registry::{ModuleRegistry, Reservation},
    resolver::PathResolver,
    transform::SourceTransformer,
    types::FxIndexMap,
};

/// Builds a closed [`DependencyGraph`] from an entry module
#[derive(Debug)]
pub struct ModuleGraphBuilder<'a, R, T> {
    resolver: &'a R,
    transformer: &'a T,
}

impl<'a, R: PathResolver, T: SourceTransformer> ModuleGraphBuilder<'a, R, T> {
    pub fn new(resolver: &'a R, transformer: &'a T) -> Self {
        Self {
            resolver,
            transformer,
        }
    }

    /// Discover and compile every module reachable from `entry`.
    ///
    /// The entry gets [`ModuleId::ENTRY`]. Each call uses its own registry,
    /// so ids from one build never leak into the next. The first failure
    /// aborts the build and the partial registry is discarded.
    pub fn build(&self, entry: &Path) -> BuildResult<DependencyGraph> {
        let entry = fs::canonicalize(entry).map_err(|source| BuildError::Io {
            path: entry.to_path_buf(),
            source,
        })?;
        info!("Building module graph from {}", entry.display());

        let mut registry = ModuleRegistry::new();
        let entry_id = self.discover(&mut registry, &entry)?;
        debug_assert_eq!(entry_id, ModuleId::ENTRY);

        let graph = registry.into_graph()?;
        info!("Discovered {} modules", graph.len());
        Ok(graph)
    }

    fn discover(&self, registry: &mut ModuleRegistry, path: &Path) -> BuildResult<ModuleId> {
        let id = match registry.reserve(path) {
            Reservation::Existing(id) => {
                trace!("Module {id} already known: {}", path.display());
                return Ok(id);
            }
            Reservation::New(id) => id,
        };
        debug!("Discovering module {id}: {}", path.display());

        let source = fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = self
            .transformer
            .parse(&source)
            .map_err(|e| BuildError::from_source(path.to_path_buf(), e))?;

        let from_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut dependencies: FxIndexMap<String, PathBuf> = FxIndexMap::default();
        for specifier in self.transformer.static_import_specifiers(&parsed) {
            if dependencies.contains_key(&specifier) {
                continue;
            }
            let resolved = self
                .resolver
                .resolve(&specifier, from_dir)
                .map_err(|source| BuildError::Resolution {
                    specifier: specifier.clone(),
                    importer: path.to_path_buf(),
                    source,
                })?;
            trace!("  '{specifier}' -> {}", resolved.display());
            dependencies.insert(specifier, resolved);
        }

        for dependency in dependencies.values() {
            self.discover(registry, dependency)?;
        }

        let compiled_code = self
            .transformer
            .lower(&parsed, &source)
            .map_err(|e| BuildError::from_source(path.to_path_buf(), e))?;

        registry.complete(ModuleRecord {
            id,
            path: path.to_path_buf(),
            dependencies,
            source,
            compiled_code,
        });
        Ok(id)
    }
}
