//! End-to-end bundle builds
//!
//! [`BundleOrchestrator`] wires the filesystem resolver and the ES module
//! transformer to the graph builder and the emitter. Each call is a separate
//! build with its own module registry; nothing is shared between calls.

use std::path::Path;

use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::{
    code_generator::BundleEmitter,
    config::Config,
    dependency_graph::{DependencyGraph, ModuleId},
    error::BuildResult,
    graph_builder::ModuleGraphBuilder,
    resolver::FsResolver,
    transform::EsModuleTransformer,
};

#[derive(Debug, Clone, Default)]
pub struct BundleOrchestrator {
    config: Config,
}

impl BundleOrchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover and compile every module reachable from `entry`
    pub fn build_graph(&self, entry: &Path) -> BuildResult<DependencyGraph> {
        let resolver = FsResolver::new(&self.config);
        let transformer = EsModuleTransformer::new(&self.config);
        let graph = ModuleGraphBuilder::new(&resolver, &transformer).build(entry)?;
        log_cycles(&graph);
        Ok(graph)
    }

    /// Build and render a bundle without writing it anywhere
    pub fn bundle_to_string(&self, entry: &Path) -> BuildResult<String> {
        let graph = self.build_graph(entry)?;
        BundleEmitter::render(&graph)
    }

    /// Build, render and write a bundle. Nothing is written if any step fails.
    pub fn bundle_to_file(&self, entry: &Path, output: &Path) -> BuildResult<()> {
        let bundle = self.bundle_to_string(entry)?;
        BundleEmitter::write(&bundle, output)?;
        info!("Bundled {} into {}", entry.display(), output.display());
        Ok(())
    }
}

/// Circular imports are legal; they are reported, not rejected
fn log_cycles(graph: &DependencyGraph) {
    let cycles = graph.find_cycles();
    if cycles.is_empty() {
        return;
    }

    let paths: FxHashMap<ModuleId, &Path> = graph
        .records_by_id()
        .map(|record| (record.id, record.path.as_path()))
        .collect();
    for cycle in cycles {
        let chain: Vec<String> = cycle
            .iter()
            .filter_map(|id| paths.get(id))
            .map(|path| path.display().to_string())
            .collect();
        warn!("circular import: {}", chain.join(" -> "));
    }
}
