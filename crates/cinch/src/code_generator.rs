//! Bundle rendering and output
//!
//! Rendering runs in two steps. The graph is first turned into a list of
//! [`EmittedModule`]s, one per record in id order, with each record's
//! specifier -> path mapping translated into specifier -> id. The list is
//! then rendered as the module table and wrapped in the runtime loader.

use std::{fmt::Write as _, fs, path::Path};

use log::{debug, info};

use crate::{
    dependency_graph::{DependencyGraph, ModuleId},
    error::{BuildError, BuildResult},
    runtime,
    transform::quote,
    types::FxIndexMap,
};

/// One module table entry, ready to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedModule {
    pub id: ModuleId,
    /// Factory body
    pub code: String,
    /// Specifier as written in the module -> id of the module it names
    pub mapping: FxIndexMap<String, ModuleId>,
}

/// Renders a [`DependencyGraph`] into a single self-executing script
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleEmitter;

impl BundleEmitter {
    /// Table entries for every record, in ascending id order
    pub fn emit_modules(graph: &DependencyGraph) -> BuildResult<Vec<EmittedModule>> {
        graph
            .records_by_id()
            .map(|record| {
                Ok(EmittedModule {
                    id: record.id,
                    code: record.compiled_code.clone(),
                    mapping: graph.specifier_ids(record)?,
                })
            })
            .collect()
    }

    /// Render the module table object literal
    pub fn render_table(modules: &[EmittedModule]) -> String {
        let mut out = String::from("{\n");
        for module in modules {
            let _ = write!(
                out,
                "{}: [function (require, module, exports) {{\n{}",
                module.id, module.code
            );
            if !module.code.is_empty() && !module.code.ends_with('\n') {
                out.push('\n');
            }
            let _ = writeln!(out, "}}, {}],", render_mapping(&module.mapping));
        }
        out.push('}');
        out
    }

    /// Render the complete bundle: loader, module table and entry call
    pub fn render(graph: &DependencyGraph) -> BuildResult<String> {
        let modules = Self::emit_modules(graph)?;
        debug!("Rendering {} modules", modules.len());
        Ok(runtime::wrap(&Self::render_table(&modules), ModuleId::ENTRY))
    }

    /// Write a rendered bundle, creating missing parent directories first
    pub fn write(bundle: &str, destination: &Path) -> BuildResult<()> {
        let io_error = |source: std::io::Error| BuildError::Io {
            path: destination.to_path_buf(),
            source,
        };

        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(destination, bundle).map_err(io_error)?;

        info!(
            "Wrote bundle to {} ({} bytes)",
            destination.display(),
            bundle.len()
        );
        Ok(())
    }
}

fn render_mapping(mapping: &FxIndexMap<String, ModuleId>) -> String {
    if mapping.is_empty() {
        return "{}".to_owned();
    }
    let entries: Vec<String> = mapping
        .iter()
        .map(|(specifier, id)| format!("{}: {id}", quote(specifier)))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}
