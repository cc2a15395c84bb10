pub mod code_generator;
pub mod config;
pub mod dependency_graph;
pub mod dirs;
pub mod error;
pub mod graph_builder;
pub mod module_registry;
pub mod orchestrator;
pub mod resolver;
pub mod runtime;
pub mod transform;
pub mod types;
