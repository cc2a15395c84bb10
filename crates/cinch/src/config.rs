//! Layered configuration
//!
//! Layers are applied in order, each overriding the fields it sets:
//! built-in defaults, the user config file, the project config file and
//! finally `CINCH_*` environment variables.

use std::{
    env,
    path::{Path, PathBuf},
};

use log::debug;
use oxc_transformer::TransformOptions;
use serde::Deserialize;

use crate::{
    dirs,
    error::{BuildError, BuildResult},
};

pub const ENV_SRC: &str = "CINCH_SRC";
pub const ENV_EXTENSIONS: &str = "CINCH_EXTENSIONS";
pub const ENV_STRICT_MODE: &str = "CINCH_STRICT_MODE";
pub const ENV_TARGET: &str = "CINCH_TARGET";

/// Language level ES modules are lowered to unless configured otherwise
pub const DEFAULT_TARGET: &str = "es2015";

/// Effective configuration for a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source roots searched for bare specifiers such as `app/util`
    pub src: Vec<PathBuf>,
    /// Extensions tried, in order, when a specifier has no exact file match
    pub extensions: Vec<String>,
    /// Prepend `"use strict";` to lowered ES modules
    pub strict_mode: bool,
    /// Syntax target such as `es2015`, `es2020` or `esnext`
    pub target: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            extensions: vec!["js".to_owned(), "mjs".to_owned(), "cjs".to_owned()],
            strict_mode: true,
            target: DEFAULT_TARGET.to_owned(),
        }
    }
}

/// One configuration layer as written in a TOML file; unset keys inherit
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigLayer {
    src: Option<Vec<PathBuf>>,
    extensions: Option<Vec<String>>,
    strict_mode: Option<bool>,
    target: Option<String>,
}

impl Config {
    /// Load the full configuration stack.
    ///
    /// `project_file` is the file given on the command line; when `None`,
    /// `cinch.toml` in the current directory is used if it exists.
    pub fn load(project_file: Option<&Path>) -> BuildResult<Self> {
        let mut config = Self::default();

        if let Some(user_file) = dirs::user_config_file().filter(|path| path.is_file()) {
            config.apply_file(&user_file)?;
        }

        match project_file {
            Some(path) => config.apply_file(path)?,
            None => {
                let local = PathBuf::from(dirs::CONFIG_FILE_NAME);
                if local.is_file() {
                    config.apply_file(&local)?;
                }
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document and apply it on top of `self`.
    ///
    /// Relative `src` entries are kept as written, which makes them relative
    /// to the current directory.
    pub fn apply_toml(&mut self, text: &str, origin: &str) -> BuildResult<()> {
        let layer = parse_layer(text, origin)?;
        self.apply_layer(layer, origin)
    }

    /// Apply a config file; its relative `src` entries are relative to the file
    fn apply_file(&mut self, path: &Path) -> BuildResult<()> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let origin = path.display().to_string();
        let mut layer = parse_layer(&text, &origin)?;

        if let (Some(src), Some(base)) = (layer.src.as_mut(), path.parent()) {
            for root in src.iter_mut().filter(|root| root.is_relative()) {
                *root = base.join(&*root);
            }
        }
        self.apply_layer(layer, &origin)
    }

    fn apply_layer(&mut self, layer: ConfigLayer, origin: &str) -> BuildResult<()> {
        if let Some(src) = layer.src {
            self.src = src;
        }
        if let Some(extensions) = layer.extensions {
            self.extensions = normalize_extensions(extensions, origin)?;
        }
        if let Some(strict_mode) = layer.strict_mode {
            self.strict_mode = strict_mode;
        }
        if let Some(target) = layer.target {
            self.target = validate_target(target, origin)?;
        }
        Ok(())
    }

    /// Apply `CINCH_*` environment overrides
    pub fn apply_env(&mut self) -> BuildResult<()> {
        if let Some(src) = env::var_os(ENV_SRC) {
            self.src = env::split_paths(&src)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Ok(extensions) = env::var(ENV_EXTENSIONS) {
            let list = extensions
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
            self.extensions = normalize_extensions(list, ENV_EXTENSIONS)?;
        }

        if let Ok(value) = env::var(ENV_STRICT_MODE) {
            self.strict_mode = parse_bool(&value).ok_or_else(|| BuildError::Config {
                origin: ENV_STRICT_MODE.to_owned(),
                message: format!("expected a boolean, found '{value}'"),
            })?;
        }

        if let Ok(target) = env::var(ENV_TARGET) {
            self.target = validate_target(target, ENV_TARGET)?;
        }

        Ok(())
    }
}

fn parse_layer(text: &str, origin: &str) -> BuildResult<ConfigLayer> {
    toml::from_str(text).map_err(|e| BuildError::Config {
        origin: origin.to_owned(),
        message: e.message().to_owned(),
    })
}

/// Strip leading dots and reject empty extension lists
fn normalize_extensions(extensions: Vec<String>, origin: &str) -> BuildResult<Vec<String>> {
    let normalized: Vec<String> = extensions
        .into_iter()
        .map(|ext| ext.trim_start_matches('.').to_owned())
        .filter(|ext| !ext.is_empty())
        .collect();

    if normalized.is_empty() {
        return Err(BuildError::Config {
            origin: origin.to_owned(),
            message: "extensions must list at least one extension".to_owned(),
        });
    }
    Ok(normalized)
}

fn validate_target(target: String, origin: &str) -> BuildResult<String> {
    let target = target.trim().to_ascii_lowercase();
    match TransformOptions::from_target(&target) {
        Ok(_) => Ok(target),
        Err(message) => Err(BuildError::Config {
            origin: origin.to_owned(),
            message: format!("invalid target '{target}': {message}"),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
