//! Import specifier resolution
//!
//! A [`PathResolver`] turns the literal text of an import specifier into the
//! canonical path of the file it names. The canonical path is the module's
//! identity, so two spellings that reach the same file resolve to the same
//! module. [`FsResolver`] is the filesystem-backed implementation.

use std::path::{Component, Path, PathBuf};

use log::{debug, trace};

use crate::config::Config;

/// Why a specifier could not be mapped to a file
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no file found for '{specifier}' (tried {})", display_paths(.tried))]
    NotFound {
        specifier: String,
        tried: Vec<PathBuf>,
    },

    #[error("'{specifier}' is ambiguous, it matches {}", display_paths(.candidates))]
    Ambiguous {
        specifier: String,
        candidates: Vec<PathBuf>,
    },

    #[error("bare specifier '{0}' cannot be resolved without configured source roots")]
    BareSpecifier(String),

    #[error("failed to canonicalize {}", path.display())]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps an import specifier, relative to the directory of the importing
/// module, to one canonical absolute file path
pub trait PathResolver {
    fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError>;
}

/// Outcome of probing one candidate base path
enum Probe {
    Hit(PathBuf),
    Miss,
}

/// Filesystem resolver supporting relative, absolute and source-root specifiers
#[derive(Debug, Clone)]
pub struct FsResolver {
    /// Extensions tried after an exact match fails, without the leading dot
    extensions: Vec<String>,
    /// Roots searched for bare specifiers
    src_roots: Vec<PathBuf>,
}

impl FsResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            extensions: config.extensions.clone(),
            src_roots: config.src.clone(),
        }
    }

    fn is_path_like(specifier: &str) -> bool {
        specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == ".."
            || Path::new(specifier).is_absolute()
    }

    /// Candidate base paths for a specifier, in search order
    fn bases(&self, specifier: &str, from_dir: &Path) -> Result<Vec<PathBuf>, ResolveError> {
        if Self::is_path_like(specifier) {
            return Ok(vec![from_dir.join(specifier)]);
        }

        if self.src_roots.is_empty() {
            return Err(ResolveError::BareSpecifier(specifier.to_owned()));
        }

        Ok(self
            .src_roots
            .iter()
            .map(|root| root.join(specifier))
            .collect())
    }

    /// Try `base`, then `base.<ext>`, then `base/index.<ext>`
    fn probe(
        &self,
        specifier: &str,
        base: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<Probe, ResolveError> {
        tried.push(base.to_path_buf());
        if base.is_file() {
            return Ok(Probe::Hit(base.to_path_buf()));
        }

        if let Some(hit) = self.probe_extensions(specifier, base, tried)? {
            return Ok(Probe::Hit(hit));
        }

        if base.is_dir() {
            let index = base.join("index");
            if let Some(hit) = self.probe_extensions(specifier, &index, tried)? {
                return Ok(Probe::Hit(hit));
            }
        }

        Ok(Probe::Miss)
    }

    /// Exactly one existing `stem.<ext>` resolves; several are ambiguous
    fn probe_extensions(
        &self,
        specifier: &str,
        stem: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let mut hits = Vec::new();
        for ext in &self.extensions {
            let candidate = append_extension(stem, ext);
            trace!("Probing {}", candidate.display());
            if candidate.is_file() {
                hits.push(candidate.clone());
            }
            tried.push(candidate);
        }

        match hits.len() {
            0 => Ok(None),
            1 => Ok(hits.pop()),
            _ => Err(ResolveError::Ambiguous {
                specifier: specifier.to_owned(),
                candidates: hits,
            }),
        }
    }
}

impl PathResolver for FsResolver {
    fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<PathBuf, ResolveError> {
        let mut tried = Vec::new();

        for base in self.bases(specifier, from_dir)? {
            let base = lexically_normalize(&base);
            if let Probe::Hit(path) = self.probe(specifier, &base, &mut tried)? {
                let canonical = path
                    .canonicalize()
                    .map_err(|source| ResolveError::Canonicalize {
                        path: path.clone(),
                        source,
                    })?;
                debug!(
                    "Resolved '{specifier}' from {} to {}",
                    from_dir.display(),
                    canonical.display()
                );
                return Ok(canonical);
            }
        }

        Err(ResolveError::NotFound {
            specifier: specifier.to_owned(),
            tried,
        })
    }
}

/// `a/b` + `js` -> `a/b.js`, keeping any dots already in the file name
fn append_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut os = stem.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Collapse `.` and `..` components without touching the filesystem, the way
/// `path.resolve` does. Identity still comes from canonicalizing the hit.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
