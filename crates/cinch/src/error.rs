//! Error kinds surfaced by a bundle build
//!
//! Every failure is fatal for the build it occurs in: the first error aborts
//! graph construction or emission and is reported with the offending module
//! path and the underlying cause.

use std::path::PathBuf;

use crate::{resolver::ResolveError, transform::SourceError};

/// A failure that aborts a bundle build
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// An import specifier could not be mapped to a file from the importer's directory
    #[error("cannot resolve '{specifier}' imported from {}", importer.display())]
    Resolution {
        specifier: String,
        importer: PathBuf,
        #[source]
        source: ResolveError,
    },

    /// Module source text failed to parse
    #[error("syntax error in {}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    /// Module parsed but could not be lowered
    #[error("cannot transform {}", path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: SourceError,
    },

    /// Reading a module or writing the bundle failed
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record depends on a path that has no record of its own
    #[error(
        "module graph is not closed: {} imports '{specifier}' -> {}, which has no record",
        importer.display(),
        target.display()
    )]
    DanglingEdge {
        importer: PathBuf,
        specifier: String,
        target: PathBuf,
    },

    /// A configuration layer (file or environment variable) is invalid
    #[error("invalid configuration from {origin}: {message}")]
    Config { origin: String, message: String },
}

impl BuildError {
    /// Wrap a transformer failure, keeping the syntax/transform distinction
    pub fn from_source(path: PathBuf, source: SourceError) -> Self {
        if source.is_syntax() {
            Self::Syntax { path, source }
        } else {
            Self::Transform { path, source }
        }
    }

    /// Path of the module or file the error is attributed to
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Resolution { importer, .. } | Self::DanglingEdge { importer, .. } => {
                Some(importer.as_path())
            }
            Self::Syntax { path, .. } | Self::Transform { path, .. } | Self::Io { path, .. } => {
                Some(path.as_path())
            }
            Self::Config { .. } => None,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
