//! Source transformation
//!
//! The graph builder needs exactly two things from a module's source text:
//! the specifiers of its static imports, in source order, and a compiled
//! body that can run inside a factory function receiving `require`,
//! `module` and `exports`. [`SourceTransformer`] is that seam;
//! [`EsModuleTransformer`] is the built-in implementation for ES modules,
//! built on the `oxc` parser, transformer and code generator.

mod lower;
mod module_syntax;

use std::fmt;

use oxc_diagnostics::OxcDiagnostic;

pub use lower::EsModuleTransformer;
pub(crate) use lower::quote;
pub use module_syntax::{
    BindingReference, ExportSpecifier, ImportBinding, ModuleItem, ParsedModule, ReferenceContext,
};

/// Parses, inspects and lowers module source text
pub trait SourceTransformer {
    /// Structural representation produced by [`SourceTransformer::parse`]
    type Parsed;

    /// Parse source text; fails with a syntax error on unparsable input
    fn parse(&self, source: &str) -> Result<Self::Parsed, SourceError>;

    /// Specifiers of module-level static imports and re-exports, in source order
    fn static_import_specifiers(&self, parsed: &Self::Parsed) -> Vec<String>;

    /// Lower to a factory body; fails with a transform error on unsupported syntax
    fn lower(&self, parsed: &Self::Parsed, source: &str) -> Result<String, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The text is not valid module syntax
    Syntax,
    /// Valid syntax that cannot be lowered
    Transform,
}

/// A parse or lowering failure with a 1-based source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SourceError {
    pub(crate) fn syntax(source: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::at(SourceErrorKind::Syntax, source, offset, message.into())
    }

    pub(crate) fn transform(source: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::at(SourceErrorKind::Transform, source, offset, message.into())
    }

    /// The first of a non-empty list of `oxc` diagnostics
    pub(crate) fn from_diagnostics(
        kind: SourceErrorKind,
        source: &str,
        diagnostics: &[OxcDiagnostic],
    ) -> Self {
        let Some(first) = diagnostics.first() else {
            return Self::at(kind, source, 0, "invalid source".to_owned());
        };
        let offset = first
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map_or(0, |label| label.offset());
        Self::at(kind, source, offset, first.message.to_string())
    }

    fn at(kind: SourceErrorKind, source: &str, offset: usize, message: String) -> Self {
        let (line, column) = line_column(source, offset);
        Self {
            kind,
            message,
            line,
            column,
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == SourceErrorKind::Syntax
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for SourceError {}

/// 1-based line and column (in chars) of a byte offset
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
