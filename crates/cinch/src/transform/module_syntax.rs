//! Module structure of a source file
//!
//! A file with `import` or `export` statements is parsed as an ES module,
//! checked, lowered to the configured language target with `oxc_transformer`
//! and printed again. The printed text is parsed a second time and its
//! module-level import and export statements, together with every reference
//! to an imported binding, are recorded as byte spans into that text. The
//! second round is what makes helper imports added by the transformer visible
//! to the graph builder.
//!
//! Files without module syntax are CommonJS scripts and are kept as written.

use std::{ops::Range, path::Path};

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, CallExpression, Class, Declaration, ExportAllDeclaration,
    ExportDefaultDeclarationKind, ExportNamedDeclaration, Expression, IdentifierReference,
    ImportDeclaration, ImportDeclarationSpecifier, MetaProperty, ObjectProperty, Program,
    Statement, TaggedTemplateExpression,
};
use oxc_ast_visit::{Visit, walk};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::symbol::SymbolId;
use oxc_transformer::{TransformOptions, Transformer};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{SourceError, SourceErrorKind};
use crate::types::FxIndexSet;

/// File name handed to the transformer; it only shapes generated helper names
const TRANSFORM_PATH: &str = "module.mjs";

/// A name bound by an import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import local from "..."`
    Default(String),
    /// `import * as local from "..."`
    Namespace(String),
    /// `import { imported as local } from "..."`
    Named { imported: String, local: String },
}

/// `name as exported` inside an export or re-export clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpecifier {
    /// Local binding, or the dependency's export name for re-exports
    pub local: String,
    pub exported: String,
}

/// A module-level import or export statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleItem {
    /// `import ... from "source"` or `import "source"`
    Import {
        span: Range<usize>,
        source: String,
        bindings: Vec<ImportBinding>,
    },
    /// `export var|let|const|function|class ...`; `span` runs from `export`
    /// to the start of the declaration
    Declaration { span: Range<usize>, names: Vec<String> },
    /// `export default function` / `export default class`; `span` covers
    /// `export default`. An anonymous declaration gets a generated name
    /// inserted at `name_offset`.
    DefaultDeclaration {
        span: Range<usize>,
        name: Option<String>,
        name_offset: usize,
    },
    /// `export default <expression>`; `span` covers `export default`
    DefaultExpression { span: Range<usize> },
    /// `export { a, b as c };`
    Named {
        span: Range<usize>,
        specifiers: Vec<ExportSpecifier>,
    },
    /// `export { a as b } from "source";`
    ReExport {
        span: Range<usize>,
        source: String,
        specifiers: Vec<ExportSpecifier>,
    },
    /// `export * from "source";` or `export * as ns from "source";`
    ReExportAll {
        span: Range<usize>,
        source: String,
        namespace: Option<String>,
    },
}

impl ModuleItem {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Self::Import { span, .. }
            | Self::Declaration { span, .. }
            | Self::DefaultDeclaration { span, .. }
            | Self::DefaultExpression { span }
            | Self::Named { span, .. }
            | Self::ReExport { span, .. }
            | Self::ReExportAll { span, .. } => span,
        }
    }

    /// Specifier of the module this item loads, if any
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Import { source, .. }
            | Self::ReExport { source, .. }
            | Self::ReExportAll { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Names this item adds to the module's exports
    fn exported_names(&self) -> Vec<&str> {
        match self {
            Self::Import { .. } => Vec::new(),
            Self::ReExportAll { namespace, .. } => namespace.iter().map(String::as_str).collect(),
            Self::Declaration { names, .. } => names.iter().map(String::as_str).collect(),
            Self::DefaultDeclaration { .. } | Self::DefaultExpression { .. } => vec!["default"],
            Self::Named { specifiers, .. } | Self::ReExport { specifiers, .. } => {
                specifiers.iter().map(|s| s.exported.as_str()).collect()
            }
        }
    }
}

/// How a reference to an imported binding is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceContext {
    /// Any other expression position
    Value,
    /// Callee of a call or tag of a tagged template
    Callee,
    /// `{ name }` shorthand property
    Shorthand,
}

/// A use of a default or named import binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingReference {
    pub span: Range<usize>,
    pub local: String,
    pub context: ReferenceContext,
}

/// Structure of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedModule {
    /// Text every span refers to: the target-lowered module, or the script
    /// exactly as written
    pub code: String,
    pub items: Vec<ModuleItem>,
    pub references: Vec<BindingReference>,
    /// Leading `#!` line, which cannot appear in a factory body
    pub hashbang: Option<Range<usize>>,
}

impl ParsedModule {
    /// Parse `source` and lower its syntax to `target` (`es2015`, `esnext`, ...)
    pub fn parse(source: &str, target: &str) -> Result<Self, SourceError> {
        let options = TransformOptions::from_target(target).map_err(|message| {
            SourceError::transform(source, 0, format!("invalid target '{target}': {message}"))
        })?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
        if !parsed.errors.is_empty() {
            // sloppy-mode scripts are not valid modules
            if Parser::new(&allocator, source, SourceType::cjs())
                .parse()
                .errors
                .is_empty()
            {
                return Ok(Self::script(source));
            }
            return Err(SourceError::from_diagnostics(
                SourceErrorKind::Syntax,
                source,
                &parsed.errors,
            ));
        }
        let mut program = parsed.program;

        reject_unsupported(&program, source)?;
        let items: Vec<ModuleItem> = program
            .body
            .iter()
            .filter_map(|statement| module_item(statement, source))
            .collect();
        if items.is_empty() {
            return Ok(Self::script(source));
        }
        check_duplicate_exports(&items, source)?;

        let lowered = lower_syntax(&allocator, &mut program, source, &options)?;
        Self::collect(lowered)
    }

    /// Whether the file uses import/export syntax at all
    pub fn is_es_module(&self) -> bool {
        !self.items.is_empty()
    }

    fn script(source: &str) -> Self {
        let hashbang = source
            .starts_with("#!")
            .then(|| 0..source.find(['\n', '\r']).unwrap_or(source.len()));
        Self {
            code: source.to_owned(),
            items: Vec::new(),
            references: Vec::new(),
            hashbang,
        }
    }

    /// Record module items and import references of printed module text
    fn collect(code: String) -> Result<Self, SourceError> {
        let (items, references, hashbang) = {
            let allocator = Allocator::default();
            let parsed = Parser::new(&allocator, &code, SourceType::mjs()).parse();
            if !parsed.errors.is_empty() {
                return Err(SourceError::from_diagnostics(
                    SourceErrorKind::Transform,
                    &code,
                    &parsed.errors,
                ));
            }
            let program = parsed.program;
            let semantic = SemanticBuilder::new().build(&program).semantic;

            let items: Vec<ModuleItem> = program
                .body
                .iter()
                .filter_map(|statement| module_item(statement, &code))
                .collect();
            let references = ReferenceCollector::collect(&program, semantic.scoping());
            let hashbang = program.hashbang.as_ref().map(|hashbang| range(hashbang.span));
            (items, references, hashbang)
        };

        Ok(Self {
            code,
            items,
            references,
            hashbang,
        })
    }
}

/// Check `program` and lower it to the target, returning the printed result
fn lower_syntax<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    source: &str,
    options: &TransformOptions,
) -> Result<String, SourceError> {
    let checked = SemanticBuilder::new()
        .with_check_syntax_error(true)
        .build(program);
    if !checked.errors.is_empty() {
        return Err(SourceError::from_diagnostics(
            SourceErrorKind::Syntax,
            source,
            &checked.errors,
        ));
    }
    let scoping = checked.semantic.into_scoping();

    let transformed = Transformer::new(allocator, Path::new(TRANSFORM_PATH), options)
        .build_with_scoping(scoping, program);
    if !transformed.errors.is_empty() {
        return Err(SourceError::from_diagnostics(
            SourceErrorKind::Transform,
            source,
            &transformed.errors,
        ));
    }

    Ok(Codegen::new().build(program).code)
}

fn range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

fn module_item(statement: &Statement<'_>, code: &str) -> Option<ModuleItem> {
    match statement {
        Statement::ImportDeclaration(import) => Some(ModuleItem::Import {
            span: range(import.span),
            source: import.source.value.to_string(),
            bindings: import
                .specifiers
                .iter()
                .flatten()
                .map(import_binding)
                .collect(),
        }),
        Statement::ExportNamedDeclaration(export) => {
            if let Some(declaration) = &export.declaration {
                return Some(ModuleItem::Declaration {
                    span: export.span.start as usize..declaration.span().start as usize,
                    names: declared_names(declaration),
                });
            }
            let specifiers = export
                .specifiers
                .iter()
                .map(|specifier| ExportSpecifier {
                    local: specifier.local.name().to_string(),
                    exported: specifier.exported.name().to_string(),
                })
                .collect();
            Some(match &export.source {
                Some(source) => ModuleItem::ReExport {
                    span: range(export.span),
                    source: source.value.to_string(),
                    specifiers,
                },
                None => ModuleItem::Named {
                    span: range(export.span),
                    specifiers,
                },
            })
        }
        Statement::ExportDefaultDeclaration(export) => {
            let span = export.span.start as usize..export.declaration.span().start as usize;
            Some(match &export.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                    ModuleItem::DefaultDeclaration {
                        span,
                        name: binding_name(function.id.as_ref()),
                        name_offset: function.params.span.start as usize,
                    }
                }
                ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                    ModuleItem::DefaultDeclaration {
                        span,
                        name: binding_name(class.id.as_ref()),
                        name_offset: class_name_offset(class, code),
                    }
                }
                _ => ModuleItem::DefaultExpression { span },
            })
        }
        Statement::ExportAllDeclaration(export) => Some(ModuleItem::ReExportAll {
            span: range(export.span),
            source: export.source.value.to_string(),
            namespace: export.exported.as_ref().map(|name| name.name().to_string()),
        }),
        _ => None,
    }
}

fn import_binding(specifier: &ImportDeclarationSpecifier<'_>) -> ImportBinding {
    match specifier {
        ImportDeclarationSpecifier::ImportSpecifier(specifier) => ImportBinding::Named {
            imported: specifier.imported.name().to_string(),
            local: specifier.local.name.to_string(),
        },
        ImportDeclarationSpecifier::ImportDefaultSpecifier(specifier) => {
            ImportBinding::Default(specifier.local.name.to_string())
        }
        ImportDeclarationSpecifier::ImportNamespaceSpecifier(specifier) => {
            ImportBinding::Namespace(specifier.local.name.to_string())
        }
    }
}

fn binding_name(id: Option<&BindingIdentifier<'_>>) -> Option<String> {
    id.map(|id| id.name.to_string())
}

/// Offset just past the `class` keyword of an anonymous class
fn class_name_offset(class: &Class<'_>, code: &str) -> usize {
    let start = class.span.start as usize;
    let anchor = class
        .super_class
        .as_ref()
        .map_or(class.body.span.start, |super_class| super_class.span().start) as usize;
    code.get(start..anchor)
        .and_then(|head| head.rfind("class"))
        .map_or(anchor, |at| start + at + "class".len())
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(variables) => {
            let mut names = BoundNames::default();
            for declarator in &variables.declarations {
                names.visit_binding_pattern(&declarator.id);
            }
            names.0
        }
        Declaration::FunctionDeclaration(function) => {
            binding_name(function.id.as_ref()).into_iter().collect()
        }
        Declaration::ClassDeclaration(class) => binding_name(class.id.as_ref()).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Names bound by a destructuring pattern
#[derive(Default)]
struct BoundNames(Vec<String>);

impl<'a> Visit<'a> for BoundNames {
    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.0.push(it.name.to_string());
    }

    // default values and computed keys bind nothing
    fn visit_expression(&mut self, _it: &Expression<'a>) {}
}

fn check_duplicate_exports(items: &[ModuleItem], source: &str) -> Result<(), SourceError> {
    let mut seen = FxIndexSet::default();
    for item in items {
        for name in item.exported_names() {
            if !seen.insert(name) {
                return Err(SourceError::syntax(
                    source,
                    item.span().start,
                    format!("duplicate export '{name}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Import attributes, source/defer phase imports and `import.meta` have no
/// equivalent inside a factory function
fn reject_unsupported(program: &Program<'_>, source: &str) -> Result<(), SourceError> {
    for statement in &program.body {
        let attributes = match statement {
            Statement::ImportDeclaration(import) => {
                if import.phase.is_some() {
                    return Err(SourceError::transform(
                        source,
                        import.span.start as usize,
                        "import phases are not supported",
                    ));
                }
                import.with_clause.as_ref().map(|clause| clause.span)
            }
            Statement::ExportNamedDeclaration(export) => {
                export.with_clause.as_ref().map(|clause| clause.span)
            }
            Statement::ExportAllDeclaration(export) => {
                export.with_clause.as_ref().map(|clause| clause.span)
            }
            _ => None,
        };
        if let Some(span) = attributes {
            return Err(SourceError::transform(
                source,
                span.start as usize,
                "import attributes are not supported",
            ));
        }
    }

    let mut meta = ImportMeta(None);
    meta.visit_program(program);
    match meta.0 {
        Some(span) => Err(SourceError::transform(
            source,
            span.start as usize,
            "import.meta is not supported",
        )),
        None => Ok(()),
    }
}

/// First `import.meta` in a program
struct ImportMeta(Option<Span>);

impl<'a> Visit<'a> for ImportMeta {
    fn visit_meta_property(&mut self, it: &MetaProperty<'a>) {
        if self.0.is_none() && it.meta.name.as_str() == "import" {
            self.0 = Some(it.span);
        }
    }
}

/// Finds every resolved reference to a default or named import binding
struct ReferenceCollector<'s> {
    scoping: &'s Scoping,
    imports: FxHashMap<SymbolId, String>,
    callees: FxHashSet<u32>,
    shorthands: FxHashSet<u32>,
    references: Vec<BindingReference>,
}

impl<'s> ReferenceCollector<'s> {
    fn collect(program: &Program<'_>, scoping: &'s Scoping) -> Vec<BindingReference> {
        let imports = program
            .body
            .iter()
            .filter_map(|statement| match statement {
                Statement::ImportDeclaration(import) => Some(import),
                _ => None,
            })
            .flat_map(|import| import.specifiers.iter().flatten())
            .filter_map(|specifier| match specifier {
                ImportDeclarationSpecifier::ImportSpecifier(specifier) => Some(&specifier.local),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(specifier) => {
                    Some(&specifier.local)
                }
                // namespace objects stay ordinary bindings
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => None,
            })
            .filter_map(|local| Some((local.symbol_id.get()?, local.name.to_string())))
            .collect::<FxHashMap<_, _>>();
        if imports.is_empty() {
            return Vec::new();
        }

        let mut collector = Self {
            scoping,
            imports,
            callees: FxHashSet::default(),
            shorthands: FxHashSet::default(),
            references: Vec::new(),
        };
        collector.visit_program(program);
        collector.references
    }
}

impl<'a> Visit<'a> for ReferenceCollector<'_> {
    fn visit_import_declaration(&mut self, _it: &ImportDeclaration<'a>) {}

    fn visit_export_all_declaration(&mut self, _it: &ExportAllDeclaration<'a>) {}

    // export clauses are lowered to getters, not rewritten in place
    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        if let Some(declaration) = &it.declaration {
            self.visit_declaration(declaration);
        }
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee {
            self.callees.insert(callee.span.start);
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_tagged_template_expression(&mut self, it: &TaggedTemplateExpression<'a>) {
        if let Expression::Identifier(tag) = &it.tag {
            self.callees.insert(tag.span.start);
        }
        walk::walk_tagged_template_expression(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand
            && let Expression::Identifier(value) = &it.value
        {
            self.shorthands.insert(value.span.start);
        }
        walk::walk_object_property(self, it);
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        let Some(reference_id) = it.reference_id.get() else {
            return;
        };
        let Some(local) = self
            .scoping
            .get_reference(reference_id)
            .symbol_id()
            .and_then(|symbol_id| self.imports.get(&symbol_id))
        else {
            return;
        };

        let context = if self.callees.contains(&it.span.start) {
            ReferenceContext::Callee
        } else if self.shorthands.contains(&it.span.start) {
            ReferenceContext::Shorthand
        } else {
            ReferenceContext::Value
        };
        self.references.push(BindingReference {
            span: range(it.span),
            local: local.clone(),
            context,
        });
    }
}
