//! Lowering of ES module syntax to the factory calling convention
//!
//! A lowered module runs as the body of `function (require, module, exports)`.
//! Everything the module imports or exports is set up in a prelude ahead of
//! the body: export getters first, then the dependency requires in source
//! order. The import and export statements themselves are cut out of the
//! body, keeping their line breaks.
//!
//! Imported bindings stay live. Each dependency's exports object is held in a
//! temporary and every use of a default or named import is rewritten to a
//! member access on it, so the value is read when the code runs rather than
//! when the dependency first returns from `require`.

use std::ops::Range;

use log::trace;
use oxc_syntax::identifier::is_identifier_name;
use rustc_hash::FxHashMap;

use super::{
    SourceError, SourceTransformer,
    module_syntax::{
        BindingReference, ExportSpecifier, ImportBinding, ModuleItem, ParsedModule,
        ReferenceContext,
    },
};
use crate::config::{Config, DEFAULT_TARGET};

/// Name given to an anonymous `export default function` or `class`
const DEFAULT_NAME: &str = "__cinch_default__";

const INTEROP: &str = "__cinch_interop__";

/// Built-in [`SourceTransformer`] for ES modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsModuleTransformer {
    strict_mode: bool,
    target: String,
}

impl Default for EsModuleTransformer {
    fn default() -> Self {
        Self {
            strict_mode: true,
            target: DEFAULT_TARGET.to_owned(),
        }
    }
}

impl EsModuleTransformer {
    pub fn new(config: &Config) -> Self {
        Self {
            strict_mode: config.strict_mode,
            target: config.target.clone(),
        }
    }
}

impl SourceTransformer for EsModuleTransformer {
    type Parsed = ParsedModule;

    fn parse(&self, source: &str) -> Result<ParsedModule, SourceError> {
        ParsedModule::parse(source, &self.target)
    }

    fn static_import_specifiers(&self, parsed: &ParsedModule) -> Vec<String> {
        parsed
            .items
            .iter()
            .filter_map(ModuleItem::source)
            .map(str::to_owned)
            .collect()
    }

    fn lower(&self, parsed: &ParsedModule, _source: &str) -> Result<String, SourceError> {
        let code = parsed.code.as_str();
        if !parsed.is_es_module() {
            let body_start = parsed.hashbang.as_ref().map_or(0, |hashbang| hashbang.end);
            return Ok(code[body_start..].to_owned());
        }

        let mut lowering = Lowering::default();
        for item in &parsed.items {
            lowering.load(item);
        }
        for item in &parsed.items {
            lowering.export(item);
        }
        for reference in &parsed.references {
            lowering.reference(reference);
        }
        if let Some(hashbang) = &parsed.hashbang {
            lowering.remove(hashbang);
        }

        let mut prelude = Vec::new();
        if self.strict_mode {
            prelude.push("\"use strict\";".to_owned());
        }
        prelude.push("Object.defineProperty(exports, \"__esModule\", { value: true });".to_owned());
        if lowering.uses_interop {
            prelude.push(format!(
                "function {INTEROP}(m) {{ return m && m.__esModule ? m : {{ default: m }}; }}"
            ));
        }

        trace!(
            "Lowered {} module items and {} import references",
            parsed.items.len(),
            parsed.references.len()
        );
        Ok(lowering.render(&prelude, code))
    }
}

/// Accumulated output of lowering one module
#[derive(Default)]
struct Lowering {
    /// Export getters; defined before any dependency runs so circular
    /// importers see every name this module exports
    getters: Vec<String>,
    /// Dependency requires and the temporaries they fill, in source order
    requires: Vec<String>,
    /// Expression each default or named import local stands for
    bindings: FxHashMap<String, String>,
    /// Byte range of the code to replace, and its replacement
    edits: Vec<(Range<usize>, String)>,
    uses_interop: bool,
    next_temp: usize,
}

impl Lowering {
    /// Set up the requires and import bindings of one item
    fn load(&mut self, item: &ModuleItem) {
        match item {
            ModuleItem::Import {
                span,
                source,
                bindings,
            } => {
                self.import(source, bindings);
                self.remove(span);
            }
            ModuleItem::ReExport {
                span,
                source,
                specifiers,
            } => {
                let temp = self.require_temp(source);
                for ExportSpecifier { local, exported } in specifiers {
                    self.getter(exported, &member(&temp, local));
                }
                self.remove(span);
            }
            ModuleItem::ReExportAll {
                span,
                source,
                namespace: Some(namespace),
            } => {
                let temp = self.require_temp(source);
                self.getter(namespace, &temp);
                self.remove(span);
            }
            ModuleItem::ReExportAll {
                span,
                source,
                namespace: None,
            } => {
                let temp = self.require_temp(source);
                self.requires.push(format!(
                    "Object.keys({temp}).forEach(function (key) {{ \
                     if (key === \"default\" || key === \"__esModule\" || \
                     Object.prototype.hasOwnProperty.call(exports, key)) return; \
                     Object.defineProperty(exports, key, {{ enumerable: true, \
                     get: function () {{ return {temp}[key]; }} }}); }});"
                ));
                self.remove(span);
            }
            _ => {}
        }
    }

    /// Define the getters of one local export item
    fn export(&mut self, item: &ModuleItem) {
        match item {
            ModuleItem::Declaration { span, names } => {
                for name in names {
                    self.getter(name, name);
                }
                self.remove(span);
            }
            ModuleItem::DefaultDeclaration {
                span,
                name: Some(name),
                ..
            } => {
                self.getter("default", name);
                self.remove(span);
            }
            ModuleItem::DefaultDeclaration {
                span,
                name: None,
                name_offset,
            } => {
                self.getter("default", DEFAULT_NAME);
                self.remove(span);
                self.edits
                    .push((*name_offset..*name_offset, format!(" {DEFAULT_NAME}")));
            }
            ModuleItem::DefaultExpression { span } => {
                self.edits.push((span.clone(), "exports.default = ".to_owned()));
            }
            ModuleItem::Named { span, specifiers } => {
                for ExportSpecifier { local, exported } in specifiers {
                    let value = self.bindings.get(local).cloned();
                    self.getter(exported, value.as_deref().unwrap_or(local));
                }
                self.remove(span);
            }
            _ => {}
        }
    }

    fn import(&mut self, source: &str, bindings: &[ImportBinding]) {
        if bindings.is_empty() {
            self.requires.push(format!("require({});", quote(source)));
            return;
        }

        let namespace = bindings.iter().find_map(|binding| match binding {
            ImportBinding::Namespace(local) => Some(local.clone()),
            _ => None,
        });
        let needs_temp = bindings
            .iter()
            .any(|binding| matches!(binding, ImportBinding::Named { .. }));
        let raw = match namespace {
            Some(local) => {
                self.requires
                    .push(format!("var {local} = require({});", quote(source)));
                Some(local)
            }
            None if needs_temp => Some(self.require_temp(source)),
            None => None,
        };

        for binding in bindings {
            match binding {
                ImportBinding::Default(local) => {
                    let value = match &raw {
                        Some(raw) => raw.clone(),
                        None => format!("require({})", quote(source)),
                    };
                    let temp = self.temp();
                    self.requires
                        .push(format!("var {temp} = {INTEROP}({value});"));
                    self.uses_interop = true;
                    self.bindings.insert(local.clone(), format!("{temp}.default"));
                }
                ImportBinding::Named { imported, local } => {
                    if let Some(raw) = &raw {
                        self.bindings.insert(local.clone(), member(raw, imported));
                    }
                }
                ImportBinding::Namespace(_) => {}
            }
        }
    }

    fn reference(&mut self, reference: &BindingReference) {
        let Some(value) = self.bindings.get(&reference.local) else {
            return;
        };
        let replacement = match reference.context {
            ReferenceContext::Value => value.clone(),
            // keep `this` undefined inside the called function
            ReferenceContext::Callee => format!("(0, {value})"),
            ReferenceContext::Shorthand => format!("{}: {value}", reference.local),
        };
        self.edits.push((reference.span.clone(), replacement));
    }

    fn temp(&mut self) -> String {
        let temp = format!("__cinch_import_{}__", self.next_temp);
        self.next_temp += 1;
        temp
    }

    /// Require `source` into a fresh temporary and return its name
    fn require_temp(&mut self, source: &str) -> String {
        let temp = self.temp();
        self.requires
            .push(format!("var {temp} = require({});", quote(source)));
        temp
    }

    fn getter(&mut self, exported: &str, value: &str) {
        self.getters.push(format!(
            "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {value}; }} }});",
            quote(exported)
        ));
    }

    /// Cut a span out; its line breaks are kept when rendering
    fn remove(&mut self, span: &Range<usize>) {
        self.edits.push((span.clone(), String::new()));
    }

    fn render(mut self, prelude: &[String], code: &str) -> String {
        let mut out = String::with_capacity(code.len() + 256);
        for line in prelude.iter().chain(&self.getters).chain(&self.requires) {
            out.push_str(line);
            out.push('\n');
        }

        // insertions at a removed span's end sort after the removal
        self.edits
            .sort_by_key(|(range, _)| (range.start, range.end));
        let mut cursor = 0;
        for (range, replacement) in self.edits {
            if range.start < cursor {
                continue;
            }
            out.push_str(&code[cursor..range.start]);
            out.push_str(&replacement);
            for _ in code[range.clone()].matches('\n') {
                out.push('\n');
            }
            cursor = range.end;
        }
        out.push_str(&code[cursor..]);
        out
    }
}

/// `object.name`, or `object["name"]` when `name` is not an identifier
fn member(object: &str, name: &str) -> String {
    if is_identifier_name(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", quote(name))
    }
}

/// JSON string quoting, which is also a valid JavaScript string literal
pub(crate) fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn transformer(target: &str) -> EsModuleTransformer {
        EsModuleTransformer {
            strict_mode: false,
            target: target.to_owned(),
        }
    }

    fn lower(source: &str) -> String {
        let transformer = transformer("esnext");
        let parsed = transformer.parse(source).unwrap();
        transformer.lower(&parsed, source).unwrap()
    }

    #[test]
    fn test_plain_scripts_pass_through() {
        let src = "const x = require('./x');\nmodule.exports = x + 1;\n";
        assert_eq!(lower(src), src);
        assert_eq!(lower("#!/usr/bin/env node\nrun();"), "\nrun();");
    }

    #[test]
    fn test_imports_become_member_accesses() {
        let out = lower(
            "import './side';\nimport d from './d';\nimport * as ns from './ns';\nimport { a, b as c } from './n';\nuse(d, ns, a, c);\n",
        );
        for line in [
            "require(\"./side\");\n",
            "var __cinch_import_0__ = __cinch_interop__(require(\"./d\"));\n",
            "var ns = require(\"./ns\");\n",
            "var __cinch_import_1__ = require(\"./n\");\n",
            "use(__cinch_import_0__.default, ns, __cinch_import_1__.a, __cinch_import_1__.b);",
        ] {
            assert!(out.contains(line), "missing {line:?} in\n{out}");
        }
        assert!(out.contains("function __cinch_interop__(m)"));
        assert!(!out.contains("import "));
    }

    #[test]
    fn test_default_and_named_from_one_namespace() {
        let out = lower("import d, * as ns from './x';\nimport e, { f } from './y';\nlog(d, ns.z, e, f);");
        assert!(out.contains("var __cinch_import_0__ = __cinch_interop__(ns);"), "{out}");
        assert!(out.contains("var __cinch_import_1__ = require(\"./y\");"), "{out}");
        assert!(out.contains("var __cinch_import_2__ = __cinch_interop__(__cinch_import_1__);"), "{out}");
        assert!(
            out.contains("log(__cinch_import_0__.default, ns.z, __cinch_import_2__.default, __cinch_import_1__.f);"),
            "{out}"
        );
    }

    #[test]
    fn test_callee_and_shorthand_references() {
        let out = lower("import { b, tag } from './b';\nconst o = { b };\nb(1);\ntag`x`;\nfunction g(b) { return b; }");
        assert!(out.contains("(0, __cinch_import_0__.b)(1)"), "{out}");
        assert!(out.contains("(0, __cinch_import_0__.tag)`x`"), "{out}");
        assert!(out.contains("b: __cinch_import_0__.b"), "{out}");
        // the parameter shadows the import
        assert!(out.contains("return b;"), "{out}");
    }

    #[test]
    fn test_string_import_names_use_bracket_access() {
        let out = lower("import { \"kebab-name\" as k } from './x';\nk();");
        assert!(out.contains("(0, __cinch_import_0__[\"kebab-name\"])()"), "{out}");
    }

    #[test]
    fn test_export_declarations_keep_their_bodies() {
        let out = lower("export const a = 1;\nexport function f() { return a; }\n");
        assert!(out.contains(
            "Object.defineProperty(exports, \"a\", { enumerable: true, get: function () { return a; } });"
        ));
        assert!(out.contains("\"f\", { enumerable: true, get: function () { return f; } }"));
        assert!(out.contains("const a = 1;"));
        assert!(out.contains("function f() {"));
        assert!(!out.contains("export "));
    }

    #[test]
    fn test_default_exports() {
        assert!(lower("export default 42;").contains("exports.default = 42;"));

        let out = lower("export default class Widget {}");
        assert!(out.contains("\"default\", { enumerable: true, get: function () { return Widget; } }"));
        assert!(out.contains("class Widget {}"));
    }

    #[test]
    fn test_anonymous_default_declarations_are_named() {
        let out = lower("export default function () { return 1; }");
        assert!(out.contains("get: function () { return __cinch_default__; }"), "{out}");
        assert!(out.contains("function __cinch_default__() {"), "{out}");

        let out = lower("export default class extends Array {}");
        assert!(out.contains("class __cinch_default__ extends Array {}"), "{out}");
    }

    #[test]
    fn test_exported_imports_stay_live() {
        let out = lower("import { a as b } from './a';\nexport { b as c };");
        assert!(out.contains("\"c\", { enumerable: true, get: function () { return __cinch_import_0__.a; } }"), "{out}");
    }

    #[test]
    fn test_re_exports() {
        let out = lower("export { x as y, default } from './x';\nexport * as all from './all';\nexport * from './star';");
        assert!(out.contains("var __cinch_import_0__ = require(\"./x\");"));
        assert!(out.contains("\"y\", { enumerable: true, get: function () { return __cinch_import_0__.x; } }"));
        assert!(out.contains("\"default\", { enumerable: true, get: function () { return __cinch_import_0__.default; } }"));
        assert!(out.contains("\"all\", { enumerable: true, get: function () { return __cinch_import_1__; } }"));
        assert!(out.contains("Object.keys(__cinch_import_2__).forEach("));
    }

    #[test]
    fn test_getters_precede_requires() {
        let out = lower("import a from './a';\nexport function f() { return a; }");
        let getter = out.find("\"f\"").unwrap();
        let require = out.find("require(\"./a\")").unwrap();
        assert!(getter < require);
    }

    #[test]
    fn test_strict_mode_directive() {
        let transformer = EsModuleTransformer::default();
        let src = "export const a = 1;";
        let parsed = transformer.parse(src).unwrap();
        let out = transformer.lower(&parsed, src).unwrap();
        assert!(out.starts_with("\"use strict\";\n"));

        // plain scripts keep their own strictness
        let parsed = transformer.parse("x = 1;").unwrap();
        assert_eq!(transformer.lower(&parsed, "x = 1;").unwrap(), "x = 1;");
    }

    #[test]
    fn test_syntax_is_lowered_to_the_target() {
        let src = "export const x = 2 ** 3;";
        let es2015 = transformer("es2015");
        let out = es2015.lower(&es2015.parse(src).unwrap(), src).unwrap();
        assert!(out.contains("Math.pow(2, 3)"), "{out}");

        assert!(lower(src).contains("2 ** 3"));
    }

    #[test]
    fn test_static_import_specifiers_in_source_order() {
        let transformer = EsModuleTransformer::default();
        let src = "import './b';\nexport * from './c';\nconst lazy = import('./lazy');\nimport a from './a';\nexport { x } from './b';";
        let parsed = transformer.parse(src).unwrap();
        assert_eq!(
            transformer.static_import_specifiers(&parsed),
            vec!["./b", "./c", "./a", "./b"]
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("./a\"b\\c"), r#""./a\"b\\c""#);
    }
}
