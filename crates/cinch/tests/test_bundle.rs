//! Whole-bundle tests over temporary fixture trees
//!
//! Tests that execute bundles need `node` on `PATH` and are skipped without it.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use cinch::{
    code_generator::{BundleEmitter, EmittedModule},
    config::Config,
    dependency_graph::ModuleId,
    error::BuildError,
    orchestrator::BundleOrchestrator,
    resolver::ResolveError,
    runtime,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn run_node(script: &Path) -> String {
    let out = Command::new("node").arg(script).output().unwrap();
    assert!(
        out.status.success(),
        "node failed on {}:\n{}",
        script.display(),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

/// Bundle `main.js` into `out/bundle.cjs` and return the bundle path
fn bundle(dir: &TempDir) -> PathBuf {
    let output = dir.path().join("out/bundle.cjs");
    BundleOrchestrator::new(Config::default())
        .bundle_to_file(&dir.path().join("main.js"), &output)
        .unwrap();
    output
}

const ROUND_TRIP: &[(&str, &str)] = &[
    ("package.json", r#"{ "type": "module" }"#),
    (
        "main.js",
        r#"import greet, { punctuation as mark } from "./lib/greet.js";
import * as shapes from "./shapes/index.js";
import { pong } from "./cycle/a.js";
import { shared as first } from "./users/first.js";
import { shared as second } from "./users/second.js";
import "./side.js";

const area = shapes.square(3) + shapes.circleArea(1);
console.log(JSON.stringify({
  greeting: greet("bundle") + mark,
  area: Math.round(area * 100) / 100,
  names: Object.keys(shapes).sort(),
  cycle: pong(3),
  singleton: first === second,
  loads: globalThis.sharedLoads,
  side: globalThis.sideEffect,
}));
"#,
    ),
    (
        "lib/greet.js",
        "export const punctuation = \"!\";\nexport default function greet(name) {\n  return `hello ${name}`;\n}\n",
    ),
    (
        "shapes/index.js",
        "export * from \"./square.js\";\nexport { area as circleArea } from \"./circle.js\";\n",
    ),
    ("shapes/square.js", "export function square(n) { return n * n; }\nexport default 'ignored by star';\n"),
    ("shapes/circle.js", "export const area = (r) => Math.PI * r * r;\n"),
    (
        "cycle/a.js",
        "import { ping } from \"./b.js\";\nexport function pong(n) { return n <= 0 ? \"pong\" : ping(n - 1); }\n",
    ),
    (
        "cycle/b.js",
        "import { pong } from \"./a.js\";\nexport function ping(n) { return n <= 0 ? \"ping\" : pong(n - 1); }\n",
    ),
    (
        "users/shared.js",
        "globalThis.sharedLoads = (globalThis.sharedLoads || 0) + 1;\nexport const shared = {};\n",
    ),
    ("users/first.js", "export { shared } from \"./shared.js\";\n"),
    ("users/second.js", "import { shared } from \"../users/./shared.js\";\nexport { shared };\n"),
    ("side.js", "globalThis.sideEffect = \"ran\";\n"),
];

#[test]
fn test_graph_shape() {
    let dir = fixture(ROUND_TRIP);
    let graph = BundleOrchestrator::default()
        .build_graph(&dir.path().join("main.js"))
        .unwrap();

    // every .js file except package.json is reachable exactly once
    assert_eq!(graph.len(), ROUND_TRIP.len() - 1);
    assert_eq!(graph.entry().unwrap().id, ModuleId::ENTRY);
    assert_eq!(graph.verify_closed(), None);
    assert_eq!(graph.find_cycles().len(), 1);

    let shared = fs::canonicalize(dir.path().join("users/shared.js")).unwrap();
    let shared_id = graph.id_of(&shared).unwrap();
    for user in ["users/first.js", "users/second.js"] {
        let record = graph
            .get(&fs::canonicalize(dir.path().join(user)).unwrap())
            .unwrap();
        let ids = graph.specifier_ids(record).unwrap();
        assert_eq!(ids.values().copied().collect::<Vec<_>>(), vec![shared_id]);
    }
}

#[test]
fn test_bundle_matches_unbundled_output() {
    if !node_available() {
        return;
    }
    let dir = fixture(ROUND_TRIP);
    let expected = run_node(&dir.path().join("main.js"));
    let actual = run_node(&bundle(&dir));
    assert_eq!(actual, expected);
    assert!(actual.contains(r#""cycle":"ping""#));
    assert!(actual.contains(r#""singleton":true,"loads":1"#));
}

#[test]
fn test_commonjs_modules_pass_through() {
    if !node_available() {
        return;
    }
    let dir = fixture(&[
        ("main.js", "import counter from './counter.cjs';\ncounter.increment();\ncounter.increment();\nconsole.log(counter.value());\n"),
        ("counter.cjs", "#!/usr/bin/env node\nvar n = 0;\nmodule.exports = { increment: function () { n++; }, value: function () { return n; } };\n"),
    ]);
    assert_eq!(run_node(&bundle(&dir)), "2\n");
}

#[test]
fn test_loader_retries_failed_factories_and_caches_exports() {
    if !node_available() {
        return;
    }
    let module = |id: u32, code: &str, mapping: &[(&str, u32)]| EmittedModule {
        id: ModuleId::new(id),
        code: code.to_owned(),
        mapping: mapping
            .iter()
            .map(|(spec, id)| ((*spec).to_owned(), ModuleId::new(*id)))
            .collect(),
    };
    let table = BundleEmitter::render_table(&[
        module(
            1,
            r#"var attempts = 0;
globalThis.shouldFail = true;
try { require("./flaky"); } catch (e) { attempts++; }
globalThis.shouldFail = false;
var first = require("./flaky");
console.log(attempts, first.ok, first === require("./flaky"), globalThis.runs);
try { require("./nowhere"); } catch (e) { console.log(e.message); }"#,
            &[("./flaky", 2)],
        ),
        module(
            2,
            r#"globalThis.runs = (globalThis.runs || 0) + 1;
if (globalThis.shouldFail) throw new Error("boom");
exports.ok = true;"#,
            &[],
        ),
    ]);

    let dir = TempDir::new().unwrap();
    let script = dir.path().join("loader.cjs");
    fs::write(&script, runtime::wrap(&table, ModuleId::ENTRY)).unwrap();
    assert_eq!(
        run_node(&script),
        "1 true true 2\ncinch: module 1 has no mapping for './nowhere'\n"
    );
}

#[test]
fn test_missing_dependency_writes_nothing() {
    let dir = fixture(&[
        ("main.js", "import './present.js';\n"),
        ("present.js", "import { x } from './missing.js';\n"),
    ]);
    let output = dir.path().join("dist/bundle.js");
    let err = BundleOrchestrator::default()
        .bundle_to_file(&dir.path().join("main.js"), &output)
        .unwrap_err();

    match &err {
        BuildError::Resolution {
            specifier,
            importer,
            source: ResolveError::NotFound { .. },
        } => {
            assert_eq!(specifier, "./missing.js");
            assert!(importer.ends_with("present.js"));
        }
        other => panic!("expected a resolution error, got {other:?}"),
    }
    assert!(!output.exists());
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_transform_errors_carry_module_path() {
    let dir = fixture(&[
        ("main.js", "import './meta.js';\n"),
        ("meta.js", "export const here = import.meta.url;\n"),
    ]);
    let err = BundleOrchestrator::default()
        .bundle_to_string(&dir.path().join("main.js"))
        .unwrap_err();
    assert!(matches!(&err, BuildError::Transform { path, .. } if path.ends_with("meta.js")));
}

#[test]
fn test_bare_specifiers_resolve_through_source_roots() {
    let dir = fixture(&[
        ("app/main.js", "import { util } from 'shared/util';\nconsole.log(util);\n"),
        ("vendor/shared/util.js", "export const util = 'from root';\n"),
    ]);
    let entry = dir.path().join("app/main.js");

    let err = BundleOrchestrator::default().build_graph(&entry).unwrap_err();
    assert!(matches!(
        err,
        BuildError::Resolution {
            source: ResolveError::BareSpecifier(_),
            ..
        }
    ));

    let config = Config {
        src: vec![dir.path().join("vendor")],
        ..Config::default()
    };
    let graph = BundleOrchestrator::new(config).build_graph(&entry).unwrap();
    assert_eq!(graph.len(), 2);
}

/// Run `main.js` natively as an ES module and bundled, and compare the output
fn assert_bundle_matches_native(files: &[(&str, &str)], expected: &str) {
    if !node_available() {
        return;
    }
    let mut files = files.to_vec();
    files.push(("package.json", r#"{ "type": "module" }"#));
    let dir = fixture(&files);

    assert_eq!(run_node(&dir.path().join("main.js")), expected);
    assert_eq!(run_node(&bundle(&dir)), expected);
}

#[test]
fn test_cycle_partner_reads_named_import_at_use_time() {
    assert_bundle_matches_native(
        &[
            ("main.js", "import { a } from './a.js';\nconsole.log(a);\n"),
            (
                "a.js",
                "import { b } from './b.js';\nexport const a = 'A' + b();\n",
            ),
            (
                "b.js",
                "import { a } from './a.js';\nexport function b() { return 'B'; }\nexport function late() { return a; }\n",
            ),
        ],
        "AB\n",
    );
}

#[test]
fn test_exported_let_is_a_live_binding() {
    assert_bundle_matches_native(
        &[
            (
                "main.js",
                "import { count, inc } from './counter.js';\nimport * as ns from './counter.js';\ninc();\nconst seen = { count };\ninc();\nconsole.log(count, ns.count, seen.count);\n",
            ),
            (
                "counter.js",
                "export let count = 0;\nexport function inc() { count++; }\n",
            ),
        ],
        "2 2 1\n",
    );
}

#[test]
fn test_anonymous_default_function_is_callable_during_a_cycle() {
    assert_bundle_matches_native(
        &[
            ("main.js", "import './a.js';\n"),
            (
                "a.js",
                "import b from './b.js';\nexport default function () { return 'from a'; }\nconsole.log(b);\n",
            ),
            ("b.js", "import a from './a.js';\nexport default a();\n"),
        ],
        "from a\n",
    );
}

#[test]
fn test_cycle_over_mutated_exports() {
    assert_bundle_matches_native(
        &[
            (
                "main.js",
                "import { total, add } from './ledger.js';\nimport { report } from './report.js';\nadd(5);\nconsole.log(report(), total);\n",
            ),
            (
                "ledger.js",
                "import { report } from './report.js';\nexport let total = 1;\nexport const label = 'total';\nexport function add(n) { total += n; return report(); }\nexport default class { }\n",
            ),
            (
                "report.js",
                "import Ledger, { total, label } from './ledger.js';\nexport function report() { return `${label}=${total}:${typeof Ledger}`; }\n",
            ),
        ],
        "total=6:function 6\n",
    );
}

#[test]
fn test_syntax_is_lowered_for_the_target() {
    let dir = fixture(&[
        ("main.js", "import { cube } from './math.js';\nconsole.log(cube(3));\n"),
        ("math.js", "export const cube = (n) => n ** 3;\n"),
    ]);
    let entry = dir.path().join("main.js");

    let lowered = BundleOrchestrator::default().bundle_to_string(&entry).unwrap();
    assert!(lowered.contains("Math.pow(n, 3)"));

    let config = Config {
        target: "esnext".to_owned(),
        ..Config::default()
    };
    let modern = BundleOrchestrator::new(config).bundle_to_string(&entry).unwrap();
    assert!(modern.contains("n ** 3"));
}

#[test]
fn test_jsx_is_a_syntax_error() {
    let dir = fixture(&[
        ("main.js", "import { a } from './view.js';\nconsole.log(a);\n"),
        ("view.js", "export const a = <div/>;\n"),
    ]);
    let err = BundleOrchestrator::default()
        .bundle_to_string(&dir.path().join("main.js"))
        .unwrap_err();
    assert!(matches!(&err, BuildError::Syntax { path, .. } if path.ends_with("view.js")));
}
