//! The module loader embedded in every bundle
//!
//! The loader receives the module table as its only argument. Each id moves
//! through three states: uninitialized, initializing and ready. Requiring an
//! id that is initializing hands back the partially filled `module.exports`,
//! which is what lets circular imports terminate. A factory that throws
//! leaves its id uninitialized again, so a later require runs it afresh.

use std::fmt::Write as _;

use crate::dependency_graph::ModuleId;

/// Loader function source up to, not including, the entry call
const LOADER: &str = r#"(function (modules) {
  var UNINITIALIZED = 0;
  var INITIALIZING = 1;
  var READY = 2;
  var states = {};
  var cache = {};

  function require(id) {
    var state = states[id] || UNINITIALIZED;
    if (state !== UNINITIALIZED) {
      return cache[id].exports;
    }

    var entry = modules[id];
    if (!entry) {
      throw new Error("cinch: unknown module id " + id);
    }
    var factory = entry[0];
    var mapping = entry[1];

    function localRequire(specifier) {
      if (!Object.prototype.hasOwnProperty.call(mapping, specifier)) {
        throw new Error("cinch: module " + id + " has no mapping for '" + specifier + "'");
      }
      return require(mapping[specifier]);
    }

    var module = { exports: {} };
    cache[id] = module;
    states[id] = INITIALIZING;
    try {
      factory(localRequire, module, module.exports);
    } catch (error) {
      delete cache[id];
      states[id] = UNINITIALIZED;
      throw error;
    }
    states[id] = READY;
    return module.exports;
  }
"#;

/// Wrap a rendered module table in the loader and start `entry`
pub fn wrap(module_table: &str, entry: ModuleId) -> String {
    let mut out = String::with_capacity(LOADER.len() + module_table.len() + 32);
    out.push_str(LOADER);
    out.push('\n');
    let _ = writeln!(out, "  require({entry});");
    out.push_str("})(");
    out.push_str(module_table);
    out.push_str(");\n");
    out
}
