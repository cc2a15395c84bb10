//! Shared type definitions for the cinch crate
//!
//! Collections used across the resolver, registry, graph and emitter. The
//! `IndexMap`-based aliases keep insertion order, which is what makes module
//! ids and emitted output deterministic.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

/// Insertion-ordered map with the fast non-cryptographic Fx hasher
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Insertion-ordered set with the fast non-cryptographic Fx hasher
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;
