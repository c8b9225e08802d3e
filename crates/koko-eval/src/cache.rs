//! Dependency-aware memo table for pure functions.
//!
//! A cache line records only the path keys the memoized result actually
//! depended on, each with the string rendering of the value at that path.
//! A line hits when every recorded key renders identically in the current
//! call; path keys the line never depended on are ignored, so a call with
//! a different irrelevant tail still reuses the cached result.
//!
//! Lookup is a linear scan over lines. A trie keyed by path would be
//! faster; the scan keeps the structure obvious.

use crate::value::{Obj, TraceSet};
use rustc_hash::FxHashMap;
use tracing::debug;

/// One memoized result with its dependency projection.
pub struct CacheLine {
    projected: FxHashMap<String, String>,
    value: Obj,
}

impl CacheLine {
    /// The path keys this line is keyed on, with their renderings.
    pub fn projected(&self) -> &FxHashMap<String, String> {
        &self.projected
    }
}

/// Memo table of a single pure function.
#[derive(Default)]
pub struct PartialCache {
    lines: Vec<CacheLine>,
}

impl PartialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// Find a line whose every projected key matches the current call's
    /// rendering map.
    pub fn get(&self, current: &FxHashMap<String, String>) -> Option<Obj> {
        self.lines
            .iter()
            .find(|line| {
                line.projected
                    .iter()
                    .all(|(key, rendered)| current.get(key) == Some(rendered))
            })
            .map(|line| line.value.clone())
    }

    /// Record a result keyed by the path keys it depends on.
    pub fn set(&mut self, current: &FxHashMap<String, String>, deps: &TraceSet, value: Obj) {
        let projected: FxHashMap<String, String> = deps
            .iter()
            .filter_map(|key| {
                current
                    .get(key)
                    .map(|rendered| (key.clone(), rendered.clone()))
            })
            .collect();
        debug!(keys = projected.len(), "caching pure function result");
        self.lines.push(CacheLine { projected, value });
    }
}
