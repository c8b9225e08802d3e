//! Path-key dependency tracing for function calls.
//!
//! Every call rewrites its arguments into *traceable* form: structurally
//! identical copies whose provenance is replaced by path keys naming the
//! position inside the argument tuple (`2|0|3` addresses `args[2][0][3]`,
//! a trailing `#` addresses the `length` sidecar). The body then computes
//! in path-key space; on return the result is deep-copied with every path
//! key translated back into the metadata of the caller-side sub-value it
//! names. The pure-function cache keys off the same path-key grammar.

use crate::value::{HashPair, Obj, ObjCopy, Object, ObjectKind, TraceSet};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '|';
/// Suffix addressing a container's `length` sidecar.
pub const LENGTH_SUFFIX: char = '#';

/// Rewrite caller-side arguments into traceable copies keyed `0..n`.
pub fn rewrite_args(args: &[Obj]) -> Vec<Obj> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| rewrite(arg, i.to_string()))
        .collect()
}

/// Rewrite one value: arrays descend per element, hashes are marked as a
/// single leaf, everything else is a bare copy carrying its path key.
fn rewrite(obj: &Obj, path: String) -> Obj {
    match &obj.kind {
        ObjectKind::Array(data) => {
            let elements = data
                .elements
                .iter()
                .enumerate()
                .map(|(i, elem)| rewrite(elem, format!("{path}{PATH_SEPARATOR}{i}")))
                .collect();
            let arr = Object::array(elements);
            if let Some(arr_data) = arr.as_array() {
                arr_data.length.insert_trace_key(format!("{path}{LENGTH_SUFFIX}"));
            }
            arr.insert_trace_key(path);
            arr.set_creator_opt(obj.creator_clone());
            arr
        }
        ObjectKind::Hash(data) => {
            // Hash contents are not position-addressable; the whole hash
            // shares one path key.
            let pairs = data
                .pairs
                .iter()
                .map(|(key, pair)| {
                    (
                        *key,
                        HashPair {
                            key: mark_leaf(&pair.key, &path),
                            value: mark_leaf(&pair.value, &path),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>();
            let hash = Object::hash(pairs);
            if let Some(hash_data) = hash.as_hash() {
                hash_data
                    .length
                    .insert_trace_key(format!("{path}{LENGTH_SUFFIX}"));
            }
            hash.insert_trace_key(path);
            hash.set_creator_opt(obj.creator_clone());
            hash
        }
        _ => {
            let copied = obj.copy_without_dependency();
            copied.insert_trace_key(path);
            copied
        }
    }
}

/// Deep copy with every node (and sidecar) carrying the given path key.
fn mark_leaf(obj: &Obj, path: &str) -> Obj {
    match &obj.kind {
        ObjectKind::Array(data) => {
            let elements = data
                .elements
                .iter()
                .map(|elem| mark_leaf(elem, path))
                .collect();
            let arr = Object::array(elements);
            if let Some(arr_data) = arr.as_array() {
                arr_data.length.insert_trace_key(path.to_string());
            }
            arr.insert_trace_key(path.to_string());
            arr
        }
        ObjectKind::Hash(data) => {
            let pairs = data
                .pairs
                .iter()
                .map(|(key, pair)| {
                    (
                        *key,
                        HashPair {
                            key: mark_leaf(&pair.key, path),
                            value: mark_leaf(&pair.value, path),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>();
            let hash = Object::hash(pairs);
            if let Some(hash_data) = hash.as_hash() {
                hash_data.length.insert_trace_key(path.to_string());
            }
            hash.insert_trace_key(path.to_string());
            hash
        }
        _ => {
            let copied = obj.copy_without_dependency();
            copied.insert_trace_key(path.to_string());
            copied
        }
    }
}

/// Resolve a path key against the caller-side argument tuple, returning
/// the addressed sub-value (or its `length` sidecar for `#` keys).
pub fn resolve_path(key: &str, args: &[Obj]) -> Option<Obj> {
    let (body, wants_length) = match key.strip_suffix(LENGTH_SUFFIX) {
        Some(stripped) => (stripped, true),
        None => (key, false),
    };

    let mut segments = body.split(PATH_SEPARATOR);
    let index: usize = segments.next()?.parse().ok()?;
    let mut current = args.get(index)?.clone();

    for segment in segments {
        let elem_index: usize = segment.parse().ok()?;
        // Leaf reached before the path ran out: the remaining segments
        // addressed structure the caller-side value does not have;
        // depend on the leaf itself.
        let next = match &current.kind {
            ObjectKind::Array(data) => data.elements.get(elem_index)?.clone(),
            _ => break,
        };
        current = next;
    }

    if wants_length {
        if let Some(data) = current.as_array() {
            return Some(data.length.clone());
        }
        if let Some(data) = current.as_hash() {
            return Some(data.length.clone());
        }
    }
    Some(current)
}

/// Deep-copy a call result, translating every path key into the metadata
/// of the caller-side sub-value it addresses. The copy also gains edge
/// dependencies on those sub-values, keeping the object graph connected
/// across the call boundary.
pub fn translate_result(res: &Obj, args: &[Obj]) -> Obj {
    match &res.kind {
        ObjectKind::Array(data) => {
            let elements = data
                .elements
                .iter()
                .map(|elem| translate_result(elem, args))
                .collect();
            let arr = Object::array(elements);
            apply_translation(&arr, res, args);
            if let Some(arr_data) = arr.as_array() {
                translate_metadata_onto(&arr_data.length, &data.length, args);
                translate_metadata_onto(&arr_data.offset, &data.offset, args);
            }
            arr
        }
        ObjectKind::Hash(data) => {
            let pairs = data
                .pairs
                .iter()
                .map(|(key, pair)| {
                    (
                        *key,
                        HashPair {
                            key: translate_result(&pair.key, args),
                            value: translate_result(&pair.value, args),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>();
            let hash = Object::hash(pairs);
            apply_translation(&hash, res, args);
            if let Some(hash_data) = hash.as_hash() {
                translate_metadata_onto(&hash_data.length, &data.length, args);
                translate_metadata_onto(&hash_data.offset, &data.offset, args);
            }
            hash
        }
        _ => {
            let copied = res.copy_without_dependency();
            apply_translation(&copied, res, args);
            copied
        }
    }
}

/// Give `target` the translation of `source`'s trace, an edge back to
/// `source`, and `source`'s creator annotation.
fn apply_translation(target: &Obj, source: &Obj, args: &[Obj]) {
    target.add_dep(source);
    target.set_creator_opt(source.creator_clone());
    translate_metadata_onto(target, source, args);
}

fn translate_metadata_onto(target: &Obj, source: &Obj, args: &[Obj]) {
    let mut translated = TraceSet::default();
    for key in source.trace().iter() {
        match resolve_path(key, args) {
            Some(resolved) => {
                for k in resolved.trace().iter() {
                    translated.insert(k.clone());
                }
                target.add_dep(&resolved);
            }
            None => {
                debug!(%key, "dropping unresolvable path key during translation");
            }
        }
    }
    target.merge_trace(&translated);
}

/// Union of every path key reachable in a value tree: the value's own
/// trace, its sidecars', and its elements' (recursively).
pub fn collect_trace(obj: &Obj) -> TraceSet {
    let mut out = TraceSet::default();
    collect_into(obj, &mut out);
    out
}

fn collect_into(obj: &Obj, out: &mut TraceSet) {
    out.extend(obj.trace().iter().cloned());
    match &obj.kind {
        ObjectKind::Array(data) => {
            out.extend(data.length.trace().iter().cloned());
            out.extend(data.offset.trace().iter().cloned());
            for elem in &data.elements {
                collect_into(elem, out);
            }
        }
        ObjectKind::Hash(data) => {
            out.extend(data.length.trace().iter().cloned());
            out.extend(data.offset.trace().iter().cloned());
            for pair in data.pairs.values() {
                collect_into(&pair.key, out);
                collect_into(&pair.value, out);
            }
        }
        ObjectKind::Return(inner) => collect_into(inner, out),
        _ => {}
    }
}

/// Render the full path-key -> value-string map for a traceable argument
/// tuple; this is what pure-function cache lines match against.
pub fn fingerprint_args(args: &[Obj]) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for (i, arg) in args.iter().enumerate() {
        add_fingerprints(arg, i.to_string(), &mut map);
    }
    map
}

fn add_fingerprints(obj: &Obj, path: String, map: &mut FxHashMap<String, String>) {
    match &obj.kind {
        ObjectKind::Array(data) => {
            map.insert(
                format!("{path}{LENGTH_SUFFIX}"),
                data.length.inspect(),
            );
            for (i, elem) in data.elements.iter().enumerate() {
                add_fingerprints(elem, format!("{path}{PATH_SEPARATOR}{i}"), map);
            }
            map.insert(path, obj.inspect());
        }
        ObjectKind::Hash(data) => {
            map.insert(
                format!("{path}{LENGTH_SUFFIX}"),
                data.length.inspect(),
            );
            map.insert(path, obj.inspect());
        }
        _ => {
            map.insert(path, obj.inspect());
        }
    }
}
