//! Runtime values for Koko.
//!
//! Every value carries two layers of provenance metadata alongside its
//! payload: a set of *edge* dependencies (handles to the values it was
//! derived from, used by the graph export) and a *trace* set of path keys
//! (the currency of the call rewrite and the pure-function cache). Values
//! live behind [`Rc`] so edge identity is pointer identity; metadata cells
//! use [`RefCell`] since evaluation is single-threaded.

use crate::cache::PartialCache;
use crate::env::Env;
use koko_syntax::{Block, Ident, Span};
use rustc_hash::FxHashSet;
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// A shared handle to a runtime value.
pub type Obj = Rc<Object>;

/// The set of path keys a value's content was derived from.
pub type TraceSet = FxHashSet<String>;

pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit hash, used to fingerprint string hash keys.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
        })
}

/// A rendered snapshot of the AST node that produced a value.
///
/// The graph export only needs the node's source text and position, so
/// values hold this snapshot instead of a pointer into the AST. Values
/// minted by built-ins carry no creator and are skipped by the export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Creator {
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Creator {
    pub fn new(text: impl Into<String>, span: Span) -> Self {
        Self {
            text: text.into(),
            line: span.line,
            column: span.column,
        }
    }
}

/// A runtime value: payload plus provenance metadata.
pub struct Object {
    pub kind: ObjectKind,
    deps: RefCell<DepSet>,
    trace: RefCell<TraceSet>,
    creator: RefCell<Option<Creator>>,
}

/// The payload of a runtime value.
pub enum ObjectKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(ArrayData),
    Hash(HashData),
    /// Early-return marker bubbling up block evaluation. Never escapes a
    /// function-call boundary.
    Return(Obj),
    /// A runtime failure, surfaced only as the program's final result.
    Error(String),
    Function(FunctionData),
    PureFunction(PureFunctionData),
    Builtin(&'static crate::builtins::Builtin),
    /// Opaque capsule surfacing a call's path-key dependency set to test
    /// code via the `deps` built-in.
    DebugTrace(BTreeSet<String>),
}

/// Array payload: elements plus the `length` and `offset` sidecar Ints.
pub struct ArrayData {
    pub elements: Vec<Obj>,
    pub length: Obj,
    pub offset: Obj,
}

/// Hash payload: pairs keyed by fingerprint plus the sidecar Ints.
pub struct HashData {
    pub pairs: BTreeMap<HashKey, HashPair>,
    pub length: Obj,
    pub offset: Obj,
}

/// An entry in a hash: the original key value and the stored value.
#[derive(Clone)]
pub struct HashPair {
    pub key: Obj,
    pub value: Obj,
}

/// An impure closure: parameters, body, captured environment.
pub struct FunctionData {
    pub params: Rc<Vec<Ident>>,
    pub body: Rc<Block>,
    pub env: Env,
}

/// A memoized pure function. The cache is shared across copies.
pub struct PureFunctionData {
    pub params: Rc<Vec<Ident>>,
    pub body: Rc<Block>,
    pub env: Env,
    pub cache: Rc<RefCell<PartialCache>>,
}

/// Variant tag plus numeric fingerprint; only Bool/Int/Float/Str values
/// are usable as hash keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey {
    pub tag: HashTag,
    pub fingerprint: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashTag {
    Bool,
    Int,
    Float,
    Str,
}

/// An identity-keyed set of dependency edges.
#[derive(Default)]
pub struct DepSet {
    items: Vec<Obj>,
}

impl DepSet {
    pub fn insert(&mut self, dep: &Obj) {
        if !self.items.iter().any(|o| Rc::ptr_eq(o, dep)) {
            self.items.push(dep.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obj> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, dep: &Obj) -> bool {
        self.items.iter().any(|o| Rc::ptr_eq(o, dep))
    }
}

impl Object {
    fn make(kind: ObjectKind) -> Obj {
        Rc::new(Object {
            kind,
            deps: RefCell::new(DepSet::default()),
            trace: RefCell::new(TraceSet::default()),
            creator: RefCell::new(None),
        })
    }

    pub fn nil() -> Obj {
        Self::make(ObjectKind::Nil)
    }

    pub fn bool_val(value: bool) -> Obj {
        Self::make(ObjectKind::Bool(value))
    }

    pub fn int(value: i64) -> Obj {
        Self::make(ObjectKind::Int(value))
    }

    pub fn float(value: f64) -> Obj {
        Self::make(ObjectKind::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Obj {
        Self::make(ObjectKind::Str(value.into()))
    }

    pub fn error(message: impl Into<String>) -> Obj {
        Self::make(ObjectKind::Error(message.into()))
    }

    pub fn return_value(value: Obj) -> Obj {
        let wrapper = Self::make(ObjectKind::Return(value.clone()));
        wrapper.set_trace(value.trace_clone());
        wrapper.add_dep(&value);
        wrapper
    }

    pub fn builtin(builtin: &'static crate::builtins::Builtin) -> Obj {
        Self::make(ObjectKind::Builtin(builtin))
    }

    pub fn debug_trace(keys: BTreeSet<String>) -> Obj {
        Self::make(ObjectKind::DebugTrace(keys))
    }

    /// Build an array value: fresh `length`/`offset` sidecars, edge
    /// dependencies on every element.
    pub fn array(elements: Vec<Obj>) -> Obj {
        let length = Self::int(elements.len() as i64);
        let offset = Self::int(0);
        let arr = Self::make(ObjectKind::Array(ArrayData {
            elements,
            length,
            offset,
        }));
        if let ObjectKind::Array(data) = &arr.kind {
            for elem in &data.elements {
                arr.add_dep(elem);
            }
        }
        arr
    }

    /// Build a hash value: fresh sidecars, edge dependencies on every
    /// key and value.
    pub fn hash(pairs: BTreeMap<HashKey, HashPair>) -> Obj {
        let length = Self::int(pairs.len() as i64);
        let offset = Self::int(0);
        let hash = Self::make(ObjectKind::Hash(HashData {
            pairs,
            length,
            offset,
        }));
        if let ObjectKind::Hash(data) = &hash.kind {
            for pair in data.pairs.values() {
                hash.add_dep(&pair.key);
                hash.add_dep(&pair.value);
            }
        }
        hash
    }

    pub fn function(params: Rc<Vec<Ident>>, body: Rc<Block>, env: Env) -> Obj {
        Self::make(ObjectKind::Function(FunctionData { params, body, env }))
    }

    pub fn pure_function(params: Rc<Vec<Ident>>, body: Rc<Block>, env: Env) -> Obj {
        Self::make(ObjectKind::PureFunction(PureFunctionData {
            params,
            body,
            env,
            cache: Rc::new(RefCell::new(PartialCache::new())),
        }))
    }

    /// Return a human-readable type name for error messages and `type`.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Nil => "NIL",
            ObjectKind::Bool(_) => "BOOLEAN",
            ObjectKind::Int(_) => "INTEGER",
            ObjectKind::Float(_) => "FLOAT",
            ObjectKind::Str(_) => "STRING",
            ObjectKind::Array(_) => "ARRAY",
            ObjectKind::Hash(_) => "HASH",
            ObjectKind::Return(_) => "RETURN",
            ObjectKind::Error(_) => "ERROR",
            ObjectKind::Function(_) | ObjectKind::PureFunction(_) => "FUNCTION",
            ObjectKind::Builtin(_) => "BUILTIN",
            ObjectKind::DebugTrace(_) => "DEBUG_TRACE",
        }
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match &self.kind {
            ObjectKind::Array(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashData> {
        match &self.kind {
            ObjectKind::Hash(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match &self.kind {
            ObjectKind::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness is content equality against the empty prototype of the
    /// variant: false, nil, `0`, `0.0`, `""`, `[]` and `{}` are falsy.
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            ObjectKind::Nil => false,
            ObjectKind::Bool(b) => *b,
            ObjectKind::Int(n) => *n != 0,
            ObjectKind::Float(x) => *x != 0.0,
            ObjectKind::Str(s) => !s.is_empty(),
            ObjectKind::Array(a) => !a.elements.is_empty(),
            ObjectKind::Hash(h) => !h.pairs.is_empty(),
            _ => true,
        }
    }

    /// Value-wise deep equality: same variant tag and same content.
    pub fn equal(&self, other: &Object) -> bool {
        match (&self.kind, &other.kind) {
            (ObjectKind::Nil, ObjectKind::Nil) => true,
            (ObjectKind::Bool(a), ObjectKind::Bool(b)) => a == b,
            (ObjectKind::Int(a), ObjectKind::Int(b)) => a == b,
            (ObjectKind::Float(a), ObjectKind::Float(b)) => a == b,
            (ObjectKind::Str(a), ObjectKind::Str(b)) => a == b,
            (ObjectKind::Error(a), ObjectKind::Error(b)) => a == b,
            (ObjectKind::Return(a), ObjectKind::Return(b)) => a.equal(b),
            (ObjectKind::Array(a), ObjectKind::Array(b)) => {
                a.elements.len() == b.elements.len()
                    && a.elements
                        .iter()
                        .zip(&b.elements)
                        .all(|(x, y)| x.equal(y))
            }
            (ObjectKind::Hash(a), ObjectKind::Hash(b)) => {
                a.pairs.len() == b.pairs.len()
                    && a.pairs.iter().all(|(key, pair)| {
                        b.pairs.get(key).is_some_and(|other_pair| {
                            pair.key.equal(&other_pair.key) && pair.value.equal(&other_pair.value)
                        })
                    })
            }
            // Functions and builtins compare by identity only, which a
            // content-equality check cannot observe.
            _ => false,
        }
    }

    /// Hash key fingerprint; `None` for unhashable variants.
    pub fn hash_key(&self) -> Option<HashKey> {
        match &self.kind {
            ObjectKind::Bool(b) => Some(HashKey {
                tag: HashTag::Bool,
                fingerprint: u64::from(*b),
            }),
            ObjectKind::Int(n) => Some(HashKey {
                tag: HashTag::Int,
                fingerprint: *n as u64,
            }),
            ObjectKind::Float(x) => Some(HashKey {
                tag: HashTag::Float,
                fingerprint: x.to_bits(),
            }),
            ObjectKind::Str(s) => Some(HashKey {
                tag: HashTag::Str,
                fingerprint: fnv1a_64(s.as_bytes()),
            }),
            _ => None,
        }
    }

    // --- metadata cells ---

    pub fn add_dep(&self, dep: &Obj) {
        self.deps.borrow_mut().insert(dep);
    }

    pub fn deps(&self) -> Ref<'_, DepSet> {
        self.deps.borrow()
    }

    /// Edge neighbors for graph walks: recorded dependencies plus the
    /// `length` sidecar of containers.
    pub fn dependency_links(&self) -> Vec<Obj> {
        let mut links: Vec<Obj> = self.deps.borrow().iter().cloned().collect();
        match &self.kind {
            ObjectKind::Array(a) => links.push(a.length.clone()),
            ObjectKind::Hash(h) => links.push(h.length.clone()),
            _ => {}
        }
        links
    }

    pub fn trace_clone(&self) -> TraceSet {
        self.trace.borrow().clone()
    }

    pub fn trace(&self) -> Ref<'_, TraceSet> {
        self.trace.borrow()
    }

    pub fn set_trace(&self, trace: TraceSet) {
        *self.trace.borrow_mut() = trace;
    }

    pub fn insert_trace_key(&self, key: impl Into<String>) {
        self.trace.borrow_mut().insert(key.into());
    }

    pub fn merge_trace(&self, other: &TraceSet) {
        if other.is_empty() {
            return;
        }
        let mut trace = self.trace.borrow_mut();
        for key in other {
            trace.insert(key.clone());
        }
    }

    pub fn creator_clone(&self) -> Option<Creator> {
        self.creator.borrow().clone()
    }

    pub fn set_creator_opt(&self, creator: Option<Creator>) {
        *self.creator.borrow_mut() = creator;
    }

    /// Stamp a creator annotation unless one is already present.
    pub fn stamp_creator(&self, creator: Creator) {
        let mut cell = self.creator.borrow_mut();
        if cell.is_none() {
            *cell = Some(creator);
        }
    }

    /// Render the value the way `string(x)` and program output do.
    pub fn inspect(&self) -> String {
        self.to_string()
    }
}

/// Copy operations live on the shared handle rather than on [`Object`]:
/// a copy records an edge back to the value it was made from, which
/// requires the `Rc` itself.
pub trait ObjCopy {
    /// Content-equal copy whose edge set is `{self}` and whose trace is
    /// inherited. Sidecars of arrays and hashes are themselves copied.
    fn copy(&self) -> Obj;

    /// Content-equal copy with empty provenance metadata.
    fn copy_without_dependency(&self) -> Obj;
}

impl ObjCopy for Obj {
    fn copy(&self) -> Obj {
        let copied = Object::make(copy_kind(self));
        copied.add_dep(self);
        copied.set_trace(self.trace_clone());
        copied.set_creator_opt(self.creator_clone());
        copied
    }

    fn copy_without_dependency(&self) -> Obj {
        let copied = Object::make(copy_kind(self));
        copied.set_creator_opt(self.creator_clone());
        copied
    }
}

fn copy_kind(obj: &Obj) -> ObjectKind {
    match &obj.kind {
        ObjectKind::Nil => ObjectKind::Nil,
        ObjectKind::Bool(b) => ObjectKind::Bool(*b),
        ObjectKind::Int(n) => ObjectKind::Int(*n),
        ObjectKind::Float(x) => ObjectKind::Float(*x),
        ObjectKind::Str(s) => ObjectKind::Str(s.clone()),
        ObjectKind::Array(a) => ObjectKind::Array(ArrayData {
            elements: a.elements.clone(),
            length: a.length.copy(),
            offset: a.offset.copy(),
        }),
        ObjectKind::Hash(h) => ObjectKind::Hash(HashData {
            pairs: h.pairs.clone(),
            length: h.length.copy(),
            offset: h.offset.copy(),
        }),
        ObjectKind::Return(v) => ObjectKind::Return(v.clone()),
        ObjectKind::Error(m) => ObjectKind::Error(m.clone()),
        ObjectKind::Function(f) => ObjectKind::Function(FunctionData {
            params: f.params.clone(),
            body: f.body.clone(),
            env: f.env.clone(),
        }),
        ObjectKind::PureFunction(f) => ObjectKind::PureFunction(PureFunctionData {
            params: f.params.clone(),
            body: f.body.clone(),
            env: f.env.clone(),
            cache: f.cache.clone(),
        }),
        ObjectKind::Builtin(b) => ObjectKind::Builtin(b),
        ObjectKind::DebugTrace(t) => ObjectKind::DebugTrace(t.clone()),
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Nil => write!(f, "nil"),
            ObjectKind::Bool(b) => write!(f, "{}", b),
            ObjectKind::Int(n) => write!(f, "{}", n),
            ObjectKind::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            ObjectKind::Str(s) => write!(f, "{}", s),
            ObjectKind::Array(a) => {
                write!(f, "[")?;
                for (i, elem) in a.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            ObjectKind::Hash(h) => {
                write!(f, "{{")?;
                for (i, pair) in h.pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            ObjectKind::Return(v) => write!(f, "{}", v),
            ObjectKind::Error(message) => write!(f, "ERROR: {}", message),
            ObjectKind::Function(func) => {
                write!(f, "fn({}) {}", join_params(&func.params), func.body)
            }
            ObjectKind::PureFunction(func) => {
                write!(f, "pfn({}) {}", join_params(&func.params), func.body)
            }
            ObjectKind::Builtin(b) => write!(f, "builtin function {}", b.name),
            ObjectKind::DebugTrace(keys) => {
                write!(f, "deps(")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn join_params(params: &[Ident]) -> String {
    params
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.type_name(), self)
    }
}
