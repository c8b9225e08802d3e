//! Runtime for the Koko scripting language.
//!
//! Koko values carry per-value dependency provenance: every runtime
//! value records the values it was derived from, and `pfn` pure
//! functions memoize against the dependencies a call actually consumed
//! rather than the full argument values.

pub mod builtins;
pub mod cache;
pub mod env;
pub mod eval;
pub mod graphviz;
pub mod trace;
pub mod value;

pub use cache::PartialCache;
pub use env::{Env, Environment};
pub use eval::{
    eval_program, execute_program, load_program, load_program_from_file, EvalError, EvalResult,
};
pub use value::{Obj, ObjCopy, Object, ObjectKind};
