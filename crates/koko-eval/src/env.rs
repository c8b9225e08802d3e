//! Lexical environments for Koko.
//!
//! An environment is a frame of name bindings with an optional parent.
//! Closures capture their defining environment by reference, so frames
//! are shared behind `Rc<RefCell<_>>`; a `let f = fn(...) {...}; f(x)`
//! recursion works because the closure sees its own binding appear in
//! the captured frame.

use crate::value::Obj;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A shared handle to an environment frame.
pub type Env = Rc<RefCell<Environment>>;

/// A frame of `name -> value` bindings with a parent link.
pub struct Environment {
    bindings: FxHashMap<String, Obj>,
    parent: Option<Env>,
}

impl Environment {
    /// Create a fresh root environment.
    pub fn root() -> Env {
        Rc::new(RefCell::new(Environment {
            bindings: FxHashMap::default(),
            parent: None,
        }))
    }

    /// Create a child frame whose parent is `parent`.
    pub fn enclosed(parent: &Env) -> Env {
        Rc::new(RefCell::new(Environment {
            bindings: FxHashMap::default(),
            parent: Some(parent.clone()),
        }))
    }

    /// Look up a name, walking parent frames.
    pub fn get(&self, name: &str) -> Option<Obj> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().get(name))
    }

    /// Bind a name in this frame, returning the bound value.
    pub fn set(&mut self, name: impl Into<String>, value: Obj) -> Obj {
        self.bindings.insert(name.into(), value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn get_walks_parents() {
        let root = Environment::root();
        root.borrow_mut().set("x", Object::int(1));
        let child = Environment::enclosed(&root);
        child.borrow_mut().set("y", Object::int(2));

        assert_eq!(child.borrow().get("x").unwrap().as_int(), Some(1));
        assert_eq!(child.borrow().get("y").unwrap().as_int(), Some(2));
        assert!(root.borrow().get("y").is_none());
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let root = Environment::root();
        root.borrow_mut().set("x", Object::int(1));
        let child = Environment::enclosed(&root);
        child.borrow_mut().set("x", Object::int(9));

        assert_eq!(child.borrow().get("x").unwrap().as_int(), Some(9));
        assert_eq!(root.borrow().get("x").unwrap().as_int(), Some(1));
    }

    #[test]
    fn mutations_after_capture_are_visible() {
        let root = Environment::root();
        let captured = root.clone();
        root.borrow_mut().set("f", Object::int(42));
        assert_eq!(captured.borrow().get("f").unwrap().as_int(), Some(42));
    }
}
