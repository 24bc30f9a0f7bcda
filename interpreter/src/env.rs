use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use ahash::AHashMap;

use crate::value::{cell, Value, ValueCell};

/// One frame of the lexical scope chain. Names map to storage cells so
/// a Reference taken into a frame stays valid across later bindings.
pub(crate) struct Environment {
    store: AHashMap<String, ValueCell>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub(crate) fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: AHashMap::new(),
            outer: None,
        }))
    }

    pub(crate) fn enclosed(outer: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: AHashMap::new(),
            outer: Some(Rc::clone(outer)),
        }))
    }

    fn get_local(&self, name: &str) -> Option<ValueCell> {
        self.store.get(name).cloned()
    }

    /// Allocates a fresh Void cell, but only for a String index that is
    /// unbound in this frame (the Allocable contract).
    pub(crate) fn alloc(&mut self, index: &Value) -> Option<ValueCell> {
        let name = match index {
            Value::Str(name) => name.as_ref().clone(),
            _ => return None,
        };
        if self.store.contains_key(&name) {
            return None;
        }
        let slot = cell(Value::Void);
        self.store.insert(name, Rc::clone(&slot));
        Some(slot)
    }

    /// Binds in this frame only; fails when the name is already bound
    /// here (shadowing an outer frame is allowed).
    pub(crate) fn set_current(&mut self, name: &str, value: Value) -> bool {
        match self.alloc(&Value::string(name)) {
            Some(slot) => {
                *slot.borrow_mut() = value.settle();
                true
            }
            None => false,
        }
    }

    fn remove_local(&mut self, name: &str) -> bool {
        self.store.remove(name).is_some()
    }

    fn outer(&self) -> Option<Rc<RefCell<Environment>>> {
        self.outer.clone()
    }
}

/// Walks the chain; returns the cell and the frame that owns it, so the
/// caller can build a Reference with an Environment origin.
pub(crate) fn lookup(
    env: &Rc<RefCell<Environment>>,
    name: &str,
) -> Option<(ValueCell, Rc<RefCell<Environment>>)> {
    let mut current = Rc::clone(env);
    loop {
        let found = current.borrow().get_local(name);
        if let Some(slot) = found {
            return Some((slot, current));
        }
        let outer = current.borrow().outer();
        match outer {
            Some(outer) => current = outer,
            None => return None,
        }
    }
}

/// Removes the binding from the first frame that defines it.
pub(crate) fn free(env: &Rc<RefCell<Environment>>, name: &str) -> bool {
    let mut current = Rc::clone(env);
    loop {
        if current.borrow_mut().remove_local(name) {
            return true;
        }
        let outer = current.borrow().outer();
        match outer {
            Some(outer) => current = outer,
            None => return false,
        }
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Environment {} names{}>",
            self.store.len(),
            if self.outer.is_some() { ", enclosed" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{free, lookup, Environment};
    use crate::value::Value;
    use std::rc::Rc;

    #[test]
    fn test_define_and_get() {
        let env = Environment::new();
        assert!(env.borrow_mut().set_current("foo", Value::from("bar")));
        assert!(env.borrow_mut().set_current("baz", Value::from(false)));

        let (slot, frame) = lookup(&env, "foo").unwrap();
        assert_eq!(*slot.borrow(), Value::from("bar"));
        assert!(Rc::ptr_eq(&frame, &env));
        assert!(lookup(&env, "missing").is_none());
    }

    #[test]
    fn test_rebinding_in_same_frame_fails() {
        let env = Environment::new();
        assert!(env.borrow_mut().set_current("foo", Value::from(1)));
        assert!(!env.borrow_mut().set_current("foo", Value::from(2)));
    }

    #[test]
    fn test_shadowing_and_owner_frame() {
        let outer = Environment::new();
        outer.borrow_mut().set_current("foo", Value::from(1));

        let inner = Environment::enclosed(&outer);
        assert!(inner.borrow_mut().set_current("foo", Value::from(2)));

        let (slot, frame) = lookup(&inner, "foo").unwrap();
        assert_eq!(*slot.borrow(), Value::from(2));
        assert!(Rc::ptr_eq(&frame, &inner));

        let (slot, frame) = lookup(&outer, "foo").unwrap();
        assert_eq!(*slot.borrow(), Value::from(1));
        assert!(Rc::ptr_eq(&frame, &outer));
    }

    #[test]
    fn test_cell_survives_unrelated_bindings() {
        let env = Environment::new();
        env.borrow_mut().set_current("foo", Value::from(1));
        let (slot, _) = lookup(&env, "foo").unwrap();

        for i in 0..32 {
            env.borrow_mut().set_current(&format!("pad{}", i), Value::from(i));
        }
        *slot.borrow_mut() = Value::from(99);

        let (found, _) = lookup(&env, "foo").unwrap();
        assert_eq!(*found.borrow(), Value::from(99));
    }

    #[test]
    fn test_alloc_rejects_non_string_index() {
        let env = Environment::new();
        assert!(env.borrow_mut().alloc(&Value::from(1)).is_none());
        assert!(env.borrow_mut().alloc(&Value::from("x")).is_some());
    }

    #[test]
    fn test_free_walks_chain() {
        let outer = Environment::new();
        outer.borrow_mut().set_current("foo", Value::from(1));
        let inner = Environment::enclosed(&outer);

        assert!(free(&inner, "foo"));
        assert!(lookup(&inner, "foo").is_none());
        assert!(!free(&inner, "foo"));
    }
}
