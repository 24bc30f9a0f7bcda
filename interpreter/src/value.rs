use std::cell::RefCell;
use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::Stmt;
use crate::env::Environment;
use crate::interpreter::Interpreter;

/// One storage slot. Environments, array elements and hash pairs all
/// hold their values behind a cell so References can alias them.
pub(crate) type ValueCell = Rc<RefCell<Value>>;

pub(crate) fn cell(value: Value) -> ValueCell {
    Rc::new(RefCell::new(value.settle()))
}

// Inspect stops descending at this depth so self-referential arrays and
// hashes render instead of recursing forever.
const INSPECT_DEPTH: usize = 8;

#[derive(Clone)]
pub(crate) enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Character(char),
    Str(Rc<String>),
    Void,
    Array(Rc<RefCell<ArrayData>>),
    Hash(Rc<RefCell<HashData>>),
    Function(Rc<Function>),
    Underline(Rc<Underline>),
    Native(Rc<Native>),
    Reference(Reference),
    // control-flow carriers, never user-visible
    Ret(Box<Value>),
    Out(Box<Value>),
    Jump,
    Err(String),
}

#[derive(Debug)]
pub(crate) struct ArrayData {
    pub(crate) elements: Vec<ValueCell>,
    // one-shot fresh-rvalue marker: a marked array is moved by `let`
    // and `=` instead of deep-copied
    pub(crate) xvalue: bool,
}

pub(crate) struct HashData {
    pub(crate) pairs: AHashMap<HashKey, HashPair>,
    pub(crate) xvalue: bool,
}

#[derive(Clone)]
pub(crate) struct HashPair {
    pub(crate) key: Value,
    pub(crate) cell: ValueCell,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HashKey {
    Integer(i64),
    Boolean(bool),
    Character(char),
    Str(String),
    Void,
}

pub(crate) struct Function {
    pub(crate) parameters: Vec<String>,
    pub(crate) body: Rc<Vec<Stmt>>,
    pub(crate) env: Rc<RefCell<Environment>>,
    // receiver hash, stamped when the function is unwrapped out of a
    // hash-origin Reference; feeds the implicit trailing `self` formal
    pub(crate) receiver: Option<Value>,
}

impl Function {
    pub(crate) fn with_receiver(&self, receiver: Value) -> Function {
        Function {
            parameters: self.parameters.clone(),
            body: Rc::clone(&self.body),
            env: Rc::clone(&self.env),
            receiver: Some(receiver),
        }
    }
}

pub(crate) struct Underline {
    pub(crate) body: Rc<Vec<Stmt>>,
    pub(crate) env: Rc<RefCell<Environment>>,
}

pub(crate) type NativeFn =
    fn(&mut Interpreter, &Rc<RefCell<Environment>>, &[Value]) -> Value;

pub(crate) struct Native {
    pub(crate) name: &'static str,
    pub(crate) func: NativeFn,
}

/// The language's lvalue: a handle to a storage cell plus, when the
/// slot lives in an Allocable (Environment or Hash), the origin and
/// index needed to allocate or delete it. `cell: None` marks an
/// unallocated reference that materializes on first write.
#[derive(Clone)]
pub(crate) struct Reference {
    pub(crate) cell: Option<ValueCell>,
    pub(crate) origin: Option<Origin>,
    pub(crate) index: Option<Box<Value>>,
    pub(crate) is_const: bool,
}

#[derive(Clone)]
pub(crate) enum Origin {
    Env(Rc<RefCell<Environment>>),
    Hash(Rc<RefCell<HashData>>),
}

impl Reference {
    pub(crate) fn to_cell(cell: ValueCell) -> Reference {
        Reference {
            cell: Some(cell),
            origin: None,
            index: None,
            is_const: false,
        }
    }

    pub(crate) fn const_to(value: Value) -> Reference {
        Reference {
            cell: Some(cell(value)),
            origin: None,
            index: None,
            is_const: true,
        }
    }

    pub(crate) fn unallocated_const() -> Reference {
        Reference {
            cell: None,
            origin: None,
            index: None,
            is_const: true,
        }
    }
}

impl HashData {
    pub(crate) fn new() -> HashData {
        HashData {
            pairs: AHashMap::new(),
            xvalue: false,
        }
    }

    pub(crate) fn get(&self, key: &HashKey) -> Option<HashPair> {
        self.pairs.get(key).cloned()
    }

    pub(crate) fn alloc(&mut self, key: &Value) -> Option<ValueCell> {
        let hk = key.hash_key()?;
        if self.pairs.contains_key(&hk) {
            return None;
        }
        let slot = cell(Value::Void);
        self.pairs.insert(
            hk,
            HashPair {
                key: key.clone(),
                cell: Rc::clone(&slot),
            },
        );
        Some(slot)
    }

    pub(crate) fn free(&mut self, key: &Value) -> bool {
        match key.hash_key() {
            Some(hk) => self.pairs.remove(&hk).is_some(),
            None => false,
        }
    }
}

impl Value {
    pub(crate) fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub(crate) fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(ArrayData {
            elements: elements.into_iter().map(cell).collect(),
            xvalue: true,
        })))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Boolean",
            Value::Character(_) => "Character",
            Value::Str(_) => "String",
            Value::Void => "Void",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Function(_) => "Function",
            Value::Underline(_) => "Underline",
            Value::Native(_) => "Native",
            Value::Reference(_) => "Reference",
            Value::Ret(_) => "Ret",
            Value::Out(_) => "Out",
            Value::Jump => "Jump",
            Value::Err(_) => "Err",
        }
    }

    pub(crate) fn is_error(&self) -> bool {
        matches!(self, Value::Err(_))
    }

    pub(crate) fn is_skip(&self) -> bool {
        matches!(self, Value::Ret(_) | Value::Out(_) | Value::Jump)
    }

    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(v) => *v != 0,
            Value::Float(v) => *v != 0.0 && !v.is_nan(),
            Value::Boolean(v) => *v,
            _ => false,
        }
    }

    /// Dereferences to the stored rvalue. Unwrapping a Reference whose
    /// origin is a Hash stamps a Function's receiver with that hash, so
    /// `h.method` carries its `self` without mutating the shared
    /// definition.
    pub(crate) fn unwrapped(self) -> Value {
        let mut value = self;
        loop {
            match value {
                Value::Reference(r) => {
                    let inner = match &r.cell {
                        Some(cell) => cell.borrow().clone(),
                        None => Value::Void,
                    };
                    value = match (&inner, &r.origin) {
                        (Value::Function(f), Some(Origin::Hash(h))) => Value::Function(
                            Rc::new(f.with_receiver(Value::Hash(Rc::clone(h)))),
                        ),
                        _ => inner,
                    };
                }
                other => return other,
            }
        }
    }

    pub(crate) fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(v) => Some(HashKey::Integer(*v)),
            Value::Boolean(v) => Some(HashKey::Boolean(*v)),
            Value::Character(v) => Some(HashKey::Character(*v)),
            Value::Str(v) => Some(HashKey::Str(v.as_ref().clone())),
            Value::Void => Some(HashKey::Void),
            _ => None,
        }
    }

    /// String or Character content as a character sequence; infix `+`,
    /// `==` and `!=` coerce the two letter types through this view.
    pub(crate) fn letters(&self) -> Option<String> {
        match self {
            Value::Str(v) => Some(v.as_ref().clone()),
            Value::Character(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Deep copy. Arrays and hashes get fresh cells; the seen map keeps
    /// self-referential graphs isomorphic instead of recursing forever.
    /// References keep their identity, shared function values their Rc.
    pub(crate) fn copy(&self) -> Value {
        let mut seen: AHashMap<usize, Value> = AHashMap::new();
        self.copy_seen(&mut seen)
    }

    fn copy_seen(&self, seen: &mut AHashMap<usize, Value>) -> Value {
        match self {
            Value::Array(data) => {
                let addr = Rc::as_ptr(data) as usize;
                if let Some(copied) = seen.get(&addr) {
                    return copied.clone();
                }
                let fresh = Rc::new(RefCell::new(ArrayData {
                    elements: Vec::new(),
                    xvalue: false,
                }));
                seen.insert(addr, Value::Array(Rc::clone(&fresh)));
                let elements: Vec<ValueCell> = data
                    .borrow()
                    .elements
                    .iter()
                    .map(|slot| cell(slot.borrow().copy_seen(seen)))
                    .collect();
                fresh.borrow_mut().elements = elements;
                Value::Array(fresh)
            }
            Value::Hash(data) => {
                let addr = Rc::as_ptr(data) as usize;
                if let Some(copied) = seen.get(&addr) {
                    return copied.clone();
                }
                let fresh = Rc::new(RefCell::new(HashData::new()));
                seen.insert(addr, Value::Hash(Rc::clone(&fresh)));
                let pairs: Vec<(HashKey, HashPair)> = data
                    .borrow()
                    .pairs
                    .iter()
                    .map(|(hk, pair)| {
                        (
                            hk.clone(),
                            HashPair {
                                key: pair.key.clone(),
                                cell: cell(pair.cell.borrow().copy_seen(seen)),
                            },
                        )
                    })
                    .collect();
                fresh.borrow_mut().pairs = pairs.into_iter().collect();
                Value::Hash(fresh)
            }
            other => other.clone(),
        }
    }

    /// Consumes an rvalue for storage: a fresh (xvalue) array or hash
    /// is moved with the mark cleared, anything else is deep-copied.
    pub(crate) fn consume(self) -> Value {
        match &self {
            Value::Array(data) => {
                if data.borrow().xvalue {
                    data.borrow_mut().xvalue = false;
                    return self;
                }
            }
            Value::Hash(data) => {
                if data.borrow().xvalue {
                    data.borrow_mut().xvalue = false;
                    return self;
                }
            }
            _ => {}
        }
        self.copy()
    }

    /// Clears the one-shot mark without moving or copying. Applied at
    /// every storage boundary: once a fresh value lands in a cell it is
    /// owned, and a later `let` from that slot must copy.
    pub(crate) fn settle(self) -> Value {
        match &self {
            Value::Array(data) => {
                if data.borrow().xvalue {
                    data.borrow_mut().xvalue = false;
                }
            }
            Value::Hash(data) => {
                if data.borrow().xvalue {
                    data.borrow_mut().xvalue = false;
                }
            }
            _ => {}
        }
        self
    }

    pub(crate) fn inspect(&self) -> String {
        self.inspect_at(0)
    }

    fn inspect_at(&self, depth: usize) -> String {
        if depth > INSPECT_DEPTH {
            return "...".to_string();
        }
        match self {
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Boolean(v) => v.to_string(),
            Value::Character(v) => format!("'{}'", v),
            Value::Str(v) => format!("\"{}\"", v),
            Value::Void => "void".to_string(),
            Value::Array(data) => {
                let elements: Vec<String> = data
                    .borrow()
                    .elements
                    .iter()
                    .map(|slot| slot.borrow().inspect_at(depth + 1))
                    .collect();
                format!("[{}]", elements.join(", "))
            }
            Value::Hash(data) => {
                let mut pairs: Vec<(String, String)> = data
                    .borrow()
                    .pairs
                    .values()
                    .map(|pair| {
                        (
                            pair.key.inspect_at(depth + 1),
                            pair.cell.borrow().inspect_at(depth + 1),
                        )
                    })
                    .collect();
                // hash iteration order is arbitrary; render sorted so
                // output is stable for the REPL and tests
                pairs.sort();
                let rendered: Vec<String> = pairs
                    .into_iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Function(f) => {
                let mut out = format!("func({}) {{ ", f.parameters.join(", "));
                for stmt in f.body.iter() {
                    out.push_str(&stmt.to_string());
                    out.push(' ');
                }
                out.push('}');
                out
            }
            Value::Underline(_) => "_ {...}".to_string(),
            Value::Native(_) => "func [Native]".to_string(),
            Value::Reference(r) => match &r.cell {
                Some(cell) => {
                    format!("Reference: {}", cell.borrow().inspect_at(depth + 1))
                }
                None => "Reference: void".to_string(),
            },
            Value::Ret(v) => v.inspect_at(depth),
            Value::Out(v) => v.inspect_at(depth),
            Value::Jump => "jump".to_string(),
            Value::Err(msg) => format!("ERROR: {}", msg),
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

// The `string()` coercion view: strings verbatim, characters as a
// single-codepoint string, everything else via inspect. Hash `@string`
// dispatch happens in the native before falling back here.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(v) => write!(f, "{}", v),
            Value::Character(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.inspect()),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

impl Debug for HashData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Hash {} pairs>", self.pairs.len())
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Function/{}>", self.parameters.len())
    }
}

impl Debug for Underline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Underline>")
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Native {}>", self.name)
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Reference const={} allocated={}>",
            self.is_const,
            self.cell.is_some()
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Underline(a), Value::Underline(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Err(a), Value::Err(b)) => a == b,
            (Value::Jump, Value::Jump) => true,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Character(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{cell, Reference, Value};

    #[test]
    fn test_truthiness() {
        let tests = [
            (Value::from(5), true),
            (Value::from(0), false),
            (Value::from(0.5), true),
            (Value::from(0.0), false),
            (Value::from(f64::NAN), false),
            (Value::from(true), true),
            (Value::from(false), false),
            (Value::from("hello"), false),
            (Value::Void, false),
            (Value::array(vec![]), false),
        ];
        for (value, expected) in tests {
            assert_eq!(value.is_truthy(), expected, "{:?}", value);
        }
    }

    #[test]
    fn test_copy_is_deep_for_arrays() {
        let original = Value::array(vec![Value::from(1), Value::from(2)]);
        let copied = original.copy();

        if let (Value::Array(a), Value::Array(b)) = (&original, &copied) {
            *a.borrow().elements[0].borrow_mut() = Value::from(99);
            assert_eq!(*b.borrow().elements[0].borrow(), Value::from(1));
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_copy_tolerates_cycles() {
        let array = Value::array(vec![Value::Void]);
        if let Value::Array(data) = &array {
            *data.borrow().elements[0].borrow_mut() = array.clone();
        }
        let copied = array.copy();
        if let Value::Array(data) = &copied {
            let inner = data.borrow().elements[0].borrow().clone();
            assert_eq!(inner, copied, "copy preserves the self-edge");
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn test_xvalue_moves_once() {
        let fresh = Value::array(vec![Value::from(1)]);
        let stored = fresh.clone().consume();
        // first consumption moves the allocation
        assert_eq!(stored, fresh);
        // the mark is cleared, so the next consumption copies
        let again = stored.clone().consume();
        assert_ne!(again, stored);
    }

    #[test]
    fn test_unwrap_reference() {
        let slot = cell(Value::from(42));
        let reference = Value::Reference(Reference::to_cell(slot));
        assert_eq!(reference.unwrapped(), Value::from(42));

        let vacant = Value::Reference(Reference::unallocated_const());
        assert_eq!(vacant.unwrapped(), Value::Void);
    }

    #[test]
    fn test_inspect() {
        let tests = [
            (Value::from(5), "5"),
            (Value::from(0.5), "0.5"),
            (Value::from(5.0), "5.0"),
            (Value::from(true), "true"),
            (Value::from('x'), "'x'"),
            (Value::from("hi"), "\"hi\""),
            (Value::Void, "void"),
            (
                Value::array(vec![Value::from(1), Value::from("a")]),
                "[1, \"a\"]",
            ),
            (Value::Err("boom".to_string()), "ERROR: boom"),
        ];
        for (value, expected) in tests {
            assert_eq!(value.inspect(), expected);
        }
    }

    #[test]
    fn test_inspect_bounds_cyclic_structures() {
        let array = Value::array(vec![Value::Void]);
        if let Value::Array(data) = &array {
            *data.borrow().elements[0].borrow_mut() = array.clone();
        }
        let rendered = array.inspect();
        assert!(rendered.contains("..."));
    }

    #[test]
    fn test_hash_keys() {
        assert!(Value::from(1).hash_key().is_some());
        assert!(Value::from(true).hash_key().is_some());
        assert!(Value::from('c').hash_key().is_some());
        assert!(Value::from("k").hash_key().is_some());
        assert!(Value::Void.hash_key().is_some());
        assert!(Value::from(1.5).hash_key().is_none());
        assert!(Value::array(vec![]).hash_key().is_none());
    }
}
