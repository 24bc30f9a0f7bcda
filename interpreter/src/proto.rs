use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{HashData, HashKey, Origin, Reference, Value};

/// Which part of the `@template` chain a lookup may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flag {
    /// Own pair first, then up the template chain, then the `@[]`
    /// method, then an unallocated reference.
    Default,
    /// Own pairs only; a miss is an unallocated reference so assignment
    /// materializes directly on this hash.
    Current,
    /// Strictly above: skips the receiver's own pairs, and for an
    /// instance also its class template, before walking up.
    Super,
}

pub(crate) enum Lookup {
    Found(Reference),
    /// The `@[]` method, receiver already stamped; the caller invokes
    /// it with the original index list.
    IndexMethod(Value),
    /// Nothing anywhere; writing through this reference creates the
    /// pair on the original hash.
    Vacant(Reference),
    Fail(String),
}

/// "Proto" for a hash naming itself with an `@class` string, "Instance"
/// for one classed only through its `@template` hash, "" otherwise.
pub(crate) fn class_type(hash: &Rc<RefCell<HashData>>) -> &'static str {
    let data = hash.borrow();
    if let Some(pair) = data.get(&HashKey::Str("@class".to_string())) {
        if matches!(&*pair.cell.borrow(), Value::Str(_)) {
            return "Proto";
        }
        return "";
    }
    match template_of_data(&data) {
        Some(_) => "Instance",
        None => "",
    }
}

pub(crate) fn template_of(hash: &Rc<RefCell<HashData>>) -> Option<Rc<RefCell<HashData>>> {
    template_of_data(&hash.borrow())
}

fn template_of_data(data: &HashData) -> Option<Rc<RefCell<HashData>>> {
    let pair = data.get(&HashKey::Str("@template".to_string()))?;
    let template = pair.cell.borrow().clone();
    match template {
        Value::Hash(h) => Some(h),
        _ => None,
    }
}

pub(crate) fn lookup(
    original: &Rc<RefCell<HashData>>,
    key: &Value,
    flag: Flag,
    outer_const: bool,
) -> Lookup {
    let hk = match key.hash_key() {
        Some(hk) => hk,
        None => {
            return Lookup::Fail(format!("unusable as hash key: {}", key.type_name()));
        }
    };

    let found_ref = |cell, is_const| {
        Reference {
            cell: Some(cell),
            origin: Some(Origin::Hash(Rc::clone(original))),
            index: Some(Box::new(key.clone())),
            is_const,
        }
    };
    let vacant = || {
        Lookup::Vacant(Reference {
            cell: None,
            origin: Some(Origin::Hash(Rc::clone(original))),
            index: Some(Box::new(key.clone())),
            is_const: outer_const,
        })
    };

    // direct pair on the receiver itself
    let direct = original.borrow().get(&hk);
    match flag {
        Flag::Current => {
            return match direct {
                Some(pair) => Lookup::Found(found_ref(pair.cell, outer_const)),
                None => vacant(),
            };
        }
        Flag::Default => {
            if let Some(pair) = direct {
                return Lookup::Found(found_ref(pair.cell, outer_const));
            }
        }
        Flag::Super => {}
    }

    // walk the template chain; any hit past the receiver preserves
    // constness so the shared template pair is not writable through
    // the child
    let mut visited: Vec<*const RefCell<HashData>> = vec![Rc::as_ptr(original)];
    let mut current = Rc::clone(original);

    if flag == Flag::Super && class_type(original) == "Instance" {
        // super on an instance starts above its class template
        match template_of(&current) {
            Some(template) => {
                visited.push(Rc::as_ptr(&template));
                current = template;
            }
            None => return vacant(),
        }
    }

    loop {
        let template = match template_of(&current) {
            Some(template) => template,
            None => break,
        };
        if visited.contains(&Rc::as_ptr(&template)) {
            return Lookup::Fail("cyclic @template chain".to_string());
        }
        visited.push(Rc::as_ptr(&template));
        current = template;

        if let Some(pair) = current.borrow().get(&hk) {
            return Lookup::Found(found_ref(pair.cell, true));
        }
    }

    // a plain string key may still be served by the `@[]` method
    if flag == Flag::Default {
        if let Value::Str(name) = key {
            if !name.starts_with('@') {
                if let Lookup::Found(method) =
                    lookup(original, &Value::string("@[]"), Flag::Default, outer_const)
                {
                    return Lookup::IndexMethod(Value::Reference(method).unwrapped());
                }
            }
        }
    }

    vacant()
}
