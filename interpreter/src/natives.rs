use std::cell::RefCell;
use std::io::BufRead;
use std::rc::Rc;

use crate::env::{self, Environment};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::proto::{self, Flag, Lookup};
use crate::value::{Native, NativeFn, Reference, Value};

type Env = Rc<RefCell<Environment>>;

/// Binds every native into the root frame. Natives resolve by name
/// like any other binding, so user code can shadow or alias them.
pub(crate) fn install(root: &Env) {
    let natives: &[(&'static str, NativeFn)] = &[
        ("len", native_len),
        ("type", native_type),
        ("type&", native_type_ref),
        ("string", native_string),
        ("inspect", native_inspect),
        ("integer", native_integer),
        ("float", native_float),
        ("boolean", native_boolean),
        ("array", native_array),
        ("append", native_append),
        ("first", native_first),
        ("last", native_last),
        ("echo", native_echo),
        ("value", native_value),
        ("fetch", native_fetch),
        ("error", native_error),
        ("print", native_print),
        ("printLine", native_print_line),
        ("input", native_input),
        ("inputLine", native_input_line),
        ("exit", native_exit),
        ("eval", native_eval),
        ("import", native_import),
        ("call", native_call),
        ("subscript", native_subscript),
        ("super", native_super),
        ("current", native_current),
        ("classType", native_class_type),
    ];

    let mut root = root.borrow_mut();
    for &(name, func) in natives {
        root.set_current(name, Value::Native(Rc::new(Native { name, func })));
    }
}

fn arg_count_error(name: &str, expected: &str) -> Value {
    Value::Err(format!(
        "native function {}: len(args) should be {}",
        name, expected
    ))
}

fn native_len(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("len", "1");
    }
    let value = args[0].clone().unwrapped();
    interp.length_of(&value, env)
}

fn native_type(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("type", "1");
    }
    Value::string(args[0].clone().unwrapped().type_name())
}

// Like `type`, but reports the reference layer instead of looking
// through it.
fn native_type_ref(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("type&", "1");
    }
    match &args[0] {
        Value::Reference(reference) => {
            let inner = args[0].clone().unwrapped();
            let rendered = if reference.is_const {
                format!("Const Reference ({})", inner.type_name())
            } else {
                format!("Reference ({})", inner.type_name())
            };
            Value::string(rendered)
        }
        other => Value::string(other.type_name()),
    }
}

fn native_string(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("string", "1");
    }
    let value = args[0].clone().unwrapped();
    interp.coerce_string(&value, env)
}

fn native_inspect(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("inspect", "1");
    }
    let value = args[0].clone().unwrapped();
    interp.coerce_inspect(&value, env)
}

fn native_integer(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("integer", "1");
    }
    match args[0].clone().unwrapped() {
        Value::Str(text) => match text.trim().parse::<i64>() {
            Ok(value) => Value::Integer(value),
            Err(_) => Value::Err(format!("could not parse {} as integer", text)),
        },
        Value::Boolean(value) => Value::Integer(value as i64),
        Value::Float(value) => Value::Integer(value as i64),
        value @ Value::Integer(_) => value,
        Value::Void => Value::Integer(0),
        _ => Value::Err(
            "native function integer: arg should be String, Boolean, Number or Void".to_string(),
        ),
    }
}

fn native_float(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("float", "1");
    }
    match args[0].clone().unwrapped() {
        Value::Str(text) => match text.trim().parse::<f64>() {
            Ok(value) => Value::Float(value),
            Err(_) => Value::Err(format!("could not parse {} as float", text)),
        },
        Value::Boolean(value) => Value::Float(if value { 1.0 } else { 0.0 }),
        Value::Integer(value) => Value::Float(value as f64),
        value @ Value::Float(_) => value,
        Value::Void => Value::Float(0.0),
        _ => Value::Err(
            "native function float: arg should be String, Boolean, Number or Void".to_string(),
        ),
    }
}

// Total over every value: plain truthiness, same as `!!x`.
fn native_boolean(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("boolean", "1");
    }
    Value::Boolean(args[0].clone().unwrapped().is_truthy())
}

fn native_array(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.is_empty() || args.len() > 3 {
        return arg_count_error("array", "1, 2 or 3");
    }
    let length = match args[0].clone().unwrapped() {
        Value::Integer(length) if length >= 0 => length,
        _ => {
            return Value::Err(
                "native function array: args[0] should be a non-negative Integer".to_string(),
            );
        }
    };

    match args.len() {
        1 => Value::array(vec![Value::Void; length as usize]),
        2 => {
            let seed = args[1].clone().unwrapped();
            let elements = (0..length).map(|_| seed.copy()).collect();
            Value::array(elements)
        }
        _ => {
            // element i = f(i, prev), starting from the seed
            let generator = args[2].clone().unwrapped();
            let mut prev = args[1].clone().unwrapped();
            let mut elements = Vec::with_capacity(length as usize);
            for i in 0..length {
                let next = interp
                    .apply_function(generator.clone(), vec![Value::Integer(i), prev], env)
                    .unwrapped();
                if next.is_error() {
                    return next;
                }
                elements.push(next.clone());
                prev = next;
            }
            Value::array(elements)
        }
    }
}

fn native_append(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 2 {
        return arg_count_error("append", "2");
    }
    match args[0].clone().unwrapped() {
        Value::Array(data) => {
            let mut elements: Vec<Value> = data
                .borrow()
                .elements
                .iter()
                .map(|slot| slot.borrow().clone())
                .collect();
            elements.push(args[1].clone().unwrapped());
            Value::array(elements)
        }
        _ => Value::Err("native function append: args[0] should be Array".to_string()),
    }
}

fn native_first(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    array_edge_reference("first", args, |_| 0)
}

fn native_last(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    array_edge_reference("last", args, |len| len - 1)
}

fn array_edge_reference(name: &str, args: &[Value], pick: fn(i64) -> i64) -> Value {
    if args.len() != 1 {
        return arg_count_error(name, "1");
    }
    let is_const = matches!(&args[0], Value::Reference(r) if r.is_const);
    match args[0].clone().unwrapped() {
        Value::Array(data) => {
            let data = data.borrow();
            let length = data.elements.len() as i64;
            if length == 0 {
                return Value::Void;
            }
            let index = pick(length);
            Value::Reference(Reference {
                cell: Some(Rc::clone(&data.elements[index as usize])),
                origin: None,
                index: Some(Box::new(Value::Integer(index))),
                is_const,
            })
        }
        _ => Value::Err(format!("native function {}: arg should be Array", name)),
    }
}

fn native_echo(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("echo", "1");
    }
    args[0].clone()
}

fn native_value(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("value", "1");
    }
    args[0].clone().unwrapped()
}

// The one call that sees errors: an Err argument arrives here intact
// and leaves as its message.
fn native_fetch(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("fetch", "1");
    }
    match &args[0] {
        Value::Err(msg) => Value::string(msg.clone()),
        other => other.clone(),
    }
}

fn native_error(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("error", "1");
    }
    let value = args[0].clone().unwrapped();
    match interp.coerce_string(&value, env) {
        Value::Str(msg) => Value::Err(msg.as_ref().clone()),
        err => err,
    }
}

fn native_print(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    let sink = interp.sink();
    for arg in args {
        let value = arg.clone().unwrapped();
        match interp.coerce_string(&value, env) {
            Value::Str(text) => {
                let _ = write!(sink.borrow_mut(), "{}", text);
            }
            err => return err,
        }
    }
    Value::Void
}

fn native_print_line(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    let sink = interp.sink();
    if args.is_empty() {
        let _ = writeln!(sink.borrow_mut());
        return Value::Void;
    }
    for arg in args {
        let value = arg.clone().unwrapped();
        match interp.coerce_string(&value, env) {
            Value::Str(text) => {
                let _ = writeln!(sink.borrow_mut(), "{}", text);
            }
            err => return err,
        }
    }
    Value::Void
}

fn native_input(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if !args.is_empty() {
        return arg_count_error("input", "0");
    }
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => match line.split_whitespace().next() {
            Some(word) => Value::string(word),
            None => Value::string(""),
        },
        Err(err) => Value::Err(format!("native function input: {}", err)),
    }
}

fn native_input_line(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if !args.is_empty() {
        return arg_count_error("inputLine", "0");
    }
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => Value::string(line.trim_end_matches(['\n', '\r'])),
        Err(err) => Value::Err(format!("native function inputLine: {}", err)),
    }
}

fn native_exit(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    match args.len() {
        0 => std::process::exit(0),
        1 => match args[0].clone().unwrapped() {
            Value::Integer(code) => std::process::exit(code as i32),
            _ => Value::Err("native function exit: arg should be Integer".to_string()),
        },
        _ => arg_count_error("exit", "1 or 0"),
    }
}

fn native_eval(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("eval", "1");
    }
    let source = match args[0].clone().unwrapped() {
        Value::Str(source) => source,
        _ => return Value::Err("native function eval: arg should be String".to_string()),
    };
    match Parser::new(&source).parse() {
        Ok(program) => interp.run_program(&program, env),
        Err(errors) => Value::Err(format!(
            "native function eval: {}",
            join_errors(&errors)
        )),
    }
}

// Evaluates the file in a fresh child of the shared root and surfaces
// its `export` binding; every failure mode comes back as Err.
fn native_import(interp: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("import", "1");
    }
    let path = match args[0].clone().unwrapped() {
        Value::Str(path) => path,
        _ => return Value::Err("native function import: arg should be String".to_string()),
    };
    let source = match std::fs::read_to_string(path.as_ref()) {
        Ok(source) => source,
        Err(err) => {
            return Value::Err(format!(
                "native function import: could not read {}: {}",
                path, err
            ));
        }
    };
    let program = match Parser::new(&source).parse() {
        Ok(program) => program,
        Err(errors) => {
            return Value::Err(format!(
                "native function import: {}: {}",
                path,
                join_errors(&errors)
            ));
        }
    };

    let module_env = Environment::enclosed(&interp.root());
    let result = interp.run_program(&program, &module_env);
    if result.is_error() {
        return result;
    }
    match env::lookup(&module_env, "export") {
        Some((slot, _)) => slot.borrow().clone().unwrapped(),
        None => Value::Void,
    }
}

fn join_errors(errors: &[tlang_core::Error]) -> String {
    let rendered: Vec<String> = errors.iter().map(|err| err.to_string()).collect();
    rendered.join("; ")
}

fn native_call(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 2 {
        return arg_count_error("call", "2");
    }
    let callee = args[0].clone().unwrapped();
    match args[1].clone().unwrapped() {
        Value::Array(data) => {
            let call_args: Vec<Value> = data
                .borrow()
                .elements
                .iter()
                .map(|slot| slot.borrow().clone())
                .collect();
            interp.apply_function(callee, call_args, env)
        }
        _ => Value::Err("native function call: args[1] should be Array".to_string()),
    }
}

fn native_subscript(interp: &mut Interpreter, env: &Env, args: &[Value]) -> Value {
    if args.len() != 2 {
        return arg_count_error("subscript", "2");
    }
    let is_const = matches!(&args[0], Value::Reference(r) if r.is_const);
    let target = args[0].clone().unwrapped();
    match args[1].clone().unwrapped() {
        Value::Array(data) => {
            let indexes: Vec<Value> = data
                .borrow()
                .elements
                .iter()
                .map(|slot| slot.borrow().clone().unwrapped())
                .collect();
            interp.index_value(&target, &indexes, is_const, env)
        }
        _ => Value::Err("native function subscript: args[1] should be Array".to_string()),
    }
}

fn native_super(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    proto_native("super", Flag::Super, args)
}

fn native_current(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    proto_native("current", Flag::Current, args)
}

fn proto_native(name: &str, flag: Flag, args: &[Value]) -> Value {
    if args.len() != 2 {
        return arg_count_error(name, "2");
    }
    let hash = match args[0].clone().unwrapped() {
        Value::Hash(hash) => hash,
        _ => {
            return Value::Err(format!("native function {}: args[0] should be Hash", name));
        }
    };
    let key = args[1].clone().unwrapped();
    match proto::lookup(&hash, &key, flag, false) {
        Lookup::Found(reference) | Lookup::Vacant(reference) => Value::Reference(reference),
        // Current and Super lookups never reach the @[] fallback
        Lookup::IndexMethod(_) => {
            Value::Err(format!("native function {}: unexpected index method", name))
        }
        Lookup::Fail(msg) => Value::Err(msg),
    }
}

fn native_class_type(_: &mut Interpreter, _: &Env, args: &[Value]) -> Value {
    if args.len() != 1 {
        return arg_count_error("classType", "1");
    }
    match args[0].clone().unwrapped() {
        Value::Hash(hash) => Value::string(proto::class_type(&hash)),
        _ => Value::Err("native function classType: arg should be Hash".to_string()),
    }
}
