use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tlang_core::Error;

use crate::ast::{Expr, Program, Stmt};
use crate::env::{self, Environment};
use crate::natives;
use crate::parser::Parser;
use crate::prelude;
use crate::proto::{self, Flag, Lookup};
use crate::value::{
    cell, Function, HashData, HashPair, Origin, Reference, Underline, Value, ValueCell,
};

type Env = Rc<RefCell<Environment>>;

/// Tree-walking evaluator. Runtime failures and control flow travel as
/// in-band `Value` carriers (`Err`, `Ret`, `Out`, `Jump`); host errors
/// stop at the parse layer. Output goes through the injected sink so
/// embedders and tests capture it.
pub struct Interpreter {
    root: Env,
    stdout: Rc<RefCell<dyn Write>>,
}

/// What a driver needs to report a finished run: the inspect rendering
/// plus enough shape to pick an exit path.
pub struct RunOutcome {
    pub rendered: String,
    pub is_void: bool,
    pub is_error: bool,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        let root = Environment::new();
        natives::install(&root);

        let mut interp = Interpreter { root, stdout };
        let program = Parser::new(prelude::SOURCE)
            .parse()
            .expect("prelude source parses");
        let root = Rc::clone(&interp.root);
        let result = interp.run_program(&program, &root);
        if result.is_error() {
            panic!("prelude failed: {}", result.inspect());
        }
        interp
    }

    /// Parses and evaluates in the shared root scope; the same
    /// interpreter keeps its bindings across calls (REPL lines, files
    /// in one session).
    pub fn run_source(&mut self, source: &str) -> Result<RunOutcome, Vec<Error>> {
        let program = Parser::new(source).parse()?;
        let root = Rc::clone(&self.root);
        let result = self.run_program(&program, &root);
        Ok(RunOutcome {
            is_void: matches!(result, Value::Void),
            is_error: result.is_error(),
            rendered: result.inspect(),
        })
    }

    pub(crate) fn root(&self) -> Env {
        Rc::clone(&self.root)
    }

    pub(crate) fn sink(&self) -> Rc<RefCell<dyn Write>> {
        Rc::clone(&self.stdout)
    }

    pub(crate) fn run_program(&mut self, program: &Program, env: &Env) -> Value {
        self.eval_program(&program.statements, env).unwrapped()
    }

    // A top-level `ret` unwraps into the program result; a top-level
    // Err stops execution.
    fn eval_program(&mut self, stmts: &[Stmt], env: &Env) -> Value {
        let mut result = Value::Void;
        for stmt in stmts {
            result = self.eval_stmt(stmt, env);
            match result {
                Value::Ret(value) => return *value,
                Value::Err(_) => return result,
                _ => {}
            }
        }
        result
    }

    fn eval_block(&mut self, stmts: &[Stmt], env: &Env) -> Value {
        let mut result = Value::Void;
        for stmt in stmts {
            result = self.eval_stmt(stmt, env);
            if result.is_error() || result.is_skip() {
                return result;
            }
        }
        result
    }

    fn eval_stmt(&mut self, stmt: &Stmt, env: &Env) -> Value {
        match stmt {
            Stmt::Let { name, value } => self.eval_let(name, value.as_ref(), env),
            Stmt::Ref { name, value } => {
                let name = name.strip_prefix('&').unwrap_or(name);
                self.bind_reference(name, value, env)
            }
            Stmt::Ret(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env),
                    None => Value::Void,
                };
                if value.is_error() {
                    return value;
                }
                Value::Ret(Box::new(value))
            }
            Stmt::Out(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env),
                    None => Value::Void,
                };
                if value.is_error() {
                    return value;
                }
                Value::Out(Box::new(value))
            }
            Stmt::Jump => Value::Jump,
            Stmt::Del(target) => self.eval_del(target, env),
            Stmt::Expression(expr) => self.eval_expr(expr, env),
        }
    }

    fn eval_let(&mut self, name: &str, value: Option<&Expr>, env: &Env) -> Value {
        if let Some(stripped) = name.strip_prefix('&') {
            return match value {
                Some(expr) => self.bind_reference(stripped, expr, env),
                None => Value::Err(format!("let &{}: reference binding needs a value", stripped)),
            };
        }

        let value = match value {
            Some(expr) => self.eval_expr(expr, env).unwrapped(),
            None => Value::Void,
        };
        if value.is_error() || value.is_skip() {
            return value;
        }
        if !env.borrow_mut().set_current(name, value.consume()) {
            return Value::Err(format!("identifier {} already set", name));
        }
        Value::Void
    }

    // `let &x = e` / `ref x = e`: the binding takes over e's Reference
    // identity, cell, const bit and origin included.
    fn bind_reference(&mut self, name: &str, value_expr: &Expr, env: &Env) -> Value {
        let value = self.eval_expr(value_expr, env);
        if value.is_error() {
            return value;
        }
        match value {
            Value::Reference(reference) => {
                if !env
                    .borrow_mut()
                    .set_current(name, Value::Reference(reference))
                {
                    return Value::Err(format!("identifier {} already set", name));
                }
                Value::Void
            }
            _ => Value::Err(format!("left value not Reference: {}", value_expr)),
        }
    }

    fn eval_del(&mut self, target: &Expr, env: &Env) -> Value {
        if let Expr::Identifier(name) = target {
            let name = name.strip_prefix('&').unwrap_or(name);
            return if env::lookup(env, name).is_some() {
                env::free(env, name);
                Value::Void
            } else {
                Value::Err(format!("identifier not found: {}", name))
            };
        }

        let value = self.eval_expr(target, env);
        if value.is_error() {
            return value;
        }
        let reference = match value {
            Value::Reference(reference) => reference,
            _ => return Value::Err(format!("left value not Reference: {}", target)),
        };
        if reference.is_const {
            return Value::Err("del: cannot delete const reference".to_string());
        }
        match (&reference.origin, &reference.index) {
            (Some(Origin::Hash(hash)), Some(index)) => {
                if hash.borrow_mut().free(index) {
                    Value::Void
                } else {
                    Value::Err(format!("identifier not found: {}", index))
                }
            }
            (Some(Origin::Env(frame)), Some(index)) if matches!(index.as_ref(), Value::Str(_)) => {
                let name = match index.as_ref() {
                    Value::Str(name) => name,
                    _ => unreachable!(),
                };
                if env::free(frame, name) {
                    Value::Void
                } else {
                    Value::Err(format!("identifier not found: {}", name))
                }
            }
            _ => Value::Err(format!("left value not a identifier: {}", target)),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Value {
        match expr {
            Expr::Integer(value) => Value::Integer(*value),
            Expr::Float(value) => Value::Float(*value),
            Expr::Str(value) => Value::string(value.clone()),
            Expr::Character(value) => Value::Character(*value),
            Expr::Boolean(value) => Value::Boolean(*value),
            Expr::Void => Value::Void,
            Expr::Identifier(name) => self.eval_identifier(name, env),
            Expr::Prefix { op, right } => {
                let right = self.eval_expr(right, env).unwrapped();
                if right.is_error() {
                    return right;
                }
                eval_prefix(op, right)
            }
            Expr::Infix { op, left, right } => {
                let left = self.eval_expr(left, env).unwrapped();
                if left.is_error() {
                    return left;
                }
                let right = self.eval_expr(right, env).unwrapped();
                if right.is_error() {
                    return right;
                }
                self.eval_infix(op, left, right, env)
            }
            Expr::Assign { op, left, value } => self.eval_assign(op, left, value, env),
            Expr::If {
                cond,
                consequence,
                alternative,
            } => self.eval_if(cond, consequence, alternative.as_deref(), env),
            Expr::Loop { cond, body } => self.eval_loop(cond, body, env),
            Expr::LoopIn { name, range, body } => self.eval_loop_in(name, range, body, env),
            Expr::Function { parameters, body } => Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: Rc::clone(body),
                env: Rc::clone(env),
                receiver: None,
            })),
            Expr::Underline { body } => Value::Underline(Rc::new(Underline {
                body: Rc::clone(body),
                env: Rc::clone(env),
            })),
            Expr::Call {
                function,
                arguments,
            } => self.eval_call(function, arguments, env),
            Expr::Index { left, indexes } => {
                let (left_value, left_const) = match self.eval_place(left, env) {
                    Ok(place) => place,
                    Err(err) => return err,
                };
                let indexes = match self.eval_expressions(indexes, env, true) {
                    Ok(indexes) => indexes,
                    Err(err) => return err,
                };
                self.index_value(&left_value, &indexes, left_const, env)
            }
            Expr::Dot { left, name } => {
                let (left_value, left_const) = match self.eval_place(left, env) {
                    Ok(place) => place,
                    Err(err) => return err,
                };
                let indexes = [Value::string(name.clone())];
                self.index_value(&left_value, &indexes, left_const, env)
            }
            Expr::Array(elements) => match self.eval_expressions(elements, env, true) {
                Ok(values) => Value::array(values),
                Err(err) => err,
            },
            Expr::Hash(pairs) => self.eval_hash_literal(pairs, env),
        }
    }

    // Evaluates an index/dot receiver, keeping the const bit of the
    // Reference it came through.
    fn eval_place(&mut self, expr: &Expr, env: &Env) -> Result<(Value, bool), Value> {
        let value = self.eval_expr(expr, env);
        if value.is_error() {
            return Err(value);
        }
        let is_const = matches!(&value, Value::Reference(r) if r.is_const);
        let value = value.unwrapped();
        if value.is_error() {
            return Err(value);
        }
        Ok((value, is_const))
    }

    fn eval_identifier(&mut self, name: &str, env: &Env) -> Value {
        // `&x` resolves like `x` unless a literal `&x` binding exists
        // (the underline body sees both `args` and `&args`)
        let (bound_name, found) = match env::lookup(env, name) {
            Some(hit) => (name, Some(hit)),
            None => match name.strip_prefix('&') {
                Some(stripped) => (stripped, env::lookup(env, stripped)),
                None => (name, None),
            },
        };

        match found {
            Some((slot, frame)) => {
                let stored = slot.borrow().clone();
                if let Value::Reference(reference) = stored {
                    // alias transparency: the alias is the reference
                    return Value::Reference(reference);
                }
                Value::Reference(Reference {
                    cell: Some(slot),
                    origin: Some(Origin::Env(frame)),
                    index: Some(Box::new(Value::string(bound_name))),
                    is_const: false,
                })
            }
            None => Value::Err(format!("identifier not found: {}", bound_name)),
        }
    }

    fn eval_hash_literal(&mut self, pairs: &[(Expr, Expr)], env: &Env) -> Value {
        let mut data = HashData::new();
        data.xvalue = true;
        for (key_expr, value_expr) in pairs {
            let key = self.eval_expr(key_expr, env).unwrapped();
            if key.is_error() {
                return key;
            }
            let value = self.eval_expr(value_expr, env).unwrapped();
            if value.is_error() {
                return value;
            }
            let hk = match key.hash_key() {
                Some(hk) => hk,
                None => {
                    return Value::Err(format!("unusable as hash key: {}", key.type_name()));
                }
            };
            data.pairs.insert(
                hk,
                HashPair {
                    key,
                    cell: cell(value),
                },
            );
        }
        Value::Hash(Rc::new(RefCell::new(data)))
    }

    fn eval_if(
        &mut self,
        cond: &Expr,
        consequence: &[Stmt],
        alternative: Option<&[Stmt]>,
        env: &Env,
    ) -> Value {
        let cond = self.eval_expr(cond, env).unwrapped();
        if cond.is_error() {
            return cond;
        }
        if cond.is_truthy() {
            let child = Environment::enclosed(env);
            self.eval_block(consequence, &child)
        } else if let Some(alternative) = alternative {
            let child = Environment::enclosed(env);
            self.eval_block(alternative, &child)
        } else {
            Value::Void
        }
    }

    fn eval_loop(&mut self, cond: &Expr, body: &[Stmt], env: &Env) -> Value {
        let mut result = Value::Void;
        loop {
            let condition = self.eval_expr(cond, env).unwrapped();
            if condition.is_error() {
                return condition;
            }
            if !condition.is_truthy() {
                return result;
            }

            let child = Environment::enclosed(env);
            match self.eval_block(body, &child) {
                outcome @ (Value::Err(_) | Value::Ret(_)) => return outcome,
                Value::Out(value) => return *value,
                Value::Jump => {}
                outcome => result = outcome,
            }
        }
    }

    fn eval_loop_in(&mut self, name: &str, range: &Expr, body: &[Stmt], env: &Env) -> Value {
        let range = self.eval_expr(range, env).unwrapped();
        if range.is_error() {
            return range;
        }
        let length = match self.length_of(&range, env) {
            Value::Integer(length) => length,
            err @ Value::Err(_) => return err,
            other => {
                return Value::Err(format!(
                    "loop: length of range is {}, not Integer",
                    other.type_name()
                ));
            }
        };

        let by_ref = name.starts_with('&');
        let bind_name = name.strip_prefix('&').unwrap_or(name);
        let mut result = Value::Void;

        for i in 0..length {
            let item = self.index_value(&range, &[Value::Integer(i)], false, env);
            if item.is_error() {
                return item;
            }
            let bound = if by_ref {
                match item {
                    reference @ Value::Reference(_) => reference,
                    other => Value::Reference(Reference::const_to(other)),
                }
            } else {
                item.unwrapped()
            };

            let child = Environment::enclosed(env);
            child.borrow_mut().set_current(bind_name, bound);
            match self.eval_block(body, &child) {
                outcome @ (Value::Err(_) | Value::Ret(_)) => return outcome,
                Value::Out(value) => return *value,
                Value::Jump => {}
                outcome => result = outcome,
            }
        }
        result
    }

    fn eval_call(&mut self, function: &Expr, arguments: &[Expr], env: &Env) -> Value {
        let callee = self.eval_expr(function, env);
        if callee.is_error() {
            return callee;
        }
        let callee = callee.unwrapped();
        if callee.is_error() {
            return callee;
        }

        let args = match self.eval_expressions(arguments, env, false) {
            Ok(args) => args,
            Err(err) => {
                // `fetch` alone receives the error instead of
                // short-circuiting on it
                if let Value::Native(native) = &callee {
                    if native.name == "fetch" {
                        return self.apply_function(callee.clone(), vec![err], env);
                    }
                }
                return err;
            }
        };

        self.apply_function(callee, args, env)
    }

    pub(crate) fn apply_function(&mut self, callee: Value, args: Vec<Value>, env: &Env) -> Value {
        match callee {
            Value::Function(function) => self.apply_user_function(&function, args),
            Value::Underline(underline) => self.apply_underline(&underline, args),
            Value::Native(native) => (native.func)(self, env, &args),
            Value::Hash(hash) => {
                match proto::lookup(&hash, &Value::string("@()"), Flag::Default, false) {
                    Lookup::Found(method) => {
                        let method = Value::Reference(method).unwrapped();
                        self.apply_function(method, args, env)
                    }
                    Lookup::Fail(msg) => Value::Err(msg),
                    _ => Value::Err("not a function: Hash".to_string()),
                }
            }
            other => Value::Err(format!("not a function: {}", other.type_name())),
        }
    }

    fn apply_user_function(&mut self, function: &Function, mut args: Vec<Value>) -> Value {
        let call_env = Environment::enclosed(&function.env);
        let params = &function.parameters;

        // a trailing `self`/`&self` formal receives the stamped
        // receiver; explicit arguments never reach that slot
        let has_self = matches!(params.last().map(String::as_str), Some("self") | Some("&self"));
        if has_self {
            let positional = params.len() - 1;
            args.truncate(positional);
            while args.len() < positional {
                args.push(Value::Void);
            }
            let receiver = function.receiver.clone().unwrap_or(Value::Void);
            if params[positional] == "&self" {
                args.push(Value::Reference(Reference::to_cell(cell(receiver))));
            } else {
                args.push(receiver);
            }
        }

        for (i, param) in params.iter().enumerate() {
            if let Some(stripped) = param.strip_prefix('&') {
                let bound = match args.get(i) {
                    Some(Value::Reference(reference)) => Value::Reference(reference.clone()),
                    Some(other) => Value::Reference(Reference::const_to(other.clone())),
                    None => Value::Reference(Reference::unallocated_const()),
                };
                call_env.borrow_mut().set_current(stripped, bound);
            } else {
                let bound = match args.get(i) {
                    Some(arg) => arg.clone().unwrapped(),
                    None => Value::Void,
                };
                call_env.borrow_mut().set_current(param, bound);
            }
        }

        match self.eval_block(&function.body, &call_env) {
            Value::Ret(value) => *value,
            other => other,
        }
    }

    fn apply_underline(&mut self, underline: &Underline, args: Vec<Value>) -> Value {
        let call_env = Environment::enclosed(&underline.env);

        let references: Vec<Value> = args
            .iter()
            .map(|arg| match arg {
                Value::Reference(reference) => Value::Reference(reference.clone()),
                other => Value::Reference(Reference::const_to(other.clone())),
            })
            .collect();
        let values: Vec<Value> = args.into_iter().map(Value::unwrapped).collect();

        call_env
            .borrow_mut()
            .set_current("&args", Value::array(references));
        call_env
            .borrow_mut()
            .set_current("args", Value::array(values));

        match self.eval_block(&underline.body, &call_env) {
            Value::Ret(value) => *value,
            other => other,
        }
    }

    fn eval_assign(&mut self, op: &str, left_expr: &Expr, value_expr: &Expr, env: &Env) -> Value {
        let value = self.eval_expr(value_expr, env).unwrapped();
        if value.is_error() {
            return value;
        }

        let left = self.eval_expr(left_expr, env);
        if left.is_error() {
            return left;
        }
        let reference = match left {
            Value::Reference(reference) => reference,
            _ => return Value::Err(format!("left value not Reference: {}", left_expr)),
        };

        let (slot, current) = match self.assign_target(&reference, left_expr) {
            Ok(target) => target,
            Err(err) => return err,
        };

        let new_value = if op == "=" {
            value.consume()
        } else {
            let inner_op = &op[..op.len() - 1];
            let computed = self.eval_infix(inner_op, current.unwrapped(), value, env);
            if computed.is_error() {
                return computed;
            }
            computed
        }
        .settle();

        *slot.borrow_mut() = new_value.clone();
        new_value
    }

    // Resolves the storage cell an assignment writes, allocating
    // through the origin for unallocated references. A const reference
    // rejects the write, with one exception: a pair reached through the
    // template chain materializes on the receiving hash, leaving the
    // template untouched.
    fn assign_target(
        &mut self,
        reference: &Reference,
        left_expr: &Expr,
    ) -> Result<(ValueCell, Value), Value> {
        match &reference.cell {
            Some(slot) => {
                if !reference.is_const {
                    let current = slot.borrow().clone();
                    return Ok((Rc::clone(slot), current));
                }
                if let (Some(Origin::Hash(hash)), Some(index)) =
                    (&reference.origin, &reference.index)
                {
                    let inherited = match index.hash_key() {
                        Some(hk) => hash.borrow().get(&hk).is_none(),
                        None => false,
                    };
                    if inherited {
                        if let Some(own) = hash.borrow_mut().alloc(index) {
                            let current = slot.borrow().clone();
                            return Ok((own, current));
                        }
                    }
                }
                Err(Value::Err("assign to const reference".to_string()))
            }
            None => {
                if reference.is_const {
                    return Err(Value::Err("assign to const reference".to_string()));
                }
                let slot = match (&reference.origin, &reference.index) {
                    (Some(Origin::Env(frame)), Some(index)) => frame.borrow_mut().alloc(index),
                    (Some(Origin::Hash(hash)), Some(index)) => hash.borrow_mut().alloc(index),
                    _ => None,
                };
                match slot {
                    Some(slot) => Ok((slot, Value::Void)),
                    None => Err(Value::Err(format!(
                        "could not allocate through reference: {}",
                        left_expr
                    ))),
                }
            }
        }
    }

    fn eval_expressions(
        &mut self,
        exprs: &[Expr],
        env: &Env,
        unwrap: bool,
    ) -> Result<Vec<Value>, Value> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let value = if unwrap {
                self.eval_expr(expr, env).unwrapped()
            } else {
                self.eval_expr(expr, env)
            };
            if value.is_error() {
                return Err(value);
            }
            values.push(value);
        }
        Ok(values)
    }

    pub(crate) fn index_value(
        &mut self,
        left: &Value,
        indexes: &[Value],
        left_const: bool,
        env: &Env,
    ) -> Value {
        match left {
            Value::Array(data) => {
                if indexes.len() != 1 {
                    return Value::Err("array: len(indexes) should be 1".to_string());
                }
                let index = match &indexes[0] {
                    Value::Integer(index) => *index,
                    _ => return Value::Err("array: index should be Integer".to_string()),
                };
                let data = data.borrow();
                if index < 0 || index as usize >= data.elements.len() {
                    return Value::Err("array: out of range".to_string());
                }
                let slot = &data.elements[index as usize];
                // a slot holding a Reference passes it through, the
                // same transparency identifiers give aliases
                if let Value::Reference(inner) = &*slot.borrow() {
                    return Value::Reference(inner.clone());
                }
                Value::Reference(Reference {
                    cell: Some(Rc::clone(slot)),
                    origin: None,
                    index: Some(Box::new(Value::Integer(index))),
                    is_const: left_const,
                })
            }
            Value::Str(content) => {
                if indexes.len() != 1 {
                    return Value::Err("string: len(indexes) should be 1".to_string());
                }
                let index = match &indexes[0] {
                    Value::Integer(index) => *index,
                    _ => return Value::Err("string: index should be Integer".to_string()),
                };
                if index < 0 {
                    return Value::Err("string: out of range".to_string());
                }
                match content.chars().nth(index as usize) {
                    Some(ch) => Value::Reference(Reference::const_to(Value::Character(ch))),
                    None => Value::Err("string: out of range".to_string()),
                }
            }
            Value::Hash(hash) => {
                if indexes.len() == 1 {
                    match proto::lookup(hash, &indexes[0], Flag::Default, left_const) {
                        Lookup::Found(reference) => {
                            if let Some(slot) = &reference.cell {
                                if let Value::Reference(inner) = &*slot.borrow() {
                                    return Value::Reference(inner.clone());
                                }
                            }
                            Value::Reference(reference)
                        }
                        Lookup::Vacant(reference) => Value::Reference(reference),
                        Lookup::IndexMethod(method) => {
                            self.apply_function(method, indexes.to_vec(), env)
                        }
                        Lookup::Fail(msg) => Value::Err(msg),
                    }
                } else {
                    // only the @[] method can serve an index list
                    match proto::lookup(hash, &Value::string("@[]"), Flag::Default, left_const) {
                        Lookup::Found(method) => {
                            let method = Value::Reference(method).unwrapped();
                            self.apply_function(method, indexes.to_vec(), env)
                        }
                        _ => Value::Err("hash: len(indexes) should be 1".to_string()),
                    }
                }
            }
            other => Value::Err(format!("not indexable: {}", other.type_name())),
        }
    }

    /// `len` semantics, shared with `loop … in`: character count for
    /// strings, element count for arrays, the `@len` method for hashes.
    pub(crate) fn length_of(&mut self, value: &Value, env: &Env) -> Value {
        match value {
            Value::Str(content) => Value::Integer(content.chars().count() as i64),
            Value::Array(data) => Value::Integer(data.borrow().elements.len() as i64),
            Value::Hash(hash) => {
                match proto::lookup(hash, &Value::string("@len"), Flag::Default, false) {
                    Lookup::Found(method) => {
                        let method = Value::Reference(method).unwrapped();
                        self.apply_function(method, vec![], env).unwrapped()
                    }
                    Lookup::Fail(msg) => Value::Err(msg),
                    _ => Value::Err(
                        "native function len: arg should be String, Array or Hash".to_string(),
                    ),
                }
            }
            _ => Value::Err("native function len: arg should be String, Array or Hash".to_string()),
        }
    }

    /// `string` coercion: a hash with `@string` renders through it,
    /// everything else through the display view.
    pub(crate) fn coerce_string(&mut self, value: &Value, env: &Env) -> Value {
        if let Value::Hash(hash) = value {
            if let Lookup::Found(method) =
                proto::lookup(hash, &Value::string("@string"), Flag::Default, false)
            {
                let method = Value::Reference(method).unwrapped();
                let rendered = self.apply_function(method, vec![], env).unwrapped();
                if rendered.is_error() || matches!(rendered, Value::Str(_)) {
                    return rendered;
                }
                return Value::string(rendered.to_string());
            }
        }
        Value::string(value.to_string())
    }

    /// `inspect` rendering with the `@inspect` hook for hashes.
    pub(crate) fn coerce_inspect(&mut self, value: &Value, env: &Env) -> Value {
        if let Value::Hash(hash) = value {
            if let Lookup::Found(method) =
                proto::lookup(hash, &Value::string("@inspect"), Flag::Default, false)
            {
                let method = Value::Reference(method).unwrapped();
                let rendered = self.apply_function(method, vec![], env).unwrapped();
                if rendered.is_error() || matches!(rendered, Value::Str(_)) {
                    return rendered;
                }
                return Value::string(rendered.to_string());
            }
        }
        Value::string(value.inspect())
    }

    fn eval_infix(&mut self, op: &str, left: Value, right: Value, env: &Env) -> Value {
        match &left {
            Value::Integer(_) | Value::Float(_) => {
                if matches!(right, Value::Integer(_) | Value::Float(_)) {
                    eval_number_infix(op, &left, &right)
                } else {
                    Value::Err(format!(
                        "type mismatch: {} {} {}",
                        left.type_name(),
                        op,
                        right.type_name()
                    ))
                }
            }
            Value::Boolean(l) => match &right {
                Value::Boolean(r) => eval_boolean_infix(op, *l, *r),
                _ => Value::Err(format!(
                    "type mismatch: {} {} {}",
                    left.type_name(),
                    op,
                    right.type_name()
                )),
            },
            Value::Str(_) | Value::Character(_) => match (left.letters(), right.letters()) {
                (Some(l), Some(r)) => eval_letter_infix(op, &left, &l, &r, &right),
                _ => Value::Err(format!(
                    "type mismatch: {} {} {}",
                    left.type_name(),
                    op,
                    right.type_name()
                )),
            },
            Value::Hash(hash) => {
                let hash = Rc::clone(hash);
                self.eval_hash_infix(op, &hash, right, env)
            }
            _ => Value::Err(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            )),
        }
    }

    // `h OP x` dispatches the hash's `@OP` method with the right
    // operand as argument and the hash as receiver.
    fn eval_hash_infix(
        &mut self,
        op: &str,
        hash: &Rc<RefCell<HashData>>,
        right: Value,
        env: &Env,
    ) -> Value {
        let method_key = Value::string(format!("@{}", op));
        match proto::lookup(hash, &method_key, Flag::Default, false) {
            Lookup::Found(method) => {
                let method = Value::Reference(method).unwrapped();
                self.apply_function(method, vec![right], env)
            }
            Lookup::Fail(msg) => Value::Err(msg),
            _ => Value::Err(format!(
                "unknown operator: Hash {} {}",
                op,
                right.type_name()
            )),
        }
    }
}

fn eval_prefix(op: &str, right: Value) -> Value {
    match op {
        "!" => Value::Boolean(!right.is_truthy()),
        "+" => match right {
            Value::Integer(_) | Value::Float(_) => right,
            _ => Value::Err(format!("unknown operator: +{}", right.type_name())),
        },
        "-" => match right {
            Value::Integer(value) => Value::Integer(value.wrapping_neg()),
            Value::Float(value) => Value::Float(-value),
            _ => Value::Err(format!("unknown operator: -{}", right.type_name())),
        },
        _ => Value::Err(format!("unknown operator: {}{}", op, right.type_name())),
    }
}

fn eval_number_infix(op: &str, left: &Value, right: &Value) -> Value {
    if let (Value::Integer(l), Value::Integer(r)) = (left, right) {
        let (l, r) = (*l, *r);
        return match op {
            "+" => Value::Integer(l.wrapping_add(r)),
            "-" => Value::Integer(l.wrapping_sub(r)),
            "*" => Value::Integer(l.wrapping_mul(r)),
            // integer division always yields Float
            "/" => Value::Float(l as f64 / r as f64),
            "%" => {
                if r == 0 {
                    Value::Err("division by zero: Integer % Integer".to_string())
                } else {
                    Value::Integer(l.wrapping_rem(r))
                }
            }
            "<" => Value::Boolean(l < r),
            ">" => Value::Boolean(l > r),
            "<=" => Value::Boolean(l <= r),
            ">=" => Value::Boolean(l >= r),
            "==" => Value::Boolean(l == r),
            "!=" => Value::Boolean(l != r),
            _ => Value::Err(format!("unknown operator: Integer {} Integer", op)),
        };
    }

    let (l, r) = match (number_as_f64(left), number_as_f64(right)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Value::Err(format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            ));
        }
    };
    match op {
        "+" => Value::Float(l + r),
        "-" => Value::Float(l - r),
        "*" => Value::Float(l * r),
        "/" => Value::Float(l / r),
        "<" => Value::Boolean(l < r),
        ">" => Value::Boolean(l > r),
        "<=" => Value::Boolean(l <= r),
        ">=" => Value::Boolean(l >= r),
        "==" => Value::Boolean(l == r),
        "!=" => Value::Boolean(l != r),
        _ => Value::Err(format!(
            "unknown operator: {} {} {}",
            left.type_name(),
            op,
            right.type_name()
        )),
    }
}

fn number_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

fn eval_boolean_infix(op: &str, left: bool, right: bool) -> Value {
    match op {
        "==" => Value::Boolean(left == right),
        "!=" => Value::Boolean(left != right),
        "and" => Value::Boolean(left && right),
        "or" => Value::Boolean(left || right),
        _ => Value::Err(format!("unknown operator: Boolean {} Boolean", op)),
    }
}

fn eval_letter_infix(
    op: &str,
    left: &Value,
    left_letters: &str,
    right_letters: &str,
    right: &Value,
) -> Value {
    match op {
        "+" => Value::string(format!("{}{}", left_letters, right_letters)),
        "==" => Value::Boolean(left_letters == right_letters),
        "!=" => Value::Boolean(left_letters != right_letters),
        _ => Value::Err(format!(
            "unknown operator: {} {} {}",
            left.type_name(),
            op,
            right.type_name()
        )),
    }
}
