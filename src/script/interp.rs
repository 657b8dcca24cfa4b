// src/script/interp.rs

//! Tree-walking interpreter.
//!
//! Scoping is per function: blocks share their function's scope, and a bare
//! assignment updates the nearest enclosing binding or declares one in the
//! current function. Capability globals sit below all scopes and are never
//! written; assigning to one of their names shadows it locally.
//!
//! The interpreter checks its deadline and the cancellation flag every
//! [`CHECK_EVERY`] steps, so a runaway loop is stopped even though the
//! thread running it can't be killed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use super::ast::*;
use super::value::{
    format_number, values_equal, BoundMethod, Closure, Value, MAX_ARRAY_LEN, MAX_STRING_LEN,
};
use crate::engine::outcome::{ConsoleLine, QueuedCall};
use crate::errors::ExecutionError;
use crate::snapshot::Snapshot;

const CHECK_EVERY: u64 = 256;
const MAX_CALL_DEPTH: usize = 128;

/// Non-local exits that unwind through expression evaluation.
#[derive(Debug)]
pub enum Interrupt {
    /// A catchable script-level exception.
    Throw(Value),
    /// Timeout or cancellation; not catchable by user code.
    Fatal(ExecutionError),
}

pub type Eval<T> = Result<T, Interrupt>;

/// Statement completion.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Debug, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Rc<RefCell<Scope>>>,
}

impl Scope {
    pub fn root() -> Rc<RefCell<Scope>> {
        Rc::new(RefCell::new(Scope::default()))
    }

    fn child(parent: &Rc<RefCell<Scope>>) -> Rc<RefCell<Scope>> {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Drop all bindings. Breaks closure <-> scope reference cycles.
    pub fn clear(&mut self) {
        self.vars.clear();
        self.parent = None;
    }
}

/// Wall-clock budget of one evaluation.
#[derive(Debug, Clone)]
pub struct Limits {
    pub deadline: Instant,
    pub timeout_ms: u64,
    pub cancel: Arc<AtomicBool>,
}

pub struct Interpreter<'a> {
    pub(super) snapshot: &'a Snapshot,
    pub(super) globals: HashMap<String, Value>,
    pub(super) calls: Vec<QueuedCall>,
    pub(super) console: Vec<ConsoleLine>,
    pub(super) rng: u64,
    limits: Limits,
    steps: u64,
    depth: usize,
}

/// Build a `{ name, message }` error object.
pub fn error_value(name: &str, message: impl Into<String>) -> Value {
    let mut map = IndexMap::new();
    map.insert("name".to_string(), Value::str(name));
    map.insert("message".to_string(), Value::str(message.into()));
    Value::object(map)
}

pub fn type_error<T>(message: impl Into<String>) -> Eval<T> {
    Err(Interrupt::Throw(error_value("TypeError", message)))
}

pub fn range_error<T>(message: impl Into<String>) -> Eval<T> {
    Err(Interrupt::Throw(error_value("RangeError", message)))
}

impl<'a> Interpreter<'a> {
    pub fn new(snapshot: &'a Snapshot, limits: Limits) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        let mut interp = Self {
            snapshot,
            globals: HashMap::new(),
            calls: Vec::new(),
            console: Vec::new(),
            rng: seed | 1,
            limits,
            steps: 0,
            depth: 0,
        };
        interp.globals = interp.capability_globals();
        interp
    }

    pub fn into_parts(self) -> (Vec<QueuedCall>, Vec<ConsoleLine>) {
        (self.calls, self.console)
    }

    /// Run a whole program in `scope`. Falling off the end yields `null`.
    pub fn run_program(&mut self, body: &[Stmt], scope: &Rc<RefCell<Scope>>) -> Eval<Value> {
        self.hoist(body, scope);
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(value),
                Flow::Break | Flow::Continue => break,
            }
        }
        Ok(Value::Null)
    }

    fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps % CHECK_EVERY == 0
            && (self.limits.cancel.load(Ordering::Relaxed) || Instant::now() >= self.limits.deadline)
        {
            return Err(Interrupt::Fatal(ExecutionError::timeout(self.limits.timeout_ms)));
        }
        Ok(())
    }

    // ---- scopes --------------------------------------------------------

    fn hoist(&mut self, body: &[Stmt], scope: &Rc<RefCell<Scope>>) {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                let closure = self.make_closure(def, scope);
                if let Some(name) = &def.name {
                    scope.borrow_mut().vars.insert(name.clone(), closure);
                }
            }
        }
    }

    fn make_closure(&self, def: &Rc<FunctionDef>, scope: &Rc<RefCell<Scope>>) -> Value {
        Value::Closure(Rc::new(Closure {
            name: def.name.clone(),
            params: Rc::clone(&def.params),
            body: Rc::clone(&def.body),
            scope: Rc::clone(scope),
        }))
    }

    fn lookup(&self, name: &str, scope: &Rc<RefCell<Scope>>) -> Eval<Value> {
        let mut current = Some(Rc::clone(scope));
        while let Some(s) = current {
            let frame = s.borrow();
            if let Some(value) = frame.vars.get(name) {
                return Ok(value.clone());
            }
            current = frame.parent.clone();
        }
        match self.globals.get(name) {
            Some(value) => Ok(value.clone()),
            None => Err(Interrupt::Throw(error_value(
                "ReferenceError",
                format!("{name} is not defined"),
            ))),
        }
    }

    fn is_defined(&self, name: &str, scope: &Rc<RefCell<Scope>>) -> bool {
        self.lookup(name, scope).is_ok()
    }

    /// Update the nearest binding of `name`, or declare it in `scope`.
    fn assign_name(&self, name: &str, value: Value, scope: &Rc<RefCell<Scope>>) {
        let mut current = Some(Rc::clone(scope));
        while let Some(s) = current {
            let mut frame = s.borrow_mut();
            if let Some(slot) = frame.vars.get_mut(name) {
                *slot = value;
                return;
            }
            current = frame.parent.clone();
        }
        scope.borrow_mut().vars.insert(name.to_string(), value);
    }

    fn declare(&self, name: &str, value: Value, scope: &Rc<RefCell<Scope>>) {
        scope.borrow_mut().vars.insert(name.to_string(), value);
    }

    // ---- statements ----------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<RefCell<Scope>>) -> Eval<Flow> {
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<RefCell<Scope>>) -> Eval<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Block(body) => self.exec_block(body, scope),
            Stmt::If(test, then, otherwise) => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(test, body) => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile(body, test) => {
                loop {
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { init, test, update, body } => {
                if let Some(init) = init {
                    self.exec(init, scope)?;
                }
                loop {
                    if let Some(test) = test
                        && !self.eval(test, scope)?.truthy()
                    {
                        break;
                    }
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, scope)?;
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::ForEach { name, iterable, keys, body } => {
                let iterable = self.eval(iterable, scope)?;
                let items = if *keys {
                    self.keys_of(&iterable)?
                } else {
                    self.values_of(&iterable)?
                };
                for item in items {
                    self.assign_name(name, item, scope);
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(Interrupt::Throw(value))
            }
            Stmt::Try { body, catch, finally } => {
                let result = match (self.exec_block(body, scope), catch) {
                    (Err(Interrupt::Throw(thrown)), Some((binding, handler))) => {
                        if let Some(binding) = binding {
                            self.declare(binding, thrown, scope);
                        }
                        self.exec_block(handler, scope)
                    }
                    (result, _) => result,
                };
                if matches!(result, Err(Interrupt::Fatal(_))) {
                    return result;
                }
                if let Some(finally) = finally {
                    match self.exec_block(finally, scope)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
                result
            }
            Stmt::Switch(discriminant, cases) => {
                let value = self.eval(discriminant, scope)?;
                let mut start = None;
                for (i, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test
                        && values_equal(&value, &self.eval(test, scope)?)
                    {
                        start = Some(i);
                        break;
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
                if let Some(start) = start {
                    for case in &cases[start..] {
                        match self.exec_block(&case.body, scope)? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(def) => {
                let closure = self.make_closure(def, scope);
                if let Some(name) = &def.name {
                    self.declare(name, closure, scope);
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn values_of(&self, iterable: &Value) -> Eval<Vec<Value>> {
        match iterable {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => type_error(format!("{} is not iterable", other.to_display())),
        }
    }

    fn keys_of(&self, value: &Value) -> Eval<Vec<Value>> {
        match value {
            Value::Object(map) => Ok(map.borrow().keys().map(Value::str).collect()),
            Value::Array(items) => Ok((0..items.borrow().len()).map(|i| Value::str(i.to_string())).collect()),
            Value::Str(s) => Ok((0..s.chars().count()).map(|i| Value::str(i.to_string())).collect()),
            _ => Ok(Vec::new()),
        }
    }

    // ---- expressions ---------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, scope: &Rc<RefCell<Scope>>) -> Eval<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Rc::clone(s))),
            Expr::FStr(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStrPart::Text(text) => out.push_str(text),
                        FStrPart::Expr(expr) => {
                            let value = self.eval(expr, scope)?;
                            match value.display_within(MAX_STRING_LEN.saturating_sub(out.len())) {
                                Some(text) => out.push_str(&text),
                                None => return range_error("Invalid string length"),
                            }
                        }
                    }
                }
                Ok(Value::str(out))
            }
            Expr::Ident(name) => self.lookup(name, scope),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(props) => {
                let mut map = IndexMap::new();
                for prop in props {
                    match prop {
                        Prop::Pair(key, value) => {
                            let value = self.eval(value, scope)?;
                            map.insert(key.clone(), value);
                        }
                        Prop::Computed(key, value) => {
                            let key = property_key(&self.eval(key, scope)?);
                            let value = self.eval(value, scope)?;
                            map.insert(key, value);
                        }
                        Prop::Spread(source) => match self.eval(source, scope)? {
                            Value::Object(src) => {
                                for (k, v) in src.borrow().iter() {
                                    map.insert(k.clone(), v.clone());
                                }
                            }
                            Value::Array(src) => {
                                for (i, v) in src.borrow().iter().enumerate() {
                                    map.insert(i.to_string(), v.clone());
                                }
                            }
                            _ => {}
                        },
                    }
                }
                Ok(Value::object(map))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                self.get_property(&object, name)
            }
            Expr::Index(object, key) => {
                let object = self.eval(object, scope)?;
                let key = self.eval(key, scope)?;
                self.get_property(&object, &property_key(&key))
            }
            Expr::Call(callee, args) => {
                let function = self.eval(callee, scope)?;
                let args = self.eval_items(args, scope)?;
                if !function.is_callable() {
                    return type_error(format!("{} is not a function", describe(callee)));
                }
                self.call(&function, args)
            }
            Expr::Unary(op, operand) => {
                if *op == UnaryOp::Typeof
                    && let Expr::Ident(name) = operand.as_ref()
                    && !self.is_defined(name, scope)
                {
                    return Ok(Value::str("undefined"));
                }
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Typeof => Value::str(match value {
                        Value::Null => "undefined",
                        other => other.type_name(),
                    }),
                })
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_null(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Assign(target, op, value) => self.eval_assign(target, *op, value, scope),
            Expr::Update { target, delta, prefix } => {
                let place = self.place(target, scope)?;
                let old = self.read_place(&place, scope)?.to_number();
                let new = old + delta;
                self.write_place(place, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Function(def) => Ok(self.make_closure(def, scope)),
        }
    }

    fn eval_items(&mut self, items: &[ArrayItem], scope: &Rc<RefCell<Scope>>) -> Eval<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => out.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.extend(self.values_of(&value)?);
                }
            }
        }
        Ok(out)
    }

    fn eval_assign(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
        scope: &Rc<RefCell<Scope>>,
    ) -> Eval<Value> {
        let place = self.place(target, scope)?;
        let value = match op {
            None => self.eval(value, scope)?,
            Some(op) => {
                let current = self.read_place(&place, scope)?;
                let rhs = self.eval(value, scope)?;
                binary(op, &current, &rhs)?
            }
        };
        self.write_place(place, value.clone(), scope)?;
        Ok(value)
    }

    fn place(&mut self, target: &Expr, scope: &Rc<RefCell<Scope>>) -> Eval<Place> {
        match target {
            Expr::Ident(name) => Ok(Place::Name(name.clone())),
            Expr::Member(object, name) => Ok(Place::Property(self.eval(object, scope)?, name.clone())),
            Expr::Index(object, key) => {
                let object = self.eval(object, scope)?;
                let key = property_key(&self.eval(key, scope)?);
                Ok(Place::Property(object, key))
            }
            _ => type_error("Invalid assignment target"),
        }
    }

    fn read_place(&mut self, place: &Place, scope: &Rc<RefCell<Scope>>) -> Eval<Value> {
        match place {
            Place::Name(name) => self.lookup(name, scope),
            Place::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, scope: &Rc<RefCell<Scope>>) -> Eval<()> {
        match place {
            Place::Name(name) => {
                self.assign_name(&name, value, scope);
                Ok(())
            }
            Place::Property(object, key) => set_property(&object, key, value),
        }
    }

    // ---- properties ----------------------------------------------------

    pub fn get_property(&mut self, object: &Value, key: &str) -> Eval<Value> {
        match object {
            Value::Null => type_error(format!("Cannot read properties of null (reading '{key}')")),
            Value::Object(map) => Ok(map.borrow().get(key).cloned().unwrap_or(Value::Null)),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Null));
                }
                Ok(bind_method(object, key, super::builtins::ARRAY_METHODS))
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::str(c.to_string()))
                        .unwrap_or(Value::Null));
                }
                Ok(bind_method(object, key, super::builtins::STRING_METHODS))
            }
            Value::Number(_) => Ok(bind_method(object, key, super::builtins::NUMBER_METHODS)),
            Value::Bool(_) => Ok(bind_method(object, key, &["toString"])),
            Value::Builtin(builtin) => Ok(builtin.property(key)),
            Value::Closure(_) | Value::Method(_) => Ok(Value::Null),
        }
    }

    // ---- calls ---------------------------------------------------------

    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Eval<Value> {
        self.tick()?;
        match function {
            Value::Closure(closure) => self.call_closure(closure, args),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args),
            Value::Method(method) => {
                let BoundMethod { receiver, name } = method.as_ref();
                self.call_method(receiver, name, args)
            }
            other => type_error(format!("{} is not a function", other.to_display())),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Eval<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return range_error("Maximum call stack size exceeded");
        }
        let scope = Scope::child(&closure.scope);
        let mut args = args.into_iter();
        for param in closure.params.iter() {
            let value = match (args.next(), &param.default) {
                (Some(value), _) if !value.is_null() => value,
                (_, Some(default)) => self.eval(default, &scope)?,
                (value, None) => value.unwrap_or(Value::Null),
            };
            self.declare(&param.name, value, &scope);
        }

        self.depth += 1;
        self.hoist(&closure.body, &scope);
        let result = self.exec_block(&closure.body, &scope);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }
}

enum Place {
    Name(String),
    Property(Value, String),
}

fn set_property(object: &Value, key: String, value: Value) -> Eval<()> {
    match object {
        Value::Object(map) => {
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if key == "length" {
                let len = value.to_number();
                if !(len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LEN as f64) {
                    return range_error("Invalid array length");
                }
                items.resize(len as usize, Value::Null);
                return Ok(());
            }
            match array_index(&key) {
                Some(index) if index < MAX_ARRAY_LEN => {
                    if index >= items.len() {
                        items.resize(index + 1, Value::Null);
                    }
                    items[index] = value;
                    Ok(())
                }
                Some(_) => range_error("Invalid array length"),
                None => type_error(format!("Cannot set property '{key}' of an array")),
            }
        }
        other => type_error(format!(
            "Cannot set properties of {} (setting '{key}')",
            other.to_display()
        )),
    }
}

fn bind_method(receiver: &Value, name: &str, known: &[&str]) -> Value {
    if known.contains(&name) {
        Value::Method(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            name: name.to_string(),
        }))
    } else {
        Value::Null
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

/// Property key for `obj[key]`.
pub fn property_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member(object, name) => format!("{}.{name}", describe(object)),
        Expr::Index(object, _) => format!("{}[...]", describe(object)),
        Expr::Call(callee, _) => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

pub fn binary(op: BinOp, left: &Value, right: &Value) -> Eval<Value> {
    use Value::{Number, Str};
    Ok(match op {
        BinOp::Add => match (left, right) {
            (Number(a), Number(b)) => Number(a + b),
            (Str(_), _) | (_, Str(_)) | (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                return concat(left, right);
            }
            _ => Number(left.to_number() + right.to_number()),
        },
        BinOp::Sub => Number(left.to_number() - right.to_number()),
        BinOp::Mul => Number(left.to_number() * right.to_number()),
        BinOp::Div => Number(left.to_number() / right.to_number()),
        BinOp::Mod => Number(left.to_number() % right.to_number()),
        BinOp::Pow => Number(left.to_number().powf(right.to_number())),
        BinOp::Eq => Value::Bool(values_equal(left, right)),
        BinOp::Ne => Value::Bool(!values_equal(left, right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Str(a), Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinOp::In => match right {
            Value::Object(map) => Value::Bool(map.borrow().contains_key(&property_key(left))),
            Value::Array(items) => Value::Bool(
                array_index(&property_key(left)).is_some_and(|i| i < items.borrow().len()),
            ),
            other => {
                return type_error(format!(
                    "Cannot use 'in' operator to search for '{}' in {}",
                    left.to_display(),
                    other.to_display()
                ));
            }
        },
    })
}

/// String `+`, refusing results longer than [`MAX_STRING_LEN`].
fn concat(left: &Value, right: &Value) -> Eval<Value> {
    let Some(mut text) = left.display_within(MAX_STRING_LEN) else {
        return range_error("Invalid string length");
    };
    let Some(tail) = right.display_within(MAX_STRING_LEN - text.len()) else {
        return range_error("Invalid string length");
    };
    text.push_str(&tail);
    Ok(Value::str(text))
}
