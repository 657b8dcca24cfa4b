// src/script/value.rs

//! Runtime values of the restricted evaluator.
//!
//! Values live on a single evaluation thread, so shared containers use
//! `Rc<RefCell<..>>`. Nothing in here crosses the sandbox boundary: results
//! are converted to `serde_json::Value` on the way out.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};

use super::ast::{Params, Stmt};
use super::builtins::Builtin;
use super::interp::Scope;

/// Longest string the evaluator builds.
pub const MAX_STRING_LEN: usize = 1 << 24;
/// Most elements an array may grow to.
pub const MAX_ARRAY_LEN: usize = 1 << 22;
const MAX_DISPLAY_DEPTH: usize = 64;

pub type Array = Rc<RefCell<Vec<Value>>>;
pub type Object = Rc<RefCell<IndexMap<String, Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Array),
    Object(Object),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// A collection method bound to its receiver (`xs.map`).
    Method(Rc<BoundMethod>),
}

#[derive(Debug)]
pub struct Closure {
    pub name: Option<String>,
    pub params: Params,
    pub body: Rc<Vec<Stmt>>,
    pub scope: Rc<RefCell<Scope>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_) | Value::Method(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Closure(_) | Value::Builtin(_) | Value::Method(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => parse_numeric(s),
            _ => f64::NAN,
        }
    }

    /// `String(value)` semantics. Text past [`MAX_STRING_LEN`] is cut off.
    pub fn to_display(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, MAX_STRING_LEN, 0);
        out
    }

    /// `String(value)`, or `None` when the text would exceed `limit` bytes.
    pub fn display_within(&self, limit: usize) -> Option<String> {
        let mut out = String::new();
        self.write_display(&mut out, limit, 0).then_some(out)
    }

    /// Append the display form to `out`; false once `out` passes `limit`.
    fn write_display(&self, out: &mut String, limit: usize, depth: usize) -> bool {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::Str(s) => out.push_str(s),
            // Nested occurrences of a self-referencing array render empty.
            Value::Array(_) if depth > MAX_DISPLAY_DEPTH => {}
            Value::Array(items) => {
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_null() && !item.write_display(out, limit, depth + 1) {
                        return false;
                    }
                    if out.len() > limit {
                        return false;
                    }
                }
            }
            Value::Object(map) => {
                let map = map.borrow();
                match (map.get("name"), map.get("message")) {
                    (Some(Value::Str(name)), Some(message)) if depth <= MAX_DISPLAY_DEPTH => {
                        let _ = write!(out, "{name}: ");
                        if !message.write_display(out, limit, depth + 1) {
                            return false;
                        }
                    }
                    _ => out.push_str("[object Object]"),
                }
            }
            Value::Closure(c) => {
                let _ = write!(out, "function {}", c.name.as_deref().unwrap_or("anonymous"));
            }
            Value::Builtin(b) => {
                let _ = write!(out, "function {}", b.name());
            }
            Value::Method(m) => {
                let _ = write!(out, "function {}", m.name);
            }
        }
        out.len() <= limit
    }

    /// Human-oriented rendering used by `console.*`: strings raw, containers
    /// as JSON.
    pub fn to_log_string(&self) -> String {
        match self {
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_else(|_| self.to_display())
            }
            other => other.to_display(),
        }
    }

    /// Convert to JSON. Functions become `null` (and are dropped from
    /// objects); non-finite numbers become `null`.
    pub fn to_json(&self) -> Json {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> Json {
        // Self-referencing containers would otherwise recurse forever.
        if depth > 64 {
            return Json::Null;
        }
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_json_depth(depth + 1))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map.borrow().iter() {
                    if !v.is_callable() {
                        out.insert(k.clone(), v.to_json_depth(depth + 1));
                    }
                }
                Json::Object(out)
            }
            Value::Closure(_) | Value::Builtin(_) | Value::Method(_) => Json::Null,
        }
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::str(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Equality used for both `==` and `===`.
///
/// No cross-type coercion: numbers compare by value, strings by content,
/// containers and functions by identity.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        _ => false,
    }
}

/// `Number(string)`: whole-string numeric parse, empty is zero.
pub fn parse_numeric(s: &str) -> f64 {
    let t = s.trim();
    match t {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                return u64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN);
            }
            // Rust also accepts "inf" / "nan"; JavaScript doesn't.
            if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            t.parse::<f64>().unwrap_or(f64::NAN)
        }
    }
}

pub fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Json::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        let mut s = String::new();
        let _ = write!(s, "{}", n as i128);
        return s;
    }
    format!("{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_render_like_javascript() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn json_round_trip_keeps_order_and_integers() {
        let input = json!({ "b": 1, "a": [true, null, 2.5, "x"] });
        let value = Value::from_json(&input);
        assert_eq!(value.to_json(), input);
    }

    #[test]
    fn functions_do_not_escape_as_json() {
        let mut map = IndexMap::new();
        map.insert("keep".to_string(), Value::Number(1.0));
        map.insert("drop".to_string(), Value::Builtin(Builtin::MathMin));
        assert_eq!(Value::object(map).to_json(), json!({ "keep": 1 }));
        assert_eq!(Value::Builtin(Builtin::MathMax).to_json(), Json::Null);
    }

    #[test]
    fn display_is_bounded() {
        let big = Value::str("x".repeat(1 << 10));
        assert_eq!(big.display_within(1 << 10).map(|s| s.len()), Some(1 << 10));
        assert_eq!(big.display_within(100), None);

        let looped = Value::array(vec![Value::Number(1.0)]);
        if let Value::Array(items) = &looped {
            items.borrow_mut().push(looped.clone());
            items.borrow_mut().push(looped.clone());
        }
        assert_eq!(looped.display_within(64), None);
        assert!(looped.to_display().len() < MAX_STRING_LEN + 16);
    }

    #[test]
    fn equality_does_not_coerce() {
        assert!(values_equal(&Value::Number(1.0), &Value::Number(1.0)));
        assert!(!values_equal(&Value::str("1"), &Value::Number(1.0)));
        assert!(!values_equal(&Value::Null, &Value::Bool(false)));
    }
}
