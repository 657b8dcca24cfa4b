// src/script/builtins.rs

//! Language-level builtins: global functions, `Math` / `JSON` / `Date`
//! helpers and the methods of arrays, strings and numbers.
//!
//! Host-facing capabilities (`services`, `utils`, `console`) live in
//! [`super::capabilities`].

use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use super::interp::{error_value, range_error, type_error, Eval, Interpreter, Interrupt};
use super::value::{
    format_number, parse_numeric, values_equal, Array, Value, MAX_ARRAY_LEN, MAX_STRING_LEN,
};
use crate::engine::outcome::ConsoleLevel;

pub const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "for_each", "forEach", "any", "some", "all", "every",
    "includes", "indexOf", "join", "push", "pop", "shift", "unshift", "slice", "reduce", "sort",
    "reverse", "concat", "toString",
];

pub const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "includes", "startsWith", "endsWith", "split", "trim",
    "trimStart", "trimEnd", "replace", "replaceAll", "slice", "indexOf", "substring", "charAt",
    "padStart", "padEnd", "repeat", "toString",
];

pub const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Get,
    Sum,
    Avg,
    Min,
    Max,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    String,
    Number,
    Boolean,
    Error,
    TypeError,
    RangeError,
    ArrayIsArray,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    MathAbs,
    MathRound,
    MathFloor,
    MathCeil,
    MathTrunc,
    MathSign,
    MathSqrt,
    MathPow,
    MathLog,
    MathExp,
    MathMin,
    MathMax,
    MathRandom,
    JsonStringify,
    JsonParse,
    Date,
    DateNow,
    ServicesCall,
    ServicesTurnOn,
    ServicesTurnOff,
    ServicesToggle,
    ServicesNotify,
    Console(ConsoleLevel),
    UtilsGetEntity,
    UtilsGetState,
    UtilsGetAttribute,
    UtilsIsOn,
    UtilsIsOff,
    UtilsFilterByDomain,
    UtilsNow,
    UtilsTimestamp,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Get => "get",
            Builtin::Sum => "sum",
            Builtin::Avg => "avg",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::ParseInt => "parseInt",
            Builtin::ParseFloat => "parseFloat",
            Builtin::IsNaN => "isNaN",
            Builtin::IsFinite => "isFinite",
            Builtin::String => "String",
            Builtin::Number => "Number",
            Builtin::Boolean => "Boolean",
            Builtin::Error => "Error",
            Builtin::TypeError => "TypeError",
            Builtin::RangeError => "RangeError",
            Builtin::ArrayIsArray => "isArray",
            Builtin::ObjectKeys => "keys",
            Builtin::ObjectValues => "values",
            Builtin::ObjectEntries => "entries",
            Builtin::ObjectAssign => "assign",
            Builtin::MathAbs => "abs",
            Builtin::MathRound => "round",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathTrunc => "trunc",
            Builtin::MathSign => "sign",
            Builtin::MathSqrt => "sqrt",
            Builtin::MathPow => "pow",
            Builtin::MathLog => "log",
            Builtin::MathExp => "exp",
            Builtin::MathMin => "min",
            Builtin::MathMax => "max",
            Builtin::MathRandom => "random",
            Builtin::JsonStringify => "stringify",
            Builtin::JsonParse => "parse",
            Builtin::Date => "Date",
            Builtin::DateNow => "now",
            Builtin::ServicesCall => "call",
            Builtin::ServicesTurnOn => "turnOn",
            Builtin::ServicesTurnOff => "turnOff",
            Builtin::ServicesToggle => "toggle",
            Builtin::ServicesNotify => "notify",
            Builtin::Console(ConsoleLevel::Debug) => "debug",
            Builtin::Console(ConsoleLevel::Info) => "log",
            Builtin::Console(ConsoleLevel::Warn) => "warn",
            Builtin::Console(ConsoleLevel::Error) => "error",
            Builtin::UtilsGetEntity => "getEntity",
            Builtin::UtilsGetState => "getState",
            Builtin::UtilsGetAttribute => "getAttribute",
            Builtin::UtilsIsOn => "isOn",
            Builtin::UtilsIsOff => "isOff",
            Builtin::UtilsFilterByDomain => "filterByDomain",
            Builtin::UtilsNow => "now",
            Builtin::UtilsTimestamp => "timestamp",
        }
    }

    /// Static members of callable globals (`Date.now`, `Number.isFinite`).
    pub fn property(&self, key: &str) -> Value {
        let member = match (self, key) {
            (Builtin::Date, "now") => Builtin::DateNow,
            (Builtin::Number, "isFinite") => Builtin::IsFinite,
            (Builtin::Number, "isNaN") => Builtin::IsNaN,
            (Builtin::Number, "parseFloat") => Builtin::ParseFloat,
            (Builtin::Number, "parseInt") => Builtin::ParseInt,
            _ => return Value::Null,
        };
        Value::Builtin(member)
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

/// Numbers from either a single array argument or the argument list itself.
fn numeric_args(args: &[Value]) -> Vec<f64> {
    let values = match args {
        [Value::Array(items)] => items.borrow().clone(),
        _ => args.to_vec(),
    };
    values
        .iter()
        .filter(|v| !v.is_null())
        .map(Value::to_number)
        .filter(|n| !n.is_nan())
        .collect()
}

/// Resolve a relative `slice` index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_null() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// Clamp a `substring` index to `[0, len]`.
fn clamped_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_null() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() || n < 0.0 {
        0
    } else {
        n.trunc().min(len as f64) as usize
    }
}

pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn local_iso_now() -> String {
    Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut t = text.trim();
    let negative = t.starts_with('-');
    t = t.trim_start_matches(['-', '+']);
    let hex_prefix = t.starts_with("0x") || t.starts_with("0X");
    let mut radix = radix.unwrap_or(10);
    if hex_prefix && (radix == 16 || radix == 10) {
        t = &t[2..];
        radix = 16;
    }
    let digits: String = t.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    if negative { -value } else { value }
}

fn parse_float(text: &str) -> f64 {
    let t = text.trim_start();
    for word in ["Infinity", "+Infinity", "-Infinity"] {
        if t.starts_with(word) {
            return if word.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
        }
    }
    let chars: Vec<char> = t.chars().collect();
    let mut end = 0;
    if matches!(chars.first(), Some('+' | '-')) {
        end += 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while let Some(c) = chars.get(end) {
        if c.is_ascii_digit() {
            seen_digit = true;
        } else if *c == '.' && !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    if matches!(chars.get(end), Some('e' | 'E')) {
        let mut exp_end = end + 1;
        if matches!(chars.get(exp_end), Some('+' | '-')) {
            exp_end += 1;
        }
        if chars.get(exp_end).is_some_and(|c| c.is_ascii_digit()) {
            while chars.get(exp_end).is_some_and(|c| c.is_ascii_digit()) {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    let prefix: String = chars[..end].iter().collect();
    prefix.parse::<f64>().unwrap_or(f64::NAN)
}

fn json_stringify(value: &Value, indent: &Value) -> Eval<Value> {
    let json = value.to_json();
    let indent = match indent {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::Str(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let written = {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            json.serialize(&mut ser)
        };
        written.map(|_| String::from_utf8_lossy(&buf).into_owned())
    };
    match text {
        Ok(text) => Ok(Value::str(text)),
        Err(err) => type_error(format!("Converting to JSON failed: {err}")),
    }
}

fn date_value(args: &[Value]) -> Eval<Value> {
    let at = match args.first() {
        None | Some(Value::Null) => Utc::now(),
        Some(Value::Number(ms)) => match Utc.timestamp_millis_opt(*ms as i64).single() {
            Some(at) => at,
            None => return range_error("Invalid time value"),
        },
        Some(Value::Str(text)) => match DateTime::parse_from_rfc3339(text) {
            Ok(at) => at.with_timezone(&Utc),
            Err(_) => return range_error("Invalid time value"),
        },
        Some(other) => return type_error(format!("Invalid date argument {}", other.to_display())),
    };
    Ok(Value::str(iso_timestamp(at)))
}

impl Interpreter<'_> {
    pub fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Eval<Value> {
        let number = |i: usize| arg(&args, i).to_number();
        Ok(match builtin {
            Builtin::Get => {
                let object = arg(&args, 0);
                if !object.truthy() {
                    return Ok(Value::Null);
                }
                let key = super::interp::property_key(&arg(&args, 1));
                self.get_property(&object, &key)?
            }
            Builtin::Sum => Value::Number(numeric_args(&args).iter().sum()),
            Builtin::Avg => {
                let values = numeric_args(&args);
                if values.is_empty() {
                    Value::Number(0.0)
                } else {
                    Value::Number(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            Builtin::Min => numeric_args(&args)
                .into_iter()
                .reduce(f64::min)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Builtin::Max => numeric_args(&args)
                .into_iter()
                .reduce(f64::max)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Builtin::ParseInt => {
                let radix = match arg(&args, 1) {
                    Value::Null => None,
                    r => Some(r.to_number() as u32).filter(|r| (2..=36).contains(r)),
                };
                Value::Number(parse_int(&arg(&args, 0).to_display(), radix))
            }
            Builtin::ParseFloat => Value::Number(parse_float(&arg(&args, 0).to_display())),
            Builtin::IsNaN => Value::Bool(number(0).is_nan()),
            Builtin::IsFinite => Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite())),
            Builtin::String => Value::str(args.first().map(Value::to_display).unwrap_or_default()),
            Builtin::Number => match args.first() {
                None => Value::Number(0.0),
                Some(Value::Str(s)) => Value::Number(parse_numeric(s)),
                Some(other) => Value::Number(other.to_number()),
            },
            Builtin::Boolean => Value::Bool(arg(&args, 0).truthy()),
            Builtin::Error | Builtin::TypeError | Builtin::RangeError => {
                let message = match arg(&args, 0) {
                    Value::Null => String::new(),
                    other => other.to_display(),
                };
                error_value(builtin.name(), message)
            }
            Builtin::ArrayIsArray => Value::Bool(matches!(arg(&args, 0), Value::Array(_))),
            Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => {
                let entries: Vec<(String, Value)> = match arg(&args, 0) {
                    Value::Object(map) => map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    Value::Array(items) => items
                        .borrow()
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v.clone()))
                        .collect(),
                    Value::Null => return type_error("Cannot convert null to object"),
                    _ => Vec::new(),
                };
                Value::array(
                    entries
                        .into_iter()
                        .map(|(k, v)| match builtin {
                            Builtin::ObjectKeys => Value::str(k),
                            Builtin::ObjectValues => v,
                            _ => Value::array(vec![Value::str(k), v]),
                        })
                        .collect(),
                )
            }
            Builtin::ObjectAssign => {
                let target = arg(&args, 0);
                let Value::Object(map) = &target else {
                    return type_error("Object.assign target must be an object");
                };
                for source in args.iter().skip(1) {
                    if let Value::Object(src) = source {
                        let entries: Vec<(String, Value)> =
                            src.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                        map.borrow_mut().extend(entries);
                    }
                }
                target
            }
            Builtin::MathAbs => Value::Number(number(0).abs()),
            Builtin::MathRound => Value::Number((number(0) + 0.5).floor()),
            Builtin::MathFloor => Value::Number(number(0).floor()),
            Builtin::MathCeil => Value::Number(number(0).ceil()),
            Builtin::MathTrunc => Value::Number(number(0).trunc()),
            Builtin::MathSign => {
                let n = number(0);
                Value::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() })
            }
            Builtin::MathSqrt => Value::Number(number(0).sqrt()),
            Builtin::MathPow => Value::Number(number(0).powf(number(1))),
            Builtin::MathLog => Value::Number(number(0).ln()),
            Builtin::MathExp => Value::Number(number(0).exp()),
            Builtin::MathMin => Value::Number(numeric_args(&args).into_iter().fold(f64::INFINITY, f64::min)),
            Builtin::MathMax => {
                Value::Number(numeric_args(&args).into_iter().fold(f64::NEG_INFINITY, f64::max))
            }
            Builtin::MathRandom => Value::Number(self.next_random()),
            Builtin::JsonStringify => json_stringify(&arg(&args, 0), &arg(&args, 2))?,
            Builtin::JsonParse => {
                let text = arg(&args, 0).to_display();
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Value::from_json(&json),
                    Err(err) => {
                        return Err(Interrupt::Throw(error_value(
                            "SyntaxError",
                            format!("JSON.parse: {err}"),
                        )));
                    }
                }
            }
            Builtin::Date => date_value(&args)?,
            Builtin::DateNow => Value::Number(Utc::now().timestamp_millis() as f64),
            Builtin::ServicesCall
            | Builtin::ServicesTurnOn
            | Builtin::ServicesTurnOff
            | Builtin::ServicesToggle
            | Builtin::ServicesNotify
            | Builtin::Console(_)
            | Builtin::UtilsGetEntity
            | Builtin::UtilsGetState
            | Builtin::UtilsGetAttribute
            | Builtin::UtilsIsOn
            | Builtin::UtilsIsOff
            | Builtin::UtilsFilterByDomain
            | Builtin::UtilsNow
            | Builtin::UtilsTimestamp => self.call_capability(builtin, args)?,
        })
    }

    /// xorshift64*; scripts need "random enough", not cryptographic.
    fn next_random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    pub fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Eval<Value> {
        match receiver {
            Value::Array(items) => self.array_method(items, name, args),
            Value::Str(s) => string_method(s, name, &args),
            Value::Number(n) => number_method(*n, name, &args),
            Value::Bool(b) => Ok(Value::str(b.to_string())),
            other => type_error(format!("{} has no method {name}", other.to_display())),
        }
    }

    fn array_method(&mut self, items: &Array, name: &str, args: Vec<Value>) -> Eval<Value> {
        let this = Value::Array(items.clone());
        let callback = |args: &[Value]| -> Eval<Value> {
            let f = arg(args, 0);
            if f.is_callable() {
                Ok(f)
            } else {
                type_error(format!("{} is not a function", f.to_display()))
            }
        };
        // Callbacks may mutate the array; iterate over a copy.
        let current = || items.borrow().clone();

        Ok(match name {
            "map" => {
                let f = callback(&args)?;
                let mut out = Vec::new();
                for (i, v) in current().into_iter().enumerate() {
                    out.push(self.call(&f, vec![v, Value::Number(i as f64), this.clone()])?);
                }
                Value::array(out)
            }
            "filter" => {
                let f = callback(&args)?;
                let mut out = Vec::new();
                for (i, v) in current().into_iter().enumerate() {
                    if self.call(&f, vec![v.clone(), Value::Number(i as f64), this.clone()])?.truthy() {
                        out.push(v);
                    }
                }
                Value::array(out)
            }
            "find" | "findIndex" => {
                let f = callback(&args)?;
                for (i, v) in current().into_iter().enumerate() {
                    if self.call(&f, vec![v.clone(), Value::Number(i as f64), this.clone()])?.truthy() {
                        return Ok(if name == "find" { v } else { Value::Number(i as f64) });
                    }
                }
                if name == "find" { Value::Null } else { Value::Number(-1.0) }
            }
            "for_each" | "forEach" => {
                let f = callback(&args)?;
                for (i, v) in current().into_iter().enumerate() {
                    self.call(&f, vec![v, Value::Number(i as f64), this.clone()])?;
                }
                Value::Null
            }
            "any" | "some" | "all" | "every" => {
                let f = callback(&args)?;
                let want_all = matches!(name, "all" | "every");
                for (i, v) in current().into_iter().enumerate() {
                    let hit = self.call(&f, vec![v, Value::Number(i as f64), this.clone()])?.truthy();
                    if hit != want_all {
                        return Ok(Value::Bool(!want_all));
                    }
                }
                Value::Bool(want_all)
            }
            "reduce" => {
                let f = callback(&args)?;
                let mut values = current().into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match values.next() {
                        Some((_, first)) => first,
                        None => return type_error("Reduce of empty array with no initial value"),
                    },
                };
                for (i, v) in values {
                    acc = self.call(&f, vec![acc, v, Value::Number(i as f64), this.clone()])?;
                }
                acc
            }
            "sort" => {
                let comparator = args.first().filter(|f| f.is_callable()).cloned();
                let sorted = self.sort_values(current(), comparator.as_ref())?;
                *items.borrow_mut() = sorted;
                this
            }
            "includes" => {
                let needle = arg(&args, 0);
                Value::Bool(items.borrow().iter().any(|v| values_equal(v, &needle)))
            }
            "indexOf" => {
                let needle = arg(&args, 0);
                let index = items.borrow().iter().position(|v| values_equal(v, &needle));
                Value::Number(index.map(|i| i as f64).unwrap_or(-1.0))
            }
            "join" => {
                let sep = match arg(&args, 0) {
                    Value::Null => ",".to_string(),
                    other => other.to_display(),
                };
                let mut out = String::new();
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(&sep);
                    }
                    if !item.is_null() {
                        let Some(text) = item.display_within(MAX_STRING_LEN.saturating_sub(out.len())) else {
                            return range_error("Invalid string length");
                        };
                        out.push_str(&text);
                    }
                    if out.len() > MAX_STRING_LEN {
                        return range_error("Invalid string length");
                    }
                }
                Value::str(out)
            }
            "push" => {
                let mut items = items.borrow_mut();
                if items.len() + args.len() > MAX_ARRAY_LEN {
                    return range_error("Invalid array length");
                }
                items.extend(args);
                Value::Number(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(Value::Null),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() { Value::Null } else { items.remove(0) }
            }
            "unshift" => {
                let mut items = items.borrow_mut();
                if items.len() + args.len() > MAX_ARRAY_LEN {
                    return range_error("Invalid array length");
                }
                items.splice(0..0, args);
                Value::Number(items.len() as f64)
            }
            "slice" => {
                let all = current();
                let start = relative_index(&arg(&args, 0), all.len(), 0);
                let end = relative_index(&arg(&args, 1), all.len(), all.len());
                Value::array(if start < end { all[start..end].to_vec() } else { Vec::new() })
            }
            "reverse" => {
                items.borrow_mut().reverse();
                this
            }
            "concat" => {
                let mut out = current();
                for extra in args {
                    match extra {
                        Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                    if out.len() > MAX_ARRAY_LEN {
                        return range_error("Invalid array length");
                    }
                }
                Value::array(out)
            }
            "toString" => Value::str(this.to_display()),
            other => return type_error(format!("array has no method {other}")),
        })
    }

    /// Stable merge sort with a fallible comparator.
    fn sort_values(&mut self, mut items: Vec<Value>, comparator: Option<&Value>) -> Eval<Vec<Value>> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.sort_values(items, comparator)?;
        let right = self.sort_values(right, comparator)?;

        let mut out = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        loop {
            let take_right = match (left.peek(), right.peek()) {
                (Some(a), Some(b)) => self.compare(a, b, comparator)? > 0.0,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let next = if take_right { right.next() } else { left.next() };
            out.extend(next);
        }
        Ok(out)
    }

    fn compare(&mut self, a: &Value, b: &Value, comparator: Option<&Value>) -> Eval<f64> {
        match comparator {
            Some(f) => {
                let n = self.call(f, vec![a.clone(), b.clone()])?.to_number();
                Ok(if n.is_nan() { 0.0 } else { n })
            }
            None => {
                // Nulls sort last, everything else by its string form.
                Ok(match (a.is_null(), b.is_null()) {
                    (true, true) => 0.0,
                    (true, false) => 1.0,
                    (false, true) => -1.0,
                    _ => match a.to_display().cmp(&b.to_display()) {
                        std::cmp::Ordering::Less => -1.0,
                        std::cmp::Ordering::Equal => 0.0,
                        std::cmp::Ordering::Greater => 1.0,
                    },
                })
            }
        }
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Eval<Value> {
    let text_arg = |i: usize| arg(args, i).to_display();
    Ok(match name {
        "toUpperCase" => Value::str(s.to_uppercase()),
        "toLowerCase" => Value::str(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
        "indexOf" => {
            let needle = text_arg(0);
            Value::Number(
                s.find(needle.as_str())
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            )
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Null => vec![Value::str(s)],
                sep => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::str).collect()
                    }
                }
            };
            let limit = match arg(args, 1) {
                Value::Null => parts.len(),
                n => n.to_number().max(0.0) as usize,
            };
            Value::array(parts.into_iter().take(limit).collect())
        }
        "replace" => Value::str(s.replacen(text_arg(0).as_str(), &text_arg(1), 1)),
        "replaceAll" => {
            let pattern = text_arg(0);
            if pattern.is_empty() {
                Value::str(s)
            } else {
                Value::str(s.replace(pattern.as_str(), &text_arg(1)))
            }
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            Value::str(if start < end { chars[start..end].iter().collect() } else { String::new() })
        }
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let a = clamped_index(&arg(args, 0), chars.len(), 0);
            let b = clamped_index(&arg(args, 1), chars.len(), chars.len());
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::str(chars[start..end].iter().collect::<String>())
        }
        "charAt" => {
            let index = arg(args, 0).to_number();
            let c = if index >= 0.0 { s.chars().nth(index as usize) } else { None };
            Value::str(c.map(|c| c.to_string()).unwrap_or_default())
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            if target.is_nan() || target > MAX_STRING_LEN as f64 {
                return range_error("Invalid string length");
            }
            let fill = match arg(args, 1) {
                Value::Null => " ".to_string(),
                other => other.to_display(),
            };
            let len = s.chars().count();
            let missing = (target.max(0.0) as usize).saturating_sub(len);
            if missing == 0 || fill.is_empty() {
                return Ok(Value::str(s));
            }
            let pad: String = fill.chars().cycle().take(missing).collect();
            Value::str(if name == "padStart" { format!("{pad}{s}") } else { format!("{s}{pad}") })
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if !(count >= 0.0) || count.is_infinite() || s.len() as f64 * count > MAX_STRING_LEN as f64 {
                return range_error("Invalid count value");
            }
            Value::str(s.repeat(count as usize))
        }
        "toString" => Value::str(s),
        other => return type_error(format!("string has no method {other}")),
    })
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Eval<Value> {
    match name {
        "toFixed" => {
            let digits = match arg(args, 0) {
                Value::Null => 0.0,
                d => d.to_number(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return range_error("toFixed() digits argument must be between 0 and 100");
            }
            if !n.is_finite() {
                return Ok(Value::str(format_number(n)));
            }
            Ok(Value::str(format!("{:.*}", digits as usize, n)))
        }
        "toString" => Ok(Value::str(format_number(n))),
        other => type_error(format!("number has no method {other}")),
    }
}

/// Object value from fixed entries.
pub fn object_of<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<IndexMap<_, _>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_reads_a_digit_prefix() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("  -7", None), -7.0);
        assert_eq!(parse_int("0x1F", None), 31.0);
        assert_eq!(parse_int("ff", Some(16)), 255.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn parse_float_reads_a_numeric_prefix() {
        assert_eq!(parse_float("3.25 °C"), 3.25);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("inf").is_nan());
    }

    #[test]
    fn aggregates_accept_arrays_or_varargs() {
        let arr = Value::array(vec![Value::Number(1.0), Value::str("2"), Value::Null]);
        assert_eq!(numeric_args(&[arr]), vec![1.0, 2.0]);
        assert_eq!(numeric_args(&[Value::Number(4.0), Value::Number(5.0)]), vec![4.0, 5.0]);
    }

    #[test]
    fn string_helpers_follow_javascript_indices() {
        let s = "héllo";
        assert_eq!(string_method(s, "slice", &[Value::Number(-3.0)]).unwrap().to_display(), "llo");
        assert_eq!(
            string_method(s, "substring", &[Value::Number(3.0), Value::Number(1.0)]).unwrap().to_display(),
            "él"
        );
        assert_eq!(string_method(s, "indexOf", &[Value::str("l")]).unwrap().to_number(), 2.0);
        assert_eq!(
            string_method("5", "padStart", &[Value::Number(3.0), Value::str("0")]).unwrap().to_display(),
            "005"
        );
    }

    #[test]
    fn to_fixed_rounds_and_validates() {
        assert_eq!(number_method(3.14159, "toFixed", &[Value::Number(2.0)]).unwrap().to_display(), "3.14");
        assert!(number_method(1.0, "toFixed", &[Value::Number(101.0)]).is_err());
    }

    #[test]
    fn iso_timestamps_use_millisecond_precision() {
        let at = Utc.timestamp_millis_opt(0).single().unwrap();
        assert_eq!(iso_timestamp(at), "1970-01-01T00:00:00.000Z");
    }
}
