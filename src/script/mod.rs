// src/script/mod.rs

//! Restricted native evaluator.
//!
//! Runs code in the normalized dialect (see [`crate::transpile`]) against the
//! capability namespace built from a [`Snapshot`]. Pure and synchronous:
//! the engine runs it on a blocking worker and enforces the wall-clock
//! deadline through [`Limits`].

pub mod ast;
pub mod builtins;
pub mod capabilities;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interp::Limits;

use crate::engine::outcome::Evaluation;
use crate::errors::ExecutionError;
use crate::snapshot::Snapshot;
use interp::{Interpreter, Interrupt, Scope};

/// Parse and evaluate `code`.
///
/// A `throw` that escapes the script, or any runtime type error, becomes a
/// `RuntimeError`; nothing panics on bad input.
pub fn run(code: &str, snapshot: &Snapshot, limits: Limits) -> Result<Evaluation, ExecutionError> {
    let program = parser::parse_program(code)?;

    let scope = Scope::root();
    let mut interp = Interpreter::new(snapshot, limits);
    let outcome = interp.run_program(&program, &scope);
    let outcome = outcome.map(|value| value.to_json());
    scope.borrow_mut().clear();

    match outcome {
        Ok(value) => {
            let (calls, console) = interp.into_parts();
            Ok(Evaluation { value, calls, console })
        }
        Err(Interrupt::Throw(thrown)) => Err(ExecutionError::runtime(thrown.to_display())),
        Err(Interrupt::Fatal(err)) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use indexmap::IndexMap;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::snapshot::{build_snapshot, HostState};

    fn snapshot() -> Snapshot {
        let mut attributes = IndexMap::new();
        attributes.insert("brightness".to_string(), json!(200));
        let states = vec![
            HostState {
                entity_id: Some("light.kitchen".into()),
                state: Some("on".into()),
                attributes: Some(attributes),
                ..Default::default()
            },
            HostState {
                entity_id: Some("light.hall".into()),
                state: Some("off".into()),
                ..Default::default()
            },
            HostState {
                entity_id: Some("sensor.temp".into()),
                state: Some("21.5".into()),
                ..Default::default()
            },
        ];
        build_snapshot(states, None, Utc::now())
    }

    fn limits(ms: u64) -> Limits {
        Limits {
            deadline: Instant::now() + Duration::from_millis(ms),
            timeout_ms: ms,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn eval(code: &str) -> Result<Evaluation, ExecutionError> {
        run(code, &snapshot(), limits(2_000))
    }

    fn value(code: &str) -> serde_json::Value {
        eval(code).unwrap().value
    }

    #[test]
    fn reads_states() {
        assert_eq!(value("return states['light.kitchen'].state"), json!("on"));
        assert_eq!(value("return states['light.kitchen'].attributes.brightness"), json!(200));
        assert_eq!(value("return get(get(states['nope'], \"attributes\"), \"x\")"), json!(null));
    }

    #[test]
    fn queues_service_calls_in_order() {
        let out = eval("a = services.turnOn('switch.fan')\nservices.notify('hi', 'T')\nreturn a").unwrap();
        assert_eq!(out.value, json!("service_call_0"));
        assert_eq!(out.calls.len(), 2);
        assert_eq!(out.calls[0].domain, "homeassistant");
        assert_eq!(out.calls[0].service, "turn_on");
        assert_eq!(out.calls[0].data["entity_id"], json!("switch.fan"));
        assert_eq!(out.calls[1].id, "service_call_1");
        assert_eq!(out.calls[1].data["title"], json!("T"));
    }

    #[test]
    fn utils_classify_and_filter() {
        assert_eq!(value("return utils.isOn('light.kitchen')"), json!(true));
        assert_eq!(value("return utils.isOff('light.hall')"), json!(true));
        assert_eq!(value("return utils.isOn('light.missing')"), json!(false));
        assert_eq!(value("return utils.filterByDomain('light')"), json!(["light.hall", "light.kitchen"]));
        assert_eq!(value("return utils.getAttribute('light.kitchen', 'brightness')"), json!(200));
        assert_eq!(value("return parseFloat(utils.getState('sensor.temp')) + 1"), json!(22.5));
    }

    #[test]
    fn closures_and_collection_methods() {
        let src = "lights = utils.filterByDomain('light')\n\
                   on = lights.filter(|id| utils.isOn(id)).map(|id| id.toUpperCase())\n\
                   return { on, total: lights.length, sum: [1, 2, 3].reduce(|a, b| a + b, 0) }";
        assert_eq!(value(src), json!({ "on": ["LIGHT.KITCHEN"], "total": 2, "sum": 6 }));
    }

    #[test]
    fn control_flow_and_functions() {
        let src = "function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2) }\n\
                   out = []\n\
                   for (i = 0; i < 8; i++) { if (i % 2 == 1) continue; out.push(fib(i)) }\n\
                   total = 0\n\
                   for (x of out) total += x\n\
                   while (true) { total++; if (total > 20) break }\n\
                   return [out, total]";
        assert_eq!(value(src), json!([[0, 1, 3, 8], 21]));
    }

    #[test]
    fn interpolated_strings() {
        assert_eq!(value(r#"n = 3; return f"{n} lights, {{literal}}""#), json!("3 lights, {literal}"));
    }

    #[test]
    fn try_catch_finally() {
        let src = "log = []\n\
                   try { throw new Error('boom') } catch (e) { log.push(e.message) } finally { log.push('done') }\n\
                   try { null.x } catch (e) { log.push(e.name) }\n\
                   return log";
        assert_eq!(value(src), json!(["boom", "done", "TypeError"]));
    }

    #[test]
    fn uncaught_throw_is_a_runtime_error() {
        let err = eval("throw new Error('bad')").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "Error: bad");

        let err = eval("return missing + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert!(err.message.contains("missing is not defined"));
    }

    #[test]
    fn syntax_errors_are_classified() {
        let err = eval("return (1 + ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn runaway_loop_times_out() {
        let started = Instant::now();
        let err = run("services.turnOn('switch.x'); while (true) {}", &snapshot(), limits(50)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn cancellation_flag_stops_evaluation() {
        let limits = limits(60_000);
        limits.cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        let err = run("while (true) {}", &snapshot(), limits).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[test]
    fn unbounded_recursion_is_caught() {
        let err = eval("function f(n) { return f(n + 1) }\nreturn f(0)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert!(err.message.contains("call stack"));
    }

    #[test]
    fn globals_are_shadowed_not_replaced() {
        assert_eq!(value("states = 5; return states"), json!(5));
        assert_eq!(value("return typeof states"), json!("object"));
    }

    #[test]
    fn functions_never_escape() {
        assert_eq!(value("return { f: || 1, n: 1 }"), json!({ "n": 1 }));
        assert_eq!(value("return Math.max"), json!(null));
    }

    #[test]
    fn console_lines_are_captured() {
        let out = eval("console.log('a', 1, [2]); console.warn('w')").unwrap();
        assert_eq!(out.console.len(), 2);
        assert_eq!(out.console[0].message, "a 1 [2]");
        assert_eq!(out.console[1].level, crate::engine::outcome::ConsoleLevel::Warn);
    }

    #[test]
    fn host_environment_is_unreachable() {
        for src in [
            "return process.pid",
            "return require('fs')",
            "return globalThis.constructor.constructor('return process')()",
            "return this.constructor.constructor('return process')()",
            "return services.call.constructor('return process')()",
            "return Object.constructor('return process')()",
            "return Function('return process')()",
            "return eval('1 + 1')",
        ] {
            let err = eval(src).unwrap_err();
            assert_eq!(err.kind, ErrorKind::RuntimeError, "{src}");
        }
    }

    #[test]
    fn array_growth_is_capped() {
        let err = eval("a = []; a.length = 4294967295; return 1").unwrap_err();
        assert_eq!(err.message, "RangeError: Invalid array length");

        let err = eval("a = []; a[5000000] = 1; return 1").unwrap_err();
        assert_eq!(err.message, "RangeError: Invalid array length");

        let err = eval("a = []; a.length = 4194304; a.push(1); return 1").unwrap_err();
        assert_eq!(err.message, "RangeError: Invalid array length");

        assert_eq!(value("a = [1]; a[3] = 4; return a.length"), json!(4));
    }

    #[test]
    fn string_growth_is_capped() {
        let started = Instant::now();
        let err = eval("s = 'x'\nwhile (true) { s = s + s }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "RangeError: Invalid string length");
        assert!(started.elapsed() < Duration::from_secs(2));

        let err = eval("a = []; a.length = 4000000; return a.join('abcdefgh').length").unwrap_err();
        assert_eq!(err.message, "RangeError: Invalid string length");
    }

    #[test]
    fn catalog_is_exposed_even_when_empty() {
        assert_eq!(value("return HACS.repositories"), json!([]));
    }
}
