// src/script/capabilities.rs

//! The injected namespace: the only surface a script can observe or affect
//! the outside world through.
//!
//! `states` and `HACS` are per-execution copies of the snapshot. `services`
//! never performs anything; it appends a [`QueuedCall`] that the dispatcher
//! runs after a successful evaluation.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value as Json};

use super::builtins::{local_iso_now, object_of, Builtin};
use super::interp::{type_error, Eval, Interpreter};
use super::value::Value;
use crate::engine::outcome::{emit_console_line, ConsoleLevel, ConsoleLine, QueuedCall};
use crate::snapshot::entity_json;

/// State strings that count as "on".
pub const ON_STATES: &[&str] = &["on", "open", "active", "playing"];
/// State strings that count as "off".
pub const OFF_STATES: &[&str] = &["off", "closed", "inactive", "paused", "stopped"];

const HOST_DOMAIN: &str = "homeassistant";

impl Interpreter<'_> {
    pub(super) fn capability_globals(&self) -> HashMap<String, Value> {
        let states = Value::from_json(&self.snapshot.states_json());
        let repositories = Value::from_json(&self.snapshot.catalog_json());

        let services = object_of([
            ("call", Value::Builtin(Builtin::ServicesCall)),
            ("turnOn", Value::Builtin(Builtin::ServicesTurnOn)),
            ("turnOff", Value::Builtin(Builtin::ServicesTurnOff)),
            ("toggle", Value::Builtin(Builtin::ServicesToggle)),
            ("notify", Value::Builtin(Builtin::ServicesNotify)),
        ]);
        let utils = object_of([
            ("getEntity", Value::Builtin(Builtin::UtilsGetEntity)),
            ("getState", Value::Builtin(Builtin::UtilsGetState)),
            ("getAttribute", Value::Builtin(Builtin::UtilsGetAttribute)),
            ("isOn", Value::Builtin(Builtin::UtilsIsOn)),
            ("isOff", Value::Builtin(Builtin::UtilsIsOff)),
            ("filterByDomain", Value::Builtin(Builtin::UtilsFilterByDomain)),
            ("now", Value::Builtin(Builtin::UtilsNow)),
            ("timestamp", Value::Builtin(Builtin::UtilsTimestamp)),
        ]);
        let console = object_of([
            ("log", Value::Builtin(Builtin::Console(ConsoleLevel::Info))),
            ("info", Value::Builtin(Builtin::Console(ConsoleLevel::Info))),
            ("warn", Value::Builtin(Builtin::Console(ConsoleLevel::Warn))),
            ("error", Value::Builtin(Builtin::Console(ConsoleLevel::Error))),
            ("debug", Value::Builtin(Builtin::Console(ConsoleLevel::Debug))),
        ]);
        let math = object_of([
            ("abs", Value::Builtin(Builtin::MathAbs)),
            ("round", Value::Builtin(Builtin::MathRound)),
            ("floor", Value::Builtin(Builtin::MathFloor)),
            ("ceil", Value::Builtin(Builtin::MathCeil)),
            ("trunc", Value::Builtin(Builtin::MathTrunc)),
            ("sign", Value::Builtin(Builtin::MathSign)),
            ("sqrt", Value::Builtin(Builtin::MathSqrt)),
            ("pow", Value::Builtin(Builtin::MathPow)),
            ("log", Value::Builtin(Builtin::MathLog)),
            ("exp", Value::Builtin(Builtin::MathExp)),
            ("min", Value::Builtin(Builtin::MathMin)),
            ("max", Value::Builtin(Builtin::MathMax)),
            ("random", Value::Builtin(Builtin::MathRandom)),
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
        ]);
        let json = object_of([
            ("stringify", Value::Builtin(Builtin::JsonStringify)),
            ("parse", Value::Builtin(Builtin::JsonParse)),
        ]);
        let object = object_of([
            ("keys", Value::Builtin(Builtin::ObjectKeys)),
            ("values", Value::Builtin(Builtin::ObjectValues)),
            ("entries", Value::Builtin(Builtin::ObjectEntries)),
            ("assign", Value::Builtin(Builtin::ObjectAssign)),
        ]);
        let array = object_of([("isArray", Value::Builtin(Builtin::ArrayIsArray))]);
        let hacs = object_of([("repositories", repositories)]);

        let mut globals = HashMap::new();
        globals.insert("states".to_string(), states);
        globals.insert("services".to_string(), services);
        globals.insert("utils".to_string(), utils);
        globals.insert("console".to_string(), console);
        globals.insert("HACS".to_string(), hacs);
        globals.insert("Math".to_string(), math);
        globals.insert("JSON".to_string(), json);
        globals.insert("Object".to_string(), object);
        globals.insert("Array".to_string(), array);
        globals.insert("NaN".to_string(), Value::Number(f64::NAN));
        globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));
        for builtin in [
            Builtin::Get,
            Builtin::Sum,
            Builtin::Avg,
            Builtin::Min,
            Builtin::Max,
            Builtin::ParseInt,
            Builtin::ParseFloat,
            Builtin::IsNaN,
            Builtin::IsFinite,
            Builtin::String,
            Builtin::Number,
            Builtin::Boolean,
            Builtin::Error,
            Builtin::TypeError,
            Builtin::RangeError,
            Builtin::Date,
        ] {
            globals.insert(builtin.name().to_string(), Value::Builtin(builtin));
        }
        globals
    }

    pub(super) fn call_capability(&mut self, builtin: Builtin, args: Vec<Value>) -> Eval<Value> {
        let text = |i: usize| args.get(i).map(Value::to_display).unwrap_or_default();
        match builtin {
            Builtin::ServicesCall => {
                let data = service_data(args.get(2))?;
                Ok(self.queue_call(&text(0), &text(1), data))
            }
            Builtin::ServicesTurnOn | Builtin::ServicesTurnOff | Builtin::ServicesToggle => {
                let service = match builtin {
                    Builtin::ServicesTurnOn => "turn_on",
                    Builtin::ServicesTurnOff => "turn_off",
                    _ => "toggle",
                };
                let mut data = Map::new();
                data.insert("entity_id".into(), Json::String(text(0)));
                data.extend(service_data(args.get(1))?);
                Ok(self.queue_call(HOST_DOMAIN, service, data))
            }
            Builtin::ServicesNotify => {
                let mut data = Map::new();
                data.insert("message".into(), Json::String(text(0)));
                if args.get(1).is_some_and(Value::truthy) {
                    data.insert("title".into(), Json::String(text(1)));
                }
                Ok(self.queue_call("notify", "notify", data))
            }
            Builtin::Console(level) => {
                let line = ConsoleLine {
                    level,
                    message: args.iter().map(Value::to_log_string).collect::<Vec<_>>().join(" "),
                };
                emit_console_line(&line);
                self.console.push(line);
                Ok(Value::Null)
            }
            Builtin::UtilsGetEntity => Ok(self
                .snapshot
                .get(&text(0))
                .map(|st| Value::from_json(&entity_json(st)))
                .unwrap_or(Value::Null)),
            Builtin::UtilsGetState => Ok(self
                .snapshot
                .get(&text(0))
                .map(|st| Value::str(&st.state))
                .unwrap_or(Value::Null)),
            Builtin::UtilsGetAttribute => Ok(self
                .snapshot
                .get(&text(0))
                .and_then(|st| st.attributes.get(&text(1)))
                .map(Value::from_json)
                .unwrap_or(Value::Null)),
            Builtin::UtilsIsOn | Builtin::UtilsIsOff => {
                let set = if builtin == Builtin::UtilsIsOn { ON_STATES } else { OFF_STATES };
                let state = self.snapshot.get(&text(0)).map(|st| st.state.as_str());
                Ok(Value::Bool(state.is_some_and(|s| set.contains(&s))))
            }
            Builtin::UtilsFilterByDomain => {
                let domain = text(0);
                let prefix = format!("{domain}.");
                Ok(Value::array(
                    self.snapshot
                        .entities()
                        .filter(|(id, _)| id.starts_with(&prefix))
                        .map(|(id, _)| Value::str(id))
                        .collect(),
                ))
            }
            Builtin::UtilsNow => Ok(Value::str(local_iso_now())),
            Builtin::UtilsTimestamp => Ok(Value::Number(Utc::now().timestamp() as f64)),
            other => type_error(format!("{} is not a capability", other.name())),
        }
    }

    fn queue_call(&mut self, domain: &str, service: &str, data: Map<String, Json>) -> Value {
        let id = QueuedCall::id_for(self.calls.len());
        self.calls.push(QueuedCall {
            id: id.clone(),
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
        Value::str(id)
    }
}

/// Service payload argument: an object, or nothing.
fn service_data(value: Option<&Value>) -> Eval<Map<String, Json>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(value @ Value::Object(_)) => match value.to_json() {
            Json::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        },
        Some(other) => type_error(format!(
            "service data must be an object, got {}",
            other.type_name()
        )),
    }
}
