// src/render/mod.rs

//! HTML template renderer.
//!
//! A small substitution language over a JSON context:
//!
//! - `{{ path.to.value }}`: dotted lookup (array indices allowed).
//! - `{{ fn(arg, ...) }}`: one of [`FUNCTIONS`]; args are quoted strings,
//!   numbers or paths.
//! - `{% if cond %}...{% endif %}`: `==`, `!=`, `>`, `<` or truthiness.
//! - `{% for x in path %}...{% endfor %}`: the body is rendered once per
//!   element with `x` bound.
//!
//! Rendering never fails: anything that doesn't resolve is left in place.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::scheduler::EntityAttributes;
use crate::snapshot::Snapshot;

pub const EMPTY_TEMPLATE_HTML: &str = "<div>No template defined</div>";

pub const FUNCTIONS: &[&str] = &[
    "now",
    "format_date",
    "upper",
    "lower",
    "length",
    "round",
    "json",
    "default",
    "state",
    "attr",
];

struct Patterns {
    for_block: Regex,
    if_block: Regex,
    expression: Regex,
    call: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            for_block: Regex::new(
                r"(?s)\{%\s*for\s+(\w+)\s+in\s+([^%]+?)\s*%\}(.*?)\{%\s*endfor\s*%\}",
            )?,
            if_block: Regex::new(r"(?s)\{%\s*if\s+([^%]+?)\s*%\}(.*?)\{%\s*endif\s*%\}")?,
            expression: Regex::new(r"\{\{([^}]+)\}\}")?,
            call: Regex::new(r"^(\w+)\(([^)]*)\)$")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// Render `template` against `context`.
pub fn render_html(template: &str, context: &Value, snapshot: &Snapshot) -> String {
    if template.trim().is_empty() {
        return EMPTY_TEMPLATE_HTML.to_string();
    }
    match &*PATTERNS {
        Ok(patterns) => Renderer { patterns, snapshot }.render(template, context),
        Err(err) => {
            warn!(error = %err, "template patterns unavailable, returning template as-is");
            template.to_string()
        }
    }
}

/// Render an entity's template with the standard context.
pub fn render_entity(attributes: &EntityAttributes, snapshot: &Snapshot) -> String {
    let context = entity_context(attributes, snapshot);
    render_html(&attributes.html_template, &context, snapshot)
}

/// Context: the entity's own state and attributes, `result` (whose keys are
/// also merged at top level when it is an object), every host entity under
/// `states`, and the current time.
pub fn entity_context(attributes: &EntityAttributes, snapshot: &Snapshot) -> Value {
    let mut ctx = Map::new();
    ctx.insert("state".into(), json!(attributes.state));
    ctx.insert("entity_id".into(), json!(attributes.entity_id));
    ctx.insert("friendly_name".into(), json!(attributes.entity_id));
    ctx.insert(
        "attributes".into(),
        serde_json::to_value(attributes).unwrap_or(Value::Null),
    );
    ctx.insert("last_execution".into(), json!(attributes.last_execution));

    if let Some(result) = &attributes.execution_result {
        ctx.insert("result".into(), result.clone());
        if let Value::Object(fields) = result {
            for (k, v) in fields {
                ctx.insert(k.clone(), v.clone());
            }
        }
    }

    let states: Map<String, Value> = snapshot
        .entities()
        .map(|(id, st)| {
            (
                id.to_string(),
                json!({ "state": st.state, "attributes": st.attributes }),
            )
        })
        .collect();
    ctx.insert("states".into(), Value::Object(states));
    ctx.insert(
        "now".into(),
        json!(Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
    );
    ctx.insert("utc_now".into(), json!(Utc::now().to_rfc3339()));
    Value::Object(ctx)
}

struct Renderer<'a> {
    patterns: &'a Patterns,
    snapshot: &'a Snapshot,
}

impl Renderer<'_> {
    fn render(&self, template: &str, context: &Value) -> String {
        let looped = self.patterns.for_block.replace_all(template, |caps: &Captures| {
            let Some(items) = lookup(context, caps[2].trim()) else {
                return String::new();
            };
            let items: Vec<Value> = match items {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map.keys().map(|k| json!(k)).collect(),
                _ => return String::new(),
            };
            items
                .into_iter()
                .map(|item| {
                    let mut scoped = context.clone();
                    if let Value::Object(map) = &mut scoped {
                        map.insert(caps[1].to_string(), item);
                    }
                    self.render(&caps[3], &scoped)
                })
                .collect::<String>()
        });

        let conditioned = self.patterns.if_block.replace_all(&looped, |caps: &Captures| {
            if self.condition(caps[1].trim(), context) {
                caps[2].to_string()
            } else {
                String::new()
            }
        });

        self.patterns
            .expression
            .replace_all(&conditioned, |caps: &Captures| {
                let expr = caps[1].trim();
                self.expression(expr, context)
                    .unwrap_or_else(|| format!("{{{{ {expr} }}}}"))
            })
            .into_owned()
    }

    fn expression(&self, expr: &str, context: &Value) -> Option<String> {
        if let Some(call) = self.patterns.call.captures(expr) {
            let name = &call[1];
            let args = parse_args(&call[2], context);
            let out = self.call(name, &args);
            if out.is_none() {
                warn!(function = %name, "template function call failed");
            }
            return out.map(|v| format_value(&v));
        }
        lookup(context, expr).map(format_value)
    }

    fn call(&self, name: &str, args: &[Value]) -> Option<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
        match name {
            "now" => Some(json!(Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())),
            "format_date" => {
                let text = display(&arg(0));
                if text.is_empty() {
                    return Some(json!(""));
                }
                let fmt = match arg(1) {
                    Value::String(f) => f,
                    _ => "%Y-%m-%d %H:%M:%S".to_string(),
                };
                let parsed = DateTime::parse_from_rfc3339(&text)
                    .map(|d| d.naive_local())
                    .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f"))
                    .ok()?;
                Some(json!(parsed.format(&fmt).to_string()))
            }
            "upper" => Some(json!(display(&arg(0)).to_uppercase())),
            "lower" => Some(json!(display(&arg(0)).to_lowercase())),
            "length" => Some(json!(match arg(0) {
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                Value::String(s) => s.chars().count(),
                _ => 0,
            })),
            "round" => {
                let n = number(&arg(0))?;
                let digits = args.get(1).and_then(number).unwrap_or(0.0) as i32;
                let scale = 10f64.powi(digits);
                let rounded = (n * scale).round() / scale;
                Some(if digits <= 0 { json!(rounded as i64) } else { json!(rounded) })
            }
            "json" => Some(json!(arg(0).to_string())),
            "default" => Some(match arg(0) {
                Value::Null => arg(1),
                v => v,
            }),
            "state" => Some(
                self.snapshot
                    .get(&display(&arg(0)))
                    .map(|st| json!(st.state))
                    .unwrap_or(Value::Null),
            ),
            "attr" => Some(
                self.snapshot
                    .get(&display(&arg(0)))
                    .and_then(|st| st.attributes.get(&display(&arg(1))).cloned())
                    .unwrap_or(Value::Null),
            ),
            _ => None,
        }
    }

    fn condition(&self, cond: &str, context: &Value) -> bool {
        for op in [" == ", " != ", " > ", " < "] {
            if let Some((left, right)) = cond.split_once(op) {
                let l = operand(left.trim(), context);
                let r = operand(right.trim(), context);
                return match op {
                    " == " => display(&l) == display(&r),
                    " != " => display(&l) != display(&r),
                    " > " => matches!((number(&l), number(&r)), (Some(a), Some(b)) if a > b),
                    _ => matches!((number(&l), number(&r)), (Some(a), Some(b)) if a < b),
                };
            }
        }
        lookup(context, cond).is_some_and(truthy)
    }
}

/// Dotted path lookup. `None` when any segment is missing.
fn lookup<'v>(context: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(context, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn literal(token: &str) -> Option<Value> {
    let quoted = token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"'))
            || (token.starts_with('\'') && token.ends_with('\'')));
    if quoted {
        return Some(Value::String(token[1..token.len() - 1].to_string()));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(json!(i));
    }
    token.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| json!(f))
}

fn operand(token: &str, context: &Value) -> Value {
    literal(token)
        .or_else(|| lookup(context, token).cloned())
        .unwrap_or_else(|| json!(token))
}

fn parse_args(raw: &str, context: &Value) -> Vec<Value> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|arg| operand(arg.trim(), context)).collect()
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Output formatting: null is empty, strings raw, containers as JSON.
pub fn format_value(value: &Value) -> String {
    display(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{SnapshotProvider, StaticSnapshotProvider};

    fn snapshot() -> Snapshot {
        StaticSnapshotProvider::from_pairs([("sun.sun", "above_horizon")]).read_all()
    }

    fn render(template: &str, ctx: Value) -> String {
        render_html(template, &ctx, &snapshot())
    }

    #[test]
    fn substitutes_paths_and_keeps_unknowns() {
        let ctx = json!({ "result": { "temp": 21.5, "ok": true }, "name": "hall" });
        assert_eq!(
            render("<b>{{ name }}</b> {{result.temp}} {{ result.ok }} {{ missing.x }}", ctx),
            "<b>hall</b> 21.5 true {{ missing.x }}"
        );
    }

    #[test]
    fn empty_template_has_placeholder() {
        assert_eq!(render("  ", json!({})), EMPTY_TEMPLATE_HTML);
    }

    #[test]
    fn conditionals() {
        let ctx = json!({ "count": 4, "mode": "eco", "items": [] });
        assert_eq!(render("{% if count > 3 %}many{% endif %}", ctx.clone()), "many");
        assert_eq!(render("{% if mode == 'eco' %}green{% endif %}", ctx.clone()), "green");
        assert_eq!(render("{% if mode != \"eco\" %}x{% endif %}", ctx.clone()), "");
        assert_eq!(render("{% if items %}has{% endif %}", ctx.clone()), "");
        assert_eq!(render("{% if nope %}x{% endif %}done", ctx), "done");
    }

    #[test]
    fn loops_bind_the_item() {
        let ctx = json!({ "lights": [{ "id": "a", "on": true }, { "id": "b", "on": false }] });
        assert_eq!(
            render("{% for l in lights %}[{{ l.id }}{% if l.on %}*{% endif %}]{% endfor %}", ctx),
            "[a*][b]"
        );
    }

    #[test]
    fn functions() {
        let ctx = json!({ "name": "Hall", "xs": [1, 2, 3], "temp": 21.456, "none": null });
        assert_eq!(render("{{ upper(name) }} {{ lower('ABC') }}", ctx.clone()), "HALL abc");
        assert_eq!(render("{{ length(xs) }} {{ round(temp, 1) }} {{ round(temp) }}", ctx.clone()), "3 21.5 21");
        assert_eq!(render("{{ default(none, 'n/a') }} {{ json(xs) }}", ctx.clone()), "n/a [1,2,3]");
        assert_eq!(render("{{ state('sun.sun') }}|{{ state('sun.moon') }}", ctx.clone()), "above_horizon|");
        assert_eq!(render("{{ format_date('2024-05-01T10:20:30', '%d/%m') }}", ctx.clone()), "01/05");
        assert_eq!(render("{{ frobnicate(name) }}", ctx), "{{ frobnicate(name) }}");
    }
}
