// src/transpile/rules.rs

//! Individual rewrite rules.
//!
//! Each rule is a pure `&mut Masked -> ()` transform over masked code (see
//! [`super::mask`]), so literal contents are never touched. Rules are listed
//! in pipeline order; later rules rely on earlier ones having run.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::mask::{Literal, Masked, TemplatePart, CLOSE, OPEN};

struct Patterns {
    declaration: Regex,
    undefined: Regex,
    paren_arrow: Regex,
    bare_arrow: Regex,
    iteration_method: Regex,
    return_keyword: Regex,
    control_flow: Regex,
    nullish_right: Regex,
    nullish_left: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            declaration: Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)")?,
            undefined: Regex::new(r"\bundefined\b")?,
            paren_arrow: Regex::new(
                r"\(\s*([A-Za-z_$][\w$]*(?:\s*,\s*[A-Za-z_$][\w$]*)*)?\s*\)\s*=>",
            )?,
            bare_arrow: Regex::new(r"([A-Za-z_$][\w$]*)\s*=>")?,
            iteration_method: Regex::new(r"\.(forEach|some|every|map|filter|find)\s*\(")?,
            return_keyword: Regex::new(r"\breturn\b")?,
            control_flow: Regex::new(
                r"\b(?:if|else|for|while|do|switch|try|catch|function|throw|break|continue)\b",
            )?,
            nullish_right: Regex::new(r"(===|!==)\s*(?:null|undefined)\b")?,
            nullish_left: Regex::new(r"\b(?:null|undefined)\s*(===|!==)")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// The compiled rule patterns; rules that need them become no-ops otherwise.
fn patterns() -> Option<&'static Patterns> {
    match &*PATTERNS {
        Ok(p) => Some(p),
        Err(err) => {
            warn!(error = %err, "rewrite patterns unavailable");
            None
        }
    }
}

/// 1. Drop `const` / `let` / `var`; the evaluator declares on first assignment.
pub(crate) fn strip_declarations(m: &mut Masked) {
    let Some(p) = patterns() else { return };
    m.code = p.declaration.replace_all(&m.code, "${1}").into_owned();
}

/// 2. `undefined` becomes `null`; `true` / `false` / `null` are already native.
pub(crate) fn normalize_literals(m: &mut Masked) {
    let Some(p) = patterns() else { return };
    m.code = p.undefined.replace_all(&m.code, "null").into_owned();
}

/// 3. Strict and loose (in)equality are the same operator.
pub(crate) fn normalize_equality(m: &mut Masked) {
    m.code = m.code.replace("!==", "!=").replace("===", "==");
}

/// 3 (JavaScript). Both equality spellings become strict, so `==` never
/// coerces. Comparisons against `null` / `undefined` become `== null`, which
/// matches either one the same way the native evaluator does.
pub(crate) fn strict_equality(m: &mut Masked) {
    let Some(p) = patterns() else { return };
    let code = m
        .code
        .replace("!==", "!=")
        .replace("===", "==")
        .replace("==", "===")
        .replace("!=", "!==");
    let code = p.nullish_right.replace_all(&code, |caps: &regex::Captures<'_>| {
        if caps[1].starts_with('!') { "!= null" } else { "== null" }
    });
    m.code = p
        .nullish_left
        .replace_all(&code, |caps: &regex::Captures<'_>| {
            if caps[1].starts_with('!') { "null !=" } else { "null ==" }
        })
        .into_owned();
}

/// 5 (JavaScript). Template literals stay templates; only their
/// substitutions are rewritten. Unterminated templates are left alone.
pub(crate) fn rewrite_template_substitutions(m: &mut Masked, normalize_expr: impl Fn(&str) -> String) {
    for lit in m.literals.iter_mut() {
        let Literal::Template { raw, parts } = lit else {
            continue;
        };
        if *raw != render_template(parts, |src| src.to_string()) {
            continue;
        }
        *raw = render_template(parts, &normalize_expr);
    }
}

fn render_template(parts: &[TemplatePart], expr: impl Fn(&str) -> String) -> String {
    let mut out = String::from("`");
    for part in parts {
        match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Expr(src) => {
                out.push_str("${");
                out.push_str(&expr(src));
                out.push('}');
            }
        }
    }
    out.push('`');
    out
}

/// 4. `x => ...` and `(a, b) => ...` become closures `|x| ...` / `|a, b| ...`.
pub(crate) fn rewrite_arrows(m: &mut Masked) {
    let Some(p) = patterns() else { return };
    let code = p.paren_arrow.replace_all(&m.code, |caps: &regex::Captures<'_>| {
        let params = caps.get(1).map(|p| p.as_str()).unwrap_or("");
        let params: Vec<&str> = params.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        format!("|{}|", params.join(", "))
    });
    m.code = p.bare_arrow.replace_all(&code, "|${1}|").into_owned();
}

/// 5. Template literals become interpolated strings `f"text {expr}"`.
///
/// Substitution sources are normalized through rules 1-7 on their own.
pub(crate) fn rewrite_templates(m: &mut Masked, normalize_expr: impl Fn(&str) -> String) {
    for lit in m.literals.iter_mut() {
        let Literal::Template { parts, .. } = lit else {
            continue;
        };
        let mut out = String::from("f\"");
        for part in parts.iter() {
            match part {
                TemplatePart::Text(text) => out.push_str(&escape_template_text(text)),
                TemplatePart::Expr(src) => {
                    out.push('{');
                    out.push_str(normalize_expr(src).trim());
                    out.push('}');
                }
            }
        }
        out.push('"');
        *lit = Literal::Str(out);
    }
}

fn escape_template_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('`') => out.push('`'),
                Some('$') => out.push('$'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            c => out.push(c),
        }
    }
    out
}

/// 6. `a?.b` becomes `get(a, "b")`, which is null when `a` is falsy.
///
/// `a?.[k]` becomes `get(a, k)` and the optional call `f?.(x)` is reduced to
/// a plain call. Chains are rewritten left to right until no `?.` is left.
pub(crate) fn rewrite_optional_chaining(m: &mut Masked) {
    loop {
        let chars: Vec<char> = m.code.chars().collect();
        let Some(pos) = find_optional_dot(&chars) else {
            break;
        };

        let start = operand_start(&chars, pos);
        let operand: String = chars[start..pos].iter().collect();
        let after = pos + 2;

        let (replacement, end) = match chars.get(after) {
            Some(c) if is_ident_start(*c) => {
                let mut end = after;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[after..end].iter().collect();
                let key = m.push(Literal::Str(format!("\"{name}\"")));
                (format!("get({}, {key})", operand.trim()), end)
            }
            Some('[') => {
                let close = matching_forward(&chars, after);
                let key: String = chars[(after + 1).min(close)..close].iter().collect();
                (format!("get({}, {})", operand.trim(), key.trim()), (close + 1).min(chars.len()))
            }
            _ => (operand.clone(), after),
        };

        let mut code: String = chars[..start].iter().collect();
        code.push_str(&replacement);
        code.extend(chars[end..].iter());
        m.code = code;
    }
}

fn find_optional_dot(chars: &[char]) -> Option<usize> {
    (0..chars.len().saturating_sub(1)).find(|&i| {
        chars[i] == '?'
            && chars[i + 1] == '.'
            && !chars.get(i + 2).is_some_and(|c| c.is_ascii_digit())
    })
}

/// Walk back from `end` over one member/call/index chain.
fn operand_start(chars: &[char], end: usize) -> usize {
    let mut i = end;
    while i > 0 {
        let c = chars[i - 1];
        if c == ')' || c == ']' {
            i = matching_backward(chars, i - 1);
        } else if c == CLOSE {
            while i > 0 && chars[i - 1] != OPEN {
                i -= 1;
            }
            i = i.saturating_sub(1);
        } else if is_ident_char(c) || c == '.' {
            i -= 1;
        } else {
            break;
        }
    }
    i
}

fn matching_backward(chars: &[char], close_at: usize) -> usize {
    let (open, close) = if chars[close_at] == ')' { ('(', ')') } else { ('[', ']') };
    let mut depth = 0usize;
    let mut i = close_at + 1;
    while i > 0 {
        i -= 1;
        if chars[i] == close {
            depth += 1;
        } else if chars[i] == open {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
    }
    0
}

fn matching_forward(chars: &[char], open_at: usize) -> usize {
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(open_at) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// 7. Iteration methods map onto the evaluator's collection operations.
pub(crate) fn map_iteration_methods(m: &mut Masked) {
    let Some(p) = patterns() else { return };
    m.code = p
        .iteration_method
        .replace_all(&m.code, |caps: &regex::Captures<'_>| {
            let target = match &caps[1] {
                "forEach" => "for_each",
                "some" => "any",
                "every" => "all",
                other => other,
            };
            format!(".{target}(")
        })
        .into_owned();
}

/// Whether the script should get an implicit `return`.
///
/// True for a non-empty single-line, single-statement script that has no
/// `return` and no control-flow keyword.
pub(crate) fn needs_implicit_return(m: &Masked) -> bool {
    let Some(p) = patterns() else { return false };
    let code = m.code.trim().trim_end_matches(';').trim();
    !code.is_empty()
        && !code.contains('\n')
        && !code.contains(';')
        && !p.return_keyword.is_match(code)
        && !p.control_flow.is_match(code)
}

/// 8. Wrap a single-expression script so its value is returned.
pub(crate) fn wrap_implicit_return(m: &mut Masked) {
    if needs_implicit_return(m) {
        let expr = m.code.trim().trim_end_matches(';').trim().to_string();
        m.code = format!("return ({expr});");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpile::mask::mask;

    fn apply(src: &str, rule: fn(&mut Masked)) -> String {
        let mut m = mask(src);
        rule(&mut m);
        m.unmask(|lit| match lit {
            Literal::Str(s) => s.clone(),
            Literal::Template { raw, .. } => raw.clone(),
        })
    }

    #[test]
    fn declarations_are_stripped_outside_strings() {
        assert_eq!(
            apply("const a = 1; let b = 'let c'", strip_declarations),
            "a = 1; b = 'let c'"
        );
        assert_eq!(apply("for (const x of xs) {}", strip_declarations), "for (x of xs) {}");
    }

    #[test]
    fn undefined_becomes_null() {
        assert_eq!(apply("x == undefined", normalize_literals), "x == null");
        assert_eq!(apply("undefinedValue", normalize_literals), "undefinedValue");
    }

    #[test]
    fn strict_equality_collapses() {
        assert_eq!(apply("a === b && c !== d", normalize_equality), "a == b && c != d");
    }

    #[test]
    fn arrows_become_closures() {
        assert_eq!(apply("xs.map(x => x * 2)", rewrite_arrows), "xs.map(|x| x * 2)");
        assert_eq!(apply("xs.reduce((a, b) => a + b, 0)", rewrite_arrows), "xs.reduce(|a, b| a + b, 0)");
        assert_eq!(apply("run(() => 1)", rewrite_arrows), "run(|| 1)");
    }

    #[test]
    fn optional_chaining_becomes_get() {
        assert_eq!(apply("a?.b", rewrite_optional_chaining), "get(a, \"b\")");
        assert_eq!(
            apply("states['x']?.attributes?.unit", rewrite_optional_chaining),
            "get(get(states['x'], \"attributes\"), \"unit\")"
        );
        assert_eq!(apply("a?.[k]", rewrite_optional_chaining), "get(a, k)");
        assert_eq!(apply("c ?.5 : 1", rewrite_optional_chaining), "c ?.5 : 1");
    }

    #[test]
    fn iteration_methods_are_renamed() {
        assert_eq!(
            apply("xs.forEach(f); xs.some(g); xs.map(h)", map_iteration_methods),
            "xs.for_each(f); xs.any(g); xs.map(h)"
        );
    }

    #[test]
    fn implicit_return_only_for_single_expressions() {
        assert_eq!(apply("1 + 2;", wrap_implicit_return), "return (1 + 2);");
        assert_eq!(apply("return 1", wrap_implicit_return), "return 1");
        assert_eq!(apply("a = 1\nb = 2", wrap_implicit_return), "a = 1\nb = 2");
        assert_eq!(apply("if (a) b", wrap_implicit_return), "if (a) b");
        assert_eq!(apply("f(); g()", wrap_implicit_return), "f(); g()");
        assert_eq!(apply("'return me'", wrap_implicit_return), "return ('return me');");
    }
}
