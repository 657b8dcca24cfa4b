// src/transpile/mod.rs

//! Syntax adapter.
//!
//! User scripts are written in a small JavaScript-like surface syntax.
//! [`normalize`] turns them into the form the selected backend evaluates:
//!
//! - [`Dialect::Native`]: the restricted evaluator's dialect. Runs the full
//!   ordered rule pipeline:
//!   1. strip declaration keywords
//!   2. normalize literal keywords (`undefined` -> `null`)
//!   3. collapse `===`/`!==` into `==`/`!=`
//!   4. arrows -> closures
//!   5. template literals -> interpolated strings
//!   6. optional chaining -> null-safe `get(...)`
//!   7. iteration method names
//!   8. implicit return for single-expression scripts
//! - [`Dialect::JavaScript`]: the full-language backends. Equality is made
//!   strict (`==` becomes `===`, null checks become `== null`), inside
//!   template substitutions too, then the implicit-return rewrite runs.
//!
//! `normalize` is total. Anything the rules don't recognize passes through
//! and is rejected later by the evaluator as a syntax error.

mod mask;
mod rules;

use mask::{mask, Literal, Masked};

/// Target of normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Native,
    JavaScript,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCode {
    pub dialect: Dialect,
    pub source: String,
    /// Whether the script was wrapped in an implicit `return`.
    pub implicit_return: bool,
}

impl NormalizedCode {
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Normalize `source` for the given dialect.
pub fn normalize(source: &str, dialect: Dialect) -> NormalizedCode {
    let mut masked = mask(source.trim());

    match dialect {
        Dialect::Native => apply_expression_rules(&mut masked),
        Dialect::JavaScript => apply_javascript_rules(&mut masked),
    }

    let implicit_return = rules::needs_implicit_return(&masked);
    rules::wrap_implicit_return(&mut masked);

    let source = masked.unmask(render_literal);

    NormalizedCode {
        dialect,
        source,
        implicit_return,
    }
}

/// Rules 1-7, in order.
fn apply_expression_rules(masked: &mut Masked) {
    rules::strip_declarations(masked);
    rules::normalize_literals(masked);
    rules::normalize_equality(masked);
    rules::rewrite_arrows(masked);
    rules::rewrite_templates(masked, normalize_fragment);
    rules::rewrite_optional_chaining(masked);
    rules::map_iteration_methods(masked);
}

/// Normalize a template substitution: rules 1-7, no implicit return.
fn normalize_fragment(src: &str) -> String {
    let mut masked = mask(src);
    apply_expression_rules(&mut masked);
    masked.unmask(render_literal)
}

fn apply_javascript_rules(masked: &mut Masked) {
    rules::strict_equality(masked);
    rules::rewrite_template_substitutions(masked, normalize_javascript_fragment);
}

fn normalize_javascript_fragment(src: &str) -> String {
    let mut masked = mask(src);
    apply_javascript_rules(&mut masked);
    masked.unmask(render_literal)
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Str(s) => s.clone(),
        Literal::Template { raw, .. } => raw.clone(),
    }
}
