// src/script/parser.rs

//! Recursive-descent / Pratt parser for the normalized dialect.
//!
//! Semicolons are optional where a line break, `}` or end of input already
//! ends the statement. Nesting is bounded so hostile input cannot exhaust
//! the evaluation thread's stack.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{tokenize, FPiece, Tok, Token};
use super::value::format_number;
use crate::errors::ExecutionError;

const MAX_NESTING: usize = 200;

pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ExecutionError> {
    let mut parser = Parser::new(tokenize(src)?, 0);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self { tokens, pos: 0, depth }
    }

    // ---- token helpers -------------------------------------------------

    fn token(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn peek(&self) -> &Tok {
        &self.token(0).tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.token(0).tok.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(q) if *q == p)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w == word)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ExecutionError {
        let token = self.token(0);
        let what = match &token.tok {
            Tok::Eof => "end of input".to_string(),
            Tok::Number(n) => format!("number {}", format_number(*n)),
            Tok::Str(_) | Tok::FStr(_) => "string".to_string(),
            Tok::Ident(name) => format!("token '{name}'"),
            Tok::Punct(p) => format!("token '{p}'"),
        };
        ExecutionError::syntax(format!("Unexpected {what} (line {})", token.line))
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ExecutionError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Result<String, ExecutionError> {
        match self.peek() {
            Tok::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// End of a simple statement.
    fn end_statement(&mut self) -> Result<(), ExecutionError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.token(0).newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn enter(&mut self) -> Result<(), ExecutionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExecutionError::syntax(format!(
                "Maximum nesting depth exceeded (line {})",
                self.token(0).line
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- statements ----------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ExecutionError> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ExecutionError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }

        let keyword = match self.peek() {
            Tok::Ident(word) => word.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat_keyword("else") {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If(test, then, otherwise))
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                Ok(Stmt::While(test, Box::new(self.statement()?)))
            }
            "do" => {
                self.advance();
                let body = Box::new(self.statement()?);
                if !self.eat_keyword("while") {
                    return Err(self.unexpected());
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile(body, test))
            }
            "for" => self.for_statement(),
            "return" => {
                self.advance();
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.token(0).newline_before
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            "break" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Break)
            }
            "continue" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Continue)
            }
            "throw" => {
                self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.try_statement(),
            "switch" => self.switch_statement(),
            "function" if matches!(self.token(1).tok, Tok::Ident(_)) => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Stmt::Function(self.function_rest(Some(name))?))
            }
            "let" | "const" | "var" if matches!(self.token(1).tok, Tok::Ident(_)) => {
                self.advance();
                let stmt = self.declaration_list()?;
                self.end_statement()?;
                Ok(stmt)
            }
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ExecutionError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    /// `a = 1, b` after a declaration keyword. Uninitialized names are null.
    fn declaration_list(&mut self) -> Result<Stmt, ExecutionError> {
        let mut stmts = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.eat_punct("=") {
                self.assignment()?
            } else {
                Expr::Null
            };
            stmts.push(Stmt::Expr(Expr::Assign(
                Box::new(Expr::Ident(name)),
                None,
                Box::new(value),
            )));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(if stmts.len() == 1 {
            stmts.remove(0)
        } else {
            Stmt::Block(stmts)
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ExecutionError> {
        self.advance();
        self.expect_punct("(")?;

        let declared = matches!(self.peek(), Tok::Ident(w) if matches!(w.as_str(), "let" | "const" | "var"));
        let offset = usize::from(declared);
        if let (Tok::Ident(name), Tok::Ident(kind)) = (&self.token(offset).tok, &self.token(offset + 1).tok)
            && (kind == "of" || kind == "in")
        {
            let name = name.clone();
            let keys = kind == "in";
            self.pos += offset + 2;
            let iterable = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForEach { name, iterable, keys, body });
        }

        let init = if self.is_punct(";") {
            None
        } else if declared {
            self.advance();
            Some(Box::new(self.declaration_list()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") { None } else { Some(self.expression()?) };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") { None } else { Some(self.expression()?) };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, test, update, body })
    }

    fn try_statement(&mut self) -> Result<Stmt, ExecutionError> {
        self.advance();
        let body = self.block()?;
        let catch = if self.eat_keyword("catch") {
            let binding = if self.eat_punct("(") {
                let name = self.expect_ident()?;
                self.expect_punct(")")?;
                Some(name)
            } else {
                None
            };
            Some((binding, self.block()?))
        } else {
            None
        };
        let finally = if self.eat_keyword("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.unexpected());
        }
        Ok(Stmt::Try { body, catch, finally })
    }

    fn switch_statement(&mut self) -> Result<Stmt, ExecutionError> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.expression()?)
            } else if self.eat_keyword("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_keyword("case") && !self.is_keyword("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(Case { test, body });
        }
        Ok(Stmt::Switch(discriminant, cases))
    }

    /// Parameter list and body of a `function`, after its name.
    fn function_rest(&mut self, name: Option<String>) -> Result<Rc<FunctionDef>, ExecutionError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            let name = self.expect_ident()?;
            let default = if self.eat_punct("=") { Some(self.assignment()?) } else { None };
            params.push(Param { name, default });
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        let body = self.block()?;
        Ok(Rc::new(FunctionDef {
            name,
            params: Rc::new(params),
            body: Rc::new(body),
        }))
    }

    // ---- expressions ---------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ExecutionError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ExecutionError> {
        self.enter()?;
        let result = self.assignment_inner();
        self.leave();
        result
    }

    fn assignment_inner(&mut self) -> Result<Expr, ExecutionError> {
        let target = self.conditional()?;
        let op = match self.peek() {
            Tok::Punct("=") => None,
            Tok::Punct("+=") => Some(BinOp::Add),
            Tok::Punct("-=") => Some(BinOp::Sub),
            Tok::Punct("*=") => Some(BinOp::Mul),
            Tok::Punct("/=") => Some(BinOp::Div),
            Tok::Punct("%=") => Some(BinOp::Mod),
            Tok::Punct("**=") => Some(BinOp::Pow),
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(ExecutionError::syntax(format!(
                "Invalid assignment target (line {})",
                self.token(0).line
            )));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign(Box::new(target), op, Box::new(value)))
    }

    fn conditional(&mut self) -> Result<Expr, ExecutionError> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)))
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, ExecutionError> {
        let mut left = self.unary()?;
        loop {
            let Some((prec, op)) = binary_op(self.peek()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is right-associative.
            let next = if matches!(op, Op::Binary(BinOp::Pow)) { prec } else { prec + 1 };
            let right = self.binary(next)?;
            left = match op {
                Op::Binary(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Op::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExecutionError> {
        self.enter()?;
        let result = self.unary_inner();
        self.leave();
        result
    }

    fn unary_inner(&mut self) -> Result<Expr, ExecutionError> {
        let op = match self.peek() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(w) if w == "typeof" => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            return Ok(Expr::Unary(op, Box::new(self.unary()?)));
        }

        if self.is_punct("++") || self.is_punct("--") {
            let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
            self.advance();
            let target = self.unary()?;
            if !is_assignable(&target) {
                return Err(self.unexpected());
            }
            return Ok(Expr::Update { target: Box::new(target), delta, prefix: true });
        }

        // No real concurrency inside scripts: `await x` is just `x`.
        if self.eat_keyword("await") {
            return self.unary();
        }
        // `new X(...)` is a plain call.
        if self.eat_keyword("new") {
            let callee = self.postfix(false)?;
            let args = if self.is_punct("(") { self.arguments()? } else { Vec::new() };
            let call = Expr::Call(Box::new(callee), args);
            return self.postfix_chain(call, true);
        }

        self.postfix(true)
    }

    fn postfix(&mut self, allow_calls: bool) -> Result<Expr, ExecutionError> {
        let primary = self.primary()?;
        self.postfix_chain(primary, allow_calls)
    }

    fn postfix_chain(&mut self, mut expr: Expr, allow_calls: bool) -> Result<Expr, ExecutionError> {
        loop {
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.is_punct("?.") {
                self.advance();
                let key = if self.eat_punct("[") {
                    let key = self.expression()?;
                    self.expect_punct("]")?;
                    key
                } else if self.is_punct("(") {
                    continue;
                } else {
                    Expr::Str(Rc::from(self.property_name()?.as_str()))
                };
                expr = Expr::Call(
                    Box::new(Expr::Ident("get".into())),
                    vec![ArrayItem::Item(expr), ArrayItem::Item(key)],
                );
            } else if self.is_punct("[") {
                self.advance();
                let key = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if allow_calls && self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if (self.is_punct("++") || self.is_punct("--"))
                && !self.token(0).newline_before
                && is_assignable(&expr)
            {
                let delta = if self.is_punct("++") { 1.0 } else { -1.0 };
                self.advance();
                return Ok(Expr::Update { target: Box::new(expr), delta, prefix: false });
            } else {
                return Ok(expr);
            }
        }
    }

    fn property_name(&mut self) -> Result<String, ExecutionError> {
        match self.peek() {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<ArrayItem>, ExecutionError> {
        self.expect_punct("(")?;
        self.items_until(")")
    }

    /// Comma-separated items (with `...spread`) up to and including `close`.
    fn items_until(&mut self, close: &str) -> Result<Vec<ArrayItem>, ExecutionError> {
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            if self.eat_punct("...") {
                items.push(ArrayItem::Spread(self.assignment()?));
            } else {
                items.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ExecutionError> {
        if self.at_eof() {
            return Err(self.unexpected());
        }
        let line = self.token(0).line;
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Number(n)),
            Tok::Str(s) => Ok(Expr::Str(Rc::from(s.as_str()))),
            Tok::FStr(pieces) => self.interpolation(pieces, line),
            Tok::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" | "undefined" => Ok(Expr::Null),
                "function" => {
                    let name = match self.peek() {
                        Tok::Ident(_) => Some(self.expect_ident()?),
                        _ => None,
                    };
                    Ok(Expr::Function(self.function_rest(name)?))
                }
                w if is_reserved(w) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(word)),
            },
            Tok::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => Ok(Expr::Array(self.items_until("]")?)),
            Tok::Punct("{") => self.object_literal(),
            Tok::Punct("|") => {
                let mut params = Vec::new();
                while !self.eat_punct("|") {
                    let name = self.expect_ident()?;
                    let default = if self.eat_punct("=") { Some(self.conditional()?) } else { None };
                    params.push(Param { name, default });
                    if !self.eat_punct(",") {
                        self.expect_punct("|")?;
                        break;
                    }
                }
                self.closure_body(params)
            }
            Tok::Punct("||") => self.closure_body(Vec::new()),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn closure_body(&mut self, params: Vec<Param>) -> Result<Expr, ExecutionError> {
        let body = if self.is_punct("{") {
            self.block()?
        } else {
            vec![Stmt::Return(Some(self.assignment()?))]
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params: Rc::new(params),
            body: Rc::new(body),
        })))
    }

    fn object_literal(&mut self) -> Result<Expr, ExecutionError> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(Prop::Spread(self.assignment()?));
            } else if self.eat_punct("[") {
                let key = self.expression()?;
                self.expect_punct("]")?;
                self.expect_punct(":")?;
                props.push(Prop::Computed(key, self.assignment()?));
            } else {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                let key = match self.advance() {
                    Tok::Ident(name) | Tok::Str(name) => name,
                    Tok::Number(n) => format_number(n),
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                };
                let value = if self.eat_punct(":") {
                    self.assignment()?
                } else if self.is_punct("(") {
                    Expr::Function(self.function_rest(Some(key.clone()))?)
                } else {
                    Expr::Ident(key.clone())
                };
                props.push(Prop::Pair(key, value));
            }
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    fn interpolation(&mut self, pieces: Vec<FPiece>, line: usize) -> Result<Expr, ExecutionError> {
        let mut parts = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece {
                FPiece::Text(text) => parts.push(FStrPart::Text(text)),
                FPiece::Expr(src) => {
                    let mut tokens = tokenize(&src)?;
                    for token in &mut tokens {
                        token.line += line - 1;
                    }
                    let mut inner = Parser::new(tokens, self.depth);
                    let expr = inner.expression()?;
                    if !inner.at_eof() {
                        return Err(inner.unexpected());
                    }
                    parts.push(FStrPart::Expr(expr));
                }
            }
        }
        Ok(Expr::FStr(parts))
    }
}

enum Op {
    Binary(BinOp),
    Logical(LogicalOp),
}

fn binary_op(tok: &Tok) -> Option<(u8, Op)> {
    let entry = match tok {
        Tok::Punct("??") => (1, Op::Logical(LogicalOp::Nullish)),
        Tok::Punct("||") => (2, Op::Logical(LogicalOp::Or)),
        Tok::Punct("&&") => (3, Op::Logical(LogicalOp::And)),
        Tok::Punct("==") => (4, Op::Binary(BinOp::Eq)),
        Tok::Punct("!=") => (4, Op::Binary(BinOp::Ne)),
        Tok::Punct("<") => (5, Op::Binary(BinOp::Lt)),
        Tok::Punct("<=") => (5, Op::Binary(BinOp::Le)),
        Tok::Punct(">") => (5, Op::Binary(BinOp::Gt)),
        Tok::Punct(">=") => (5, Op::Binary(BinOp::Ge)),
        Tok::Ident(w) if w == "in" => (5, Op::Binary(BinOp::In)),
        Tok::Punct("+") => (6, Op::Binary(BinOp::Add)),
        Tok::Punct("-") => (6, Op::Binary(BinOp::Sub)),
        Tok::Punct("*") => (7, Op::Binary(BinOp::Mul)),
        Tok::Punct("/") => (7, Op::Binary(BinOp::Div)),
        Tok::Punct("%") => (7, Op::Binary(BinOp::Mod)),
        Tok::Punct("**") => (8, Op::Binary(BinOp::Pow)),
        _ => return None,
    };
    Some(entry)
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..))
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "if" | "else"
            | "for"
            | "while"
            | "do"
            | "return"
            | "break"
            | "continue"
            | "throw"
            | "try"
            | "catch"
            | "finally"
            | "switch"
            | "case"
            | "default"
            | "function"
            | "let"
            | "const"
            | "var"
            | "new"
            | "typeof"
            | "in"
            | "of"
            | "true"
            | "false"
            | "null"
            | "undefined"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_program(src).unwrap()
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let stmts = parse("return 1 + 2 * 3");
        let Stmt::Return(Some(Expr::Binary(BinOp::Add, _, rhs))) = &stmts[0] else {
            panic!("unexpected tree: {stmts:?}");
        };
        assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn closures_with_expression_and_block_bodies() {
        let stmts = parse("xs.map(|x| x * 2); xs.for_each(|x| { log(x) }); run(|| 1)");
        assert_eq!(stmts.len(), 3);
        let Stmt::Expr(Expr::Call(_, args)) = &stmts[0] else {
            panic!("expected call");
        };
        let ArrayItem::Item(Expr::Function(def)) = &args[0] else {
            panic!("expected closure argument");
        };
        assert_eq!(def.params.len(), 1);
        assert!(matches!(def.body[0], Stmt::Return(Some(_))));
    }

    #[test]
    fn statements_split_on_newlines_without_semicolons() {
        assert_eq!(parse("a = 1\nb = 2\nreturn a + b").len(), 3);
    }

    #[test]
    fn missing_separator_on_one_line_is_rejected() {
        assert!(parse_program("a = 1 b = 2").is_err());
    }

    #[test]
    fn for_of_and_c_style_loops() {
        let stmts = parse("for (x of xs) { total += x }\nfor (i = 0; i < 3; i++) {}");
        assert!(matches!(stmts[0], Stmt::ForEach { keys: false, .. }));
        assert!(matches!(stmts[1], Stmt::For { .. }));
    }

    #[test]
    fn object_literals_support_shorthand_and_spread() {
        let stmts = parse("return { a, b: 2, ...rest, 'c d': 3 }");
        let Stmt::Return(Some(Expr::Object(props))) = &stmts[0] else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 4);
    }

    #[test]
    fn try_requires_catch_or_finally() {
        assert!(parse_program("try { a() }").is_err());
        assert!(parse_program("try { a() } catch (e) { b(e) } finally { c() }").is_ok());
    }

    #[test]
    fn interpolated_string_parts_are_parsed() {
        let stmts = parse(r#"return f"x={x + 1}""#);
        let Stmt::Return(Some(Expr::FStr(parts))) = &stmts[0] else {
            panic!("expected interpolated string");
        };
        assert!(matches!(parts[1], FStrPart::Expr(Expr::Binary(BinOp::Add, _, _))));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let src = format!("return {}1{}", "(".repeat(1000), ")".repeat(1000));
        let err = parse_program(&src).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SyntaxError);
    }

    #[test]
    fn invalid_assignment_target_is_rejected() {
        assert!(parse_program("1 = 2").is_err());
    }
}
