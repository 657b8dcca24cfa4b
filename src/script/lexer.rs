// src/script/lexer.rs

//! Tokenizer for the normalized dialect.

use crate::errors::ExecutionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    /// Interpolated string `f"..."`, already split into pieces.
    FStr(Vec<FPiece>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPiece {
    Text(String),
    /// Raw source of a `{ ... }` substitution; parsed separately.
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    /// A line break precedes this token.
    pub newline_before: bool,
}

/// Longest first so that `**=` wins over `**` and `*`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "**=", "...", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "**", "=>", "(", ")", "[", "]", "{", "}", ",", ";", ":", ".", "?", "=",
    "<", ">", "+", "-", "*", "/", "%", "!", "|", "&",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExecutionError> {
    Lexer::new(src).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl std::fmt::Display) -> ExecutionError {
        ExecutionError::syntax(format!("{message} (line {})", self.line))
    }

    fn run(mut self) -> Result<Vec<Token>, ExecutionError> {
        let mut out = Vec::new();
        loop {
            let newline_before = self.skip_trivia();
            let line = self.line;
            let Some(c) = self.peek(0) else {
                out.push(Token { tok: Tok::Eof, line, newline_before: true });
                return Ok(out);
            };

            let tok = if c == 'f' && self.peek(1) == Some('"') {
                self.pos += 2;
                Tok::FStr(self.fstring()?)
            } else if is_ident_start(c) {
                Tok::Ident(self.ident())
            } else if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
                Tok::Number(self.number()?)
            } else if c == '"' || c == '\'' || c == '`' {
                self.pos += 1;
                Tok::Str(self.string(c)?)
            } else {
                Tok::Punct(self.punct()?)
            };
            out.push(Token { tok, line, newline_before });
        }
    }

    /// Skip whitespace and comments; report whether a newline was crossed.
    fn skip_trivia(&mut self) -> bool {
        let mut newline = false;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                newline = true;
                self.line += 1;
                self.pos += 1;
            } else if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek(1) == Some('/') {
                while self.peek(0).is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            } else if c == '/' && self.peek(1) == Some('*') {
                self.pos += 2;
                while let Some(c) = self.peek(0) {
                    if c == '*' && self.peek(1) == Some('/') {
                        self.pos += 2;
                        break;
                    }
                    if c == '\n' {
                        newline = true;
                        self.line += 1;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        newline
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn number(&mut self) -> Result<f64, ExecutionError> {
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            return u64::from_str_radix(&digits, 16)
                .map(|n| n as f64)
                .map_err(|_| self.error("Invalid hexadecimal literal"));
        }

        while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') && self.peek(1).is_none_or(|c| c.is_ascii_digit()) {
            self.pos += 1;
            while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        text.parse::<f64>()
            .map_err(|_| self.error(format!("Invalid number literal '{text}'")))
    }

    /// Quoted string body; the opening quote is already consumed.
    fn string(&mut self, quote: char) -> Result<String, ExecutionError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error("Unterminated string literal"));
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => self.escape(&mut out)?,
                '\n' if quote != '`' => return Err(self.error("Unterminated string literal")),
                '\n' => {
                    self.line += 1;
                    out.push('\n');
                }
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), ExecutionError> {
        let Some(c) = self.peek(0) else {
            return Err(self.error("Unterminated string literal"));
        };
        self.pos += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            'u' => {
                let code = if self.peek(0) == Some('{') {
                    self.pos += 1;
                    let start = self.pos;
                    while self.peek(0).is_some_and(|c| c != '}') {
                        self.pos += 1;
                    }
                    let digits: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1;
                    u32::from_str_radix(&digits, 16).map_err(|_| self.error("Invalid unicode escape"))?
                } else {
                    self.hex_digits(4)?
                };
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            '\n' => self.line += 1,
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, ExecutionError> {
        let end = (self.pos + count).min(self.chars.len());
        let digits: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&digits, 16).map_err(|_| self.error("Invalid escape sequence"))
    }

    /// Body of `f"..."`; the prefix and opening quote are already consumed.
    fn fstring(&mut self) -> Result<Vec<FPiece>, ExecutionError> {
        let mut pieces = Vec::new();
        let mut text = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error("Unterminated interpolated string"));
            };
            self.pos += 1;
            match c {
                '"' => break,
                '\\' => self.escape(&mut text)?,
                '{' if self.peek(0) == Some('{') => {
                    self.pos += 1;
                    text.push('{');
                }
                '}' if self.peek(0) == Some('}') => {
                    self.pos += 1;
                    text.push('}');
                }
                '{' => {
                    if !text.is_empty() {
                        pieces.push(FPiece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(FPiece::Expr(self.substitution()?));
                }
                '\n' => {
                    self.line += 1;
                    text.push('\n');
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            pieces.push(FPiece::Text(text));
        }
        Ok(pieces)
    }

    /// Source of one `{ ... }` substitution, aware of nested braces and quotes.
    fn substitution(&mut self) -> Result<String, ExecutionError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek(0) {
            match c {
                '}' if depth == 0 => {
                    let src: String = self.chars[start..self.pos].iter().collect();
                    self.pos += 1;
                    return Ok(src);
                }
                '{' => depth += 1,
                '}' => depth -= 1,
                '"' | '\'' => {
                    self.pos += 1;
                    while let Some(q) = self.peek(0) {
                        self.pos += 1;
                        if q == '\\' {
                            self.pos += 1;
                        } else if q == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error("Unterminated substitution in interpolated string"))
    }

    fn punct(&mut self) -> Result<&'static str, ExecutionError> {
        for p in PUNCTUATORS {
            let len = p.chars().count();
            if self.chars.len() - self.pos >= len
                && p.chars().zip(&self.chars[self.pos..]).all(|(a, b)| a == *b)
            {
                if *p == "?." && self.peek(2).is_some_and(|c| c.is_ascii_digit()) {
                    continue;
                }
                self.pos += len;
                return Ok(match *p {
                    "===" => "==",
                    "!==" => "!=",
                    other => other,
                });
            }
        }
        let c = self.peek(0).unwrap_or(' ');
        Err(self.error(format!("Unexpected character '{c}'")))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn basic_tokens() {
        assert_eq!(
            toks("x = 1.5 ** 2;"),
            vec![
                Tok::Ident("x".into()),
                Tok::Punct("="),
                Tok::Number(1.5),
                Tok::Punct("**"),
                Tok::Number(2.0),
                Tok::Punct(";"),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn strict_equality_lexes_as_loose() {
        assert_eq!(toks("a === b")[1], Tok::Punct("=="));
        assert_eq!(toks("a !== b")[1], Tok::Punct("!="));
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(toks(r#"'it\'s' "a\nb""#)[..2], [Tok::Str("it's".into()), Tok::Str("a\nb".into())]);
    }

    #[test]
    fn interpolated_strings_split_into_pieces() {
        assert_eq!(
            toks(r#"f"{{x}} is {get(a, "b")}!""#)[0],
            Tok::FStr(vec![
                FPiece::Text("{x} is ".into()),
                FPiece::Expr("get(a, \"b\")".into()),
                FPiece::Text("!".into()),
            ])
        );
    }

    #[test]
    fn newlines_are_tracked() {
        let tokens = tokenize("a\n// note\nb").unwrap();
        assert_eq!(tokens[1].line, 3);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("'abc").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SyntaxError);
    }
}
