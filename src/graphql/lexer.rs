//! Tokenizer shared by the SDL and operation parsers.
//! Commas are insignificant in GraphQL and are skipped like whitespace.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
    Spread,
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Name(n) => write!(f, "name '{}'", n),
            Tok::Int(i) => write!(f, "int {}", i),
            Tok::Float(x) => write!(f, "float {}", x),
            Tok::Str(_) => f.write_str("string"),
            Tok::Punct(c) => write!(f, "'{}'", c),
            Tok::Spread => f.write_str("'...'"),
            Tok::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn error(self, message: impl Into<String>) -> SyntaxError {
        SyntaxError { message: message.into(), line: self.line, column: self.column }
    }
}

pub fn tokenize(src: &str) -> Result<Vec<(Tok, Pos)>, SyntaxError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut line_start = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let pos = Pos { line, column: i - line_start + 1 };
        match c {
            '\n' => { i += 1; line += 1; line_start = i; }
            ' ' | '\t' | '\r' | ',' | '\u{feff}' => { i += 1; }
            '#' => {
                while i < chars.len() && chars[i] != '\n' { i += 1; }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '!' | '=' | '$' | '@' | '|' | '&' => {
                out.push((Tok::Punct(c), pos));
                i += 1;
            }
            '.' => {
                if i + 2 < chars.len() && chars[i + 1] == '.' && chars[i + 2] == '.' {
                    out.push((Tok::Spread, pos));
                    i += 3;
                } else {
                    return Err(pos.error("unexpected '.'"));
                }
            }
            '"' => {
                if i + 2 < chars.len() && chars[i + 1] == '"' && chars[i + 2] == '"' {
                    let start = i + 3;
                    let mut j = start;
                    loop {
                        if j + 2 >= chars.len() {
                            return Err(pos.error("unterminated block string"));
                        }
                        if chars[j] == '"' && chars[j + 1] == '"' && chars[j + 2] == '"' { break; }
                        if chars[j] == '\n' { line += 1; line_start = j + 1; }
                        j += 1;
                    }
                    let text: String = chars[start..j].iter().collect();
                    out.push((Tok::Str(text.trim().to_string()), pos));
                    i = j + 3;
                } else {
                    let (s, next) = lex_string(&chars, i + 1, pos)?;
                    out.push((Tok::Str(s), pos));
                    i = next;
                }
            }
            c if c == '-' || c.is_ascii_digit() => {
                let start = i;
                i += 1;
                let mut is_float = false;
                while i < chars.len() {
                    let d = chars[i];
                    if d.is_ascii_digit() { i += 1; continue; }
                    if d == '.' || d == 'e' || d == 'E' {
                        is_float = true;
                        i += 1;
                        if i < chars.len() && (chars[i] == '+' || chars[i] == '-') { i += 1; }
                        continue;
                    }
                    break;
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let v = text.parse::<f64>().map_err(|_| pos.error(format!("invalid number '{}'", text)))?;
                    out.push((Tok::Float(v), pos));
                } else {
                    let v = text.parse::<i64>().map_err(|_| pos.error(format!("invalid number '{}'", text)))?;
                    out.push((Tok::Int(v), pos));
                }
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i] == '_' || chars[i].is_ascii_alphanumeric()) { i += 1; }
                out.push((Tok::Name(chars[start..i].iter().collect()), pos));
            }
            other => return Err(pos.error(format!("unexpected character '{}'", other))),
        }
    }
    out.push((Tok::Eof, Pos { line, column: i - line_start + 1 }));
    Ok(out)
}

fn lex_string(chars: &[char], mut i: usize, pos: Pos) -> Result<(String, usize), SyntaxError> {
    let mut s = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((s, i + 1)),
            '\n' => break,
            '\\' => {
                let esc = *chars.get(i + 1).ok_or_else(|| pos.error("unterminated string"))?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    '/' => s.push('/'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'n' => s.push('\n'),
                    'r' => s.push('\r'),
                    't' => s.push('\t'),
                    'u' => {
                        let hex: String = chars.get(i + 2..i + 6).ok_or_else(|| pos.error("bad unicode escape"))?.iter().collect();
                        let code = u32::from_str_radix(&hex, 16).map_err(|_| pos.error("bad unicode escape"))?;
                        s.push(char::from_u32(code).ok_or_else(|| pos.error("bad unicode escape"))?);
                        i += 4;
                    }
                    other => return Err(pos.error(format!("invalid escape '\\{}'", other))),
                }
                i += 2;
            }
            c => { s.push(c); i += 1; }
        }
    }
    Err(pos.error("unterminated string"))
}

/// Cursor over a token stream with the expect/peek helpers both parsers use.
/// Nesting limit for selection sets, list and object values, and wrapped types.
pub const MAX_DEPTH: usize = 64;

pub struct Cursor {
    toks: Vec<(Tok, Pos)>,
    idx: usize,
    depth: usize,
}

impl Cursor {
    pub fn new(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self { toks: tokenize(src)?, idx: 0, depth: 0 })
    }

    pub fn peek(&self) -> &Tok { &self.toks[self.idx].0 }

    pub fn peek_at(&self, n: usize) -> &Tok {
        let i = (self.idx + n).min(self.toks.len() - 1);
        &self.toks[i].0
    }

    pub fn pos(&self) -> Pos { self.toks[self.idx].1 }

    pub fn at_end(&self) -> bool { matches!(self.peek(), Tok::Eof) }

    pub fn next(&mut self) -> Tok {
        let t = self.toks[self.idx].0.clone();
        if self.idx < self.toks.len() - 1 { self.idx += 1; }
        t
    }

    pub fn is_punct(&self, c: char) -> bool { matches!(self.peek(), Tok::Punct(p) if *p == c) }

    pub fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) { self.next(); true } else { false }
    }

    pub fn expect_punct(&mut self, c: char) -> Result<(), SyntaxError> {
        if self.eat_punct(c) { return Ok(()); }
        Err(self.unexpected(&format!("'{}'", c)))
    }

    pub fn is_name(&self, name: &str) -> bool { matches!(self.peek(), Tok::Name(n) if n == name) }

    pub fn expect_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            Tok::Name(n) => { self.next(); Ok(n) }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// Enter one nesting level. Parsers call this before recursing.
    pub fn descend(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.pos().error(format!("nesting exceeds {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ascend(&mut self) { self.depth = self.depth.saturating_sub(1); }

    pub fn unexpected(&self, wanted: &str) -> SyntaxError {
        self.pos().error(format!("expected {}, found {}", wanted, self.peek()))
    }
}
