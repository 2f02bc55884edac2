//! Restricted expression engine for the position equation.
//!
//! Supports decimal numbers, the free variable `x`, the constants `pi` and
//! `e`, `+ - * /`, power (`^` or `**`), unary signs, parentheses and a fixed
//! set of elementary functions. Anything else is rejected at parse time, so a
//! parsed equation always evaluates to a number (possibly NaN or infinite).

use std::fmt;

use crate::error::EquationParseError;

/// Name of the single free variable.
pub const FREE_VARIABLE: &str = "x";

/// Deepest accepted nesting of parentheses, calls, signs and powers.
pub const MAX_NESTING: usize = 256;

/// Longest accepted equation, in tokens. Bounds the depth of the
/// evaluated tree for long flat chains like `x+x+...`.
pub const MAX_TOKENS: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Sqrt,
    Abs,
    Floor,
    Ceil,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "exp" => Func::Exp,
            // natural logarithm under both spellings
            "ln" | "log" => Func::Ln,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" | "ceiling" => Func::Ceil,
            _ => return None,
        };
        Some(func)
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Asin => v.asin(),
            Func::Acos => v.acos(),
            Func::Atan => v.atan(),
            Func::Sinh => v.sinh(),
            Func::Cosh => v.cosh(),
            Func::Tanh => v.tanh(),
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
            Func::Floor => v.floor(),
            Func::Ceil => v.ceil(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Var,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Var => x,
            Expr::Neg(inner) => -inner.eval(x),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(x), rhs.eval(x));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, arg) => func.apply(arg.eval(x)),
        }
    }
}

/// A parsed equation together with the text it was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionEquation {
    source: String,
    expr: Expr,
}

impl PositionEquation {
    pub fn parse(text: &str) -> Result<Self, EquationParseError> {
        let tokens = tokenize(text)?;
        if let Some(tok) = tokens.get(MAX_TOKENS) {
            return Err(EquationParseError::new(
                tok.pos,
                format!("equation longer than {} tokens", MAX_TOKENS),
            ));
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            end: text.len(),
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(EquationParseError::new(
                tok.pos,
                format!("unexpected {}", tok.kind),
            ));
        }
        Ok(Self {
            source: text.trim().to_string(),
            expr,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.expr.eval(x)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

}

impl fmt::Display for PositionEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(v) => write!(f, "number {}", v),
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Caret => f.write_str("power operator"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(text: &str) -> Result<Vec<Token>, EquationParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'/' => TokenKind::Slash,
            b'^' => TokenKind::Caret,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i += 1;
                    TokenKind::Caret
                } else {
                    TokenKind::Star
                }
            }
            b'0'..=b'9' | b'.' => {
                i = scan_number(bytes, i);
                let literal = &text[start..i];
                let value = literal.parse::<f64>().map_err(|_| {
                    EquationParseError::new(start, format!("malformed number '{}'", literal))
                })?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    pos: start,
                });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(text[start..i].to_ascii_lowercase()),
                    pos: start,
                });
                continue;
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or('?');
                return Err(EquationParseError::new(
                    start,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };
        tokens.push(Token { kind, pos: start });
        i += 1;
    }

    Ok(tokens)
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    // exponent only when digits follow, so `2e` stays number + constant
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            return j;
        }
    }
    i
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        match self.peek() {
            Some(tok) if &tok.kind == kind => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expr(&mut self) -> Result<Expr, EquationParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                BinOp::Add
            } else if self.eat(&TokenKind::Minus) {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, EquationParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&TokenKind::Star) {
                BinOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                BinOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // every recursive path passes through here
    fn unary(&mut self) -> Result<Expr, EquationParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let pos = self.peek().map_or(self.end, |tok| tok.pos);
            return Err(EquationParseError::new(
                pos,
                format!("equation nested deeper than {} levels", MAX_NESTING),
            ));
        }
        let parsed = self.signed();
        self.depth -= 1;
        parsed
    }

    fn signed(&mut self) -> Result<Expr, EquationParseError> {
        if self.eat(&TokenKind::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.power()
    }

    // right-associative; the exponent may carry its own sign (`2^-x`)
    fn power(&mut self) -> Result<Expr, EquationParseError> {
        let base = self.primary()?;
        if self.eat(&TokenKind::Caret) {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, EquationParseError> {
        let end = self.end;
        let tok = self
            .next()
            .ok_or_else(|| EquationParseError::new(end, "unexpected end of equation"))?;

        match &tok.kind {
            TokenKind::Number(v) => Ok(Expr::Number(*v)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect_close(tok.pos)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if name == FREE_VARIABLE {
                    return Ok(Expr::Var);
                }
                match name.as_str() {
                    "pi" => return Ok(Expr::Number(std::f64::consts::PI)),
                    "e" => return Ok(Expr::Number(std::f64::consts::E)),
                    _ => {}
                }
                let func = Func::from_name(name).ok_or_else(|| {
                    EquationParseError::new(tok.pos, format!("unknown symbol '{}'", name))
                })?;
                if !self.eat(&TokenKind::LParen) {
                    return Err(EquationParseError::new(
                        tok.pos,
                        format!("function '{}' requires an argument in parentheses", name),
                    ));
                }
                let arg = self.expr()?;
                self.expect_close(tok.pos)?;
                Ok(Expr::Call(func, Box::new(arg)))
            }
            other => Err(EquationParseError::new(tok.pos, format!("unexpected {}", other))),
        }
    }

    fn expect_close(&mut self, open_pos: usize) -> Result<(), EquationParseError> {
        if self.eat(&TokenKind::RParen) {
            Ok(())
        } else {
            Err(EquationParseError::new(
                open_pos,
                "unbalanced parenthesis",
            ))
        }
    }
}
