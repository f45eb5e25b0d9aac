//! A small expression language shared by conditions, validation tags and tag selectors.
//!
//! Grammar, lowest precedence first:
//! ```text
//! or      := and ( "||" and )*
//! and     := cmp ( "&&" cmp )*
//! cmp     := sum ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) sum )?
//! sum     := product ( ( "+" | "-" ) product )*
//! product := unary ( ( "*" | "/" | "%" ) unary )*
//! unary   := ( "!" | "-" ) unary | primary
//! primary := number | string | "true" | "false" | "$" | ident | ident "(" args ")" | "(" or ")"
//! ```
//! `$` and identifiers are looked up through [`Variables`]. Strings are compared to numbers
//! by parsing the string, so a property value substituted for `$` compares naturally.

use core::fmt;

use regex::Regex;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExprErrorKind {
    #[error("syntax error at {pos}: {reason}")]
    Syntax { pos: usize, reason: String },
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("expression result `{0}` isn't a boolean")]
    NotBoolean(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    /// Infers the most specific value from a raw property string.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(val) = trimmed.parse::<i64>() {
            return Self::Int(val);
        }
        if let Ok(val) = trimmed.parse::<f64>() {
            return Self::Float(val);
        }
        match trimmed {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Str(raw.to_owned()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(val) => Some(*val as f64),
            Self::Float(val) => Some(*val),
            Self::Str(val) => val.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(val) => Some(*val),
            Self::Str(val) => match val.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(val) => write!(f, "{val}"),
            Self::Float(val) => write!(f, "{val}"),
            Self::Str(val) => f.write_str(val),
            Self::Bool(val) => write!(f, "{val}"),
        }
    }
}

/// Resolves `$` and identifiers of an expression.
pub trait Variables {
    fn get(&self, name: &str) -> Option<Value>;
}

impl Variables for () {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Binds `$` to a single value.
pub struct Dollar(pub Value);

impl Variables for Dollar {
    fn get(&self, name: &str) -> Option<Value> {
        (name == "$").then(|| self.0.clone())
    }
}

impl<F> Variables for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn get(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Evaluates `input` and returns its value.
///
/// # Errors
/// Returns [`ExprErrorKind`] on syntax errors, unknown names and type mismatches.
pub fn eval(input: &str, vars: &dyn Variables) -> Result<Value, ExprErrorKind> {
    let expr = parse(input)?;
    expr.eval(vars)
}

/// Evaluates `input` and requires a boolean result.
///
/// # Errors
/// Returns [`ExprErrorKind::NotBoolean`] if the expression doesn't evaluate to a boolean.
pub fn eval_bool(input: &str, vars: &dyn Variables) -> Result<bool, ExprErrorKind> {
    match eval(input, vars)? {
        Value::Bool(val) => Ok(val),
        other => Err(ExprErrorKind::NotBoolean(other)),
    }
}

/// Parses `input` once so it can be evaluated many times.
///
/// # Errors
/// Returns [`ExprErrorKind::Syntax`] if `input` isn't a valid expression.
pub fn parse(input: &str) -> Result<Expr, ExprErrorKind> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some((pos, token)) => Err(syntax(*pos, format!("unexpected {token:?}"))),
    }
}

fn syntax(pos: usize, reason: impl Into<String>) -> ExprErrorKind {
    ExprErrorKind::Syntax {
        pos,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Dollar,
    LParen,
    RParen,
    Comma,
    Op(&'static str),
}

const OPERATORS: [&str; 16] = ["&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "+", "-", "*", "/", "%", "(", ")"];

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExprErrorKind> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        match ch {
            b'$' => {
                tokens.push((start, Token::Dollar));
                pos += 1;
            }
            b',' => {
                tokens.push((start, Token::Comma));
                pos += 1;
            }
            b'\'' | b'"' => {
                let quote = ch;
                pos += 1;
                let mut val = String::new();
                loop {
                    let Some(&next) = bytes.get(pos) else {
                        return Err(syntax(start, "unterminated string"));
                    };
                    pos += 1;
                    if next == quote {
                        break;
                    }
                    if next == b'\\' {
                        let Some(&escaped) = bytes.get(pos) else {
                            return Err(syntax(start, "unterminated string"));
                        };
                        pos += 1;
                        val.push(escaped as char);
                        continue;
                    }
                    // Multi-byte characters are copied verbatim.
                    let char_len = utf8_len(next);
                    val.push_str(&input[pos - 1..pos - 1 + char_len]);
                    pos += char_len - 1;
                }
                tokens.push((start, Token::Str(val)));
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.' || bytes[pos] == b'_') {
                    pos += 1;
                }
                let raw: String = input[start..pos].chars().filter(|ch| *ch != '_').collect();
                let token = if raw.contains('.') {
                    Token::Float(raw.parse().map_err(|_| syntax(start, format!("invalid number `{raw}`")))?)
                } else {
                    Token::Int(raw.parse().map_err(|_| syntax(start, format!("invalid number `{raw}`")))?)
                };
                tokens.push((start, token));
            }
            ch if ch.is_ascii_alphabetic() || ch == b'_' => {
                // `-` joins an identifier only when a letter follows, so `a-1` stays a subtraction
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric()
                        || matches!(bytes[pos], b'_' | b'.')
                        || (bytes[pos] == b'-' && bytes.get(pos + 1).is_some_and(|next| next.is_ascii_alphabetic() || *next == b'_')))
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(input[start..pos].to_owned())));
            }
            _ => {
                let rest = &input[pos..];
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(syntax(start, format!("unexpected character `{}`", &rest[..utf8_len(ch)])));
                };
                pos += op.len();
                let token = match *op {
                    "(" => Token::LParen,
                    ")" => Token::RParen,
                    op => Token::Op(op),
                };
                tokens.push((start, token));
            }
        }
    }

    Ok(tokens)
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// A parsed expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn end_pos(&self) -> usize {
        self.tokens.last().map_or(0, |(pos, _)| *pos + 1)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some((_, Token::Op(op))) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expr, ExprErrorKind> {
        let mut lhs = self.and()?;
        while let Some(op) = self.eat_op(&["||"]) {
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprErrorKind> {
        let mut lhs = self.cmp()?;
        while let Some(op) = self.eat_op(&["&&"]) {
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.cmp()?));
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Expr, ExprErrorKind> {
        let lhs = self.sum()?;
        if let Some(op) = self.eat_op(&["==", "!=", "<=", ">=", "<", ">"]) {
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(self.sum()?)));
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<Expr, ExprErrorKind> {
        let mut lhs = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.product()?));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, ExprErrorKind> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprErrorKind> {
        if let Some(op) = self.eat_op(&["!", "-"]) {
            return Ok(Expr::Unary(op, Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprErrorKind> {
        let Some((pos, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(syntax(self.end_pos(), "unexpected end of expression"));
        };
        self.pos += 1;

        match token {
            Token::Int(val) => Ok(Expr::Literal(Value::Int(val))),
            Token::Float(val) => Ok(Expr::Literal(Value::Float(val))),
            Token::Str(val) => Ok(Expr::Literal(Value::Str(val))),
            Token::Dollar => Ok(Expr::Var("$".to_owned())),
            Token::Ident(name) if name == "true" => Ok(Expr::Literal(Value::Bool(true))),
            Token::Ident(name) if name == "false" => Ok(Expr::Literal(Value::Bool(false))),
            Token::Ident(name) => {
                if !matches!(self.peek(), Some((_, Token::LParen))) {
                    return Ok(Expr::Var(name));
                }
                self.pos += 1;

                let mut args = Vec::new();
                if matches!(self.peek(), Some((_, Token::RParen))) {
                    self.pos += 1;
                    return Ok(Expr::Call(name, args));
                }
                loop {
                    args.push(self.or()?);
                    match self.tokens.get(self.pos) {
                        Some((_, Token::Comma)) => self.pos += 1,
                        Some((_, Token::RParen)) => {
                            self.pos += 1;
                            return Ok(Expr::Call(name, args));
                        }
                        Some((pos, token)) => return Err(syntax(*pos, format!("expected `,` or `)`, found {token:?}"))),
                        None => return Err(syntax(self.end_pos(), "unclosed call")),
                    }
                }
            }
            Token::LParen => {
                let expr = self.or()?;
                match self.tokens.get(self.pos) {
                    Some((_, Token::RParen)) => {
                        self.pos += 1;
                        Ok(expr)
                    }
                    _ => Err(syntax(pos, "unclosed parenthesis")),
                }
            }
            token => Err(syntax(pos, format!("unexpected {token:?}"))),
        }
    }
}

impl Expr {
    /// Evaluates the expression with the given variables.
    ///
    /// # Errors
    /// Returns [`ExprErrorKind`] on unknown names and type mismatches.
    pub fn eval(&self, vars: &dyn Variables) -> Result<Value, ExprErrorKind> {
        match self {
            Self::Literal(val) => Ok(val.clone()),
            Self::Var(name) => vars.get(name).ok_or_else(|| ExprErrorKind::UnknownVariable(name.clone())),
            Self::Unary(op, operand) => {
                let val = operand.eval(vars)?;
                match *op {
                    "!" => val
                        .as_bool()
                        .map(|val| Value::Bool(!val))
                        .ok_or_else(|| ExprErrorKind::Type(format!("`!` on {}", val.type_name()))),
                    _ => match val {
                        Value::Int(val) => val
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| ExprErrorKind::Type(format!("integer overflow in `-{val}`"))),
                        val => val
                            .as_number()
                            .map(|val| Value::Float(-val))
                            .ok_or_else(|| ExprErrorKind::Type(format!("`-` on {}", val.type_name()))),
                    },
                }
            }
            Self::Binary("&&", lhs, rhs) => {
                if !truthy(lhs, vars)? {
                    return Ok(Value::Bool(false));
                }
                truthy(rhs, vars).map(Value::Bool)
            }
            Self::Binary("||", lhs, rhs) => {
                if truthy(lhs, vars)? {
                    return Ok(Value::Bool(true));
                }
                truthy(rhs, vars).map(Value::Bool)
            }
            Self::Binary(op, lhs, rhs) => binary(op, lhs.eval(vars)?, rhs.eval(vars)?),
            Self::Call(name, args) => {
                let args = args.iter().map(|arg| arg.eval(vars)).collect::<Result<Vec<_>, _>>()?;
                call(name, &args)
            }
        }
    }
}

fn truthy(expr: &Expr, vars: &dyn Variables) -> Result<bool, ExprErrorKind> {
    let val = expr.eval(vars)?;
    match val.as_bool() {
        Some(val) => Ok(val),
        None => Err(ExprErrorKind::NotBoolean(val)),
    }
}

fn binary(op: &str, lhs: Value, rhs: Value) -> Result<Value, ExprErrorKind> {
    match op {
        "==" => Ok(Value::Bool(equals(&lhs, &rhs))),
        "!=" => Ok(Value::Bool(!equals(&lhs, &rhs))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = match (lhs.as_number(), rhs.as_number()) {
                (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs),
                _ => match (&lhs, &rhs) {
                    (Value::Str(lhs), Value::Str(rhs)) => Some(lhs.cmp(rhs)),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return Err(ExprErrorKind::Type(format!(
                    "can't compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            };
            Ok(Value::Bool(match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        "+" => match (&lhs, &rhs) {
            (Value::Str(lhs), Value::Str(rhs)) => Ok(Value::Str(format!("{lhs}{rhs}"))),
            _ => arithmetic(op, &lhs, &rhs),
        },
        _ => arithmetic(op, &lhs, &rhs),
    }
}

fn arithmetic(op: &str, lhs: &Value, rhs: &Value) -> Result<Value, ExprErrorKind> {
    if let (Value::Int(lhs), Value::Int(rhs)) = (lhs, rhs) {
        let (lhs, rhs) = (*lhs, *rhs);
        if matches!(op, "/" | "%") && rhs == 0 {
            return Err(ExprErrorKind::DivisionByZero);
        }
        let val = match op {
            "+" => lhs.checked_add(rhs),
            "-" => lhs.checked_sub(rhs),
            "*" => lhs.checked_mul(rhs),
            "/" => lhs.checked_div(rhs),
            _ => lhs.checked_rem(rhs),
        };
        return val
            .map(Value::Int)
            .ok_or_else(|| ExprErrorKind::Type(format!("integer overflow in `{lhs} {op} {rhs}`")));
    }

    let (Some(lhs_num), Some(rhs_num)) = (lhs.as_number(), rhs.as_number()) else {
        return Err(ExprErrorKind::Type(format!(
            "`{op}` on {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    };
    if matches!(op, "/" | "%") && rhs_num == 0.0 {
        return Err(ExprErrorKind::DivisionByZero);
    }
    Ok(Value::Float(match op {
        "+" => lhs_num + rhs_num,
        "-" => lhs_num - rhs_num,
        "*" => lhs_num * rhs_num,
        "/" => lhs_num / rhs_num,
        _ => lhs_num % rhs_num,
    }))
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
        (Value::Bool(lhs), rhs) | (rhs, Value::Bool(lhs)) => rhs.as_bool() == Some(*lhs),
        (lhs, rhs) => match (lhs.as_number(), rhs.as_number()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => lhs.to_string() == rhs.to_string(),
        },
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value, ExprErrorKind> {
    match (name, args) {
        ("len", [val]) => Ok(Value::Int(i64::try_from(val.to_string().chars().count()).unwrap_or(i64::MAX))),
        ("contains", [haystack, needle]) => Ok(Value::Bool(haystack.to_string().contains(&needle.to_string()))),
        ("matches", [val, pattern]) => {
            let regex = Regex::new(&pattern.to_string()).map_err(|err| ExprErrorKind::Type(format!("invalid regex: {err}")))?;
            Ok(Value::Bool(regex.is_match(&val.to_string())))
        }
        ("len" | "contains" | "matches", _) => Err(ExprErrorKind::Type(format!(
            "wrong number of arguments ({}) for `{name}`",
            args.len()
        ))),
        _ => Err(ExprErrorKind::UnknownFunction(name.to_owned())),
    }
}
