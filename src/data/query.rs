//! Boolean filter expressions over table rows.
//!
//! The grammar is deliberately small: comparisons, membership tests, logical
//! connectives and literals. There is no arithmetic, no function calls and no
//! attribute access.
//!
//! ```text
//! expr       := or
//! or         := and (("or" | "|") and)*
//! and        := not (("and" | "&") not)*
//! not        := ("not" | "~") not | comparison
//! comparison := operand ((cmp_op | "in" | "not in") operand)*
//! operand    := number | "-" number | string | True | False | None
//!             | identifier | `quoted column` | "[" literal,* "]" | "(" expr ")"
//! ```
//!
//! Chained comparisons such as `1 < age <= 30` mean `1 < age and age <= 30`.
//! Parentheses and negations may nest at most [`MAX_NESTING`] levels deep.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

use super::frame::DataFrame;
use super::value::Value;

/// Maximum combined depth of parentheses and `not` prefixes.
pub const MAX_NESTING: usize = 100;

/// Errors raised while parsing or evaluating a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The expression is not well formed.
    #[error("invalid syntax: {message}")]
    Syntax {
        /// What the parser expected or found.
        message: String,
    },

    /// The expression references a column that does not exist.
    #[error("name '{name}' is not defined")]
    UndefinedName {
        /// The unknown identifier.
        name: String,
    },

    /// An ordering comparison between incompatible values.
    #[error("'{op}' not supported between instances of '{left}' and '{right}'")]
    TypeMismatch {
        /// Operator symbol.
        op: CmpOp,
        /// Type name of the left operand.
        left: &'static str,
        /// Type name of the right operand.
        right: &'static str,
    },

    /// A logical operator or the whole expression produced a non-boolean.
    #[error("boolean value expected, got '{found}'")]
    NotBoolean {
        /// Type name of the offending value.
        found: &'static str,
    },
}

impl QueryError {
    fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }
}

/// Comparison and membership operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

// ==================== Lexer ====================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    In,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" => Token::Literal(Value::Bool(true)),
                    "False" => Token::Literal(Value::Bool(false)),
                    "None" => Token::Literal(Value::Null),
                    _ => Token::Ident(ident),
                });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    let exponent_sign =
                        (c == '+' || c == '-') && text.ends_with(['e', 'E']);
                    if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Literal(parse_number(&text)?));
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Literal(Value::Str(read_string(&mut chars, c)?)));
            }
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => name.push(c),
                        None => return Err(QueryError::syntax("unterminated backtick name")),
                    }
                }
                tokens.push(Token::Ident(name));
            }
            _ => {
                chars.next();
                let next = chars.peek().copied();
                let token = match (c, next) {
                    ('=', Some('=')) => Token::Cmp(CmpOp::Eq),
                    ('!', Some('=')) => Token::Cmp(CmpOp::Ne),
                    ('<', Some('=')) => Token::Cmp(CmpOp::Le),
                    ('>', Some('=')) => Token::Cmp(CmpOp::Ge),
                    ('=', _) => return Err(QueryError::syntax("'=' is not a comparison, use '=='")),
                    ('<', _) => Token::Cmp(CmpOp::Lt),
                    ('>', _) => Token::Cmp(CmpOp::Gt),
                    ('&', _) => Token::And,
                    ('|', _) => Token::Or,
                    ('~', _) => Token::Not,
                    ('-', _) => Token::Minus,
                    ('(', _) => Token::LParen,
                    (')', _) => Token::RParen,
                    ('[', _) => Token::LBracket,
                    (']', _) => Token::RBracket,
                    (',', _) => Token::Comma,
                    _ => return Err(QueryError::syntax(format!("unexpected character '{c}'"))),
                };
                if matches!(
                    token,
                    Token::Cmp(CmpOp::Eq | CmpOp::Ne | CmpOp::Le | CmpOp::Ge)
                ) {
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Value, QueryError> {
    let cleaned = text.replace('_', "");
    let is_float = cleaned.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = cleaned.parse::<i64>() {
            return Ok(Value::Int(i));
        }
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
        .ok_or_else(|| QueryError::syntax(format!("invalid number '{text}'")))
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
) -> Result<String, QueryError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(c) => out.push(c),
                None => break,
            },
            Some(c) => out.push(c),
            None => break,
        }
    }
    Err(QueryError::syntax("unterminated string literal"))
}

// ==================== Parser ====================

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    List(Vec<Value>),
    Column(String),
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), QueryError> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            _ => Err(QueryError::syntax(format!("expected {what}"))),
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, QueryError>,
    ) -> Result<T, QueryError> {
        if self.depth >= MAX_NESTING {
            return Err(QueryError::syntax("expression is too deeply nested"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let first = self.parse_and()?;
        if self.peek() != Some(&Token::Or) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            operands.push(self.parse_and()?);
        }
        Ok(Expr::Or(operands))
    }

    fn parse_and(&mut self) -> Result<Expr, QueryError> {
        let first = self.parse_not()?;
        if self.peek() != Some(&Token::And) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.peek() == Some(&Token::And) {
            self.advance();
            operands.push(self.parse_not()?);
        }
        Ok(Expr::And(operands))
    }

    fn parse_not(&mut self) -> Result<Expr, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, QueryError> {
        let first = self.parse_operand()?;
        let mut rest = Vec::new();

        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Cmp(op)), _) => {
                    let op = *op;
                    self.advance();
                    op
                }
                (Some(Token::In), _) => {
                    self.advance();
                    CmpOp::In
                }
                (Some(Token::Not), Some(Token::In)) => {
                    self.pos += 2;
                    CmpOp::NotIn
                }
                _ => break,
            };
            let operand = self.parse_operand()?;
            let is_list = matches!(operand, Expr::List(_));
            if matches!(op, CmpOp::In | CmpOp::NotIn) != is_list {
                return Err(QueryError::syntax(format!(
                    "'{op}' requires a list on the right-hand side and lists are only valid after 'in'"
                )));
            }
            rest.push((op, operand));
        }

        if rest.is_empty() {
            if matches!(first, Expr::List(_)) {
                return Err(QueryError::syntax("a list is only valid after 'in'"));
            }
            return Ok(first);
        }
        Ok(Expr::Compare {
            first: Box::new(first),
            rest,
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, QueryError> {
        match self.advance() {
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Literal(v)) => negate(v).map(Expr::Literal),
                _ => Err(QueryError::syntax("'-' must be followed by a number")),
            },
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(t) => Err(QueryError::syntax(format!("unexpected token {t:?}"))),
            None => Err(QueryError::syntax("unexpected end of expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, QueryError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(Expr::List(items));
        }
        loop {
            let item = match self.advance() {
                Some(Token::Literal(v)) => v,
                Some(Token::Minus) => match self.advance() {
                    Some(Token::Literal(v)) => negate(v)?,
                    _ => return Err(QueryError::syntax("'-' must be followed by a number")),
                },
                _ => return Err(QueryError::syntax("list items must be literals")),
            };
            items.push(item);
            match self.advance() {
                Some(Token::Comma) => {
                    // Trailing comma
                    if self.peek() == Some(&Token::RBracket) {
                        self.advance();
                        break;
                    }
                }
                Some(Token::RBracket) => break,
                _ => return Err(QueryError::syntax("expected ',' or ']'")),
            }
        }
        Ok(Expr::List(items))
    }
}

fn negate(value: Value) -> Result<Value, QueryError> {
    match value {
        Value::Int(i) => Ok(Value::Int(-i)),
        Value::Float(f) => Ok(Value::Float(-f)),
        _ => Err(QueryError::syntax("'-' must be followed by a number")),
    }
}

// ==================== Evaluation ====================

/// Expression with column names resolved to positions.
enum Bound {
    Literal(Value),
    List(Vec<Value>),
    Column(usize),
    Compare {
        first: Box<Bound>,
        rest: Vec<(CmpOp, Bound)>,
    },
    And(Vec<Bound>),
    Or(Vec<Bound>),
    Not(Box<Bound>),
}

enum Operand<'a> {
    Scalar(Cow<'a, Value>),
    List(&'a [Value]),
}

fn bind(expr: &Expr, frame: &DataFrame) -> Result<Bound, QueryError> {
    Ok(match expr {
        Expr::Literal(v) => Bound::Literal(v.clone()),
        Expr::List(items) => Bound::List(items.clone()),
        Expr::Column(name) => Bound::Column(frame.column_index(name).ok_or_else(|| {
            QueryError::UndefinedName { name: name.clone() }
        })?),
        Expr::Compare { first, rest } => Bound::Compare {
            first: Box::new(bind(first, frame)?),
            rest: rest
                .iter()
                .map(|(op, e)| bind(e, frame).map(|b| (*op, b)))
                .collect::<Result<_, _>>()?,
        },
        Expr::And(operands) => Bound::And(bind_all(operands, frame)?),
        Expr::Or(operands) => Bound::Or(bind_all(operands, frame)?),
        Expr::Not(inner) => Bound::Not(Box::new(bind(inner, frame)?)),
    })
}

fn bind_all(operands: &[Expr], frame: &DataFrame) -> Result<Vec<Bound>, QueryError> {
    operands.iter().map(|e| bind(e, frame)).collect()
}

impl Bound {
    fn eval<'a>(&'a self, frame: &'a DataFrame, row: usize) -> Result<Operand<'a>, QueryError> {
        Ok(match self {
            Self::Literal(v) => Operand::Scalar(Cow::Borrowed(v)),
            Self::List(items) => Operand::List(items),
            Self::Column(index) => {
                Operand::Scalar(Cow::Borrowed(&frame.columns()[*index].values[row]))
            }
            Self::Compare { first, rest } => {
                let mut left = first.eval(frame, row)?;
                let mut result = true;
                for (op, right) in rest {
                    let right = right.eval(frame, row)?;
                    if !compare(*op, &left, &right)? {
                        result = false;
                        break;
                    }
                    left = right;
                }
                Operand::Scalar(Cow::Owned(Value::Bool(result)))
            }
            Self::And(operands) => {
                let mut result = true;
                for operand in operands {
                    if !operand.truth(frame, row)? {
                        result = false;
                        break;
                    }
                }
                Operand::Scalar(Cow::Owned(Value::Bool(result)))
            }
            Self::Or(operands) => {
                let mut result = false;
                for operand in operands {
                    if operand.truth(frame, row)? {
                        result = true;
                        break;
                    }
                }
                Operand::Scalar(Cow::Owned(Value::Bool(result)))
            }
            Self::Not(inner) => {
                Operand::Scalar(Cow::Owned(Value::Bool(!inner.truth(frame, row)?)))
            }
        })
    }

    fn truth(&self, frame: &DataFrame, row: usize) -> Result<bool, QueryError> {
        match self.eval(frame, row)? {
            Operand::Scalar(v) => match v.as_ref() {
                Value::Bool(b) => Ok(*b),
                other => Err(QueryError::NotBoolean {
                    found: other.type_name(),
                }),
            },
            Operand::List(_) => Err(QueryError::NotBoolean { found: "list" }),
        }
    }
}

fn compare(op: CmpOp, left: &Operand<'_>, right: &Operand<'_>) -> Result<bool, QueryError> {
    match (op, left, right) {
        (CmpOp::In, Operand::Scalar(l), Operand::List(items)) => Ok(contains(items, l)),
        (CmpOp::NotIn, Operand::Scalar(l), Operand::List(items)) => Ok(!contains(items, l)),
        (_, Operand::Scalar(l), Operand::Scalar(r)) => compare_values(op, l, r),
        _ => Err(QueryError::syntax(format!("invalid operands for '{op}'"))),
    }
}

fn contains(items: &[Value], needle: &Value) -> bool {
    items
        .iter()
        .any(|item| matches!(compare_values(CmpOp::Eq, needle, item), Ok(true)))
}

/// Compares two cells. Missing cells equal nothing and order against nothing.
fn compare_values(op: CmpOp, left: &Value, right: &Value) -> Result<bool, QueryError> {
    if left.is_null() || right.is_null() {
        return Ok(op == CmpOp::Ne);
    }

    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => None,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match (op, ordering) {
        (CmpOp::Eq, ord) => Ok(ord == Some(Ordering::Equal)),
        (CmpOp::Ne, ord) => Ok(ord != Some(Ordering::Equal)),
        (CmpOp::Lt, Some(ord)) => Ok(ord.is_lt()),
        (CmpOp::Le, Some(ord)) => Ok(ord.is_le()),
        (CmpOp::Gt, Some(ord)) => Ok(ord.is_gt()),
        (CmpOp::Ge, Some(ord)) => Ok(ord.is_ge()),
        _ => Err(QueryError::TypeMismatch {
            op,
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: Expr,
}

impl Query {
    /// Parses a filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Syntax`] if the expression is malformed or nests
    /// deeper than [`MAX_NESTING`].
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(QueryError::syntax("empty expression"));
        }
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(QueryError::syntax(format!("unexpected token {token:?}")));
        }
        Ok(Self { expr })
    }

    /// Evaluates the expression against every row.
    ///
    /// Column references are resolved before any row is evaluated, so an
    /// unknown column fails even on an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown columns, incompatible comparisons, or a
    /// non-boolean result.
    pub fn mask(&self, frame: &DataFrame) -> Result<Vec<bool>, QueryError> {
        let bound = bind(&self.expr, frame)?;
        (0..frame.len())
            .map(|row| bound.truth(frame, row))
            .collect()
    }

    /// Returns the rows for which the expression holds.
    ///
    /// # Errors
    ///
    /// See [`Query::mask`].
    pub fn filter(&self, frame: &DataFrame) -> Result<DataFrame, QueryError> {
        let mask = self.mask(frame)?;
        Ok(frame.filter(&mask))
    }
}
