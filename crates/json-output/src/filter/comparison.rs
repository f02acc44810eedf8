//! A small comparison-only row filter compiler.
//!
//! Supports column references (optionally qualified by the relation's own
//! name), string/number/boolean/NULL constants, `= <> != < <= > >=`,
//! `IS [NOT] NULL`, `AND`, `OR`, `NOT` and parentheses, with SQL
//! three-valued logic. Constants take the type of the column they are
//! compared with; numeric columns compare numerically, others as text.
//! `IS [NOT] NULL` also applies to a parenthesised boolean expression.
//!
//! Numbers compare as exact decimals; only values beyond the decimal range
//! fall back to floating point. Expressions nested deeper than
//! [`MAX_NESTING`] levels are rejected.

use std::cmp::Ordering;

use relfeed_types::{type_category, Datum, RelationInfo, RowImage, TypeCategory};

use super::{FilterCompiler, RowPredicate};
use crate::error::CompileError;
use crate::options::parse_bool;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Deepest nesting of `NOT`, parentheses and chained operators accepted
pub const MAX_NESTING: usize = 256;

/// Compiler for simple comparison filters such as
/// `status = 'paid' AND (total > 100 OR vip)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonCompiler;

impl FilterCompiler for ComparisonCompiler {
    fn compile(
        &self,
        source: &str,
        relation: &RelationInfo,
    ) -> Result<Box<dyn RowPredicate>, CompileError> {
        let expr = compile_expr(source, relation).map_err(|reason| CompileError::new(source, reason))?;
        Ok(Box::new(CompiledFilter { expr }))
    }
}

fn compile_expr(source: &str, relation: &RelationInfo) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        relation,
    };
    let node = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(format!("syntax error at or near {token:?}"));
    }
    to_predicate(node)
}

#[derive(Debug)]
struct CompiledFilter {
    expr: Expr,
}

impl RowPredicate for CompiledFilter {
    fn evaluate(&mut self, row: &RowImage) -> Option<bool> {
        self.expr.eval(row)
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    LParen,
    RParen,
    Dot,
    Cmp(CmpOp),
    And,
    Or,
    Not,
    Is,
    Null,
    True,
    False,
}

impl Token {
    /// Whether a `-` after this token is a binary operator position
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Str(_)
                | Token::Num(_)
                | Token::RParen
                | Token::Null
                | Token::True
                | Token::False
        )
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == '.' && next.is_some_and(|n| n.is_ascii_digit()))
            || (c == '-'
                && next.is_some_and(|n| n.is_ascii_digit() || n == '.')
                && !tokens.last().is_some_and(Token::ends_operand));

        if starts_number {
            let start = i;
            i += 1;
            while i < chars.len() {
                let ch = chars[i];
                let exponent_sign = (ch == '+' || ch == '-') && matches!(chars[i - 1], 'e' | 'E');
                if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Num(chars[start..i].iter().collect()));
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '.' => tokens.push(Token::Dot),
            '=' => tokens.push(Token::Cmp(CmpOp::Eq)),
            '<' => match next {
                Some('=') => {
                    tokens.push(Token::Cmp(CmpOp::Le));
                    i += 1;
                }
                Some('>') => {
                    tokens.push(Token::Cmp(CmpOp::Ne));
                    i += 1;
                }
                _ => tokens.push(Token::Cmp(CmpOp::Lt)),
            },
            '>' => {
                if next == Some('=') {
                    tokens.push(Token::Cmp(CmpOp::Ge));
                    i += 1;
                } else {
                    tokens.push(Token::Cmp(CmpOp::Gt));
                }
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 1;
            }
            '\'' | '"' => {
                let (text, end) = read_quoted(&chars, i)?;
                tokens.push(if c == '\'' {
                    Token::Str(text)
                } else {
                    Token::Ident(text)
                });
                i = end;
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect::<String>().to_lowercase();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "is" => Token::Is,
                    "null" => Token::Null,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
                continue;
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
        i += 1;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`; a doubled quote stands for
/// itself. Returns the text and the index past the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }

    Err("unterminated quoted string".to_string())
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Null,
    Bool(bool),
    Num(String),
    Text(String),
}

#[derive(Debug)]
enum Node {
    Column {
        position: usize,
        category: TypeCategory,
    },
    Literal(Literal),
    Compare(CmpOp, Box<Node>, Box<Node>),
    IsNull(Box<Node>, bool),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// Upper bound on the depth of the tree built so far
    depth: usize,
    relation: &'a RelationInfo,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Go one level deeper, failing past [`MAX_NESTING`]
    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!(
                "expression is nested more than {MAX_NESTING} levels deep"
            ));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Node, String> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        while self.eat(&Token::Or) {
            self.enter()?;
            chained += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, String> {
        let mut left = self.parse_not()?;
        let mut chained = 0;
        while self.eat(&Token::And) {
            self.enter()?;
            chained += 1;
            let right = self.parse_not()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node, String> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    /// Comparison, then any number of `IS [NOT] NULL` tests, which bind
    /// more loosely than comparisons.
    fn parse_predicate(&mut self) -> Result<Node, String> {
        let mut node = self.parse_primary()?;

        if let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_primary()?;
            node = Node::Compare(op, Box::new(node), Box::new(right));
        }

        let mut chained = 0;
        while self.eat(&Token::Is) {
            self.enter()?;
            chained += 1;
            let negated = self.eat(&Token::Not);
            if !self.eat(&Token::Null) {
                return Err("expected NULL after IS".to_string());
            }
            node = Node::IsNull(Box::new(node), negated);
        }
        self.depth -= chained;

        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Node, String> {
        match self.advance() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing closing parenthesis".to_string());
                }
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Null) => Ok(Node::Literal(Literal::Null)),
            Some(Token::True) => Ok(Node::Literal(Literal::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Literal::Bool(false))),
            Some(Token::Num(n)) => Ok(Node::Literal(Literal::Num(n))),
            Some(Token::Str(s)) => Ok(Node::Literal(Literal::Text(s))),
            Some(Token::Ident(first)) => {
                let column = if self.eat(&Token::Dot) {
                    match self.advance() {
                        Some(Token::Ident(column)) => {
                            if first != self.relation.name {
                                return Err(format!(
                                    "only table \"{}\" can be referenced in row_filter",
                                    self.relation.name
                                ));
                            }
                            column
                        }
                        _ => return Err(format!("expected column name after \"{first}.\"")),
                    }
                } else {
                    first
                };
                self.column(&column)
            }
            Some(token) => Err(format!("syntax error at or near {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn column(&self, name: &str) -> Result<Node, String> {
        let position = self
            .relation
            .column_position(name)
            .ok_or_else(|| format!("column \"{name}\" does not exist"))?;
        let category = type_category(self.relation.columns[position].type_oid);
        Ok(Node::Column { position, category })
    }
}

// ============================================================================
// Type checking and evaluation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Number,
    Text,
    Bool,
}

impl Kind {
    fn of(category: TypeCategory) -> Self {
        match category {
            TypeCategory::Numeric => Kind::Number,
            TypeCategory::Boolean => Kind::Bool,
            TypeCategory::Text | TypeCategory::Unknown => Kind::Text,
        }
    }

    fn parse(self, text: &str) -> Option<Scalar> {
        match self {
            Kind::Number => Number::parse(text).map(Scalar::Number),
            Kind::Text => Some(Scalar::Text(text.to_string())),
            Kind::Bool => parse_bool(text).map(Scalar::Bool),
        }
    }
}

/// Numeric value, exact unless it is outside the decimal range
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Exact(Decimal),
    Approx(f64),
}

impl Number {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let exact = if text.contains(['e', 'E']) {
            Decimal::from_scientific(text).ok()
        } else {
            Decimal::from_str_exact(text).ok()
        };
        match exact {
            Some(value) => Some(Number::Exact(value)),
            None => text.parse::<f64>().ok().map(Number::Approx),
        }
    }

    fn approx(self) -> Option<f64> {
        match self {
            Number::Exact(value) => value.to_f64(),
            Number::Approx(value) => Some(value),
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Exact(a), Number::Exact(b)) => Some(a.cmp(&b)),
            _ => self.approx()?.partial_cmp(&other.approx()?),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Number(Number),
    Text(String),
    Bool(bool),
}

impl Scalar {
    fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.compare(*b),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Operand {
    Column { position: usize, kind: Kind },
    Value(Option<Scalar>),
}

impl Operand {
    fn value(&self, row: &RowImage) -> Option<Scalar> {
        match self {
            Operand::Value(value) => value.clone(),
            // Unchanged external values are unknown to the filter
            Operand::Column { position, kind } => match row.get(*position) {
                Datum::Text(text) => kind.parse(text),
                Datum::Null | Datum::UnchangedToast => None,
            },
        }
    }
}

#[derive(Debug)]
enum Expr {
    Const(Option<bool>),
    Column(usize),
    Compare {
        op: CmpOp,
        left: Operand,
        right: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    /// `IS [NOT] NULL` over a boolean expression
    IsUnknown {
        inner: Box<Expr>,
        negated: bool,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    fn eval(&self, row: &RowImage) -> Option<bool> {
        match self {
            Expr::Const(value) => *value,
            Expr::Column(position) => match row.get(*position) {
                Datum::Text(text) => parse_bool(text),
                Datum::Null | Datum::UnchangedToast => None,
            },
            Expr::Compare { op, left, right } => {
                let (left, right) = (left.value(row)?, right.value(row)?);
                left.compare(&right).map(|ordering| op.holds(ordering))
            }
            Expr::IsNull { operand, negated } => Some(operand.value(row).is_none() != *negated),
            Expr::IsUnknown { inner, negated } => Some(inner.eval(row).is_none() != *negated),
            Expr::And(a, b) => match (a.eval(row), b.eval(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expr::Or(a, b) => match (a.eval(row), b.eval(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Expr::Not(inner) => inner.eval(row).map(|v| !v),
        }
    }
}

fn to_predicate(node: Node) -> Result<Expr, String> {
    match node {
        Node::Literal(Literal::Bool(b)) => Ok(Expr::Const(Some(b))),
        Node::Literal(Literal::Null) => Ok(Expr::Const(None)),
        Node::Column {
            position,
            category: TypeCategory::Boolean,
        } => Ok(Expr::Column(position)),
        Node::Literal(_) | Node::Column { .. } => {
            Err("argument of row_filter must be type boolean".to_string())
        }
        Node::Compare(op, left, right) => {
            let (left, right) = typed_operands(*left, *right)?;
            Ok(Expr::Compare { op, left, right })
        }
        Node::IsNull(inner, negated) => match *inner {
            inner @ (Node::Column { .. } | Node::Literal(_)) => {
                let kind = node_kind(&inner).unwrap_or(Kind::Text);
                Ok(Expr::IsNull {
                    operand: operand(inner, kind)?,
                    negated,
                })
            }
            inner => Ok(Expr::IsUnknown {
                inner: Box::new(to_predicate(inner)?),
                negated,
            }),
        },
        Node::And(a, b) => Ok(Expr::And(
            Box::new(to_predicate(*a)?),
            Box::new(to_predicate(*b)?),
        )),
        Node::Or(a, b) => Ok(Expr::Or(
            Box::new(to_predicate(*a)?),
            Box::new(to_predicate(*b)?),
        )),
        Node::Not(inner) => Ok(Expr::Not(Box::new(to_predicate(*inner)?))),
    }
}

/// Kind a column imposes, or a non-null constant suggests
fn node_kind(node: &Node) -> Option<Kind> {
    match node {
        Node::Column { category, .. } => Some(Kind::of(*category)),
        Node::Literal(Literal::Num(_)) => Some(Kind::Number),
        Node::Literal(Literal::Text(_)) => Some(Kind::Text),
        Node::Literal(Literal::Bool(_)) => Some(Kind::Bool),
        _ => None,
    }
}

fn typed_operands(left: Node, right: Node) -> Result<(Operand, Operand), String> {
    let kind = match (&left, &right) {
        (Node::Column { category: a, .. }, Node::Column { category: b, .. })
            if Kind::of(*a) != Kind::of(*b) =>
        {
            return Err("cannot compare columns of different types".to_string())
        }
        (Node::Column { category, .. }, _) | (_, Node::Column { category, .. }) => {
            Kind::of(*category)
        }
        _ => node_kind(&left)
            .or_else(|| node_kind(&right))
            .unwrap_or(Kind::Text),
    };
    Ok((operand(left, kind)?, operand(right, kind)?))
}

fn operand(node: Node, kind: Kind) -> Result<Operand, String> {
    match node {
        Node::Column { position, category } => Ok(Operand::Column {
            position,
            kind: Kind::of(category),
        }),
        Node::Literal(Literal::Null) => Ok(Operand::Value(None)),
        Node::Literal(literal) => coerce(literal, kind).map(|v| Operand::Value(Some(v))),
        _ => Err("comparison operands must be columns or constants".to_string()),
    }
}

fn coerce(literal: Literal, kind: Kind) -> Result<Scalar, String> {
    let invalid = |text: &str| format!("invalid input syntax for {kind:?}: \"{text}\"");
    match (literal, kind) {
        (Literal::Num(n), Kind::Number) | (Literal::Text(n), Kind::Number) => {
            Number::parse(&n).map(Scalar::Number).ok_or_else(|| invalid(&n))
        }
        (Literal::Num(s), Kind::Text) | (Literal::Text(s), Kind::Text) => Ok(Scalar::Text(s)),
        (Literal::Bool(b), Kind::Bool) => Ok(Scalar::Bool(b)),
        (Literal::Text(s), Kind::Bool) => parse_bool(&s).map(Scalar::Bool).ok_or_else(|| invalid(&s)),
        (literal, kind) => Err(format!("cannot compare {literal:?} with a {kind:?} value")),
    }
}
