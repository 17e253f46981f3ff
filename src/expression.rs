//! Field expressions and their restricted arithmetic evaluator.
//!
//! User input is tokenized under a strict whitelist (digits, `+ - * /`,
//! parentheses, whitespace and back-quoted column names) and parsed once, at
//! resolution time, into a small expression tree. Evaluation walks that tree
//! against one statement row; no text is interpreted at evaluation time.

use crate::error::{NormalizerError, Result};
use crate::statement::StatementRow;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn symbol(&self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    fn apply(&self, lhs: f64, rhs: f64) -> Result<f64> {
        match self {
            Operator::Add => Ok(lhs + rhs),
            Operator::Sub => Ok(lhs - rhs),
            Operator::Mul => Ok(lhs * rhs),
            Operator::Div => {
                if rhs == 0.0 {
                    Err(NormalizerError::DivisionByZero)
                } else {
                    Ok(lhs / rhs)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Neg(Box<Expr>),
    Binary {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Evaluates the tree. `value_of` supplies the number for a column
    /// reference.
    pub fn evaluate<F>(&self, value_of: &F) -> Result<f64>
    where
        F: Fn(&str) -> f64,
    {
        match self {
            Expr::Column(name) => Ok(value_of(name)),
            Expr::Neg(inner) => Ok(-inner.evaluate(value_of)?),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate(value_of)?;
                let r = rhs.evaluate(value_of)?;
                op.apply(l, r)
            }
        }
    }

    /// Column names referenced by the expression, in reading order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => out.push(name),
            Expr::Neg(inner) => inner.collect_columns(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Column(_) => 4,
            Expr::Neg(_) => 3,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "`{}`", name.replace('`', "``")),
            Expr::Neg(inner) => {
                f.write_str("-")?;
                inner.fmt_child(f, inner.precedence() < 3)
            }
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                lhs.fmt_child(f, lhs.precedence() < p)?;
                write!(f, " {} ", op.symbol())?;
                // parsing is left-associative, so a same-level right child
                // only exists when it was parenthesized
                rhs.fmt_child(f, rhs.precedence() <= p)
            }
        }
    }
}

/// The resolved selection rule for one target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExpressionRepr", into = "ExpressionRepr")]
pub enum FieldExpression {
    /// A raw column taken as-is.
    Direct(String),
    /// An arithmetic combination of raw columns.
    Arithmetic(Expr),
    /// No usable source.
    Unresolved,
}

impl FieldExpression {
    /// Parses a custom expression in which every integer is a 1-based index
    /// into `candidates`. Back-quoted column names are also accepted.
    pub fn parse_indexed(input: &str, candidates: &[String]) -> Result<Expr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            depth: 0,
            leaf: |token: &Token| match token {
                Token::Index(idx) => {
                    if *idx == 0 || *idx > candidates.len() {
                        Err(NormalizerError::OutOfRangeSelection {
                            index: *idx,
                            len: candidates.len(),
                        })
                    } else {
                        Ok(Expr::Column(candidates[idx - 1].clone()))
                    }
                }
                Token::Column(name) => Ok(Expr::Column(name.clone())),
                other => Err(invalid(input, format!("unexpected token {:?}", other))),
            },
        };
        parser.parse()
    }

    /// Parses the stored form produced by `Display`: back-quoted column
    /// references only, no positional indices.
    pub fn parse_stored(input: &str) -> Result<Expr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            depth: 0,
            leaf: |token: &Token| match token {
                Token::Column(name) => Ok(Expr::Column(name.clone())),
                Token::Index(idx) => Err(NormalizerError::InvalidExpression {
                    input: input.to_string(),
                    reason: format!("positional index {} in a stored expression", idx),
                }),
                other => Err(invalid(input, format!("unexpected token {:?}", other))),
            },
        };
        parser.parse()
    }

    /// A lone column reference is a direct mapping, so a missing value stays
    /// unresolved instead of counting as zero.
    pub fn from_expr(expr: Expr) -> Self {
        match expr {
            Expr::Column(column) => FieldExpression::Direct(column),
            tree => FieldExpression::Arithmetic(tree),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, FieldExpression::Unresolved)
    }

    /// Evaluates the expression against one row.
    ///
    /// A direct column that is absent or non-numeric is unresolved. Inside
    /// arithmetic, missing operands count as zero; division by zero makes the
    /// whole result unresolved.
    pub fn evaluate(&self, row: &StatementRow) -> Option<f64> {
        match self {
            FieldExpression::Direct(column) => row.number(column),
            FieldExpression::Arithmetic(expr) => expr
                .evaluate(&|column: &str| row.number(column).unwrap_or(0.0))
                .ok()
                .filter(|v| v.is_finite()),
            FieldExpression::Unresolved => None,
        }
    }
}

impl fmt::Display for FieldExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldExpression::Direct(column) => f.write_str(column),
            FieldExpression::Arithmetic(expr) => write!(f, "{}", expr),
            FieldExpression::Unresolved => f.write_str("<unresolved>"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ExpressionRepr {
    Direct(String),
    Arithmetic(String),
    Unresolved,
}

impl TryFrom<ExpressionRepr> for FieldExpression {
    type Error = NormalizerError;

    fn try_from(repr: ExpressionRepr) -> Result<Self> {
        Ok(match repr {
            ExpressionRepr::Direct(column) => FieldExpression::Direct(column),
            ExpressionRepr::Arithmetic(text) => {
                FieldExpression::from_expr(FieldExpression::parse_stored(&text)?)
            }
            ExpressionRepr::Unresolved => FieldExpression::Unresolved,
        })
    }
}

impl From<FieldExpression> for ExpressionRepr {
    fn from(expr: FieldExpression) -> Self {
        match expr {
            FieldExpression::Direct(column) => ExpressionRepr::Direct(column),
            FieldExpression::Arithmetic(tree) => ExpressionRepr::Arithmetic(tree.to_string()),
            FieldExpression::Unresolved => ExpressionRepr::Unresolved,
        }
    }
}

/// True when the input contains any arithmetic operator.
pub fn has_operator(input: &str) -> bool {
    input.contains(['+', '-', '*', '/'])
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Index(usize),
    Column(String),
    Op(Operator),
    LParen,
    RParen,
}

fn invalid(input: &str, reason: impl Into<String>) -> NormalizerError {
    NormalizerError::InvalidExpression {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '+' => tokens.push(Token::Op(Operator::Add)),
            '-' => tokens.push(Token::Op(Operator::Sub)),
            '*' => tokens.push(Token::Op(Operator::Mul)),
            '/' => tokens.push(Token::Op(Operator::Div)),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '0'..='9' => {
                let mut digits = String::from(c);
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if matches!(chars.peek(), Some(&(_, '.'))) {
                    return Err(invalid(
                        input,
                        "decimal literals are not allowed, integers are column indices",
                    ));
                }
                let idx = digits
                    .parse::<usize>()
                    .map_err(|_| invalid(input, format!("index '{}' is too large", digits)))?;
                tokens.push(Token::Index(idx));
            }
            '`' => {
                let mut name = String::new();
                let mut closed = false;
                while let Some((_, d)) = chars.next() {
                    if d == '`' {
                        if matches!(chars.peek(), Some(&(_, '`'))) {
                            name.push('`');
                            chars.next();
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        name.push(d);
                    }
                }
                if !closed {
                    return Err(invalid(input, format!("unterminated column name at {}", pos)));
                }
                if name.trim().is_empty() {
                    return Err(invalid(input, "empty column name"));
                }
                tokens.push(Token::Column(name));
            }
            other => {
                return Err(invalid(
                    input,
                    format!("unexpected character '{}' at position {}", other, pos),
                ));
            }
        }
    }

    if tokens.is_empty() {
        return Err(invalid(input, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a, L> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    leaf: L,
}

impl<L> Parser<'_, L>
where
    L: FnMut(&Token) -> Result<Expr>,
{
    fn parse(&mut self) -> Result<Expr> {
        let expr = self.expression()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some(Token::RParen) => Err(invalid(self.input, "unbalanced ')'")),
            Some(_) => Err(invalid(self.input, "missing operator between operands")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Operator::Add | Operator::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (Operator::Mul | Operator::Div))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Op(Operator::Sub)) => {
                self.pos += 1;
                self.nested(|p| p.unary()).map(|e| Expr::Neg(Box::new(e)))
            }
            Some(Token::Op(Operator::Add)) => {
                self.pos += 1;
                self.nested(|p| p.unary())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| invalid(self.input, "expression ends with an operator"))?;
        self.pos += 1;

        match token {
            Token::Index(_) | Token::Column(_) => (self.leaf)(&token),
            Token::LParen => {
                let inner = self.nested(|p| p.expression())?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(invalid(self.input, "missing ')'")),
                }
            }
            Token::RParen => Err(invalid(self.input, "unexpected ')'")),
            Token::Op(op) => Err(invalid(
                self.input,
                format!("operator '{}' without a left operand", op.symbol()),
            )),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(invalid(self.input, "expression is nested too deeply"));
        }
        let out = f(self);
        self.depth -= 1;
        out
    }
}
