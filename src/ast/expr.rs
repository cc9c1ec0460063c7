//! Expression AST nodes.

use crate::ast::stmt::Stmt;
use crate::span::Span;
use std::fmt;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A name reference: `x`
    Identifier(String),

    /// Integer literal: `42`
    IntLiteral(i64),

    /// Float literal: `4.2`
    FloatLiteral(f64),

    /// String literal: `"text"`
    StringLiteral(String),

    /// Boolean literal: `true` / `false`
    BoolLiteral(bool),

    /// Prefix operation: `!x`, `-x`
    Prefix { op: PrefixOp, right: Box<Expr> },

    /// Infix operation: `a + b`
    Infix {
        left: Box<Expr>,
        op: InfixOp,
        right: Box<Expr>,
    },

    /// Conditional expression: `if (cond) { ... } else { ... }`
    If {
        condition: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },

    /// Array literal: `{1, 2, 3}` (declaration initializers and synthesized
    /// defaults)
    Array(Vec<Expr>),

    /// Index access: `v[i]`
    Index { left: Box<Expr>, index: Box<Expr> },

    /// Attribute access chain: `p.x` or `a.b.c`
    Accessor { left: Box<Expr>, fields: Vec<String> },

    /// Function call: `f(a, b)`
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// `!`
    Bang,
    /// `-`
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Bang => write!(f, "!"),
            PrefixOp::Minus => write!(f, "-"),
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
    And,
    Or,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Lt => "<",
            InfixOp::Lte => "<=",
            InfixOp::Gt => ">",
            InfixOp::Gte => ">=",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::And => "and",
            InfixOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

impl Expr {
    /// Shorthand used when synthesizing default values.
    pub fn int(value: i64) -> Expr {
        Expr::new(ExprKind::IntLiteral(value), Span::default())
    }

    pub fn float(value: f64) -> Expr {
        Expr::new(ExprKind::FloatLiteral(value), Span::default())
    }

    pub fn bool(value: bool) -> Expr {
        Expr::new(ExprKind::BoolLiteral(value), Span::default())
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::new(ExprKind::StringLiteral(value.into()), Span::default())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::IntLiteral(n) => write!(f, "{}", n),
            ExprKind::FloatLiteral(n) => write!(f, "{}", n),
            ExprKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            ExprKind::BoolLiteral(b) => write!(f, "{}", b),
            ExprKind::Prefix { op, right } => write!(f, "({}{})", op, right),
            ExprKind::Infix { left, op, right } => write!(f, "({} {} {})", left, op, right),
            ExprKind::If { condition, .. } => write!(f, "if ({}) {{ ... }}", condition),
            ExprKind::Array(elements) => {
                write!(f, "{{")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
            ExprKind::Index { left, index } => write!(f, "({}[{}])", left, index),
            ExprKind::Accessor { left, fields } => {
                write!(f, "({}", left)?;
                for field in fields {
                    write!(f, ".{}", field)?;
                }
                write!(f, ")")
            }
            ExprKind::Call { callee, arguments } => {
                write!(f, "{}(", callee)?;
                for (i, a) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
