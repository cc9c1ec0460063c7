//! Abstract Syntax Tree for YAIL.

pub mod expr;
pub mod pretty;
pub mod stmt;

pub use expr::{Expr, ExprKind, InfixOp, PrefixOp};
pub use stmt::{
    AttributeDecl, FunctionDecl, Parameter, Program, ReturnType, Stmt, StmtKind, StructDecl,
};
