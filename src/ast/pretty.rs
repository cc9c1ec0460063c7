//! Indented AST dump for the `ast` CLI mode.
//!
//! Renders the tree one node per line, each level prefixed with `| `:
//!
//! ```text
//! Program
//! | Statement: Variable
//! | | Expression(Type): Identifier (int)
//! | | Expression(Name): Identifier (myVar)
//! | | Expression(Value):
//! | | | Expression: IntegerLiteral (5)
//! ```

use crate::ast::expr::{Expr, ExprKind};
use crate::ast::stmt::{Program, Stmt, StmtKind};
use std::fmt::Write;

impl Program {
    /// Render the whole program as an indented tree.
    pub fn print_ast(&self) -> String {
        let mut out = String::new();
        out.push_str("Program\n");
        for stmt in &self.statements {
            write_stmt(&mut out, stmt, 1);
        }
        out
    }
}

fn pad(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("| ");
    }
}

fn line(out: &mut String, level: usize, text: &str) {
    pad(out, level);
    out.push_str(text);
    out.push('\n');
}

fn write_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    match &stmt.kind {
        StmtKind::Expression(expr) => {
            line(out, level, "Statement: ExpressionStatement");
            write_expr(out, expr, level + 1);
        }
        StmtKind::Global(stmts) => write_decl_block(out, "Global", stmts, level),
        StmtKind::Const(stmts) => write_decl_block(out, "Const", stmts, level),
        StmtKind::Local(stmts) => write_decl_block(out, "Local", stmts, level),
        StmtKind::Variable {
            type_name,
            name,
            value,
        } => {
            line(out, level, "Statement: VariableStatement");
            line(
                out,
                level + 1,
                &format!("Expression(Type): Identifier ({})", type_name),
            );
            line(
                out,
                level + 1,
                &format!("Expression(Name): Identifier ({})", name),
            );
            match value {
                Some(v) => {
                    line(out, level + 1, "Expression(Value):");
                    write_expr(out, v, level + 2);
                }
                None => line(out, level + 1, "Expression(Value): <nil>"),
            }
        }
        StmtKind::ArrayDecl {
            type_name,
            name,
            size,
            values,
        } => {
            line(out, level, "Statement: ArrayStatement");
            line(
                out,
                level + 1,
                &format!("Expression(Type): Identifier ({})", type_name),
            );
            line(
                out,
                level + 1,
                &format!("Expression(Name): Identifier ({})", name),
            );
            match size {
                Some(s) => {
                    line(out, level + 1, "Expression(Size):");
                    write_expr(out, s, level + 2);
                }
                None => line(out, level + 1, "Expression(Size): <nil>"),
            }
            line(out, level + 1, "Expression(Values):");
            for v in values {
                write_expr(out, v, level + 2);
            }
        }
        StmtKind::Function(decl) => {
            line(out, level, "Statement: FunctionStatement");
            line(out, level + 1, &format!("Name: {}", decl.name));
            line(out, level + 1, "Parameters:");
            for p in &decl.parameters {
                line(out, level + 2, "Expression: Parameter");
                line(out, level + 3, &format!("Array: {}", p.is_array));
                line(
                    out,
                    level + 3,
                    &format!("Expression(Type): Identifier ({})", p.type_name),
                );
                line(
                    out,
                    level + 3,
                    &format!("Expression(Name): Identifier ({})", p.name),
                );
            }
            line(out, level + 1, "ReturnType:");
            line(
                out,
                level + 2,
                &format!("Array: {}", decl.return_type.is_array),
            );
            line(
                out,
                level + 2,
                &format!(
                    "Expression(Type): Identifier ({})",
                    decl.return_type.type_name
                ),
            );
            line(out, level + 1, "Body:");
            for stmt in &decl.body {
                write_stmt(out, stmt, level + 2);
            }
        }
        StmtKind::Structs(decls) => {
            line(out, level, "Statement: StructsStatement");
            line(out, level + 1, "Structs:");
            for decl in decls {
                line(out, level + 2, &format!("Struct: {}", decl.name));
                line(out, level + 3, "Attributes:");
                for attr in &decl.attributes {
                    line(out, level + 4, "Expression: Attribute");
                    line(out, level + 5, &format!("Array: {}", attr.is_array));
                    line(
                        out,
                        level + 5,
                        &format!("Expression(Type): Identifier ({})", attr.type_name),
                    );
                    line(
                        out,
                        level + 5,
                        &format!("Expression(Name): Identifier ({})", attr.name),
                    );
                }
            }
        }
        StmtKind::Assignment { target, value } => {
            line(out, level, "Statement: AssignmentStatement");
            line(out, level + 1, "Expression(Left):");
            write_expr(out, target, level + 2);
            line(out, level + 1, "Expression(Value):");
            write_expr(out, value, level + 2);
        }
        StmtKind::While { condition, body } => {
            line(out, level, "Statement: WhileStatement");
            line(out, level + 1, "Condition:");
            write_expr(out, condition, level + 2);
            line(out, level + 1, "Body:");
            for stmt in body {
                write_stmt(out, stmt, level + 2);
            }
        }
        StmtKind::For {
            variable,
            start,
            end,
            increment,
            body,
        } => {
            line(out, level, "Statement: ForStatement");
            line(
                out,
                level + 1,
                &format!("Var: Identifier ({})", variable),
            );
            line(out, level + 1, "Start:");
            write_expr(out, start, level + 2);
            line(out, level + 1, "End:");
            write_expr(out, end, level + 2);
            line(out, level + 1, "Increment:");
            write_expr(out, increment, level + 2);
            line(out, level + 1, "Body:");
            for stmt in body {
                write_stmt(out, stmt, level + 2);
            }
        }
        StmtKind::Increment(target) => {
            line(out, level, "Statement: IncrementStatement");
            write_expr(out, target, level + 1);
        }
        StmtKind::Decrement(target) => {
            line(out, level, "Statement: DecrementStatement");
            write_expr(out, target, level + 1);
        }
        StmtKind::PlusEquals { target, amount } => {
            line(out, level, "Statement: PlusEqualsStatement");
            write_expr(out, target, level + 1);
            write_expr(out, amount, level + 1);
        }
        StmtKind::MinusEquals { target, amount } => {
            line(out, level, "Statement: MinusEqualsStatement");
            write_expr(out, target, level + 1);
            write_expr(out, amount, level + 1);
        }
        StmtKind::StarEquals { target, amount } => {
            line(out, level, "Statement: StarEqualsStatement");
            write_expr(out, target, level + 1);
            write_expr(out, amount, level + 1);
        }
    }
}

fn write_decl_block(out: &mut String, name: &str, stmts: &[Stmt], level: usize) {
    line(out, level, &format!("Statement: {}Statement", name));
    line(out, level + 1, "Body:");
    for stmt in stmts {
        write_stmt(out, stmt, level + 2);
    }
}

fn write_expr(out: &mut String, expr: &Expr, level: usize) {
    match &expr.kind {
        ExprKind::Identifier(name) => {
            line(out, level, &format!("Expression: Identifier ({})", name))
        }
        ExprKind::IntLiteral(n) => {
            line(out, level, &format!("Expression: IntegerLiteral ({})", n))
        }
        ExprKind::FloatLiteral(n) => {
            line(out, level, &format!("Expression: FloatLiteral ({})", n))
        }
        ExprKind::StringLiteral(s) => {
            line(out, level, "Expression: StringLiteral");
            line(out, level + 1, &format!("Value: {}", s));
        }
        ExprKind::BoolLiteral(b) => line(out, level, &format!("Expression: Boolean ({})", b)),
        ExprKind::Prefix { op, right } => {
            line(out, level, &format!("Expression: PrefixExpression ({})", op));
            write_expr(out, right, level + 1);
        }
        ExprKind::Infix { left, op, right } => {
            line(out, level, &format!("Expression: InfixExpression ({})", op));
            write_expr(out, left, level + 1);
            write_expr(out, right, level + 1);
        }
        ExprKind::If {
            condition,
            consequence,
            alternative,
        } => {
            line(out, level, "Expression: IfExpression");
            line(out, level + 1, "Condition:");
            write_expr(out, condition, level + 2);
            line(out, level + 1, "Consequence:");
            for stmt in consequence {
                write_stmt(out, stmt, level + 2);
            }
            if let Some(alt) = alternative {
                line(out, level + 1, "Alternative:");
                for stmt in alt {
                    write_stmt(out, stmt, level + 2);
                }
            }
        }
        ExprKind::Array(elements) => {
            line(out, level, "Expression: ArrayLiteral");
            for e in elements {
                write_expr(out, e, level + 1);
            }
        }
        ExprKind::Index { left, index } => {
            line(out, level, "Expression: IndexExpression");
            line(out, level + 1, "Expression(Left):");
            write_expr(out, left, level + 2);
            line(out, level + 1, "Expression(Index):");
            write_expr(out, index, level + 2);
        }
        ExprKind::Accessor { left, fields } => {
            line(out, level, "Expression: AccessorExpression");
            line(out, level + 1, "Expression(Left):");
            write_expr(out, left, level + 2);
            line(out, level + 1, "Fields:");
            for field in fields {
                line(
                    out,
                    level + 2,
                    &format!("Expression: Identifier ({})", field),
                );
            }
        }
        ExprKind::Call { callee, arguments } => {
            line(out, level, "Expression: CallExpression");
            line(out, level + 1, "Function:");
            write_expr(out, callee, level + 2);
            line(out, level + 1, "Arguments:");
            for a in arguments {
                write_expr(out, a, level + 2);
            }
        }
    }
}

/// Render a token stream the way the `ast` CLI mode dumps it.
pub fn print_tokens(tokens: &[crate::lexer::Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        writeln!(out, "{:?}", token.kind).unwrap();
    }
    out
}
