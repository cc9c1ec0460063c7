//! Bytecode compiler: lowers the AST to stack-machine instructions.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Expr, ExprKind, FunctionDecl, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::bytecode::chunk::{Bytecode, CompiledFunction};
use crate::bytecode::instruction::{make, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::bytecode::value::{StructValue, Value};
use crate::error::CompileError;
use crate::span::Span;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Bookkeeping for the most recent emissions in a scope, used for
/// back-patching and the trailing-`Pop` rewrites.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// A per-function (or top-level) instruction buffer.
#[derive(Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    /// Create a compiler with a fresh global scope and the builtin table
    /// registered.
    pub fn new() -> Self {
        Self {
            constants: Vec::new(),
            symbol_table: SymbolTable::new_with_builtins(),
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Create a compiler that continues from an earlier run's symbol table
    /// and constant pool, so a REPL accumulates definitions across lines.
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// The compiled top-level instructions plus the constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode::new(
            self.scopes[self.scope_index].instructions.clone(),
            self.constants.clone(),
        )
    }

    /// Hand the symbol table back to a REPL driver.
    pub fn symbol_table(&self) -> Rc<RefCell<SymbolTable>> {
        self.symbol_table.clone()
    }

    // ===== Statements =====

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            StmtKind::Global(body) => {
                self.compile_global_block(body, false)?;
            }

            StmtKind::Const(body) => {
                self.compile_global_block(body, true)?;
            }

            StmtKind::Local(body) => {
                for decl in body {
                    let Some(name) = declaration_name(decl) else {
                        return Err(CompileError::IllegalStatementInVariableBlock(decl.span));
                    };
                    self.compile_statement(decl)?;
                    let symbol = self.symbol_table.borrow_mut().define(&name);
                    self.emit(OpCode::SetLocal, &[symbol.index as usize]);
                }
            }

            StmtKind::Variable {
                type_name, value, ..
            } => {
                let struct_type = self.symbol_table.borrow().resolve_struct(type_name);
                if let Some(struct_symbol) = struct_type {
                    // A struct-typed declaration pushes a prebuilt instance
                    // carrying the registered attribute defaults.
                    let instance = Value::struct_value(StructValue {
                        name: struct_symbol.name.clone(),
                        attributes: struct_symbol.attributes.clone(),
                    });
                    let index = self.add_constant(instance);
                    self.emit(OpCode::Constant, &[index]);
                } else if let Some(value) = value {
                    self.compile_expression(value)?;
                } else {
                    self.emit(OpCode::Null, &[]);
                }
            }

            StmtKind::ArrayDecl { values, .. } => {
                for value in values {
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Array, &[values.len()]);
            }

            StmtKind::Function(decl) => {
                self.compile_function_statement(decl)?;
            }

            StmtKind::Structs(decls) => {
                self.compile_structs_statement(decls)?;
            }

            StmtKind::Assignment { target, value } => {
                self.compile_assignment(target, value)?;
            }

            StmtKind::While { condition, body } => {
                let condition_pos = self.current_instructions().len();
                self.compile_expression(condition)?;
                let exit_jump = self.emit(OpCode::JumpNotTruthy, &[0xFFFF]);

                for stmt in body {
                    self.compile_statement(stmt)?;
                }
                self.emit(OpCode::Jump, &[condition_pos]);

                let after_body = self.current_instructions().len();
                self.change_operand(exit_jump, after_body);
            }

            StmtKind::For {
                variable,
                start,
                end,
                increment,
                body,
            } => {
                self.compile_for_statement(variable, start, end, increment, body, stmt.span)?;
            }

            StmtKind::Increment(target) => {
                self.compile_compound_assignment(target, None, OpCode::Add)?;
            }

            StmtKind::Decrement(target) => {
                self.compile_compound_assignment(target, None, OpCode::Sub)?;
            }

            StmtKind::PlusEquals { target, amount } => {
                self.compile_compound_assignment(target, Some(amount), OpCode::Add)?;
            }

            StmtKind::MinusEquals { target, amount } => {
                self.compile_compound_assignment(target, Some(amount), OpCode::Sub)?;
            }

            StmtKind::StarEquals { target, amount } => {
                self.compile_compound_assignment(target, Some(amount), OpCode::Mul)?;
            }
        }
        Ok(())
    }

    /// `global { ... }` and `const { ... }`: compile each declaration's
    /// value, then bind it to a fresh global slot.
    fn compile_global_block(&mut self, body: &[Stmt], is_const: bool) -> CompileResult<()> {
        for decl in body {
            let Some(name) = declaration_name(decl) else {
                return Err(CompileError::GlobalStatementContainsNonVariable(decl.span));
            };
            if is_const && self.symbol_table.borrow().is_defined_locally(&name) {
                return Err(CompileError::RedefinedConst(name, decl.span));
            }
            self.compile_statement(decl)?;
            let symbol = self.symbol_table.borrow_mut().define(&name);
            self.emit(OpCode::SetGlobal, &[symbol.index as usize]);
        }
        Ok(())
    }

    /// Function definitions compile their body into a fresh scope, then
    /// store the resulting function constant under the function's name.
    ///
    /// Inside the body, `name = expr;` where `name` is the function itself
    /// is the return idiom: it compiles to `ReturnValue` instead of a store.
    fn compile_function_statement(&mut self, decl: &FunctionDecl) -> CompileResult<()> {
        self.enter_scope();

        for parameter in &decl.parameters {
            self.symbol_table.borrow_mut().define(&parameter.name);
        }

        let mut has_return_value = false;
        for stmt in &decl.body {
            if let StmtKind::Assignment { target, value } = &stmt.kind {
                if let ExprKind::Identifier(name) = &target.kind {
                    if name == &decl.name {
                        self.compile_expression(value)?;
                        self.emit(OpCode::ReturnValue, &[]);
                        has_return_value = true;
                        continue;
                    }
                }
            }
            self.compile_statement(stmt)?;
        }

        if !has_return_value {
            self.compile_default_return(decl)?;
            self.emit(OpCode::ReturnValue, &[]);
        }

        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        let num_locals = self.symbol_table.borrow().num_definitions();
        let instructions = self.leave_scope();

        let function = CompiledFunction::new(
            instructions,
            num_locals,
            decl.parameters.len() as u16,
        );
        let index = self.add_constant(Value::Function(Rc::new(function)));
        self.emit(OpCode::Constant, &[index]);

        let symbol = self.symbol_table.borrow_mut().define(&decl.name);
        self.emit(OpCode::SetGlobal, &[symbol.index as usize]);
        Ok(())
    }

    /// A function body with no return assignment returns its return type's
    /// default value.
    fn compile_default_return(&mut self, decl: &FunctionDecl) -> CompileResult<()> {
        let rt = &decl.return_type;
        let default = match rt.type_name.as_str() {
            "int" => Expr::int(0),
            "bool" => Expr::bool(false),
            "float" => Expr::float(0.0),
            other => {
                return Err(CompileError::UnknownReturnType(other.to_string(), rt.span));
            }
        };
        if rt.is_array {
            self.compile_expression(&Expr::new(ExprKind::Array(vec![default]), Span::default()))
        } else {
            self.compile_expression(&default)
        }
    }

    /// `structs { ... }`: register each struct type and its attribute
    /// defaults, and emit the construction sequence. The `Struct` operand
    /// counts every stacked value: the type name, then one name/value pair
    /// per attribute.
    fn compile_structs_statement(&mut self, decls: &[crate::ast::StructDecl]) -> CompileResult<()> {
        for decl in decls {
            self.symbol_table.borrow_mut().define_struct(&decl.name);

            let name_index = self.add_constant(Value::string(decl.name.clone()));
            self.emit(OpCode::Constant, &[name_index]);

            for attr in &decl.attributes {
                let default = typed_default(&attr.type_name, attr.is_array);
                self.symbol_table.borrow_mut().define_attribute(
                    &decl.name,
                    &attr.name,
                    default,
                );

                let attr_index = self.add_constant(Value::string(attr.name.clone()));
                self.emit(OpCode::Constant, &[attr_index]);
                self.compile_attribute_default(&attr.type_name, attr.is_array)?;
            }

            self.emit(OpCode::Struct, &[1 + decl.attributes.len() * 2]);
            self.emit(OpCode::Pop, &[]);
        }
        Ok(())
    }

    /// Emit instructions producing one attribute's default value.
    fn compile_attribute_default(&mut self, type_name: &str, is_array: bool) -> CompileResult<()> {
        let default = match type_name {
            "int" => Some(Expr::int(0)),
            "bool" => Some(Expr::bool(false)),
            "float" => Some(Expr::float(0.0)),
            "string" => Some(Expr::string("")),
            _ => None,
        };
        match default {
            Some(default) if is_array => {
                self.compile_expression(&Expr::new(ExprKind::Array(vec![default]), Span::default()))
            }
            Some(default) => self.compile_expression(&default),
            None => {
                self.emit(OpCode::Null, &[]);
                Ok(())
            }
        }
    }

    fn compile_assignment(&mut self, target: &Expr, value: &Expr) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .borrow()
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), target.span))?;
                self.compile_expression(value)?;
                self.emit_store(&symbol, target.span)
            }
            // The opcode set has no indexed or attribute store.
            _ => Err(CompileError::IllegalAssignmentTarget(target.span)),
        }
    }

    /// `x++`, `x--`, `x += e`, `x -= e`, `x *= e`: load, combine, store.
    fn compile_compound_assignment(
        &mut self,
        target: &Expr,
        amount: Option<&Expr>,
        op: OpCode,
    ) -> CompileResult<()> {
        let ExprKind::Identifier(name) = &target.kind else {
            return Err(CompileError::IllegalAssignmentTarget(target.span));
        };
        let symbol = self
            .symbol_table
            .borrow()
            .resolve(name)
            .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), target.span))?;

        self.emit_load(&symbol);
        match amount {
            Some(amount) => self.compile_expression(amount)?,
            None => {
                let index = self.add_constant(Value::Int(1));
                self.emit(OpCode::Constant, &[index]);
            }
        }
        self.emit(op, &[]);
        self.emit_store(&symbol, target.span)
    }

    /// `for (i, start, end, inc)`: bind `i`, then loop while `i <= end`,
    /// adding `inc` after each pass. `i <= end` is expressed with the
    /// existing opcodes as `!(i > end)`.
    fn compile_for_statement(
        &mut self,
        variable: &str,
        start: &Expr,
        end: &Expr,
        increment: &Expr,
        body: &[Stmt],
        span: Span,
    ) -> CompileResult<()> {
        let resolved = self.symbol_table.borrow().resolve(variable);
        let symbol = match resolved {
            Some(symbol) if symbol.scope != SymbolScope::Builtin => symbol,
            _ => self.symbol_table.borrow_mut().define(variable),
        };

        self.compile_expression(start)?;
        self.emit_store(&symbol, span)?;

        let loop_start = self.current_instructions().len();
        self.emit_load(&symbol);
        self.compile_expression(end)?;
        self.emit(OpCode::GreaterThan, &[]);
        self.emit(OpCode::Bang, &[]);
        let exit_jump = self.emit(OpCode::JumpNotTruthy, &[0xFFFF]);

        for stmt in body {
            self.compile_statement(stmt)?;
        }

        self.emit_load(&symbol);
        self.compile_expression(increment)?;
        self.emit(OpCode::Add, &[]);
        self.emit_store(&symbol, span)?;
        self.emit(OpCode::Jump, &[loop_start]);

        let after_body = self.current_instructions().len();
        self.change_operand(exit_jump, after_body);
        Ok(())
    }

    // ===== Expressions =====

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                let index = self.add_constant(Value::Int(*n));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::FloatLiteral(n) => {
                let index = self.add_constant(Value::Float(*n));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::StringLiteral(s) => {
                let index = self.add_constant(Value::string(s.clone()));
                self.emit(OpCode::Constant, &[index]);
            }

            ExprKind::BoolLiteral(true) => {
                self.emit(OpCode::True, &[]);
            }
            ExprKind::BoolLiteral(false) => {
                self.emit(OpCode::False, &[]);
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .borrow()
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), expr.span))?;
                self.emit_load(&symbol);
            }

            ExprKind::Prefix { op, right } => {
                self.compile_expression(right)?;
                match op {
                    PrefixOp::Bang => self.emit(OpCode::Bang, &[]),
                    PrefixOp::Minus => self.emit(OpCode::Minus, &[]),
                };
            }

            ExprKind::Infix { left, op, right } => {
                self.compile_infix_expression(left, *op, right, expr.span)?;
            }

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_not_truthy = self.emit(OpCode::JumpNotTruthy, &[0xFFFF]);

                for stmt in consequence {
                    self.compile_statement(stmt)?;
                }
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }
                let jump = self.emit(OpCode::Jump, &[0xFFFF]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(alternative) => {
                        for stmt in alternative {
                            self.compile_statement(stmt)?;
                        }
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative);
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }

            ExprKind::Accessor { left, fields } => {
                self.compile_expression(left)?;
                for field in fields {
                    let index = self.add_constant(Value::string(field.clone()));
                    self.emit(OpCode::GetAttribute, &[index]);
                }
            }

            ExprKind::Call { callee, arguments } => {
                self.compile_expression(callee)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_infix_expression(
        &mut self,
        left: &Expr,
        op: InfixOp,
        right: &Expr,
        span: Span,
    ) -> CompileResult<()> {
        match op {
            // `a < b` compiles as `b > a`.
            InfixOp::Lt => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(OpCode::GreaterThan, &[]);
            }
            // `a <= b` compiles as `!(a > b)`.
            InfixOp::Lte => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(OpCode::GreaterThan, &[]);
                self.emit(OpCode::Bang, &[]);
            }
            // `a >= b` compiles as `!(b > a)`.
            InfixOp::Gte => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(OpCode::GreaterThan, &[]);
                self.emit(OpCode::Bang, &[]);
            }
            InfixOp::And | InfixOp::Or => {
                return Err(CompileError::UnknownOperator(op.to_string(), span));
            }
            _ => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match op {
                    InfixOp::Add => self.emit(OpCode::Add, &[]),
                    InfixOp::Sub => self.emit(OpCode::Sub, &[]),
                    InfixOp::Mul => self.emit(OpCode::Mul, &[]),
                    InfixOp::Div => self.emit(OpCode::Div, &[]),
                    InfixOp::Gt => self.emit(OpCode::GreaterThan, &[]),
                    InfixOp::Eq => self.emit(OpCode::Equal, &[]),
                    InfixOp::NotEq => self.emit(OpCode::NotEqual, &[]),
                    _ => unreachable!("handled above"),
                };
            }
        }
        Ok(())
    }

    // ===== Symbol plumbing =====

    fn emit_load(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index as usize]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index as usize]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index as usize]),
        };
    }

    fn emit_store(&mut self, symbol: &Symbol, span: Span) -> CompileResult<()> {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(OpCode::SetGlobal, &[symbol.index as usize]);
                Ok(())
            }
            SymbolScope::Local => {
                self.emit(OpCode::SetLocal, &[symbol.index as usize]);
                Ok(())
            }
            SymbolScope::Builtin => Err(CompileError::IllegalAssignmentTarget(span)),
        }
    }

    // ===== Scope management =====

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        self.symbol_table = SymbolTable::new_enclosed(self.symbol_table.clone());
    }

    fn leave_scope(&mut self) -> Vec<u8> {
        let scope = self.scopes.pop().expect("scope stack underflow");
        self.scope_index -= 1;

        let outer = self
            .symbol_table
            .borrow()
            .outer()
            .expect("left the global scope");
        self.symbol_table = outer;

        scope.instructions
    }

    // ===== Emission =====

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = &mut self.scopes[self.scope_index];
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scopes[self.scope_index]
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
            scope.previous_instruction = None;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = self.scopes[self.scope_index]
            .last_instruction
            .expect("no instruction to replace")
            .position;
        let new_instruction = make(OpCode::ReturnValue, &[]);
        self.replace_instruction(position, &new_instruction);
        if let Some(last) = &mut self.scopes[self.scope_index].last_instruction {
            last.opcode = OpCode::ReturnValue;
        }
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.scopes[self.scope_index].instructions;
        instructions[position..position + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Rewrite a previously emitted instruction's 2-byte operand in place.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.scopes[self.scope_index].instructions[position])
            .expect("patching an invalid opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    fn current_instructions(&self) -> &[u8] {
        &self.scopes[self.scope_index].instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// The declared name when a statement is a scalar or array declaration.
fn declaration_name(stmt: &Stmt) -> Option<String> {
    match &stmt.kind {
        StmtKind::Variable { name, .. } => Some(name.clone()),
        StmtKind::ArrayDecl { name, .. } => Some(name.clone()),
        _ => None,
    }
}

/// The registry default for a struct attribute of the given type.
fn typed_default(type_name: &str, is_array: bool) -> Value {
    let scalar = match type_name {
        "int" => Value::Int(0),
        "bool" => Value::Bool(false),
        "float" => Value::Float(0.0),
        "string" => Value::string(""),
        _ => Value::Null,
    };
    if is_array {
        Value::array(vec![scalar])
    } else {
        scalar
    }
}
