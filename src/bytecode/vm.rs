//! Stack-based virtual machine for executing bytecode.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::chunk::{Bytecode, CompiledFunction};
use crate::bytecode::instruction::{read_u16, read_u8, OpCode};
use crate::bytecode::value::{StructValue, Value};
use crate::error::RuntimeError;

/// Maximum value-stack depth.
pub const STACK_SIZE: usize = 2048;
/// Number of global slots.
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call depth.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// A call frame: the function being executed, its instruction pointer and
/// the stack index where its locals start.
struct Frame {
    function: Rc<CompiledFunction>,
    /// Starts at -1; the run loop pre-increments before each fetch.
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(function: Rc<CompiledFunction>, base_pointer: usize) -> Self {
        Self {
            function,
            ip: -1,
            base_pointer,
        }
    }
}

/// The virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    /// Fixed-size stack; `sp` is the live count. The slot at `sp` holds the
    /// most recently popped value, which the REPL reads back.
    stack: Vec<Value>,
    sp: usize,
    globals: Rc<RefCell<Vec<Value>>>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, Self::new_globals())
    }

    /// Build a VM sharing an existing globals store, so a REPL keeps
    /// variable state across runs.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        let main_function = Rc::new(CompiledFunction::new(bytecode.instructions, 0, 0));
        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames: vec![Frame::new(main_function, 0)],
        }
    }

    /// A fresh globals store with every slot `Null`.
    pub fn new_globals() -> Rc<RefCell<Vec<Value>>> {
        Rc::new(RefCell::new(vec![Value::Null; GLOBALS_SIZE]))
    }

    /// The value most recently removed by `Pop`: the REPL's printable
    /// result.
    pub fn last_popped_stack_element(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Run until the main frame's instructions are exhausted.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip
            < self.current_frame().function.instructions.len() as isize - 1
        {
            self.current_frame_mut().ip += 1;

            let function = Rc::clone(&self.current_frame().function);
            let code = &function.instructions;
            let ip = self.current_frame().ip as usize;

            let byte = code[ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match op {
                OpCode::Constant => {
                    let index = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }

                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Null => self.push(Value::Null)?,

                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                OpCode::Minus => {
                    let operand = self.pop();
                    let negated = match operand {
                        Value::Int(n) => Value::Int(-n),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "unsupported type for negation: {}",
                                other.type_name()
                            )));
                        }
                    };
                    self.push(negated)?;
                }

                OpCode::Bang => {
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }

                OpCode::Jump => {
                    let target = read_u16(code, ip + 1) as isize;
                    self.current_frame_mut().ip = target - 1;
                }

                OpCode::JumpNotTruthy => {
                    let target = read_u16(code, ip + 1) as isize;
                    self.current_frame_mut().ip += 2;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }

                OpCode::SetGlobal => {
                    let index = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.pop();
                    self.globals.borrow_mut()[index] = value;
                }

                OpCode::GetGlobal => {
                    let index = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.globals.borrow()[index].clone();
                    self.push(value)?;
                }

                OpCode::SetLocal => {
                    let slot = read_u8(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + slot] = value;
                }

                OpCode::GetLocal => {
                    let slot = read_u8(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 1;
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }

                OpCode::GetBuiltin => {
                    let index = read_u8(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 1;
                    let builtin = &crate::bytecode::builtins::BUILTINS[index];
                    self.push(Value::Builtin(builtin))?;
                }

                OpCode::Array => {
                    let count = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::array(elements))?;
                }

                OpCode::Struct => {
                    let count = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.build_struct(count)?;
                    self.push(value)?;
                }

                OpCode::GetAttribute => {
                    let index = read_u16(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 2;
                    let name = match &self.constants[index] {
                        Value::Str(s) => s.clone(),
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "attribute name must be STRING, got {}",
                                other.type_name()
                            )));
                        }
                    };
                    let target = self.pop();
                    let Value::Struct(s) = target else {
                        return Err(RuntimeError::type_mismatch(format!(
                            "attribute access on {}",
                            target.type_name()
                        )));
                    };
                    let value = s
                        .borrow()
                        .attributes
                        .get(name.as_str())
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.push(value)?;
                }

                OpCode::Index => {
                    let index = self.pop();
                    let target = self.pop();
                    self.execute_index_expression(target, index)?;
                }

                OpCode::Call => {
                    let num_args = read_u8(code, ip + 1) as usize;
                    self.current_frame_mut().ip += 1;
                    self.execute_call(num_args)?;
                }

                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                OpCode::Return => {
                    let frame = self.pop_frame();
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
            }
        }
        Ok(())
    }

    // ===== Operations =====

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        let result = match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => match op {
                OpCode::Add => Value::Int(l + r),
                OpCode::Sub => Value::Int(l - r),
                OpCode::Mul => Value::Int(l * r),
                OpCode::Div => {
                    if *r == 0 {
                        return Err(RuntimeError::DivideByZero);
                    }
                    // Integer division truncates toward zero.
                    Value::Int(l / r)
                }
                _ => unreachable!(),
            },
            (Value::Float(l), Value::Float(r)) => match op {
                OpCode::Add => Value::Float(l + r),
                OpCode::Sub => Value::Float(l - r),
                OpCode::Mul => Value::Float(l * r),
                OpCode::Div => Value::Float(l / r),
                _ => unreachable!(),
            },
            (Value::Str(l), Value::Str(r)) if op == OpCode::Add => {
                Value::string(format!("{}{}", l, r))
            }
            _ => {
                return Err(RuntimeError::type_mismatch(format!(
                    "unsupported types for binary operation: {} {}",
                    left.type_name(),
                    right.type_name()
                )));
            }
        };
        self.push(result)
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        let result = match op {
            OpCode::Equal | OpCode::NotEqual => {
                let equal = match (&left, &right) {
                    (Value::Int(l), Value::Int(r)) => l == r,
                    (Value::Float(l), Value::Float(r)) => l == r,
                    (Value::Bool(l), Value::Bool(r)) => l == r,
                    (Value::Str(l), Value::Str(r)) => l == r,
                    (Value::Null, Value::Null) => true,
                    _ => {
                        return Err(RuntimeError::type_mismatch(format!(
                            "cannot compare {} and {}",
                            left.type_name(),
                            right.type_name()
                        )));
                    }
                };
                if op == OpCode::Equal {
                    equal
                } else {
                    !equal
                }
            }
            OpCode::GreaterThan => match (&left, &right) {
                (Value::Int(l), Value::Int(r)) => l > r,
                (Value::Float(l), Value::Float(r)) => l > r,
                _ => {
                    return Err(RuntimeError::type_mismatch(format!(
                        "cannot order {} and {}",
                        left.type_name(),
                        right.type_name()
                    )));
                }
            },
            _ => unreachable!(),
        };
        self.push(Value::Bool(result))
    }

    fn execute_index_expression(&mut self, target: Value, index: Value) -> VmResult<()> {
        match (&target, &index) {
            (Value::Array(elements), Value::Int(i)) => {
                let elements = elements.borrow();
                let value = if *i >= 0 && (*i as usize) < elements.len() {
                    elements[*i as usize].clone()
                } else {
                    Value::Null
                };
                drop(elements);
                self.push(value)
            }
            _ => Err(RuntimeError::type_mismatch(format!(
                "index operator not supported: {}[{}]",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    /// Pop `count` stacked values: the struct's type name first, then
    /// attribute name/value pairs in declaration order.
    fn build_struct(&mut self, count: usize) -> VmResult<Value> {
        if count == 0 || count % 2 == 0 {
            return Err(RuntimeError::type_mismatch(format!(
                "malformed struct construction of {} values",
                count
            )));
        }
        let start = self.sp - count;

        let Value::Str(name) = self.stack[start].clone() else {
            return Err(RuntimeError::type_mismatch(format!(
                "struct type name must be STRING, got {}",
                self.stack[start].type_name()
            )));
        };

        let mut attributes = IndexMap::new();
        let mut i = start + 1;
        while i < start + count {
            let Value::Str(key) = self.stack[i].clone() else {
                return Err(RuntimeError::type_mismatch(format!(
                    "struct attribute name must be STRING, got {}",
                    self.stack[i].type_name()
                )));
            };
            attributes.insert(key.as_str().to_string(), self.stack[i + 1].clone());
            i += 2;
        }

        self.sp = start;
        Ok(Value::struct_value(StructValue {
            name: name.as_str().to_string(),
            attributes,
        }))
    }

    /// With `num_args` arguments on top of the stack and the callee below
    /// them, dispatch on the callee.
    fn execute_call(&mut self, num_args: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Function(function) => self.call_function(function, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            other => Err(RuntimeError::NonCallable(other.type_name())),
        }
    }

    fn call_function(
        &mut self,
        function: Rc<CompiledFunction>,
        num_args: usize,
    ) -> VmResult<()> {
        if num_args != function.num_parameters as usize {
            return Err(RuntimeError::ArityMismatch {
                expected: function.num_parameters as usize,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + function.num_locals as usize;
        if new_sp > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(function, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    fn call_builtin(
        &mut self,
        builtin: &'static crate::bytecode::builtins::Builtin,
        num_args: usize,
    ) -> VmResult<()> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(args);
        // Drop the arguments and the callee.
        self.sp = self.sp - num_args - 1;

        match result {
            Ok(Some(value)) => self.push(value),
            Ok(None) => self.push(Value::Null),
            Err(message) => Err(RuntimeError::BuiltinError(message)),
        }
    }

    // ===== Stack and frame plumbing =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop the top of stack. The value stays in its slot until overwritten,
    /// which is what `last_popped_stack_element` reads.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no current frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no current frame")
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack underflow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run(input: &str) -> Value {
        try_run(input).unwrap_or_else(|e| panic!("vm error for {:?}: {}", input, e))
    }

    fn try_run(input: &str) -> VmResult<Value> {
        let tokens = Scanner::new(input).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compiler error");
        let mut vm = Vm::new(compiler.bytecode());
        vm.run()?;
        Ok(vm.last_popped_stack_element())
    }

    fn check_int(input: &str, expected: i64) {
        assert_eq!(run(input), Value::Int(expected), "input: {}", input);
    }

    fn check_bool(input: &str, expected: bool) {
        assert_eq!(run(input), Value::Bool(expected), "input: {}", input);
    }

    fn check_null(input: &str) {
        assert_eq!(run(input), Value::Null, "input: {}", input);
    }

    fn check_int_array(input: &str, expected: &[i64]) {
        let expected: Vec<Value> = expected.iter().copied().map(Value::Int).collect();
        assert_eq!(run(input), Value::array(expected), "input: {}", input);
    }

    #[test]
    fn test_integer_arithmetic() {
        check_int("1", 1);
        check_int("2", 2);
        check_int("1 + 2", 3);
        check_int("1 - 2", -1);
        check_int("1 * 2", 2);
        check_int("4 / 2", 2);
        check_int("50 / 2 * 2 + 10 - 5", 55);
        check_int("5 + 5 + 5 + 5 - 10", 10);
        check_int("2 * 2 * 2 * 2 * 2", 32);
        check_int("5 * 2 + 10", 20);
        check_int("5 + 2 * 10", 25);
        check_int("5 * (2 + 10)", 60);
        check_int("-5", -5);
        check_int("-50 + 100 + -50", 0);
        check_int("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50);
        // Integer division truncates toward zero.
        check_int("7 / 2", 3);
        check_int("-7 / 2", -3);
    }

    #[test]
    fn test_float_arithmetic() {
        assert_eq!(run("1.5 + 2.25"), Value::Float(3.75));
        assert_eq!(run("2.0 * 3.5"), Value::Float(7.0));
        assert_eq!(run("-1.5"), Value::Float(-1.5));
        assert_eq!(run("7.0 / 2.0"), Value::Float(3.5));
    }

    #[test]
    fn test_boolean_expressions() {
        check_bool("true", true);
        check_bool("false", false);
        check_bool("1 < 2", true);
        check_bool("1 > 2", false);
        check_bool("1 < 1", false);
        check_bool("1 > 1", false);
        check_bool("1 <= 1", true);
        check_bool("1 >= 2", false);
        check_bool("2 >= 2", true);
        check_bool("1 == 1", true);
        check_bool("1 != 1", false);
        check_bool("1 == 2", false);
        check_bool("1 != 2", true);
        check_bool("true == true", true);
        check_bool("false == false", true);
        check_bool("true == false", false);
        check_bool("true != false", true);
        check_bool("(1 < 2) == true", true);
        check_bool("(1 < 2) == false", false);
        check_bool("(1 > 2) == true", false);
        check_bool("(1 > 2) == false", true);
        check_bool("!true", false);
        check_bool("!false", true);
        check_bool("!5", false);
        check_bool("!!true", true);
        check_bool("!!false", false);
        check_bool("!!5", true);
    }

    #[test]
    fn test_conditionals() {
        check_int("if (true) { 10 }", 10);
        check_int("if (true) { 10 } else { 20 }", 10);
        check_int("if (false) { 10 } else { 20 }", 20);
        check_int("if (1) { 10 }", 10);
        check_int("if (1 < 2) { 10 }", 10);
        check_int("if (1 < 2) { 10 } else { 20 }", 10);
        check_int("if (1 > 2) { 10 } else { 20 }", 20);
        check_null("if (1 > 2) { 10 }");
        check_null("if (false) { 10 }");
        check_bool("!(if (false) { 5; })", true);
        check_int("if ((if (false) { 10 })) { 10 } else { 20 }", 20);
    }

    #[test]
    fn test_string_expressions() {
        assert_eq!(run("\"monkey\""), Value::string("monkey"));
        assert_eq!(run("\"mon\" + \"key\""), Value::string("monkey"));
        assert_eq!(
            run("\"mon\" + \"key\" + \"banana\""),
            Value::string("monkeybanana")
        );
    }

    #[test]
    fn test_global_variable_statements() {
        check_int("global { int one = 1; } one;", 1);
        check_int("global { int one = 1; int two = 2; } one + two;", 3);
        check_int("global { int one = 1; int two = one + one; } one + two;", 3);
    }

    #[test]
    fn test_const_statements() {
        check_int("const { int answer = 42; } answer;", 42);
    }

    #[test]
    fn test_array_statements() {
        check_int_array("global { int v[]; } v;", &[0]);
        check_int_array("global { int v[3]; } v;", &[0, 0, 0]);
        check_int_array("global { int v[] = {1,2,3}; } v;", &[1, 2, 3]);
        check_int_array("global { int v[] = {1+2, 3-4, 5*6}; } v;", &[3, -1, 30]);
    }

    #[test]
    fn test_index_expressions() {
        check_int("global { int v[3] = {1,2,3}; } v[1]", 2);
        check_int("global { int v[3] = {1,2,3}; } v[0 + 2]", 3);
        check_int("global { int v[]; } v[0]", 0);
        check_null("global { int v[] = {1,2,3}; } v[99]");
        check_null("global { int v[] = {1,2,3}; } v[-1]");
    }

    #[test]
    fn test_calling_functions_without_arguments() {
        check_int("add() int { add = 5 + 10; } add();", 15);
        check_int(
            "a() int { a = 1; }
             b() int { b = a() + 1; }
             c() int { c = b() + 1; }
             c();",
            3,
        );
    }

    #[test]
    fn test_functions_without_return_assignment() {
        check_int("noReturn() int { } noReturn();", 0);
        check_int_array("noReturn() int[] { } noReturn();", &[0]);
        check_int(
            "noReturn() int { }
             noReturnTwo() int { noReturnTwo = noReturn(); }
             noReturn();
             noReturnTwo();",
            0,
        );
        check_bool(
            "noReturn() bool { }
             noReturnTwo() int { noReturnTwo = noReturn(); }
             noReturn();
             noReturnTwo();",
            false,
        );
        assert_eq!(
            run("noReturn() float { }
                 noReturnTwo() int { noReturnTwo = noReturn(); }
                 noReturn();
                 noReturnTwo();"),
            Value::Float(0.0)
        );
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        check_int(
            "wow() int {
                local {
                    int a = 30;
                    int b = 30;
                }
                wow = a + b;
            }
            wow();",
            60,
        );
        check_int(
            "oneAndTwo() int {
                local { int one = 1; int two = 2; }
                oneAndTwo = one + two;
            }
            threeAndFour() int {
                local { int three = 3; int four = 4; }
                threeAndFour = three + four;
            }
            oneAndTwo() + threeAndFour();",
            10,
        );
        check_int(
            "global { int globalSeed = 50; }
             minusOne() int {
                local { int num = 1; }
                minusOne = globalSeed - num;
             }
             minusTwo() int {
                local { int num = 2; }
                minusTwo = globalSeed - num;
             }
             minusOne() + minusTwo();",
            97,
        );
    }

    #[test]
    fn test_calling_functions_with_arguments() {
        check_int("identity(int a) int { identity = a; } identity(4);", 4);
        check_int("sum(int a, b) int { sum = a + b; } sum(1, 2);", 3);
        check_int(
            "sum(int a, b) int {
                local { int c = a + b; }
                sum = c;
             }
             sum(1, 2) + sum(3, 4);",
            10,
        );
        check_int(
            "global { int outer = 10; }
             sum(int a, b) int {
                local { int c = a + b; }
                sum = c + outer;
             }
             sum(1, 2) + sum(3, 4) + outer;",
            30,
        );
    }

    #[test]
    fn test_while_loops() {
        check_int(
            "global { int i = 0; int total = 0; }
             while (i < 10) {
                total = total + i;
                i = i + 1;
             }
             total;",
            45,
        );
        check_int(
            "global { int i = 5; }
             while (i < 0) { i = i + 1; }
             i;",
            5,
        );
    }

    #[test]
    fn test_for_loops() {
        check_int(
            "global { int total = 0; }
             for (i, 1, 5, 1) { total = total + i; }
             total;",
            15,
        );
        check_int(
            "global { int total = 0; }
             for (i, 0, 10, 2) { total = total + i; }
             total;",
            30,
        );
    }

    #[test]
    fn test_increment_and_compound_assignment() {
        check_int("global { int x = 1; } x++; x;", 2);
        check_int("global { int x = 1; } x--; x;", 0);
        check_int("global { int x = 2; } x += 3; x;", 5);
        check_int("global { int x = 5; } x -= 3; x;", 2);
        check_int("global { int x = 3; } x *= 4; x;", 12);
    }

    #[test]
    fn test_locals_with_loops() {
        check_int(
            "sumTo(int n) int {
                local { int total = 0; int i = 0; }
                while (i <= n) {
                    total = total + i;
                    i = i + 1;
                }
                sumTo = total;
             }
             sumTo(10);",
            55,
        );
    }

    #[test]
    fn test_struct_declaration_and_access() {
        check_int(
            "structs { circle {int center, int radius;}; }
             global { circle c; }
             c.center;",
            0,
        );
        check_null(
            "structs { circle {int center, int radius;}; }
             global { circle c; }
             c.missing;",
        );
        assert_eq!(
            run("structs { point3D {float x, y, z;}; }
                 global { point3D p; }
                 p.z;"),
            Value::Float(0.0)
        );
    }

    #[test]
    fn test_builtin_len() {
        check_int("global { int v[] = {1,2,3}; } len(v);", 3);
        check_int("len(\"hello\");", 5);
        check_int("len(\"\");", 0);
        check_int("global { int v[] = {1,2,3}; } wow() int { wow = len(v); } wow();", 3);
    }

    #[test]
    fn test_builtin_math() {
        assert_eq!(run("pow(2, 10);"), Value::Float(1024.0));
        assert_eq!(run("square_root(16);"), Value::Float(4.0));
        check_int_array("gen(1, 5);", &[1, 2, 3, 4, 5]);
        check_int("len(gen(1, 100));", 100);
    }

    #[test]
    fn test_builtin_errors() {
        let err = try_run("len(1);").unwrap_err();
        assert!(matches!(err, RuntimeError::BuiltinError(msg)
            if msg.contains("argument to `len` not supported")));

        let err = try_run("len(\"one\", \"two\");").unwrap_err();
        assert!(matches!(err, RuntimeError::BuiltinError(msg)
            if msg.contains("wrong number of arguments")));

        let err = try_run("square_root(0 - 4);").unwrap_err();
        assert!(matches!(err, RuntimeError::BuiltinError(msg)
            if msg.contains("non-negative")));

        let err = try_run("gen(1.5, 2);").unwrap_err();
        assert!(matches!(err, RuntimeError::BuiltinError(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = try_run("1 / 0;").unwrap_err();
        assert!(matches!(err, RuntimeError::DivideByZero));
    }

    #[test]
    fn test_type_mismatches() {
        assert!(matches!(
            try_run("1 + true;").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
        assert!(matches!(
            try_run("1 + 2.5;").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
        assert!(matches!(
            try_run("1 == 1.0;").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
        assert!(matches!(
            try_run("\"a\" > \"b\";").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
        assert!(matches!(
            try_run("-true;").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
        assert!(matches!(
            try_run("\"s\"[0];").unwrap_err(),
            RuntimeError::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = try_run("f(int a) int { f = a; } f();").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ArityMismatch {
                expected: 1,
                got: 0
            }
        ));

        let err = try_run("f() int { } f(1);").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ArityMismatch {
                expected: 0,
                got: 1
            }
        ));
    }

    #[test]
    fn test_calling_non_function() {
        let err = try_run("global { int x = 1; } x();").unwrap_err();
        assert!(matches!(err, RuntimeError::NonCallable("INTEGER")));
    }

    #[test]
    fn test_frame_overflow() {
        // Function names only bind after their body compiles, so direct
        // recursion cannot be written in source. Hand-assemble a function
        // that calls itself through its global slot instead.
        use crate::bytecode::instruction::make;

        let body = [
            make(OpCode::GetGlobal, &[0]),
            make(OpCode::Call, &[0]),
            make(OpCode::ReturnValue, &[]),
        ]
        .concat();
        let function = Value::Function(Rc::new(CompiledFunction::new(body, 0, 0)));

        let main = [
            make(OpCode::Constant, &[0]),
            make(OpCode::SetGlobal, &[0]),
            make(OpCode::GetGlobal, &[0]),
            make(OpCode::Call, &[0]),
            make(OpCode::Pop, &[]),
        ]
        .concat();

        let mut vm = Vm::new(Bytecode::new(main, vec![function]));
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::FrameOverflow));
    }

    #[test]
    fn test_stack_overflow() {
        use crate::bytecode::instruction::make;

        // Push one more constant than the stack holds.
        let mut main = Vec::new();
        for _ in 0..STACK_SIZE + 1 {
            main.extend(make(OpCode::Constant, &[0]));
        }

        let mut vm = Vm::new(Bytecode::new(main, vec![Value::Int(1)]));
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut vm = Vm::new(Bytecode::new(vec![0xEE], vec![]));
        let err = vm.run().unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownOpcode(0xEE)));
    }

    #[test]
    fn test_stack_is_balanced_after_run() {
        let inputs = [
            "1 + 2;",
            "global { int v[] = {1,2,3}; } v[1];",
            "f() int { f = 7; } f();",
            "structs { p {int x;}; } global { p a; } a.x;",
            "global { int i = 0; } while (i < 3) { i = i + 1; } i;",
        ];
        for input in inputs {
            let tokens = Scanner::new(input).scan_tokens().unwrap();
            let program = Parser::new(tokens).parse().unwrap();
            let mut compiler = Compiler::new();
            compiler.compile(&program).unwrap();
            let mut vm = Vm::new(compiler.bytecode());
            vm.run().unwrap();
            assert_eq!(vm.sp, 0, "stack not empty after {:?}", input);
        }
    }

    #[test]
    fn test_globals_store_is_shared_across_runs() {
        let globals = Vm::new_globals();
        let symbol_table;
        let constants;

        // First run defines a global.
        {
            let tokens = Scanner::new("global { int x = 41; }").scan_tokens().unwrap();
            let program = Parser::new(tokens).parse().unwrap();
            let mut compiler = Compiler::new();
            compiler.compile(&program).unwrap();
            let bytecode = compiler.bytecode();
            symbol_table = compiler.symbol_table();
            constants = bytecode.constants.clone();
            let mut vm = Vm::new_with_globals_store(bytecode, globals.clone());
            vm.run().unwrap();
        }

        // Second run reads it back through the shared store.
        {
            let tokens = Scanner::new("x + 1;").scan_tokens().unwrap();
            let program = Parser::new(tokens).parse().unwrap();
            let mut compiler = Compiler::new_with_state(symbol_table, constants);
            compiler.compile(&program).unwrap();
            let mut vm = Vm::new_with_globals_store(compiler.bytecode(), globals);
            vm.run().unwrap();
            assert_eq!(vm.last_popped_stack_element(), Value::Int(42));
        }
    }

    #[test]
    fn test_aggregates_share_identity() {
        // Both globals point at the same array cell, so reading through
        // either shows the same data.
        check_int(
            "global { int v[] = {1, 2, 3}; }
             first(int arr[]) int { first = arr[0]; }
             first(v);",
            1,
        );
    }
}
