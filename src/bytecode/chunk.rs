//! Compiled program units: instruction buffers plus their constant pool.

use crate::bytecode::value::Value;
use std::fmt;

/// The output of compilation: top-level instructions and the constant pool
/// shared by every function in the program.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

impl Bytecode {
    pub fn new(instructions: Vec<u8>, constants: Vec<Value>) -> Self {
        Self {
            instructions,
            constants,
        }
    }
}

/// A compiled function stored in the constant pool.
///
/// Slots `0..num_parameters` of a frame hold the call arguments in
/// left-to-right order; slots up to `num_locals` are reserved for local
/// declarations. `num_locals >= num_parameters` always holds.
#[derive(Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: u16,
    pub num_parameters: u16,
}

impl CompiledFunction {
    pub fn new(instructions: Vec<u8>, num_locals: u16, num_parameters: u16) -> Self {
        debug_assert!(num_locals >= num_parameters);
        Self {
            instructions,
            num_locals,
            num_parameters,
        }
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledFunction(locals: {}, params: {}, {} bytes)",
            self.num_locals,
            self.num_parameters,
            self.instructions.len()
        )
    }
}
