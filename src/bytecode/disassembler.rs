//! Bytecode disassembler for debugging and the `vm` file driver.

use std::fmt::Write;

use crate::bytecode::chunk::Bytecode;
use crate::bytecode::instruction::{read_operands, OpCode};
use crate::bytecode::value::Value;

/// Render an instruction buffer as `OFFSET OPCODE operands`, one per line.
pub fn disassemble(code: &[u8]) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < code.len() {
        let byte = code[offset];
        let Some(op) = OpCode::from_u8(byte) else {
            writeln!(output, "{:04} <unknown opcode {}>", offset, byte).unwrap();
            offset += 1;
            continue;
        };

        let (operands, read) = read_operands(op, code, offset + 1);
        write!(output, "{:04} {:?}", offset, op).unwrap();
        for operand in &operands {
            write!(output, " {}", operand).unwrap();
        }
        output.push('\n');

        offset += 1 + read;
    }

    output
}

/// Render a full compilation unit: the constant pool (with nested function
/// listings) followed by the top-level instructions.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    writeln!(output, "== constants ==").unwrap();
    for (i, constant) in bytecode.constants.iter().enumerate() {
        match constant {
            Value::Function(function) => {
                writeln!(
                    output,
                    "{:4} CompiledFunction (locals: {}, params: {}):",
                    i, function.num_locals, function.num_parameters
                )
                .unwrap();
                for line in disassemble(&function.instructions).lines() {
                    writeln!(output, "       {}", line).unwrap();
                }
            }
            other => writeln!(output, "{:4} {}", i, other.inspect()).unwrap(),
        }
    }

    writeln!(output, "== instructions ==").unwrap();
    output.push_str(&disassemble(&bytecode.instructions));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::make;

    #[test]
    fn test_disassemble_formats_offsets_and_operands() {
        let code = [
            make(OpCode::Constant, &[1]),
            make(OpCode::Constant, &[2]),
            make(OpCode::Add, &[]),
            make(OpCode::GetLocal, &[1]),
            make(OpCode::JumpNotTruthy, &[12]),
            make(OpCode::Pop, &[]),
        ]
        .concat();

        let expected = "\
0000 Constant 1
0003 Constant 2
0006 Add
0007 GetLocal 1
0009 JumpNotTruthy 12
0012 Pop
";
        assert_eq!(disassemble(&code), expected);
    }

    #[test]
    fn test_disassemble_bytecode_lists_function_constants() {
        let function = crate::bytecode::chunk::CompiledFunction::new(
            make(OpCode::Return, &[]),
            1,
            0,
        );
        let bytecode = Bytecode::new(
            make(OpCode::Constant, &[0]),
            vec![Value::Function(std::rc::Rc::new(function))],
        );

        let output = disassemble_bytecode(&bytecode);
        assert!(output.contains("== constants =="));
        assert!(output.contains("CompiledFunction (locals: 1, params: 0):"));
        assert!(output.contains("0000 Return"));
        assert!(output.contains("== instructions =="));
        assert!(output.contains("0000 Constant 0"));
    }

    #[test]
    fn test_disassemble_reports_unknown_bytes() {
        let output = disassemble(&[0xEE]);
        assert!(output.contains("<unknown opcode 238>"));
    }
}
