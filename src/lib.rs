//! YAIL: a small statically-typed imperative language.
//!
//! Source text flows through four stages: the lexer produces tokens, the
//! parser builds an AST, the compiler lowers it to bytecode, and a stack
//! machine executes the bytecode. The REPL shells reuse the same pipeline
//! with symbol table, constants and globals carried across inputs.

#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::result_large_err)]

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;

use error::{ParserErrorList, YailError};

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, YailError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens)
        .parse()
        .map_err(ParserErrorList::from)?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, YailError> {
    let program = parse(source)?;
    let mut compiler = bytecode::Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Parse, compile and run source code, returning the last-popped value.
pub fn run_source(source: &str) -> Result<bytecode::Value, YailError> {
    let bytecode = compile(source)?;
    let mut vm = bytecode::Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped_stack_element())
}

/// Run a program from a file path.
pub fn run_file(path: &std::path::Path) -> Result<bytecode::Value, YailError> {
    let source = std::fs::read_to_string(path)?;
    run_source(&source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Value;

    #[test]
    fn test_run_source_end_to_end() {
        assert_eq!(run_source("1 + 2;").unwrap(), Value::Int(3));
        assert_eq!(
            run_source("\"mon\" + \"key\";").unwrap(),
            Value::string("monkey")
        );
    }

    #[test]
    fn test_parse_error_surfaces_all_messages() {
        let err = parse("global { int = ; }").unwrap_err();
        assert!(matches!(err, YailError::Parser(_)));
    }

    #[test]
    fn test_compile_error_surfaces() {
        let err = run_source("bogus;").unwrap_err();
        assert!(matches!(err, YailError::Compile(_)));
    }

    #[test]
    fn test_runtime_error_surfaces() {
        let err = run_source("1 / 0;").unwrap_err();
        assert!(matches!(err, YailError::Runtime(_)));
    }
}
