//! Error types for all pipeline phases.

use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Expected {expected}, got '{found}' at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("No prefix parse rule for '{0}' at {1}")]
    NoPrefixRule(String, Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::NoPrefixRule(_, span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// The parser reports every error it can recover from, not just the first.
#[derive(Debug)]
pub struct ParserErrorList(pub Vec<ParserError>);

impl std::error::Error for ParserErrorList {}

impl fmt::Display for ParserErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl From<Vec<ParserError>> for ParserErrorList {
    fn from(errors: Vec<ParserError>) -> Self {
        Self(errors)
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Undefined variable '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("Unknown operator '{0}' at {1}")]
    UnknownOperator(String, Span),

    #[error("Unknown return type '{0}' at {1}")]
    UnknownReturnType(String, Span),

    #[error("Illegal assignment target at {0}")]
    IllegalAssignmentTarget(Span),

    #[error("Constant '{0}' is already defined at {1}")]
    RedefinedConst(String, Span),

    #[error("Local block may only contain variable declarations at {0}")]
    IllegalStatementInVariableBlock(Span),

    #[error("Global block may only contain variable declarations at {0}")]
    GlobalStatementContainsNonVariable(Span),
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable(_, span) => *span,
            Self::UnknownOperator(_, span) => *span,
            Self::UnknownReturnType(_, span) => *span,
            Self::IllegalAssignmentTarget(span) => *span,
            Self::RedefinedConst(_, span) => *span,
            Self::IllegalStatementInVariableBlock(span) => *span,
            Self::GlobalStatementContainsNonVariable(span) => *span,
        }
    }
}

/// Runtime errors raised by the virtual machine. Bytecode carries no source
/// positions, so these are positionless.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Division by zero")]
    DivideByZero,

    #[error("Wrong number of arguments: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Cannot call value of type {0}")]
    NonCallable(&'static str),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Frame overflow")]
    FrameOverflow,

    #[error("Builtin error: {0}")]
    BuiltinError(String),
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum YailError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser errors:\n{0}")]
    Parser(#[from] ParserErrorList),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
