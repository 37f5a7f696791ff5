//! Error types for the three core subsystems and the driver.
//!
//! Every variant's message matches the wording spec.md section 7 specifies,
//! so a stderr line printed from these errors reads the same as the
//! original tutorial's diagnostics.

use thiserror::Error;

/// Lex-time error: a malformed numeric literal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("invalid double specified")]
    InvalidDouble,
}

/// Parse-time error: unexpected token, malformed prototype, missing
/// keyword, bad operand count, out-of-range precedence.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("{0}")]
    Lex(#[from] LexError),

    #[error("Unknown token '{0:?}' when expecting an expression")]
    UnexpectedToken(crate::lexer::Token),

    #[error("Expected ')'")]
    ExpectedCloseParen,

    #[error("Expected ')' or ',' in argument list")]
    ExpectedArgSeparator,

    #[error("Expected 'then' in if expression")]
    ExpectedThen,

    #[error("Expected 'else' in if expression")]
    ExpectedElse,

    #[error("Expected '=' after for")]
    ExpectedForAssign,

    #[error("Expected ',' after for start value")]
    ExpectedForComma,

    #[error("Expected 'in' after for")]
    ExpectedForIn,

    #[error("expected identifier after var")]
    ExpectedVarIdentifier,

    #[error("expected 'in' keyword after 'var'")]
    ExpectedVarIn,

    #[error("Expected function name in prototype")]
    ExpectedPrototypeName,

    #[error("Expected unary operator")]
    ExpectedUnaryOperator,

    #[error("Expected binary operator")]
    ExpectedBinaryOperator,

    #[error("Invalid precedence: must be 1..100")]
    PrecedenceOutOfRange,

    #[error("Expected '(' in prototype")]
    ExpectedOpenParen,

    #[error("Expected ')' in prototype")]
    ExpectedPrototypeCloseParen,

    #[error("Invalid number of operands for operator")]
    WrongOperandCount,
}

/// Codegen-time error: unresolved name, arity mismatch, unknown operator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodegenError {
    #[error("Unknown variable name")]
    UnknownVariable,

    #[error("Unknown function referenced")]
    UnknownFunction,

    #[error("Incorrect # arguments passed")]
    ArityMismatch,

    #[error("destination of '=' must be a variable")]
    InvalidAssignmentTarget,

    #[error("Unknown unary operator")]
    UnknownUnaryOperator,

    #[error("binary operator not found")]
    UnknownBinaryOperator,

    #[error("IR verifier rejected function '{0}'")]
    VerificationFailed(String),

    #[error("LLVM operation failed: {0}")]
    LlvmOperationFailed(String),
}

/// Errors that can only come from the driver's infrastructure collaborators
/// (target discovery, JIT install, object file writing). These are the only
/// fatal errors in the system; everything else resyncs and continues.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not resolve target machine for triple '{0}': {1}")]
    TargetResolution(String, String),

    #[error("could not open output file '{0}': {1}")]
    OutputFile(String, std::io::Error),

    #[error("failed to install module in JIT execution engine")]
    JitInstall,

    #[error("target machine could not emit object file")]
    ObjectEmit,
}
