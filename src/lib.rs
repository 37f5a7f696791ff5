//! Compiler and JIT REPL for a tiny dynamically-typed numeric language.
//!
//! Every value is an `f64`. Source flows: [`lexer`] -> [`parser`] (building
//! [`ast`] nodes) -> [`codegen`] (lowering to LLVM IR via `inkwell`) ->
//! [`driver`], which either JIT-executes each top-level expression, prints
//! its IR, or emits the accumulated module as an object file.

pub mod ast;
pub mod cli;
pub mod codegen;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
