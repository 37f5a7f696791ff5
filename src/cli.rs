//! Process configuration: input source, output mode, target override.

use std::path::PathBuf;

use clap::{Parser as ClapParser, ValueEnum};

/// Compiler and JIT REPL for a small numeric language.
#[derive(ClapParser, Debug)]
#[command(name = "kaleidoscope", version, about)]
pub struct Cli {
    /// Source file to read. Omit to read from stdin.
    pub input: Option<PathBuf>,

    /// What to do with each top-level expression.
    #[arg(long, value_enum, default_value = "jit")]
    pub mode: OutputMode,

    /// Output path, only used with `--mode emit-object`.
    #[arg(long, default_value = "output.o")]
    pub output: PathBuf,

    /// Target triple to compile for. Defaults to the host triple.
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// JIT-compile and execute each top-level expression.
    Jit,
    /// Print IR for each form; nothing is executed.
    Print,
    /// Print IR like `print`, then write the final module to `--output`.
    EmitObject,
}
