//! Process entry: argument parsing, logging, target discovery, drives
//! [`kaleidoscope::driver::Driver`].

use std::fs;
use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use inkwell::context::Context as LlvmContext;
use inkwell::targets::TargetMachine;
use rustyline::DefaultEditor;

use kaleidoscope::cli::{Cli, OutputMode};
use kaleidoscope::codegen::Codegen;
use kaleidoscope::driver::{self, Driver, Mode};
use kaleidoscope::lexer::{CharSource, Lexer, ReaderSource, StrSource};
use kaleidoscope::parser::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = match cli.mode {
        OutputMode::Jit => Mode::Jit,
        OutputMode::Print => Mode::Print,
        OutputMode::EmitObject => Mode::EmitObject(cli.output.clone()),
    };

    let target_machine =
        driver::resolve_target_machine(cli.target.as_deref()).context("resolving target machine")?;
    let data_layout = target_machine.get_target_data();

    let context = LlvmContext::create();
    let codegen = Codegen::new(&context, &data_layout);

    match cli.input {
        Some(path) => {
            let source =
                fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let parser = Parser::new(Lexer::new(StrSource::new(&source)));
            run(parser, codegen, mode, target_machine)
        }
        None if io::stdin().is_terminal() => {
            let source = RustylineSource::new().context("starting interactive line editor")?;
            let parser = Parser::new(Lexer::new(source));
            run(parser, codegen, mode, target_machine)
        }
        None => {
            let parser = Parser::new(Lexer::new(ReaderSource::new(io::stdin())));
            run(parser, codegen, mode, target_machine)
        }
    }
}

fn run<S: CharSource>(
    parser: Parser<S>,
    codegen: Codegen<'_>,
    mode: Mode,
    target_machine: TargetMachine,
) -> Result<()> {
    let mut driver = Driver::new(parser, codegen, mode, target_machine)?;
    driver.run()?;
    Ok(())
}

/// Adapts `rustyline`'s line-oriented editing to the lexer's one-character-
/// at-a-time [`CharSource`]. The driver prints its own `ready> ` prompt to
/// stderr, so lines are read with an empty rustyline prompt to avoid a
/// doubled-up prompt in interactive sessions.
struct RustylineSource {
    editor: DefaultEditor,
    pending: std::vec::IntoIter<char>,
}

impl RustylineSource {
    fn new() -> rustyline::Result<Self> {
        Ok(RustylineSource {
            editor: DefaultEditor::new()?,
            pending: Vec::new().into_iter(),
        })
    }
}

impl CharSource for RustylineSource {
    fn next_char(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.pending.next() {
                return Some(c);
            }
            match self.editor.readline("") {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    let mut chars: Vec<char> = line.chars().collect();
                    chars.push('\n');
                    self.pending = chars.into_iter();
                }
                Err(_) => return None,
            }
        }
    }
}
