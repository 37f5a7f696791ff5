//! Reads top-level forms, orchestrates parse -> codegen -> (print / JIT /
//! emit) (component D).
//!
//! Operation order is strictly serial: one top-level form enters the
//! pipeline and fully completes before the next begins. On any error the
//! offending form is abandoned and the driver resynchronizes by advancing
//! one token, matching `examples/original_source/src/interpreter.cpp`'s
//! per-form `HandleX`/`getNextToken` recovery.

use std::path::{Path, PathBuf};

use inkwell::execution_engine::ExecutionEngine;
use inkwell::targets::{FileType, TargetMachine};
use inkwell::OptimizationLevel;

use crate::ast::{Function, Prototype, TopForm, ANON_EXPR_NAME};
use crate::codegen::Codegen;
use crate::error::DriverError;
use crate::lexer::CharSource;
use crate::parser::Parser;

/// What the driver does with a successfully-compiled top-level expression
/// (and, at end of input, with the accumulated module).
pub enum Mode {
    /// JIT-compile and execute each top-level expression immediately.
    Jit,
    /// Print each form's IR; nothing is executed.
    Print,
    /// Like `Print`, but at EOF the final module is written as a
    /// relocatable object file.
    EmitObject(PathBuf),
}

/// The standard operator table installed before any input is read:
/// `=` at 2, `<` at 10, `+` at 20, `-` at 30, `*` at 40.
const BUILTIN_OPERATORS: &[(char, i32)] = &[('=', 2), ('<', 10), ('+', 20), ('-', 30), ('*', 40)];

pub struct Driver<'ctx, S> {
    parser: Parser<S>,
    codegen: Codegen<'ctx>,
    mode: Mode,
    engine: Option<ExecutionEngine<'ctx>>,
    target_machine: TargetMachine,
}

impl<'ctx, S: CharSource> Driver<'ctx, S> {
    /// `target_machine` is resolved once by the caller (see
    /// `driver::resolve_target_machine`) and threaded through every module
    /// this driver creates, including JIT-swapped ones.
    pub fn new(
        parser: Parser<S>,
        codegen: Codegen<'ctx>,
        mode: Mode,
        target_machine: TargetMachine,
    ) -> Result<Self, DriverError> {
        let engine = match mode {
            Mode::Jit => Some(
                codegen
                    .module()
                    .create_jit_execution_engine(OptimizationLevel::None)
                    .map_err(|_| DriverError::JitInstall)?,
            ),
            Mode::Print | Mode::EmitObject(_) => None,
        };

        let mut driver = Driver {
            parser,
            codegen,
            mode,
            engine,
            target_machine,
        };
        for &(op, prec) in BUILTIN_OPERATORS {
            driver.parser.add_binop(op, prec);
        }
        if let Err(e) = driver.parser.prime() {
            eprintln!("error: {e}");
        }
        Ok(driver)
    }

    /// Runs the REPL to completion (EOF on the input).
    pub fn run(&mut self) -> Result<(), DriverError> {
        loop {
            eprint!("ready> ");
            match self.parser.parse_top() {
                Ok(TopForm::Eof) => break,
                Ok(TopForm::Semicolon) => continue,
                Ok(TopForm::Definition(func)) => self.handle_definition(func),
                Ok(TopForm::Extern(proto)) => self.handle_extern(proto),
                Ok(TopForm::TopLevelExpr(func)) => self.handle_top_level_expr(func)?,
                Err(e) => {
                    eprintln!("error: {e}");
                    tracing::warn!(%e, "parse error, resynchronizing");
                    // A parser-level error may itself stem from a lex
                    // error on the very token we'd skip; either way one
                    // more token is consumed before retrying.
                    let _ = self.parser.skip_token();
                }
            }
        }

        if let Mode::EmitObject(path) = &self.mode {
            self.emit_object(path)?;
        }
        Ok(())
    }

    fn handle_definition(&mut self, func: Function) {
        tracing::debug!(name = %func.proto.name, "codegen function definition");
        match self.codegen.compile_function(&func) {
            Ok(fv) => {
                eprintln!("Parsed a function definition.");
                fv.print_to_stderr();
                if matches!(self.mode, Mode::Jit) {
                    self.promote_current_module_to_jit();
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                tracing::warn!(%e, "codegen error in definition");
            }
        }
    }

    fn handle_extern(&mut self, proto: Prototype) {
        tracing::debug!(name = %proto.name, "codegen extern declaration");
        match self.codegen.compile_prototype(&proto) {
            Ok(fv) => {
                self.codegen.register_prototype(proto);
                eprintln!("Parsed an extern");
                fv.print_to_stderr();
            }
            Err(e) => {
                eprintln!("error: {e}");
                tracing::warn!(%e, "codegen error in extern");
            }
        }
    }

    fn handle_top_level_expr(&mut self, func: Function) -> Result<(), DriverError> {
        tracing::debug!("codegen top-level expression");
        let fv = match self.codegen.compile_function(&func) {
            Ok(fv) => fv,
            Err(e) => {
                eprintln!("error: {e}");
                tracing::warn!(%e, "codegen error in top-level expression");
                return Ok(());
            }
        };

        match self.mode {
            Mode::Jit => {
                let engine = self.engine.as_ref().expect("engine exists in Jit mode");
                engine
                    .add_module(self.codegen.module())
                    .map_err(|_| DriverError::JitInstall)?;

                let result = unsafe {
                    let jit_fn = engine
                        .get_function::<unsafe extern "C" fn() -> f64>(ANON_EXPR_NAME)
                        .map_err(|_| DriverError::JitInstall)?;
                    jit_fn.call()
                };
                println!("Evaluated to {result:.6}");

                // Release the resource tracker for this ephemeral
                // anonymous-expression module; any named functions it
                // called were added to the engine by their own `def`
                // and remain resident.
                let _ = engine.remove_module(self.codegen.module());
                self.codegen.reset_module(&self.target_machine.get_target_data());
            }
            Mode::Print | Mode::EmitObject(_) => {
                eprintln!("Parsed a top-level expression.");
                fv.print_to_stderr();
                // The anon wrapper has no caller and its name would
                // collide with the next one in this long-lived module.
                unsafe { fv.delete() };
            }
        }
        Ok(())
    }

    /// Def/extern bodies are compiled directly into the current module;
    /// in JIT mode each such module is handed to the engine permanently
    /// and replaced with a fresh one so later top-level expressions don't
    /// redefine symbols the engine already resolved.
    fn promote_current_module_to_jit(&mut self) {
        if let Some(engine) = &self.engine {
            if engine.add_module(self.codegen.module()).is_err() {
                tracing::warn!("failed to add definition's module to JIT engine");
                return;
            }
            self.codegen.reset_module(&self.target_machine.get_target_data());
        }
    }

    fn emit_object(&self, path: &Path) -> Result<(), DriverError> {
        self.target_machine
            .write_to_file(self.codegen.module(), FileType::Object, path)
            .map_err(|_| DriverError::ObjectEmit)?;
        println!("Wrote {}", path.display());
        Ok(())
    }
}

/// Resolves the target machine once, up front: either the autodetected host
/// triple or an explicit override. Threaded into every module the codegen
/// creates, including JIT-swapped ones, matching
/// `examples/original_source/main.cpp`'s single `TargetMachine` setup.
/// External collaborator: target triple/machine discovery lives in
/// `inkwell::targets`, not in this crate.
pub fn resolve_target_machine(triple_override: Option<&str>) -> Result<TargetMachine, DriverError> {
    use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetTriple};

    // All backends, not just the host's: `--target` is meant to allow
    // cross-compiling to a triple other than the one this binary runs on.
    Target::initialize_all(&InitializationConfig::default());

    let triple = match triple_override {
        Some(t) => TargetTriple::create(t),
        None => TargetMachine::get_default_triple(),
    };
    let triple_str = triple.as_str().to_string_lossy().into_owned();

    let target = Target::from_triple(&triple)
        .map_err(|e| DriverError::TargetResolution(triple_str.clone(), e.to_string()))?;
    // PIC, matching the object-emit path in `examples/original_source/main.cpp`.
    target
        .create_target_machine(
            &triple,
            "generic",
            "",
            OptimizationLevel::None,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| DriverError::TargetResolution(triple_str, "unsupported target".into()))
}
