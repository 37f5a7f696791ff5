//! AST -> IR module lowering (component G).
//!
//! Every expression lowers to a `double`. Mutable variables are
//! entry-block `alloca`s; a promote-memory-to-register pass cleans them
//! back up into SSA after each function is built, so the frontend stays
//! simple while the emitted IR is not cluttered with loads/stores for
//! values that never actually need a stack slot.

use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::passes::PassManager;
use inkwell::targets::TargetData;
use inkwell::values::{FloatValue, FunctionValue, PointerValue};
use inkwell::FloatPredicate;

use crate::ast::{Expr, Function, ProtoKind, Prototype};
use crate::error::CodegenError;

/// One live module at a time, recreated after every JIT'd top-level
/// expression. `function_prototypes` is a field of the codegen (not the
/// module), so it survives module reincarnation — this is what lets a
/// function declared in a since-discarded module still be called.
pub struct Codegen<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    fpm: PassManager<FunctionValue<'ctx>>,
    named_values: HashMap<String, PointerValue<'ctx>>,
    function_prototypes: HashMap<String, Prototype>,
    module_counter: u32,
}

impl<'ctx> Codegen<'ctx> {
    pub fn new(context: &'ctx Context, data_layout: &TargetData) -> Self {
        let (module, builder, fpm) = Self::build_module(context, "kaleidoscope_module_0", data_layout);
        Codegen {
            context,
            module,
            builder,
            fpm,
            named_values: HashMap::new(),
            function_prototypes: HashMap::new(),
            module_counter: 1,
        }
    }

    fn build_module(
        context: &'ctx Context,
        name: &str,
        data_layout: &TargetData,
    ) -> (Module<'ctx>, Builder<'ctx>, PassManager<FunctionValue<'ctx>>) {
        let module = context.create_module(name);
        module.set_data_layout(&data_layout.get_data_layout());
        let builder = context.create_builder();

        let fpm = PassManager::create(&module);
        fpm.add_promote_memory_to_register_pass();
        fpm.add_instruction_combining_pass();
        fpm.add_reassociate_pass();
        fpm.add_gvn_pass();
        fpm.add_cfg_simplification_pass();
        fpm.initialize();

        (module, builder, fpm)
    }

    /// Discards the current module (keeping `function_prototypes`) and
    /// starts a fresh one bound to the same data layout. Called after
    /// every JIT-executed top-level expression.
    pub fn reset_module(&mut self, data_layout: &TargetData) {
        let name = format!("kaleidoscope_module_{}", self.module_counter);
        self.module_counter += 1;
        let (module, builder, fpm) = Self::build_module(self.context, &name, data_layout);
        self.module = module;
        self.builder = builder;
        self.fpm = fpm;
        self.named_values.clear();
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn function_prototypes(&self) -> &HashMap<String, Prototype> {
        &self.function_prototypes
    }

    /// Records `proto` in the cross-module registry without emitting a
    /// body. Used by the driver's `extern` handling.
    pub fn register_prototype(&mut self, proto: Prototype) {
        self.function_prototypes.insert(proto.name.clone(), proto);
    }

    fn f64_type(&self) -> inkwell::types::FloatType<'ctx> {
        self.context.f64_type()
    }

    /// Emits a declaration for `proto` into the current module.
    pub fn compile_prototype(&mut self, proto: &Prototype) -> Result<FunctionValue<'ctx>, CodegenError> {
        let double = self.f64_type();
        let arg_types: Vec<_> = proto.args.iter().map(|_| double.into()).collect();
        let fn_type = double.fn_type(&arg_types, false);
        let function = self.module.add_function(&proto.name, fn_type, Some(Linkage::External));

        for (param, name) in function.get_params().into_iter().zip(proto.args.iter()) {
            param.into_float_value().set_name(name);
        }

        Ok(function)
    }

    /// Two-level function lookup: the current module first, then a fresh
    /// declaration re-materialized from `function_prototypes`. This is
    /// what makes forward references and JIT module recycling coherent.
    pub fn get_function(&mut self, name: &str) -> Result<Option<FunctionValue<'ctx>>, CodegenError> {
        if let Some(f) = self.module.get_function(name) {
            return Ok(Some(f));
        }
        if let Some(proto) = self.function_prototypes.get(name).cloned() {
            return self.compile_prototype(&proto).map(Some);
        }
        Ok(None)
    }

    fn create_entry_block_alloca(&self, function: FunctionValue<'ctx>, name: &str) -> PointerValue<'ctx> {
        let entry = function.get_first_basic_block().expect("function always has an entry block by construction");
        let builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first_instr) => builder.position_before(&first_instr),
            None => builder.position_at_end(entry),
        }
        builder
            .build_alloca(self.f64_type(), name)
            .expect("alloca in entry block cannot fail")
    }

    /// Inserts `func.proto` into `function_prototypes`, obtains (or
    /// creates) the IR function, and emits its body. On any sub-failure
    /// the half-built function is erased from the module so the module
    /// stays valid.
    pub fn compile_function(&mut self, func: &Function) -> Result<FunctionValue<'ctx>, CodegenError> {
        let name = func.proto.name.clone();
        self.function_prototypes.insert(name.clone(), func.proto.clone());

        let function = self
            .get_function(&name)?
            .ok_or(CodegenError::UnknownFunction)?;

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        self.named_values.clear();
        for (param, arg_name) in function.get_params().into_iter().zip(func.proto.args.iter()) {
            let alloca = self.create_entry_block_alloca(function, arg_name);
            self.builder
                .build_store(alloca, param.into_float_value())
                .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
            self.named_values.insert(arg_name.clone(), alloca);
        }

        match self.compile_expr(&func.body) {
            Ok(ret_val) => {
                self.builder
                    .build_return(Some(&ret_val))
                    .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

                if !function.verify(true) {
                    unsafe { function.delete() };
                    return Err(CodegenError::VerificationFailed(name));
                }

                self.fpm.run_on(&function);
                Ok(function)
            }
            Err(e) => {
                unsafe { function.delete() };
                Err(e)
            }
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<FloatValue<'ctx>, CodegenError> {
        match expr {
            Expr::Number(n) => Ok(self.f64_type().const_float(*n)),

            Expr::Variable(name) => {
                let slot = self.named_values.get(name).ok_or(CodegenError::UnknownVariable)?;
                self.builder
                    .build_load(self.f64_type(), *slot, name)
                    .map(|v| v.into_float_value())
                    .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))
            }

            Expr::Binary { op, lhs, rhs } if *op == '=' => {
                let Expr::Variable(var_name) = lhs.as_ref() else {
                    return Err(CodegenError::InvalidAssignmentTarget);
                };
                let value = self.compile_expr(rhs)?;
                let slot = *self.named_values.get(var_name).ok_or(CodegenError::UnknownVariable)?;
                self.builder
                    .build_store(slot, value)
                    .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
                Ok(value)
            }

            Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs),

            Expr::Unary { op, operand } => {
                let operand_val = self.compile_expr(operand)?;
                let callee = format!("unary{op}");
                let function = self
                    .get_function(&callee)?
                    .ok_or(CodegenError::UnknownUnaryOperator)?;
                self.build_call(function, &[operand_val])
            }

            Expr::Call { callee, args } => {
                let function = self.get_function(callee)?.ok_or(CodegenError::UnknownFunction)?;
                if function.count_params() as usize != args.len() {
                    return Err(CodegenError::ArityMismatch);
                }
                let arg_vals: Vec<FloatValue<'ctx>> =
                    args.iter().map(|a| self.compile_expr(a)).collect::<Result<_, _>>()?;
                self.build_call(function, &arg_vals)
            }

            Expr::If { cond, then_branch, else_branch } => self.compile_if(cond, then_branch, else_branch),

            Expr::For { var_name, start, end, step, body } => {
                self.compile_for(var_name, start, end, step.as_deref(), body)
            }

            Expr::Var { bindings, body } => self.compile_var(bindings, body),
        }
    }

    fn build_call(&mut self, function: FunctionValue<'ctx>, args: &[FloatValue<'ctx>]) -> Result<FloatValue<'ctx>, CodegenError> {
        let arg_vals: Vec<_> = args.iter().map(|v| (*v).into()).collect();
        let call = self
            .builder
            .build_call(function, &arg_vals, "calltmp")
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        call.try_as_basic_value()
            .left()
            .map(|v| v.into_float_value())
            .ok_or_else(|| CodegenError::LlvmOperationFailed("call produced no value".into()))
    }

    fn compile_binary(&mut self, op: char, lhs: &Expr, rhs: &Expr) -> Result<FloatValue<'ctx>, CodegenError> {
        let lhs_val = self.compile_expr(lhs)?;
        let rhs_val = self.compile_expr(rhs)?;

        let llvm_err = |e: inkwell::builder::BuilderError| CodegenError::LlvmOperationFailed(e.to_string());

        match op {
            '+' => self.builder.build_float_add(lhs_val, rhs_val, "addtmp").map_err(llvm_err),
            '-' => self.builder.build_float_sub(lhs_val, rhs_val, "subtmp").map_err(llvm_err),
            '*' => self.builder.build_float_mul(lhs_val, rhs_val, "multmp").map_err(llvm_err),
            '<' => {
                let cmp = self
                    .builder
                    .build_float_compare(FloatPredicate::ULT, lhs_val, rhs_val, "cmptmp")
                    .map_err(llvm_err)?;
                self.builder
                    .build_unsigned_int_to_float(cmp, self.f64_type(), "booltmp")
                    .map_err(llvm_err)
            }
            _ => {
                let name = format!("binary{op}");
                let function = self.get_function(&name)?.ok_or(CodegenError::UnknownBinaryOperator)?;
                self.build_call(function, &[lhs_val, rhs_val])
            }
        }
    }

    fn compile_if(&mut self, cond: &Expr, then_branch: &Expr, else_branch: &Expr) -> Result<FloatValue<'ctx>, CodegenError> {
        let zero = self.f64_type().const_float(0.0);
        let cond_val = self.compile_expr(cond)?;
        let cond_bool = self
            .builder
            .build_float_compare(FloatPredicate::ONE, cond_val, zero, "ifcond")
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

        let function = self
            .builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("if is always codegen'd inside a function body");

        let then_bb = self.context.append_basic_block(function, "then");
        let else_bb = self.context.append_basic_block(function, "else");
        let merge_bb = self.context.append_basic_block(function, "ifcont");

        self.builder
            .build_conditional_branch(cond_bool, then_bb, else_bb)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

        self.builder.position_at_end(then_bb);
        let then_val = self.compile_expr(then_branch)?;
        self.builder
            .build_unconditional_branch(merge_bb)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        // Codegen of 'then' can change the current block; re-read it for the PHI.
        let then_end_bb = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(else_bb);
        let else_val = self.compile_expr(else_branch)?;
        self.builder
            .build_unconditional_branch(merge_bb)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        let else_end_bb = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(merge_bb);
        let phi = self
            .builder
            .build_phi(self.f64_type(), "iftmp")
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        phi.add_incoming(&[(&then_val, then_end_bb), (&else_val, else_end_bb)]);
        Ok(phi.as_basic_value().into_float_value())
    }

    fn compile_for(
        &mut self,
        var_name: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<FloatValue<'ctx>, CodegenError> {
        let function = self
            .builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("for is always codegen'd inside a function body");

        let alloca = self.create_entry_block_alloca(function, var_name);
        let start_val = self.compile_expr(start)?;
        self.builder
            .build_store(alloca, start_val)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

        let loop_bb = self.context.append_basic_block(function, "loop");
        self.builder
            .build_unconditional_branch(loop_bb)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        self.builder.position_at_end(loop_bb);

        let old_binding = self.named_values.insert(var_name.to_string(), alloca);

        self.compile_expr(body)?;

        let step_val = match step {
            Some(step_expr) => self.compile_expr(step_expr)?,
            None => self.f64_type().const_float(1.0),
        };

        let end_val = self.compile_expr(end)?;

        let cur = self
            .builder
            .build_load(self.f64_type(), alloca, var_name)
            .map(|v| v.into_float_value())
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        let next = self
            .builder
            .build_float_add(cur, step_val, "nextvar")
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        self.builder
            .build_store(alloca, next)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

        let zero = self.f64_type().const_float(0.0);
        let end_cond = self
            .builder
            .build_float_compare(FloatPredicate::ONE, end_val, zero, "loopcond")
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

        let after_bb = self.context.append_basic_block(function, "afterloop");
        self.builder
            .build_conditional_branch(end_cond, loop_bb, after_bb)
            .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;
        self.builder.position_at_end(after_bb);

        match old_binding {
            Some(prev) => {
                self.named_values.insert(var_name.to_string(), prev);
            }
            None => {
                self.named_values.remove(var_name);
            }
        }

        Ok(self.f64_type().const_float(0.0))
    }

    fn compile_var(&mut self, bindings: &[(String, Option<Expr>)], body: &Expr) -> Result<FloatValue<'ctx>, CodegenError> {
        let function = self
            .builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .expect("var is always codegen'd inside a function body");

        // Bindings are parallel: every initializer runs against the outer
        // scope before any new binding is inserted, so a sibling binding's
        // init never sees an earlier sibling's new value.
        let mut init_vals = Vec::with_capacity(bindings.len());
        for (_, init) in bindings {
            let init_val = match init {
                Some(expr) => self.compile_expr(expr)?,
                None => self.f64_type().const_float(0.0),
            };
            init_vals.push(init_val);
        }

        let mut old_bindings = Vec::with_capacity(bindings.len());
        for ((name, _), init_val) in bindings.iter().zip(init_vals) {
            let alloca = self.create_entry_block_alloca(function, name);
            self.builder
                .build_store(alloca, init_val)
                .map_err(|e| CodegenError::LlvmOperationFailed(e.to_string()))?;

            old_bindings.push((name.clone(), self.named_values.insert(name.clone(), alloca)));
        }

        let body_val = self.compile_expr(body)?;

        for (name, prev) in old_bindings {
            match prev {
                Some(slot) => {
                    self.named_values.insert(name, slot);
                }
                None => {
                    self.named_values.remove(&name);
                }
            }
        }

        Ok(body_val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ANON_EXPR_NAME;
    use inkwell::targets::{InitializationConfig, Target};

    fn native_data_layout() -> (Context, TargetData) {
        Target::initialize_native(&InitializationConfig::default()).unwrap();
        let triple = inkwell::targets::TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).unwrap();
        let machine = target
            .create_target_machine(
                &triple,
                "generic",
                "",
                inkwell::OptimizationLevel::None,
                inkwell::targets::RelocMode::Default,
                inkwell::targets::CodeModel::Default,
            )
            .unwrap();
        (Context::create(), machine.get_target_data())
    }

    #[test]
    fn arity_mismatch_is_a_codegen_error_and_adds_no_function() {
        let (context, layout) = native_data_layout();
        let mut codegen = Codegen::new(&context, &layout);

        let proto = Prototype::new("f".into(), vec!["x".into()], ProtoKind::Function);
        codegen.compile_prototype(&proto).unwrap();
        codegen.function_prototypes.insert("f".into(), proto);

        let call_fn = Function {
            proto: Prototype::new(ANON_EXPR_NAME.into(), vec![], ProtoKind::Function),
            body: Expr::Call { callee: "f".into(), args: vec![] },
        };

        let err = codegen.compile_function(&call_fn).unwrap_err();
        assert_eq!(err, CodegenError::ArityMismatch);
        assert!(codegen.module().get_function(ANON_EXPR_NAME).is_none());
    }

    #[test]
    fn unknown_variable_is_a_codegen_error() {
        let (context, layout) = native_data_layout();
        let mut codegen = Codegen::new(&context, &layout);
        let func = Function {
            proto: Prototype::new(ANON_EXPR_NAME.into(), vec![], ProtoKind::Function),
            body: Expr::Variable("nope".into()),
        };
        assert_eq!(codegen.compile_function(&func).unwrap_err(), CodegenError::UnknownVariable);
    }

    #[test]
    fn assignment_to_non_variable_is_rejected() {
        let (context, layout) = native_data_layout();
        let mut codegen = Codegen::new(&context, &layout);
        let func = Function {
            proto: Prototype::new(ANON_EXPR_NAME.into(), vec![], ProtoKind::Function),
            body: Expr::Binary {
                op: '=',
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Number(2.0)),
            },
        };
        assert_eq!(
            codegen.compile_function(&func).unwrap_err(),
            CodegenError::InvalidAssignmentTarget
        );
    }
}
