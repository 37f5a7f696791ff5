//! End-to-end REPL scenarios, driven against the compiled binary over
//! piped stdin (so the `ReaderSource` path is exercised, not the
//! interactive `rustyline` one). JIT evaluation results go to stdout;
//! parse/codegen diagnostics and the `ready> ` prompt go to stderr, so
//! these assertions only look at stdout.

use assert_cmd::Command;
use predicates::prelude::*;

fn kaleidoscope() -> Command {
    Command::cargo_bin("kaleidoscope").unwrap()
}

#[test]
fn evaluates_a_plain_expression() {
    kaleidoscope()
        .write_stdin("4+5;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 9.000000"));
}

#[test]
fn evaluates_a_call_to_a_user_defined_function() {
    kaleidoscope()
        .write_stdin("def f(x) x*x; f(7);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 49.000000"));
}

#[test]
fn resolves_an_extern_against_the_host_process() {
    kaleidoscope()
        .write_stdin("extern sin(x); sin(0);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 0.000000"));
}

#[test]
fn recursive_fibonacci() {
    kaleidoscope()
        .write_stdin("def fib(n) if n<2 then n else fib(n-1)+fib(n-2); fib(10);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 55.000000"));
}

#[test]
fn user_defined_binary_operator() {
    kaleidoscope()
        .write_stdin("def binary| 5 (a b) if a then 1 else if b then 1 else 0; 1|0;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 1.000000"));
}

#[test]
fn var_expression_with_parallel_bindings() {
    kaleidoscope()
        .write_stdin("var a=1, b=2 in a+b;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 3.000000"));
}

#[test]
fn nested_var_shadows_and_inner_init_sees_outer_binding() {
    kaleidoscope()
        .write_stdin("var a = 1 in var a = a+1 in a;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 2.000000"));
}

#[test]
fn sibling_var_binding_sees_outer_scope_not_a_new_sibling() {
    // `b`'s initializer must see the outer `a` (1.0), not the sibling
    // binding `a = 5` introduced in the same `var` list.
    kaleidoscope()
        .write_stdin("var a = 1 in var a = 5, b = a in b;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 1.000000"));
}

#[test]
fn assignment_inside_var_returns_the_stored_value() {
    kaleidoscope()
        .write_stdin("var x = 1 in (x = x+2);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 3.000000"));
}

#[test]
fn if_true_condition_takes_the_then_branch() {
    kaleidoscope()
        .write_stdin("if 1 then 2 else 3;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 2.000000"));
}

#[test]
fn if_false_condition_takes_the_else_branch() {
    kaleidoscope()
        .write_stdin("if 0 then 2 else 3;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 3.000000"));
}

#[test]
fn for_loop_evaluates_to_zero_and_prints_each_iteration() {
    kaleidoscope()
        .write_stdin("extern printd(x);\nfor i = 1, i<4 in printd(i);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 0.000000"))
        .stdout(predicate::str::contains("1.000000"))
        .stdout(predicate::str::contains("2.000000"))
        .stdout(predicate::str::contains("3.000000"));
}

#[test]
fn a_malformed_top_level_form_is_skipped_and_the_next_one_still_runs() {
    kaleidoscope()
        .write_stdin("def ( )\n1+2;\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("error:"))
        .stdout(predicate::str::contains("Evaluated to 3.000000"));
}

#[test]
fn a_function_defined_earlier_is_still_callable_after_a_module_swap() {
    // Each top-level expression triggers a JIT module swap (see
    // `Driver::handle_top_level_expr`); `f` must still resolve via
    // `function_prototypes` after `41+1;` has already swapped the module once.
    kaleidoscope()
        .write_stdin("def f(x) x+1;\n41+1;\nf(41);\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to 42.000000"));
}

#[test]
fn exit_ends_the_session_like_eof() {
    kaleidoscope().write_stdin("exit\n").assert().success();
}

#[test]
fn print_mode_emits_ir_instead_of_executing() {
    kaleidoscope()
        .arg("--mode")
        .arg("print")
        .write_stdin("4+5;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated to").not())
        .stderr(predicate::str::contains("define"));
}
