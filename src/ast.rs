//! Tagged-variant expression and function nodes (component A).
//!
//! Each node exclusively owns its children; the tree is acyclic, no sharing.

/// Closed set of expression forms the parser can produce.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary {
        op: char,
        operand: Box<Expr>,
    },
    Binary {
        op: char,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    For {
        var_name: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    /// Bindings are introduced in parallel: every initializer is evaluated
    /// against the *outer* scope before any of the new names take effect.
    Var {
        bindings: Vec<(String, Option<Expr>)>,
        body: Box<Expr>,
    },
}

/// What kind of thing a [`Prototype`] declares, and (for user-defined
/// operators) the precedence it installs in the parser's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtoKind {
    Function,
    Unary,
    Binary { precedence: i32 },
}

/// A function's signature: name, parameter names, and operator kind.
/// Independent of any body.
#[derive(Clone, Debug, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
    pub kind: ProtoKind,
}

impl Prototype {
    pub fn new(name: String, args: Vec<String>, kind: ProtoKind) -> Self {
        Prototype { name, args, kind }
    }

    /// `"binary"+c`/`"unary"+c` encoding used to resolve user operators to
    /// ordinary function calls in codegen.
    pub fn operator_name(op: char, kind: ProtoKind) -> String {
        match kind {
            ProtoKind::Unary => format!("unary{op}"),
            ProtoKind::Binary { .. } => format!("binary{op}"),
            ProtoKind::Function => unreachable!("operator_name called on a plain function"),
        }
    }
}

/// A function definition: its prototype plus a body expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

/// Name given to the synthetic zero-argument prototype wrapping a
/// top-level expression.
pub const ANON_EXPR_NAME: &str = "__anon_expr";

/// What a single call to [`crate::parser::Parser::parse_top`] produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TopForm {
    Definition(Function),
    Extern(Prototype),
    TopLevelExpr(Function),
    Semicolon,
    Eof,
}
