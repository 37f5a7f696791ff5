//! Pratt-style operator-precedence parser with user-extensible operators
//! (component P).
//!
//! The operator-precedence table is owned by the parser and mutated at
//! parse time: `def binary| 5 (a b) ...` installs `|` at precedence 5
//! before the enclosing definition's body is parsed, so a prototype can
//! use its own new operator (see `parse_prototype`).

use std::collections::HashMap;

use crate::ast::{Expr, Function, ProtoKind, Prototype, TopForm, ANON_EXPR_NAME};
use crate::error::ParseError;
use crate::lexer::{CharSource, Lexer, Token};

pub struct Parser<S> {
    lexer: Lexer<S>,
    current_token: Token,
    operator_precedence: HashMap<char, i32>,
}

impl<S: CharSource> Parser<S> {
    pub fn new(lexer: Lexer<S>) -> Self {
        Parser {
            lexer,
            current_token: Token::Eof,
            operator_precedence: HashMap::new(),
        }
    }

    /// Installs a binary operator at the given precedence. Used by the
    /// driver to set up the built-ins (`=` 2, `<` 10, `+` 20, `-` 30, `*`
    /// 40) and by [`Self::parse_prototype`] as user operators are declared.
    pub fn add_binop(&mut self, op: char, precedence: i32) {
        self.operator_precedence.insert(op, precedence);
    }

    /// Reads the first token. Must be called once before the first
    /// [`Self::parse_top`].
    pub fn prime(&mut self) -> Result<(), ParseError> {
        self.advance()
    }

    pub fn current_token(&self) -> &Token {
        &self.current_token
    }

    /// Advances past the current token. Used by the driver for
    /// single-token error resync after a failed top-level form.
    pub fn skip_token(&mut self) -> Result<(), ParseError> {
        self.advance()
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn tok_precedence(&self) -> i32 {
        match self.current_token {
            Token::Char(c) => *self.operator_precedence.get(&c).unwrap_or(&-1),
            _ => -1,
        }
    }

    /// `top = 'def' definition | 'extern' extern | ';' | expression`
    pub fn parse_top(&mut self) -> Result<TopForm, ParseError> {
        match &self.current_token {
            Token::Eof => Ok(TopForm::Eof),
            Token::Char(';') => {
                self.advance()?;
                Ok(TopForm::Semicolon)
            }
            Token::Def => Ok(TopForm::Definition(self.parse_definition()?)),
            Token::Extern => Ok(TopForm::Extern(self.parse_extern()?)),
            _ => Ok(TopForm::TopLevelExpr(self.parse_top_level_expr()?)),
        }
    }

    fn parse_definition(&mut self) -> Result<Function, ParseError> {
        self.advance()?; // eat 'def'
        let proto = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { proto, body })
    }

    fn parse_extern(&mut self) -> Result<Prototype, ParseError> {
        self.advance()?; // eat 'extern'
        self.parse_prototype()
    }

    fn parse_top_level_expr(&mut self) -> Result<Function, ParseError> {
        let body = self.parse_expression()?;
        let proto = Prototype::new(ANON_EXPR_NAME.to_string(), Vec::new(), ProtoKind::Function);
        Ok(Function { proto, body })
    }

    /// `prototype = identifier '(' identifier* ')' | 'unary' op '(' identifier ')'
    ///            | 'binary' op number? '(' identifier identifier ')'`
    fn parse_prototype(&mut self) -> Result<Prototype, ParseError> {
        let (name, kind) = match self.current_token.clone() {
            Token::Identifier(name) => {
                self.advance()?;
                (name, ProtoKind::Function)
            }
            Token::Unary => {
                self.advance()?;
                let op = self.expect_operator_char(ParseError::ExpectedUnaryOperator)?;
                self.advance()?;
                (format!("unary{op}"), ProtoKind::Unary)
            }
            Token::Binary => {
                self.advance()?;
                let op = self.expect_operator_char(ParseError::ExpectedBinaryOperator)?;
                self.advance()?;
                let precedence = if let Token::Number(n) = self.current_token {
                    if !(1.0..=100.0).contains(&n) {
                        return Err(ParseError::PrecedenceOutOfRange);
                    }
                    self.advance()?;
                    n as i32
                } else {
                    30
                };
                // Install the operator immediately, so the definition's own
                // body may use it.
                self.add_binop(op, precedence);
                (format!("binary{op}"), ProtoKind::Binary { precedence })
            }
            _ => return Err(ParseError::ExpectedPrototypeName),
        };

        if !matches!(self.current_token, Token::Char('(')) {
            return Err(ParseError::ExpectedOpenParen);
        }
        self.advance()?;

        let mut args = Vec::new();
        while let Token::Identifier(arg) = self.current_token.clone() {
            args.push(arg);
            self.advance()?;
        }

        if !matches!(self.current_token, Token::Char(')')) {
            return Err(ParseError::ExpectedPrototypeCloseParen);
        }
        self.advance()?;

        let expected_arity = match kind {
            ProtoKind::Unary => Some(1),
            ProtoKind::Binary { .. } => Some(2),
            ProtoKind::Function => None,
        };
        if let Some(n) = expected_arity {
            if args.len() != n {
                return Err(ParseError::WrongOperandCount);
            }
        }

        Ok(Prototype::new(name, args, kind))
    }

    fn expect_operator_char(&self, err: ParseError) -> Result<char, ParseError> {
        match self.current_token {
            Token::Char(c) if c.is_ascii() => Ok(c),
            _ => Err(err),
        }
    }

    /// `expression = unary (binop unary)*`
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        self.parse_binop_rhs(0, lhs)
    }

    fn parse_binop_rhs(&mut self, min_prec: i32, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            let tok_prec = self.tok_precedence();
            if tok_prec < min_prec {
                return Ok(lhs);
            }

            let op = match self.current_token {
                Token::Char(c) => c,
                _ => return Ok(lhs),
            };
            self.advance()?; // eat the operator

            let mut rhs = self.parse_unary()?;

            let next_prec = self.tok_precedence();
            if tok_prec < next_prec {
                rhs = self.parse_binop_rhs(tok_prec + 1, rhs)?;
            }

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    /// `unary = primary | op unary`
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.current_token {
            Token::Char(c) if c != '(' && c != ',' => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: c,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    /// `primary = number | identifier [...] | '(' expression ')' | ifexpr | forexpr | varexpr`
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Identifier(name) => self.parse_identifier_expr(name),
            Token::Char('(') => self.parse_paren_expr(),
            Token::If => self.parse_if_expr(),
            Token::For => self.parse_for_expr(),
            Token::Var => self.parse_var_expr(),
            other => Err(ParseError::UnexpectedToken(other)),
        }
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // eat '('
        let expr = self.parse_expression()?;
        if !matches!(self.current_token, Token::Char(')')) {
            return Err(ParseError::ExpectedCloseParen);
        }
        self.advance()?; // eat ')'
        Ok(expr)
    }

    fn parse_identifier_expr(&mut self, name: String) -> Result<Expr, ParseError> {
        self.advance()?; // eat identifier
        if !matches!(self.current_token, Token::Char('(')) {
            return Ok(Expr::Variable(name));
        }

        self.advance()?; // eat '('
        let mut args = Vec::new();
        if !matches!(self.current_token, Token::Char(')')) {
            loop {
                args.push(self.parse_expression()?);
                match self.current_token {
                    Token::Char(')') => break,
                    Token::Char(',') => self.advance()?,
                    _ => return Err(ParseError::ExpectedArgSeparator),
                }
            }
        }
        self.advance()?; // eat ')'
        Ok(Expr::Call { callee: name, args })
    }

    /// `ifexpr = 'if' expression 'then' expression 'else' expression`
    fn parse_if_expr(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // eat 'if'
        let cond = self.parse_expression()?;
        if !matches!(self.current_token, Token::Then) {
            return Err(ParseError::ExpectedThen);
        }
        self.advance()?; // eat 'then'
        let then_branch = self.parse_expression()?;
        if !matches!(self.current_token, Token::Else) {
            return Err(ParseError::ExpectedElse);
        }
        self.advance()?; // eat 'else'
        let else_branch = self.parse_expression()?;
        Ok(Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    /// `forexpr = 'for' identifier '=' expr ',' expr (',' expr)? 'in' expression`
    fn parse_for_expr(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // eat 'for'
        let var_name = match self.current_token.clone() {
            Token::Identifier(name) => name,
            other => return Err(ParseError::UnexpectedToken(other)),
        };
        self.advance()?; // eat identifier

        if !matches!(self.current_token, Token::Char('=')) {
            return Err(ParseError::ExpectedForAssign);
        }
        self.advance()?; // eat '='

        let start = self.parse_expression()?;
        if !matches!(self.current_token, Token::Char(',')) {
            return Err(ParseError::ExpectedForComma);
        }
        self.advance()?; // eat ','

        let end = self.parse_expression()?;

        let step = if matches!(self.current_token, Token::Char(',')) {
            self.advance()?; // eat ','
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        if !matches!(self.current_token, Token::In) {
            return Err(ParseError::ExpectedForIn);
        }
        self.advance()?; // eat 'in'

        let body = self.parse_expression()?;

        Ok(Expr::For {
            var_name,
            start: Box::new(start),
            end: Box::new(end),
            step,
            body: Box::new(body),
        })
    }

    /// `varexpr = 'var' identifier ('=' expression)? (',' identifier ('=' expression)?)* 'in' expression`
    fn parse_var_expr(&mut self) -> Result<Expr, ParseError> {
        self.advance()?; // eat 'var'
        let mut bindings = Vec::new();

        loop {
            let name = match self.current_token.clone() {
                Token::Identifier(name) => name,
                _ => return Err(ParseError::ExpectedVarIdentifier),
            };
            self.advance()?; // eat identifier

            let init = if matches!(self.current_token, Token::Char('=')) {
                self.advance()?; // eat '='
                Some(self.parse_expression()?)
            } else {
                None
            };
            bindings.push((name, init));

            if !matches!(self.current_token, Token::Char(',')) {
                break;
            }
            self.advance()?; // eat ','
        }

        if !matches!(self.current_token, Token::In) {
            return Err(ParseError::ExpectedVarIn);
        }
        self.advance()?; // eat 'in'

        let body = self.parse_expression()?;
        Ok(Expr::Var {
            bindings,
            body: Box::new(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::StrSource;

    fn parser_for(input: &str) -> Parser<StrSource> {
        let mut p = Parser::new(Lexer::new(StrSource::new(input)));
        p.add_binop('=', 2);
        p.add_binop('<', 10);
        p.add_binop('+', 20);
        p.add_binop('-', 30);
        p.add_binop('*', 40);
        p.prime().unwrap();
        p
    }

    fn parse_expr(input: &str) -> Expr {
        let mut p = parser_for(input);
        match p.parse_top().unwrap() {
            TopForm::TopLevelExpr(f) => f.body,
            other => panic!("expected a top-level expression, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let e = parse_expr("a+b*c");
        assert_eq!(
            e,
            Expr::Binary {
                op: '+',
                lhs: Box::new(Expr::Variable("a".into())),
                rhs: Box::new(Expr::Binary {
                    op: '*',
                    lhs: Box::new(Expr::Variable("b".into())),
                    rhs: Box::new(Expr::Variable("c".into())),
                }),
            }
        );
    }

    #[test]
    fn precedence_lt_binds_looser_than_add() {
        let e = parse_expr("a<b+c");
        assert_eq!(
            e,
            Expr::Binary {
                op: '<',
                lhs: Box::new(Expr::Variable("a".into())),
                rhs: Box::new(Expr::Binary {
                    op: '+',
                    lhs: Box::new(Expr::Variable("b".into())),
                    rhs: Box::new(Expr::Variable("c".into())),
                }),
            }
        );
    }

    #[test]
    fn assignment_is_left_associative() {
        let e = parse_expr("a = b = c");
        assert_eq!(
            e,
            Expr::Binary {
                op: '=',
                lhs: Box::new(Expr::Variable("a".into())),
                rhs: Box::new(Expr::Binary {
                    op: '=',
                    lhs: Box::new(Expr::Variable("b".into())),
                    rhs: Box::new(Expr::Variable("c".into())),
                }),
            }
        );
    }

    #[test]
    fn user_binary_operator_installed_during_prototype_parse() {
        let mut p = parser_for("def binary| 5 (a b) a+b");
        match p.parse_top().unwrap() {
            TopForm::Definition(f) => {
                assert_eq!(f.proto.name, "binary|");
                assert_eq!(f.proto.kind, ProtoKind::Binary { precedence: 5 });
            }
            other => panic!("expected a definition, got {other:?}"),
        }
    }

    #[test]
    fn unary_prototype_requires_single_argument() {
        let mut p = parser_for("def unary!(a b) a");
        assert_eq!(p.parse_top(), Err(ParseError::WrongOperandCount));
    }

    #[test]
    fn call_with_multiple_arguments() {
        let e = parse_expr("foo(1, 2, 3)");
        assert_eq!(
            e,
            Expr::Call {
                callee: "foo".into(),
                args: vec![Expr::Number(1.0), Expr::Number(2.0), Expr::Number(3.0)],
            }
        );
    }

    #[test]
    fn var_with_parallel_bindings() {
        let e = parse_expr("var a=1, b=2 in a+b");
        match e {
            Expr::Var { bindings, .. } => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].0, "a");
                assert_eq!(bindings[1].0, "b");
            }
            other => panic!("expected Var, got {other:?}"),
        }
    }

    #[test]
    fn malformed_prototype_is_a_parse_error() {
        let mut p = parser_for("def ( ) 1");
        assert!(p.parse_top().is_err());
    }
}
