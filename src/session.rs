use std::collections::HashMap;
use std::io::Write;

use inkwell::context::Context;

use crate::ast::{Function, Item, Prototype, ANONYMOUS_FN_NAME};
use crate::codegen::{Codegen, CodegenError};
use crate::jit::{Jit, JitError};
use crate::lexer::Token;
use crate::parser::{Parser, ParserError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParserError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Jit(#[from] JitError),
    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Recoverable failures abort one top-level construct; anything else is
    /// an internal defect and ends the session.
    fn is_recoverable(&self) -> bool {
        match self {
            SessionError::Parse(_) => true,
            SessionError::Codegen(err) => !err.is_internal(),
            SessionError::Jit(_) | SessionError::Io(_) => false,
        }
    }
}

/// Incremental driver: one compiled unit per top-level construct. Owns the
/// session-lifetime signature registry and the list of defined functions,
/// both of which outlive any single unit.
pub struct Session<'ctx> {
    context: &'ctx Context,
    jit: Jit<'ctx>,
    signatures: HashMap<String, Prototype>,
    defined: Vec<Function>,
    dump_ir: bool,
    unit_counter: usize,
}

impl<'ctx> Session<'ctx> {
    pub fn new(context: &'ctx Context, dump_ir: bool) -> Result<Self, SessionError> {
        Ok(Session {
            context,
            jit: Jit::new()?,
            signatures: HashMap::new(),
            defined: Vec::new(),
            dump_ir,
            unit_counter: 0,
        })
    }

    /// Read top-level constructs from `source` until end of input, printing
    /// the value of each bare expression to `out` and one diagnostic per
    /// recoverable failure to stderr.
    pub fn run<W: Write>(&mut self, source: &str, out: &mut W) -> Result<(), SessionError> {
        let mut parser = Parser::new(source);
        loop {
            match parser.current() {
                Token::Eof => return Ok(()),
                Token::Char(';') => parser.advance(),
                _ => {
                    let item = match parser.parse_item() {
                        Ok(item) => item,
                        Err(err) => {
                            eprintln!("error: {}", err);
                            // resynchronize by discarding the offending token
                            parser.advance();
                            continue;
                        }
                    };
                    match self.eval(&item) {
                        Ok(Some(value)) => writeln!(out, "{}", value)?,
                        Ok(None) => {}
                        Err(err) if err.is_recoverable() => eprintln!("error: {}", err),
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Translate and execute one top-level construct. Returns the computed
    /// value for bare expressions, `None` for definitions and externs.
    pub fn eval(&mut self, item: &Item) -> Result<Option<f64>, SessionError> {
        match item {
            Item::Extern(proto) => {
                // declaration only; the symbol resolves at execution time
                self.signatures.insert(proto.name.clone(), proto.clone());
                Ok(None)
            }
            Item::Function(function) => self.eval_function(function),
        }
    }

    fn eval_function(&mut self, function: &Function) -> Result<Option<f64>, SessionError> {
        let unit_name = format!("unit{}", self.unit_counter);
        self.unit_counter += 1;
        let mut codegen = Codegen::new(self.context, &unit_name, &mut self.signatures);

        // MCJIT units are self-contained: every function defined so far is
        // re-emitted, so calls resolve without cross-unit linking and a
        // second `def` of a live name hits the materialized-body check.
        for earlier in &self.defined {
            codegen.compile_function(earlier)?;
        }
        codegen.compile_function(function)?;

        if self.dump_ir {
            eprintln!("{}", codegen.module().print_to_string().to_string_lossy());
        }

        self.jit.add(codegen.into_module())?;

        if function.is_anon {
            let result = self.jit.invoke(ANONYMOUS_FN_NAME)?;
            self.jit.retract(ANONYMOUS_FN_NAME);
            Ok(Some(result))
        } else {
            self.defined.push(function.clone());
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn results(source: &str) -> Vec<f64> {
        let context = Context::create();
        let mut session = Session::new(&context, false).unwrap();
        let mut out = Vec::new();
        session.run(source, &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| line.parse().unwrap())
            .collect()
    }

    fn eval_one(session: &mut Session, source: &str) -> Result<Option<f64>, SessionError> {
        let item = Parser::new(source).parse_item().unwrap();
        session.eval(&item)
    }

    #[test]
    fn precedence_drives_evaluation() {
        assert_eq!(results("1+2*3; (1+2)*3;"), vec![7.0, 9.0]);
    }

    #[test]
    fn comparison_yields_one_or_zero() {
        assert_eq!(results("1<2; 2<1;"), vec![1.0, 0.0]);
    }

    #[test]
    fn conditional_selects_the_taken_branch() {
        assert_eq!(
            results("if 1 then 2 else 3; if 0 then 2 else 3;"),
            vec![2.0, 3.0]
        );
    }

    #[test]
    fn for_always_yields_zero() {
        assert_eq!(
            results("for i = 1, i < 5, 1 in i; for i = 1, i < 10 in i*i;"),
            vec![0.0, 0.0]
        );
    }

    #[test]
    fn definitions_stay_callable_across_units() {
        assert_eq!(
            results("def add(a b) a+b; add(1, 2); add(add(1, 2), 3);"),
            vec![3.0, 6.0]
        );
    }

    #[test]
    fn recursion_works() {
        assert_eq!(
            results("def fib(n) if n < 2 then n else fib(n-1)+fib(n-2); fib(10);"),
            vec![55.0]
        );
    }

    #[test]
    fn forward_reference_through_extern() {
        // isEven calls isOdd before isOdd has a body; only registration is
        // needed at definition time.
        assert_eq!(
            results(
                "extern isOdd(n);\
                 def isEven(n) if n < 1 then 1 else isOdd(n-1);\
                 def isOdd(n) if n < 1 then 0 else isEven(n-1);\
                 isEven(4); isOdd(3);"
            ),
            vec![1.0, 1.0]
        );
    }

    #[test]
    fn extern_binds_to_process_symbols() {
        assert_eq!(results("extern sin(x); sin(0);"), vec![0.0]);
    }

    #[test]
    fn extern_then_definition_is_not_a_redefinition() {
        assert_eq!(results("extern g(x); def g(x) x*2; g(4);"), vec![8.0]);
    }

    #[test]
    fn arity_is_enforced_and_the_session_continues() {
        let context = Context::create();
        let mut session = Session::new(&context, false).unwrap();

        assert_eq!(eval_one(&mut session, "def f(a b) a+b").unwrap(), None);
        assert!(matches!(
            eval_one(&mut session, "f(1)"),
            Err(SessionError::Codegen(CodegenError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            }))
        ));
        assert_eq!(eval_one(&mut session, "f(1, 2)").unwrap(), Some(3.0));
    }

    #[test]
    fn redefinition_keeps_the_original_body() {
        let context = Context::create();
        let mut session = Session::new(&context, false).unwrap();

        assert_eq!(eval_one(&mut session, "def f(a) a").unwrap(), None);
        assert!(matches!(
            eval_one(&mut session, "def f(a) a+1"),
            Err(SessionError::Codegen(CodegenError::Redefinition(name))) if name == "f"
        ));
        assert_eq!(eval_one(&mut session, "f(5)").unwrap(), Some(5.0));
    }

    #[test]
    fn unknown_variable_does_not_end_the_session() {
        assert_eq!(results("x; 42;"), vec![42.0]);
    }

    #[test]
    fn call_values_flow_through_failed_definitions() {
        // a(n) calls through the registry; the bad body of b only kills its
        // own construct, and call results still come back afterwards
        assert_eq!(
            results("extern b(n); def a(n) b(n); def b(n) qq; 42; def b(n) n+1; a(4);"),
            vec![42.0, 5.0]
        );
    }

    #[test]
    fn parse_errors_resynchronize() {
        assert_eq!(results("def 1; 7;"), vec![7.0]);
    }
}
