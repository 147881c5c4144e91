use std::collections::HashMap;

use crate::ast::{Expression, Function, Item, Prototype, ANONYMOUS_FN_NAME};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("expected {expected}, found {found}")]
    Expected {
        expected: &'static str,
        found: Token,
    },
    #[error("expected an expression, found {0}")]
    ExpectedExpression(Token),
    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),
}

type ParseResult<T> = Result<T, ParserError>;

/// Recursive descent over top-level constructs, with precedence climbing for
/// binary expressions. Holds exactly one token of lookahead.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    precedence: HashMap<char, i32>,
}

/// `*` binds tighter than `+`/`-`, which bind tighter than `<`.
pub fn default_precedence() -> HashMap<char, i32> {
    let mut precedence = HashMap::new();
    precedence.insert('<', 10);
    precedence.insert('+', 20);
    precedence.insert('-', 20);
    precedence.insert('*', 40);
    precedence
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_precedence(input, default_precedence())
    }

    pub fn with_precedence(input: &'a str, precedence: HashMap<char, i32>) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            precedence,
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// Parse the next top-level construct. A bare expression is wrapped in an
    /// anonymous zero-parameter function so every construct goes through the
    /// same codegen path.
    pub fn parse_item(&mut self) -> ParseResult<Item> {
        match self.current {
            Token::Def => self.parse_definition().map(Item::Function),
            Token::Extern => self.parse_extern().map(Item::Extern),
            _ => self.parse_top_level_expr().map(Item::Function),
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> ParseResult<()> {
        if self.current == token {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::Expected {
                expected,
                found: self.current.clone(),
            })
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> ParseResult<String> {
        if let Token::Ident(name) = &self.current {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(ParserError::Expected {
                expected,
                found: self.current.clone(),
            })
        }
    }

    fn parse_definition(&mut self) -> ParseResult<Function> {
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function {
            prototype,
            body,
            is_anon: false,
        })
    }

    fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.advance();
        self.parse_prototype()
    }

    fn parse_top_level_expr(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        Ok(Function {
            prototype: Prototype {
                name: ANONYMOUS_FN_NAME.to_string(),
                args: Vec::new(),
            },
            body,
            is_anon: true,
        })
    }

    /// SIGNATURE := ident '(' ident* ')' - parameters are whitespace-separated.
    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = self.expect_ident("function name")?;
        self.expect(Token::Char('('), "'(' after function name")?;

        let mut args = Vec::new();
        while let Token::Ident(arg) = &self.current {
            if args.contains(arg) {
                return Err(ParserError::DuplicateParameter(arg.clone()));
            }
            args.push(arg.clone());
            self.advance();
        }
        self.expect(Token::Char(')'), "')' after parameter list")?;

        Ok(Prototype { name, args })
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    fn peek_operator(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(c) => self.precedence.get(&c).map(|&prec| (c, prec)),
            _ => None,
        }
    }

    fn parse_binop_rhs(&mut self, min_prec: i32, mut lhs: Expression) -> ParseResult<Expression> {
        loop {
            let (op, prec) = match self.peek_operator() {
                Some((op, prec)) if prec >= min_prec => (op, prec),
                _ => return Ok(lhs),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            // If the next operator binds tighter, it takes the rhs first.
            if let Some((_, next_prec)) = self.peek_operator() {
                if prec < next_prec {
                    rhs = self.parse_binop_rhs(prec + 1, rhs)?;
                }
            }

            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current.clone() {
            Token::Number(num) => {
                self.advance();
                Ok(Expression::Literal(num))
            }
            Token::Ident(name) => {
                self.advance();
                self.parse_ident_tail(name)
            }
            Token::Char('(') => self.parse_paren(),
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            other => Err(ParserError::ExpectedExpression(other)),
        }
    }

    /// Either a variable reference or, when followed by '(', a call.
    fn parse_ident_tail(&mut self, name: String) -> ParseResult<Expression> {
        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(name));
        }
        self.advance();

        let mut args = Vec::new();
        if self.current == Token::Char(')') {
            self.advance();
            return Ok(Expression::Call(name, args));
        }
        loop {
            args.push(self.parse_expression()?);
            if self.current == Token::Char(')') {
                self.advance();
                return Ok(Expression::Call(name, args));
            }
            self.expect(Token::Char(','), "',' or ')' in argument list")?;
        }
    }

    fn parse_paren(&mut self) -> ParseResult<Expression> {
        self.advance();
        let inner = self.parse_expression()?;
        self.expect(Token::Char(')'), "')'")?;
        Ok(inner)
    }

    fn parse_if(&mut self) -> ParseResult<Expression> {
        self.advance();
        let cond = self.parse_expression()?;
        self.expect(Token::Then, "'then'")?;
        let then = self.parse_expression()?;
        self.expect(Token::Else, "'else'")?;
        let otherwise = self.parse_expression()?;
        Ok(Expression::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_for(&mut self) -> ParseResult<Expression> {
        self.advance();
        let var = self.expect_ident("loop variable after 'for'")?;
        self.expect(Token::Char('='), "'=' after loop variable")?;
        let start = self.parse_expression()?;
        self.expect(Token::Char(','), "',' after start value")?;
        let end = self.parse_expression()?;
        let step = if self.current == Token::Char(',') {
            self.advance();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect(Token::In, "'in' after for clauses")?;
        let body = self.parse_expression()?;
        Ok(Expression::For {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step,
            body: Box::new(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_expr(input: &str) -> Expression {
        match Parser::new(input).parse_item().unwrap() {
            Item::Function(func) => {
                assert!(func.is_anon);
                func.body
            }
            item => panic!("expected an anonymous expression, got {:?}", item),
        }
    }

    fn binary(op: char, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse_expr("1+2*3"),
            binary(
                '+',
                Expression::Literal(1.0),
                binary('*', Expression::Literal(2.0), Expression::Literal(3.0)),
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            parse_expr("(1+2)*3"),
            binary(
                '*',
                binary('+', Expression::Literal(1.0), Expression::Literal(2.0)),
                Expression::Literal(3.0),
            )
        );
    }

    #[test]
    fn comparison_binds_loosest_and_folds_left() {
        assert_eq!(
            parse_expr("a-b<c+d"),
            binary(
                '<',
                binary(
                    '-',
                    Expression::Variable("a".to_string()),
                    Expression::Variable("b".to_string()),
                ),
                binary(
                    '+',
                    Expression::Variable("c".to_string()),
                    Expression::Variable("d".to_string()),
                ),
            )
        );
        assert_eq!(
            parse_expr("1-2-3"),
            binary(
                '-',
                binary('-', Expression::Literal(1.0), Expression::Literal(2.0)),
                Expression::Literal(3.0),
            )
        );
    }

    #[test]
    fn calls_take_comma_separated_arguments() {
        assert_eq!(
            parse_expr("f(x, 1+2)"),
            Expression::Call(
                "f".to_string(),
                vec![
                    Expression::Variable("x".to_string()),
                    binary('+', Expression::Literal(1.0), Expression::Literal(2.0)),
                ],
            )
        );
        assert_eq!(parse_expr("f()"), Expression::Call("f".to_string(), vec![]));
    }

    #[test]
    fn definition_with_whitespace_separated_params() {
        let item = Parser::new("def add(x y) x+y").parse_item().unwrap();
        assert_eq!(
            item,
            Item::Function(Function {
                prototype: Prototype {
                    name: "add".to_string(),
                    args: vec!["x".to_string(), "y".to_string()],
                },
                body: binary(
                    '+',
                    Expression::Variable("x".to_string()),
                    Expression::Variable("y".to_string()),
                ),
                is_anon: false,
            })
        );
    }

    #[test]
    fn extern_declares_a_prototype() {
        let item = Parser::new("extern sin(x)").parse_item().unwrap();
        assert_eq!(
            item,
            Item::Extern(Prototype {
                name: "sin".to_string(),
                args: vec!["x".to_string()],
            })
        );
    }

    #[test]
    fn if_then_else() {
        assert_eq!(
            parse_expr("if x < 2 then 1 else 0"),
            Expression::If {
                cond: Box::new(binary(
                    '<',
                    Expression::Variable("x".to_string()),
                    Expression::Literal(2.0),
                )),
                then: Box::new(Expression::Literal(1.0)),
                otherwise: Box::new(Expression::Literal(0.0)),
            }
        );
    }

    #[test]
    fn for_with_and_without_step() {
        assert_eq!(
            parse_expr("for i = 1, i < 5, 2 in i"),
            Expression::For {
                var: "i".to_string(),
                start: Box::new(Expression::Literal(1.0)),
                end: Box::new(binary(
                    '<',
                    Expression::Variable("i".to_string()),
                    Expression::Literal(5.0),
                )),
                step: Some(Box::new(Expression::Literal(2.0))),
                body: Box::new(Expression::Variable("i".to_string())),
            }
        );
        assert!(matches!(
            parse_expr("for i = 1, i < 5 in i"),
            Expression::For { step: None, .. }
        ));
    }

    #[test]
    fn missing_close_paren_is_an_error() {
        assert_eq!(
            Parser::new("(1+2").parse_item(),
            Err(ParserError::Expected {
                expected: "')'",
                found: Token::Eof,
            })
        );
    }

    #[test]
    fn stray_token_is_not_an_expression() {
        assert_eq!(
            Parser::new(")").parse_item(),
            Err(ParserError::ExpectedExpression(Token::Char(')')))
        );
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        assert_eq!(
            Parser::new("def f(x x) x").parse_item(),
            Err(ParserError::DuplicateParameter("x".to_string()))
        );
    }
}
