/// Name given to the zero-parameter function that wraps a bare top-level
/// expression. The session retracts this symbol after each evaluation so the
/// name is free again for the next one.
pub const ANONYMOUS_FN_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(f64),
    Variable(String),
    Binary(char, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
    If {
        cond: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    For {
        var: String,
        start: Box<Expression>,
        end: Box<Expression>,
        step: Option<Box<Expression>>,
        body: Box<Expression>,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
    /// Set for the synthetic wrapper around a bare top-level expression.
    pub is_anon: bool,
}

/// One top-level construct as dispatched by the parser.
#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Function(Function),
    Extern(Prototype),
}
