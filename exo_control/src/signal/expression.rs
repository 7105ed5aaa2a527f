//! Compiled arithmetic expressions over named variables.
//!
//! Sensors compose their inputs through a small expression language:
//! `+ - * / ^`, parentheses, unary minus, decimal literals, the standard
//! univariate transcendentals, and identifiers bound to variable slots
//! (`in0..inN`). An expression is compiled once into an immutable tree;
//! evaluation is a pure walk against a slice of current variable values —
//! reentrant, O(nodes), and allocation-free.

use thiserror::Error;

/// Expression rejected at compile time.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid expression: {0}")]
pub struct ExpressionError(String);

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Tanh,
}

impl Function {
    fn by_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "tanh" => Self::Tanh,
            _ => return None,
        })
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Tanh => x.tanh(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Constant(f64),
    Variable(usize),
    Negate(Box<Node>),
    Call(Function, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

impl Node {
    fn eval(&self, variables: &[f64]) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Variable(slot) => variables.get(*slot).copied().unwrap_or(0.0),
            Self::Negate(inner) => -inner.eval(variables),
            Self::Call(function, argument) => function.apply(argument.eval(variables)),
            Self::Binary(op, lhs, rhs) => {
                let a = lhs.eval(variables);
                let b = rhs.eval(variables);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
        }
    }
}

/// A compiled, reusable evaluation plan.
#[derive(Debug, Clone)]
pub struct Expression {
    root: Node,
}

impl Expression {
    /// Compile `source` against the given variable names; `variables[i]`
    /// binds to slot `i` of the evaluation slice.
    pub fn compile(source: &str, variables: &[&str]) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            position: 0,
            variables,
        };
        let root = parser.expression()?;
        if parser.position != tokens.len() {
            return Err(ExpressionError(format!(
                "unexpected trailing input at token {}",
                parser.position
            )));
        }
        Ok(Self { root })
    }

    /// The identity of variable slot 0 — the fallback plan.
    pub fn identity() -> Self {
        Self {
            root: Node::Variable(0),
        }
    }

    /// Evaluate against current variable values. Missing slots read 0.
    #[inline]
    pub fn eval(&self, variables: &[f64]) -> f64 {
        self.root.eval(variables)
    }
}

// ─── Tokenizer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                let text = &source[start..i];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError(format!("bad number literal '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                {
                    i += 1;
                }
                tokens.push(Token::Identifier(source[start..i].to_string()));
            }
            other => return Err(ExpressionError(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────
//
// expression = term { ('+' | '-') term }
// term       = unary { ('*' | '/') unary }
// unary      = ('-' | '+') unary | power
// power      = primary [ '^' unary ]          (right-associative)
// primary    = number | identifier [ '(' expression ')' ] | '(' expression ')'

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    variables: &'a [&'a str],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect_close(&mut self) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(Token::Close) => Ok(()),
            _ => Err(ExpressionError("missing ')'".into())),
        }
    }

    fn expression(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.position += 1;
            let rhs = self.term()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.position += 1;
            let rhs = self.unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.position += 1;
                Ok(Node::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.position += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, ExpressionError> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.position += 1;
            let exponent = self.unary()?;
            return Ok(Node::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        match self.advance().cloned() {
            Some(Token::Number(value)) => Ok(Node::Constant(value)),
            Some(Token::Open) => {
                let inner = self.expression()?;
                self.expect_close()?;
                Ok(inner)
            }
            Some(Token::Identifier(name)) => {
                if let Some(function) = Function::by_name(&name) {
                    match self.advance() {
                        Some(Token::Open) => {}
                        _ => {
                            return Err(ExpressionError(format!(
                                "function '{name}' needs parentheses"
                            )));
                        }
                    }
                    let argument = self.expression()?;
                    self.expect_close()?;
                    return Ok(Node::Call(function, Box::new(argument)));
                }
                if name == "pi" {
                    return Ok(Node::Constant(std::f64::consts::PI));
                }
                if name == "e" {
                    return Ok(Node::Constant(std::f64::consts::E));
                }
                let slot = self
                    .variables
                    .iter()
                    .position(|candidate| *candidate == name)
                    .ok_or_else(|| ExpressionError(format!("unknown variable '{name}'")))?;
                Ok(Node::Variable(slot))
            }
            _ => Err(ExpressionError("unexpected end of expression".into())),
        }
    }
}
