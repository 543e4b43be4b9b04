//! Boolean expressions over program variables.
//!
//! Expressions appear in assignments and assumptions on control-flow edges,
//! and as predicates in a fixed predicate map. The textual syntax accepted by
//! [`Expr::parse`] is
//!
//! ```text
//! expr    := iff
//! iff     := implies ("==" implies)*
//! implies := or ("->" implies)?
//! or      := xor ("|" xor)*
//! xor     := and ("^" and)*
//! and     := unary ("&" unary)*
//! unary   := "!" unary | atom
//! atom    := "true" | "false" | ident | "(" expr ")"
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::error::ParseError;

/// Boolean expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Boolean literal
    Lit(bool),
    /// Variable reference
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    /// Equivalence
    Eq(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(other))
    }

    pub fn xor(self, other: Expr) -> Self {
        Expr::Xor(Box::new(self), Box::new(other))
    }

    pub fn implies(self, other: Expr) -> Self {
        Expr::Implies(Box::new(self), Box::new(other))
    }

    pub fn iff(self, other: Expr) -> Self {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    /// Names of all variables occurring in the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            Expr::Lit(_) => {}
            Expr::Var(v) => {
                vars.insert(v.clone());
            }
            Expr::Not(e) => e.collect_variables(vars),
            Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Xor(l, r)
            | Expr::Implies(l, r)
            | Expr::Eq(l, r) => {
                l.collect_variables(vars);
                r.collect_variables(vars);
            }
        }
    }

    pub fn parse(input: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_iff()?;
        match parser.peek() {
            None => Ok(expr),
            Some((token, offset)) => Err(ParseError::UnexpectedToken {
                token: token.to_string(),
                offset,
            }),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(b) => write!(f, "{}", b),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Not(e) => write!(f, "!{}", e),
            Expr::And(l, r) => write!(f, "({} & {})", l, r),
            Expr::Or(l, r) => write!(f, "({} | {})", l, r),
            Expr::Xor(l, r) => write!(f, "({} ^ {})", l, r),
            Expr::Implies(l, r) => write!(f, "({} -> {})", l, r),
            Expr::Eq(l, r) => write!(f, "({} == {})", l, r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    True,
    False,
    Not,
    And,
    Or,
    Xor,
    Implies,
    Iff,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Not => write!(f, "!"),
            Token::And => write!(f, "&"),
            Token::Or => write!(f, "|"),
            Token::Xor => write!(f, "^"),
            Token::Implies => write!(f, "->"),
            Token::Iff => write!(f, "=="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '!' => Token::Not,
            '&' => Token::And,
            '|' => Token::Or,
            '^' => Token::Xor,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '-' if matches!(chars.peek(), Some((_, '>'))) => {
                chars.next();
                Token::Implies
            }
            '=' if matches!(chars.peek(), Some((_, '='))) => {
                chars.next();
                Token::Iff
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match name.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(name),
                }
            }
            ch => return Err(ParseError::UnexpectedChar { ch, offset }),
        };
        tokens.push((token, offset));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, o)| (t, *o))
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if matches!(self.peek(), Some((t, _)) if t == expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_iff(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_implies()?;
        while self.eat(&Token::Iff) {
            lhs = lhs.iff(self.parse_implies()?);
        }
        Ok(lhs)
    }

    fn parse_implies(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Implies) {
            // Right-associative
            return Ok(lhs.implies(self.parse_implies()?));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_xor()?;
        while self.eat(&Token::Or) {
            lhs = lhs.or(self.parse_xor()?);
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Xor) {
            lhs = lhs.xor(self.parse_and()?);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&Token::And) {
            lhs = lhs.and(self.parse_unary()?);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            return Ok(self.parse_unary()?.not());
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let (token, offset) = match self.tokens.get(self.pos) {
            Some((token, offset)) => (token.clone(), *offset),
            None => return Err(ParseError::UnexpectedEnd),
        };
        self.pos += 1;
        match token {
            Token::True => Ok(Expr::Lit(true)),
            Token::False => Ok(Expr::Lit(false)),
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                let inner = self.parse_iff()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    match self.peek() {
                        Some((token, offset)) => Err(ParseError::UnexpectedToken {
                            token: token.to_string(),
                            offset,
                        }),
                        None => Err(ParseError::UnexpectedEnd),
                    }
                }
            }
            token => Err(ParseError::UnexpectedToken {
                token: token.to_string(),
                offset,
            }),
        }
    }
}
