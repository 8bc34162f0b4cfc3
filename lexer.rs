//! Boolean expressions over named atoms.
//!
//! Grammar, loosest first:
//!
//! ```text
//! expr    := and ('|' and)*
//! and     := unary ('&' unary)*
//! unary   := '!' unary | primary
//! primary := '(' expr ')' | atom
//! ```
//!
//! An atom is any run of characters other than `!&|()`, trimmed of
//! surrounding whitespace, so `blue sky & !night` has the atoms `blue sky`
//! and `night`. Atoms are case-sensitive.
//!
//! Chains of `&` or `|` become one node, and nesting (groups and negations)
//! is capped at [`MAX_DEPTH`], so walking or dropping a parsed tree never
//! recurses deeper than that.

use crate::error::{Error, Result};

const OPERATORS: &[char] = &['!', '&', '|', '(', ')'];

/// Deepest nesting of `(` and `!` accepted.
pub const MAX_DEPTH: usize = 64;
/// Most atoms accepted in one expression.
pub const MAX_ATOMS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<A> {
    And(Vec<Expr<A>>),
    Or(Vec<Expr<A>>),
    Not(Box<Expr<A>>),
    Atom(A),
}

/// An atom as written, with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub name: String,
    pub position: usize,
}

impl<A> Expr<A> {
    pub fn eval<F>(&self, test: &F) -> bool
    where
        F: Fn(&A) -> bool,
    {
        match self {
            Expr::And(terms) => terms.iter().all(|term| term.eval(test)),
            Expr::Or(terms) => terms.iter().any(|term| term.eval(test)),
            Expr::Not(inner) => !inner.eval(test),
            Expr::Atom(atom) => test(atom),
        }
    }

    /// Rebuilds the tree with each atom converted by `convert`.
    pub fn try_map<B, F>(self, convert: &mut F) -> Result<Expr<B>>
    where
        F: FnMut(A) -> Result<B>,
    {
        Ok(match self {
            Expr::And(terms) => Expr::And(try_map_all(terms, convert)?),
            Expr::Or(terms) => Expr::Or(try_map_all(terms, convert)?),
            Expr::Not(inner) => Expr::Not(Box::new(inner.try_map(convert)?)),
            Expr::Atom(atom) => Expr::Atom(convert(atom)?),
        })
    }
}

fn try_map_all<A, B, F>(terms: Vec<Expr<A>>, convert: &mut F) -> Result<Vec<Expr<B>>>
where
    F: FnMut(A) -> Result<B>,
{
    terms.into_iter().map(|term| term.try_map(convert)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Not,
    And,
    Or,
    Open,
    Close,
    Atom(&'a str),
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self {
            Token::Not => "'!'".into(),
            Token::And => "'&'".into(),
            Token::Or => "'|'".into(),
            Token::Open => "'('".into(),
            Token::Close => "')'".into(),
            Token::Atom(name) => format!("'{name}'"),
        }
    }
}

fn tokenize(input: &str) -> Vec<(Token<'_>, usize)> {
    let mut tokens = Vec::new();
    let mut rest = input;
    let mut offset = 0;
    while let Some(ch) = rest.chars().next() {
        let token = match ch {
            '!' => Some(Token::Not),
            '&' => Some(Token::And),
            '|' => Some(Token::Or),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        let len = match token {
            Some(token) => {
                tokens.push((token, offset));
                ch.len_utf8()
            }
            None => {
                let len = rest.find(OPERATORS).unwrap_or(rest.len());
                let run = &rest[..len];
                let name = run.trim();
                if !name.is_empty() {
                    let lead = run.len() - run.trim_start().len();
                    tokens.push((Token::Atom(name), offset + lead));
                }
                len
            }
        };
        rest = &rest[len..];
        offset += len;
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<(Token<'a>, usize)>,
    cursor: usize,
    end: usize,
    depth: usize,
    atoms: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<(Token<'a>, usize)> {
        self.tokens.get(self.cursor).copied()
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |(_, pos)| pos)
    }

    fn eat(&mut self, expected: Token<'_>) -> bool {
        if self.peek().map(|(token, _)| token) == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr<Atom>> {
        let mut terms = vec![self.and()?];
        while self.eat(Token::Or) {
            terms.push(self.and()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Expr::Or(terms),
        })
    }

    fn and(&mut self) -> Result<Expr<Atom>> {
        let mut terms = vec![self.unary()?];
        while self.eat(Token::And) {
            terms.push(self.unary()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Expr::And(terms),
        })
    }

    fn descend(&mut self, position: usize) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::parse(position, "expression nested too deeply"));
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<Expr<Atom>> {
        let Some((Token::Not, position)) = self.peek() else {
            return self.primary();
        };
        self.cursor += 1;
        self.descend(position)?;
        let inner = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Not(Box::new(inner)))
    }

    fn primary(&mut self) -> Result<Expr<Atom>> {
        let Some((token, position)) = self.peek() else {
            return Err(Error::parse(self.end, "expected a term, found end of input"));
        };
        match token {
            Token::Atom(name) => {
                self.cursor += 1;
                self.atoms += 1;
                if self.atoms > MAX_ATOMS {
                    return Err(Error::parse(
                        position,
                        format!("more than {MAX_ATOMS} terms in one expression"),
                    ));
                }
                Ok(Expr::Atom(Atom {
                    name: name.to_string(),
                    position,
                }))
            }
            Token::Open => {
                self.cursor += 1;
                self.descend(position)?;
                if self.peek().map(|(token, _)| token) == Some(Token::Close) {
                    return Err(Error::parse(position, "empty group"));
                }
                let inner = self.or()?;
                if !self.eat(Token::Close) {
                    return Err(Error::parse(
                        self.position(),
                        format!("unbalanced '(' opened at {position}"),
                    ));
                }
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(Error::parse(
                position,
                format!("expected a term, found {}", other.describe()),
            )),
        }
    }
}

/// Parses `input` into an expression tree.
pub fn parse(input: &str) -> Result<Expr<Atom>> {
    let mut parser = Parser {
        tokens: tokenize(input),
        cursor: 0,
        end: input.len(),
        depth: 0,
        atoms: 0,
    };
    if parser.tokens.is_empty() {
        return Err(Error::parse(0, "empty expression"));
    }
    let expr = parser.or()?;
    if let Some((token, position)) = parser.peek() {
        let reason = match token {
            Token::Close => "unbalanced ')'".to_string(),
            other => format!("expected an operator, found {}", other.describe()),
        };
        return Err(Error::parse(position, reason));
    }
    Ok(expr)
}
