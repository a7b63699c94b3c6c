//! Closed boolean language of `#if` lines.
use std::collections::BTreeSet;

use anyhow::{anyhow, bail, Result};

use crate::compiler::lex::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondExpr {
    Defined(String),
    Const(bool),
    Not(Box<CondExpr>),
    And(Box<CondExpr>, Box<CondExpr>),
    Or(Box<CondExpr>, Box<CondExpr>),
}
impl CondExpr {
    pub fn parse(text: &str) -> Result<CondExpr> {
        let tokens = Lexer::from_text(text)
            .tokenize()?
            .into_iter()
            .filter(|t| !t.is_eof())
            .collect::<Vec<_>>();
        if tokens.is_empty() {
            bail!("empty condition");
        }
        let mut parser = CondParser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(t) = parser.peek() {
            bail!("unexpected `{}` after condition", t.value);
        }
        Ok(expr)
    }

    pub fn eval(&self, defines: &BTreeSet<String>) -> bool {
        match self {
            CondExpr::Defined(name) => defines.contains(name),
            CondExpr::Const(x) => *x,
            CondExpr::Not(e) => !e.eval(defines),
            CondExpr::And(a, b) => a.eval(defines) && b.eval(defines),
            CondExpr::Or(a, b) => a.eval(defines) || b.eval(defines),
        }
    }
}

struct CondParser {
    tokens: Vec<Token>,
    pos: usize,
}
impl CondParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
    fn bump(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("condition ends unexpectedly"))?;
        self.pos += 1;
        Ok(token)
    }
    fn eat(&mut self, value: &str) -> bool {
        if self.peek().map_or(false, |t| t.is(value)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
    fn expect(&mut self, value: &str) -> Result<()> {
        let token = self.bump()?;
        if !token.is(value) {
            bail!("expected `{}`, found `{}`", value, token.value);
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<CondExpr> {
        let mut lhs = self.parse_and()?;
        while self.eat("logical_or") {
            let rhs = self.parse_and()?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }
    fn parse_and(&mut self) -> Result<CondExpr> {
        let mut lhs = self.parse_unary()?;
        while self.eat("logical_and") {
            let rhs = self.parse_unary()?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }
    fn parse_unary(&mut self) -> Result<CondExpr> {
        if self.eat("logical_not") {
            return Ok(CondExpr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }
    fn parse_primary(&mut self) -> Result<CondExpr> {
        let token = self.bump()?;
        match token.kind {
            TokenKind::Parenthesis if token.is("left_parentheses") => {
                let inner = self.parse_or()?;
                self.expect("right_parentheses")?;
                Ok(inner)
            }
            TokenKind::Identifier if token.is("defined") => {
                let parenthesized = self.eat("left_parentheses");
                let name = self.bump()?;
                if !matches!(name.kind, TokenKind::Identifier | TokenKind::SystemType) {
                    bail!("`defined` expects a name, found `{}`", name.value);
                }
                if parenthesized {
                    self.expect("right_parentheses")?;
                }
                Ok(CondExpr::Defined(name.value))
            }
            TokenKind::Number => {
                let literal = token.value.trim_end_matches('f');
                let x = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow!("invalid number `{}`", token.value))?;
                Ok(CondExpr::Const(x != 0.0))
            }
            TokenKind::Identifier | TokenKind::SystemType | TokenKind::Qualifier => {
                Ok(CondExpr::Const(true))
            }
            _ => bail!("unexpected `{}` in condition", token.value),
        }
    }
}
