//! Character stream to token stream.
//!
//! The lexer reads through a [`HistoryBuffer`] so it can scan ahead for the
//! longest operator or a signed literal and then give back what it did not
//! use.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::common::{CharSource, HistoryBuffer, Source};

pub mod tables;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier,
    Qualifier,
    SystemType,
    Number,
    Operator,
    Parenthesis,
    Bracket,
    Brace,
    Semicolon,
    Colon,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub kind: TokenKind,
    pub line: u32,
}
impl Token {
    pub fn new(value: impl Into<String>, kind: TokenKind, line: u32) -> Self {
        Self {
            value: value.into(),
            kind,
            line,
        }
    }
    pub fn is(&self, value: &str) -> bool {
        self.value == value
    }
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

// Enough to skip the blanks between a unary minus and its literal and still
// rewind to the minus sign.
const CHAR_HISTORY: usize = 64;
const MAX_NEGATION_GAP: usize = 32;

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || c == 'f'
}
fn is_fraction_char(c: char) -> bool {
    c.is_ascii_digit() || c == 'f'
}

pub struct Lexer<S: Source<Item = char>> {
    chars: HistoryBuffer<S>,
    line: u32,
    last: Option<Token>,
    done: bool,
}
impl Lexer<CharSource> {
    pub fn from_text(text: &str) -> Self {
        Self::new(CharSource::from_text(text))
    }
}
impl<S: Source<Item = char>> Lexer<S> {
    pub fn new(source: S) -> Self {
        Self {
            chars: HistoryBuffer::with_capacity(source, CHAR_HISTORY),
            line: 1,
            last: None,
            done: false,
        }
    }

    /// Lexes the whole stream, `Eof` included.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(token) = self.pull()? {
            out.push(token);
        }
        Ok(out)
    }

    fn emit(&mut self, value: String, kind: TokenKind) -> Result<Option<Token>> {
        let token = Token::new(value, kind, self.line);
        self.last = Some(token.clone());
        Ok(Some(token))
    }

    // A minus directly after an operand is a binary operator.
    fn follows_operand(&self) -> bool {
        match &self.last {
            Some(t) => {
                matches!(
                    t.kind,
                    TokenKind::Number | TokenKind::Identifier | TokenKind::SystemType
                ) || t.is("right_parentheses")
                    || t.is("right_bracket")
            }
            None => false,
        }
    }

    fn take_while(&mut self, first: char, pred: fn(char) -> bool) -> Result<String> {
        let mut out = String::from(first);
        while let Some(c) = self.chars.try_next()? {
            if pred(c) {
                out.push(c);
            } else {
                self.chars.rewind(1)?;
                break;
            }
        }
        Ok(out)
    }

    // Called after a `.`; produces `0.<digits>` when a digit follows.
    fn take_fraction(&mut self) -> Result<Option<String>> {
        match self.chars.try_next()? {
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(c, is_fraction_char)?;
                Ok(Some(format!("0.{}", digits)))
            }
            Some(_) => {
                self.chars.rewind(1)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    // Called after a `-`; on failure the stream is left right after the `-`.
    fn take_negative(&mut self) -> Result<Option<String>> {
        let checkpoint = self.chars.checkpoint();
        let mut gap = 0;
        let literal = loop {
            let Some(c) = self.chars.try_next()? else {
                break None;
            };
            match c {
                ' ' | '\t' if gap < MAX_NEGATION_GAP => gap += 1,
                c if c.is_ascii_digit() => break Some(self.take_while(c, is_number_char)?),
                '.' => break self.take_fraction()?,
                _ => break None,
            }
        };
        match literal {
            Some(literal) => Ok(Some(format!("-{}", literal))),
            None => {
                self.chars.rollback(checkpoint).map_err(|e| e.into_anyhow())?;
                Ok(None)
            }
        }
    }

    fn take_operator(&mut self, first: char) -> Result<Option<&'static str>> {
        let mut text = String::from(first);
        let mut received = 0;
        while received + 1 < tables::MAX_OPERATOR_LEN {
            match self.chars.try_next()? {
                Some(c) => {
                    text.push(c);
                    received += 1;
                }
                None => break,
            }
        }
        for (spelling, name) in tables::OPERATORS {
            if text.starts_with(spelling) {
                self.chars.rewind(received + 1 - spelling.len())?;
                return Ok(Some(*name));
            }
        }
        self.chars.rewind(received)?;
        Ok(None)
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let Some(c) = self.chars.try_next()? else {
                self.done = true;
                return self.emit("eof".to_owned(), TokenKind::Eof);
            };
            if c == '\n' {
                self.line += 1;
                continue;
            }

            if is_ident_start(c) {
                let word = self.take_while(c, is_ident_char)?;
                let kind = if tables::is_qualifier(&word) {
                    TokenKind::Qualifier
                } else if tables::is_system_type(&word) {
                    TokenKind::SystemType
                } else {
                    TokenKind::Identifier
                };
                return self.emit(word, kind);
            }

            if c == '-' && !self.follows_operand() {
                if let Some(literal) = self.take_negative()? {
                    return self.emit(literal, TokenKind::Number);
                }
            }
            if c.is_ascii_digit() {
                let literal = self.take_while(c, is_number_char)?;
                return self.emit(literal, TokenKind::Number);
            }
            if c == '.' {
                if let Some(literal) = self.take_fraction()? {
                    return self.emit(literal, TokenKind::Number);
                }
            }

            if let Some(name) = self.take_operator(c)? {
                return self.emit(name.to_owned(), TokenKind::Operator);
            }
            if let Some((value, kind)) = tables::punctuation(c) {
                return self.emit(value.to_owned(), kind);
            }
            if !c.is_whitespace() {
                trace!(line = self.line, character = ?c, "discarding unrecognized character");
            }
        }
    }
}
impl<S: Source<Item = char>> Source for Lexer<S> {
    type Item = Token;
    fn pull(&mut self) -> Result<Option<Token>> {
        self.next_token()
    }
}
