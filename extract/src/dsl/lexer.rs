//! Tokenizer for Jenkinsfile text.
//!
//! Produces a flat token stream with byte spans. String literals in all four
//! quote forms (`'..'`, `".."`, `'''..'''`, `""".."""`) become a single
//! [`TokenKind::Str`] whose value may span lines; comments are dropped.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Number(String),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Assign,
    /// Multi-character operator such as `==` or `&&`.
    Op(String),
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Range<usize>,
}

impl Token {
    pub(crate) fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(ident) if ident == name)
    }

    pub(crate) fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(ident) => Some(ident),
            _ => None,
        }
    }

    pub(crate) fn string(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Str(value) => Some(value),
            _ => None,
        }
    }
}

const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "&&", "||", "=~", "->", "?:", "?."];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            span: start..self.pos,
        });
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            if c.is_whitespace() {
                self.bump();
            } else if self.rest().starts_with("//") {
                self.skip_line_comment();
            } else if self.rest().starts_with("/*") {
                self.skip_block_comment();
            } else if c == '\'' || c == '"' {
                let value = self.string_literal(c);
                self.push(TokenKind::Str(value), start);
            } else if c.is_alphabetic() || c == '_' || c == '$' || c == '@' {
                self.bump();
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
                {
                    self.bump();
                }
                let ident = self.src[start..self.pos].to_string();
                self.push(TokenKind::Ident(ident), start);
            } else if c.is_ascii_digit() {
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.')
                {
                    self.bump();
                }
                let number = self.src[start..self.pos].to_string();
                self.push(TokenKind::Number(number), start);
            } else if let Some(op) = OPERATORS.iter().find(|op| self.rest().starts_with(**op)) {
                self.pos += op.len();
                self.push(TokenKind::Op((*op).to_string()), start);
            } else {
                self.bump();
                let kind = match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ',' => TokenKind::Comma,
                    ':' => TokenKind::Colon,
                    '=' => TokenKind::Assign,
                    other => TokenKind::Punct(other),
                };
                self.push(kind, start);
            }
        }
        self.tokens
    }

    fn skip_line_comment(&mut self) {
        match self.rest().find('\n') {
            Some(offset) => self.pos += offset + 1,
            None => self.pos = self.src.len(),
        }
    }

    fn skip_block_comment(&mut self) {
        match self.rest()[2..].find("*/") {
            Some(offset) => self.pos += offset + 4,
            None => self.pos = self.src.len(),
        }
    }

    /// Reads a string literal starting at the opening quote. An unterminated
    /// literal runs to the end of input.
    fn string_literal(&mut self, quote: char) -> String {
        let triple: String = std::iter::repeat_n(quote, 3).collect();
        let closing = if self.rest().starts_with(&triple) {
            self.pos += 3;
            triple
        } else {
            self.bump();
            quote.to_string()
        };

        let mut value = String::new();
        loop {
            if self.rest().starts_with(&closing) {
                self.pos += closing.len();
                break;
            }
            let Some(c) = self.bump() else { break };
            if c == '\\' {
                match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(escaped @ ('\'' | '"' | '\\' | '$')) => value.push(escaped),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => value.push('\\'),
                }
            } else {
                value.push(c);
            }
        }
        value
    }
}

/// Tokenizes Jenkinsfile source text.
pub(crate) fn tokenize(source: &str) -> Vec<Token> {
    Lexer {
        src: source,
        pos: 0,
        tokens: Vec::new(),
    }
    .run()
}
