//! Bracket-counting block matcher over the token stream.
//!
//! A block is `name [ ( args ) ] { body }`. Matching works on token indices;
//! ranges are half-open and index into [`Script::tokens`].

use std::ops::Range;

use super::lexer::{Token, TokenKind, tokenize};

/// A matched `name (args) { body }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
    /// Index of the name token.
    pub(crate) head: usize,
    /// Tokens between the parentheses, when present.
    pub(crate) args: Option<Range<usize>>,
    /// Tokens between the braces.
    pub(crate) body: Range<usize>,
    /// `false` when the closing brace was never found and `body` runs to the
    /// end of the searched range.
    pub(crate) closed: bool,
}

impl Block {
    /// Index one past the block's last token.
    pub(crate) fn end(&self) -> usize {
        if self.closed {
            self.body.end + 1
        } else {
            self.body.end
        }
    }
}

/// Tokenized Jenkinsfile with its source text.
#[derive(Debug)]
pub(crate) struct Script<'a> {
    pub(crate) source: &'a str,
    pub(crate) tokens: Vec<Token>,
}

impl<'a> Script<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: tokenize(source),
        }
    }

    pub(crate) fn all(&self) -> Range<usize> {
        0..self.tokens.len()
    }

    pub(crate) fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub(crate) fn kind(&self, index: usize) -> Option<&TokenKind> {
        self.tokens.get(index).map(|t| &t.kind)
    }

    /// Source text covered by a token range.
    pub(crate) fn text(&self, range: Range<usize>) -> &'a str {
        if range.is_empty() {
            return "";
        }
        let (Some(first), Some(last)) = (self.tokens.get(range.start), self.tokens.get(range.end - 1))
        else {
            return "";
        };
        &self.source[first.span.start..last.span.end]
    }

    /// Finds the close bracket matching the open bracket at `open`, searching
    /// no further than `limit`.
    pub(crate) fn matching_close(&self, open: usize, limit: usize) -> Option<usize> {
        let (open_kind, close_kind) = match self.kind(open)? {
            TokenKind::LBrace => (TokenKind::LBrace, TokenKind::RBrace),
            TokenKind::LParen => (TokenKind::LParen, TokenKind::RParen),
            TokenKind::LBracket => (TokenKind::LBracket, TokenKind::RBracket),
            _ => return None,
        };
        let mut depth = 0usize;
        for index in open..limit.min(self.tokens.len()) {
            let kind = &self.tokens[index].kind;
            if *kind == open_kind {
                depth += 1;
            } else if *kind == close_kind {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Tries to read a block whose name token sits at `head`.
    pub(crate) fn block_at(&self, head: usize, limit: usize) -> Option<Block> {
        self.token(head)?.ident()?;
        let mut cursor = head + 1;
        let mut args = None;
        if matches!(self.kind(cursor), Some(TokenKind::LParen)) {
            let close = self.matching_close(cursor, limit)?;
            args = Some(cursor + 1..close);
            cursor = close + 1;
        }
        if cursor >= limit || !matches!(self.kind(cursor), Some(TokenKind::LBrace)) {
            return None;
        }
        Some(match self.matching_close(cursor, limit) {
            Some(close) => Block {
                head,
                args,
                body: cursor + 1..close,
                closed: true,
            },
            None => Block {
                head,
                args,
                body: cursor + 1..limit,
                closed: false,
            },
        })
    }

    /// Blocks sitting directly in `range`, in source order. Brace groups
    /// without a name are skipped over whole.
    pub(crate) fn top_level_blocks(&self, range: Range<usize>) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut index = range.start;
        while index < range.end {
            if let Some(block) = self.block_at(index, range.end) {
                index = block.end();
                blocks.push(block);
                continue;
            }
            index = self.skip_group(index, range.end);
        }
        blocks
    }

    /// First top-level block named `name` in `range`.
    pub(crate) fn find_block(&self, range: Range<usize>, name: &str) -> Option<Block> {
        self.top_level_blocks(range)
            .into_iter()
            .find(|block| self.tokens[block.head].is_ident(name))
    }

    /// First block named `name` at any depth in `range`, followed directly by
    /// a brace.
    pub(crate) fn find_block_anywhere(&self, range: Range<usize>, name: &str) -> Option<Block> {
        range
            .clone()
            .filter(|&index| self.tokens[index].is_ident(name))
            .find_map(|index| self.block_at(index, range.end))
    }

    /// Returns the index after the token at `index`, skipping a whole
    /// bracketed group when one opens there.
    pub(crate) fn skip_group(&self, index: usize, limit: usize) -> usize {
        match self.kind(index) {
            Some(TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket) => self
                .matching_close(index, limit)
                .map_or(limit, |close| close + 1),
            _ => index + 1,
        }
    }

    /// The string value following `key` (as `key 'v'`, `key: 'v'` or
    /// `key = 'v'`) anywhere in `range`.
    pub(crate) fn string_after(&self, range: Range<usize>, key: &str) -> Option<String> {
        for index in range.clone() {
            if !self.tokens[index].is_ident(key) {
                continue;
            }
            let mut next = index + 1;
            if matches!(
                self.kind(next),
                Some(TokenKind::Colon | TokenKind::Assign | TokenKind::LParen)
            ) {
                next += 1;
            }
            if next >= range.end {
                continue;
            }
            if let Some(value) = self.tokens[next].string() {
                return Some(value.to_string());
            }
        }
        None
    }

    /// First string literal in `range`.
    pub(crate) fn first_string(&self, range: Range<usize>) -> Option<String> {
        range
            .filter_map(|index| self.tokens[index].string())
            .next()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_at_with_args() {
        let script = Script::new("stage('A') { steps { sh 'x' } }");
        let block = script.block_at(0, script.tokens.len()).unwrap();
        assert!(block.closed);
        assert_eq!(script.text(block.args.clone().unwrap()), "'A'");
        assert_eq!(script.text(block.body.clone()), "steps { sh 'x' }");
    }

    #[test]
    fn test_unclosed_block_runs_to_limit() {
        let script = Script::new("stages { stage('A') { sh 'x' ");
        let block = script.block_at(0, script.tokens.len()).unwrap();
        assert!(!block.closed);
        assert_eq!(block.end(), script.tokens.len());
    }

    #[test]
    fn test_top_level_blocks_skip_nested() {
        let script = Script::new("agent any\nenvironment { A = 'b' }\nstages { stage('x') { } }");
        let names: Vec<_> = script
            .top_level_blocks(script.all())
            .iter()
            .filter_map(|b| script.tokens[b.head].ident().map(str::to_string))
            .collect();
        assert_eq!(names, ["environment", "stages"]);
    }

    #[test]
    fn test_find_block_anywhere() {
        let script = Script::new("node { pipeline { agent any } }");
        let block = script.find_block_anywhere(script.all(), "pipeline").unwrap();
        assert_eq!(script.text(block.body), "agent any");
    }

    #[test]
    fn test_string_after_forms() {
        let script = Script::new("docker { image 'maven:3' label: 'x' }");
        assert_eq!(script.string_after(script.all(), "image").as_deref(), Some("maven:3"));
        assert_eq!(script.string_after(script.all(), "label").as_deref(), Some("x"));
        assert_eq!(script.string_after(script.all(), "yaml"), None);
    }

    #[test]
    fn test_braces_inside_strings_do_not_count() {
        let script = Script::new("steps { sh 'echo }' }");
        let block = script.block_at(0, script.tokens.len()).unwrap();
        assert!(block.closed);
        assert_eq!(block.body, 2..4);
    }
}
