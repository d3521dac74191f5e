//! Named-argument lists such as `(name: 'X', defaultValue: true)`.

use std::ops::Range;

use indexmap::IndexMap;

use super::blocks::Script;
use super::lexer::TokenKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ArgValue {
    Str(String),
    Bool(bool),
    List(Vec<String>),
    /// Anything else, kept as source text.
    Raw(String),
}

impl ArgValue {
    /// Renders the value as a plain string. Lists join with newlines.
    pub(crate) fn to_plain(&self) -> String {
        match self {
            Self::Str(value) | Self::Raw(value) => value.clone(),
            Self::Bool(value) => value.to_string(),
            Self::List(values) => values.join("\n"),
        }
    }

    /// Values of a list, or the lines of a newline-separated string.
    pub(crate) fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(values) => values.clone(),
            other => other
                .to_plain()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Parsed argument list: named entries plus positional string values.
#[derive(Debug, Clone, Default)]
pub(crate) struct Args {
    pub(crate) named: IndexMap<String, ArgValue>,
    pub(crate) positional: Vec<ArgValue>,
}

impl Args {
    pub(crate) fn get(&self, key: &str) -> Option<&ArgValue> {
        self.named.get(key)
    }

    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(ArgValue::to_plain)
    }
}

/// Parses the tokens between a call's parentheses.
pub(crate) fn parse_args(script: &Script<'_>, range: Range<usize>) -> Args {
    let mut args = Args::default();
    for part in split_top_level(script, range) {
        if part.is_empty() {
            continue;
        }
        let is_named = part.len() >= 2
            && matches!(script.kind(part.start + 1), Some(TokenKind::Colon))
            && matches!(
                script.kind(part.start),
                Some(TokenKind::Ident(_) | TokenKind::Str(_))
            );
        if is_named {
            let key = match script.kind(part.start) {
                Some(TokenKind::Ident(key) | TokenKind::Str(key)) => key.clone(),
                _ => continue,
            };
            args.named
                .insert(key, parse_value(script, part.start + 2..part.end));
        } else {
            args.positional.push(parse_value(script, part));
        }
    }
    args
}

fn parse_value(script: &Script<'_>, range: Range<usize>) -> ArgValue {
    if range.len() == 1 {
        match script.kind(range.start) {
            Some(TokenKind::Str(value)) => return ArgValue::Str(value.clone()),
            Some(TokenKind::Ident(ident)) if ident == "true" => return ArgValue::Bool(true),
            Some(TokenKind::Ident(ident)) if ident == "false" => return ArgValue::Bool(false),
            _ => {}
        }
    }
    if matches!(script.kind(range.start), Some(TokenKind::LBracket))
        && script.matching_close(range.start, range.end) == Some(range.end - 1)
    {
        let items = (range.start + 1..range.end - 1)
            .filter_map(|index| script.tokens[index].string())
            .map(str::to_string)
            .collect();
        return ArgValue::List(items);
    }
    ArgValue::Raw(script.text(range).trim().to_string())
}

/// Splits a range on commas that are not nested in brackets.
fn split_top_level(script: &Script<'_>, range: Range<usize>) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut start = range.start;
    let mut index = range.start;
    while index < range.end {
        if matches!(script.kind(index), Some(TokenKind::Comma)) {
            parts.push(start..index);
            index += 1;
            start = index;
            continue;
        }
        index = script.skip_group(index, range.end);
    }
    parts.push(start..range.end.max(start));
    parts
}
