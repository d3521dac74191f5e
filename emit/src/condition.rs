//! Conversion of Jenkins `when` conditions into CodeArts `if` expressions.
//!
//! Supported forms:
//!
//! - `branch 'x'` becomes `env.gitBranch == 'x'`
//! - `environment name: 'X', value: 'y'` becomes `env.x == 'y'`
//! - `expression { ... }` keeps the expression with `params.X` and `env.X`
//!   references rewritten to `env.<camelCase>`
//! - `not { ... }`, `allOf { ... }` and `anyOf { ... }` combine the above
//!
//! Anything else converts to `true` and logs a warning.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::naming::camel_case;

static PATTERNS: LazyLock<ConditionPatterns> = LazyLock::new(ConditionPatterns::new);

struct ConditionPatterns {
    reference: Regex,
    quoted: Regex,
    named_value: Regex,
}

impl ConditionPatterns {
    fn new() -> Self {
        Self {
            reference: Regex::new(r"\b(?:params|env)\.([A-Za-z_][A-Za-z0-9_]*)")
                .expect("static regex must compile"),
            quoted: Regex::new(r#"^['"]([^'"]*)['"]\s*$"#).expect("static regex must compile"),
            named_value: Regex::new(
                r#"name\s*:\s*['"]([^'"]*)['"]\s*,\s*value\s*:\s*['"]([^'"]*)['"]"#,
            )
            .expect("static regex must compile"),
        }
    }
}

/// Condition keywords that start a clause inside `allOf`/`anyOf`.
const CLAUSE_KEYWORDS: &[&str] = &[
    "branch",
    "environment",
    "expression",
    "not",
    "allOf",
    "anyOf",
    "tag",
    "buildingTag",
    "changeRequest",
    "changelog",
    "changeset",
    "equals",
    "triggeredBy",
];

/// Converts a `when` condition to an `if` expression.
///
/// ```
/// use codearts_migrate_emit::convert_condition;
///
/// assert_eq!(convert_condition("branch 'main'"), "env.gitBranch == 'main'");
/// assert_eq!(
///     convert_condition("expression { return !params.SKIP_SONAR }"),
///     "!env.skipSonar"
/// );
/// assert_eq!(convert_condition("changeRequest()"), "true");
/// ```
pub fn convert_condition(when: &str) -> String {
    match condition(when.trim()) {
        Some(expression) => expression,
        None => {
            warn!(condition = when, "unsupported when condition; using `true`");
            "true".to_string()
        }
    }
}

fn condition(text: &str) -> Option<String> {
    let keyword_end = text
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(text.len());
    let (keyword, rest) = text.split_at(keyword_end);
    let rest = rest.trim();
    let patterns = &*PATTERNS;

    match keyword {
        "branch" => {
            let captures = patterns.quoted.captures(rest)?;
            Some(format!("env.gitBranch == '{}'", &captures[1]))
        }
        "environment" => {
            let captures = patterns.named_value.captures(rest)?;
            Some(format!("env.{} == '{}'", camel_case(&captures[1]), &captures[2]))
        }
        "expression" => {
            let body = braced(rest)?.trim();
            let body = body.strip_prefix("return ").unwrap_or(body).trim();
            if body.is_empty() {
                return None;
            }
            Some(rewrite_references(body))
        }
        "not" => {
            let inner = condition(braced(rest)?.trim())?;
            Some(format!("!({inner})"))
        }
        "allOf" | "anyOf" => {
            let operator = if keyword == "allOf" { " && " } else { " || " };
            let clauses = split_clauses(braced(rest)?);
            if clauses.is_empty() {
                return None;
            }
            let converted = clauses
                .into_iter()
                .map(condition)
                .collect::<Option<Vec<_>>>()?;
            if converted.len() == 1 {
                return converted.into_iter().next();
            }
            Some(
                converted
                    .iter()
                    .map(|clause| format!("({clause})"))
                    .collect::<Vec<_>>()
                    .join(operator),
            )
        }
        _ => None,
    }
}

fn rewrite_references(expression: &str) -> String {
    PATTERNS
        .reference
        .replace_all(expression, |captures: &regex::Captures<'_>| {
            format!("env.{}", camel_case(&captures[1]))
        })
        .into_owned()
}

/// Body of a `{ ... }` group starting at the beginning of `text`.
fn braced(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('{')?;
    let mut depth = 1usize;
    let mut quote = None;
    for (index, c) in inner.char_indices() {
        match (quote, c) {
            (Some(open), _) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(&inner[..index]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a group body into clauses at top-level condition keywords.
fn split_clauses(body: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut previous = ' ';
    for (index, c) in body.char_indices() {
        match (quote, c) {
            (Some(open), _) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => depth = depth.saturating_sub(1),
            (None, _) if depth == 0 && !is_word_char(previous) => {
                let rest = &body[index..];
                let starts_clause = CLAUSE_KEYWORDS.iter().any(|keyword| {
                    rest.starts_with(keyword)
                        && !rest[keyword.len()..].starts_with(is_word_char)
                });
                if starts_clause {
                    starts.push(index);
                }
            }
            _ => {}
        }
        previous = c;
    }

    let mut clauses = Vec::new();
    for (position, start) in starts.iter().enumerate() {
        let end = starts.get(position + 1).copied().unwrap_or(body.len());
        let clause = body[*start..end].trim().trim_end_matches(';').trim();
        if !clause.is_empty() {
            clauses.push(clause);
        }
    }
    clauses
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_clause() {
        assert_eq!(
            convert_condition("environment name: 'DEPLOY_TO', value: 'prod'"),
            "env.deployTo == 'prod'"
        );
    }

    #[test]
    fn test_all_of_joins_with_and() {
        let when = "allOf { branch 'main' environment name: 'DEPLOY', value: 'true' }";
        assert_eq!(
            convert_condition(when),
            "(env.gitBranch == 'main') && (env.deploy == 'true')"
        );
    }

    #[test]
    fn test_any_of_joins_with_or() {
        let when = "anyOf { branch 'main'; branch 'release' }";
        assert_eq!(
            convert_condition(when),
            "(env.gitBranch == 'main') || (env.gitBranch == 'release')"
        );
    }

    #[test]
    fn test_nested_not_and_expression() {
        let when = "allOf { not { branch 'dev' } expression { params.RUN_IT == 'yes' && env.CI } }";
        assert_eq!(
            convert_condition(when),
            "(!(env.gitBranch == 'dev')) && (env.runIt == 'yes' && env.ci)"
        );
    }

    #[test]
    fn test_keyword_inside_quotes_is_not_a_clause() {
        let when = "anyOf { branch 'not-main' branch 'x' }";
        assert_eq!(
            convert_condition(when),
            "(env.gitBranch == 'not-main') || (env.gitBranch == 'x')"
        );
    }

    #[test]
    fn test_unknown_clause_makes_whole_group_true() {
        assert_eq!(convert_condition("allOf { branch 'main' tag 'v*' }"), "true");
        assert_eq!(convert_condition("anyOf { }"), "true");
        assert_eq!(convert_condition("branch"), "true");
    }
}
