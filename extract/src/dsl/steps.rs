//! Recognition of individual step calls inside a steps body.

use std::ops::Range;

use codearts_migrate_core::{Step, StepKind};
use tracing::debug;

use super::args::{ArgValue, parse_args};
use super::blocks::Script;
use super::lexer::TokenKind;

/// Declarative sections that never hold executable steps.
const NON_STEP_SECTIONS: &[&str] = &[
    "agent",
    "environment",
    "when",
    "options",
    "tools",
    "input",
    "post",
    "parameters",
    "triggers",
];

/// Collects every recognized step call in `range`, descending into wrapper
/// blocks such as `dir(..) { }` or `withCredentials(..) { }`.
pub(crate) fn collect_steps(script: &Script<'_>, range: Range<usize>) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut index = range.start;
    while index < range.end {
        let Some(name) = script.tokens[index].ident() else {
            index = script.skip_group(index, range.end);
            continue;
        };
        index = match name {
            "sh" | "bat" => shell_call(script, index, range.end, &mut steps),
            "echo" => echo_call(script, index, range.end, &mut steps),
            "checkout" => checkout_call(script, index, range.end, &mut steps),
            "git" => git_call(script, index, range.end, &mut steps),
            "sshagent" => sshagent_call(script, index, range.end, &mut steps),
            "script" => script_call(script, index, range.end, &mut steps),
            _ => match script.block_at(index, range.end) {
                Some(block) if NON_STEP_SECTIONS.contains(&name) => block.end(),
                Some(block) => {
                    debug!(wrapper = name, "descending into wrapper block");
                    steps.extend(collect_steps(script, block.body.clone()));
                    block.end()
                }
                None => skip_call(script, index, range.end),
            },
        };
    }
    steps
}

/// Skips a call head and its parenthesized arguments, if any.
fn skip_call(script: &Script<'_>, index: usize, limit: usize) -> usize {
    if matches!(script.kind(index + 1), Some(TokenKind::LParen)) {
        script.skip_group(index + 1, limit)
    } else {
        index + 1
    }
}

/// Reads the single string argument of `name 'x'` or `name('x')`, or the
/// named `key:` argument of `name(key: 'x', ...)`. Returns the value and the
/// index after the call.
fn string_argument(
    script: &Script<'_>,
    index: usize,
    limit: usize,
    key: &str,
) -> Option<(String, usize)> {
    let next = index + 1;
    if next >= limit {
        return None;
    }
    match script.kind(next)? {
        TokenKind::Str(value) => Some((value.clone(), next + 1)),
        TokenKind::LParen => {
            let close = script.matching_close(next, limit)?;
            let args = parse_args(script, next + 1..close);
            let value = args
                .get(key)
                .or_else(|| args.positional.first())
                .map(ArgValue::to_plain)?;
            Some((value, close + 1))
        }
        _ => None,
    }
}

fn shell_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    match string_argument(script, index, limit, "script") {
        Some((command, next)) => {
            steps.push(Step::sh(command.trim()));
            next
        }
        None => skip_call(script, index, limit),
    }
}

fn echo_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    match string_argument(script, index, limit, "message") {
        Some((message, next)) => {
            steps.push(Step::echo(message));
            next
        }
        None => skip_call(script, index, limit),
    }
}

fn checkout_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    if script.token(index + 1).is_some_and(|t| t.is_ident("scm")) {
        steps.push(Step::new("Checkout", StepKind::Checkout, "checkout scm"));
        return index + 2;
    }
    if !matches!(script.kind(index + 1), Some(TokenKind::LParen)) {
        return index + 1;
    }
    let Some(close) = script.matching_close(index + 1, limit) else {
        return limit;
    };
    let args = index + 2..close;
    match script.string_after(args.clone(), "url") {
        Some(url) => {
            let branch = script
                .string_after(args, "name")
                .map(|name| normalize_branch(&name))
                .unwrap_or_else(|| codearts_migrate_core::DEFAULT_SCM_BRANCH.to_string());
            steps.push(Step::git_checkout(url, branch));
        }
        None => steps.push(Step::new("Checkout", StepKind::Checkout, "checkout")),
    }
    close + 1
}

fn git_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    let next = index + 1;
    match script.kind(next) {
        Some(TokenKind::Str(url)) => {
            steps.push(Step::git_checkout(
                url.clone(),
                codearts_migrate_core::DEFAULT_SCM_BRANCH,
            ));
            next + 1
        }
        Some(TokenKind::LParen) => {
            let Some(close) = script.matching_close(next, limit) else {
                return limit;
            };
            push_git_args(script, next + 1..close, steps);
            close + 1
        }
        // `git url: '..', branch: '..'` without parentheses runs to the end
        // of the line.
        Some(TokenKind::Ident(_)) => {
            let end = line_end(script, next, limit);
            push_git_args(script, next..end, steps);
            end
        }
        _ => next,
    }
}

fn push_git_args(script: &Script<'_>, range: Range<usize>, steps: &mut Vec<Step>) {
    let args = parse_args(script, range);
    let url = args
        .string("url")
        .or_else(|| args.positional.first().map(ArgValue::to_plain));
    if let Some(url) = url {
        let branch = args
            .string("branch")
            .unwrap_or_else(|| codearts_migrate_core::DEFAULT_SCM_BRANCH.to_string());
        let mut step = Step::git_checkout(url, branch);
        step.credentials = args.string("credentialsId");
        steps.push(step);
    }
}

/// Index of the first token in `start..limit` that begins a new source line.
fn line_end(script: &Script<'_>, start: usize, limit: usize) -> usize {
    let Some(first) = script.token(start) else {
        return limit;
    };
    let line_start = script.source[..first.span.start].matches('\n').count();
    (start..limit)
        .find(|&index| {
            let offset = script.tokens[index].span.start;
            script.source[..offset].matches('\n').count() > line_start
        })
        .unwrap_or(limit)
}

fn sshagent_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    let Some(block) = script.block_at(index, limit) else {
        return skip_call(script, index, limit);
    };
    let credentials = block
        .args
        .clone()
        .and_then(|args| script.first_string(args))
        .unwrap_or_default();
    let inner = collect_steps(script, block.body.clone());
    let command = if inner.is_empty() {
        script.text(block.body.clone()).trim().to_string()
    } else {
        inner
            .iter()
            .map(|step| step.command.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };
    steps.push(Step::new("SSH Agent", StepKind::Ssh, command).with_credentials(credentials));
    block.end()
}

fn script_call(script: &Script<'_>, index: usize, limit: usize, steps: &mut Vec<Step>) -> usize {
    match script.block_at(index, limit) {
        Some(block) => {
            let content = script.text(block.body.clone()).trim().to_string();
            steps.push(Step::new("Script", StepKind::Script, content));
            block.end()
        }
        None => skip_call(script, index, limit),
    }
}

/// Strips `*/` and `origin/` prefixes from a branch spec.
pub(crate) fn normalize_branch(spec: &str) -> String {
    let spec = spec.trim();
    let spec = spec.strip_prefix("*/").unwrap_or(spec);
    let spec = spec.strip_prefix("origin/").unwrap_or(spec);
    spec.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_of(source: &str) -> Vec<Step> {
        let script = Script::new(source);
        collect_steps(&script, script.all())
    }

    #[test]
    fn test_sh_quote_forms() {
        let steps = steps_of(
            "sh 'make a'\nsh \"make b\"\nsh '''\n  make c\n'''\nsh \"\"\"make d\"\"\"\nsh(script: 'make e', returnStdout: true)",
        );
        let commands: Vec<_> = steps.iter().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, ["make a", "make b", "make c", "make d", "make e"]);
        assert!(steps.iter().all(|s| s.kind == StepKind::Sh));
    }

    #[test]
    fn test_echo_and_checkout_scm() {
        let steps = steps_of("echo 'hello'\ncheckout scm");
        assert_eq!(steps[0], Step::echo("hello"));
        assert_eq!(steps[1].kind, StepKind::Checkout);
        assert_eq!(steps[1].command, "checkout scm");
    }

    #[test]
    fn test_git_named_args_without_parens() {
        let steps = steps_of(
            "git branch: 'develop', url: 'https://example.com/app.git', credentialsId: 'gh'\nsh 'make'",
        );
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].url.as_deref(), Some("https://example.com/app.git"));
        assert_eq!(steps[0].branch.as_deref(), Some("develop"));
        assert_eq!(steps[0].credentials.as_deref(), Some("gh"));
        assert_eq!(steps[1].command, "make");
    }

    #[test]
    fn test_checkout_git_scm_class() {
        let steps = steps_of(
            "checkout([$class: 'GitSCM', branches: [[name: '*/release']], userRemoteConfigs: [[url: 'git@example.com:a/b.git']]])",
        );
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].branch.as_deref(), Some("release"));
        assert_eq!(steps[0].url.as_deref(), Some("git@example.com:a/b.git"));
    }

    #[test]
    fn test_sshagent_collects_inner_commands() {
        let steps = steps_of("sshagent(['deploy-key']) {\n  sh 'scp a host:'\n  sh 'ssh host restart'\n}");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, StepKind::Ssh);
        assert_eq!(steps[0].credentials.as_deref(), Some("deploy-key"));
        assert_eq!(steps[0].command, "scp a host:\nssh host restart");
    }

    #[test]
    fn test_script_block_keeps_content() {
        let steps = steps_of("script {\n  def v = readFile('v')\n  if (v) { echo v }\n}");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, StepKind::Script);
        assert!(steps[0].command.starts_with("def v = readFile('v')"));
        assert!(steps[0].command.ends_with("if (v) { echo v }"));
    }

    #[test]
    fn test_wrappers_are_transparent_and_sections_skipped() {
        let steps = steps_of(
            "dir('app') { withCredentials([string(credentialsId: 't', variable: 'T')]) { sh 'npm ci' } }\npost { always { sh 'cleanup' } }",
        );
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].command, "npm ci");
    }

    #[test]
    fn test_unknown_calls_are_skipped() {
        let steps = steps_of("archiveArtifacts(artifacts: 'target/*.jar')\njunit 'reports/*.xml'\nsh 'x'");
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_normalize_branch() {
        assert_eq!(normalize_branch("*/main"), "main");
        assert_eq!(normalize_branch("origin/dev"), "dev");
        assert_eq!(normalize_branch(" feature/x "), "feature/x");
    }
}
