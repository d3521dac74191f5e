//! Stage discovery strategies.
//!
//! Stages are located by a ranked list of strategies over the token stream.
//! [`BraceStages`] matches each `stage('NAME') { ... }` by brace depth. When
//! a block cannot be closed, or a stage body holds another stage head
//! outside a `stages`/`parallel`/`matrix` group (a missing `}` upstream),
//! [`HeadSplitStages`] finds every `stage('NAME')` head first and partitions
//! the tokens between consecutive heads.

use std::ops::Range;

use super::blocks::Script;
use super::lexer::TokenKind;

/// A stage located in the token stream, before its content is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawStage {
    pub(crate) name: String,
    pub(crate) body: Range<usize>,
}

/// Pluggable strategy for splitting a `stages { }` body into stages.
pub(crate) trait StageStrategy {
    fn name(&self) -> &'static str;
    /// Returns `None` when the strategy cannot account for the input.
    fn split(&self, script: &Script<'_>, range: Range<usize>) -> Option<Vec<RawStage>>;
}

/// Structural matching by brace depth.
pub(crate) struct BraceStages;

impl StageStrategy for BraceStages {
    fn name(&self) -> &'static str {
        "brace"
    }

    fn split(&self, script: &Script<'_>, range: Range<usize>) -> Option<Vec<RawStage>> {
        let mut stages = Vec::new();
        for block in script.top_level_blocks(range) {
            if !script.tokens[block.head].is_ident("stage") {
                continue;
            }
            if !block.closed || has_stray_stage_head(script, block.body.clone()) {
                return None;
            }
            let name = block
                .args
                .clone()
                .and_then(|args| script.first_string(args))
                .unwrap_or_default();
            stages.push(RawStage {
                name,
                body: block.body,
            });
        }
        Some(stages)
    }
}

/// Fallback: partition by stage-head positions.
pub(crate) struct HeadSplitStages;

impl StageStrategy for HeadSplitStages {
    fn name(&self) -> &'static str {
        "head-split"
    }

    fn split(&self, script: &Script<'_>, range: Range<usize>) -> Option<Vec<RawStage>> {
        let heads = stage_heads(script, range.clone());
        if heads.is_empty() {
            return None;
        }
        let stages = heads
            .iter()
            .enumerate()
            .map(|(i, head)| {
                let end = heads.get(i + 1).map_or(range.end, |next| next.start);
                let mut start = head.end;
                if matches!(script.kind(start), Some(TokenKind::LBrace)) {
                    start += 1;
                }
                RawStage {
                    name: head.name.clone(),
                    body: start..end.max(start),
                }
            })
            .collect();
        Some(stages)
    }
}

struct StageHead {
    name: String,
    /// Index of the `stage` token.
    start: usize,
    /// Index after the closing parenthesis.
    end: usize,
}

/// Every `stage('NAME')` occurrence in `range`, at any depth.
fn stage_heads(script: &Script<'_>, range: Range<usize>) -> Vec<StageHead> {
    let tokens = &script.tokens;
    range
        .clone()
        .filter(|&i| i + 4 <= range.end && tokens[i].is_ident("stage"))
        .filter_map(|i| {
            let name = tokens[i + 2].string()?;
            let wrapped = tokens[i + 1].kind == TokenKind::LParen
                && tokens[i + 3].kind == TokenKind::RParen;
            wrapped.then(|| StageHead {
                name: name.to_string(),
                start: i,
                end: i + 4,
            })
        })
        .collect()
}

/// Whether a `stage(...)` head sits directly in `range`. Heads nested in
/// any brace group, such as `parallel { }` or `stages { }`, do not count.
fn has_stray_stage_head(script: &Script<'_>, range: Range<usize>) -> bool {
    let mut index = range.start;
    while index < range.end {
        if script.tokens[index].is_ident("stage")
            && matches!(script.kind(index + 1), Some(TokenKind::LParen))
        {
            return true;
        }
        index = script.skip_group(index, range.end);
    }
    false
}

/// Strategies in priority order.
pub(crate) fn ranked_strategies() -> [&'static dyn StageStrategy; 2] {
    [&BraceStages, &HeadSplitStages]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stages: &[RawStage]) -> Vec<&str> {
        stages.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_brace_strategy_splits_balanced_input() {
        let script = Script::new("stage('A') { steps { sh 'a' } }\nstage(\"B\") { steps { sh 'b' } }");
        let stages = BraceStages.split(&script, script.all()).unwrap();
        assert_eq!(names(&stages), ["A", "B"]);
        assert_eq!(script.text(stages[1].body.clone()), "steps { sh 'b' }");
    }

    #[test]
    fn test_brace_strategy_gives_up_on_unclosed_stage() {
        let script = Script::new("stage('A') { steps { sh 'a' }\nstage('B') { steps { sh 'b' } }");
        assert!(BraceStages.split(&script, script.all()).is_none());
    }

    #[test]
    fn test_head_split_partitions_between_heads() {
        let script = Script::new("stage('A') { steps { sh 'a' }\nstage('B') { steps { sh 'b' } }");
        let stages = HeadSplitStages.split(&script, script.all()).unwrap();
        assert_eq!(names(&stages), ["A", "B"]);
        assert_eq!(script.text(stages[0].body.clone()), "steps { sh 'a' }");
    }

    #[test]
    fn test_head_split_keeps_duplicate_names_in_order() {
        let script = Script::new("stage('X') { sh 'one' }\nstage('X') { sh 'two' }");
        let stages = HeadSplitStages.split(&script, script.all()).unwrap();
        assert_eq!(names(&stages), ["X", "X"]);
        assert_ne!(stages[0].body, stages[1].body);
    }

    #[test]
    fn test_brace_strategy_gives_up_on_swallowed_stage() {
        let script = Script::new(
            "stage('One') { steps { sh 'a' }\nstage('Two') { steps { sh 'b' } }\n}",
        );
        assert!(BraceStages.split(&script, script.all()).is_none());

        let stages = HeadSplitStages.split(&script, script.all()).unwrap();
        assert_eq!(names(&stages), ["One", "Two"]);
    }

    #[test]
    fn test_brace_strategy_keeps_nested_parallel_stages() {
        let script = Script::new(
            "stage('Tests') { parallel { stage('Unit') { } stage('IT') { } } }\nstage('Ship') { }",
        );
        let stages = BraceStages.split(&script, script.all()).unwrap();
        assert_eq!(names(&stages), ["Tests", "Ship"]);
    }
}
