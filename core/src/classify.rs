//! Step classification by ordered keyword search.
//!
//! A step's category is inferred from free text (a command, a log excerpt or
//! a display name) with a case-insensitive substring search over
//! [`CLASSIFICATION_ORDER`]. The first rule with a matching keyword wins, and
//! text matching nothing is classified as [`StepKind::Sh`].
//!
//! The order is the tie-break: build tools come first, then analysis and
//! deployment, then checkout, and only then the generic shell and echo
//! markers. A log line such as `sh 'git clone ...'` therefore classifies as
//! [`StepKind::Checkout`], and `sh 'mvn package'` as [`StepKind::Maven`].
//!
//! # Example
//!
//! ```
//! use codearts_migrate_core::{classify, StepKind};
//!
//! assert_eq!(classify("./gradlew build"), StepKind::Gradle);
//! assert_eq!(classify("sh 'echo hi'"), StepKind::Sh);
//! assert_eq!(classify("echo done"), StepKind::Echo);
//! assert_eq!(classify("make all"), StepKind::Sh);
//! ```

use crate::model::StepKind;

/// One entry of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub category: StepKind,
    /// Lowercase substrings that select this category. A keyword ending in
    /// a space or `(` names a command and must start a word.
    pub keywords: &'static [&'static str],
}

impl CategoryRule {
    fn matches(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| contains_keyword(lowered, keyword))
    }
}

fn contains_keyword(lowered: &str, keyword: &str) -> bool {
    if !keyword.ends_with([' ', '(']) {
        return lowered.contains(keyword);
    }
    lowered.match_indices(keyword).any(|(start, _)| {
        lowered[..start]
            .chars()
            .next_back()
            .is_none_or(|previous| !previous.is_alphanumeric())
    })
}

/// Ordered classification table. Earlier rules win.
pub const CLASSIFICATION_ORDER: &[CategoryRule] = &[
    CategoryRule {
        category: StepKind::Maven,
        keywords: &["mvn", "maven"],
    },
    CategoryRule {
        category: StepKind::Gradle,
        keywords: &["gradle"],
    },
    CategoryRule {
        category: StepKind::Npm,
        keywords: &["npm", "yarn"],
    },
    CategoryRule {
        category: StepKind::Docker,
        keywords: &["docker", "kaniko", "build -t"],
    },
    CategoryRule {
        category: StepKind::Sonar,
        keywords: &["sonar"],
    },
    CategoryRule {
        category: StepKind::Deploy,
        keywords: &["deploy", "kubectl", "helm "],
    },
    CategoryRule {
        category: StepKind::Checkout,
        keywords: &["checkout", "git clone", "git "],
    },
    CategoryRule {
        category: StepKind::Sh,
        keywords: &["sh ", "sh(", "shell", "bash"],
    },
    CategoryRule {
        category: StepKind::Echo,
        keywords: &["echo"],
    },
];

/// Classifies free text into a step category.
pub fn classify(text: &str) -> StepKind {
    let lowered = text.to_lowercase();
    CLASSIFICATION_ORDER
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map_or(StepKind::Sh, |rule| rule.category)
}

/// Classifies a step from its text, falling back to its display name when
/// the text is blank.
///
/// ```
/// use codearts_migrate_core::{classify_step, StepKind};
///
/// assert_eq!(classify_step("Shell Script", ""), StepKind::Sh);
/// assert_eq!(classify_step("Shell Script", "+ npm ci"), StepKind::Npm);
/// ```
pub fn classify_step(name: &str, text: &str) -> StepKind {
    if text.trim().is_empty() {
        classify(name)
    } else {
        classify(text)
    }
}

/// Narrows a command to the build tool it invokes.
///
/// Returns one of maven, gradle, npm or docker, and [`StepKind::Sh`] for
/// anything else.
///
/// ```
/// use codearts_migrate_core::{build_tool_of, StepKind};
///
/// assert_eq!(build_tool_of("yarn build"), StepKind::Npm);
/// assert_eq!(build_tool_of("kubectl apply -f k8s/"), StepKind::Sh);
/// ```
pub fn build_tool_of(command: &str) -> StepKind {
    match classify(command) {
        kind @ (StepKind::Maven | StepKind::Gradle | StepKind::Npm | StepKind::Docker) => kind,
        _ => StepKind::Sh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_pinned() {
        let order: Vec<StepKind> = CLASSIFICATION_ORDER.iter().map(|r| r.category).collect();
        assert_eq!(
            order,
            [
                StepKind::Maven,
                StepKind::Gradle,
                StepKind::Npm,
                StepKind::Docker,
                StepKind::Sonar,
                StepKind::Deploy,
                StepKind::Checkout,
                StepKind::Sh,
                StepKind::Echo,
            ]
        );
    }

    #[test]
    fn test_keywords_are_lowercase() {
        for rule in CLASSIFICATION_ORDER {
            for keyword in rule.keywords {
                assert_eq!(*keyword, keyword.to_lowercase());
            }
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("MVN -B verify"), StepKind::Maven);
        assert_eq!(classify("Run SonarQube analysis"), StepKind::Sonar);
    }

    #[test]
    fn test_tie_breaks() {
        // tool beats shell marker
        assert_eq!(classify("sh 'mvn clean package'"), StepKind::Maven);
        // checkout beats shell marker
        assert_eq!(classify("sh 'git clone https://x/y.git'"), StepKind::Checkout);
        // shell marker beats echo
        assert_eq!(classify("sh 'echo hello'"), StepKind::Sh);
        // maven beats deploy
        assert_eq!(classify("mvn deploy"), StepKind::Maven);
    }

    #[test]
    fn test_command_keywords_start_a_word() {
        assert_eq!(classify("publish && echo done"), StepKind::Echo);
        assert_eq!(classify("refresh cache; echo ok"), StepKind::Echo);
        assert_eq!(classify("print digit table"), StepKind::Sh);
        assert_eq!(classify("cd app && sh build.sh; echo ok"), StepKind::Sh);
        assert_eq!(classify("cd app;git pull"), StepKind::Checkout);
    }

    #[test]
    fn test_deploy_and_docker() {
        assert_eq!(classify("kubectl apply -f k8s/"), StepKind::Deploy);
        assert_eq!(
            classify("docker build -t app:1 ."),
            StepKind::Docker
        );
    }

    #[test]
    fn test_unmatched_defaults_to_sh() {
        assert_eq!(classify(""), StepKind::Sh);
        assert_eq!(classify("./run.py --fast"), StepKind::Sh);
    }
}
