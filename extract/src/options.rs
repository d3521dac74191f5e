//! Tunables shared by all extractors.

use serde::{Deserialize, Serialize};

/// Stage-name keywords that mark a stage as build-relevant.
pub const DEFAULT_BUILD_KEYWORDS: &[&str] = &["build", "构建", "编译"];

/// Maximum characters of a Blue Ocean step log kept before truncation.
pub const DEFAULT_LOG_LIMIT: usize = 1000;

/// Options controlling extraction.
///
/// Missing fields take their defaults when deserialized.
///
/// # Examples
///
/// ```
/// use codearts_migrate_extract::ExtractOptions;
///
/// let options: ExtractOptions = serde_json::from_str(r#"{"log_limit": 200}"#).unwrap();
/// assert_eq!(options.log_limit, 200);
/// assert_eq!(options.build_keywords, ["build", "构建", "编译"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Lowercase substrings that select build stages for the build-step pass.
    pub build_keywords: Vec<String>,
    /// Log excerpts longer than this many characters are truncated.
    pub log_limit: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            build_keywords: DEFAULT_BUILD_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
            log_limit: DEFAULT_LOG_LIMIT,
        }
    }
}
