//! Identifier generation for environment keys and job ids.

use sha2::{Digest, Sha256};

/// Well-known stage-name fragments and the job id they produce, in priority
/// order. The `report` entry is resolved by [`report_id`].
const JOB_PATTERNS: &[(&[&str], &str)] = &[
    (&["代码检查", "sonar"], "codeCheck"),
    (&["编译", "构建", "build"], "build"),
    (&["部署", "deploy"], "deploy"),
    (&["单元测试", "unit test"], "unitTest"),
    (&["准备", "preparation"], "preparation"),
    (&["状态", "status"], "checkStatus"),
    (&["报告", "report"], "report"),
    (&["增量", "inc"], "incUnitTest"),
];

/// Converts a Jenkins name into a camelCase key.
///
/// Words are the ASCII alphanumeric runs of `name`. A name without any ASCII
/// word is only lowercased.
///
/// ```
/// use codearts_migrate_emit::camel_case;
///
/// assert_eq!(camel_case("DEPLOY_ENV"), "deployEnv");
/// assert_eq!(camel_case("image-tag"), "imageTag");
/// assert_eq!(camel_case("VERSION"), "version");
/// assert_eq!(camel_case("分支"), "分支");
/// ```
pub fn camel_case(name: &str) -> String {
    words_camel(name).unwrap_or_else(|| name.to_lowercase())
}

/// Generates the job id for a stage name.
///
/// The pattern table wins, then the camelCase of the name's ASCII words,
/// then `job` followed by a short SHA-256 digest of the name.
///
/// ```
/// use codearts_migrate_emit::job_id;
///
/// assert_eq!(job_id("SonarQube Scan"), "codeCheck");
/// assert_eq!(job_id("镜像报告"), "imageReport");
/// assert_eq!(job_id("Smoke Tests"), "smokeTests");
/// assert!(job_id("冒烟").starts_with("job"));
/// ```
pub fn job_id(name: &str) -> String {
    let lowered = name.to_lowercase();
    for (fragments, id) in JOB_PATTERNS {
        if fragments.iter().any(|fragment| lowered.contains(fragment)) {
            return if *id == "report" {
                report_id(&lowered).to_string()
            } else {
                id.to_string()
            };
        }
    }
    words_camel(name).unwrap_or_else(|| format!("job{}", short_hash(name)))
}

/// Makes `id` unique against `taken` by appending 1, 2, ...
pub fn unique_id(id: String, taken: impl Fn(&str) -> bool) -> String {
    if !taken(&id) {
        return id;
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{id}{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn report_id(lowered: &str) -> &'static str {
    if lowered.contains("image") || lowered.contains("镜像") {
        "imageReport"
    } else {
        "reportTest"
    }
}

fn words_camel(name: &str) -> Option<String> {
    let mut words = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty());
    let mut result = words.next()?.to_lowercase();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.push_str(&chars.as_str().to_lowercase());
        }
    }
    Some(result)
}

fn short_hash(name: &str) -> String {
    Sha256::digest(name.as_bytes())
        .iter()
        .take(3)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_priority() {
        assert_eq!(job_id("代码检查"), "codeCheck");
        assert_eq!(job_id("Build Image"), "build");
        assert_eq!(job_id("部署到测试环境"), "deploy");
        assert_eq!(job_id("Unit Test"), "unitTest");
        assert_eq!(job_id("Preparation"), "preparation");
        assert_eq!(job_id("检查状态"), "checkStatus");
        assert_eq!(job_id("Test Report"), "reportTest");
        assert_eq!(job_id("Image Report"), "imageReport");
        assert_eq!(job_id("增量测试"), "incUnitTest");
    }

    #[test]
    fn test_fragment_match_is_substring() {
        // "inc" matches inside other words.
        assert_eq!(job_id("Lint Incremental"), "incUnitTest");
        assert_eq!(job_id("Lint"), "lint");
    }

    #[test]
    fn test_hash_fallback_is_stable() {
        let first = job_id("冒烟");
        assert_eq!(first, job_id("冒烟"));
        assert_eq!(first.len(), "job".len() + 6);
        assert_ne!(first, job_id("回归"));
    }

    #[test]
    fn test_camel_case_mixed() {
        assert_eq!(camel_case("appName"), "appname");
        assert_eq!(camel_case("Release Notes v2"), "releaseNotesV2");
        assert_eq!(camel_case("__X__"), "x");
    }

    #[test]
    fn test_unique_id_appends_counter() {
        let taken = ["build", "build1"];
        let id = unique_id("build".into(), |candidate| taken.contains(&candidate));
        assert_eq!(id, "build2");
        assert_eq!(unique_id("deploy".into(), |_| false), "deploy");
    }
}
