//! Build-step derivation from build-relevant stages.

use codearts_migrate_core::{
    DEFAULT_MAVEN_GOALS, DOCKER_COMMAND, GRADLE_COMMAND, NPM_COMMAND, Stage, Step, StepKind,
    build_tool_of,
};
use tracing::debug;

/// Maps every shell or build-tool step of a build stage onto a
/// tool-specific build step.
///
/// A stage is build-relevant when its lowercased name contains one of
/// `keywords`. When no stage qualifies (or none yields a step) the result is
/// the single default Maven step.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{Stage, Step, StepKind};
/// use codearts_migrate_extract::derive_build_steps;
///
/// let stages = vec![
///     Stage::new("Build").with_step(Step::sh("./gradlew build")),
///     Stage::new("Test").with_step(Step::sh("mvn test")),
/// ];
/// let steps = derive_build_steps(&stages, &["build".to_string()]);
///
/// assert_eq!(steps.len(), 1);
/// assert_eq!(steps[0].kind, StepKind::Gradle);
/// assert_eq!(steps[0].stage.as_deref(), Some("Build"));
/// ```
pub fn derive_build_steps(stages: &[Stage], keywords: &[String]) -> Vec<Step> {
    let mut steps: Vec<Step> = stages
        .iter()
        .filter(|stage| is_build_stage(&stage.name, keywords))
        .flat_map(|stage| {
            stage
                .steps
                .iter()
                .filter(|step| is_command_step(step.kind))
                .map(move |step| build_step(&step.command).in_stage(&stage.name))
        })
        .collect();

    if steps.is_empty() {
        debug!("no build stage found; using default Maven step");
        steps.push(default_maven_step());
    }
    steps
}

/// The build step used when nothing else is known about a project.
pub fn default_maven_step() -> Step {
    Step::new("Maven Build", StepKind::Maven, DEFAULT_MAVEN_GOALS).in_stage("Build")
}

fn is_build_stage(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords
        .iter()
        .any(|keyword| name.contains(&keyword.to_lowercase()))
}

fn is_command_step(kind: StepKind) -> bool {
    matches!(kind, StepKind::Sh | StepKind::Docker) || kind.is_build_tool()
}

fn build_step(command: &str) -> Step {
    match build_tool_of(command) {
        StepKind::Maven => Step::new("Maven Build", StepKind::Maven, command),
        StepKind::Gradle => Step::new("Gradle Build", StepKind::Gradle, GRADLE_COMMAND),
        StepKind::Npm => Step::new("NPM Build", StepKind::Npm, NPM_COMMAND),
        StepKind::Docker => Step::new("Docker Build", StepKind::Docker, DOCKER_COMMAND),
        _ => Step::sh(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["build".into(), "构建".into(), "编译".into()]
    }

    #[test]
    fn test_each_tool_maps_to_its_step() {
        let stage = Stage::new("编译打包")
            .with_step(Step::sh("mvn -B package"))
            .with_step(Step::sh("npm ci"))
            .with_step(Step::sh("docker build -t app ."))
            .with_step(Step::sh("make dist"))
            .with_step(Step::echo("done"));
        let steps = derive_build_steps(&[stage], &keywords());

        let kinds: Vec<_> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [StepKind::Maven, StepKind::Npm, StepKind::Docker, StepKind::Sh]
        );
        assert_eq!(steps[0].command, "mvn -B package");
        assert_eq!(steps[1].command, NPM_COMMAND);
        assert_eq!(steps[2].command, DOCKER_COMMAND);
        assert_eq!(steps[3].command, "make dist");
        assert!(steps.iter().all(|s| s.stage.as_deref() == Some("编译打包")));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let stage = Stage::new("BUILD-IMAGE").with_step(Step::sh("gradle assemble"));
        let steps = derive_build_steps(&[stage], &keywords());
        assert_eq!(steps[0].kind, StepKind::Gradle);
        assert_eq!(steps[0].command, GRADLE_COMMAND);
    }

    #[test]
    fn test_default_when_no_build_stage() {
        let stage = Stage::new("Deploy").with_step(Step::sh("kubectl apply -f k8s"));
        let steps = derive_build_steps(&[stage], &keywords());
        assert_eq!(steps, vec![default_maven_step()]);
    }
}
