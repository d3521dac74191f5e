//! Jenkinsfile (declarative pipeline DSL) extraction.
//!
//! The text is tokenized once ([`lexer`]), then sub-blocks are located by a
//! bracket-counting matcher ([`blocks`]):
//!
//! - `pipeline { }`: the outer block; without it extraction yields an empty
//!   model.
//! - `agent`, `environment { }` and `parameters { }` directly inside it.
//! - `stages { }`: split into stages by the ranked strategies in
//!   [`stages`], falling back from brace matching to head splitting.
//! - per stage, `steps { }` blocks (or, when none can be matched, the whole
//!   stage body) scanned for step calls by [`steps`].
//!
//! A second pass derives build steps from build-relevant stages.

mod args;
mod blocks;
mod lexer;
mod stages;
mod steps;

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

use codearts_migrate_core::{Agent, Parameter, ParameterKind, PipelineModel, Scm, Stage, StepKind};
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use crate::build_steps::derive_build_steps;
use crate::error::Result;
use crate::options::ExtractOptions;
use args::{ArgValue, parse_args};
use blocks::Script;
use lexer::TokenKind;
use stages::{RawStage, ranked_strategies};

pub(crate) use steps::normalize_branch;

/// Extracts a [`PipelineModel`] from Jenkinsfile text.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::StepKind;
/// use codearts_migrate_extract::{DslExtractor, ExtractOptions};
///
/// let text = "pipeline { stages { stage('Build') { steps { sh 'mvn clean package' } } } }";
/// let model = DslExtractor::new(ExtractOptions::default()).extract(text);
///
/// assert_eq!(model.stages.len(), 1);
/// assert_eq!(model.stages[0].steps[0].kind, StepKind::Sh);
/// assert_eq!(model.stages[0].steps[0].command, "mvn clean package");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DslExtractor {
    options: ExtractOptions,
}

impl DslExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Reads and extracts a Jenkinsfile. The model is named after the file
    /// stem when the file is not literally called `Jenkinsfile`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::ExtractError::IoError) if the file cannot
    /// be read.
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<PipelineModel> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let mut model = self.extract(&source);
        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .filter(|stem| *stem != "Jenkinsfile")
                .unwrap_or("pipeline")
                .to_string();
        }
        Ok(model)
    }

    /// Extracts a model from Jenkinsfile text.
    ///
    /// Never fails: a missing `pipeline { }` block yields an empty model and
    /// an error log entry.
    pub fn extract(&self, source: &str) -> PipelineModel {
        let script = Script::new(source);
        let Some(pipeline) = script.find_block_anywhere(script.all(), "pipeline") else {
            error!("no `pipeline {{ }}` block found in Jenkinsfile");
            return PipelineModel::default();
        };
        if !pipeline.closed {
            warn!("`pipeline` block is not closed; reading to end of input");
        }
        let body = pipeline.body;

        let mut model = PipelineModel::default();
        model.agent = parse_agent(&script, body.clone());
        if let Some(block) = script.find_block(body.clone(), "environment") {
            model.environment = parse_environment(&script, block.body);
        }
        if let Some(block) = script.find_block(body.clone(), "parameters") {
            for parameter in parse_parameters(&script, block.body) {
                model.add_parameter(parameter);
            }
        }
        match script.find_block(body, "stages") {
            Some(block) => {
                model.stages = split_stages(&script, block.body)
                    .into_iter()
                    .map(|raw| read_stage(&script, raw))
                    .collect();
            }
            None => warn!("no `stages {{ }}` block found in pipeline"),
        }
        warn_duplicate_stages(&model.stages);

        let scm = model
            .steps()
            .find(|step| step.kind == StepKind::Checkout && step.url.is_some())
            .and_then(|step| {
                let url = step.url.clone()?;
                let branch = step
                    .branch
                    .clone()
                    .unwrap_or_else(|| codearts_migrate_core::DEFAULT_SCM_BRANCH.to_string());
                Some(Scm::new(url, branch))
            });
        model.scm = scm;
        model.build_steps = derive_build_steps(&model.stages, &self.options.build_keywords);

        info!(
            stages = model.stages.len(),
            parameters = model.parameters.len(),
            build_steps = model.build_steps.len(),
            "extracted Jenkinsfile"
        );
        model
    }
}

fn split_stages(script: &Script<'_>, range: Range<usize>) -> Vec<RawStage> {
    for strategy in ranked_strategies() {
        match strategy.split(script, range.clone()) {
            Some(stages) if !stages.is_empty() => {
                debug!(strategy = strategy.name(), count = stages.len(), "split stages");
                return stages;
            }
            Some(_) => debug!(strategy = strategy.name(), "strategy found no stages"),
            None => debug!(strategy = strategy.name(), "strategy gave up"),
        }
    }
    warn!("no stage could be located inside `stages {{ }}`");
    Vec::new()
}

fn read_stage(script: &Script<'_>, raw: RawStage) -> Stage {
    let body = raw.body;
    let mut stage = Stage::new(raw.name);

    let step_blocks = steps_blocks(script, body.clone());
    stage.steps = if step_blocks.is_empty() {
        debug!(stage = %stage.name, "no `steps` block matched; scanning whole stage");
        steps::collect_steps(script, body.clone())
    } else {
        step_blocks
            .into_iter()
            .flat_map(|range| steps::collect_steps(script, range))
            .collect()
    };

    if let Some(block) = script.find_block(body.clone(), "environment") {
        stage.environment = parse_environment(script, block.body);
    }
    if let Some(block) = script.find_block(body.clone(), "when") {
        stage.when = Some(collapse_whitespace(script.text(block.body)));
    }
    stage.parallel = script.find_block(body.clone(), "parallel").is_some()
        || script.find_block(body, "matrix").is_some();
    stage
}

/// Bodies of `steps { }` blocks, descending through nested stage groups.
fn steps_blocks(script: &Script<'_>, range: Range<usize>) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    for block in script.top_level_blocks(range) {
        match script.tokens[block.head].ident() {
            Some("steps") => found.push(block.body),
            Some("parallel" | "stages" | "stage" | "matrix") => {
                found.extend(steps_blocks(script, block.body));
            }
            _ => {}
        }
    }
    found
}

fn warn_duplicate_stages(stages: &[Stage]) {
    let mut seen = HashSet::new();
    for stage in stages {
        if !seen.insert(stage.name.as_str()) {
            warn!(stage = %stage.name, "duplicate stage name; keeping both in declaration order");
        }
    }
}

/// Index of the first `name` token directly inside `range`.
fn top_level_ident(script: &Script<'_>, range: Range<usize>, name: &str) -> Option<usize> {
    let mut index = range.start;
    while index < range.end {
        if script.tokens[index].is_ident(name) {
            return Some(index);
        }
        index = script.skip_group(index, range.end);
    }
    None
}

fn parse_agent(script: &Script<'_>, range: Range<usize>) -> Agent {
    let Some(index) = top_level_ident(script, range.clone(), "agent") else {
        return Agent::Any;
    };
    let Some(block) = script.block_at(index, range.end) else {
        // `agent any`, `agent none`, or `agent label`
        return Agent::Any;
    };
    let inner = block.body;

    if let Some(kube) = script.find_block(inner.clone(), "kubernetes") {
        return Agent::Kubernetes {
            label: script.string_after(kube.body.clone(), "label"),
            yaml: script.string_after(kube.body, "yaml"),
        };
    }
    if let Some(docker) = script.find_block(inner.clone(), "docker") {
        if let Some(image) = script
            .string_after(docker.body.clone(), "image")
            .or_else(|| script.first_string(docker.body))
        {
            return Agent::Docker { image };
        }
    }
    if let Some(image) = script.string_after(inner.clone(), "docker") {
        return Agent::Docker { image };
    }
    if let Some(node) = script.find_block(inner.clone(), "node") {
        if let Some(label) = script.string_after(node.body, "label") {
            return Agent::Node { label };
        }
    }
    match script.string_after(inner, "label") {
        Some(label) => Agent::Node { label },
        None => Agent::Any,
    }
}

fn parse_environment(script: &Script<'_>, range: Range<usize>) -> IndexMap<String, String> {
    let is_assignment = |index: usize| {
        script.tokens[index].ident().is_some()
            && matches!(script.kind(index + 1), Some(TokenKind::Assign))
    };

    let mut environment = IndexMap::new();
    let mut index = range.start;
    while index < range.end {
        if !is_assignment(index) {
            index = script.skip_group(index, range.end);
            continue;
        }
        let name = script.tokens[index].ident().unwrap_or_default().to_string();
        let value_start = index + 2;
        let mut value_end = value_start;
        while value_end < range.end && !is_assignment(value_end) {
            value_end = script.skip_group(value_end, range.end);
        }
        let value = environment_value(script, value_start..value_end.min(range.end));
        environment.insert(name, value);
        index = value_end;
    }
    environment
}

fn environment_value(script: &Script<'_>, range: Range<usize>) -> String {
    if range.len() == 1 {
        if let Some(value) = script.tokens[range.start].string() {
            return value.to_string();
        }
    }
    if script
        .token(range.start)
        .is_some_and(|token| token.is_ident("credentials"))
    {
        if let Some(id) = script.first_string(range.clone()) {
            return format!("${{credentials.{id}}}");
        }
    }
    script.text(range).trim().to_string()
}

fn parse_parameters(script: &Script<'_>, range: Range<usize>) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    let mut index = range.start;
    while index < range.end {
        let call = script.tokens[index].ident();
        let opens = matches!(script.kind(index + 1), Some(TokenKind::LParen));
        let (Some(call), true) = (call, opens) else {
            index = script.skip_group(index, range.end);
            continue;
        };
        let Some(close) = script.matching_close(index + 1, range.end) else {
            break;
        };
        let args = parse_args(script, index + 2..close);
        if let Some(parameter) = parameter_from_call(call, &args) {
            parameters.push(parameter);
        }
        index = close + 1;
    }
    parameters
}

fn parameter_from_call(call: &str, args: &args::Args) -> Option<Parameter> {
    let name = args
        .string("name")
        .or_else(|| args.positional.first().map(ArgValue::to_plain))?;
    let default = args.string("defaultValue").unwrap_or_default();
    let parameter = match call {
        "string" => Parameter::string(name, default),
        "text" => Parameter::new(name, default).with_kind(ParameterKind::Text),
        "password" => Parameter::new(name, default).with_kind(ParameterKind::Password),
        "booleanParam" => {
            let value = matches!(args.get("defaultValue"), Some(ArgValue::Bool(true)))
                || default.eq_ignore_ascii_case("true");
            Parameter::boolean(name, value)
        }
        "choice" => Parameter::choice(
            name,
            args.get("choices").map(ArgValue::to_list).unwrap_or_default(),
        ),
        other => {
            debug!(call = other, "skipping unsupported parameter type");
            return None;
        }
    };
    Some(parameter.with_description(args.string("description").unwrap_or_default()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> PipelineModel {
        DslExtractor::default().extract(source)
    }

    const FULL: &str = r#"
@Library('shared') _
pipeline {
    agent {
        kubernetes {
            label 'maven-pod'
            yaml '''
apiVersion: v1
kind: Pod
'''
        }
    }
    parameters {
        string(name: 'BRANCH', defaultValue: 'develop', description: 'Branch to build')
        booleanParam(name: 'SKIP_TESTS', defaultValue: false, description: 'Skip tests')
        choice(name: 'DEPLOY_ENV', choices: ['dev', 'staging', 'prod'], description: 'Target')
    }
    environment {
        APP_NAME = 'order-service'
        REGISTRY_CRED = credentials('harbor-cred')
    }
    stages {
        stage('Checkout') {
            steps {
                checkout scm
            }
        }
        stage('Build') {
            environment {
                MAVEN_OPTS = '-Xmx1g'
            }
            steps {
                sh 'mvn -B clean package -DskipTests'
                echo "built"
            }
        }
        stage('Deploy') {
            when { branch 'main' }
            steps {
                sshagent(['deploy-key']) {
                    sh 'kubectl apply -f k8s/ -n prod'
                }
            }
        }
    }
    post { always { echo 'done' } }
}
"#;

    #[test]
    fn test_missing_pipeline_block_yields_empty_model() {
        let model = extract("node { sh 'make' }");
        assert!(model.is_empty());
        assert_eq!(model, PipelineModel::default());
    }

    #[test]
    fn test_minimal_pipeline_with_stray_brace() {
        let model = extract(
            "pipeline { stages { stage('Build') { steps { sh 'mvn clean package' } } } } }",
        );
        assert_eq!(model.stages.len(), 1);
        assert_eq!(model.stages[0].name, "Build");
        assert_eq!(model.stages[0].steps.len(), 1);
        assert_eq!(model.stages[0].steps[0].kind, StepKind::Sh);
        assert_eq!(model.stages[0].steps[0].command, "mvn clean package");
    }

    #[test]
    fn test_full_pipeline() {
        let model = extract(FULL);

        assert_eq!(
            model.agent,
            Agent::Kubernetes {
                label: Some("maven-pod".into()),
                yaml: Some("\napiVersion: v1\nkind: Pod\n".into()),
            }
        );

        let names: Vec<_> = model.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["BRANCH", "SKIP_TESTS", "DEPLOY_ENV"]);
        assert_eq!(model.parameters[0].value, "develop");
        assert_eq!(model.parameters[1].value, "false");
        assert_eq!(model.parameters[2].value, "dev");
        assert_eq!(model.parameters[2].choices.len(), 3);

        assert_eq!(model.environment["APP_NAME"], "order-service");
        assert_eq!(model.environment["REGISTRY_CRED"], "${credentials.harbor-cred}");

        let stage_names: Vec<_> = model.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stage_names, ["Checkout", "Build", "Deploy"]);

        let build = &model.stages[1];
        assert_eq!(build.environment["MAVEN_OPTS"], "-Xmx1g");
        assert_eq!(build.steps.len(), 2);
        assert_eq!(build.steps[1].kind, StepKind::Echo);

        let deploy = &model.stages[2];
        assert_eq!(deploy.when.as_deref(), Some("branch 'main'"));
        assert_eq!(deploy.steps[0].kind, StepKind::Ssh);
        assert_eq!(deploy.steps[0].command, "kubectl apply -f k8s/ -n prod");

        assert_eq!(model.build_steps.len(), 1);
        assert_eq!(model.build_steps[0].kind, StepKind::Maven);
        assert_eq!(model.build_steps[0].command, "mvn -B clean package -DskipTests");
    }

    #[test]
    fn test_agent_forms() {
        let docker = extract("pipeline { agent { docker { image 'node:20' } } stages { } }");
        assert_eq!(docker.agent, Agent::Docker { image: "node:20".into() });

        let short_docker = extract("pipeline { agent { docker 'golang:1.22' } }");
        assert_eq!(short_docker.agent, Agent::Docker { image: "golang:1.22".into() });

        let label = extract("pipeline { agent { label 'linux' } }");
        assert_eq!(label.agent, Agent::Node { label: "linux".into() });

        let node = extract("pipeline { agent { node { label 'win' } } }");
        assert_eq!(node.agent, Agent::Node { label: "win".into() });

        let none = extract("pipeline { agent none }");
        assert_eq!(none.agent, Agent::Any);
    }

    #[test]
    fn test_stage_level_agent_does_not_leak() {
        let model = extract(
            "pipeline { agent any\n stages { stage('A') { agent { label 'gpu' } steps { sh 'x' } } } }",
        );
        assert_eq!(model.agent, Agent::Any);
        assert_eq!(model.stages[0].steps.len(), 1);
    }

    #[test]
    fn test_fallback_split_on_unbalanced_stage() {
        let source = "pipeline {\n stages {\n  stage('One') {\n   steps { sh 'first' }\n  stage('Two') {\n   steps { sh 'second' }\n  }\n }\n}";
        let model = extract(source);
        let names: Vec<_> = model.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["One", "Two"]);
        assert_eq!(model.stages[0].steps[0].command, "first");
        assert_eq!(model.stages[1].steps[0].command, "second");
    }

    #[test]
    fn test_stage_without_steps_block_scans_body() {
        let model = extract("pipeline { stages { stage('Legacy') { sh 'make legacy' } } }");
        assert_eq!(model.stages[0].steps.len(), 1);
        assert_eq!(model.stages[0].steps[0].command, "make legacy");
    }

    #[test]
    fn test_parallel_stage_collects_nested_steps() {
        let model = extract(
            "pipeline { stages { stage('Tests') { parallel { stage('Unit') { steps { sh 'mvn test' } } stage('Lint') { steps { sh 'npm run lint' } } } } } }",
        );
        assert_eq!(model.stages.len(), 1);
        assert!(model.stages[0].parallel);
        assert_eq!(model.stages[0].steps.len(), 2);
    }

    #[test]
    fn test_duplicate_stage_names_are_kept_in_order() {
        let model = extract(
            "pipeline { stages { stage('Step') { steps { sh 'a' } } stage('Step') { steps { sh 'b' } } } }",
        );
        let commands: Vec<_> = model.steps().map(|s| s.command.as_str()).collect();
        assert_eq!(commands, ["a", "b"]);
        assert_eq!(model.stages.len(), 2);
    }

    #[test]
    fn test_stage_count_round_trips_through_debug_json() {
        let model = extract(FULL);
        let json = model.to_debug_json().unwrap();
        let back = PipelineModel::from_debug_json(&json).unwrap();
        assert_eq!(back.stages.len(), FULL.matches("stage(").count());
    }

    #[test]
    fn test_git_step_sets_scm() {
        let model = extract(
            "pipeline { stages { stage('Checkout') { steps { git branch: 'dev', url: 'https://example.com/a.git' } } } }",
        );
        let scm = model.scm.unwrap();
        assert_eq!(scm.url, "https://example.com/a.git");
        assert_eq!(scm.branch, "dev");
    }

    #[test]
    fn test_no_build_stage_gets_default_maven_step() {
        let model = extract("pipeline { stages { stage('Test') { steps { sh 'make test' } } } }");
        assert_eq!(model.build_steps.len(), 1);
        assert_eq!(model.build_steps[0].kind, StepKind::Maven);
        assert_eq!(
            model.build_steps[0].command,
            codearts_migrate_core::DEFAULT_MAVEN_GOALS
        );
    }
}
