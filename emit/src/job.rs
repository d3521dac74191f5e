//! Stage-to-Job emitter: one CodeArts job per Jenkins stage.
//!
//! The document has two sections. `env` holds a fixed baseline followed by
//! the model's parameters and environment under camelCase keys. `jobs` holds
//! one job per non-ignored stage in stage order, each depending on the job
//! before it.
//!
//! A job's steps come from, in order: the forced-shell list, an exact or
//! keyword template mapping, or the stage's own first command.

use std::sync::LazyLock;

use codearts_migrate_core::{DEFAULT_TARGET_BRANCH, PipelineModel, Stage, StepKind};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::build::step_tool;
use crate::condition::convert_condition;
use crate::config::PipelineMapping;
use crate::error::{EmitError, Result};
use crate::naming::{camel_case, job_id, unique_id};
use crate::template::TemplateStore;

static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:-n|--namespace)(?:\s+|=)([A-Za-z0-9][A-Za-z0-9_.-]*)")
        .expect("static regex must compile")
});

/// A CodeArts pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDocument {
    pub env: IndexMap<String, String>,
    pub jobs: IndexMap<String, Job>,
}

/// One job of a [`PipelineDocument`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    pub steps: Vec<Mapping>,
}

/// Converts a [`PipelineModel`] into a [`PipelineDocument`].
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{PipelineModel, Stage, Step};
/// use codearts_migrate_emit::{PipelineMapping, StageJobEmitter, TemplateStore};
///
/// let mut model = PipelineModel::new("demo");
/// model.stages.push(Stage::new("SonarQube Scan").with_step(Step::sh("mvn sonar:sonar")));
/// model.stages.push(Stage::new("Smoke Tests").with_step(Step::sh("./smoke.sh")));
///
/// let emitter = StageJobEmitter::new(PipelineMapping::default(), TemplateStore::builtin());
/// let document = emitter.emit(&model).unwrap();
///
/// let ids: Vec<&str> = document.jobs.keys().map(String::as_str).collect();
/// assert_eq!(ids, ["codeCheck", "smokeTests"]);
/// assert_eq!(document.jobs["smokeTests"].needs, ["codeCheck"]);
/// ```
#[derive(Debug, Clone)]
pub struct StageJobEmitter {
    mapping: PipelineMapping,
    templates: TemplateStore,
}

impl StageJobEmitter {
    pub fn new(mapping: PipelineMapping, templates: TemplateStore) -> Self {
        Self { mapping, templates }
    }

    /// Builds the pipeline document.
    ///
    /// # Errors
    ///
    /// Fails only when a mapped template cannot be loaded or has the wrong
    /// shape.
    pub fn emit(&self, model: &PipelineModel) -> Result<PipelineDocument> {
        let mut jobs: IndexMap<String, Job> = IndexMap::new();
        let mut previous: Option<String> = None;

        for stage in &model.stages {
            if self.mapping.is_ignored(&stage.name) {
                info!(stage = %stage.name, "ignoring stage");
                continue;
            }
            let id = unique_id(job_id(&stage.name), |candidate| jobs.contains_key(candidate));
            debug!(stage = %stage.name, job = %id, "emitting job");

            let job = Job {
                name: stage.name.clone(),
                needs: previous.iter().cloned().collect(),
                condition: stage.when.as_deref().map(convert_condition),
                env: stage.environment.clone(),
                steps: self.job_steps(stage)?,
            };
            jobs.insert(id.clone(), job);
            previous = Some(id);
        }

        if jobs.is_empty() {
            info!("no stages to emit; writing default job");
            jobs.insert(
                "default".to_string(),
                Job {
                    name: "Default".to_string(),
                    needs: Vec::new(),
                    condition: None,
                    env: IndexMap::new(),
                    steps: vec![run_step("默认步骤", "echo \"默认步骤\"")],
                },
            );
        }

        info!(jobs = jobs.len(), "built CodeArts pipeline document");
        Ok(PipelineDocument {
            env: document_env(model),
            jobs,
        })
    }

    /// Builds the document and renders it as YAML.
    ///
    /// # Errors
    ///
    /// Propagates [`emit`](Self::emit) failures and YAML serialization errors.
    pub fn to_yaml(&self, model: &PipelineModel) -> Result<String> {
        Ok(serde_yaml::to_string(&self.emit(model)?)?)
    }

    fn job_steps(&self, stage: &Stage) -> Result<Vec<Mapping>> {
        if self.mapping.is_sh_stage(&stage.name) {
            return Ok(vec![placeholder_step(&stage.name)]);
        }
        let Some((template, overrides)) = self.mapping.template_for(&stage.name) else {
            debug!(stage = %stage.name, "no template mapping; using stage command");
            let run = stage
                .first_command()
                .map(str::to_string)
                .unwrap_or_else(|| placeholder_run(&stage.name));
            return Ok(vec![run_step(&format!("执行{}", stage.name), &run)]);
        };

        let mut step = self.templates.load(template)?;
        let mut values = derived_values(template, stage);
        values.extend(overrides);
        substitute(template, &mut step, values)?;
        Ok(vec![step])
    }
}

fn document_env(model: &PipelineModel) -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    env.insert("projectVersion".to_string(), "1.0.0".to_string());
    env.insert("appName".to_string(), String::new());
    env.insert("gitBranch".to_string(), DEFAULT_TARGET_BRANCH.to_string());
    for parameter in &model.parameters {
        env.insert(camel_case(&parameter.name), parameter.value.clone());
    }
    for (name, value) in &model.environment {
        env.insert(camel_case(name), value.clone());
    }
    env
}

/// Template parameters inferred from the stage's own steps.
fn derived_values(template: &str, stage: &Stage) -> IndexMap<String, String> {
    let mut values = IndexMap::new();
    let commands: Vec<&str> = stage.steps.iter().map(|step| step.command.as_str()).collect();

    match template {
        "code_check" => {
            values.insert("language".to_string(), detect_language(&commands).to_string());
            if commands.iter().any(|command| command.to_lowercase().contains("sonar")) {
                values.insert("tool".to_string(), "sonarqube".to_string());
            }
        }
        "build" => {
            let tool_step = stage
                .steps
                .iter()
                .find(|step| step_tool(step).is_build_tool());
            if let Some(step) = tool_step {
                let tool = step_tool(step);
                values.insert("tool".to_string(), tool.as_str().to_string());
                let arguments = strip_tool(tool, &step.command);
                if !arguments.is_empty() {
                    values.insert("command".to_string(), arguments.to_string());
                }
            }
        }
        "deploy" => {
            let namespace = commands
                .iter()
                .find_map(|command| NAMESPACE.captures(command).map(|found| found[1].to_string()));
            if let Some(namespace) = namespace {
                values.insert("namespace".to_string(), namespace);
            }
        }
        "shell" => {
            if let Some(command) = stage.first_command() {
                values.insert("run".to_string(), command.to_string());
            }
        }
        _ => {}
    }
    values
}

fn detect_language(commands: &[&str]) -> &'static str {
    let text = commands.join("\n").to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| text.contains(word));
    if mentions(&["python", "pytest", "pylint", "flake8", "pip "]) {
        "python"
    } else if mentions(&["npm", "yarn", "node", "eslint"]) {
        "javascript"
    } else {
        "java"
    }
}

/// Drops the tool executable from a command line, keeping its arguments.
fn strip_tool(tool: StepKind, command: &str) -> &str {
    let command = command.trim();
    let executables: &[&str] = match tool {
        StepKind::Maven => &["mvn", "./mvnw", "mvnw"],
        StepKind::Gradle => &["gradle", "./gradlew", "gradlew"],
        StepKind::Npm => &["npm", "yarn"],
        _ => &[],
    };
    let (first, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    if executables.contains(&first) {
        rest.trim()
    } else {
        command
    }
}

/// Writes `values` into the template: into its `with` mapping when it uses
/// a plugin, otherwise at the top level.
fn substitute(template: &str, step: &mut Mapping, values: IndexMap<String, String>) -> Result<()> {
    let target = if step.contains_key("uses") {
        let with = step
            .entry(Value::from("with"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        match with {
            Value::Mapping(with) => with,
            _ => {
                return Err(EmitError::InvalidTemplate {
                    name: template.to_string(),
                    reason: "`with` must be a mapping".to_string(),
                });
            }
        }
    } else {
        step
    };
    for (key, value) in values {
        target.insert(Value::from(key), Value::from(value));
    }
    Ok(())
}

fn run_step(name: &str, run: &str) -> Mapping {
    let mut step = Mapping::new();
    step.insert(Value::from("name"), Value::from(name));
    step.insert(Value::from("run"), Value::from(run));
    step
}

fn placeholder_run(stage: &str) -> String {
    format!("echo \"执行{stage}阶段...\"")
}

fn placeholder_step(stage: &str) -> Mapping {
    run_step(&format!("执行{stage}"), &placeholder_run(stage))
}

#[cfg(test)]
mod tests {
    use codearts_migrate_core::{Parameter, Step};

    use super::*;
    use crate::config::StageMapping;

    fn emitter() -> StageJobEmitter {
        StageJobEmitter::new(PipelineMapping::default(), TemplateStore::builtin())
    }

    fn model(stages: Vec<Stage>) -> PipelineModel {
        let mut model = PipelineModel::new("demo");
        model.stages = stages;
        model
    }

    #[test]
    fn test_env_order_and_camel_case() {
        let mut model = model(Vec::new());
        model.add_parameter(Parameter::string("DEPLOY_ENV", "test"));
        model.add_parameter(Parameter::string("APP_NAME", "shop"));
        model.environment.insert("IMAGE_TAG".into(), "latest".into());

        let document = emitter().emit(&model).unwrap();
        let keys: Vec<&str> = document.env.keys().map(String::as_str).collect();
        assert_eq!(keys, ["projectVersion", "appName", "gitBranch", "deployEnv", "imageTag"]);
        assert_eq!(document.env["appName"], "shop");
        assert_eq!(document.env["gitBranch"], "main");
    }

    #[test]
    fn test_needs_chain_and_collisions() {
        let document = emitter()
            .emit(&model(vec![
                Stage::new("Build API"),
                Stage::new("Build UI"),
                Stage::new("Deploy"),
            ]))
            .unwrap();

        let ids: Vec<&str> = document.jobs.keys().map(String::as_str).collect();
        assert_eq!(ids, ["build", "build1", "deploy"]);
        assert!(document.jobs["build"].needs.is_empty());
        assert_eq!(document.jobs["build1"].needs, ["build"]);
        assert_eq!(document.jobs["deploy"].needs, ["build1"]);
    }

    #[test]
    fn test_ignored_stage_breaks_nothing() {
        let mapping = PipelineMapping {
            ignore_stages: vec!["Cleanup".into()],
            ..PipelineMapping::default()
        };
        let emitter = StageJobEmitter::new(mapping, TemplateStore::builtin());
        let document = emitter
            .emit(&model(vec![
                Stage::new("Build").with_step(Step::sh("mvn package")),
                Stage::new("Cleanup").with_step(Step::sh("mvn deploy")),
                Stage::new("Smoke").with_step(Step::sh("./smoke.sh")),
            ]))
            .unwrap();

        assert!(document.jobs.values().all(|job| job.name != "Cleanup"));
        assert_eq!(document.jobs["smoke"].needs, ["build"]);
    }

    #[test]
    fn test_sh_stage_gets_placeholder() {
        let mapping = PipelineMapping {
            sh_stages: vec!["Build".into()],
            ..PipelineMapping::default()
        };
        let emitter = StageJobEmitter::new(mapping, TemplateStore::builtin());
        let document = emitter
            .emit(&model(vec![Stage::new("Build").with_step(Step::sh("mvn package"))]))
            .unwrap();

        let step = &document.jobs["build"].steps[0];
        assert_eq!(step["name"], "执行Build");
        assert_eq!(step["run"], "echo \"执行Build阶段...\"");
    }

    #[test]
    fn test_build_template_derives_tool_and_command() {
        let document = emitter()
            .emit(&model(vec![
                Stage::new("构建").with_step(Step::sh("./gradlew assemble -x test")),
            ]))
            .unwrap();

        let step = &document.jobs["build"].steps[0];
        assert_eq!(step["uses"], "CodeArtsBuild");
        assert_eq!(step["with"]["tool"], "gradle");
        assert_eq!(step["with"]["command"], "assemble -x test");
        assert_eq!(step["with"]["artifactIdentifier"], "${{ env.appName }}");
    }

    #[test]
    fn test_deploy_template_derives_namespace() {
        let document = emitter()
            .emit(&model(vec![
                Stage::new("Deploy").with_step(Step::sh("kubectl apply -f k8s/ -n shop-prod")),
            ]))
            .unwrap();
        let step = &document.jobs["deploy"].steps[0];
        assert_eq!(step["with"]["namespace"], "shop-prod");
        assert_eq!(step["with"]["cluster"], "${{ env.deployEnv }}");
    }

    #[test]
    fn test_code_check_language_and_mapping_override() {
        let mapping = PipelineMapping {
            stages: vec![StageMapping {
                jenkins_stage: "Quality".into(),
                template: "code_check".into(),
                params: IndexMap::from([("tool".to_string(), "codemars".to_string())]),
            }],
            ..PipelineMapping::default()
        };
        let emitter = StageJobEmitter::new(mapping, TemplateStore::builtin());
        let document = emitter
            .emit(&model(vec![
                Stage::new("Quality").with_step(Step::sh("pylint app && sonar-scanner")),
            ]))
            .unwrap();

        let step = &document.jobs["quality"].steps[0];
        assert_eq!(step["uses"], "CodeArtsCheck");
        assert_eq!(step["with"]["language"], "python");
        assert_eq!(step["with"]["tool"], "codemars");
    }

    #[test]
    fn test_unmatched_stage_uses_first_command() {
        let document = emitter()
            .emit(&model(vec![
                Stage::new("Smoke")
                    .with_step(Step::echo("starting"))
                    .with_step(Step::sh("./smoke.sh --fast")),
                Stage::new("Notify").with_step(Step::echo("done")),
            ]))
            .unwrap();

        assert_eq!(document.jobs["smoke"].steps[0]["run"], "./smoke.sh --fast");
        assert_eq!(document.jobs["notify"].steps[0]["name"], "执行Notify");
        assert_eq!(
            document.jobs["notify"].steps[0]["run"],
            "echo \"执行Notify阶段...\""
        );
    }

    #[test]
    fn test_stage_env_and_when() {
        let mut stage = Stage::new("Deploy");
        stage.environment.insert("KUBECONFIG".into(), "${credentials.kube}".into());
        stage.when = Some("branch 'main'".into());

        let document = emitter().emit(&model(vec![stage])).unwrap();
        let job = &document.jobs["deploy"];
        assert_eq!(job.condition.as_deref(), Some("env.gitBranch == 'main'"));
        assert_eq!(job.env["KUBECONFIG"], "${credentials.kube}");
    }

    #[test]
    fn test_empty_model_gets_default_job() {
        let document = emitter().emit(&model(Vec::new())).unwrap();
        assert_eq!(document.jobs.len(), 1);
        let job = &document.jobs["default"];
        assert_eq!(job.name, "Default");
        assert_eq!(job.steps[0]["run"], "echo \"默认步骤\"");
    }

    #[test]
    fn test_missing_mapped_template_is_fatal() {
        let mapping = PipelineMapping {
            stages: vec![StageMapping {
                jenkins_stage: "Perf".into(),
                template: "perf_test".into(),
                params: IndexMap::new(),
            }],
            ..PipelineMapping::default()
        };
        let emitter = StageJobEmitter::new(mapping, TemplateStore::builtin());
        let err = emitter.emit(&model(vec![Stage::new("Perf")])).unwrap_err();
        assert!(matches!(err, EmitError::TemplateNotFound(_)));
    }

    #[test]
    fn test_strip_tool() {
        assert_eq!(strip_tool(StepKind::Maven, "mvn -B clean package"), "-B clean package");
        assert_eq!(strip_tool(StepKind::Maven, "clean install"), "clean install");
        assert_eq!(strip_tool(StepKind::Npm, "npm"), "");
    }
}
