//! Job `config.xml` extraction.
//!
//! Freestyle projects are read from the flattened document: Git SCM,
//! builders, publisher SSH commands, parameter definitions and injected
//! environment. Pipeline jobs (`flow-definition`) with an inline script are
//! handed to the [`DslExtractor`].

mod tree;

use std::path::Path;

use codearts_migrate_core::{
    DEFAULT_SCM_BRANCH, Parameter, ParameterKind, PipelineModel, ProjectKind, Scm, Stage, Step,
    StepKind,
};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::build_steps::default_maven_step;
use crate::dsl::{DslExtractor, normalize_branch};
use crate::error::Result;
use crate::options::ExtractOptions;

use tree::Element;

pub use tree::{ATTRIBUTES_KEY, as_list, class_of, find_all, flatten_document, lookup, lookup_text};

const GIT_SCM_CLASS: &str = "hudson.plugins.git.GitSCM";
const PARAMETERS_PROPERTY: &str = "hudson.model.ParametersDefinitionProperty";
const ENV_INJECT_PROPERTY: &str = "EnvInjectJobProperty";

/// Stage tags given to freestyle steps, in output order.
const FREESTYLE_STAGES: [&str; 3] = ["Checkout", "Build", "Deploy"];

/// Extracts a [`PipelineModel`] from a job's `config.xml`.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{ProjectKind, StepKind};
/// use codearts_migrate_extract::{ExtractOptions, XmlExtractor};
///
/// let xml = r#"<project>
///   <scm class="hudson.plugins.git.GitSCM">
///     <userRemoteConfigs><hudson.plugins.git.UserRemoteConfig>
///       <url>https://git.example.com/shop.git</url>
///     </hudson.plugins.git.UserRemoteConfig></userRemoteConfigs>
///     <branches><hudson.plugins.git.BranchSpec><name>*/main</name></hudson.plugins.git.BranchSpec></branches>
///   </scm>
///   <builders/>
/// </project>"#;
/// let model = XmlExtractor::new(ExtractOptions::default()).extract(xml);
///
/// assert_eq!(model.kind, ProjectKind::Freestyle);
/// assert_eq!(model.scm.as_ref().unwrap().branch, "main");
/// assert_eq!(model.build_steps[0].kind, StepKind::Checkout);
/// assert_eq!(model.build_steps[1].kind, StepKind::Maven);
/// ```
#[derive(Debug, Clone, Default)]
pub struct XmlExtractor {
    dsl: DslExtractor,
}

impl XmlExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            dsl: DslExtractor::new(options),
        }
    }

    /// Reads and extracts a `config.xml`. The model is named after the
    /// enclosing directory when the file is called `config.xml`, and after
    /// the file stem otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::ExtractError::IoError) if the file cannot
    /// be read.
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<PipelineModel> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        let mut model = self.extract(&xml);
        if model.name.is_empty() {
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let parent = path
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|dir| dir.to_str());
            model.name = match (stem, parent) {
                (Some("config"), Some(parent)) => parent.to_string(),
                (Some(stem), _) => stem.to_string(),
                _ => String::new(),
            };
        }
        Ok(model)
    }

    /// Extracts a model from `config.xml` text. The text is always kept in
    /// [`PipelineModel::raw_xml`].
    ///
    /// Never fails: malformed XML is logged and yields a model with empty
    /// fields.
    pub fn extract(&self, xml: &str) -> PipelineModel {
        let root = match tree::parse(xml) {
            Ok(root) => root,
            Err(err) => {
                error!(%err, "malformed config.xml; continuing with empty fields");
                let mut model = PipelineModel::default();
                model.kind = ProjectKind::Freestyle;
                model.raw_xml = Some(xml.to_string());
                return model;
            }
        };

        let job = root.to_value();
        let mut model = if root.name == "flow-definition" {
            self.pipeline_job(&job, &root)
        } else {
            freestyle_job(&job, &root)
        };
        model.raw_xml = Some(xml.to_string());
        model
    }

    fn pipeline_job(&self, job: &Value, root: &Element) -> PipelineModel {
        let mut model = match lookup_text(job, &["definition", "script"]) {
            Some(script) => {
                debug!("routing inline pipeline script to the Jenkinsfile extractor");
                self.dsl.extract(script)
            }
            None => {
                warn!("pipeline job has no inline script; only SCM and parameters are read");
                let mut model = PipelineModel::default();
                if let Some(scm) = lookup(job, &["definition", "scm"]).and_then(git_scm) {
                    model.scm = Some(scm);
                }
                model
            }
        };
        for parameter in parameters(root) {
            if model.find_parameter(&parameter.name).is_none() {
                model.add_parameter(parameter);
            }
        }
        for (name, value) in injected_environment(job) {
            model.environment.entry(name).or_insert(value);
        }
        model
    }
}

fn freestyle_job(project: &Value, root: &Element) -> PipelineModel {
    let mut model = PipelineModel::default();
    model.kind = ProjectKind::Freestyle;

    let mut steps = Vec::new();
    if let Some(scm) = project.get("scm").and_then(git_scm) {
        steps.push(Step::git_checkout(&scm.url, &scm.branch).in_stage("Checkout"));
        model.scm = Some(scm);
    }
    if let Some(builders) = project.get("builders") {
        steps.extend(builder_steps(builders));
    }
    if let Some(publishers) = project.get("publishers") {
        steps.extend(
            find_all(publishers, "execCommand")
                .into_iter()
                .filter_map(Value::as_str)
                .map(|command| Step::new("Deploy", StepKind::Ssh, command).in_stage("Deploy")),
        );
    }
    if !steps.iter().any(|step| step.kind == StepKind::Maven) {
        warn!("no Maven builder found; adding default Maven step");
        steps.push(default_maven_step());
    }

    for parameter in parameters(root) {
        model.add_parameter(parameter);
    }
    model.environment = injected_environment(project);
    model.stages = FREESTYLE_STAGES
        .iter()
        .filter_map(|name| {
            let stage_steps: Vec<Step> = steps
                .iter()
                .filter(|step| step.stage.as_deref() == Some(*name))
                .cloned()
                .collect();
            (!stage_steps.is_empty()).then(|| Stage {
                steps: stage_steps,
                ..Stage::new(*name)
            })
        })
        .collect();
    model.build_steps = steps
        .into_iter()
        .filter(|step| matches!(step.stage.as_deref(), Some("Checkout" | "Build")))
        .collect();

    info!(
        stages = model.stages.len(),
        build_steps = model.build_steps.len(),
        "extracted freestyle config.xml"
    );
    model
}

fn git_scm(scm: &Value) -> Option<Scm> {
    if class_of(scm) != Some(GIT_SCM_CLASS) {
        debug!(class = ?class_of(scm), "skipping non-Git SCM");
        return None;
    }
    let url = lookup_text(scm, &["userRemoteConfigs", "hudson.plugins.git.UserRemoteConfig", "url"])?;
    let branch = lookup_text(scm, &["branches", "hudson.plugins.git.BranchSpec", "name"])
        .map(normalize_branch)
        .filter(|branch| !branch.is_empty())
        .unwrap_or_else(|| DEFAULT_SCM_BRANCH.to_string());
    Some(Scm::new(url, branch))
}

fn builder_steps(builders: &Value) -> Vec<Step> {
    let mut steps = Vec::new();
    for maven in builders.get("hudson.tasks.Maven").map(as_list).unwrap_or_default() {
        let Some(targets) = lookup_text(maven, &["targets"]) else {
            continue;
        };
        let flags: Vec<String> = lookup_text(maven, &["properties"])
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| format!("-D{line}"))
            .collect();
        let command = if flags.is_empty() {
            targets.to_string()
        } else {
            format!("{targets} {}", flags.join(" "))
        };
        steps.push(Step::new("Maven Build", StepKind::Maven, command).in_stage("Build"));
    }
    for gradle in builders
        .get("hudson.plugins.gradle.Gradle")
        .map(as_list)
        .unwrap_or_default()
    {
        if let Some(tasks) = lookup_text(gradle, &["tasks"]) {
            steps.push(Step::new("Gradle Build", StepKind::Gradle, tasks).in_stage("Build"));
        }
    }
    for tag in ["hudson.tasks.Shell", "hudson.tasks.BatchFile"] {
        for shell in builders.get(tag).map(as_list).unwrap_or_default() {
            if let Some(command) = lookup_text(shell, &["command"]) {
                steps.push(Step::new("Shell", StepKind::Sh, command).in_stage("Build"));
            }
        }
    }
    steps
}

/// Parameter definitions in document order. Later definitions of a name
/// replace earlier ones when added to the model.
fn parameters(job: &Element) -> Vec<Parameter> {
    let Some(definitions) = job.descend(&["properties", PARAMETERS_PROPERTY, "parameterDefinitions"])
    else {
        return Vec::new();
    };

    let mut parameters = Vec::new();
    for definition in &definitions.children {
        let tag = definition.name.as_str();
        let kind = match tag.rsplit('.').next().unwrap_or(tag) {
            "StringParameterDefinition" => ParameterKind::String,
            "BooleanParameterDefinition" => ParameterKind::Boolean,
            "ChoiceParameterDefinition" => ParameterKind::Choice,
            "TextParameterDefinition" => ParameterKind::Text,
            "PasswordParameterDefinition" => ParameterKind::Password,
            other => {
                debug!(definition = other, "skipping unsupported parameter definition");
                continue;
            }
        };
        let entry = definition.to_value();
        let Some(name) = lookup_text(&entry, &["name"]) else {
            continue;
        };
        let description = lookup_text(&entry, &["description"]).unwrap_or_default();
        let parameter = match kind {
            ParameterKind::Choice => {
                let choices = lookup(&entry, &["choices"])
                    .map(|choices| find_all(choices, "string"))
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                Parameter::choice(name, choices)
            }
            ParameterKind::Boolean => Parameter::boolean(
                name,
                lookup_text(&entry, &["defaultValue"]) == Some("true"),
            ),
            other => Parameter::new(name, lookup_text(&entry, &["defaultValue"]).unwrap_or_default())
                .with_kind(other),
        };
        parameters.push(parameter.with_description(description));
    }
    parameters
}

fn injected_environment(job: &Value) -> IndexMap<String, String> {
    lookup_text(job, &["properties", ENV_INJECT_PROPERTY, "info", "propertiesContent"])
        .map(parse_properties)
        .unwrap_or_default()
}

/// Parses `KEY=value` lines; lines without `=` are ignored.
pub(crate) fn parse_properties(content: &str) -> IndexMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
