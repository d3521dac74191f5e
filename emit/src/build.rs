//! Build-Task emitter: a CodeArts build task from stage names.
//!
//! `PRE_BUILD` always holds one checkout step. `BUILD` holds one step per
//! recognized tool plus a shell step per other stage, followed by a single
//! artifact upload whose path depends on the tools found.

use std::collections::HashSet;
use std::sync::LazyLock;

use codearts_migrate_core::{
    DEFAULT_MAVEN_GOALS, DEFAULT_TARGET_BRANCH, DOCKER_COMMAND, GRADLE_COMMAND, NPM_COMMAND,
    PipelineModel, Stage, Step, StepKind, build_tool_of,
};
use codearts_migrate_extract::xml::{as_list, find_all, flatten_document};
use regex::Regex;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::{debug, info, warn};

use crate::config::BuildMapping;
use crate::error::Result;

/// Checkout URL used when the model carries no Git origin.
pub const PLACEHOLDER_GIT_URL: &str = "https://codehub.devcloud.cn/your-repo.git";

pub const MAVEN_ARTIFACTS: &str = "**/target/*.?ar";
pub const GRADLE_ARTIFACTS: &str = "**/build/libs/*.?ar";
pub const NPM_ARTIFACTS: &str = "**/dist/**";
pub const ALL_ARTIFACTS: &str = "**/target/*.?ar,**/build/libs/*.?ar,**/dist/**";

static PATTERNS: LazyLock<UrlPatterns> = LazyLock::new(UrlPatterns::new);

struct UrlPatterns {
    xml_url: Regex,
    git_clone: Regex,
}

impl UrlPatterns {
    fn new() -> Self {
        Self {
            xml_url: Regex::new(r"<url>(.*?)</url>").expect("static regex must compile"),
            git_clone: Regex::new(r"git clone\s+(?:-b\s+\S+\s+)?(\S+)")
                .expect("static regex must compile"),
        }
    }
}

/// A CodeArts build-task document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildDocument {
    pub version: String,
    pub params: Vec<BuildParam>,
    pub steps: BuildPhases,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildParam {
    pub name: String,
    pub value: String,
    pub description: String,
}

impl BuildParam {
    fn new(name: &str, value: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildPhases {
    #[serde(rename = "PRE_BUILD")]
    pub pre_build: Vec<BuildStep>,
    #[serde(rename = "BUILD")]
    pub build: Vec<BuildStep>,
}

/// One build-task step. Serialized as a single-key mapping named after the
/// step type, e.g. `{maven: {name, inputs}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStep {
    Checkout(CheckoutTask),
    Maven(CommandTask),
    Gradle(CommandTask),
    Npm(CommandTask),
    Sh(CommandTask),
    UploadArtifact(UploadTask),
}

impl BuildStep {
    /// Step type key as written in the document.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Checkout(_) => "checkout",
            Self::Maven(_) => "maven",
            Self::Gradle(_) => "gradle",
            Self::Npm(_) => "npm",
            Self::Sh(_) => "sh",
            Self::UploadArtifact(_) => "upload_artifact",
        }
    }

    /// The step's command, for command-running steps.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Maven(task) | Self::Gradle(task) | Self::Npm(task) | Self::Sh(task) => {
                Some(&task.inputs.command)
            }
            _ => None,
        }
    }
}

impl Serialize for BuildStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Checkout(task) => map.serialize_entry(self.key(), task)?,
            Self::Maven(task) | Self::Gradle(task) | Self::Npm(task) | Self::Sh(task) => {
                map.serialize_entry(self.key(), task)?
            }
            Self::UploadArtifact(task) => map.serialize_entry(self.key(), task)?,
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutTask {
    pub name: String,
    pub inputs: CheckoutInputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutInputs {
    pub scm: String,
    pub url: String,
    pub branch: String,
    pub lfs: bool,
    pub submodule: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTask {
    pub name: String,
    pub inputs: CommandInputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInputs {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTask {
    pub inputs: UploadInputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadInputs {
    pub path: String,
}

fn command_task(name: impl Into<String>, command: impl Into<String>) -> CommandTask {
    CommandTask {
        name: name.into(),
        inputs: CommandInputs {
            command: command.into(),
        },
    }
}

/// The build tool a step runs: its own kind for typed build steps,
/// otherwise the tool named in its command.
pub(crate) fn step_tool(step: &Step) -> StepKind {
    if step.kind.is_build_tool() {
        step.kind
    } else {
        build_tool_of(&step.command)
    }
}

/// Converts a [`PipelineModel`] into a [`BuildDocument`].
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{PipelineModel, Stage, Step};
/// use codearts_migrate_emit::{BuildMapping, BuildTaskEmitter, MAVEN_ARTIFACTS};
///
/// let mut model = PipelineModel::new("demo");
/// model.stages.push(Stage::new("Build").with_step(Step::sh("mvn clean package")));
///
/// let document = BuildTaskEmitter::new(BuildMapping::default()).emit(&model);
/// let build = &document.steps.build;
/// assert_eq!(build[0].key(), "maven");
/// assert_eq!(build[0].command(), Some("mvn clean package"));
/// assert_eq!(build.len(), 2);
/// # use codearts_migrate_emit::BuildStep;
/// # let BuildStep::UploadArtifact(upload) = &build[1] else { panic!() };
/// # assert_eq!(upload.inputs.path, MAVEN_ARTIFACTS);
/// ```
#[derive(Debug, Clone)]
pub struct BuildTaskEmitter {
    mapping: BuildMapping,
}

impl BuildTaskEmitter {
    pub fn new(mapping: BuildMapping) -> Self {
        Self { mapping }
    }

    pub fn emit(&self, model: &PipelineModel) -> BuildDocument {
        let (mut build, tools) = self.build_steps(&model.stages);
        build.push(BuildStep::UploadArtifact(UploadTask {
            inputs: UploadInputs {
                path: artifact_path(&tools).to_string(),
            },
        }));

        let checkout = BuildStep::Checkout(CheckoutTask {
            name: "代码下载".to_string(),
            inputs: CheckoutInputs {
                scm: "codehub".to_string(),
                url: git_url(model),
                branch: "${GitBranch}".to_string(),
                lfs: false,
                submodule: false,
            },
        });

        info!(steps = build.len(), "built CodeArts build task");
        BuildDocument {
            version: "2.0".to_string(),
            params: build_params(model),
            steps: BuildPhases {
                pre_build: vec![checkout],
                build,
            },
        }
    }

    /// Builds the document and renders it as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`YamlError`](crate::EmitError::YamlError) if serialization
    /// fails.
    pub fn to_yaml(&self, model: &PipelineModel) -> Result<String> {
        Ok(serde_yaml::to_string(&self.emit(model))?)
    }

    /// Scans stages by name. Returns the steps and the artifact-producing
    /// tools that were added.
    fn build_steps(&self, stages: &[Stage]) -> (Vec<BuildStep>, Vec<StepKind>) {
        let mapping = &self.mapping;
        let tool_lists = [
            (StepKind::Maven, &mapping.maven_stages),
            (StepKind::Gradle, &mapping.gradle_stages),
            (StepKind::Npm, &mapping.npm_stages),
            (StepKind::Docker, &mapping.docker_stages),
        ];

        let mut steps = Vec::new();
        let mut added: Vec<StepKind> = Vec::new();
        let mut shell_stages: HashSet<String> = HashSet::new();

        for stage in stages {
            if mapping.is_ignored(&stage.name) {
                info!(stage = %stage.name, "ignoring stage");
                continue;
            }
            let matched: Vec<StepKind> = tool_lists
                .iter()
                .filter(|(_, list)| BuildMapping::matches(list, &stage.name))
                .map(|(tool, _)| *tool)
                .collect();

            if let Some(tool) = matched.iter().copied().find(|tool| !added.contains(tool)) {
                debug!(stage = %stage.name, tool = %tool, "adding tool step");
                steps.push(tool_step(tool, stage));
                added.push(tool);
            } else if !matched.is_empty() {
                debug!(stage = %stage.name, "tool step already present");
            } else if shell_stages.insert(stage.name.to_lowercase()) {
                let command = if BuildMapping::matches(&mapping.sh_stages, &stage.name) {
                    stage_commands(stage)
                } else {
                    debug!(stage = %stage.name, "unrecognized stage; adding placeholder shell step");
                    None
                };
                let command =
                    command.unwrap_or_else(|| format!("echo '执行 {} 阶段...'", stage.name));
                steps.push(BuildStep::Sh(command_task(stage.name.clone(), command)));
            }
        }

        if steps.is_empty() {
            warn!("no build stage found; adding default Maven step");
            steps.push(BuildStep::Maven(command_task("Maven构建", DEFAULT_MAVEN_GOALS)));
            added.push(StepKind::Maven);
        }
        added.retain(StepKind::is_build_tool);
        (steps, added)
    }
}

/// The stage's own shell commands, one per line. `None` when it has none.
fn stage_commands(stage: &Stage) -> Option<String> {
    let commands: Vec<&str> = stage
        .steps
        .iter()
        .filter(|step| matches!(step.kind, StepKind::Sh | StepKind::Script))
        .map(|step| step.command.trim())
        .filter(|command| !command.is_empty())
        .collect();
    (!commands.is_empty()).then(|| commands.join("\n"))
}

fn tool_step(tool: StepKind, stage: &Stage) -> BuildStep {
    match tool {
        StepKind::Maven => {
            let command = stage
                .steps
                .iter()
                .find(|step| step_tool(step) == StepKind::Maven && !step.command.trim().is_empty())
                .map_or(DEFAULT_MAVEN_GOALS, |step| step.command.trim());
            BuildStep::Maven(command_task("Maven构建", command))
        }
        StepKind::Gradle => BuildStep::Gradle(command_task("Gradle构建", GRADLE_COMMAND)),
        StepKind::Npm => BuildStep::Npm(command_task("NPM构建", NPM_COMMAND)),
        _ => BuildStep::Sh(command_task("Docker构建", DOCKER_COMMAND)),
    }
}

/// Upload path for the artifact-producing tools found.
///
/// ```
/// use codearts_migrate_core::StepKind;
/// use codearts_migrate_emit::{ALL_ARTIFACTS, NPM_ARTIFACTS, artifact_path};
///
/// assert_eq!(artifact_path(&[StepKind::Npm]), NPM_ARTIFACTS);
/// assert_eq!(artifact_path(&[StepKind::Maven, StepKind::Npm]), ALL_ARTIFACTS);
/// assert_eq!(artifact_path(&[]), ALL_ARTIFACTS);
/// ```
pub fn artifact_path(tools: &[StepKind]) -> &'static str {
    match tools {
        [StepKind::Maven] => MAVEN_ARTIFACTS,
        [StepKind::Gradle] => GRADLE_ARTIFACTS,
        [StepKind::Npm] => NPM_ARTIFACTS,
        _ => ALL_ARTIFACTS,
    }
}

fn build_params(model: &PipelineModel) -> Vec<BuildParam> {
    let mut params: Vec<BuildParam> = model
        .parameters
        .iter()
        .map(|parameter| BuildParam::new(&parameter.name, &parameter.value, &parameter.description))
        .collect();
    let required = [
        ("GitBranch", DEFAULT_TARGET_BRANCH, "Git分支名称"),
        ("AppName", "", "应用名称"),
    ];
    for (name, value, description) in required {
        if !params.iter().any(|param| param.name == name) {
            params.push(BuildParam::new(name, value, description));
        }
    }
    params
}

/// Best available Git URL for the checkout step.
fn git_url(model: &PipelineModel) -> String {
    if let Some(scm) = model.scm.as_ref().filter(|scm| !scm.url.is_empty()) {
        return scm.url.clone();
    }
    if let Some(xml) = model.raw_xml.as_deref() {
        if let Some(found) = PATTERNS.xml_url.captures(xml) {
            debug!("Git URL taken from raw XML");
            return found[1].trim().to_string();
        }
        if let Some(url) = xml_tree_url(xml) {
            return url;
        }
    }
    for step in &model.build_steps {
        if step.kind == StepKind::Checkout {
            if let Some(url) = step.url.as_ref().filter(|url| !url.is_empty()) {
                return url.clone();
            }
        }
        if let Some(found) = PATTERNS.git_clone.captures(&step.command) {
            return found[1].to_string();
        }
    }
    warn!(url = PLACEHOLDER_GIT_URL, "no Git URL found; using placeholder");
    PLACEHOLDER_GIT_URL.to_string()
}

fn xml_tree_url(xml: &str) -> Option<String> {
    let document = match flatten_document(xml) {
        Ok(document) => document,
        Err(err) => {
            debug!(error = %err, "raw XML does not parse");
            return None;
        }
    };
    find_all(&document, "url")
        .into_iter()
        .flat_map(as_list)
        .filter_map(|value| value.as_str())
        .map(str::trim)
        .find(|url| url.contains("git") || url.contains("http"))
        .map(str::to_string)
}
