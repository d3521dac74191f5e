//! Pipeline model type definitions.
//!
//! Every extractor produces a [`PipelineModel`] and every emitter consumes
//! one. The types serialize with [`serde`] so the model can be dumped as JSON
//! for inspection and read back.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Branch assumed for a Jenkins SCM block that names no branch.
pub const DEFAULT_SCM_BRANCH: &str = "master";

/// Branch assumed on the CodeArts side when nothing else is known.
pub const DEFAULT_TARGET_BRANCH: &str = "main";

/// Maven goals used when a build has to be synthesized.
pub const DEFAULT_MAVEN_GOALS: &str = "clean package -Dmaven.test.skip=true";

/// Gradle tasks of a generated Gradle build step.
pub const GRADLE_COMMAND: &str = "clean build -x test";

/// npm arguments of a generated npm build step.
pub const NPM_COMMAND: &str = "install && npm run build";

/// Command of a generated Docker image build.
pub const DOCKER_COMMAND: &str = "docker build -t ${IMAGE_NAME}:${IMAGE_TAG} .";

/// Kind of Jenkins project a model was extracted from.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::ProjectKind;
///
/// assert_eq!(ProjectKind::default(), ProjectKind::Pipeline);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    /// Script-based pipeline (Jenkinsfile or workflow job).
    #[default]
    Pipeline,
    /// Legacy freestyle project described by `config.xml`.
    Freestyle,
}

/// Category tag of a [`Step`].
///
/// Serialized in lowercase. `git` is accepted as an alias for
/// [`StepKind::Checkout`] when reading.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::StepKind;
///
/// let kind: StepKind = serde_json::from_str("\"git\"").unwrap();
/// assert_eq!(kind, StepKind::Checkout);
/// assert_eq!(StepKind::Maven.to_string(), "maven");
/// assert!(StepKind::Npm.is_build_tool());
/// assert!(!StepKind::Docker.is_build_tool());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Generic shell command (the fallback category).
    #[default]
    Sh,
    Echo,
    #[serde(alias = "git")]
    Checkout,
    Maven,
    Gradle,
    Npm,
    Docker,
    Sonar,
    Deploy,
    Ssh,
    /// Free-form `script { }` block; `command` holds the block content.
    Script,
    Unknown,
}

impl StepKind {
    /// Lowercase tag as written in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Echo => "echo",
            Self::Checkout => "checkout",
            Self::Maven => "maven",
            Self::Gradle => "gradle",
            Self::Npm => "npm",
            Self::Docker => "docker",
            Self::Sonar => "sonar",
            Self::Deploy => "deploy",
            Self::Ssh => "ssh",
            Self::Script => "script",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` for tools that produce a packaged artifact.
    pub fn is_build_tool(&self) -> bool {
        matches!(self, Self::Maven | Self::Gradle | Self::Npm)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a pipeline parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    String,
    Boolean,
    Choice,
    Text,
    Password,
}

/// A pipeline parameter.
///
/// The value is always a string: booleans are stringified and a choice
/// parameter takes its first choice as value.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{Parameter, ParameterKind};
///
/// let p = Parameter::choice("ENV", vec!["dev".into(), "prod".into()]);
/// assert_eq!(p.value, "dev");
/// assert_eq!(p.kind, Some(ParameterKind::Choice));
///
/// let flag = Parameter::boolean("SKIP_TESTS", true).with_description("skip");
/// assert_eq!(flag.value, "true");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default, alias = "default", alias = "defaultValue")]
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParameterKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl Parameter {
    /// Creates an untyped parameter with an empty description.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: String::new(),
            kind: None,
            choices: Vec::new(),
        }
    }

    /// Creates a `string` parameter.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value).with_kind(ParameterKind::String)
    }

    /// Creates a `booleanParam` with its default stringified.
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, value.to_string()).with_kind(ParameterKind::Boolean)
    }

    /// Creates a `choice` parameter whose value is the first choice.
    pub fn choice(name: impl Into<String>, choices: Vec<String>) -> Self {
        let value = choices.first().cloned().unwrap_or_default();
        Self {
            choices,
            ..Self::new(name, value).with_kind(ParameterKind::Choice)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Execution environment requested by the pipeline.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::Agent;
///
/// let agent = Agent::Docker { image: "maven:3.9".into() };
/// let json = serde_json::to_string(&agent).unwrap();
/// assert_eq!(json, r#"{"type":"docker","image":"maven:3.9"}"#);
/// assert_eq!(Agent::default(), Agent::Any);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Agent {
    /// Any available executor (also used for `agent none`).
    #[default]
    Any,
    /// A node selected by label.
    Node { label: String },
    /// A docker container image.
    Docker { image: String },
    /// A Kubernetes pod template.
    Kubernetes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        yaml: Option<String>,
    },
}

/// Source-control origin of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scm {
    pub url: String,
    pub branch: String,
}

impl Scm {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
        }
    }
}

/// A single unit of work inside a [`Stage`].
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{Step, StepKind};
///
/// let step = Step::sh("mvn clean package").in_stage("Build");
/// assert_eq!(step.kind, StepKind::Sh);
/// assert_eq!(step.command, "mvn clean package");
/// assert_eq!(step.stage.as_deref(), Some("Build"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    #[serde(default)]
    pub command: String,
    /// Owning stage name, set on flattened copies such as build steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command: command.into(),
            stage: None,
            url: None,
            branch: None,
            credentials: None,
        }
    }

    /// Creates a `sh` step named "Shell Command".
    pub fn sh(command: impl Into<String>) -> Self {
        Self::new("Shell Command", StepKind::Sh, command)
    }

    /// Creates an `echo` step named "Echo Message".
    pub fn echo(message: impl Into<String>) -> Self {
        Self::new("Echo Message", StepKind::Echo, message)
    }

    /// Creates a checkout step that clones `url` at `branch`.
    ///
    /// ```
    /// use codearts_migrate_core::Step;
    ///
    /// let step = Step::git_checkout("https://example.com/repo.git", "dev");
    /// assert_eq!(step.command, "git clone -b dev https://example.com/repo.git");
    /// assert_eq!(step.url.as_deref(), Some("https://example.com/repo.git"));
    /// ```
    pub fn git_checkout(url: impl Into<String>, branch: impl Into<String>) -> Self {
        let url = url.into();
        let branch = branch.into();
        let command = format!("git clone -b {branch} {url}");
        Self {
            url: Some(url),
            branch: Some(branch),
            ..Self::new("Git Checkout", StepKind::Checkout, command)
        }
    }

    pub fn in_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }
}

/// A named, ordered phase of the pipeline. Owns its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    /// Normalized source text of the stage's `when` condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parallel: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            environment: IndexMap::new(),
            when: None,
            parallel: false,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the first non-empty command of a `sh` or `script` step.
    ///
    /// ```
    /// use codearts_migrate_core::{Stage, Step};
    ///
    /// let stage = Stage::new("Test")
    ///     .with_step(Step::echo("starting"))
    ///     .with_step(Step::sh("make test"));
    /// assert_eq!(stage.first_command(), Some("make test"));
    /// ```
    pub fn first_command(&self) -> Option<&str> {
        use StepKind::*;
        self.steps
            .iter()
            .filter(|step| !matches!(step.kind, Echo | Checkout | Unknown))
            .map(|step| step.command.trim())
            .find(|command| !command.is_empty())
    }
}

/// Normalized, source-independent representation of a parsed pipeline.
///
/// Built once per run by an extractor and handed read-only to emitters.
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::{Parameter, PipelineModel, Stage, Step};
///
/// let mut model = PipelineModel::new("demo");
/// model.add_parameter(Parameter::string("BRANCH", "main"));
/// model.add_parameter(Parameter::string("BRANCH", "dev"));
/// model.stages.push(Stage::new("Build").with_step(Step::sh("make")));
///
/// assert_eq!(model.parameters.len(), 1);
/// assert_eq!(model.parameters[0].value, "dev");
/// assert_eq!(model.stage("Build").map(|s| s.steps.len()), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineModel {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ProjectKind,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub agent: Agent,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub build_steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scm: Option<Scm>,
    /// Original XML document, kept only for XML sources. Never dumped.
    #[serde(default, skip_serializing)]
    pub raw_xml: Option<String>,
}

impl PipelineModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Inserts a parameter, replacing an existing one with the same name in
    /// place.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        match self
            .parameters
            .iter_mut()
            .find(|existing| existing.name == parameter.name)
        {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Finds the first stage with the given name.
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Iterates over every step of every stage, in order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.stages.iter().flat_map(|stage| stage.steps.iter())
    }

    /// Returns `true` when nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
            && self.parameters.is_empty()
            && self.environment.is_empty()
            && self.build_steps.is_empty()
            && self.scm.is_none()
    }

    /// Serializes the model as pretty JSON for debugging.
    ///
    /// `raw_xml` is left out of the dump.
    ///
    /// ```
    /// use codearts_migrate_core::{PipelineModel, Stage};
    ///
    /// let mut model = PipelineModel::new("demo");
    /// model.stages.push(Stage::new("Build"));
    /// model.raw_xml = Some("<project/>".into());
    ///
    /// let json = model.to_debug_json().unwrap();
    /// assert!(!json.contains("<project/>"));
    /// let back = PipelineModel::from_debug_json(&json).unwrap();
    /// assert_eq!(back.stages.len(), 1);
    /// assert!(back.raw_xml.is_none());
    /// ```
    pub fn to_debug_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Reads a model back from its debug JSON form.
    pub fn from_debug_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_parameter_last_write_wins_keeps_position() {
        let mut model = PipelineModel::new("p");
        model.add_parameter(Parameter::string("A", "1"));
        model.add_parameter(Parameter::string("B", "2"));
        model.add_parameter(Parameter::string("A", "3").with_description("again"));

        let names: Vec<_> = model.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(model.parameters[0].value, "3");
        assert_eq!(model.parameters[0].description, "again");
    }

    #[test]
    fn test_parameter_accepts_default_alias() {
        let p: Parameter =
            serde_json::from_str(r#"{"name":"X","default":"y","description":"d"}"#).unwrap();
        assert_eq!(p.value, "y");
        let p: Parameter = serde_json::from_str(r#"{"name":"X","defaultValue":"z"}"#).unwrap();
        assert_eq!(p.value, "z");
    }

    #[test]
    fn test_debug_json_uses_camel_case_keys() {
        let mut model = PipelineModel::new("p");
        model.build_steps.push(Step::sh("make").in_stage("Build"));
        let json = model.to_debug_json().unwrap();
        assert!(json.contains("\"buildSteps\""));
        assert!(json.contains("\"type\": \"pipeline\""));
    }

    #[test]
    fn test_stage_first_command_skips_echo_and_empty() {
        let stage = Stage::new("Deploy")
            .with_step(Step::echo("deploying"))
            .with_step(Step::sh("   "))
            .with_step(Step::new("Script", StepKind::Script, "def x = 1"));
        assert_eq!(stage.first_command(), Some("def x = 1"));
        assert_eq!(Stage::new("Empty").first_command(), None);
    }

    #[test]
    fn test_kubernetes_agent_round_trip() {
        let agent = Agent::Kubernetes {
            label: Some("builder".into()),
            yaml: None,
        };
        let json = serde_json::to_string(&agent).unwrap();
        assert_eq!(json, r#"{"type":"kubernetes","label":"builder"}"#);
        let back: Agent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, agent);
    }

    #[test]
    fn test_is_empty() {
        let mut model = PipelineModel::new("named but empty");
        assert!(model.is_empty());
        model.environment.insert("A".into(), "b".into());
        assert!(!model.is_empty());
    }
}
