//! Jenkins API structure extraction.
//!
//! The fetcher assembles one JSON document per job whatever endpoint answered
//! (`wfapi/describe`, Blue Ocean nodes, inline script, freestyle XML). It is
//! deserialized once into [`PipelineStructure`]; everything after that works
//! on typed fields.

use std::path::Path;

use codearts_migrate_core::{
    DEFAULT_SCM_BRANCH, Parameter, PipelineModel, ProjectKind, Scm, Stage, Step, StepKind,
    classify, classify_step,
};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::build_steps::{default_maven_step, derive_build_steps};
use crate::command::{clean_log, command_from_fields, command_from_log, plain};
use crate::dsl::DslExtractor;
use crate::error::Result;
use crate::options::ExtractOptions;
use crate::xml::{XmlExtractor, parse_properties};

/// Typed view of a fetched pipeline structure document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineStructure {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "_class", deserialize_with = "null_as_default")]
    pub class: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parameters: Vec<ParameterRecord>,
    #[serde(alias = "property", deserialize_with = "null_as_default")]
    pub properties: Vec<PropertyRecord>,
    #[serde(deserialize_with = "null_as_default")]
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "default", alias = "defaultValue")]
    pub value: Value,
    /// Jenkins' `defaultParameterValue` object; its `value` wins over
    /// `value` when present.
    #[serde(
        rename = "defaultParameterValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_parameter_value: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

impl ParameterRecord {
    /// The default value, preferring `defaultParameterValue.value`.
    pub fn default_value(&self) -> String {
        self.default_parameter_value
            .as_ref()
            .and_then(|value| value.get("value"))
            .filter(|value| !value.is_null())
            .map_or_else(|| plain(&self.value), plain)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyRecord {
    #[serde(rename = "_class", deserialize_with = "null_as_default")]
    pub class: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parameter_definitions: Vec<ParameterRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<EnvInjectInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvInjectInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub properties_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub steps: Vec<StepRecord>,
}

/// One step as reported by the API: a name, maybe a console log, maybe a
/// declared type, and whatever command-bearing fields the endpoint supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Reads `null` as the field's default. Jenkins sends `null` for unset
/// names and descriptions.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PipelineStructure {
    /// Converts a raw structure document into its typed form.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError`](crate::ExtractError::JsonError) when a known
    /// field has an incompatible shape.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// `true` when `_class` names a freestyle project or is absent.
    pub fn is_freestyle(&self) -> bool {
        self.class.is_empty() || self.class.contains("FreeStyleProject")
    }

    fn script(&self) -> Option<&str> {
        self.script.as_deref().filter(|script| !script.trim().is_empty())
    }

    /// Parameters from the top-level list followed by property definitions.
    fn parameters(&self) -> Vec<Parameter> {
        self.parameters
            .iter()
            .chain(
                self.properties
                    .iter()
                    .flat_map(|property| property.parameter_definitions.iter()),
            )
            .filter(|record| !record.name.is_empty())
            .map(|record| {
                Parameter::new(&record.name, record.default_value())
                    .with_description(&record.description)
            })
            .collect()
    }

    /// Environment injected through EnvInject job properties.
    fn environment(&self) -> IndexMap<String, String> {
        self.properties
            .iter()
            .filter(|property| property.class.contains("EnvInjectJobProperty"))
            .filter_map(|property| property.info.as_ref())
            .flat_map(|info| parse_properties(&info.properties_content))
            .collect()
    }
}

/// Extracts a [`PipelineModel`] from a fetched [`PipelineStructure`].
///
/// # Examples
///
/// ```
/// use codearts_migrate_core::StepKind;
/// use codearts_migrate_extract::{ApiExtractor, ExtractOptions};
///
/// let json = r#"{
///     "name": "shop",
///     "_class": "org.jenkinsci.plugins.workflow.job.WorkflowJob",
///     "stages": [{"name": "Build", "steps": [{"name": "Shell Script", "log": "+ mvn -B package\n"}]}]
/// }"#;
/// let model = ApiExtractor::new(ExtractOptions::default()).extract_str(json).unwrap();
///
/// assert_eq!(model.stages[0].steps[0].kind, StepKind::Maven);
/// assert_eq!(model.stages[0].steps[0].command, "mvn -B package");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ApiExtractor {
    options: ExtractOptions,
    dsl: DslExtractor,
    xml: XmlExtractor,
}

impl ApiExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            dsl: DslExtractor::new(options.clone()),
            xml: XmlExtractor::new(options.clone()),
            options,
        }
    }

    /// Reads a structure document previously dumped to disk.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::ExtractError::IoError) or
    /// [`JsonError`](crate::ExtractError::JsonError).
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<PipelineModel> {
        let json = std::fs::read_to_string(path)?;
        self.extract_str(&json)
    }

    /// Parses and extracts a structure document.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError`](crate::ExtractError::JsonError) for invalid JSON.
    pub fn extract_str(&self, json: &str) -> Result<PipelineModel> {
        let value: Value = serde_json::from_str(json)?;
        self.extract_value(value)
    }

    /// Extracts from an untyped structure document.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError`](crate::ExtractError::JsonError) when the
    /// document does not have the structure's shape.
    pub fn extract_value(&self, value: Value) -> Result<PipelineModel> {
        let structure = PipelineStructure::from_value(value)?;
        Ok(self.extract(&structure))
    }

    pub fn extract(&self, structure: &PipelineStructure) -> PipelineModel {
        info!(name = %structure.name, class = %structure.class, "extracting API structure");
        let mut model = if structure.is_freestyle() {
            self.freestyle(structure)
        } else {
            self.pipeline(structure)
        };

        if !structure.name.is_empty() {
            model.name = structure.name.clone();
        }
        for parameter in structure.parameters() {
            model.add_parameter(parameter);
        }
        for (name, value) in structure.environment() {
            model.environment.entry(name).or_insert(value);
        }
        model
    }

    fn pipeline(&self, structure: &PipelineStructure) -> PipelineModel {
        if structure.stages.is_empty() {
            if let Some(script) = structure.script() {
                debug!("structure has no stages; reading its pipeline script");
                return self.dsl.extract(script);
            }
            warn!("pipeline structure has neither stages nor script");
        }

        let mut model = PipelineModel::default();
        model.stages = structure
            .stages
            .iter()
            .map(|stage| self.convert_stage(stage))
            .collect();
        if let Some(script) = structure.script() {
            let scripted = self.dsl.extract(script);
            model.environment = scripted.environment;
            model.agent = scripted.agent;
            model.scm = scripted.scm;
        }
        model.build_steps = derive_build_steps(&model.stages, &self.options.build_keywords);
        model
    }

    fn convert_stage(&self, record: &StageRecord) -> Stage {
        let mut stage = Stage::new(&record.name);
        stage.steps = record
            .steps
            .iter()
            .map(|step| self.convert_step(step))
            .collect();
        stage
    }

    fn convert_step(&self, record: &StepRecord) -> Step {
        let log = record
            .log
            .as_deref()
            .map(|raw| clean_log(raw, self.options.log_limit))
            .unwrap_or_default();
        let kind = match record.kind.as_deref() {
            Some(label) => kind_from_label(label),
            None => classify_step(&record.name, &log),
        };
        let command = command_from_fields(&record.fields).unwrap_or_else(|| command_from_log(&log));
        Step::new(&record.name, kind, command)
    }

    fn freestyle(&self, structure: &PipelineStructure) -> PipelineModel {
        if let Some(xml) = structure.xml_content.as_deref().filter(|xml| !xml.trim().is_empty()) {
            return self.xml.extract(xml);
        }

        debug!("freestyle structure without XML; using reported stages");
        let mut model = PipelineModel::default();
        model.kind = ProjectKind::Freestyle;

        let mut build_steps = Vec::new();
        if let Some(url) = structure.git_url.as_deref().filter(|url| !url.is_empty()) {
            let scm = Scm::new(url, DEFAULT_SCM_BRANCH);
            build_steps.push(Step::git_checkout(&scm.url, &scm.branch).in_stage("Checkout"));
            model.scm = Some(scm);
        }

        for record in &structure.stages {
            let mut stage = self.convert_stage(record);
            for step in &mut stage.steps {
                step.stage = Some(stage.name.clone());
            }
            if !matches!(stage.name.as_str(), "Deploy") {
                build_steps.extend(stage.steps.iter().cloned());
            }
            model.stages.push(stage);
        }
        if !build_steps.iter().any(|step| step.kind == StepKind::Maven) {
            build_steps.push(default_maven_step());
        }
        model.build_steps = build_steps;
        model
    }
}

/// Maps a declared step type such as `sh`, `shell` or `Deploy` to a kind.
fn kind_from_label(label: &str) -> StepKind {
    let lowered = label.trim().to_lowercase();
    serde_json::from_value(Value::String(lowered.clone())).unwrap_or_else(|_| classify(&lowered))
}
