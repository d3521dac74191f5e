//! Mapping tables that steer the emitters.
//!
//! Both emitters decide what to produce for a stage by matching its name
//! against configured lists. The tables ship with built-in defaults and can
//! be overridden from a YAML (or JSON) file.
//!
//! # Example YAML
//!
//! ```yaml
//! pipeline:
//!   ignore_stages: [Cleanup]
//!   sh_stages: [Notify]
//!   stages:
//!     - jenkins_stage: SonarQube Scan
//!       template: code_check
//!       params:
//!         language: python
//!   keywords:
//!     code_check: [sonar, 代码检查]
//!     build: [build, 构建]
//!     deploy: [deploy, 部署]
//! build:
//!   maven_stages: [build, maven]
//!   gradle_stages: [gradle]
//!   npm_stages: [npm, frontend]
//!   docker_stages: [docker, image]
//!   sh_stages: []
//!   ignore_stages: [checkout]
//! templates_dir: templates
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An exact stage-name entry of the pipeline mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMapping {
    pub jenkins_stage: String,
    pub template: String,
    /// Values substituted into the template, after derived values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
}

/// Mapping used by the Stage-to-Job emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineMapping {
    /// Stage names that produce no job (exact match).
    pub ignore_stages: Vec<String>,
    /// Stage names forced to a single placeholder shell step (exact match).
    pub sh_stages: Vec<String>,
    /// Exact stage-name entries, tried before keywords.
    pub stages: Vec<StageMapping>,
    /// Template name to lowercase keywords, tried in order.
    pub keywords: IndexMap<String, Vec<String>>,
}

impl Default for PipelineMapping {
    fn default() -> Self {
        let keywords = [
            ("code_check", &["sonar", "代码检查", "静态检查", "code check", "lint"][..]),
            ("build", &["build", "编译", "构建", "compile", "package", "打包"][..]),
            ("deploy", &["deploy", "部署", "发布", "release"][..]),
        ]
        .into_iter()
        .map(|(template, words)| (template.to_string(), strings(words)))
        .collect();
        Self {
            ignore_stages: Vec::new(),
            sh_stages: Vec::new(),
            stages: Vec::new(),
            keywords,
        }
    }
}

impl PipelineMapping {
    /// Resolves the template for a stage: exact entry first, then the first
    /// keyword table whose keyword occurs in the lowercased name.
    ///
    /// Returns the template name and the entry's explicit parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use codearts_migrate_emit::PipelineMapping;
    ///
    /// let mapping = PipelineMapping::default();
    /// let (template, params) = mapping.template_for("SonarQube Scan").unwrap();
    /// assert_eq!(template, "code_check");
    /// assert!(params.is_empty());
    /// assert!(mapping.template_for("Unit Test").is_none());
    /// ```
    pub fn template_for(&self, stage: &str) -> Option<(&str, IndexMap<String, String>)> {
        if let Some(entry) = self.stages.iter().find(|entry| entry.jenkins_stage == stage) {
            return Some((entry.template.as_str(), entry.params.clone()));
        }
        let lowered = stage.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, words)| words.iter().any(|word| lowered.contains(&word.to_lowercase())))
            .map(|(template, _)| (template.as_str(), IndexMap::new()))
    }

    pub fn is_ignored(&self, stage: &str) -> bool {
        self.ignore_stages.iter().any(|name| name == stage)
    }

    pub fn is_sh_stage(&self, stage: &str) -> bool {
        self.sh_stages.iter().any(|name| name == stage)
    }
}

/// Stage-name keyword lists used by the Build-Task emitter.
///
/// Matching is a case-insensitive substring test. Lists are consulted in
/// field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildMapping {
    pub maven_stages: Vec<String>,
    pub gradle_stages: Vec<String>,
    pub npm_stages: Vec<String>,
    pub docker_stages: Vec<String>,
    pub sh_stages: Vec<String>,
    pub ignore_stages: Vec<String>,
}

impl Default for BuildMapping {
    fn default() -> Self {
        Self {
            maven_stages: strings(&["maven", "build", "compile", "编译", "构建", "打包"]),
            gradle_stages: strings(&["gradle"]),
            npm_stages: strings(&["npm", "node", "frontend", "前端"]),
            docker_stages: strings(&["docker", "image", "镜像"]),
            sh_stages: strings(&["script", "shell", "脚本"]),
            ignore_stages: strings(&["checkout", "scm", "代码下载", "拉取代码"]),
        }
    }
}

impl BuildMapping {
    /// Returns `true` when `stage` contains any entry of `list`, ignoring case.
    ///
    /// ```
    /// use codearts_migrate_emit::BuildMapping;
    ///
    /// let mapping = BuildMapping::default();
    /// assert!(BuildMapping::matches(&mapping.maven_stages, "Maven Build"));
    /// assert!(!BuildMapping::matches(&mapping.maven_stages, "Deploy"));
    /// ```
    pub fn matches(list: &[String], stage: &str) -> bool {
        let lowered = stage.to_lowercase();
        list.iter().any(|entry| lowered.contains(&entry.to_lowercase()))
    }

    pub fn is_ignored(&self, stage: &str) -> bool {
        Self::matches(&self.ignore_stages, stage)
    }
}

/// Full mapping configuration for both emitters.
///
/// # Examples
///
/// ```no_run
/// use codearts_migrate_emit::MappingConfig;
///
/// let config = MappingConfig::load("mapping.yaml").unwrap();
/// println!("{} ignored stages", config.pipeline.ignore_stages.len());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub pipeline: PipelineMapping,
    pub build: BuildMapping,
    /// Directory of template overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl MappingConfig {
    /// Loads the configuration from a YAML file, or a JSON file when the
    /// extension is `.json`. Missing sections keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::EmitError::IoError) if the file cannot be
    /// read, or [`YamlError`](crate::EmitError::YamlError) /
    /// [`JsonError`](crate::EmitError::JsonError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            serde_json::from_reader(reader)?
        } else {
            serde_yaml::from_reader(reader)?
        };
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::EmitError::IoError) if the file cannot be
    /// written, or [`YamlError`](crate::EmitError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
