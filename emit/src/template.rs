//! CodeArts step templates with a directory fallback chain.
//!
//! A template is a YAML mapping describing one job step. Lookups try, in
//! order: `{dir}/pipeline/{name}.yaml`, `{dir}/{name}.yaml`, then the
//! built-in snippet of the same name.
//!
//! ```
//! use codearts_migrate_emit::TemplateStore;
//!
//! let store = TemplateStore::builtin();
//! let build = store.load("build").unwrap();
//! assert_eq!(build["uses"], "CodeArtsBuild");
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{EmitError, Result};

/// Template keys every stage job can reference.
pub const TEMPLATE_NAMES: [&str; 4] = ["code_check", "build", "deploy", "shell"];

const CODE_CHECK: &str = r#"name: 代码检查
uses: CodeArtsCheck
with:
  jobId: '${{ env.codeCheckJobId }}'
  checkMode: full
  language: java
"#;

const BUILD: &str = r#"name: 编译构建
uses: CodeArtsBuild
with:
  tool: maven
  command: package
  artifactIdentifier: '${{ env.appName }}'
  skipTests: '${{ !env.unitTest }}'
"#;

const DEPLOY: &str = r#"name: 部署
uses: CodeArtsDeploy
with:
  cluster: '${{ env.deployEnv }}'
  namespace: default
  manifests: 'k8s/*.yaml'
"#;

const SHELL: &str = r#"name: 执行Shell
run: echo "执行Shell"
"#;

/// Where a [`TemplateStore`] resolves templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Built-in snippets only.
    Builtin,
    /// A directory of overrides, falling back to the built-in snippets.
    Directory(PathBuf),
}

/// Resolves named step templates.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    source: TemplateSource,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateStore {
    pub fn builtin() -> Self {
        Self {
            source: TemplateSource::Builtin,
        }
    }

    /// Resolves templates from `dir` before the built-in snippets.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: TemplateSource::Directory(dir.into()),
        }
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Loads the template called `name` as a YAML mapping.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::TemplateNotFound`] when no file and no built-in
    /// snippet exists, [`EmitError::YamlError`] when a file does not parse and
    /// [`EmitError::InvalidTemplate`] when it is not a mapping.
    pub fn load(&self, name: &str) -> Result<Mapping> {
        if let TemplateSource::Directory(dir) = &self.source {
            let candidates = [
                dir.join("pipeline").join(format!("{name}.yaml")),
                dir.join(format!("{name}.yaml")),
            ];
            if let Some(path) = candidates.iter().find(|path| path.is_file()) {
                debug!(template = name, path = %path.display(), "loading template file");
                let file = std::fs::File::open(path)?;
                let value: Value = serde_yaml::from_reader(BufReader::new(file))?;
                return into_mapping(name, value);
            }
        }

        let text = builtin_text(name).ok_or_else(|| EmitError::TemplateNotFound(name.to_string()))?;
        let value: Value = serde_yaml::from_str(text)?;
        into_mapping(name, value)
    }

    /// Writes every built-in snippet to `{dir}/pipeline/{name}.yaml` so it
    /// can be edited as an override.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::IoError`] if the directory or a file cannot be
    /// written.
    pub fn write_builtins(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let pipeline_dir = dir.as_ref().join("pipeline");
        std::fs::create_dir_all(&pipeline_dir)?;
        let mut written = Vec::new();
        for name in TEMPLATE_NAMES {
            let path = pipeline_dir.join(format!("{name}.yaml"));
            if let Some(text) = builtin_text(name) {
                std::fs::write(&path, text)?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

fn builtin_text(name: &str) -> Option<&'static str> {
    match name {
        "code_check" => Some(CODE_CHECK),
        "build" => Some(BUILD),
        "deploy" => Some(DEPLOY),
        "shell" => Some(SHELL),
        _ => None,
    }
}

fn into_mapping(name: &str, value: Value) -> Result<Mapping> {
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(EmitError::InvalidTemplate {
            name: name.to_string(),
            reason: format!("expected a mapping, found {}", kind_of(&other)),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
