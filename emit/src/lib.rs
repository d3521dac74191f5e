//! CodeArts document emission from a normalized Jenkins pipeline model.
//!
//! Two emitters read a [`PipelineModel`](codearts_migrate_core::PipelineModel)
//! without modifying it:
//!
//! - [`StageJobEmitter`] writes a pipeline document with an `env` section and
//!   one job per stage.
//! - [`BuildTaskEmitter`] writes a build task with a checkout step, tool
//!   steps and an artifact upload.
//!
//! Their behavior is steered by a [`MappingConfig`] and a [`TemplateStore`].
//!
//! # Example
//!
//! ```
//! use codearts_migrate_core::{PipelineModel, Stage, Step};
//! use codearts_migrate_emit::{MappingConfig, Emitters};
//!
//! let mut model = PipelineModel::new("demo");
//! model.stages.push(Stage::new("Build").with_step(Step::sh("mvn clean package")));
//!
//! let emitters = Emitters::from_config(&MappingConfig::default());
//! let pipeline = emitters.jobs.to_yaml(&model).unwrap();
//! let build = emitters.build.to_yaml(&model).unwrap();
//! assert!(pipeline.contains("CodeArtsBuild"));
//! assert!(build.contains("upload_artifact"));
//! ```

mod build;
mod condition;
mod config;
mod error;
mod job;
mod naming;
mod template;

use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

pub use build::{
    ALL_ARTIFACTS, BuildDocument, BuildParam, BuildPhases, BuildStep, BuildTaskEmitter,
    CheckoutInputs, CheckoutTask, CommandInputs, CommandTask, GRADLE_ARTIFACTS, MAVEN_ARTIFACTS,
    NPM_ARTIFACTS, PLACEHOLDER_GIT_URL, UploadInputs, UploadTask, artifact_path,
};
pub use condition::convert_condition;
pub use config::{BuildMapping, MappingConfig, PipelineMapping, StageMapping};
pub use error::{EmitError, Result};
pub use job::{Job, PipelineDocument, StageJobEmitter};
pub use naming::{camel_case, job_id};
pub use template::{TEMPLATE_NAMES, TemplateSource, TemplateStore};

/// Both emitters configured from one [`MappingConfig`].
#[derive(Debug, Clone)]
pub struct Emitters {
    pub jobs: StageJobEmitter,
    pub build: BuildTaskEmitter,
}

impl Emitters {
    pub fn from_config(config: &MappingConfig) -> Self {
        let templates = match &config.templates_dir {
            Some(dir) => TemplateStore::from_dir(dir),
            None => TemplateStore::builtin(),
        };
        Self {
            jobs: StageJobEmitter::new(config.pipeline.clone(), templates),
            build: BuildTaskEmitter::new(config.build.clone()),
        }
    }
}

/// Serializes `document` as YAML into `path`.
///
/// # Errors
///
/// Returns [`EmitError::IoError`] if the file cannot be written, or
/// [`EmitError::YamlError`] if serialization fails.
pub fn write_yaml<T: Serialize>(document: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_yaml::to_writer(&mut writer, document)?;
    writer.flush()?;
    info!(path = %path.display(), "wrote YAML document");
    Ok(())
}
