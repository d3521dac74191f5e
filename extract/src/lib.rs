//! Extraction of Jenkins pipelines into the normalized
//! [`PipelineModel`](codearts_migrate_core::PipelineModel).
//!
//! Three heterogeneous sources share one output contract:
//!
//! - [`DslExtractor`]: Jenkinsfile (declarative pipeline) text.
//! - [`XmlExtractor`]: job `config.xml`, freestyle or pipeline.
//! - [`ApiExtractor`]: the JSON structure assembled by
//!   [`fetch_pipeline_structure`] from the Jenkins REST and Blue Ocean APIs.
//!
//! Extractors are forgiving: malformed or partial input degrades to a partial
//! model and a log entry. Only failure to read the input at all is an error.
//!
//! # Example
//!
//! ```
//! use codearts_migrate_extract::{ExtractOptions, Source, extract};
//!
//! let model = extract(
//!     Source::Jenkinsfile("pipeline { stages { stage('Lint') { steps { sh 'npm run lint' } } } }"),
//!     &ExtractOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(model.stages[0].name, "Lint");
//! ```

mod api;
mod build_steps;
mod command;
mod dsl;
mod error;
mod fetch;
mod options;
pub mod xml;

use codearts_migrate_core::PipelineModel;
use serde_json::Value;

pub use api::{
    ApiExtractor, EnvInjectInfo, ParameterRecord, PipelineStructure, PropertyRecord, StageRecord,
    StepRecord,
};
pub use build_steps::{default_maven_step, derive_build_steps};
pub use command::{TRUNCATION_MARKER, clean_log, command_from_fields, command_from_log};
pub use dsl::DslExtractor;
pub use error::{ExtractError, Result};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{Credentials, FetchOptions, JenkinsFetcher, fetch_pipeline_structure, normalize_job_path};
pub use options::{DEFAULT_BUILD_KEYWORDS, DEFAULT_LOG_LIMIT, ExtractOptions};
pub use xml::XmlExtractor;

/// An in-memory Jenkins source.
#[derive(Debug, Clone)]
pub enum Source<'a> {
    Jenkinsfile(&'a str),
    ConfigXml(&'a str),
    Structure(Value),
}

/// Extracts a model from any supported source.
///
/// # Errors
///
/// Only [`Source::Structure`] can fail, when the document does not have the
/// structure's shape.
pub fn extract(source: Source<'_>, options: &ExtractOptions) -> Result<PipelineModel> {
    match source {
        Source::Jenkinsfile(text) => Ok(DslExtractor::new(options.clone()).extract(text)),
        Source::ConfigXml(xml) => Ok(XmlExtractor::new(options.clone()).extract(xml)),
        Source::Structure(value) => ApiExtractor::new(options.clone()).extract_value(value),
    }
}
