//! Core pipeline model and step classification.
//!
//! This crate defines the normalized representation that every Jenkins
//! source is extracted into and every CodeArts document is emitted from:
//!
//! - [`PipelineModel`]: name, parameters, environment, agent, ordered
//!   stages, flattened build steps, SCM origin and (for XML sources) the raw
//!   document.
//! - [`Stage`]: a named phase that owns its [`Step`]s.
//! - [`Step`]: one unit of work tagged with a [`StepKind`].
//!
//! Classification ([`classify`], [`classify_step`], [`build_tool_of`]) maps
//! free text onto a [`StepKind`] through the single ordered table
//! [`CLASSIFICATION_ORDER`].
//!
//! # Example
//!
//! ```
//! use codearts_migrate_core::*;
//!
//! let mut model = PipelineModel::new("shop-api");
//! model.stages.push(
//!     Stage::new("Build").with_step(Step::sh("mvn -B clean package")),
//! );
//!
//! let step = &model.stages[0].steps[0];
//! assert_eq!(step.kind, StepKind::Sh);
//! assert_eq!(build_tool_of(&step.command), StepKind::Maven);
//! ```

mod classify;
mod model;

pub use classify::{CLASSIFICATION_ORDER, CategoryRule, build_tool_of, classify, classify_step};
pub use model::*;
