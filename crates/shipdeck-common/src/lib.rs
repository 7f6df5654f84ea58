//! Shared domain types for shipdeck.
//!
//! - [`Revision`]: opaque identifier of a deployable unit, with an "unknown" sentinel
//! - [`Project`] / [`Environment`]: the configured deploy topology

pub mod project;
pub mod revision;

pub use project::{Environment, Project, SourceRepo, project_from_name};
pub use revision::Revision;
