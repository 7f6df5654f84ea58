//! Deployment status snapshots and the engine that builds them.

mod engine;

pub use engine::{LOCKED_CLAUSE, NO_PERMISSION_CLAUSE, ReconciliationEngine};

use serde::Serialize;
use shipdeck_common::Revision;

/// What one host is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub hostname: String,
    /// Unknown when the lookup failed.
    pub revision: Revision,
    pub short_revision: String,
    #[serde(rename = "revisionURL")]
    pub revision_url: String,
    pub source_code_revision: Revision,
    /// Link comparing this host with the environment head; empty when they match.
    #[serde(rename = "sourceCodeDiffURL")]
    pub source_code_diff_url: String,
}

/// One environment of a project: its deployable head, lock state and hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentStatus {
    pub name: String,
    pub latest_deployable: Revision,
    pub short_latest_deployable: String,
    pub source_code_revision: Revision,
    pub comment: String,
    pub is_locked: bool,
    pub deployments: Vec<HostStatus>,
}

impl EnvironmentStatus {
    /// True when some host is not running the deployable head.
    pub fn deployable(&self) -> bool {
        self.deployments
            .iter()
            .any(|d| d.revision != self.latest_deployable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub name: String,
    #[serde(rename = "githubURL")]
    pub github_url: String,
    pub environments: Vec<EnvironmentStatus>,
}
