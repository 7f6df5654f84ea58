//! Revision sources.
//!
//! A [`RevisionSource`] answers two questions for a project environment:
//! what is the deployable head ([`RevisionSource::latest`]) and what is
//! running on a given host ([`RevisionSource::latest_deployed`]).
//!
//! | Variant            | `latest`                         | `latest_deployed`            |
//! |--------------------|----------------------------------|------------------------------|
//! | [`LedgerSource`]   | GitHub commits API, branch head  | `git rev-parse HEAD` via ssh |
//! | [`RegistrySource`] | registry v1 token → tag → image  | `docker inspect` via ssh     |
//!
//! The variant is picked once at construction time from configuration.

mod image;
mod ledger;
mod registry;

pub use image::ImageName;
pub use ledger::LedgerSource;
pub use registry::{ImageManifest, RegistrySource};

use async_trait::async_trait;
use shipdeck_common::{Environment, Project, Revision};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::errors::RevisionError;

/// Result of one lookup.
///
/// `source` is the revision in the source code repository that `revision`
/// was built from. The two are equal for git-backed sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub revision: Revision,
    pub source: Revision,
}

impl Resolved {
    /// A revision that is its own source.
    pub fn same(revision: Revision) -> Self {
        Self {
            source: revision.clone(),
            revision,
        }
    }
}

#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// The deployable head of `env` (branch head or tagged image).
    async fn latest(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError>;

    /// What is currently deployed on `host` for `env`.
    async fn latest_deployed(
        &self,
        cancel: &CancellationToken,
        host: &str,
        project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError>;

    /// Human-readable page describing `rev`, or empty when there is none.
    fn revision_url(&self, project: &Project, rev: &Revision) -> String;

    /// Page comparing two source revisions, empty when there is nothing to show.
    fn source_diff_url(&self, project: &Project, from: &Revision, to: &Revision) -> String {
        compare_url(project, from, to)
    }
}

/// GitHub compare link between two source revisions.
///
/// Empty when the revisions are equal or either side is unknown.
pub fn compare_url(project: &Project, from: &Revision, to: &Revision) -> String {
    if from == to || from.is_unknown() || to.is_unknown() {
        return String::new();
    }
    format!("{}/compare/{}...{}", project.github_url(), from, to)
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, RevisionError>>,
) -> Result<T, RevisionError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RevisionError::Cancelled),
        result = fut => result,
    }
}
