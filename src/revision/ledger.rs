use async_trait::async_trait;
use shipdeck_common::{Environment, Project, Revision};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Resolved, RevisionSource, cancellable};
use crate::errors::RevisionError;
use crate::github::GitHubApi;
use crate::remote::RemoteExecutor;

/// Git-backed [`RevisionSource`]: branch heads come from GitHub, deployed
/// revisions from the checkout on each host.
///
/// A deploy target corresponds to exactly one GitHub repository, and the
/// repository owner may be a user or an organization.
pub struct LedgerSource {
    github: Arc<dyn GitHubApi>,
    remote: Arc<dyn RemoteExecutor>,
}

impl LedgerSource {
    pub fn new(github: Arc<dyn GitHubApi>, remote: Arc<dyn RemoteExecutor>) -> Self {
        Self { github, remote }
    }
}

/// Remote command printing the HEAD commit of the git directory at `repo_path`.
pub fn rev_parse_command(repo_path: &str) -> String {
    format!("git --git-dir={} rev-parse HEAD", repo_path)
}

#[async_trait]
impl RevisionSource for LedgerSource {
    async fn latest(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError> {
        let owner = project.source_owner();
        let repo = project.source_name();
        let commits = cancellable(cancel, async {
            self.github
                .list_commits(owner, repo, &env.branch)
                .await
                .map_err(|e| RevisionError::Upstream(format!("{:#}", e)))
        })
        .await
        .inspect_err(|e| tracing::error!(owner, repo, error = %e, "failed to get commits from GitHub"))?;

        let head = commits.into_iter().next().ok_or_else(|| {
            tracing::error!(owner, repo, branch = %env.branch, "no commits in branch");
            RevisionError::NotFound(format!("no commits in the branch {}", env.branch))
        })?;
        Ok(Resolved::same(Revision::new(head.sha)))
    }

    async fn latest_deployed(
        &self,
        cancel: &CancellationToken,
        host: &str,
        _project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError> {
        let buf = self
            .remote
            .output(cancel, host, &rev_parse_command(&env.repo_path))
            .await
            .inspect_err(|e| {
                tracing::error!(host, repo_path = %env.repo_path, error = %e,
                    "failed to get latest deployed commit")
            })?;
        let rev = String::from_utf8_lossy(&buf).trim().to_string();
        Ok(Resolved::same(Revision::new(rev)))
    }

    fn revision_url(&self, project: &Project, rev: &Revision) -> String {
        if rev.is_unknown() {
            return String::new();
        }
        format!("{}/commit/{}", project.github_url(), rev)
    }
}
