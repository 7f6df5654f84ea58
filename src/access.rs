//! Per-repository permission checks.

use async_trait::async_trait;
use shipdeck_common::Project;
use std::sync::Arc;

use crate::github::GitHubApi;

/// Answers read/deploy permission queries for a (repository, user) pair.
///
/// Implementations never fail: an error reaching the authority counts as a
/// denial.
#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn readable(&self, owner: &str, repo: &str, user: &str) -> bool;
    async fn deployable(&self, owner: &str, repo: &str, user: &str) -> bool;
}

/// Permissions backed by GitHub collaborators and repository teams.
pub struct GitHubAccessGate {
    github: Arc<dyn GitHubApi>,
}

impl GitHubAccessGate {
    pub fn new(github: Arc<dyn GitHubApi>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl AccessGate for GitHubAccessGate {
    async fn readable(&self, owner: &str, repo: &str, user: &str) -> bool {
        match self.github.is_collaborator(owner, repo, user).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(owner, repo, user, error = %format!("{:#}", e),
                    "failed to check collaborator status");
                false
            }
        }
    }

    /// Deploying needs membership in a repository team with more than `pull`.
    async fn deployable(&self, owner: &str, repo: &str, user: &str) -> bool {
        let teams = match self.github.list_teams(owner, repo).await {
            Ok(teams) => teams,
            Err(e) => {
                tracing::error!(owner, repo, error = %format!("{:#}", e),
                    "failed to get repository teams");
                return false;
            }
        };

        for team in teams.iter().filter(|t| !t.is_read_only()) {
            match self.github.is_team_member(team.id, user).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(team = %team.slug, user, error = %format!("{:#}", e),
                        "failed to check team membership");
                    return false;
                }
            }
        }
        false
    }
}

/// Grants everything. For deployments without an access authority.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

#[async_trait]
impl AccessGate for OpenAccess {
    async fn readable(&self, _owner: &str, _repo: &str, _user: &str) -> bool {
        true
    }

    async fn deployable(&self, _owner: &str, _repo: &str, _user: &str) -> bool {
        true
    }
}

/// The projects `user` may read, in their original order.
pub async fn readable_projects<'a>(
    gate: &dyn AccessGate,
    projects: &'a [Project],
    user: &str,
) -> Vec<&'a Project> {
    let mut readable = Vec::with_capacity(projects.len());
    for project in projects {
        if gate
            .readable(project.source_owner(), project.source_name(), user)
            .await
        {
            readable.push(project);
        }
    }
    readable
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::github::{GitHubCommit, GitHubTeam};
    use std::collections::HashSet;

    /// GitHub with a fixed roster. `fail` makes every call error out.
    #[derive(Default)]
    pub(crate) struct RosterGitHub {
        pub collaborators: HashSet<String>,
        pub teams: Vec<GitHubTeam>,
        /// (team id, user) pairs with an active membership.
        pub members: HashSet<(u64, String)>,
        pub fail: bool,
    }

    #[async_trait]
    impl GitHubApi for RosterGitHub {
        async fn list_commits(&self, _: &str, _: &str, _: &str) -> anyhow::Result<Vec<GitHubCommit>> {
            Ok(vec![])
        }

        async fn list_teams(&self, _: &str, _: &str) -> anyhow::Result<Vec<GitHubTeam>> {
            if self.fail {
                anyhow::bail!("502 Bad Gateway");
            }
            Ok(self.teams.clone())
        }

        async fn is_team_member(&self, team_id: u64, user: &str) -> anyhow::Result<bool> {
            if self.fail {
                anyhow::bail!("502 Bad Gateway");
            }
            Ok(self.members.contains(&(team_id, user.to_string())))
        }

        async fn is_collaborator(&self, _: &str, _: &str, user: &str) -> anyhow::Result<bool> {
            if self.fail {
                anyhow::bail!("502 Bad Gateway");
            }
            Ok(self.collaborators.contains(user))
        }
    }

    fn team(id: u64, permission: &str) -> GitHubTeam {
        GitHubTeam {
            id,
            name: format!("team-{id}"),
            slug: format!("team-{id}"),
            permission: permission.to_string(),
        }
    }

    pub(crate) fn roster() -> RosterGitHub {
        RosterGitHub {
            collaborators: HashSet::from(["alice".to_string(), "bob".to_string()]),
            teams: vec![team(1, "pull"), team(2, "push")],
            members: HashSet::from([(1, "bob".to_string()), (2, "alice".to_string())]),
            fail: false,
        }
    }

    #[tokio::test]
    async fn test_readable_is_collaborator_check() {
        let gate = GitHubAccessGate::new(Arc::new(roster()));
        assert!(gate.readable("acme", "web", "alice").await);
        assert!(!gate.readable("acme", "web", "mallory").await);
    }

    #[tokio::test]
    async fn test_deployable_needs_non_pull_team() {
        let gate = GitHubAccessGate::new(Arc::new(roster()));
        assert!(gate.deployable("acme", "web", "alice").await);
        // bob is only in the pull team
        assert!(!gate.deployable("acme", "web", "bob").await);
        assert!(!gate.deployable("acme", "web", "mallory").await);
    }

    #[tokio::test]
    async fn test_upstream_errors_fail_closed() {
        let gate = GitHubAccessGate::new(Arc::new(RosterGitHub {
            fail: true,
            ..roster()
        }));
        assert!(!gate.readable("acme", "web", "alice").await);
        assert!(!gate.deployable("acme", "web", "alice").await);
    }

    #[tokio::test]
    async fn test_open_access_allows_everything() {
        assert!(OpenAccess.readable("acme", "web", "anyone").await);
        assert!(OpenAccess.deployable("acme", "web", "anyone").await);
    }

    #[tokio::test]
    async fn test_readable_projects_preserves_order() {
        struct OnlyRepos(&'static [&'static str]);

        #[async_trait]
        impl AccessGate for OnlyRepos {
            async fn readable(&self, _: &str, repo: &str, _: &str) -> bool {
                self.0.contains(&repo)
            }
            async fn deployable(&self, _: &str, _: &str, _: &str) -> bool {
                false
            }
        }

        let projects: Vec<Project> = ["a", "b", "c"]
            .iter()
            .map(|n| Project {
                name: n.to_string(),
                repo_owner: "acme".to_string(),
                repo_name: n.to_string(),
                source: None,
                environments: vec![],
            })
            .collect();

        let gate = OnlyRepos(&["c", "a"]);
        let names: Vec<&str> = readable_projects(&gate, &projects, "alice")
            .await
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
