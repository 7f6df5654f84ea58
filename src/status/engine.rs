//! Concurrent status reconciliation.
//!
//! One pass resolves the deployable head of every environment and the
//! deployed revision of every host of one project:
//!
//! ```text
//!   preallocate  ──►  spawn one task per slot  ──►  join (or cancel)
//!   [env][host]        Slot::Head(e)                 write result into
//!                      Slot::Host(e, h)              its own slot only
//!                                                        │
//!                       access overlay  ◄──  derived fields
//! ```
//!
//! Lookup failures degrade their slot to the unknown revision. Only the
//! request preconditions (user present, project exists and is readable) can
//! fail a pass.

use shipdeck_common::{Environment, Project, project_from_name};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{EnvironmentStatus, HostStatus, ProjectStatus};
use crate::access::AccessGate;
use crate::errors::{RevisionError, StatusError};
use crate::revision::{Resolved, RevisionSource};

/// Appended to the comment of an environment locked by an operator.
pub const LOCKED_CLAUSE: &str = "repo is locked.";
/// Appended to the comment of an environment the user may not deploy.
pub const NO_PERMISSION_CLAUSE: &str = "you do not have permission to deploy";
const COMMENT_SEPARATOR: &str = " | ";

/// Destination of one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Deployable head of environment `e`.
    Head(usize),
    /// Deployed revision of host `h` of environment `e`.
    Host(usize, usize),
}

pub struct ReconciliationEngine {
    source: Arc<dyn RevisionSource>,
    gate: Arc<dyn AccessGate>,
}

impl ReconciliationEngine {
    pub fn new(source: Arc<dyn RevisionSource>, gate: Arc<dyn AccessGate>) -> Self {
        Self { source, gate }
    }

    pub fn gate(&self) -> &dyn AccessGate {
        self.gate.as_ref()
    }

    /// Check the request preconditions, then reconcile `project_name`.
    pub async fn fetch_statuses(
        &self,
        cancel: &CancellationToken,
        projects: &[Project],
        project_name: &str,
        user: &str,
    ) -> Result<ProjectStatus, StatusError> {
        if user.is_empty() {
            return Err(StatusError::Internal("no user identity in request".into()));
        }
        let project = project_from_name(projects, project_name)
            .ok_or_else(|| StatusError::NotFound(project_name.to_string()))?;
        if !self
            .gate
            .readable(project.source_owner(), project.source_name(), user)
            .await
        {
            tracing::warn!(project = project_name, user, "project not readable");
            return Err(StatusError::Forbidden {
                project: project_name.to_string(),
                user: user.to_string(),
            });
        }

        Ok(ProjectStatus {
            name: project.name.clone(),
            github_url: project.github_url(),
            environments: self.reconcile(cancel, project, user).await,
        })
    }

    /// Build the status snapshot of `project` as seen by `user`.
    ///
    /// Output order matches `project.environments` and each environment's
    /// host list. If `cancel` fires before every lookup is done, the
    /// remaining slots stay unknown.
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        user: &str,
    ) -> Vec<EnvironmentStatus> {
        let mut heads: Vec<Resolved> = vec![Resolved::default(); project.environments.len()];
        let mut hosts: Vec<Vec<Resolved>> = project
            .environments
            .iter()
            .map(|env| vec![Resolved::default(); env.hosts.len()])
            .collect();

        let lookup_token = cancel.child_token();
        let _stop_leftovers = lookup_token.clone().drop_guard();
        let shared = Arc::new(project.clone());
        let mut set = JoinSet::new();

        for (e, env) in project.environments.iter().enumerate() {
            self.spawn_lookup(&mut set, &lookup_token, &shared, Slot::Head(e));
            for h in 0..env.hosts.len() {
                self.spawn_lookup(&mut set, &lookup_token, &shared, Slot::Host(e, h));
            }
        }
        tracing::debug!(project = %project.name, lookups = set.len(), "reconciling");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!(project = %project.name, pending = set.len(),
                        "reconciliation cancelled, unresolved slots stay unknown");
                    set.abort_all();
                    break;
                }
                joined = set.join_next() => {
                    let Some(joined) = joined else { break };
                    let (slot, result) = match joined {
                        Ok(done) => done,
                        Err(e) => {
                            tracing::error!(error = %e, "revision lookup task failed");
                            continue;
                        }
                    };
                    let resolved = match result {
                        Ok(resolved) => resolved,
                        Err(e) => {
                            log_failure(project, slot, &e);
                            continue;
                        }
                    };
                    match slot {
                        Slot::Head(e) => heads[e] = resolved,
                        Slot::Host(e, h) => hosts[e][h] = resolved,
                    }
                }
            }
        }

        let mut statuses: Vec<EnvironmentStatus> = project
            .environments
            .iter()
            .zip(heads)
            .zip(hosts)
            .map(|((env, head), deployed)| self.derive(project, env, head, deployed))
            .collect();

        for (status, env) in statuses.iter_mut().zip(&project.environments) {
            self.apply_access(project, env, status, user).await;
        }
        statuses
    }

    fn spawn_lookup(
        &self,
        set: &mut JoinSet<(Slot, Result<Resolved, RevisionError>)>,
        token: &CancellationToken,
        project: &Arc<Project>,
        slot: Slot,
    ) {
        let source = Arc::clone(&self.source);
        let project = Arc::clone(project);
        let token = token.clone();
        set.spawn(async move {
            let result = match slot {
                Slot::Head(e) => {
                    let env = &project.environments[e];
                    source.latest(&token, &project, env).await
                }
                Slot::Host(e, h) => {
                    let env = &project.environments[e];
                    source
                        .latest_deployed(&token, &env.hosts[h], &project, env)
                        .await
                }
            };
            (slot, result)
        });
    }

    /// Fill the display fields of one environment from its resolved slots.
    fn derive(
        &self,
        project: &Project,
        env: &Environment,
        head: Resolved,
        deployed: Vec<Resolved>,
    ) -> EnvironmentStatus {
        let deployments = env
            .hosts
            .iter()
            .zip(deployed)
            .map(|(hostname, resolved)| HostStatus {
                hostname: hostname.clone(),
                short_revision: resolved.revision.short().to_string(),
                revision_url: self.source.revision_url(project, &resolved.revision),
                source_code_diff_url: self.source.source_diff_url(
                    project,
                    &resolved.source,
                    &head.source,
                ),
                revision: resolved.revision,
                source_code_revision: resolved.source,
            })
            .collect();

        EnvironmentStatus {
            name: env.name.clone(),
            short_latest_deployable: head.revision.short().to_string(),
            latest_deployable: head.revision,
            source_code_revision: head.source,
            comment: env.comment.clone(),
            is_locked: env.locked,
            deployments,
        }
    }

    /// Lock state and comment start from the stored values on every pass.
    async fn apply_access(
        &self,
        project: &Project,
        env: &Environment,
        status: &mut EnvironmentStatus,
        user: &str,
    ) {
        let clause = if env.locked {
            LOCKED_CLAUSE
        } else if self
            .gate
            .deployable(project.source_owner(), project.source_name(), user)
            .await
        {
            return;
        } else {
            status.is_locked = true;
            NO_PERMISSION_CLAUSE
        };
        status.comment = append_clause(&env.comment, clause);
    }
}

fn append_clause(comment: &str, clause: &str) -> String {
    if comment.is_empty() {
        clause.to_string()
    } else {
        [comment, clause].join(COMMENT_SEPARATOR)
    }
}

fn log_failure(project: &Project, slot: Slot, error: &RevisionError) {
    match slot {
        Slot::Head(e) => tracing::error!(
            project = %project.name,
            environment = %project.environments[e].name,
            error = %error,
            "failed to resolve deployable revision"
        ),
        Slot::Host(e, h) => tracing::error!(
            project = %project.name,
            environment = %project.environments[e].name,
            host = %project.environments[e].hosts[h],
            error = %error,
            "failed to resolve deployed revision"
        ),
    }
}
