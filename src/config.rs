//! Configuration for shipdeck, read from `shipdeck.toml`.
//!
//! The file names the deploy topology (projects → environments → hosts) and
//! selects which revision source and access gate the server constructs.
//!
//! ```toml
//! deploy_user = "deploy"
//! ssh_key = "~/.ssh/id_rsa"
//!
//! [revision]
//! source = "github"        # or "registry"
//!
//! [access]
//! mode = "github"          # or "open"
//!
//! [[projects]]
//! name = "web"
//! repo_owner = "acme"
//! repo_name = "web"
//!
//! [[projects.environments]]
//! name = "prod"
//! branch = "main"
//! repo_path = "/srv/web/.git"
//! hosts = ["web1.example.com"]
//! ```
//!
//! With the registry source, `repo_owner` is the registry and `repo_name` the
//! image path. Such projects also name the GitHub repository the image is
//! built from, which links and permission checks use:
//!
//! ```toml
//! [[projects]]
//! name = "api"
//! repo_owner = "gcr.io"
//! repo_name = "acme-prod/api"
//! source = { owner = "acme", name = "api" }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shipdeck_common::Project;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::access::{AccessGate, GitHubAccessGate, OpenAccess};
use crate::github::{GitHubApi, GitHubClient};
use crate::remote::{RemoteExecutor, SshExecutor};
use crate::revision::{LedgerSource, RegistrySource, RevisionSource};
use crate::status::ReconciliationEngine;

pub const DEFAULT_CONFIG_FILE: &str = "shipdeck.toml";

/// Which [`RevisionSource`](crate::revision::RevisionSource) to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionSourceKind {
    /// Commits on GitHub, `git rev-parse` on hosts.
    #[default]
    Github,
    /// Images in a container registry, `docker inspect` on hosts.
    Registry,
}

/// Which [`AccessGate`](crate::access::AccessGate) to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Repository collaborators and teams on GitHub.
    #[default]
    Github,
    /// Everyone may read and deploy everything.
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSection {
    /// ssh client binary.
    #[serde(default = "default_ssh_program")]
    pub program: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            program: default_ssh_program(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionSection {
    #[serde(default)]
    pub source: RevisionSourceKind,
    /// Registry part of image names served by `registry_url`.
    #[serde(default = "default_registry_host")]
    pub registry_host: String,
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    /// Environment variable holding the OAuth access token for the registry.
    #[serde(default = "default_registry_token_env")]
    pub registry_token_env: String,
}

fn default_registry_host() -> String {
    "gcr.io".to_string()
}

fn default_registry_url() -> String {
    "https://gcr.io".to_string()
}

fn default_registry_token_env() -> String {
    "REGISTRY_ACCESS_TOKEN".to_string()
}

impl Default for RevisionSection {
    fn default() -> Self {
        Self {
            source: RevisionSourceKind::default(),
            registry_host: default_registry_host(),
            registry_url: default_registry_url(),
            registry_token_env: default_registry_token_env(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSection {
    #[serde(default)]
    pub mode: AccessMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Environment variable holding the GitHub API token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_API_TOKEN".to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
        }
    }
}

/// Root of `shipdeck.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipdeckToml {
    /// Login used on every host.
    pub deploy_user: String,
    /// Private key used for ssh; `~` expands to the home directory.
    #[serde(default = "default_ssh_key")]
    pub ssh_key: PathBuf,
    #[serde(default)]
    pub ssh: SshSection,
    #[serde(default)]
    pub revision: RevisionSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub projects: Vec<Project>,
}

fn default_ssh_key() -> PathBuf {
    PathBuf::from("id_rsa")
}

impl ShipdeckToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse shipdeck.toml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.deploy_user.trim().is_empty() {
            anyhow::bail!("deploy_user must not be empty");
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                anyhow::bail!("Project names must not be empty");
            }
            if !seen.insert(project.name.as_str()) {
                anyhow::bail!("Duplicate project name '{}'", project.name);
            }
            if project.repo_owner.is_empty() || project.repo_name.is_empty() {
                anyhow::bail!(
                    "Project '{}' needs both repo_owner and repo_name",
                    project.name
                );
            }
            match &project.source {
                Some(src) if src.owner.is_empty() || src.name.is_empty() => anyhow::bail!(
                    "Project '{}' source needs both owner and name",
                    project.name
                ),
                None if self.revision.source == RevisionSourceKind::Registry => anyhow::bail!(
                    "Project '{}' deploys images and needs a source repository",
                    project.name
                ),
                _ => {}
            }
        }
        Ok(())
    }

    /// The ssh key path with a leading `~` expanded.
    pub fn ssh_key_path(&self) -> PathBuf {
        expand_home(&self.ssh_key)
    }

    /// GitHub token from the configured environment variable.
    pub fn github_token(&self) -> Option<String> {
        non_empty_env(&self.github.token_env)
    }

    /// Registry OAuth token from the configured environment variable.
    pub fn registry_token(&self) -> Option<String> {
        non_empty_env(&self.revision.registry_token_env)
    }

    /// Build the engine with the revision source and access gate selected here.
    pub fn build_engine(&self) -> ReconciliationEngine {
        let github: Arc<dyn GitHubApi> = Arc::new(GitHubClient::with_api_url(
            &self.github.api_url,
            self.github_token(),
        ));
        let remote: Arc<dyn RemoteExecutor> = Arc::new(
            SshExecutor::new(&self.deploy_user, self.ssh_key_path())
                .with_program(&self.ssh.program)
                .with_default_port(self.ssh.port)
                .with_connect_timeout(Duration::from_secs(self.ssh.connect_timeout_secs)),
        );

        let source: Arc<dyn RevisionSource> = match self.revision.source {
            RevisionSourceKind::Github => Arc::new(LedgerSource::new(Arc::clone(&github), remote)),
            RevisionSourceKind::Registry => Arc::new(RegistrySource::new(
                &self.revision.registry_host,
                &self.revision.registry_url,
                self.registry_token(),
                remote,
            )),
        };
        let gate: Arc<dyn AccessGate> = match self.access.mode {
            AccessMode::Github => Arc::new(GitHubAccessGate::new(github)),
            AccessMode::Open => Arc::new(OpenAccess),
        };
        tracing::debug!(source = ?self.revision.source, access = ?self.access.mode, "engine configured");
        ReconciliationEngine::new(source, gate)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
