use shipdeck_common::{Environment, Project};
use std::fmt;

const DEFAULT_TAG: &str = "latest";

/// Canonical name of a container image: `registry/namespace/repository:tag`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageName {
    /// Optional registry part of the name.
    pub registry: String,
    /// Optional namespace.
    pub namespace: String,
    pub repository: String,
    /// Optional tag; `latest` when empty.
    pub tag: String,
}

impl ImageName {
    /// Image of `env`: the project owner is the registry, the project's repo
    /// name is `[namespace/]repository`, and the branch is the tag.
    pub fn for_environment(project: &Project, env: &Environment) -> Self {
        let (namespace, repository) = match project.repo_name.rsplit_once('/') {
            Some((ns, repo)) => (ns.to_string(), repo.to_string()),
            None => (String::new(), project.repo_name.clone()),
        };
        Self {
            registry: project.repo_owner.clone(),
            namespace,
            repository,
            tag: env.branch.clone(),
        }
    }

    /// `namespace/repository`, without the registry.
    pub fn repo_with_namespace(&self) -> String {
        if self.namespace.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.namespace, self.repository)
        }
    }

    pub fn repo_full_name(&self) -> String {
        if self.registry.is_empty() {
            self.repo_with_namespace()
        } else {
            format!("{}/{}", self.registry, self.repo_with_namespace())
        }
    }

    pub fn tag_or_default(&self) -> &str {
        if self.tag.is_empty() {
            DEFAULT_TAG
        } else {
            &self.tag
        }
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_full_name(), self.tag_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(owner: &str, repo: &str) -> Project {
        Project {
            name: "svc".to_string(),
            repo_owner: owner.to_string(),
            repo_name: repo.to_string(),
            source: None,
            environments: vec![],
        }
    }

    fn env(branch: &str) -> Environment {
        Environment {
            name: "prod".to_string(),
            branch: branch.to_string(),
            repo_path: String::new(),
            hosts: vec![],
            locked: false,
            comment: String::new(),
        }
    }

    #[test]
    fn test_name_with_namespace() {
        let name = ImageName::for_environment(&project("gcr.io", "acme-prod/api"), &env("v3"));
        assert_eq!(name.registry, "gcr.io");
        assert_eq!(name.namespace, "acme-prod");
        assert_eq!(name.repository, "api");
        assert_eq!(name.to_string(), "gcr.io/acme-prod/api:v3");
    }

    #[test]
    fn test_name_without_namespace() {
        let name = ImageName::for_environment(&project("gcr.io", "api"), &env("main"));
        assert!(name.namespace.is_empty());
        assert_eq!(name.repo_with_namespace(), "api");
        assert_eq!(name.to_string(), "gcr.io/api:main");
    }

    #[test]
    fn test_empty_tag_defaults_to_latest() {
        let name = ImageName::for_environment(&project("gcr.io", "ns/api"), &env(""));
        assert_eq!(name.tag_or_default(), "latest");
        assert_eq!(name.to_string(), "gcr.io/ns/api:latest");
    }

    #[test]
    fn test_name_without_registry() {
        let name = ImageName {
            repository: "api".to_string(),
            ..Default::default()
        };
        assert_eq!(name.to_string(), "api:latest");
    }
}
