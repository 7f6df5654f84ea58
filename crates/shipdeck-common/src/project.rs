use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    "master".to_string()
}

/// A deployable project.
///
/// `repo_owner`/`repo_name` identify what gets deployed: a GitHub repository,
/// or `registry`/`[namespace/]repository` for an image. When they name an
/// image, `source` names the GitHub repository the image is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRepo>,
    #[serde(default)]
    pub environments: Vec<Environment>,
}

/// A GitHub repository holding source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepo {
    pub owner: String,
    pub name: String,
}

/// One deploy target of a project (e.g. "staging", "prod").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    /// Branch (or tag) whose head is the deployable revision.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Git directory of the deployed checkout on each host.
    #[serde(default)]
    pub repo_path: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Stored lock flag; set by an operator, never by the status engine.
    #[serde(default, alias = "is_locked")]
    pub locked: bool,
    /// Stored operator comment.
    #[serde(default)]
    pub comment: String,
}

impl Project {
    /// Owner of the source repository; permissions and links refer to it.
    pub fn source_owner(&self) -> &str {
        self.source
            .as_ref()
            .map_or(self.repo_owner.as_str(), |s| s.owner.as_str())
    }

    pub fn source_name(&self) -> &str {
        self.source
            .as_ref()
            .map_or(self.repo_name.as_str(), |s| s.name.as_str())
    }

    /// `https://github.com/{owner}/{repo}` of the source repository.
    pub fn github_url(&self) -> String {
        format!("https://github.com/{}/{}", self.source_owner(), self.source_name())
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    pub fn host_count(&self) -> usize {
        self.environments.iter().map(|e| e.hosts.len()).sum()
    }
}

/// Look up a project by name.
pub fn project_from_name<'a>(projects: &'a [Project], name: &str) -> Option<&'a Project> {
    projects.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Project {
        Project {
            name: "web".to_string(),
            repo_owner: "acme".to_string(),
            repo_name: "web".to_string(),
            source: None,
            environments: vec![
                Environment {
                    name: "staging".to_string(),
                    branch: "develop".to_string(),
                    repo_path: "/srv/web/.git".to_string(),
                    hosts: vec!["s1".to_string()],
                    locked: false,
                    comment: String::new(),
                },
                Environment {
                    name: "prod".to_string(),
                    branch: "main".to_string(),
                    repo_path: "/srv/web/.git".to_string(),
                    hosts: vec!["p1".to_string(), "p2".to_string()],
                    locked: true,
                    comment: "freeze".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_github_url() {
        assert_eq!(sample().github_url(), "https://github.com/acme/web");
    }

    #[test]
    fn test_source_repo_defaults_to_deploy_repo() {
        let p = sample();
        assert_eq!((p.source_owner(), p.source_name()), ("acme", "web"));
    }

    #[test]
    fn test_image_project_links_to_source_repo() {
        let p: Project = toml::from_str(
            r#"
name = "web"
repo_owner = "gcr.io"
repo_name = "acme-prod/web"
source = { owner = "acme", name = "web-app" }
"#,
        )
        .unwrap();
        assert_eq!(p.source_owner(), "acme");
        assert_eq!(p.source_name(), "web-app");
        assert_eq!(p.github_url(), "https://github.com/acme/web-app");
    }

    #[test]
    fn test_environment_lookup() {
        let p = sample();
        assert_eq!(p.environment("prod").map(|e| e.hosts.len()), Some(2));
        assert!(p.environment("qa").is_none());
        assert_eq!(p.host_count(), 3);
    }

    #[test]
    fn test_project_from_name() {
        let projects = vec![sample()];
        assert!(project_from_name(&projects, "web").is_some());
        assert!(project_from_name(&projects, "api").is_none());
    }

    #[test]
    fn test_environment_defaults_from_toml() {
        let env: Environment = toml::from_str(r#"name = "qa""#).unwrap();
        assert_eq!(env.branch, "master");
        assert!(!env.locked);
        assert!(env.comment.is_empty());
        assert!(env.hosts.is_empty());
    }

    #[test]
    fn test_is_locked_alias() {
        let env: Environment = toml::from_str("name = \"qa\"\nis_locked = true").unwrap();
        assert!(env.locked);
    }
}
