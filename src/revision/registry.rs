use async_trait::async_trait;
use serde::Deserialize;
use shipdeck_common::{Environment, Project, Revision};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{ImageName, Resolved, RevisionSource, cancellable};
use crate::errors::RevisionError;
use crate::remote::RemoteExecutor;

/// Image label carrying the source code revision the image was built from.
pub const SOURCE_REVISION_LABEL: &str = "source-revision";

/// Image metadata as returned by the registry v1 API and `docker inspect`.
///
/// The registry spells keys in lower case, docker in upper camel case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageManifest {
    #[serde(rename = "Id", alias = "id")]
    pub id: String,
    #[serde(rename = "Config", alias = "config", default)]
    pub config: Option<ImageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageConfig {
    #[serde(rename = "Labels", alias = "labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

impl ImageManifest {
    pub fn source_revision(&self) -> Revision {
        self.config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .and_then(|labels| labels.get(SOURCE_REVISION_LABEL))
            .map(|s| Revision::new(s.as_str()))
            .unwrap_or_default()
    }

    pub fn resolved(&self) -> Resolved {
        Resolved {
            revision: Revision::new(self.id.as_str()),
            source: self.source_revision(),
        }
    }
}

/// Registry-backed [`RevisionSource`]: the deployable head is the image
/// tagged with the environment's branch, and each host reports the image it
/// has locally.
pub struct RegistrySource {
    http: reqwest::Client,
    registry_host: String,
    base_url: String,
    access_token: Option<String>,
    remote: Arc<dyn RemoteExecutor>,
}

impl RegistrySource {
    /// `registry_host` is the registry part of image names served at `base_url`.
    pub fn new(
        registry_host: impl Into<String>,
        base_url: impl Into<String>,
        access_token: Option<String>,
        remote: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry_host: registry_host.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            remote,
        }
    }

    /// Three round trips: registry token, tag → image id, image manifest.
    async fn fetch_manifest(&self, image: &ImageName) -> Result<ImageManifest, RevisionError> {
        if image.registry != self.registry_host {
            return Err(RevisionError::UnsupportedRegistry {
                expected: self.registry_host.clone(),
                actual: image.registry.clone(),
            });
        }

        let token = self.fetch_token(image).await.inspect_err(
            |e| tracing::error!(image = %image, error = %e, "failed to fetch registry token"),
        )?;
        let id = self.fetch_image_id(image, &token).await.inspect_err(
            |e| tracing::error!(image = %image, error = %e, "failed to resolve image id"),
        )?;
        self.fetch_image_manifest(&id, &token).await.inspect_err(
            |e| tracing::error!(image = %image, id = %id, error = %e, "failed to fetch image manifest"),
        )
    }

    async fn fetch_token(&self, image: &ImageName) -> Result<String, RevisionError> {
        let oauth = self
            .access_token
            .as_deref()
            .ok_or_else(|| RevisionError::Upstream("no registry access token configured".into()))?;
        let url = format!(
            "{}/v1/repositories/{}/images",
            self.base_url,
            image.repo_with_namespace()
        );
        let resp = self
            .http
            .get(&url)
            .basic_auth("_token", Some(oauth))
            .header("X-Docker-Token", "true")
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?;

        resp.headers()
            .get("X-Docker-Token")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RevisionError::Upstream(format!("no X-Docker-Token in response from {}", url)))
    }

    async fn fetch_image_id(&self, image: &ImageName, token: &str) -> Result<String, RevisionError> {
        let url = format!(
            "{}/v1/repositories/{}/tags/{}",
            self.base_url,
            image.repo_with_namespace(),
            image.tag_or_default()
        );
        let body = self.get_with_token(&url, token).await?;
        serde_json::from_str::<String>(&body).map_err(|source| RevisionError::Decode {
            what: format!("image id of {}", image),
            source,
        })
    }

    async fn fetch_image_manifest(&self, id: &str, token: &str) -> Result<ImageManifest, RevisionError> {
        let url = format!("{}/v1/images/{}/json", self.base_url, id);
        let body = self.get_with_token(&url, token).await?;
        serde_json::from_str(&body).map_err(|source| RevisionError::Decode {
            what: format!("manifest of image {}", id),
            source,
        })
    }

    async fn get_with_token(&self, url: &str, token: &str) -> Result<String, RevisionError> {
        self.http
            .get(url)
            .header("Authorization", format!("Token {}", token))
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .text()
            .await
            .map_err(upstream)
    }
}

fn upstream(e: reqwest::Error) -> RevisionError {
    RevisionError::Upstream(e.to_string())
}

/// Remote command describing the local copy of `image`.
pub fn inspect_command(image: &ImageName) -> String {
    format!("sudo docker inspect {}", image)
}

/// Decode `docker inspect` output; the first image wins.
pub fn decode_inspect(image: &ImageName, host: &str, buf: &[u8]) -> Result<Resolved, RevisionError> {
    let images: Vec<ImageManifest> =
        serde_json::from_slice(buf).map_err(|source| RevisionError::Decode {
            what: format!("docker inspect output for {} on {}", image, host),
            source,
        })?;
    images
        .first()
        .map(ImageManifest::resolved)
        .ok_or_else(|| RevisionError::NotFound(format!("no such image {} on {}", image, host)))
}

#[async_trait]
impl RevisionSource for RegistrySource {
    async fn latest(
        &self,
        cancel: &CancellationToken,
        project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError> {
        let image = ImageName::for_environment(project, env);
        tracing::debug!(image = %image, "fetching manifest from registry");
        let manifest = cancellable(cancel, self.fetch_manifest(&image)).await?;
        tracing::trace!(image = %image, id = %manifest.id, "resolved in registry");
        Ok(manifest.resolved())
    }

    async fn latest_deployed(
        &self,
        cancel: &CancellationToken,
        host: &str,
        project: &Project,
        env: &Environment,
    ) -> Result<Resolved, RevisionError> {
        let image = ImageName::for_environment(project, env);
        tracing::debug!(image = %image, host, "inspecting deployed image");
        let buf = self
            .remote
            .output(cancel, host, &inspect_command(&image))
            .await
            .inspect_err(|e| {
                tracing::error!(image = %image, host, error = %e, "failed to inspect deployed image")
            })?;
        decode_inspect(&image, host, &buf)
    }

    fn revision_url(&self, _project: &Project, _rev: &Revision) -> String {
        String::new()
    }
}
