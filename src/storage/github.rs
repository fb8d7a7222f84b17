use super::*;
use crate::config::GitHubConfig;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header;
use serde_json::json;

const NEED: &[&str] = &["GITHUB_REPO", "GITHUB_TOKEN"];
const NEED_FOR_READ: &[&str] = &["GITHUB_REPO"];
const OPTIONAL: &[&str] = &["UPLOADS_DIR", "GITHUB_BRANCH"];

/// Commits uploads into a repository through the contents API.
pub struct GitHubStorage {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubStorage {
    pub fn new(client: reqwest::Client, config: GitHubConfig) -> Self {
        Self { client, config }
    }

    fn repo(&self) -> Result<&str, ApiError> {
        self.config
            .repo
            .as_deref()
            .ok_or(ApiError::MissingConfig {
                need: NEED_FOR_READ,
                optional: OPTIONAL,
            })
    }

    fn credentials(&self) -> Result<(&str, &str), ApiError> {
        match (self.config.repo.as_deref(), self.config.token.as_deref()) {
            (Some(repo), Some(token)) => Ok((repo, token)),
            _ => Err(ApiError::MissingConfig {
                need: NEED,
                optional: OPTIONAL,
            }),
        }
    }

    /// Segments of `{uploads_dir}/{file}`. The directory may be nested, the
    /// file name is always a single segment.
    fn object_segments<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a str> {
        self.config
            .uploads_dir
            .split('/')
            .filter(|s| !s.is_empty())
            .chain(std::iter::once(file))
    }

    fn object_path(&self, file: &str) -> String {
        self.object_segments(file).collect::<Vec<_>>().join("/")
    }
}

#[async_trait]
impl Storage for GitHubStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::GitHub
    }

    async fn store(&self, file: FileData) -> Result<BackendReceipt, ApiError> {
        let (repo, token) = self.credentials()?;
        let name = file.key.to_string();
        let path = self.object_path(&name);
        let url = backend_url(
            &self.config.api_url,
            ["repos"]
                .into_iter()
                .chain(repo.split('/'))
                .chain(["contents"])
                .chain(self.object_segments(&name)),
        )?;

        let mut body = json!({
            "message": format!("Upload {name}"),
            "content": STANDARD.encode(&file.bytes),
        });
        if let Some(branch) = &self.config.branch {
            body["branch"] = json!(branch);
        }

        tracing::debug!(%path, size = file.bytes.len(), "committing upload to github");

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, format!("token {token}"))
            .header(header::ACCEPT, "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let result = response_body(response).await?;

        if !status.is_success() {
            let message = result["message"]
                .as_str()
                .map(|m| format!("GitHub rejected the upload: {m}"))
                .unwrap_or_else(|| "GitHub rejected the upload".to_string());
            return Err(ApiError::upstream(status.as_u16(), message, Some(result)));
        }

        let committed_path = result["content"]["path"].as_str().map(str::to_string);
        let commit_sha = result["commit"]["sha"].as_str().map(str::to_string);

        match (committed_path, commit_sha) {
            (Some(path), Some(commit_sha)) => {
                tracing::info!(%path, %commit_sha, "upload committed");
                Ok(BackendReceipt::GitHub { commit_sha, path })
            }
            _ => Err(ApiError::UploadRejected(result)),
        }
    }

    fn locate(
        &self,
        file: &str,
        _resource_type: Option<ResourceType>,
    ) -> Result<Location, ApiError> {
        let repo = self.repo()?;
        let branch = self.config.branch.as_deref().unwrap_or("HEAD");

        let target = backend_url(
            &self.config.raw_url,
            repo.split('/')
                .chain(branch.split('/'))
                .chain(self.object_segments(file)),
        )?;

        Ok(Location {
            file: file.to_string(),
            mode: self.config.delivery,
            target,
        })
    }
}
