mod cloudinary;
mod github;

pub use cloudinary::CloudinaryStorage;
pub use github::GitHubStorage;

use crate::classify::{ResourceType, ResourceTypeMap};
use crate::config::{BackendKind, DeliveryMode};
use crate::errors::ApiError;
use crate::naming::{StorageKey, extension_of};
use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;
use serde_json::Value;
use url::Url;

#[derive(Debug)]
pub struct FileData {
    pub key: StorageKey,
    pub bytes: Bytes,
    pub content_type: Option<Mime>,
    pub filename: String,
    /// Cloudinary preset sent along with the file, overriding the configured one.
    pub upload_preset: Option<String>,
}

/// What a backend hands back once the write is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReceipt {
    GitHub {
        commit_sha: String,
        path: String,
    },
    Cloudinary {
        public_id: String,
        format: String,
        secure_url: String,
        resource_type: Option<ResourceType>,
    },
}

impl BackendReceipt {
    /// File name the object is retrieved by.
    pub fn stored_name(&self, key: &StorageKey) -> String {
        match self {
            BackendReceipt::GitHub { .. } => key.to_string(),
            BackendReceipt::Cloudinary {
                public_id, format, ..
            } => {
                let suffix = format!(".{format}");
                if format.is_empty() || public_id.ends_with(&suffix) {
                    public_id.clone()
                } else {
                    format!("{public_id}{suffix}")
                }
            }
        }
    }

    /// Resource type to pin in the public URL, when the backend filed the
    /// object somewhere the extension alone would not lead back to.
    pub fn resource_type_hint(
        &self,
        stored_name: &str,
        resource_types: &ResourceTypeMap,
    ) -> Option<ResourceType> {
        match self {
            BackendReceipt::Cloudinary {
                resource_type: Some(actual),
                ..
            } if *actual != resource_types.resource_type(&extension_of(stored_name)) => {
                Some(*actual)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommitSummary {
    pub sha: String,
    pub short_sha: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct AssetSummary {
    pub public_id: String,
    pub format: String,
    pub secure_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
}

/// Where a stored file can be fetched from, and how to hand it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub mode: DeliveryMode,
    pub target: String,
}

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Writes the bytes once. No retry, nothing is cleaned up on failure.
    async fn store(&self, file: FileData) -> Result<BackendReceipt, ApiError>;

    /// Builds the backend URL for a stored file name.
    fn locate(
        &self,
        file: &str,
        resource_type: Option<ResourceType>,
    ) -> Result<Location, ApiError>;
}

/// Reads a backend response body as JSON, keeping plain text bodies as a
/// JSON string so they can still be relayed under `detail`.
async fn response_body(response: reqwest::Response) -> Result<Value, ApiError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Appends path segments to a configured base URL. Each segment is
/// percent-encoded on its own, so a stored name never adds path, query or
/// fragment syntax of its own.
fn backend_url<'a>(
    base: &str,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<String, ApiError> {
    let mut url = Url::parse(base)
        .map_err(|e| ApiError::Internal(format!("invalid backend url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Internal(format!("backend url {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: &str, extension: &str) -> StorageKey {
        StorageKey {
            token: token.to_string(),
            extension: extension.to_string(),
        }
    }

    fn cloudinary(public_id: &str, format: &str, resource_type: ResourceType) -> BackendReceipt {
        BackendReceipt::Cloudinary {
            public_id: public_id.to_string(),
            format: format.to_string(),
            secure_url: String::new(),
            resource_type: Some(resource_type),
        }
    }

    #[test]
    fn github_objects_keep_the_generated_name() {
        let receipt = BackendReceipt::GitHub {
            commit_sha: "abc".into(),
            path: "uploads/abcd1234.png".into(),
        };
        assert_eq!(receipt.stored_name(&key("abcd1234", "png")), "abcd1234.png");
    }

    #[test]
    fn cloudinary_name_appends_format_once() {
        let k = key("abcd1234", "jpg");
        assert_eq!(
            cloudinary("abcd1234", "jpg", ResourceType::Image).stored_name(&k),
            "abcd1234.jpg"
        );
        assert_eq!(
            cloudinary("abcd1234.zip", "", ResourceType::Raw).stored_name(&k),
            "abcd1234.zip"
        );
        assert_eq!(
            cloudinary("abcd1234.pdf", "pdf", ResourceType::Image).stored_name(&k),
            "abcd1234.pdf"
        );
    }

    #[test]
    fn hint_only_when_backend_disagrees_with_extension() {
        let map = ResourceTypeMap::default();
        let agrees = cloudinary("abcd1234", "png", ResourceType::Image);
        assert_eq!(agrees.resource_type_hint("abcd1234.png", &map), None);

        let disagrees = cloudinary("abcd1234.pdf", "pdf", ResourceType::Image);
        assert_eq!(
            disagrees.resource_type_hint("abcd1234.pdf", &map),
            Some(ResourceType::Image)
        );
    }

    #[test]
    fn backend_url_encodes_each_segment() {
        let url = backend_url("https://raw.example.com/", ["someone", "files", "a.v1#x?y=1"])
            .unwrap();
        assert_eq!(url, "https://raw.example.com/someone/files/a.v1%23x%3Fy=1");

        let nested = backend_url("http://127.0.0.1:9000/prefix", ["a b", "c/d"]).unwrap();
        assert_eq!(nested, "http://127.0.0.1:9000/prefix/a%20b/c%2Fd");
    }
}
