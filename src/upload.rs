//! Upload orchestration: accept the submitted file, name it, store it and
//! hand back the shareable URL.

use crate::classify::{MediaKind, ResourceTypeMap, format_size};
use crate::errors::ApiError;
use crate::naming::{extension_of, generate_key};
use crate::resolver::Resolver;
use crate::storage::{AssetSummary, BackendReceipt, CommitSummary, FileData, Storage};
use axum::extract::Multipart;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};

/// JSON form of an upload. Fields are optional so a missing one can be
/// reported by name instead of as a deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct UploadBody {
    pub filename: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "contentType", alias = "type")]
    pub content_type: Option<String>,
}

#[derive(Debug)]
pub struct UploadRequest {
    pub filename: String,
    pub content: Bytes,
    pub declared_type: Option<Mime>,
    pub upload_preset: Option<String>,
}

impl UploadRequest {
    pub fn from_json(body: UploadBody) -> Result<Self, ApiError> {
        let filename = body.filename.filter(|f| !f.trim().is_empty());
        let content = body
            .content
            .map(|c| decode_content(&c))
            .filter(|c| !c.is_empty());

        let (filename, content) = match (filename, content) {
            (Some(filename), Some(content)) => (filename, content),
            (None, Some(_)) => return Err(ApiError::BadRequest("filename is required".into())),
            (Some(_), None) => return Err(ApiError::BadRequest("content is required".into())),
            (None, None) => {
                return Err(ApiError::BadRequest(
                    "filename and content are required".into(),
                ));
            }
        };

        Ok(Self {
            filename,
            content,
            declared_type: body.content_type.and_then(|t| t.parse().ok()),
            upload_preset: None,
        })
    }

    /// Reads a `file` part plus optional `upload_preset` and `filename`
    /// parts. Other parts are ignored.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut file: Option<(Option<String>, Option<Mime>, Bytes)> = None;
        let mut filename_field = None;
        let mut upload_preset = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?
        {
            let part = field.name().map(str::to_string);
            match part.as_deref() {
                Some("file") => {
                    let name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().and_then(|m| m.parse().ok());
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                    file = Some((name, content_type, data));
                }
                Some("upload_preset") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                    upload_preset = Some(text).filter(|p| !p.trim().is_empty());
                }
                Some("filename") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                    filename_field = Some(text).filter(|f| !f.trim().is_empty());
                }
                _ => {}
            }
        }

        let Some((part_name, declared_type, content)) = file else {
            return Err(ApiError::BadRequest("file is required".into()));
        };
        if content.is_empty() {
            return Err(ApiError::BadRequest("content is required".into()));
        }
        let filename = filename_field
            .or(part_name)
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("filename is required".into()))?;

        Ok(Self {
            filename,
            content,
            declared_type,
            upload_preset,
        })
    }
}

/// Turns submitted content into raw bytes. Base64 (standard or URL-safe,
/// padded or not, optionally as a data URL) is decoded; anything that does
/// not decode is taken verbatim, so malformed input is re-encoded later
/// rather than refused.
pub fn decode_content(content: &str) -> Bytes {
    let payload = content
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .unwrap_or(content);
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(&compact).ok())
        .map(Bytes::from)
        .unwrap_or_else(|| {
            tracing::debug!("content is not base64, storing it as given");
            Bytes::copy_from_slice(content.as_bytes())
        })
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: String,
    pub url: String,
    pub kind: MediaKind,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetSummary>,
}

impl UploadResponse {
    fn new(file: String, url: String, size: usize, receipt: BackendReceipt) -> Self {
        let kind = MediaKind::from_extension(&extension_of(&file));
        let (commit, asset) = match receipt {
            BackendReceipt::GitHub { commit_sha, path } => (
                Some(CommitSummary {
                    short_sha: commit_sha.chars().take(7).collect(),
                    sha: commit_sha,
                    path,
                }),
                None,
            ),
            BackendReceipt::Cloudinary {
                public_id,
                format,
                secure_url,
                resource_type,
            } => (
                None,
                Some(AssetSummary {
                    public_id,
                    format,
                    secure_url,
                    resource_type,
                }),
            ),
        };

        Self {
            file,
            url,
            kind,
            size: format_size(size),
            commit,
            asset,
        }
    }
}

/// Name, store, resolve. The request is consumed; only the stored name and
/// public URL outlive it.
pub async fn upload(
    storage: &dyn Storage,
    resolver: &Resolver,
    resource_types: &ResourceTypeMap,
    request: UploadRequest,
) -> Result<UploadResponse, ApiError> {
    let key = generate_key(&request.filename);
    if key.extension.contains(['/', '\\']) {
        return Err(ApiError::BadRequest(format!(
            "filename extension `{}` contains a path separator",
            key.extension
        )));
    }
    let size = request.content.len();

    tracing::info!(
        filename = %request.filename,
        %key,
        size,
        backend = ?storage.kind(),
        "storing upload"
    );

    let receipt = storage
        .store(FileData {
            key: key.clone(),
            bytes: request.content,
            content_type: request.declared_type,
            filename: request.filename,
            upload_preset: request.upload_preset,
        })
        .await?;

    let file = receipt.stored_name(&key);
    let hint = receipt.resource_type_hint(&file, resource_types);
    let url = resolver.public_url(&file, hint)?;

    Ok(UploadResponse::new(file, url, size, receipt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_named() {
        let err = UploadRequest::from_json(UploadBody {
            content: Some("aGk=".into()),
            ..UploadBody::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "filename is required");

        let err = UploadRequest::from_json(UploadBody {
            filename: Some("a.txt".into()),
            content: Some(String::new()),
            ..UploadBody::default()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "content is required");

        for blank in ["   ", "\n\t", "data:text/plain;base64,"] {
            let err = UploadRequest::from_json(UploadBody {
                filename: Some("a.txt".into()),
                content: Some(blank.into()),
                ..UploadBody::default()
            })
            .unwrap_err();
            assert_eq!(err.to_string(), "content is required", "{blank:?}");
        }

        let err = UploadRequest::from_json(UploadBody::default()).unwrap_err();
        assert_eq!(err.to_string(), "filename and content are required");
    }

    #[tokio::test]
    async fn separator_in_extension_is_refused_before_storing() {
        use crate::config::GitHubConfig;
        use crate::storage::GitHubStorage;

        // No credentials: reaching the backend would be a config error, not a 400.
        let storage = GitHubStorage::new(reqwest::Client::new(), GitHubConfig::default());
        let resolver = Resolver::new(reqwest::Client::new(), "https://up.example.com");

        for filename in ["v1.2/readme", r"old.dir\notes"] {
            let request = UploadRequest {
                filename: filename.to_string(),
                content: Bytes::from_static(b"hi"),
                declared_type: None,
                upload_preset: None,
            };
            let err = upload(&storage, &resolver, &ResourceTypeMap::default(), request)
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{filename}");
        }
    }

    #[test]
    fn declared_type_is_parsed_when_valid() {
        let request = UploadRequest::from_json(UploadBody {
            filename: Some("a.png".into()),
            content: Some("aGk=".into()),
            content_type: Some("image/png".into()),
        })
        .unwrap();
        assert_eq!(request.declared_type, Some(mime::IMAGE_PNG));
        assert_eq!(request.content, Bytes::from_static(b"hi"));
    }

    #[test]
    fn base64_variants_decode() {
        assert_eq!(decode_content("aGVsbG8="), Bytes::from_static(b"hello"));
        assert_eq!(decode_content("aGVsbG8"), Bytes::from_static(b"hello"));
        assert_eq!(decode_content("aGVs\nbG8="), Bytes::from_static(b"hello"));
        assert_eq!(
            decode_content("data:text/plain;base64,aGVsbG8="),
            Bytes::from_static(b"hello")
        );
        assert_eq!(decode_content("_-8="), Bytes::from_static(&[0xff, 0xef]));
    }

    #[test]
    fn malformed_base64_is_kept_verbatim() {
        assert_eq!(
            decode_content("not base64!"),
            Bytes::from_static(b"not base64!")
        );
    }

    #[test]
    fn response_summarizes_github_commit() {
        let response = UploadResponse::new(
            "abcd1234.png".into(),
            "https://up.example.com/api/preview?file=abcd1234.png".into(),
            2048,
            BackendReceipt::GitHub {
                commit_sha: "0123456789abcdef".into(),
                path: "uploads/abcd1234.png".into(),
            },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["commit"]["short_sha"], "0123456");
        assert_eq!(json["kind"], "Image");
        assert_eq!(json["size"], "2.00 KB");
        assert!(json.get("asset").is_none());
    }
}
