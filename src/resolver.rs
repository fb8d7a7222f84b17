use crate::classify::{ResourceType, guess_content_type};
use crate::config::DeliveryMode;
use crate::errors::ApiError;
use crate::naming::extension_of;
use crate::storage::{Location, Storage};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use headers::{CacheControl, ContentType, HeaderMapExt};
use mime::Mime;
use std::time::Duration;
use url::Url;

/// One year, for streamed objects. Stored names never get new content.
const CACHE_MAX_AGE: Duration = Duration::from_secs(31_536_000);

pub const PREVIEW_PATH: &str = "/api/preview";

/// Turns stored file names into client-facing URLs and responses.
#[derive(Clone)]
pub struct Resolver {
    client: reqwest::Client,
    public_base_url: String,
}

impl Resolver {
    pub fn new(client: reqwest::Client, public_base_url: impl Into<String>) -> Self {
        Self {
            client,
            public_base_url: public_base_url.into(),
        }
    }

    /// The shareable URL for a stored file. Same name and configuration in,
    /// same URL out.
    pub fn public_url(
        &self,
        file: &str,
        resource_type: Option<ResourceType>,
    ) -> Result<String, ApiError> {
        let base = format!(
            "{}{}",
            self.public_base_url.trim_end_matches('/'),
            PREVIEW_PATH
        );
        let mut url = Url::parse(&base)
            .map_err(|e| ApiError::Internal(format!("invalid public base url {base}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("file", file);
            if let Some(resource_type) = resource_type {
                query.append_pair("type", resource_type.as_str());
            }
        }
        Ok(url.into())
    }

    pub fn resolve(
        &self,
        storage: &dyn Storage,
        file: Option<&str>,
        resource_type: Option<&str>,
    ) -> Result<Location, ApiError> {
        let file = validate_file(file)?;
        let resource_type = resource_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<ResourceType>()
                    .map_err(|e| ApiError::BadRequest(e.to_string()))
            })
            .transpose()?;

        let location = storage.locate(file, resource_type)?;
        tracing::debug!(%file, target = %location.target, mode = ?location.mode, "resolved");
        Ok(location)
    }

    pub async fn respond(&self, location: Location) -> Result<Response, ApiError> {
        match location.mode {
            DeliveryMode::Redirect => Ok(redirect(&location.target)),
            DeliveryMode::Stream => self.stream(&location.file, &location.target).await,
        }
    }

    async fn stream(&self, file: &str, target: &str) -> Result<Response, ApiError> {
        let upstream = self.client.get(target).send().await?;
        let status = upstream.status();

        if !status.is_success() {
            tracing::warn!(%file, %status, "backend fetch failed");
            let message = if status == reqwest::StatusCode::NOT_FOUND {
                "File not found".to_string()
            } else {
                format!("Backend responded with {status}")
            };
            return Err(ApiError::upstream(status.as_u16(), message, None));
        }

        let content_type = upstream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Mime>().ok())
            .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM)
            .unwrap_or_else(|| guess_content_type(&extension_of(file)));

        let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
        let headers = response.headers_mut();
        headers.typed_insert(ContentType::from(content_type));
        headers.typed_insert(
            CacheControl::new()
                .with_public()
                .with_max_age(CACHE_MAX_AGE),
        );

        Ok(response)
    }
}

fn redirect(target: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response()
}

/// Stored names are flat; anything that could walk out of the uploads
/// directory is refused. Other characters are encoded by the backend.
fn validate_file(file: Option<&str>) -> Result<&str, ApiError> {
    let file = file
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    if file.contains("..") || file.contains(['/', '\\']) {
        return Err(ApiError::BadRequest(format!("invalid file name `{file}`")));
    }

    Ok(file)
}
