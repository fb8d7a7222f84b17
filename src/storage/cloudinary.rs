use super::*;
use crate::config::CloudinaryConfig;
use reqwest::multipart::{Form, Part};

const NEED: &[&str] = &["CLOUDINARY_CLOUD_NAME"];
const OPTIONAL: &[&str] = &["CLOUDINARY_UPLOAD_PRESET"];

/// Unsigned uploads through an upload preset; the preset's settings on the
/// Cloudinary side decide what is accepted, so no API secret is held here.
pub struct CloudinaryStorage {
    client: reqwest::Client,
    config: CloudinaryConfig,
    resource_types: ResourceTypeMap,
}

impl CloudinaryStorage {
    pub fn new(
        client: reqwest::Client,
        config: CloudinaryConfig,
        resource_types: ResourceTypeMap,
    ) -> Self {
        Self {
            client,
            config,
            resource_types,
        }
    }

    fn cloud_name(&self) -> Result<&str, ApiError> {
        self.config
            .cloud_name
            .as_deref()
            .ok_or(ApiError::MissingConfig {
                need: NEED,
                optional: OPTIONAL,
            })
    }

    /// Raw assets keep their extension inside the public id, images and
    /// video get it back from the `format` field.
    fn public_id(&self, key: &StorageKey) -> String {
        match self.resource_types.resource_type(&key.extension) {
            ResourceType::Raw => key.to_string(),
            ResourceType::Image | ResourceType::Video => key.token.clone(),
        }
    }
}

#[async_trait]
impl Storage for CloudinaryStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloudinary
    }

    async fn store(&self, file: FileData) -> Result<BackendReceipt, ApiError> {
        let cloud_name = self.cloud_name()?;
        let url = backend_url(
            &self.config.api_url,
            ["v1_1", cloud_name, "auto", "upload"],
        )?;

        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type.as_ref())?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("public_id", self.public_id(&file.key));
        match file.upload_preset.or_else(|| self.config.upload_preset.clone()) {
            Some(preset) => form = form.text("upload_preset", preset),
            None => tracing::warn!("no upload preset configured, cloudinary will likely refuse"),
        }

        tracing::debug!(key = %file.key, size = file.bytes.len(), "uploading to cloudinary");

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        let result = response_body(response).await?;

        if !status.is_success() {
            let message = result["error"]["message"]
                .as_str()
                .map(|m| format!("Cloudinary rejected the upload: {m}"))
                .unwrap_or_else(|| "Cloudinary rejected the upload".to_string());
            return Err(ApiError::upstream(status.as_u16(), message, Some(result)));
        }

        let Some(public_id) = result["public_id"].as_str().map(str::to_string) else {
            return Err(ApiError::UploadRejected(result));
        };
        let format = result["format"].as_str().unwrap_or_default().to_string();
        let secure_url = result["secure_url"].as_str().unwrap_or_default().to_string();
        let resource_type = result["resource_type"]
            .as_str()
            .and_then(|t| t.parse().ok());

        tracing::info!(%public_id, %format, "upload stored");

        Ok(BackendReceipt::Cloudinary {
            public_id,
            format,
            secure_url,
            resource_type,
        })
    }

    fn locate(
        &self,
        file: &str,
        resource_type: Option<ResourceType>,
    ) -> Result<Location, ApiError> {
        let cloud_name = self.cloud_name()?;
        let resource_type = resource_type
            .unwrap_or_else(|| self.resource_types.resource_type(&extension_of(file)));

        let target = backend_url(
            &self.config.delivery_url,
            [cloud_name, resource_type.as_str(), "upload", file],
        )?;

        Ok(Location {
            file: file.to_string(),
            mode: DeliveryMode::Redirect,
            target,
        })
    }
}
