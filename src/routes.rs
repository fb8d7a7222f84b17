use crate::config::{AppConfig, BackendKind, DeliveryMode};
use crate::errors::ApiError;
use crate::resolver::{PREVIEW_PATH, Resolver};
use crate::storage::Storage;
use crate::upload::{self, UploadBody, UploadRequest, UploadResponse};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, FromRequest, Multipart, Path, Query, Request},
    http::header,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub storage: Arc<dyn Storage>,
    pub resolver: Resolver,
    pub config: AppConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrieveParams {
    pub file: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

pub fn router(context: Arc<AppContext>) -> Router {
    let body_limit = context.config.body_limit;

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload).fallback(method_not_allowed))
        .route(PREVIEW_PATH, get(preview).fallback(method_not_allowed))
        .route("/api/cdn", get(cdn).fallback(method_not_allowed))
        .route("/api/up/{file}", get(preview_path).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(context))
}

async fn health(Extension(context): Extension<Arc<AppContext>>) -> String {
    let backend = match context.storage.kind() {
        BackendKind::GitHub => "github",
        BackendKind::Cloudinary => "cloudinary",
    };
    format!("OK\nBackend: {backend}")
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Accepts either a JSON body with base64 content or a multipart form.
async fn upload(
    Extension(context): Extension<Arc<AppContext>>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let upload_request = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
        UploadRequest::from_multipart(multipart).await?
    } else {
        let Json(body) = Json::<UploadBody>::from_request(request, &())
            .await
            .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
        UploadRequest::from_json(body)?
    };

    let response = upload::upload(
        context.storage.as_ref(),
        &context.resolver,
        &context.config.resource_types,
        upload_request,
    )
    .await?;

    Ok(Json(response))
}

async fn preview(
    Extension(context): Extension<Arc<AppContext>>,
    Query(params): Query<RetrieveParams>,
) -> Result<Response, ApiError> {
    retrieve(&context, params, None).await
}

async fn preview_path(
    Extension(context): Extension<Arc<AppContext>>,
    Path(file): Path<String>,
    Query(params): Query<RetrieveParams>,
) -> Result<Response, ApiError> {
    let params = RetrieveParams {
        file: Some(file),
        ..params
    };
    retrieve(&context, params, None).await
}

/// Always answers with a redirect, whatever the configured delivery mode.
async fn cdn(
    Extension(context): Extension<Arc<AppContext>>,
    Query(params): Query<RetrieveParams>,
) -> Result<Response, ApiError> {
    retrieve(&context, params, Some(DeliveryMode::Redirect)).await
}

async fn retrieve(
    context: &AppContext,
    params: RetrieveParams,
    mode: Option<DeliveryMode>,
) -> Result<Response, ApiError> {
    let mut location = context.resolver.resolve(
        context.storage.as_ref(),
        params.file.as_deref(),
        params.resource_type.as_deref(),
    )?;
    if let Some(mode) = mode {
        location.mode = mode;
    }
    context.resolver.respond(location).await
}
