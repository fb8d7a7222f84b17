use tracing_subscriber::EnvFilter;
use uplinx::config::{AppConfig, BackendKind};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("uplinx=debug,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env().expect("Invalid configuration");
    let addr = config.socket_addr().expect("Invalid host or port");

    match config.backend {
        BackendKind::GitHub if config.github.repo.is_none() || config.github.token.is_none() => {
            tracing::warn!("GITHUB_REPO or GITHUB_TOKEN is not set, uploads will fail")
        }
        BackendKind::Cloudinary if config.cloudinary.cloud_name.is_none() => {
            tracing::warn!("CLOUDINARY_CLOUD_NAME is not set, uploads will fail")
        }
        backend => tracing::info!(?backend, "storage backend configured"),
    }

    let app = uplinx::app(config).expect("Failed to build HTTP client");

    tracing::info!("Server running on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
