pub mod classify;
pub mod config;
pub mod errors;
pub mod naming;
pub mod resolver;
pub mod routes;
pub mod storage;
pub mod upload;

use axum::Router;
use config::{AppConfig, BackendKind};
use resolver::Resolver;
use routes::AppContext;
use std::{sync::Arc, time::Duration};
use storage::{CloudinaryStorage, GitHubStorage, Storage};

/// Shared outbound client. GitHub refuses requests without a user agent.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

pub fn build_storage(config: &AppConfig, client: reqwest::Client) -> Arc<dyn Storage> {
    match config.backend {
        BackendKind::GitHub => Arc::new(GitHubStorage::new(client, config.github.clone())),
        BackendKind::Cloudinary => Arc::new(CloudinaryStorage::new(
            client,
            config.cloudinary.clone(),
            config.resource_types,
        )),
    }
}

pub fn app(config: AppConfig) -> reqwest::Result<Router> {
    let client = http_client()?;
    let storage = build_storage(&config, client.clone());
    let resolver = Resolver::new(client, config.public_base_url.clone());

    Ok(routes::router(Arc::new(AppContext {
        storage,
        resolver,
        config,
    })))
}
