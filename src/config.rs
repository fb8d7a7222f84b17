use crate::classify::{ResourceType, ResourceTypeMap};
use dotenvy::dotenv;
use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid listen address {0}")]
    Address(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    GitHub,
    Cloudinary,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(BackendKind::GitHub),
            "cloudinary" => Ok(BackendKind::Cloudinary),
            _ => Err("expected `github` or `cloudinary`".to_string()),
        }
    }
}

/// How retrieval hands a GitHub-backed file to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fetch the bytes and pipe them through this service.
    Stream,
    /// Answer with a 302 to the backend URL.
    Redirect,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(DeliveryMode::Stream),
            "redirect" => Ok(DeliveryMode::Redirect),
            _ => Err("expected `stream` or `redirect`".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub repo: Option<String>,
    pub token: Option<String>,
    pub uploads_dir: String,
    /// Branch to commit to. Unset means the repository default, which raw
    /// URLs address as `HEAD`.
    pub branch: Option<String>,
    pub api_url: String,
    pub raw_url: String,
    pub delivery: DeliveryMode,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repo: None,
            token: None,
            uploads_dir: "uploads".to_string(),
            branch: None,
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            delivery: DeliveryMode::Stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub upload_preset: Option<String>,
    pub api_url: String,
    pub delivery_url: String,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            upload_preset: None,
            api_url: "https://api.cloudinary.com".to_string(),
            delivery_url: "https://res.cloudinary.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub public_base_url: String,
    pub body_limit: usize,
    pub resource_types: ResourceTypeMap,
    pub github: GitHubConfig,
    pub cloudinary: CloudinaryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backend: BackendKind::GitHub,
            public_base_url: "http://localhost:3000".to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
            resource_types: ResourceTypeMap::default(),
            github: GitHubConfig::default(),
            cloudinary: CloudinaryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values
    /// count as unset. Credentials are allowed to be missing here; the
    /// storage adapters report them per request.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let github = GitHubConfig {
            repo: var(&["GITHUB_REPO", "NEXT_PUBLIC_GITHUB_REPO"]),
            token: var(&["GITHUB_TOKEN"]),
            uploads_dir: var(&["UPLOADS_DIR", "NEXT_PUBLIC_UPLOADS_DIR"])
                .map(|dir| dir.trim_matches('/').to_string())
                .unwrap_or(defaults.github.uploads_dir),
            branch: var(&["GITHUB_BRANCH"]),
            api_url: var(&["GITHUB_API_URL"]).unwrap_or(defaults.github.api_url),
            raw_url: var(&["GITHUB_RAW_URL"]).unwrap_or(defaults.github.raw_url),
            delivery: parse_or("DELIVERY_MODE", var(&["DELIVERY_MODE"]), DeliveryMode::Stream)?,
        };

        let cloudinary = CloudinaryConfig {
            cloud_name: var(&["CLOUDINARY_CLOUD_NAME", "NEXT_PUBLIC_CLOUDINARY_CLOUD_NAME"]),
            upload_preset: var(&[
                "CLOUDINARY_UPLOAD_PRESET",
                "NEXT_PUBLIC_CLOUDINARY_UPLOAD_PRESET",
            ]),
            api_url: var(&["CLOUDINARY_API_URL"]).unwrap_or(defaults.cloudinary.api_url),
            delivery_url: var(&["CLOUDINARY_DELIVERY_URL"])
                .unwrap_or(defaults.cloudinary.delivery_url),
        };

        let body_limit = match var(&["BODY_LIMIT"]) {
            Some(value) => parse_size(&value).ok_or_else(|| ConfigError::Invalid {
                name: "BODY_LIMIT",
                value,
                reason: "expected a byte count such as 10485760, 500kb or 10mb".to_string(),
            })?,
            None => defaults.body_limit,
        };

        let audio = parse_or(
            "AUDIO_RESOURCE_TYPE",
            var(&["AUDIO_RESOURCE_TYPE"]),
            ResourceType::Video,
        )?;
        if audio == ResourceType::Image {
            return Err(ConfigError::Invalid {
                name: "AUDIO_RESOURCE_TYPE",
                value: "image".to_string(),
                reason: "audio can only be stored as `video` or `raw`".to_string(),
            });
        }

        Ok(Self {
            host: var(&["HOST"]).unwrap_or(defaults.host),
            port: parse_or("PORT", var(&["PORT"]), defaults.port)?,
            backend: parse_or("STORAGE_BACKEND", var(&["STORAGE_BACKEND"]), defaults.backend)?,
            public_base_url: var(&["PUBLIC_BASE_URL", "NEXT_PUBLIC_BASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            body_limit,
            resource_types: ResourceTypeMap { audio },
            github,
            cloudinary,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Address(addr))
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match value {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

/// Parses `1048576`, `500kb`, `10mb` or `1gb` (case-insensitive) into bytes.
pub fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = value.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = value.strip_suffix('b') {
        (n, 1)
    } else {
        (value.as_str(), 1)
    };

    digits.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}
