use std::path::PathBuf;

/// Core error types for duobot.
#[derive(Debug, thiserror::Error)]
pub enum DuobotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Inbound error: {0}")]
    Inbound(#[from] InboundError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credentials file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse credentials: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to sign token assertion: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("Token exchange failed: {0}")]
    Exchange(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Provider returned no content")]
    EmptyResponse,

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Authentication failed: {0}")]
    Auth(#[from] CredentialError),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Rejections of an inbound webhook request before any state is touched.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("Sender {0:?} is not on the expected channel")]
    InvalidSource(String),
}

pub type Result<T> = std::result::Result<T, DuobotError>;
