use graphql_sse_api::errors::ApiError;
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("server task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration provided")]
    NoConfiguration,
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("failed to validate config: {0}")]
    Validation(ValidationErrors),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
