use thiserror::Error;

/// Errors raised while assembling backends from configuration.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend configuration: {0}")]
    Config(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
