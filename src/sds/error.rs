use thiserror::Error;

/// Errors raised while talking to the science data system.
#[derive(Debug, Error)]
pub enum SdsError {
    /// A parameter the client needs is not configured.
    #[error("missing parameter `{0}`")]
    MissingParam(&'static str),

    /// No job spec with a parseable version matched the name.
    #[error("job spec not found: {0}")]
    JobSpecNotFound(String),

    /// The search index answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The configured CA certificate could not be used.
    #[error("invalid CA certificate: {0}")]
    Certificate(reqwest::Error),

    /// Underlying network failure (DNS, refused connection, timeout, bad body).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
