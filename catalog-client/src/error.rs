use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Catalog API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,
}

impl Error {
    /// True for failures that a later attempt might not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::ApiError { status, .. } => *status >= 500,
            Error::MaxRetriesExceeded => true,
            _ => false,
        }
    }
}
