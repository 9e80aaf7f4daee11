/// Errors from the storage and batch REST clients.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Cloud API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Container already exists: {0}")]
    ContainerExists(String),

    #[error("Invalid account key: {0}")]
    InvalidKey(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A value could not be embedded safely in a task command line.
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// A response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}
