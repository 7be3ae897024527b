use thiserror::Error;

/// Token issuance failure. Always surfaced to the caller, never swallowed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("scope set must not be empty")]
    EmptyScopes,

    #[error("invalid delegation subject: {0}")]
    InvalidPrincipal(String),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint rejected assertion: status={status}, error={error}: {description}")]
    Rejected {
        status: u16,
        error: String,
        description: String,
    },

    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Object store failure. Transport and permission errors alike collapse into
/// the one `Internal` kind; the underlying cause stays reachable via `source()`.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("an unexpected error occurred while uploading the file: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl UploadError {
    pub(crate) fn internal(source: anyhow::Error) -> Self {
        UploadError::Internal {
            message: format!("{:#}", source),
            source,
        }
    }
}

/// Query failure. The warehouse's own error is passed through as the SDK's
/// native type; nothing about it is rewritten.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Warehouse(#[from] google_cloud_bigquery::http::error::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to build warehouse client: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unexpected query result: {0}")]
    Result(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("row has {actual} cells but table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
}
