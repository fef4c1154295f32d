use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Failures surfaced by the credential flows and the store.
///
/// Corrupt store files and malformed records never show up here: they are
/// read back as an empty store or an absent credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("state does not match the PKCE verifier for this login attempt")]
    StateMismatch,

    #[error("invalid authorization code format, expected code#state")]
    InvalidCodeFormat,

    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Build a `Status` error from a non-success response, draining its body.
    pub(crate) async fn from_response(endpoint: &'static str, res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        AuthError::Status {
            endpoint,
            status,
            body,
        }
    }
}
