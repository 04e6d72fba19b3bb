use thiserror::Error;

/// Errors surfaced by the Napster client and provider adapter.
///
/// Remote failures map onto three caller-visible kinds: `Auth` for rejected
/// login/refresh exchanges, `Api` for any other non-success API response and
/// `InvalidUrl` for deep links that match no known entity pattern. Transport
/// and storage failures keep their own variants so callers can tell a dead
/// network apart from a server-side rejection.
#[derive(Debug, Error)]
pub enum Error {
    /// Login or token refresh rejected by the server; carries the server's
    /// `message` field verbatim.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-success API response outside the login/refresh flow.
    #[error("api error: {0}")]
    Api(String),

    /// Deep link matched no known entity-type pattern.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Underlying HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session store read/write failure.
    #[error("session store error: {0}")]
    Store(String),
}

impl Error {
    /// An expected field was absent from an API response.
    pub fn missing(field: &str) -> Self {
        Error::Api(format!("missing `{}` in response", field))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
