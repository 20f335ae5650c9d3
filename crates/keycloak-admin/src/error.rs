use thiserror::Error;

/// Errors returned by admin API calls.
///
/// The `Display` form of [`ApiError::Status`] is `"<code>: <body>"`, which is
/// what shows up in the logs of the load drivers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status code.
    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    /// The TCP connection could not be established.
    #[error("Can't connect to server: {0}")]
    Connect(String),

    /// Any other transport failure (timeouts, resets, TLS).
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, ApiError::Connect(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ApiError::Connect(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}
