use thiserror::Error;

/// Errors surfaced by the client core.
///
/// Network failures never propagate as panics or kill a controller task;
/// they are mapped to view state via [`ClientError::user_message`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The bearer credential was rejected (HTTP 401).
    #[error("session expired")]
    SessionExpired,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered but refused the request.
    #[error("server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    /// The push channel could not be established.
    #[error("push transport error: {0}")]
    Transport(String),

    /// A push send was attempted while the live channel is down.
    /// Triggers the REST fallback on the send path.
    #[error("push transport is not connected")]
    TransportClosed,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// The inline text shown in the affected panel, distinguishing an
    /// expired session from any other failure.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::SessionExpired => {
                "Your session has expired. Please sign in again.".into()
            }
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}
