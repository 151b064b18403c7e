use thiserror::Error;

/// Failure of a call to the attendance server.
///
/// `Unauthenticated` is the only hard stop: the active loop halts and the user
/// is sent back to the login page. Everything else is transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("session expired")]
    Unauthenticated,

    #[error("server error: {status} {body}")]
    Server { status: u16, body: String },

    #[error("{0}")]
    Transport(String),

    #[error("invalid server response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthenticated)
    }

    /// Server errors keep at most 100 characters of the body.
    pub(crate) fn server(status: u16, body: &str) -> Self {
        ApiError::Server {
            status,
            body: body.chars().take(100).collect(),
        }
    }
}
