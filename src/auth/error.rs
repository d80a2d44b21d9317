use axum::http::StatusCode;
use thiserror::Error;

/// Reasons a caller is turned away before a relay session exists.
/// The display text is what the client is told.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Club not found")]
    ClubNotFound,
    #[error("Missing or malformed JWT")]
    MissingToken,
    #[error("Missing or malformed JWT")]
    MalformedToken,
    #[error("Invalid or Expired JWT")]
    InvalidToken,
    #[error("You are not a member of this club")]
    NotMember,
    #[error("Something went wrong")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::ClubNotFound => StatusCode::NOT_FOUND,
            AuthError::MissingToken | AuthError::MalformedToken | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::NotMember => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
