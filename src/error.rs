use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure the API can surface. Validation errors carry the exact
/// message the client sees; store and crypto failures are collapsed into
/// `Internal` and only logged in full.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User with this email already exists")]
    EmailTaken,

    #[error("You have already redeemed a referral code")]
    AlreadyRedeemed,

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("Invalid referral code")]
    InvalidCode,

    #[error("You have already used this referral code")]
    DuplicateClaim,

    #[error("User not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(e: argon2::password_hash::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_)
            | AppError::EmailTaken
            | AppError::AlreadyRedeemed
            | AppError::SelfReferral
            | AppError::InvalidCode
            | AppError::DuplicateClaim => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(source) => {
                error!("Internal error: {source}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
