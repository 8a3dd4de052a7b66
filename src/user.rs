//! User records and the request/response payloads built from them.
//!
//! Wire field names are camelCase to match the existing frontend; column
//! names stay snake_case. `User` is the full row and never leaves the
//! process — responses carry [`PublicUser`].
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// The code this user shares with others. Set at most once, lazily.
    pub referral_code: Option<String>,
    /// The code this user has redeemed. Set at most once, ever.
    pub redeemed_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The identity shape safe to send to clients (no hash, no codes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

// Request payloads. Fields default to empty so a missing field and an empty
// field produce the same 400 at validation, instead of a deserialize reject.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPayload {
    #[serde(default)]
    pub referral_code: String,
}

// Response payloads.

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub referral_code: String,
    pub message: &'static str,
}

/// Body of `GET /referral/data`: who the caller is, both of their codes,
/// and everyone who redeemed their code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralData {
    pub user: PublicUser,
    pub referral_code: Option<String>,
    pub redeemed_code: Option<String>,
    pub referrals: Vec<PublicUser>,
}
