//! Passwords, session tokens, and the authenticated-request extractor.
//!
//! A session is a 7-day HS256 JWT carrying the public user fields, stored in
//! an HTTP-only SameSite=Lax cookie. Every authenticated route re-checks
//! that the token's user still exists, so a deleted account cannot keep
//! riding a valid token.
use std::sync::Arc;

use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString, rand_core::OsRng},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{database::find_user_by_id, error::AppError, state::AppState, user::PublicUser};

pub const AUTH_COOKIE: &str = "auth-token";

const TOKEN_TTL_DAYS: i64 = 7;

/// Encoding and decoding halves of the session-signing secret, built once
/// at startup from config and carried in [`AppState`].
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token(user: &PublicUser, keys: &JwtKeys) -> Result<String, AppError> {
    let now = Utc::now();

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };

    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &keys.encoding,
    )?)
}

/// `None` for anything other than a well-formed, correctly signed,
/// unexpired token.
pub fn verify_token(token: &str, keys: &JwtKeys) -> Option<Claims> {
    jsonwebtoken::decode::<Claims>(token, &keys.decoding, &Validation::default())
        .ok()
        .map(|data| data.claims)
}

pub fn auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(TOKEN_TTL_DAYS))
        .build()
}

pub fn expired_auth_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// The caller's verified identity. Present in a handler's signature means
/// the route requires a live session; extraction fails with 401 otherwise.
pub struct AuthUser {
    pub id: String,
    pub user: PublicUser,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let token = jar
            .get(AUTH_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or(AppError::Unauthorized)?;

        let claims = verify_token(&token, &state.jwt).ok_or(AppError::Unauthorized)?;

        // The token may outlive the account.
        let user = find_user_by_id(&state.pool, &claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(Self {
            id: user.id.clone(),
            user: PublicUser::from(&user),
        })
    }
}
