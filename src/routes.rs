//! HTTP handlers. Each one validates the request at the boundary, calls
//! into [`crate::auth`] or [`crate::referral`], and shapes the JSON reply.
use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::CookieJar;
use tracing::info;

use crate::{
    auth::{AuthUser, auth_cookie, expired_auth_cookie, hash_password, issue_token, verify_password},
    database::{find_user_by_email, insert_user, is_unique_violation},
    error::AppError,
    referral,
    state::AppState,
    user::{
        AuthResponse, ClaimPayload, GenerateResponse, LoginPayload, MessageResponse,
        PublicUser, ReferralData, RegisterPayload,
    },
};

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.email.is_empty()
        || payload.password.is_empty()
        || payload.first_name.is_empty()
        || payload.last_name.is_empty()
    {
        return Err(AppError::InvalidInput("All fields are required"));
    }

    if payload.password.len() < 6 {
        return Err(AppError::InvalidInput(
            "Password must be at least 6 characters",
        ));
    }

    if find_user_by_email(&state.pool, &payload.email)
        .await?
        .is_some()
    {
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_password(&payload.password)?;

    let user = match insert_user(
        &state.pool,
        &payload.email,
        &password_hash,
        &payload.first_name,
        &payload.last_name,
    )
    .await
    {
        Ok(user) => user,
        // Concurrent registration with the same email slipped past the
        // pre-check; the UNIQUE constraint caught it.
        Err(e) if is_unique_violation(&e) => return Err(AppError::EmailTaken),
        Err(e) => return Err(e.into()),
    };

    info!("Registered user {}", user.id);

    let token = issue_token(&user, &state.jwt)?;

    Ok((
        jar.add(auth_cookie(token)),
        Json(AuthResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::InvalidInput("Email and password are required"));
    }

    // Unknown email and wrong password produce the same 401.
    let user = find_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    let user = PublicUser::from(&user);
    let token = issue_token(&user, &state.jwt)?;

    info!("User {} logged in", user.id);

    Ok((
        jar.add(auth_cookie(token)),
        Json(AuthResponse {
            message: "Login successful",
            user,
        }),
    ))
}

pub async fn logout_handler(_user: AuthUser, jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(expired_auth_cookie()),
        Json(MessageResponse {
            message: "Logged out",
        }),
    )
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<GenerateResponse>, AppError> {
    let issued = referral::issue_code(&state.pool, &user.id).await?;

    let message = if issued.fresh {
        "Referral code generated successfully"
    } else {
        "Referral code already exists"
    };

    Ok(Json(GenerateResponse {
        referral_code: issued.code,
        message,
    }))
}

pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ClaimPayload>,
) -> Result<Json<MessageResponse>, AppError> {
    referral::claim(&state.pool, &user.id, &payload.referral_code).await?;

    Ok(Json(MessageResponse {
        message: "Referral code redeemed successfully",
    }))
}

pub async fn data_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ReferralData>, AppError> {
    let data = referral::profile(&state.pool, &user.id).await?;

    Ok(Json(data))
}
