//! End-to-end tests: the real router over an in-memory SQLite database,
//! driven request by request.
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use referral_server::{
    config::Config,
    database::{self, insert_user},
    error::AppError,
    referral,
    router,
    state::AppState,
};

async fn test_app() -> (Router, Arc<AppState>) {
    let pool = database::memory_pool().await.unwrap();

    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        cors_origin: "http://localhost:3000".to_string(),
    };

    let state = AppState::with_pool(config, pool);
    (router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut builder = Request::builder().method(method).uri(path);

    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, set_cookie, body)
}

/// Registers a user and returns the session cookie (`name=value` pair).
async fn register(app: &Router, email: &str, first_name: &str) -> String {
    let (status, set_cookie, _) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "password1",
            "firstName": first_name,
            "lastName": "Tester",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);

    let set_cookie = set_cookie.expect("register must set the auth cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

async fn generate_code_for(app: &Router, cookie: &str) -> String {
    let (status, _, body) = send(app, "POST", "/referral/generate", Some(cookie), None).await;

    assert_eq!(status, StatusCode::OK);
    body["referralCode"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_creates_user_with_no_codes() {
    let (app, _) = test_app().await;

    let (status, set_cookie, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": "a@x.com",
            "password": "password1",
            "firstName": "Ada",
            "lastName": "Lovelace",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["firstName"], "Ada");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["user"].get("password_hash").is_none());

    let cookie = set_cookie.unwrap();
    assert!(cookie.starts_with("auth-token="));
    assert!(cookie.contains("HttpOnly"));

    // A fresh account holds neither code.
    let session = cookie.split(';').next().unwrap().to_string();
    let (status, _, data) = send(&app, "GET", "/referral/data", Some(&session), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["referralCode"], Value::Null);
    assert_eq!(data["redeemedCode"], Value::Null);
    assert_eq!(data["referrals"], json!([]));
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let (app, _) = test_app().await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "a@x.com", "password": "password1", "firstName": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields are required");

    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": "a@x.com",
            "password": "short",
            "firstName": "Ada",
            "lastName": "Lovelace",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password must be at least 6 characters");
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let (app, _) = test_app().await;

    register(&app, "a@x.com", "Ada").await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": "a@x.com",
            "password": "password1",
            "firstName": "Imposter",
            "lastName": "Tester",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User with this email already exists");
}

#[tokio::test]
async fn login_flows() {
    let (app, _) = test_app().await;

    register(&app, "a@x.com", "Ada").await;

    // Wrong password and unknown email are indistinguishable.
    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "a@x.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@x.com", "password": "password1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, _, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "a@x.com", "password": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email and password are required");

    let (status, set_cookie, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "a@x.com", "password": "password1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["email"], "a@x.com");
    assert!(set_cookie.unwrap().starts_with("auth-token="));
}

#[tokio::test]
async fn logout_clears_cookie() {
    let (app, _) = test_app().await;

    let session = register(&app, "a@x.com", "Ada").await;

    let (status, set_cookie, body) =
        send(&app, "POST", "/auth/logout", Some(&session), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out");

    // Removal cookie: empty value, immediate expiry.
    let set_cookie = set_cookie.unwrap();
    assert!(set_cookie.starts_with("auth-token=;"));
}

#[tokio::test]
async fn authenticated_routes_reject_bad_sessions() {
    let (app, state) = test_app().await;

    for (method, path) in [
        ("POST", "/auth/logout"),
        ("POST", "/referral/generate"),
        ("POST", "/referral/claim"),
        ("GET", "/referral/data"),
    ] {
        let (status, _, body) = send(&app, method, path, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path} without cookie");
        assert_eq!(body["error"], "Unauthorized");

        let (status, _, _) =
            send(&app, method, path, Some("auth-token=not.a.token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path} with garbage token");
    }

    // A valid token for a since-deleted account is also rejected.
    let session = register(&app, "gone@x.com", "Ghost").await;
    sqlx::query("DELETE FROM users WHERE email = ?1")
        .bind("gone@x.com")
        .execute(&state.pool)
        .await
        .unwrap();

    let (status, _, _) = send(&app, "GET", "/referral/data", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_is_idempotent() {
    let (app, _) = test_app().await;

    let session = register(&app, "a@x.com", "Ada").await;

    let (status, _, first) =
        send(&app, "POST", "/referral/generate", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["message"], "Referral code generated successfully");

    let code = first["referralCode"].as_str().unwrap();
    assert_eq!(code.len(), 8);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let (status, _, second) =
        send(&app, "POST", "/referral/generate", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["referralCode"], first["referralCode"]);
    assert_eq!(second["message"], "Referral code already exists");
}

#[tokio::test]
async fn codes_are_unique_across_users() {
    let (app, _) = test_app().await;

    let a = register(&app, "a@x.com", "Ada").await;
    let b = register(&app, "b@x.com", "Bob").await;

    let code_a = generate_code_for(&app, &a).await;
    let code_b = generate_code_for(&app, &b).await;

    assert_ne!(code_a, code_b);
}

#[tokio::test]
async fn claim_end_to_end() {
    let (app, _) = test_app().await;

    let a = register(&app, "a@x.com", "Ada").await;
    let b = register(&app, "b@x.com", "Bob").await;
    let code = generate_code_for(&app, &a).await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&b),
        Some(json!({ "referralCode": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Referral code redeemed successfully");

    // The referrer sees the claimer; the claimer sees the code.
    let (_, _, a_data) = send(&app, "GET", "/referral/data", Some(&a), None).await;
    let referrals = a_data["referrals"].as_array().unwrap();
    assert_eq!(referrals.len(), 1);
    assert_eq!(referrals[0]["email"], "b@x.com");
    assert_eq!(referrals[0]["firstName"], "Bob");

    let (_, _, b_data) = send(&app, "GET", "/referral/data", Some(&b), None).await;
    assert_eq!(b_data["redeemedCode"], code.as_str());
    assert_eq!(b_data["referrals"], json!([]));

    // Second redemption attempt, same or different code, is refused.
    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&b),
        Some(json!({ "referralCode": code })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You have already redeemed a referral code");

    let c = register(&app, "c@x.com", "Cyd").await;
    let code_c = generate_code_for(&app, &c).await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&b),
        Some(json!({ "referralCode": code_c })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You have already redeemed a referral code");
}

#[tokio::test]
async fn claim_rejects_own_code() {
    let (app, _) = test_app().await;

    let a = register(&app, "a@x.com", "Ada").await;
    let code = generate_code_for(&app, &a).await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&a),
        Some(json!({ "referralCode": code })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot use your own referral code");
}

#[tokio::test]
async fn claim_rejects_unknown_and_empty_codes() {
    let (app, _) = test_app().await;

    let a = register(&app, "a@x.com", "Ada").await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&a),
        Some(json!({ "referralCode": "NOSUCH00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid referral code");

    let (status, _, body) = send(
        &app,
        "POST",
        "/referral/claim",
        Some(&a),
        Some(json!({ "referralCode": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Referral code is required");

    // Missing field behaves like empty.
    let (status, _, _) = send(&app, "POST", "/referral/claim", Some(&a), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_claims_redeem_once() {
    let (_, state) = test_app().await;
    let pool = &state.pool;

    let a = insert_user(pool, "a@x.com", "hash", "Ada", "Tester").await.unwrap();
    let b = insert_user(pool, "b@x.com", "hash", "Bob", "Tester").await.unwrap();
    let c = insert_user(pool, "c@x.com", "hash", "Cyd", "Tester").await.unwrap();

    let code_a = referral::issue_code(pool, &a.id).await.unwrap().code;
    let code_b = referral::issue_code(pool, &b.id).await.unwrap().code;

    // Two claims by the same user racing with two different valid codes:
    // exactly one may land.
    let (first, second) = tokio::join!(
        referral::claim(pool, &c.id, &code_a),
        referral::claim(pool, &c.id, &code_b),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    for result in [first, second] {
        if let Err(e) = result {
            assert!(matches!(e, AppError::AlreadyRedeemed), "unexpected: {e}");
        }
    }

    let profile = referral::profile(pool, &c.id).await.unwrap();
    let redeemed = profile.redeemed_code.unwrap();
    assert!(redeemed == code_a || redeemed == code_b);

    let total_claims: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referral_claims")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(total_claims, 1);
}

#[tokio::test]
async fn claim_pair_uniqueness_is_its_own_check() {
    let (_, state) = test_app().await;
    let pool = &state.pool;

    let a = insert_user(pool, "a@x.com", "hash", "Ada", "Tester").await.unwrap();
    let c = insert_user(pool, "c@x.com", "hash", "Cyd", "Tester").await.unwrap();
    let code = referral::issue_code(pool, &a.id).await.unwrap().code;

    // Fabricate the one state where pair uniqueness and the global
    // one-time rule disagree: a claim row exists but the claimer's
    // redeemed_code is still NULL.
    sqlx::query(
        "INSERT INTO referral_claims (referrer_id, claimer_id, created_at) \
         VALUES (?1, ?2, datetime('now'))",
    )
    .bind(&a.id)
    .bind(&c.id)
    .execute(pool)
    .await
    .unwrap();

    let err = referral::claim(pool, &c.id, &code).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateClaim), "unexpected: {err}");
}

#[tokio::test]
async fn issue_code_for_missing_user_is_not_found() {
    let (_, state) = test_app().await;

    let err = referral::issue_code(&state.pool, "no-such-id")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound), "unexpected: {err}");

    let err = referral::profile(&state.pool, "no-such-id")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound), "unexpected: {err}");
}
