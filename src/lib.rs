//! Backend for a referral-code web application.
//!
//! Users register and log in with email + password; the session is a signed
//! JWT carried in an HTTP-only cookie. Each user can generate one shareable
//! referral code and redeem someone else's code exactly once. All state
//! lives in SQLite; the handlers hold nothing in process beyond the pool.
//!
//! # Endpoints
//!
//! - `POST /auth/register` — create an account, sets the auth cookie
//! - `POST /auth/login` — verify credentials, sets the auth cookie
//! - `POST /auth/logout` — clears the auth cookie
//! - `POST /referral/generate` — issue (or re-read) the caller's code
//! - `POST /referral/claim` — redeem another user's code, once ever
//! - `GET /referral/data` — caller's profile plus who redeemed their code
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod referral;
pub mod routes;
pub mod state;
pub mod user;

use routes::{
    claim_handler, data_handler, generate_handler, login_handler, logout_handler,
    register_handler,
};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .expect("Invalid CORS origin");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(origin)
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/referral/generate", post(generate_handler))
        .route("/referral/claim", post(claim_handler))
        .route("/referral/data", get(data_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
