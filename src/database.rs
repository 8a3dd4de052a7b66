//! SQLite access layer: pool setup, schema bootstrap, and every query the
//! engine and handlers run.
//!
//! The schema carries the constraints the application logic leans on:
//! `users.email` and `users.referral_code` are UNIQUE, and the claim table's
//! primary key makes a (referrer, claimer) pair unredeemable twice. The
//! claim transaction in [`record_claim`] is the one place two rows must
//! change together.
use std::{str::FromStr, time::Duration};

use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use uuid::Uuid;

use crate::user::{PublicUser, User};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    referral_code TEXT UNIQUE,
    redeemed_code TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS referral_claims (
    referrer_id TEXT NOT NULL REFERENCES users(id),
    claimer_id TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (referrer_id, claimer_id)
);

CREATE INDEX IF NOT EXISTS idx_claims_referrer ON referral_claims(referrer_id);
"#;

pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool for tests. One connection is mandatory:
/// every sqlite `:memory:` connection is its own database.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    Ok(pool)
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

pub async fn find_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_code(
    pool: &SqlitePool,
    code: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE referral_code = ?1")
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub async fn insert_user(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    first_name: &str,
    last_name: &str,
) -> Result<PublicUser, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&id)
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(PublicUser {
        id,
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
    })
}

/// Sets the user's referral code only if none exists yet. Returns false when
/// the row already carried a code (a concurrent issue won the race).
pub async fn set_referral_code(
    pool: &SqlitePool,
    user_id: &str,
    code: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET referral_code = ?1 WHERE id = ?2 AND referral_code IS NULL")
            .bind(code)
            .bind(user_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn claim_exists(
    pool: &SqlitePool,
    referrer_id: &str,
    claimer_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM referral_claims WHERE referrer_id = ?1 AND claimer_id = ?2",
    )
    .bind(referrer_id)
    .bind(claimer_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub enum ClaimOutcome {
    Committed,
    /// The conditional update matched no row: the claimer's `redeemed_code`
    /// was already set when the transaction ran. Nothing was written.
    Lost,
}

/// The two-row claim write. Both the claim row and the claimer's
/// `redeemed_code` commit together or not at all. The update is conditional
/// on `redeemed_code IS NULL` so a racing claim that validated against stale
/// reads cannot redeem twice; the pre-checks in the engine are advisory,
/// this is the guard.
pub async fn record_claim(
    pool: &SqlitePool,
    referrer_id: &str,
    claimer_id: &str,
    code: &str,
) -> Result<ClaimOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated =
        sqlx::query("UPDATE users SET redeemed_code = ?1 WHERE id = ?2 AND redeemed_code IS NULL")
            .bind(code)
            .bind(claimer_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        return Ok(ClaimOutcome::Lost);
    }

    sqlx::query(
        "INSERT INTO referral_claims (referrer_id, claimer_id, created_at) VALUES (?1, ?2, ?3)",
    )
    .bind(referrer_id)
    .bind(claimer_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ClaimOutcome::Committed)
}

/// Everyone who redeemed this user's code, oldest claim first.
pub async fn list_referrals(
    pool: &SqlitePool,
    referrer_id: &str,
) -> Result<Vec<PublicUser>, sqlx::Error> {
    sqlx::query_as(
        "SELECT u.id, u.email, u.first_name, u.last_name \
         FROM referral_claims c JOIN users u ON u.id = c.claimer_id \
         WHERE c.referrer_id = ?1 ORDER BY c.created_at",
    )
    .bind(referrer_id)
    .fetch_all(pool)
    .await
}
