//! The referral engine: code generation, one-time issuance, the claim
//! validation ladder, and the profile read.
//!
//! Nothing here holds state between calls; every rule that must survive
//! concurrent requests is backed by a constraint or conditional write in
//! [`crate::database`]. The checks below exist to hand the client a precise
//! error, not to be the last line of defense.
use std::future::Future;

use rand::Rng;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    database::{
        ClaimOutcome, claim_exists, find_user_by_code, find_user_by_id, is_unique_violation,
        list_referrals, record_claim, set_referral_code,
    },
    error::AppError,
    user::{PublicUser, ReferralData},
};

/// Uppercase letters and digits only, so codes survive being read aloud
/// and typed on phones.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const CODE_LENGTH: usize = 8;

/// 36^8 codes make collisions vanishingly rare; the cap exists so a broken
/// store can't spin this into a livelock.
const MAX_GENERATION_ATTEMPTS: usize = 10;

/// One candidate code, uniform over the alphabet. Uniqueness is the
/// caller's problem.
pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug)]
pub struct IssuedCode {
    pub code: String,
    /// False when the user already had a code and we simply returned it.
    pub fresh: bool,
}

/// The bounded generate-until-unused loop. The store lookup is injected so
/// the retry behavior can be driven without a database.
async fn find_unused_code<G, F, Fut>(mut generate: G, mut taken: F) -> Result<String, AppError>
where
    G: FnMut() -> String,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, AppError>>,
{
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = generate();

        if taken(candidate.clone()).await? {
            info!("Referral code collision, regenerating");
            continue;
        }

        return Ok(candidate);
    }

    warn!("Referral code generation exhausted");
    Err(AppError::Internal(
        "referral code generation exhausted".into(),
    ))
}

/// Returns the user's referral code, creating it on first call. Idempotent:
/// once a code exists it is returned unchanged forever.
pub async fn issue_code(pool: &SqlitePool, user_id: &str) -> Result<IssuedCode, AppError> {
    let user = find_user_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(code) = user.referral_code {
        return Ok(IssuedCode { code, fresh: false });
    }

    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let candidate = find_unused_code(
            || generate_code(&mut rand::thread_rng()),
            |code| async move {
                Ok::<bool, AppError>(find_user_by_code(pool, &code).await?.is_some())
            },
        )
        .await?;

        match set_referral_code(pool, user_id, &candidate).await {
            Ok(true) => {
                info!("Issued referral code for user {user_id}");
                return Ok(IssuedCode {
                    code: candidate,
                    fresh: true,
                });
            }
            Ok(false) => {
                // A concurrent request issued the code between our lookup
                // and the update. Return what it persisted.
                let user = find_user_by_id(pool, user_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                let code = user.referral_code.ok_or(AppError::NotFound)?;
                return Ok(IssuedCode { code, fresh: false });
            }
            // Unique-constraint hit: someone grabbed this exact code
            // between the lookup and the update. Roll the dice again.
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    warn!("Referral code generation exhausted for user {user_id}");
    Err(AppError::Internal(
        "referral code generation exhausted".into(),
    ))
}

/// Redeem `code` for `claimer_id`. The checks run in a fixed order so each
/// failure mode maps to one stable client-facing error.
pub async fn claim(pool: &SqlitePool, claimer_id: &str, code: &str) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::InvalidInput("Referral code is required"));
    }

    let claimer = find_user_by_id(pool, claimer_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if claimer.redeemed_code.is_some() {
        return Err(AppError::AlreadyRedeemed);
    }

    if claimer.referral_code.as_deref() == Some(code) {
        return Err(AppError::SelfReferral);
    }

    let referrer = find_user_by_code(pool, code)
        .await?
        .ok_or(AppError::InvalidCode)?;

    // Pair-level uniqueness is a different rule than the global one-time
    // check above, even though normal flow can't reach this with the
    // one-time check passing. Kept deliberately.
    if claim_exists(pool, &referrer.id, claimer_id).await? {
        return Err(AppError::DuplicateClaim);
    }

    match record_claim(pool, &referrer.id, claimer_id, code).await? {
        ClaimOutcome::Committed => {
            info!("User {claimer_id} redeemed a code of user {}", referrer.id);
            Ok(())
        }
        // Lost the race to a concurrent claim by the same user.
        ClaimOutcome::Lost => Err(AppError::AlreadyRedeemed),
    }
}

/// Read-only view for `GET /referral/data`.
pub async fn profile(pool: &SqlitePool, user_id: &str) -> Result<ReferralData, AppError> {
    let user = find_user_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let referrals = list_referrals(pool, &user.id).await?;

    Ok(ReferralData {
        user: PublicUser::from(&user),
        referral_code: user.referral_code,
        redeemed_code: user.redeemed_code,
        referrals,
    })
}
