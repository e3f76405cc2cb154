//! Loyalty programme handlers

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    loyalty::{self, ACHIEVEMENTS, REFERRAL_SIGNUP_POINTS, Tier},
    middleware::AuthUser,
    models::{
        ProfileView,
        loyalty::{AwardRequest, HistoryQuery, RedeemRequest, ReferralSignupRequest, ReferralStats},
    },
    repositories::loyalty::{Redemption, Referral},
    state::AppState,
};

/// An unlocked achievement with its catalogue entry
#[derive(Debug, Serialize)]
struct UnlockedAchievement {
    id: String,
    name: &'static str,
    description: &'static str,
    points: i64,
    unlocked_at: DateTime<Utc>,
}

/// The caller's profile, created with the welcome bonus on first access
pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ProfileView>> {
    let profile = state.loyalty_repository.ensure_profile(user.id).await?;
    Ok(Json(profile.into()))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let entries = state
        .loyalty_repository
        .history(user.id, query.limit())
        .await?;

    Ok(Json(json!({ "history": entries })))
}

pub async fn redeem(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RedeemRequest>,
) -> ApiResult<Json<Value>> {
    if payload.points <= 0 {
        return Err(ApiError::bad_request("Points to redeem must be positive"));
    }
    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or("Points redeemed");

    match state
        .loyalty_repository
        .redeem(user.id, payload.points, reason)
        .await?
    {
        Redemption::Redeemed(profile) => Ok(Json(json!({
            "message": "Points redeemed",
            "points_redeemed": payload.points,
            "available_points": profile.available_points,
        }))),
        Redemption::InsufficientPoints => Err(ApiError::bad_request("Not enough loyalty points")),
    }
}

/// Grant booking points by hand
pub async fn award(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(payload): Json<AwardRequest>,
) -> ApiResult<Json<Value>> {
    if payload.amount <= Decimal::ZERO {
        return Err(ApiError::bad_request("Amount must be positive"));
    }

    let award = state
        .loyalty_repository
        .award_for_booking(payload.user_id, payload.amount, payload.booking_id)
        .await?;
    info!(
        "Admin {} awarded {} points to {}",
        admin.id, award.points_earned, payload.user_id
    );

    Ok(Json(json!({ "award": award })))
}

pub async fn achievement_catalogue() -> Json<Value> {
    Json(json!({ "achievements": ACHIEVEMENTS }))
}

pub async fn my_achievements(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let unlocked: Vec<UnlockedAchievement> = state
        .loyalty_repository
        .achievements(user.id)
        .await?
        .into_iter()
        .filter_map(|entry| {
            let known = loyalty::achievement(&entry.achievement)?;
            Some(UnlockedAchievement {
                id: entry.achievement,
                name: known.name,
                description: known.description,
                points: entry.points,
                unlocked_at: entry.unlocked_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "unlocked": unlocked.len(),
        "total": ACHIEVEMENTS.len(),
        "achievements": unlocked,
    })))
}

pub async fn tiers() -> Json<Value> {
    let tiers: Vec<_> = Tier::ALL.iter().map(Tier::info).collect();
    Json(json!({ "tiers": tiers }))
}

pub async fn referral_signup(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ReferralSignupRequest>,
) -> ApiResult<Json<Value>> {
    let code = payload.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ApiError::bad_request("Referral code is required"));
    }

    match state.loyalty_repository.apply_referral(user.id, &code).await? {
        Referral::Applied(profile) => Ok(Json(json!({
            "message": "Referral applied",
            "points_awarded": REFERRAL_SIGNUP_POINTS,
            "profile": ProfileView::from(profile),
        }))),
        Referral::UnknownCode => Err(ApiError::not_found("Referral code not found")),
        Referral::OwnCode => Err(ApiError::bad_request("You cannot use your own referral code")),
        Referral::AlreadyReferred => Err(ApiError::conflict("A referral code was already applied")),
    }
}

pub async fn referral_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ReferralStats>> {
    let profile = state.loyalty_repository.ensure_profile(user.id).await?;
    Ok(Json(ReferralStats::from(&profile)))
}
