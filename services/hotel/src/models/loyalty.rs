//! Loyalty profile, points ledger and achievement models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::loyalty::{self, Tier, TierInfo, TierProgress};

/// Loyalty profile entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LoyaltyProfile {
    pub user_id: Uuid,
    pub tier: String,
    pub total_points: i64,
    pub available_points: i64,
    pub lifetime_points: i64,
    pub total_bookings: i32,
    pub total_spend: Decimal,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub referral_rewarded: bool,
    pub referrals_invited: i32,
    pub referrals_completed: i32,
    pub referral_points_earned: i64,
    pub tier_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyProfile {
    pub fn tier(&self) -> Tier {
        Tier::from_key(&self.tier).unwrap_or(Tier::Explorer)
    }
}

/// Profile with its tier perks and progress to the next tier
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: LoyaltyProfile,
    pub tier_info: TierInfo,
    pub progress: TierProgress,
}

impl From<LoyaltyProfile> for ProfileView {
    fn from(profile: LoyaltyProfile) -> Self {
        let tier = profile.tier();
        Self {
            tier_info: tier.info(),
            progress: loyalty::tier_progress(tier, profile.total_bookings, profile.total_spend),
            profile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsKind {
    Earned,
    Redeemed,
    Bonus,
}

impl PointsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsKind::Earned => "earned",
            PointsKind::Redeemed => "redeemed",
            PointsKind::Bonus => "bonus",
        }
    }
}

/// One ledger line; redemptions carry negative points
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PointsEntry {
    pub id: Uuid,
    pub kind: String,
    pub points: i64,
    pub reason: String,
    pub booking_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserAchievement {
    pub achievement: String,
    pub points: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// Result of awarding booking points
#[derive(Debug, Clone, Serialize)]
pub struct Award {
    pub points_earned: i64,
    pub available_points: i64,
    pub tier: Tier,
    pub tier_changed: bool,
    pub achievements_unlocked: Vec<&'static str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    pub points: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwardRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralSignupRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
    pub referral_code: String,
    pub invited: i32,
    pub completed: i32,
    pub points_earned: i64,
}

impl From<&LoyaltyProfile> for ReferralStats {
    fn from(profile: &LoyaltyProfile) -> Self {
        Self {
            referral_code: profile.referral_code.clone(),
            invited: profile.referrals_invited,
            completed: profile.referrals_completed,
            points_earned: profile.referral_points_earned,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tier: &str, bookings: i32, spend: i64) -> LoyaltyProfile {
        LoyaltyProfile {
            user_id: Uuid::new_v4(),
            tier: tier.to_string(),
            total_points: 500,
            available_points: 500,
            lifetime_points: 500,
            total_bookings: bookings,
            total_spend: Decimal::from(spend),
            referral_code: "ABCD1234".to_string(),
            referred_by: None,
            referral_rewarded: false,
            referrals_invited: 2,
            referrals_completed: 1,
            referral_points_earned: 2000,
            tier_updated_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_view_carries_progress() {
        let view = ProfileView::from(profile("ADVENTURER", 10, 3000));
        assert_eq!(view.tier_info.name, "Adventurer");
        assert_eq!(view.progress.next_tier, Some("Globetrotter"));
        assert_eq!(view.progress.bookings_needed, 5);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["tier"], "ADVENTURER");
        assert_eq!(json["tier_info"]["discount_percent"], 10);
    }

    #[test]
    fn test_unknown_tier_falls_back_to_explorer() {
        assert_eq!(profile("GOLD", 0, 0).tier(), Tier::Explorer);
    }

    #[test]
    fn test_referral_stats() {
        let stats = ReferralStats::from(&profile("EXPLORER", 0, 0));
        assert_eq!(stats.invited, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.points_earned, 2000);
    }
}
