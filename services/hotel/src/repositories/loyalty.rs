//! Loyalty repository: profiles, the points ledger, achievements and referrals

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    loyalty::{
        self, Achievement, AchievementStats, POINTS_VALIDITY_DAYS, REFERRAL_COMPLETION_POINTS,
        REFERRAL_SIGNUP_POINTS, Tier, WELCOME_POINTS,
    },
    models::{
        LoyaltyProfile, PointsKind,
        loyalty::{Award, PointsEntry, UserAchievement},
    },
};

const PROFILE_COLUMNS: &str = "user_id, tier, total_points, available_points, lifetime_points, \
     total_bookings, total_spend, referral_code, referred_by, referral_rewarded, referrals_invited, \
     referrals_completed, referral_points_earned, tier_updated_at, created_at, updated_at";

/// Attempts at drawing an unused referral code
const REFERRAL_CODE_ATTEMPTS: usize = 5;

/// Outcome of spending points
#[derive(Debug)]
pub enum Redemption {
    Redeemed(LoyaltyProfile),
    InsufficientPoints,
}

/// Outcome of signing up with a referral code
#[derive(Debug)]
pub enum Referral {
    Applied(LoyaltyProfile),
    UnknownCode,
    OwnCode,
    AlreadyReferred,
}

/// Add points to a profile and write the ledger line
async fn credit(
    conn: &mut PgConnection,
    user_id: Uuid,
    points: i64,
    kind: PointsKind,
    reason: &str,
    booking_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE loyalty_profiles SET
            total_points = total_points + $2,
            available_points = available_points + $2,
            lifetime_points = lifetime_points + $2,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(points)
    .execute(&mut *conn)
    .await?;

    let expires_at = (kind == PointsKind::Earned)
        .then(|| Utc::now() + Duration::days(POINTS_VALIDITY_DAYS));
    sqlx::query(
        r#"
        INSERT INTO points_history (user_id, kind, points, reason, booking_id, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(points)
    .bind(reason)
    .bind(booking_id)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loyalty repository
#[derive(Clone)]
pub struct LoyaltyRepository {
    pool: PgPool,
}

impl LoyaltyRepository {
    /// Create a new loyalty repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<LoyaltyProfile>> {
        let profile = sqlx::query_as::<_, LoyaltyProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM loyalty_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// The user's profile, opened with the welcome bonus on first access
    pub async fn ensure_profile(&self, user_id: Uuid) -> Result<LoyaltyProfile> {
        if let Some(profile) = self.find(user_id).await? {
            return Ok(profile);
        }

        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = loyalty::referral_code(user_id);
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query_as::<_, LoyaltyProfile>(&format!(
                r#"
                INSERT INTO loyalty_profiles (user_id, referral_code)
                VALUES ($1, $2)
                ON CONFLICT (user_id) DO NOTHING
                RETURNING {PROFILE_COLUMNS}
                "#
            ))
            .bind(user_id)
            .bind(&code)
            .fetch_optional(&mut *tx)
            .await;

            match inserted {
                Ok(Some(_)) => {
                    credit(&mut tx, user_id, WELCOME_POINTS, PointsKind::Bonus, "Welcome bonus", None)
                        .await?;
                    tx.commit().await?;
                    info!("Loyalty profile opened for user {}", user_id);
                }
                // Opened concurrently by another request
                Ok(None) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    warn!("Referral code {} already taken, drawing another", code);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            return match self.find(user_id).await? {
                Some(profile) => Ok(profile),
                None => bail!("loyalty profile for {} missing after creation", user_id),
            };
        }

        bail!("no unused referral code found for user {}", user_id)
    }

    /// Credit the points earned by paying `amount`.
    ///
    /// Points are earned at the multiplier of the tier held before this
    /// booking; the tier is then recomputed from the new totals.
    pub async fn award_for_booking(
        &self,
        user_id: Uuid,
        amount: Decimal,
        booking_id: Option<Uuid>,
    ) -> Result<Award> {
        self.ensure_profile(user_id).await?;
        let mut tx = self.pool.begin().await?;

        let profile = sqlx::query_as::<_, LoyaltyProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM loyalty_profiles WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let before = profile.tier();
        let earned = loyalty::booking_points(amount, before);
        let bookings = profile.total_bookings + 1;
        let spend = profile.total_spend + amount.max(Decimal::ZERO);
        let after = Tier::for_activity(bookings, spend).max(before);

        sqlx::query(
            r#"
            UPDATE loyalty_profiles SET
                total_bookings = $2,
                total_spend = $3,
                tier = $4,
                tier_updated_at = CASE WHEN tier <> $4 THEN NOW() ELSE tier_updated_at END
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(bookings)
        .bind(spend)
        .bind(after.key())
        .execute(&mut *tx)
        .await?;

        credit(
            &mut tx,
            user_id,
            earned,
            PointsKind::Earned,
            &format!("Booking of {}", amount.round_dp(2)),
            booking_id,
        )
        .await?;
        tx.commit().await?;

        if after != before {
            info!("User {} reached tier {}", user_id, after.key());
        }

        let unlocked = self.check_achievements(user_id).await?;
        let available_points = self
            .find(user_id)
            .await?
            .map(|p| p.available_points)
            .unwrap_or_default();

        Ok(Award {
            points_earned: earned,
            available_points,
            tier: after,
            tier_changed: after != before,
            achievements_unlocked: unlocked.iter().map(|a| a.id).collect(),
        })
    }

    /// Spend points; the caller has checked `points` is positive
    pub async fn redeem(&self, user_id: Uuid, points: i64, reason: &str) -> Result<Redemption> {
        self.ensure_profile(user_id).await?;
        let mut tx = self.pool.begin().await?;

        let profile = sqlx::query_as::<_, LoyaltyProfile>(&format!(
            r#"
            UPDATE loyalty_profiles SET available_points = available_points - $2, updated_at = NOW()
            WHERE user_id = $1 AND available_points >= $2
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(points)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(profile) = profile else {
            return Ok(Redemption::InsufficientPoints);
        };

        sqlx::query("INSERT INTO points_history (user_id, kind, points, reason) VALUES ($1, $2, $3, $4)")
            .bind(user_id)
            .bind(PointsKind::Redeemed.as_str())
            .bind(-points)
            .bind(reason)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("User {} redeemed {} points", user_id, points);
        Ok(Redemption::Redeemed(profile))
    }

    /// Ledger lines, newest first
    pub async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<PointsEntry>> {
        let entries = sqlx::query_as::<_, PointsEntry>(
            r#"
            SELECT id, kind, points, reason, booking_id, expires_at, created_at
            FROM points_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn achievements(&self, user_id: Uuid) -> Result<Vec<UserAchievement>> {
        let achievements = sqlx::query_as::<_, UserAchievement>(
            "SELECT achievement, points, unlocked_at FROM user_achievements WHERE user_id = $1 ORDER BY unlocked_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(achievements)
    }

    /// Activity figures of one member, gathered from bookings and reviews
    async fn achievement_stats(&self, profile: &LoyaltyProfile) -> Result<AchievementStats> {
        let bookings = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS bookings,
                COUNT(*) FILTER (WHERE b.check_in - b.created_at::date >= 90) AS early_bookings,
                COUNT(*) FILTER (WHERE b.check_in - b.created_at::date <= 1) AS last_minute_bookings,
                COUNT(DISTINCT h.country) AS countries,
                COUNT(*) FILTER (WHERE EXTRACT(ISODOW FROM b.check_in) IN (5, 6)) AS weekend_bookings,
                COUNT(*) FILTER (WHERE b.travel_type = 'business') AS business_bookings,
                COUNT(*) FILTER (WHERE b.travel_type = 'family') AS family_bookings,
                COUNT(*) FILTER (WHERE h.rating >= 9) AS luxury_bookings,
                COALESCE(SUM(b.savings + b.points_discount), 0) AS total_savings
            FROM bookings b JOIN hotels h ON h.id = b.hotel_id
            WHERE b.user_id = $1 AND b.status <> 'cancelled'
            "#,
        )
        .bind(profile.user_id)
        .fetch_one(&self.pool)
        .await?;

        let reviews = sqlx::query(
            r#"
            SELECT COUNT(*) AS reviews, COALESCE(SUM(cardinality(photos)), 0)::BIGINT AS photos
            FROM reviews WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .fetch_one(&self.pool)
        .await?;

        let booking_dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT created_at::date FROM bookings WHERE user_id = $1 AND status <> 'cancelled'",
        )
        .bind(profile.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(AchievementStats {
            bookings: bookings.try_get("bookings")?,
            early_bookings: bookings.try_get("early_bookings")?,
            last_minute_bookings: bookings.try_get("last_minute_bookings")?,
            countries: bookings.try_get("countries")?,
            reviews: reviews.try_get("reviews")?,
            review_photos: reviews.try_get("photos")?,
            monthly_streak: loyalty::monthly_streak(&booking_dates),
            total_spend: profile.total_spend,
            referrals_completed: i64::from(profile.referrals_completed),
            weekend_bookings: bookings.try_get("weekend_bookings")?,
            business_bookings: bookings.try_get("business_bookings")?,
            family_bookings: bookings.try_get("family_bookings")?,
            luxury_bookings: bookings.try_get("luxury_bookings")?,
            total_savings: bookings.try_get("total_savings")?,
        })
    }

    /// Unlock every achievement the member now qualifies for and grant its points
    pub async fn check_achievements(&self, user_id: Uuid) -> Result<Vec<&'static Achievement>> {
        let Some(profile) = self.find(user_id).await? else {
            return Ok(Vec::new());
        };

        let stats = self.achievement_stats(&profile).await?;
        let unlocked: Vec<String> = self
            .achievements(user_id)
            .await?
            .into_iter()
            .map(|a| a.achievement)
            .collect();

        let mut granted = Vec::new();
        for achievement in loyalty::newly_unlocked(&stats, &unlocked) {
            let mut tx = self.pool.begin().await?;
            let inserted = sqlx::query(
                r#"
                INSERT INTO user_achievements (user_id, achievement, points)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, achievement) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(achievement.id)
            .bind(achievement.points)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                continue;
            }

            credit(
                &mut tx,
                user_id,
                achievement.points,
                PointsKind::Bonus,
                &format!("Achievement unlocked: {}", achievement.name),
                None,
            )
            .await?;
            tx.commit().await?;

            info!("User {} unlocked achievement {}", user_id, achievement.id);
            granted.push(achievement);
        }

        Ok(granted)
    }

    pub async fn find_by_referral_code(&self, code: &str) -> Result<Option<LoyaltyProfile>> {
        let profile = sqlx::query_as::<_, LoyaltyProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM loyalty_profiles WHERE referral_code = $1"
        ))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Attach the user to a referrer and grant the signup bonus
    pub async fn apply_referral(&self, user_id: Uuid, code: &str) -> Result<Referral> {
        let profile = self.ensure_profile(user_id).await?;
        let Some(referrer) = self.find_by_referral_code(code).await? else {
            return Ok(Referral::UnknownCode);
        };
        if referrer.user_id == user_id {
            return Ok(Referral::OwnCode);
        }
        if profile.referred_by.is_some() {
            return Ok(Referral::AlreadyReferred);
        }

        let mut tx = self.pool.begin().await?;
        let attached = sqlx::query(
            "UPDATE loyalty_profiles SET referred_by = $2 WHERE user_id = $1 AND referred_by IS NULL",
        )
        .bind(user_id)
        .bind(referrer.user_id)
        .execute(&mut *tx)
        .await?;
        if attached.rows_affected() == 0 {
            return Ok(Referral::AlreadyReferred);
        }

        credit(
            &mut tx,
            user_id,
            REFERRAL_SIGNUP_POINTS,
            PointsKind::Bonus,
            "Referral signup bonus",
            None,
        )
        .await?;
        sqlx::query(
            "UPDATE loyalty_profiles SET referrals_invited = referrals_invited + 1 WHERE user_id = $1",
        )
        .bind(referrer.user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("User {} signed up with referral from {}", user_id, referrer.user_id);
        match self.find(user_id).await? {
            Some(profile) => Ok(Referral::Applied(profile)),
            None => bail!("loyalty profile for {} missing after referral", user_id),
        }
    }

    /// Reward the referrer once the referred member has booked.
    ///
    /// Returns the referrer when this call granted the reward.
    pub async fn complete_referral(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE loyalty_profiles SET referral_rewarded = TRUE
            WHERE user_id = $1 AND referred_by IS NOT NULL AND NOT referral_rewarded
            RETURNING referred_by
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let referrer: Uuid = row.try_get("referred_by")?;

        credit(
            &mut tx,
            referrer,
            REFERRAL_COMPLETION_POINTS,
            PointsKind::Bonus,
            "Referral completed",
            None,
        )
        .await?;
        sqlx::query(
            r#"
            UPDATE loyalty_profiles SET
                referrals_completed = referrals_completed + 1,
                referral_points_earned = referral_points_earned + $2
            WHERE user_id = $1
            "#,
        )
        .bind(referrer)
        .bind(REFERRAL_COMPLETION_POINTS)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Referral of user {} completed for referrer {}", user_id, referrer);
        self.check_achievements(referrer).await?;
        Ok(Some(referrer))
    }
}
