//! Loyalty programme rules: tiers, point earning, achievements and referral
//! codes.

use chrono::{Datelike, NaiveDate};
use rand::{Rng, distributions::Alphanumeric};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;
use uuid::Uuid;

/// Points granted when a profile is created
pub const WELCOME_POINTS: i64 = 500;
/// Points granted to a new member who signs up with a referral code
pub const REFERRAL_SIGNUP_POINTS: i64 = 1_000;
/// Points granted to the referrer when the referred member books for the first time
pub const REFERRAL_COMPLETION_POINTS: i64 = 2_000;
/// Booking points expire after a year
pub const POINTS_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Explorer,
    Adventurer,
    Globetrotter,
    Elite,
}

/// Thresholds and perks of one tier
#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    pub tier: Tier,
    pub name: &'static str,
    pub min_bookings: i32,
    pub min_spend: Decimal,
    pub discount_percent: i32,
    pub points_multiplier: Decimal,
    pub benefits: &'static [&'static str],
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Explorer, Tier::Adventurer, Tier::Globetrotter, Tier::Elite];

    pub fn key(&self) -> &'static str {
        match self {
            Tier::Explorer => "EXPLORER",
            Tier::Adventurer => "ADVENTURER",
            Tier::Globetrotter => "GLOBETROTTER",
            Tier::Elite => "ELITE",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Tier::ALL.into_iter().find(|tier| tier.key() == key)
    }

    pub fn info(&self) -> TierInfo {
        match self {
            Tier::Explorer => TierInfo {
                tier: *self,
                name: "Explorer",
                min_bookings: 0,
                min_spend: Decimal::ZERO,
                discount_percent: 5,
                points_multiplier: Decimal::ONE,
                benefits: &[
                    "5% discount on select properties",
                    "Priority customer support",
                    "Early access to flash sales",
                    "Welcome bonus: 500 points",
                ],
            },
            Tier::Adventurer => TierInfo {
                tier: *self,
                name: "Adventurer",
                min_bookings: 5,
                min_spend: Decimal::from(2_000),
                discount_percent: 10,
                points_multiplier: Decimal::new(15, 1),
                benefits: &[
                    "10% discount on select properties",
                    "Free room upgrades (subject to availability)",
                    "Late check-out",
                    "Priority support 24/7",
                ],
            },
            Tier::Globetrotter => TierInfo {
                tier: *self,
                name: "Globetrotter",
                min_bookings: 15,
                min_spend: Decimal::from(5_000),
                discount_percent: 15,
                points_multiplier: Decimal::from(3),
                benefits: &[
                    "15% discount on all properties",
                    "Guaranteed room upgrade",
                    "Free breakfast",
                    "Late check-out until 2 PM",
                    "Triple points on all bookings",
                ],
            },
            Tier::Elite => TierInfo {
                tier: *self,
                name: "Paradise Elite",
                min_bookings: 30,
                min_spend: Decimal::from(10_000),
                discount_percent: 20,
                points_multiplier: Decimal::from(4),
                benefits: &[
                    "20% discount on all properties",
                    "Free breakfast and dinner",
                    "Flexible cancellation",
                    "Annual free night",
                    "Quadruple points on all bookings",
                ],
            },
        }
    }

    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Explorer => Some(Tier::Adventurer),
            Tier::Adventurer => Some(Tier::Globetrotter),
            Tier::Globetrotter => Some(Tier::Elite),
            Tier::Elite => None,
        }
    }

    /// Highest tier whose booking and spend thresholds are both met
    pub fn for_activity(bookings: i32, spend: Decimal) -> Tier {
        Tier::ALL
            .into_iter()
            .rev()
            .find(|tier| {
                let info = tier.info();
                bookings >= info.min_bookings && spend >= info.min_spend
            })
            .unwrap_or(Tier::Explorer)
    }
}

/// How far a member is from the next tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProgress {
    pub current_bookings: i32,
    pub current_spend: Decimal,
    pub next_tier: Option<&'static str>,
    pub bookings_needed: i32,
    pub spend_needed: Decimal,
    pub progress_percent: f64,
}

pub fn tier_progress(tier: Tier, bookings: i32, spend: Decimal) -> TierProgress {
    let Some(next) = tier.next().map(|t| t.info()) else {
        return TierProgress {
            current_bookings: bookings,
            current_spend: spend,
            next_tier: None,
            bookings_needed: 0,
            spend_needed: Decimal::ZERO,
            progress_percent: 100.0,
        };
    };

    let booking_percent = f64::from(bookings) / f64::from(next.min_bookings) * 100.0;
    let spend_percent = (spend / next.min_spend * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);

    TierProgress {
        current_bookings: bookings,
        current_spend: spend,
        next_tier: Some(next.name),
        bookings_needed: (next.min_bookings - bookings).max(0),
        spend_needed: (next.min_spend - spend).max(Decimal::ZERO),
        progress_percent: booking_percent.min(spend_percent).clamp(0.0, 100.0),
    }
}

/// Points earned for paying `amount` while holding `tier`: ten per currency
/// unit, scaled by the tier multiplier, both steps rounded down.
pub fn booking_points(amount: Decimal, tier: Tier) -> i64 {
    let base = (amount.max(Decimal::ZERO) * Decimal::TEN).floor();
    (base * tier.info().points_multiplier)
        .floor()
        .to_i64()
        .unwrap_or(0)
}

/// Referral code: the first four characters of the user id, upper-cased,
/// followed by four random alphanumerics.
pub fn referral_code(user_id: Uuid) -> String {
    let prefix: String = user_id.simple().to_string().chars().take(4).collect();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix).to_uppercase()
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub points: i64,
}

pub const ACHIEVEMENTS: [Achievement; 14] = [
    Achievement { id: "first_booking", name: "First Adventure", description: "Complete your first booking", points: 500 },
    Achievement { id: "early_bird", name: "Early Bird", description: "Book 3 months in advance", points: 200 },
    Achievement { id: "last_minute", name: "Spontaneous", description: "Book within 24 hours of check-in", points: 200 },
    Achievement { id: "world_traveler", name: "World Traveler", description: "Stay in 10 countries", points: 1000 },
    Achievement { id: "review_master", name: "Review Master", description: "Write 20 reviews", points: 1000 },
    Achievement { id: "photo_pro", name: "Photo Pro", description: "Upload 50 photos in reviews", points: 500 },
    Achievement { id: "streak_7", name: "Loyal Traveler", description: "Book in 7 consecutive months", points: 700 },
    Achievement { id: "big_spender", name: "Big Spender", description: "Spend $10,000 lifetime", points: 2000 },
    Achievement { id: "referral_king", name: "Referral King", description: "10 successful referrals", points: 5000 },
    Achievement { id: "weekend_warrior", name: "Weekend Warrior", description: "Book 10 weekend trips", points: 800 },
    Achievement { id: "business_pro", name: "Business Pro", description: "Book 20 business trips", points: 1500 },
    Achievement { id: "family_first", name: "Family First", description: "Book 5 family vacations", points: 600 },
    Achievement { id: "luxury_lover", name: "Luxury Lover", description: "Book 5 stays at hotels rated 9 or higher", points: 1200 },
    Achievement { id: "budget_smart", name: "Budget Smart", description: "Save $1000 with deals and points", points: 800 },
];

pub fn achievement(id: &str) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

/// Activity figures the achievement rules look at
#[derive(Debug, Clone, Default)]
pub struct AchievementStats {
    pub bookings: i64,
    pub early_bookings: i64,
    pub last_minute_bookings: i64,
    pub countries: i64,
    pub reviews: i64,
    pub review_photos: i64,
    pub monthly_streak: u32,
    pub total_spend: Decimal,
    pub referrals_completed: i64,
    pub weekend_bookings: i64,
    pub business_bookings: i64,
    pub family_bookings: i64,
    pub luxury_bookings: i64,
    pub total_savings: Decimal,
}

impl AchievementStats {
    fn satisfies(&self, id: &str) -> bool {
        match id {
            "first_booking" => self.bookings >= 1,
            "early_bird" => self.early_bookings >= 1,
            "last_minute" => self.last_minute_bookings >= 1,
            "world_traveler" => self.countries >= 10,
            "review_master" => self.reviews >= 20,
            "photo_pro" => self.review_photos >= 50,
            "streak_7" => self.monthly_streak >= 7,
            "big_spender" => self.total_spend >= Decimal::from(10_000),
            "referral_king" => self.referrals_completed >= 10,
            "weekend_warrior" => self.weekend_bookings >= 10,
            "business_pro" => self.business_bookings >= 20,
            "family_first" => self.family_bookings >= 5,
            "luxury_lover" => self.luxury_bookings >= 5,
            "budget_smart" => self.total_savings >= Decimal::from(1_000),
            _ => false,
        }
    }
}

/// Achievements the stats now satisfy that are not in `unlocked` yet
pub fn newly_unlocked(stats: &AchievementStats, unlocked: &[String]) -> Vec<&'static Achievement> {
    ACHIEVEMENTS
        .iter()
        .filter(|a| !unlocked.iter().any(|id| id == a.id))
        .filter(|a| stats.satisfies(a.id))
        .collect()
}

/// Longest run of consecutive calendar months that each contain a booking
pub fn monthly_streak(dates: &[NaiveDate]) -> u32 {
    let mut months: Vec<i32> = dates
        .iter()
        .map(|d| d.year() * 12 + d.month0() as i32)
        .collect();
    months.sort_unstable();
    months.dedup();

    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<i32> = None;
    for month in months {
        run = match previous {
            Some(p) if p + 1 == month => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(month);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_both_thresholds_required() {
        assert_eq!(Tier::for_activity(0, Decimal::ZERO), Tier::Explorer);
        assert_eq!(Tier::for_activity(5, d("1999.99")), Tier::Explorer);
        assert_eq!(Tier::for_activity(4, d("50000")), Tier::Explorer);
        assert_eq!(Tier::for_activity(5, d("2000")), Tier::Adventurer);
        assert_eq!(Tier::for_activity(15, d("5000")), Tier::Globetrotter);
        assert_eq!(Tier::for_activity(29, d("20000")), Tier::Globetrotter);
        assert_eq!(Tier::for_activity(30, d("10000")), Tier::Elite);
    }

    #[test]
    fn test_tier_keys_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::from_key(tier.key()), Some(tier));
        }
        assert_eq!(Tier::from_key("PLATINUM"), None);
    }

    #[test]
    fn test_progress_uses_lesser_percentage() {
        let progress = tier_progress(Tier::Explorer, 4, d("500"));
        assert_eq!(progress.next_tier, Some("Adventurer"));
        assert_eq!(progress.bookings_needed, 1);
        assert_eq!(progress.spend_needed, d("1500"));
        assert!((progress.progress_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_is_capped() {
        let progress = tier_progress(Tier::Explorer, 50, d("100000"));
        assert_eq!(progress.progress_percent, 100.0);
        assert_eq!(progress.bookings_needed, 0);
        assert_eq!(progress.spend_needed, Decimal::ZERO);
    }

    #[test]
    fn test_top_tier_has_no_next() {
        let progress = tier_progress(Tier::Elite, 31, d("12000"));
        assert_eq!(progress.next_tier, None);
        assert_eq!(progress.progress_percent, 100.0);
    }

    #[test]
    fn test_booking_points_floor_each_step() {
        assert_eq!(booking_points(d("123.45"), Tier::Explorer), 1234);
        // floor(1234 * 1.5) = 1851
        assert_eq!(booking_points(d("123.45"), Tier::Adventurer), 1851);
        assert_eq!(booking_points(d("100"), Tier::Elite), 4000);
        assert_eq!(booking_points(Decimal::ZERO, Tier::Elite), 0);
    }

    #[test]
    fn test_referral_code_shape() {
        let user_id = Uuid::parse_str("abcd1234-0000-0000-0000-000000000000").unwrap();
        let code = referral_code(user_id);
        assert_eq!(code.len(), 8);
        assert!(code.starts_with("ABCD"));
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_catalogue_has_unique_ids() {
        let mut ids: Vec<_> = ACHIEVEMENTS.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 14);
        assert_eq!(achievement("referral_king").map(|a| a.points), Some(5000));
    }

    #[test]
    fn test_newly_unlocked_skips_existing() {
        let stats = AchievementStats {
            bookings: 1,
            total_spend: d("12000"),
            ..Default::default()
        };
        let ids: Vec<_> = newly_unlocked(&stats, &[]).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["first_booking", "big_spender"]);

        let ids: Vec<_> = newly_unlocked(&stats, &["first_booking".to_string()])
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["big_spender"]);
    }

    #[test]
    fn test_empty_stats_unlock_nothing() {
        assert!(newly_unlocked(&AchievementStats::default(), &[]).is_empty());
    }

    #[test]
    fn test_monthly_streak() {
        let date = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(monthly_streak(&[]), 0);
        assert_eq!(
            monthly_streak(&[date(2024, 11, 3), date(2024, 12, 20), date(2025, 1, 5), date(2025, 1, 9)]),
            3
        );
        assert_eq!(
            monthly_streak(&[date(2024, 1, 1), date(2024, 3, 1), date(2024, 4, 1)]),
            2
        );
    }
}
