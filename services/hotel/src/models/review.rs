//! Guest review models, input rules and rating statistics

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::booking::TRAVEL_TYPES;

pub const TITLE_MAX: usize = 100;
pub const BODY_MIN: usize = 50;
pub const BODY_MAX: usize = 2000;
pub const LIST_ITEM_MAX: usize = 100;
/// Flags after which a review is pulled back for moderation
pub const FLAG_THRESHOLD: i32 = 5;

/// Review entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub booking_id: Option<Uuid>,
    pub rating: i32,
    pub cleanliness: Option<i32>,
    pub comfort: Option<i32>,
    pub location: Option<i32>,
    pub facilities: Option<i32>,
    pub staff: Option<i32>,
    pub value_for_money: Option<i32>,
    pub title: String,
    pub body: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub photos: Vec<String>,
    pub travel_type: String,
    pub room_type: Option<String>,
    pub verified: bool,
    pub helpful_count: i32,
    pub not_helpful_count: i32,
    pub response: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub status: String,
    pub flag_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional per-category scores
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryRatings {
    pub cleanliness: Option<i32>,
    pub comfort: Option<i32>,
    pub location: Option<i32>,
    pub facilities: Option<i32>,
    pub staff: Option<i32>,
    pub value_for_money: Option<i32>,
}

impl CategoryRatings {
    fn all(&self) -> [(&'static str, Option<i32>); 6] {
        [
            ("cleanliness", self.cleanliness),
            ("comfort", self.comfort),
            ("location", self.location),
            ("facilities", self.facilities),
            ("staff", self.staff),
            ("value_for_money", self.value_for_money),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub booking_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub categories: CategoryRatings,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub travel_type: String,
    pub room_type: Option<String>,
}

impl CreateReviewRequest {
    /// Every rule the review breaks
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(1..=10).contains(&self.rating) {
            errors.push("Rating must be between 1 and 10".to_string());
        }
        for (name, score) in self.categories.all() {
            if score.is_some_and(|s| !(1..=10).contains(&s)) {
                errors.push(format!("{} rating must be between 1 and 10", name));
            }
        }

        let title = self.title.trim().chars().count();
        if title == 0 || title > TITLE_MAX {
            errors.push(format!("Title is required and must be at most {} characters", TITLE_MAX));
        }
        let body = self.body.trim().chars().count();
        if !(BODY_MIN..=BODY_MAX).contains(&body) {
            errors.push(format!(
                "Review must be between {} and {} characters",
                BODY_MIN, BODY_MAX
            ));
        }
        if self
            .pros
            .iter()
            .chain(self.cons.iter())
            .any(|item| item.chars().count() > LIST_ITEM_MAX)
        {
            errors.push(format!("Pros and cons must be at most {} characters each", LIST_ITEM_MAX));
        }
        if !TRAVEL_TYPES.contains(&self.travel_type.as_str()) {
            errors.push(format!("Travel type must be one of: {}", TRAVEL_TYPES.join(", ")));
        }

        errors
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Recent,
    Highest,
    Lowest,
    Helpful,
}

impl ReviewSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            ReviewSort::Recent => "created_at DESC",
            ReviewSort::Highest => "rating DESC, created_at DESC",
            ReviewSort::Lowest => "rating ASC, created_at DESC",
            ReviewSort::Helpful => "helpful_count DESC, created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewQuery {
    pub travel_type: Option<String>,
    pub min_rating: Option<i32>,
    #[serde(default)]
    pub sort: ReviewSort,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ReviewQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }
}

/// Rating spread over the five guest-facing bands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct RatingDistribution {
    pub excellent: i64,
    pub very_good: i64,
    pub good: i64,
    pub fair: i64,
    pub poor: i64,
}

/// Average of each category over the reviews that scored it
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct CategoryAverages {
    pub cleanliness: Option<Decimal>,
    pub comfort: Option<Decimal>,
    pub location: Option<Decimal>,
    pub facilities: Option<Decimal>,
    pub staff: Option<Decimal>,
    pub value_for_money: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewStats {
    pub total: i64,
    pub average: Decimal,
    pub distribution: RatingDistribution,
    pub categories: CategoryAverages,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub helpful: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    pub response: String,
}

/// Default display name for a reviewer: the local part of their email
pub fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateReviewRequest {
        CreateReviewRequest {
            booking_id: None,
            user_name: None,
            rating: 9,
            categories: CategoryRatings {
                cleanliness: Some(10),
                ..Default::default()
            },
            title: "Wonderful stay by the sea".to_string(),
            body: "The staff were lovely, the room was spotless and the breakfast was great.".to_string(),
            pros: vec!["Location".to_string()],
            cons: vec![],
            photos: vec![],
            travel_type: "couple".to_string(),
            room_type: None,
        }
    }

    #[test]
    fn test_valid_review() {
        assert!(request().validate().is_empty());
    }

    #[test]
    fn test_all_errors_reported() {
        let mut review = request();
        review.rating = 11;
        review.categories.staff = Some(0);
        review.body = "Too short".to_string();
        review.travel_type = "pilgrimage".to_string();

        assert_eq!(review.validate().len(), 4);
    }

    #[test]
    fn test_length_limits() {
        let mut review = request();
        review.title = "x".repeat(TITLE_MAX + 1);
        assert_eq!(review.validate().len(), 1);

        let mut review = request();
        review.body = "y".repeat(BODY_MAX + 1);
        assert_eq!(review.validate().len(), 1);

        let mut review = request();
        review.cons = vec!["z".repeat(LIST_ITEM_MAX + 1)];
        assert_eq!(review.validate().len(), 1);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("ana.costa@example.com"), "ana.costa");
        assert_eq!(display_name("nodomain"), "nodomain");
    }

    #[test]
    fn test_sort_parsing() {
        let sort: ReviewSort = serde_json::from_str("\"helpful\"").unwrap();
        assert_eq!(sort.order_by(), "helpful_count DESC, created_at DESC");
    }
}
