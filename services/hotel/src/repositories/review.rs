//! Review repository for database operations

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Review, ReviewStats,
    review::{
        CategoryAverages, CreateReviewRequest, FLAG_THRESHOLD, RatingDistribution, ReviewQuery,
    },
};

const REVIEW_COLUMNS: &str = "id, hotel_id, user_id, user_name, booking_id, rating, cleanliness, \
     comfort, location, facilities, staff, value_for_money, title, body, pros, cons, photos, \
     travel_type, room_type, verified, helpful_count, not_helpful_count, response, responded_at, \
     status, flag_count, created_at, updated_at";

/// Outcome of a one-per-user action on a review
#[derive(Debug)]
pub enum Feedback {
    Recorded(Review),
    AlreadyDone,
    NotFound,
}

/// Review repository
#[derive(Clone)]
pub struct ReviewRepository {
    pool: PgPool,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, hotel_id: Uuid, query: &ReviewQuery) {
    builder
        .push(" WHERE status = 'approved' AND hotel_id = ")
        .push_bind(hotel_id);
    if let Some(travel_type) = query.travel_type.clone() {
        builder.push(" AND travel_type = ").push_bind(travel_type);
    }
    if let Some(min_rating) = query.min_rating {
        builder.push(" AND rating >= ").push_bind(min_rating);
    }
}

impl ReviewRepository {
    /// Create a new review repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        hotel_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        request: &CreateReviewRequest,
        verified: bool,
    ) -> Result<Review> {
        let review = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (hotel_id, user_id, user_name, booking_id, rating, cleanliness,
                                 comfort, location, facilities, staff, value_for_money, title,
                                 body, pros, cons, photos, travel_type, room_type, verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(hotel_id)
        .bind(user_id)
        .bind(user_name)
        .bind(request.booking_id)
        .bind(request.rating)
        .bind(request.categories.cleanliness)
        .bind(request.categories.comfort)
        .bind(request.categories.location)
        .bind(request.categories.facilities)
        .bind(request.categories.staff)
        .bind(request.categories.value_for_money)
        .bind(request.title.trim())
        .bind(request.body.trim())
        .bind(&request.pros)
        .bind(&request.cons)
        .bind(&request.photos)
        .bind(&request.travel_type)
        .bind(&request.room_type)
        .bind(verified)
        .fetch_one(&self.pool)
        .await?;

        info!("Review {} created for hotel {}", review.id, hotel_id);
        Ok(review)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(review)
    }

    pub async fn exists_for_booking(&self, booking_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE booking_id = $1)",
        )
        .bind(booking_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Approved reviews of a hotel, filtered and paged, plus the match count
    pub async fn list(&self, hotel_id: Uuid, query: &ReviewQuery) -> Result<(Vec<Review>, i64)> {
        let limit = i64::from(query.limit());
        let offset = i64::from(query.page() - 1) * limit;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reviews");
        push_filters(&mut count, hotel_id, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews"));
        push_filters(&mut select, hotel_id, query);
        select
            .push(format!(" ORDER BY {}", query.sort.order_by()))
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let reviews = select.build_query_as::<Review>().fetch_all(&self.pool).await?;

        Ok((reviews, total))
    }

    /// Rating statistics over a hotel's approved reviews
    pub async fn stats(&self, hotel_id: Uuid) -> Result<ReviewStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(ROUND(AVG(rating)::numeric, 1), 0) AS average,
                COUNT(*) FILTER (WHERE rating >= 9) AS excellent,
                COUNT(*) FILTER (WHERE rating = 8) AS very_good,
                COUNT(*) FILTER (WHERE rating = 7) AS good,
                COUNT(*) FILTER (WHERE rating = 6) AS fair,
                COUNT(*) FILTER (WHERE rating < 6) AS poor,
                ROUND(AVG(cleanliness)::numeric, 1) AS cleanliness,
                ROUND(AVG(comfort)::numeric, 1) AS comfort,
                ROUND(AVG(location)::numeric, 1) AS location,
                ROUND(AVG(facilities)::numeric, 1) AS facilities,
                ROUND(AVG(staff)::numeric, 1) AS staff,
                ROUND(AVG(value_for_money)::numeric, 1) AS value_for_money
            FROM reviews
            WHERE hotel_id = $1 AND status = 'approved'
            "#,
        )
        .bind(hotel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReviewStats {
            total: row.get("total"),
            average: row.get("average"),
            distribution: RatingDistribution {
                excellent: row.get("excellent"),
                very_good: row.get("very_good"),
                good: row.get("good"),
                fair: row.get("fair"),
                poor: row.get("poor"),
            },
            categories: CategoryAverages {
                cleanliness: row.get("cleanliness"),
                comfort: row.get("comfort"),
                location: row.get("location"),
                facilities: row.get("facilities"),
                staff: row.get("staff"),
                value_for_money: row.get("value_for_money"),
            },
        })
    }

    /// Recompute a hotel's rating and review count from its approved reviews
    pub async fn refresh_hotel_rating(&self, hotel_id: Uuid) -> Result<(Decimal, i32)> {
        let row = sqlx::query(
            r#"
            UPDATE hotels SET
                rating = COALESCE(
                    (SELECT ROUND(AVG(rating)::numeric, 1) FROM reviews
                     WHERE hotel_id = $1 AND status = 'approved'), 0),
                review_count = (SELECT COUNT(*) FROM reviews WHERE hotel_id = $1 AND status = 'approved'),
                updated_at = NOW()
            WHERE id = $1
            RETURNING rating, review_count
            "#,
        )
        .bind(hotel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("rating"), row.get("review_count")))
    }

    /// Record a helpful or not helpful vote, once per user
    pub async fn vote(&self, review_id: Uuid, user_id: Uuid, helpful: bool) -> Result<Feedback> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO review_votes (review_id, user_id, helpful)
            SELECT $1, $2, $3 WHERE EXISTS (SELECT 1 FROM reviews WHERE id = $1)
            ON CONFLICT (review_id, user_id) DO NOTHING
            "#,
        )
        .bind(review_id)
        .bind(user_id)
        .bind(helpful)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(match self.find(review_id).await? {
                Some(_) => Feedback::AlreadyDone,
                None => Feedback::NotFound,
            });
        }

        let review = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews SET
                helpful_count = helpful_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                not_helpful_count = not_helpful_count + CASE WHEN $2 THEN 0 ELSE 1 END
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_id)
        .bind(helpful)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Feedback::Recorded(review))
    }

    /// Flag a review, once per user; enough flags send it back to moderation
    pub async fn flag(&self, review_id: Uuid, user_id: Uuid) -> Result<Feedback> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO review_flags (review_id, user_id)
            SELECT $1, $2 WHERE EXISTS (SELECT 1 FROM reviews WHERE id = $1)
            ON CONFLICT (review_id, user_id) DO NOTHING
            "#,
        )
        .bind(review_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(match self.find(review_id).await? {
                Some(_) => Feedback::AlreadyDone,
                None => Feedback::NotFound,
            });
        }

        let review = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews SET
                flag_count = flag_count + 1,
                status = CASE WHEN flag_count + 1 >= $2 THEN 'pending' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_id)
        .bind(FLAG_THRESHOLD)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if review.status == "pending" {
            info!("Review {} held for moderation after {} flags", review.id, review.flag_count);
        }
        Ok(Feedback::Recorded(review))
    }

    /// Attach the management response to a review
    pub async fn respond(&self, review_id: Uuid, admin_id: Uuid, response: &str) -> Result<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews SET response = $2, responded_at = NOW(), responded_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_id)
        .bind(response)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(review)
    }

    /// Verified, highly rated reviews other guests found helpful
    pub async fn featured(&self, limit: i64) -> Result<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE status = 'approved' AND verified AND rating >= 9 AND helpful_count >= 5
            ORDER BY helpful_count DESC, created_at DESC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }
}
