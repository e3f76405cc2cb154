//! Browsing history, wishlist, price alerts, preferences and recommendations

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::hotel::HOTEL_COLUMNS;
use crate::models::{
    Hotel, PriceAlert, PriceAlertView, UserPreferences, WishlistItem,
    personalization::{
        HotelViewRecord, RecentlyViewed, SEARCH_HISTORY_LIMIT, TrackSearchRequest, WishlistEntry,
    },
};

const ALERT_COLUMNS: &str = "id, user_id, hotel_id, target_price, active, triggered, \
     triggered_price, triggered_at, created_at, updated_at";

const PREFERENCE_COLUMNS: &str = "user_id, favorite_destinations, preferred_amenities, \
     preferred_property_types, price_min, price_max, total_bookings, average_booking_value, updated_at";

/// Minimum rating of anything we recommend
const RECOMMENDED_MIN_RATING: i32 = 7;

/// Outcome of saving something tied to a hotel
#[derive(Debug)]
pub enum Saved<T> {
    Created(T),
    Duplicate,
    UnknownHotel,
}

/// Personalization repository
#[derive(Clone)]
pub struct PersonalizationRepository {
    pool: PgPool,
}

impl PersonalizationRepository {
    /// Create a new personalization repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count a view of a hotel; `None` when the hotel does not exist
    pub async fn track_view(
        &self,
        user_id: Uuid,
        hotel_id: Uuid,
        seconds: i64,
    ) -> Result<Option<HotelViewRecord>> {
        let record = sqlx::query_as::<_, HotelViewRecord>(
            r#"
            INSERT INTO hotel_views (user_id, hotel_id, time_spent_seconds)
            SELECT $1, id, $3 FROM hotels WHERE id = $2
            ON CONFLICT (user_id, hotel_id) DO UPDATE SET
                view_count = hotel_views.view_count + 1,
                time_spent_seconds = hotel_views.time_spent_seconds + EXCLUDED.time_spent_seconds,
                last_viewed_at = NOW()
            RETURNING hotel_id, view_count, time_spent_seconds, last_viewed_at
            "#,
        )
        .bind(user_id)
        .bind(hotel_id)
        .bind(seconds.max(0))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Store a search, keep only the latest ones and remember the destination
    pub async fn track_search(&self, user_id: Uuid, search: &TrackSearchRequest) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let destination = search
            .destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        sqlx::query(
            r#"
            INSERT INTO search_history (user_id, destination, check_in, check_out, guests, min_price, max_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user_id)
        .bind(destination)
        .bind(search.check_in)
        .bind(search.check_out)
        .bind(search.guests)
        .bind(search.min_price)
        .bind(search.max_price)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM search_history
            WHERE user_id = $1 AND id NOT IN (
                SELECT id FROM search_history WHERE user_id = $1
                ORDER BY searched_at DESC LIMIT $2
            )
            "#,
        )
        .bind(user_id)
        .bind(SEARCH_HISTORY_LIMIT)
        .execute(&mut *tx)
        .await?;

        if let Some(destination) = destination {
            sqlx::query(
                r#"
                INSERT INTO user_preferences (user_id, favorite_destinations)
                VALUES ($1, ARRAY[$2::text])
                ON CONFLICT (user_id) DO UPDATE SET
                    favorite_destinations = CASE
                        WHEN $2::text = ANY(user_preferences.favorite_destinations)
                            THEN user_preferences.favorite_destinations
                        ELSE array_append(user_preferences.favorite_destinations, $2::text)
                    END,
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(destination)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Hotels the user looked at, most recent first
    pub async fn recently_viewed(&self, user_id: Uuid, limit: i64) -> Result<Vec<RecentlyViewed>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {HOTEL_COLUMNS}, view_count, last_viewed_at
            FROM hotel_views JOIN hotels ON hotels.id = hotel_views.hotel_id
            WHERE user_id = $1
            ORDER BY last_viewed_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RecentlyViewed> {
                Ok(RecentlyViewed {
                    hotel: Hotel::from_row(row)?.into(),
                    view_count: row.try_get("view_count")?,
                    last_viewed_at: row.try_get("last_viewed_at")?,
                })
            })
            .collect()
    }

    /// Save a hotel at its current price
    pub async fn add_to_wishlist(
        &self,
        user_id: Uuid,
        hotel_id: Uuid,
        notify_on_price_drop: bool,
    ) -> Result<Saved<WishlistEntry>> {
        let entry = sqlx::query_as::<_, WishlistEntry>(
            r#"
            INSERT INTO wishlist (user_id, hotel_id, price_when_added, notify_on_price_drop)
            SELECT $1, id, price_per_night, $3 FROM hotels WHERE id = $2
            ON CONFLICT (user_id, hotel_id) DO NOTHING
            RETURNING hotel_id, price_when_added, notify_on_price_drop, added_at
            "#,
        )
        .bind(user_id)
        .bind(hotel_id)
        .bind(notify_on_price_drop)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(entry) = entry {
            return Ok(Saved::Created(entry));
        }
        Ok(if self.hotel_exists(hotel_id).await? {
            Saved::Duplicate
        } else {
            Saved::UnknownHotel
        })
    }

    pub async fn remove_from_wishlist(&self, user_id: Uuid, hotel_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND hotel_id = $2")
            .bind(user_id)
            .bind(hotel_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Saved hotels with how their price moved since they were added
    pub async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {HOTEL_COLUMNS}, hotel_id, price_when_added, notify_on_price_drop, added_at
            FROM wishlist JOIN hotels ON hotels.id = wishlist.hotel_id
            WHERE user_id = $1
            ORDER BY added_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<WishlistItem> {
                let entry = WishlistEntry::from_row(row)?;
                Ok(WishlistItem::new(entry, Hotel::from_row(row)?.into()))
            })
            .collect()
    }

    /// Create the user's alert for a hotel, or move the target of the active one
    pub async fn upsert_alert(
        &self,
        user_id: Uuid,
        hotel_id: Uuid,
        target_price: Decimal,
    ) -> Result<Option<PriceAlert>> {
        let alert = sqlx::query_as::<_, PriceAlert>(&format!(
            r#"
            INSERT INTO price_alerts (user_id, hotel_id, target_price)
            SELECT $1, id, $3 FROM hotels WHERE id = $2
            ON CONFLICT (user_id, hotel_id) WHERE active DO UPDATE SET
                target_price = EXCLUDED.target_price,
                updated_at = NOW()
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(hotel_id)
        .bind(target_price)
        .fetch_optional(&self.pool)
        .await?;

        Ok(alert)
    }

    /// The user's alerts next to each hotel's current price
    pub async fn alerts(&self, user_id: Uuid) -> Result<Vec<PriceAlertView>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.user_id, a.hotel_id, a.target_price, a.active, a.triggered,
                   a.triggered_price, a.triggered_at, a.created_at, a.updated_at,
                   h.name AS hotel_name, h.price_per_night AS current_price
            FROM price_alerts a JOIN hotels h ON h.id = a.hotel_id
            WHERE a.user_id = $1
            ORDER BY a.active DESC, a.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<PriceAlertView> {
                Ok(PriceAlertView::new(
                    PriceAlert::from_row(row)?,
                    row.try_get("hotel_name")?,
                    row.try_get("current_price")?,
                ))
            })
            .collect()
    }

    pub async fn delete_alert(&self, user_id: Uuid, alert_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE id = $1 AND user_id = $2")
            .bind(alert_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fire every active alert on the hotel whose target the new price meets
    pub async fn trigger_alerts(&self, hotel_id: Uuid, price: Decimal) -> Result<Vec<PriceAlert>> {
        let alerts = sqlx::query_as::<_, PriceAlert>(&format!(
            r#"
            UPDATE price_alerts SET
                triggered = TRUE,
                active = FALSE,
                triggered_price = $2,
                triggered_at = NOW(),
                updated_at = NOW()
            WHERE hotel_id = $1 AND active AND NOT triggered AND target_price >= $2
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(hotel_id)
        .bind(price)
        .fetch_all(&self.pool)
        .await?;

        for alert in &alerts {
            info!(
                "Price alert {} for user {} triggered at {}",
                alert.id, alert.user_id, price
            );
        }
        Ok(alerts)
    }

    /// Learned preferences, created empty on first use
    pub async fn preferences(&self, user_id: Uuid) -> Result<UserPreferences> {
        let preferences = sqlx::query_as::<_, UserPreferences>(&format!(
            r#"
            INSERT INTO user_preferences (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {PREFERENCE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(preferences)
    }

    /// Fold a booking into the user's learned preferences
    pub async fn learn_from_booking(&self, user_id: Uuid, hotel: &Hotel, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, preferred_amenities, preferred_property_types,
                                          price_min, price_max, total_bookings, average_booking_value)
            VALUES ($1, $2, ARRAY[$3::text], $4, $4, 1, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                preferred_amenities = ARRAY(
                    SELECT DISTINCT unnest(user_preferences.preferred_amenities || EXCLUDED.preferred_amenities)),
                preferred_property_types = ARRAY(
                    SELECT DISTINCT unnest(user_preferences.preferred_property_types || EXCLUDED.preferred_property_types)),
                price_min = LEAST(user_preferences.price_min, EXCLUDED.price_min),
                price_max = GREATEST(user_preferences.price_max, EXCLUDED.price_max),
                total_bookings = user_preferences.total_bookings + 1,
                average_booking_value = ROUND(
                    (user_preferences.average_booking_value * user_preferences.total_bookings
                        + EXCLUDED.average_booking_value) / (user_preferences.total_bookings + 1), 2),
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(&hotel.amenities)
        .bind(&hotel.property_type)
        .bind(hotel.price_per_night)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hotels picked for the user.
    ///
    /// Without any viewing history these are simply the best rated hotels.
    /// Otherwise they resemble the hotel the user viewed most, and are
    /// topped up with other well rated hotels the user has not seen.
    pub async fn recommendations(&self, user_id: Uuid, limit: i64) -> Result<Vec<Hotel>> {
        let anchor = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            SELECT {HOTEL_COLUMNS} FROM hotels
            WHERE id = (
                SELECT hotel_id FROM hotel_views WHERE user_id = $1
                ORDER BY view_count DESC, last_viewed_at DESC LIMIT 1
            )
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(anchor) = anchor else {
            let popular = sqlx::query_as::<_, Hotel>(&format!(
                "SELECT {HOTEL_COLUMNS} FROM hotels ORDER BY rating DESC, review_count DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            return Ok(popular);
        };

        let mut hotels = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            SELECT {HOTEL_COLUMNS} FROM hotels
            WHERE price_per_night BETWEEN $2 AND $3
              AND property_type = $4
              AND amenities && $5
              AND rating >= $6
              AND id NOT IN (SELECT hotel_id FROM hotel_views WHERE user_id = $1)
              AND id NOT IN (SELECT hotel_id FROM wishlist WHERE user_id = $1)
            ORDER BY rating DESC, review_count DESC
            LIMIT $7
            "#
        ))
        .bind(user_id)
        .bind(anchor.price_per_night * Decimal::new(7, 1))
        .bind(anchor.price_per_night * Decimal::new(13, 1))
        .bind(&anchor.property_type)
        .bind(&anchor.amenities)
        .bind(RECOMMENDED_MIN_RATING)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let missing = limit - hotels.len() as i64;
        if missing > 0 {
            let picked: Vec<Uuid> = hotels.iter().map(|h| h.id).collect();
            let extra = sqlx::query_as::<_, Hotel>(&format!(
                r#"
                SELECT {HOTEL_COLUMNS} FROM hotels
                WHERE rating >= $2
                  AND id <> ALL($3)
                  AND id NOT IN (SELECT hotel_id FROM hotel_views WHERE user_id = $1)
                  AND id NOT IN (SELECT hotel_id FROM wishlist WHERE user_id = $1)
                ORDER BY rating DESC, review_count DESC
                LIMIT $4
                "#
            ))
            .bind(user_id)
            .bind(RECOMMENDED_MIN_RATING)
            .bind(&picked)
            .bind(missing)
            .fetch_all(&self.pool)
            .await?;
            hotels.extend(extra);
        }

        Ok(hotels)
    }

    /// Well rated hotels in the same city at a comparable price
    pub async fn similar(&self, hotel: &Hotel, limit: i64) -> Result<Vec<Hotel>> {
        let hotels = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            SELECT {HOTEL_COLUMNS} FROM hotels
            WHERE id <> $1 AND city = $2
              AND price_per_night BETWEEN $3 AND $4
              AND rating >= $5
            ORDER BY rating DESC
            LIMIT $6
            "#
        ))
        .bind(hotel.id)
        .bind(&hotel.city)
        .bind(hotel.price_per_night * Decimal::new(6, 1))
        .bind(hotel.price_per_night * Decimal::new(14, 1))
        .bind(RECOMMENDED_MIN_RATING)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hotels)
    }

    /// Hotels drawing the most bookings and viewers right now
    pub async fn trending(&self, location: Option<&str>, limit: i64) -> Result<Vec<Hotel>> {
        let pattern = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| format!("%{}%", l));

        let hotels = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            SELECT {HOTEL_COLUMNS} FROM hotels
            WHERE $1::text IS NULL OR location ILIKE $1 OR city ILIKE $1 OR country ILIKE $1
            ORDER BY booking_count_24h DESC, current_viewers DESC, rating DESC
            LIMIT $2
            "#
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(hotels)
    }

    async fn hotel_exists(&self, hotel_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM hotels WHERE id = $1)")
            .bind(hotel_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}
