//! Hotel repository for database operations

use anyhow::Result;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{
        Hotel, PriceHistoryEntry,
        hotel::{CreateHotelRequest, HotelQuery, UpdateHotelRequest},
    },
    pricing::{self, AvailabilityStatus, PriceTrend},
};

pub(crate) const HOTEL_COLUMNS: &str = "id, name, location, description, base_price, price_per_night, \
     discount_percent, original_price, total_rooms, available_rooms, last_booked_at, \
     current_viewers, booking_count_24h, rating, review_count, amenities, images, property_type, \
     latitude, longitude, address, city, country, price_drop_24h, price_trend, created_at, updated_at";

/// SQL rendition of [`AvailabilityStatus::from_rooms`], for filtering
const AVAILABILITY_SQL: &str = "(CASE \
     WHEN available_rooms <= 0 THEN 'full' \
     WHEN available_rooms * 10 < total_rooms THEN 'almost_full' \
     WHEN available_rooms * 10 < total_rooms * 3 THEN 'limited' \
     ELSE 'available' END)";

/// A stored price change and how it compares with the day before
#[derive(Debug, Clone)]
pub struct PriceChange {
    pub hotel: Hotel,
    pub previous_price: Decimal,
    pub trend: PriceTrend,
    pub drop_amount: Decimal,
}

/// Result of recomputing a hotel's rate
#[derive(Debug, Clone)]
pub enum Repricing {
    Changed(PriceChange),
    /// The locked row already showed the computed rate
    Unchanged(Hotel),
}

/// Hotel repository
#[derive(Clone)]
pub struct HotelRepository {
    pool: PgPool,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &HotelQuery) {
    builder.push(" WHERE TRUE");

    if let Some(location) = query.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        let pattern = format!("%{}%", location);
        builder
            .push(" AND (location ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR city ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR country ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min_price) = query.min_price {
        builder.push(" AND price_per_night >= ").push_bind(min_price);
    }
    if let Some(max_price) = query.max_price {
        builder.push(" AND price_per_night <= ").push_bind(max_price);
    }
    if let Some(min_rating) = query.min_rating {
        builder.push(" AND rating >= ").push_bind(min_rating);
    }
    let amenities = query.amenity_list();
    if !amenities.is_empty() {
        builder.push(" AND amenities @> ").push_bind(amenities);
    }
    if let Some(property_type) = query.property_type.clone() {
        builder.push(" AND property_type = ").push_bind(property_type);
    }
    if let Some(status) = query.availability_status.as_deref().and_then(AvailabilityStatus::parse) {
        builder
            .push(format!(" AND {} = ", AVAILABILITY_SQL))
            .push_bind(status.as_str());
    }
}

impl HotelRepository {
    /// Create a new hotel repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &CreateHotelRequest) -> Result<Hotel> {
        let hotel = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            INSERT INTO hotels (name, location, description, base_price, price_per_night,
                                total_rooms, available_rooms, amenities, images, property_type,
                                latitude, longitude, address, city, country)
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {HOTEL_COLUMNS}
            "#
        ))
        .bind(request.name.trim())
        .bind(request.location.trim())
        .bind(&request.description)
        .bind(request.base_price)
        .bind(request.total_rooms)
        .bind(request.available_rooms.unwrap_or(request.total_rooms))
        .bind(&request.amenities)
        .bind(&request.images)
        .bind(request.property_type.as_deref().unwrap_or("hotel"))
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(&request.address)
        .bind(&request.city)
        .bind(&request.country)
        .fetch_one(&self.pool)
        .await?;

        info!("Hotel {} created: {}", hotel.id, hotel.name);
        Ok(hotel)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Hotel>> {
        let hotel = sqlx::query_as::<_, Hotel>(&format!(
            "SELECT {HOTEL_COLUMNS} FROM hotels WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(hotel)
    }

    /// Filtered, sorted page of hotels plus the total number of matches
    pub async fn list(&self, query: &HotelQuery) -> Result<(Vec<Hotel>, i64)> {
        let limit = i64::from(query.limit());
        let offset = i64::from(query.page() - 1) * limit;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM hotels");
        push_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {HOTEL_COLUMNS} FROM hotels"));
        push_filters(&mut select, query);
        select
            .push(format!(" ORDER BY {}", query.sort.order_by()))
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let hotels = select.build_query_as::<Hotel>().fetch_all(&self.pool).await?;

        Ok((hotels, total))
    }

    pub async fn update(&self, id: Uuid, update: &UpdateHotelRequest) -> Result<Option<Hotel>> {
        let hotel = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            UPDATE hotels SET
                name = COALESCE($2, name),
                location = COALESCE($3, location),
                description = COALESCE($4, description),
                base_price = COALESCE($5, base_price),
                total_rooms = COALESCE($6, total_rooms),
                available_rooms = COALESCE($7, available_rooms),
                amenities = COALESCE($8, amenities),
                images = COALESCE($9, images),
                property_type = COALESCE($10, property_type),
                latitude = COALESCE($11, latitude),
                longitude = COALESCE($12, longitude),
                address = COALESCE($13, address),
                city = COALESCE($14, city),
                country = COALESCE($15, country),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {HOTEL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.location.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(update.base_price)
        .bind(update.total_rooms)
        .bind(update.available_rooms)
        .bind(&update.amenities)
        .bind(&update.images)
        .bind(&update.property_type)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(&update.address)
        .bind(&update.city)
        .bind(&update.country)
        .fetch_optional(&self.pool)
        .await?;

        Ok(hotel)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM hotels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("Hotel {} deleted", id);
        }
        Ok(result.rows_affected() > 0)
    }

    /// Price changes of the last `days` days, newest first
    pub async fn price_history(&self, hotel_id: Uuid, days: i64) -> Result<Vec<PriceHistoryEntry>> {
        let since = Utc::now() - Duration::days(days);
        let entries = sqlx::query_as::<_, PriceHistoryEntry>(
            r#"
            SELECT id, hotel_id, base_price, price, discount_percent, demand_multiplier, reason, recorded_at
            FROM price_history
            WHERE hotel_id = $1 AND recorded_at >= $2
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(hotel_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Bookings made for the hotel in the past 24 hours, cancelled ones excluded
    pub async fn recent_booking_count(&self, hotel_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE hotel_id = $1 AND created_at >= NOW() - INTERVAL '24 hours' AND status <> 'cancelled'
            "#,
        )
        .bind(hotel_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Recompute the nightly rate from the locked row and store it with a
    /// price history entry.
    ///
    /// Rooms and the booking counter are read under `FOR UPDATE`, so a
    /// booking that commits first is always priced in. The rate is compared
    /// with the last entry of the past 24 hours to set the hotel's trend and
    /// 24 hour drop.
    pub async fn apply_price(&self, hotel_id: Uuid, reason: &str) -> Result<Option<Repricing>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Hotel>(&format!(
            "SELECT {HOTEL_COLUMNS} FROM hotels WHERE id = $1 FOR UPDATE"
        ))
        .bind(hotel_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(None);
        };

        let price = current.dynamic_price();
        if current.shows(&price) {
            tx.commit().await?;
            return Ok(Some(Repricing::Unchanged(current)));
        }

        let previous = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT price FROM price_history
            WHERE hotel_id = $1 AND recorded_at >= NOW() - INTERVAL '24 hours'
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(hotel_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (trend, drop_amount) = pricing::price_movement(previous, price.price);

        let hotel = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            UPDATE hotels SET
                price_per_night = $2,
                discount_percent = $3,
                original_price = $4,
                price_trend = $5,
                price_drop_24h = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {HOTEL_COLUMNS}
            "#
        ))
        .bind(hotel_id)
        .bind(price.price)
        .bind(price.discount_percent)
        .bind(price.original_price)
        .bind(trend.as_str())
        .bind(drop_amount)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO price_history (hotel_id, base_price, price, discount_percent, demand_multiplier, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(hotel_id)
        .bind(hotel.base_price)
        .bind(price.price)
        .bind(price.discount_percent)
        .bind(price.multiplier)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Repricing::Changed(PriceChange {
            previous_price: current.price_per_night,
            hotel,
            trend,
            drop_amount,
        })))
    }

    /// Zero every hotel's rolling 24 hour booking counter
    pub async fn reset_daily_booking_counts(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE hotels SET booking_count_24h = 0 WHERE booking_count_24h <> 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
