//! Trip and trip booking repository

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::models::trip::{
    Trip, TripBooking, TripBookingStatus, TripQuery, TripRequest, trip_total,
};

const TRIP_COLUMNS: &str = "id, origin, destination, departure_time, arrival_time, transport_type, \
     carrier, price, total_seats, available_seats, created_at, updated_at";

const TRIP_BOOKING_COLUMNS: &str =
    "id, trip_id, user_id, seats, total_price, status, created_at, updated_at";

/// Outcome of replacing a trip's details
#[derive(Debug)]
pub enum TripUpdate {
    Updated(Trip),
    NotFound,
    /// The new seat count is below the seats already sold
    SeatsBelowBooked,
}

/// Outcome of trying to hold seats
#[derive(Debug)]
pub enum SeatReservation {
    Booked { booking: TripBooking, trip: Trip },
    UnknownTrip,
    NoSeats,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &TripQuery) {
    builder.push(" WHERE TRUE");

    if let Some(origin) = query.origin.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        builder.push(" AND origin ILIKE ").push_bind(origin.to_string());
    }
    if let Some(destination) = query
        .destination
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        builder
            .push(" AND destination ILIKE ")
            .push_bind(destination.to_string());
    }
    if let Some(kind) = query.transport_type {
        builder.push(" AND transport_type = ").push_bind(kind.as_str());
    }
    if let Some(date) = query.date {
        builder
            .push(" AND (departure_time AT TIME ZONE 'UTC')::date = ")
            .push_bind(date);
    }
}

#[derive(Clone)]
pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &TripRequest) -> Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            INSERT INTO trips (origin, destination, departure_time, arrival_time, transport_type,
                               carrier, price, total_seats, available_seats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(request.origin.trim())
        .bind(request.destination.trim())
        .bind(request.departure_time)
        .bind(request.arrival_time)
        .bind(request.transport_type.as_str())
        .bind(&request.carrier)
        .bind(request.price)
        .bind(request.seats)
        .fetch_one(&self.pool)
        .await?;

        info!("Trip {} created: {} to {}", trip.id, trip.origin, trip.destination);
        Ok(trip)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Trip>> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(trip)
    }

    /// Matching trips, earliest departure first
    pub async fn list(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {TRIP_COLUMNS} FROM trips"));
        push_filters(&mut select, query);
        select.push(" ORDER BY departure_time ASC");

        let trips = select.build_query_as::<Trip>().fetch_all(&self.pool).await?;
        Ok(trips)
    }

    /// Replace a trip's details, keeping the seats already sold
    pub async fn update(&self, id: Uuid, request: &TripRequest) -> Result<TripUpdate> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(TripUpdate::NotFound);
        };
        if request.seats < current.booked_seats() {
            return Ok(TripUpdate::SeatsBelowBooked);
        }

        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips SET
                origin = $2,
                destination = $3,
                departure_time = $4,
                arrival_time = $5,
                transport_type = $6,
                carrier = $7,
                price = $8,
                total_seats = $9,
                available_seats = $9 - $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.origin.trim())
        .bind(request.destination.trim())
        .bind(request.departure_time)
        .bind(request.arrival_time)
        .bind(request.transport_type.as_str())
        .bind(&request.carrier)
        .bind(request.price)
        .bind(request.seats)
        .bind(current.booked_seats())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TripUpdate::Updated(trip))
    }

    /// Delete a trip together with its bookings
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Take seats off the trip and store a pending booking for them
    pub async fn book(&self, user_id: Uuid, trip_id: Uuid, seats: i32) -> Result<SeatReservation> {
        let mut tx = self.pool.begin().await?;

        let trip = sqlx::query_as::<_, Trip>(&format!(
            r#"
            UPDATE trips SET available_seats = available_seats - $2, updated_at = NOW()
            WHERE id = $1 AND available_seats >= $2
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(trip_id)
        .bind(seats)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(trip) = trip else {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM trips WHERE id = $1)")
                .bind(trip_id)
                .fetch_one(&mut *tx)
                .await?;
            return Ok(if exists {
                SeatReservation::NoSeats
            } else {
                SeatReservation::UnknownTrip
            });
        };

        let booking = sqlx::query_as::<_, TripBooking>(&format!(
            r#"
            INSERT INTO trip_bookings (trip_id, user_id, seats, total_price, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {TRIP_BOOKING_COLUMNS}
            "#
        ))
        .bind(trip_id)
        .bind(user_id)
        .bind(seats)
        .bind(trip_total(trip.price, seats))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Trip booking {}: {} seat(s) on trip {} for user {}",
            booking.id, seats, trip_id, user_id
        );
        Ok(SeatReservation::Booked { booking, trip })
    }

    pub async fn find_booking(&self, id: Uuid) -> Result<Option<TripBooking>> {
        let booking = sqlx::query_as::<_, TripBooking>(&format!(
            "SELECT {TRIP_BOOKING_COLUMNS} FROM trip_bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// A user's trip bookings, newest first
    pub async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<TripBooking>> {
        let bookings = sqlx::query_as::<_, TripBooking>(&format!(
            "SELECT {TRIP_BOOKING_COLUMNS} FROM trip_bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Move a booking from `from` to `to`, giving seats back on cancellation.
    ///
    /// Returns `None` when the booking is no longer in `from`.
    pub async fn change_booking_status(
        &self,
        id: Uuid,
        from: TripBookingStatus,
        to: TripBookingStatus,
    ) -> Result<Option<TripBooking>> {
        let mut tx = self.pool.begin().await?;

        let booking = sqlx::query_as::<_, TripBooking>(&format!(
            r#"
            UPDATE trip_bookings SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {TRIP_BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(booking) = booking else {
            return Ok(None);
        };

        if to == TripBookingStatus::Cancelled {
            sqlx::query(
                r#"
                UPDATE trips SET
                    available_seats = LEAST(total_seats, available_seats + $2),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(booking.trip_id)
            .bind(booking.seats)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!("Trip booking {} moved from {} to {}", id, from.as_str(), to.as_str());
        Ok(Some(booking))
    }
}
