//! Booking and payment repository

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::hotel::HOTEL_COLUMNS;
use crate::models::{Booking, BookingStatus, Hotel, NewBooking, Payment, PointsKind};

const BOOKING_COLUMNS: &str = "id, hotel_id, user_id, check_in, check_out, nights, rooms, guests, \
     travel_type, guest_name, guest_email, guest_phone, special_requests, price_per_night, \
     subtotal, taxes, fees, points_redeemed, points_discount, savings, total_price, status, \
     created_at, confirmed_at, cancelled_at, completed_at";

const PAYMENT_COLUMNS: &str =
    "id, booking_id, user_id, amount, currency, method, card_last4, status, created_at, refunded_at";

/// Outcome of trying to book rooms
#[derive(Debug)]
pub enum Reservation {
    Created {
        booking: Booking,
        payment: Payment,
        hotel: Hotel,
    },
    /// Fewer rooms left than requested
    NoRooms,
    /// The loyalty balance no longer covers the points to redeem
    InsufficientPoints,
}

/// Result of a status change
#[derive(Debug)]
pub struct StatusChange {
    pub booking: Booking,
    /// The hotel after its rooms were released, for cancellations
    pub released: Option<Hotel>,
}

/// Booking repository
#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    /// Create a new booking repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserve rooms, spend points and store the confirmed booking with its
    /// payment, all in one transaction.
    pub async fn create_confirmed(&self, new: &NewBooking) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;
        let booking_id = Uuid::new_v4();

        let hotel = sqlx::query_as::<_, Hotel>(&format!(
            r#"
            UPDATE hotels SET
                available_rooms = available_rooms - $2,
                booking_count_24h = booking_count_24h + 1,
                last_booked_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND available_rooms >= $2
            RETURNING {HOTEL_COLUMNS}
            "#
        ))
        .bind(new.hotel_id)
        .bind(new.rooms)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(hotel) = hotel else {
            return Ok(Reservation::NoRooms);
        };

        let quote = &new.quote;
        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (id, hotel_id, user_id, check_in, check_out, nights, rooms, guests,
                                  travel_type, guest_name, guest_email, guest_phone, special_requests,
                                  price_per_night, subtotal, taxes, fees, points_redeemed,
                                  points_discount, savings, total_price, status, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, 'confirmed', NOW())
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(new.hotel_id)
        .bind(new.user_id)
        .bind(new.check_in)
        .bind(new.check_out)
        .bind(i32::try_from(quote.nights)?)
        .bind(new.rooms)
        .bind(new.guests)
        .bind(&new.travel_type)
        .bind(new.guest_name.trim())
        .bind(new.guest_email.trim())
        .bind(&new.guest_phone)
        .bind(&new.special_requests)
        .bind(quote.price_per_night)
        .bind(quote.subtotal)
        .bind(quote.taxes)
        .bind(quote.fees)
        .bind(quote.points_redeemed)
        .bind(quote.points_discount)
        .bind(new.savings)
        .bind(quote.total)
        .fetch_one(&mut *tx)
        .await?;

        if quote.points_redeemed > 0 {
            let spent = sqlx::query(
                r#"
                UPDATE loyalty_profiles
                SET available_points = available_points - $2, updated_at = NOW()
                WHERE user_id = $1 AND available_points >= $2
                "#,
            )
            .bind(new.user_id)
            .bind(quote.points_redeemed)
            .execute(&mut *tx)
            .await?;
            if spent.rows_affected() == 0 {
                return Ok(Reservation::InsufficientPoints);
            }

            sqlx::query(
                r#"
                INSERT INTO points_history (user_id, kind, points, reason, booking_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(new.user_id)
            .bind(PointsKind::Redeemed.as_str())
            .bind(-quote.points_redeemed)
            .bind(format!("Redeemed on booking at {}", hotel.name))
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (booking_id, user_id, amount, method, card_last4, status)
            VALUES ($1, $2, $3, $4, $5, 'succeeded')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(new.user_id)
        .bind(quote.total)
        .bind(new.payment_method.as_str())
        .bind(&new.card_last4)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Booking {} confirmed: {} room(s) at hotel {} for user {}",
            booking.id, booking.rooms, booking.hotel_id, booking.user_id
        );
        Ok(Reservation::Created {
            booking,
            payment,
            hotel,
        })
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    /// A user's bookings, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    pub async fn payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Move a booking from `from` to `to`.
    ///
    /// Returns `None` when the booking is no longer in `from`. Cancelling
    /// gives the rooms back to the hotel and marks the payment refunded.
    pub async fn change_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<StatusChange>> {
        let mut tx = self.pool.begin().await?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings SET
                status = $3,
                confirmed_at = CASE WHEN $3 = 'confirmed' THEN NOW() ELSE confirmed_at END,
                cancelled_at = CASE WHEN $3 = 'cancelled' THEN NOW() ELSE cancelled_at END,
                completed_at = CASE WHEN $3 = 'completed' THEN NOW() ELSE completed_at END
            WHERE id = $1 AND status = $2
            RETURNING {BOOKING_COLUMNS}
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

        let released = if to == BookingStatus::Cancelled {
            let hotel = sqlx::query_as::<_, Hotel>(&format!(
                r#"
                UPDATE hotels SET
                    available_rooms = LEAST(total_rooms, available_rooms + $2),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING {HOTEL_COLUMNS}
                "#
            ))
            .bind(booking.hotel_id)
            .bind(booking.rooms)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE payments SET status = 'refunded', refunded_at = NOW() WHERE booking_id = $1",
            )
            .bind(booking.id)
            .execute(&mut *tx)
            .await?;

            hotel
        } else {
            None
        };

        tx.commit().await?;

        info!("Booking {} moved from {} to {}", id, from.as_str(), to.as_str());
        Ok(Some(StatusChange { booking, released }))
    }
}
