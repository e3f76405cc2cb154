//! Database-backed tests for the hotel repositories
//!
//! Each test works on its own hotel and users so they can share one
//! database. They need PostgreSQL running locally and are skipped unless
//! requested with `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use common::database::{DatabaseConfig, init_pool, run_migrations};
use hotel::{
    MIGRATOR, pricing,
    models::{
        NewBooking, PaymentMethod,
        hotel::CreateHotelRequest,
        review::{CategoryRatings, CreateReviewRequest},
        trip::{TransportType, TripBookingStatus, TripRequest},
    },
    repositories::{
        BookingRepository, HotelRepository, LoyaltyRepository, PersonalizationRepository,
        ReviewRepository, TripRepository,
        booking::Reservation,
        hotel::Repricing,
        review::Feedback,
        trip::SeatReservation,
    },
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn pool() -> Result<PgPool, Box<dyn std::error::Error>> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    run_migrations(&pool, &MIGRATOR).await?;
    Ok(pool)
}

fn hotel_request(total_rooms: i32, available_rooms: i32) -> CreateHotelRequest {
    CreateHotelRequest {
        name: format!("Integration Hotel {}", Uuid::new_v4()),
        location: "Lisbon, Portugal".to_string(),
        description: "Rooms over the river".to_string(),
        base_price: Decimal::from(100),
        total_rooms,
        available_rooms: Some(available_rooms),
        amenities: vec!["wifi".to_string()],
        images: vec![],
        property_type: Some("hotel".to_string()),
        latitude: None,
        longitude: None,
        address: None,
        city: Some("Lisbon".to_string()),
        country: Some("Portugal".to_string()),
    }
}

fn new_booking(hotel_id: Uuid, user_id: Uuid, rooms: i32, quote: pricing::Quote) -> NewBooking {
    let check_in = (Utc::now() + Duration::days(30)).date_naive();
    NewBooking {
        hotel_id,
        user_id,
        check_in,
        check_out: check_in + Duration::days(quote.nights),
        rooms,
        guests: rooms,
        travel_type: None,
        guest_name: "Ada Lovelace".to_string(),
        guest_email: "ada@example.com".to_string(),
        guest_phone: None,
        special_requests: None,
        quote,
        savings: Decimal::ZERO,
        payment_method: PaymentMethod::Card,
        card_last4: Some("4242".to_string()),
    }
}

fn review_request(rating: i32) -> CreateReviewRequest {
    CreateReviewRequest {
        booking_id: None,
        user_name: None,
        rating,
        categories: CategoryRatings::default(),
        title: "Stayed for the weekend".to_string(),
        body: "The room was quiet, the staff were kind and breakfast ran late enough for us."
            .to_string(),
        pros: vec![],
        cons: vec![],
        photos: vec![],
        travel_type: "couple".to_string(),
        room_type: None,
    }
}

fn trip_request(seats: i32) -> TripRequest {
    let departure = Utc::now() + Duration::days(10);
    TripRequest {
        origin: "Lisbon".to_string(),
        destination: "Porto".to_string(),
        departure_time: departure,
        arrival_time: departure + Duration::hours(3),
        transport_type: TransportType::Train,
        carrier: None,
        price: Decimal::new(2500, 2),
        seats,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_booking_more_rooms_than_left_is_refused() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());
    let bookings = BookingRepository::new(pool.clone());

    let hotel = hotels.create(&hotel_request(10, 2)).await?;
    let quote = pricing::quote(hotel.price_per_night, 2, 3, 0, 0);
    let outcome = bookings
        .create_confirmed(&new_booking(hotel.id, Uuid::new_v4(), 3, quote))
        .await?;

    assert!(matches!(outcome, Reservation::NoRooms));
    let after = hotels.find(hotel.id).await?.ok_or("hotel vanished")?;
    assert_eq!(after.available_rooms, 2);

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_short_points_balance_rolls_back_rooms() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());
    let bookings = BookingRepository::new(pool.clone());
    let loyalty = LoyaltyRepository::new(pool.clone());

    let user_id = Uuid::new_v4();
    let profile = loyalty.ensure_profile(user_id).await?;
    let hotel = hotels.create(&hotel_request(10, 5)).await?;

    let mut quote = pricing::quote(hotel.price_per_night, 3, 1, 0, 0);
    quote.points_redeemed = profile.available_points + 100;
    let outcome = bookings
        .create_confirmed(&new_booking(hotel.id, user_id, 1, quote))
        .await?;

    assert!(matches!(outcome, Reservation::InsufficientPoints));
    let after = hotels.find(hotel.id).await?.ok_or("hotel vanished")?;
    assert_eq!(after.available_rooms, 5);
    assert_eq!(after.booking_count_24h, hotel.booking_count_24h);
    let balance = loyalty.find(user_id).await?.ok_or("profile vanished")?;
    assert_eq!(balance.available_points, profile.available_points);

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_alerts_fire_when_target_meets_price() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());
    let personalization = PersonalizationRepository::new(pool.clone());

    let hotel = hotels.create(&hotel_request(10, 5)).await?;
    let at_price = Uuid::new_v4();
    let above = Uuid::new_v4();
    let below = Uuid::new_v4();
    personalization
        .upsert_alert(at_price, hotel.id, Decimal::from(90))
        .await?
        .ok_or("alert not created")?;
    personalization
        .upsert_alert(above, hotel.id, Decimal::from(95))
        .await?
        .ok_or("alert not created")?;
    personalization
        .upsert_alert(below, hotel.id, Decimal::from(89))
        .await?
        .ok_or("alert not created")?;

    let fired = personalization.trigger_alerts(hotel.id, Decimal::from(90)).await?;
    let mut users: Vec<Uuid> = fired.iter().map(|alert| alert.user_id).collect();
    users.sort();
    let mut expected = vec![at_price, above];
    expected.sort();
    assert_eq!(users, expected);
    assert!(fired.iter().all(|alert| alert.triggered && !alert.active));
    assert!(
        fired
            .iter()
            .all(|alert| alert.triggered_price == Some(Decimal::from(90)))
    );

    // Fired alerts stay fired
    let again = personalization.trigger_alerts(hotel.id, Decimal::from(80)).await?;
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].user_id, below);

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_review_stats_rating_bands() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());
    let reviews = ReviewRepository::new(pool.clone());

    let hotel = hotels.create(&hotel_request(10, 5)).await?;
    for rating in [10, 9, 8, 7, 6, 5, 1] {
        reviews
            .create(hotel.id, Uuid::new_v4(), "Guest", &review_request(rating), false)
            .await?;
    }

    let stats = reviews.stats(hotel.id).await?;
    assert_eq!(stats.total, 7);
    assert_eq!(stats.distribution.excellent, 2);
    assert_eq!(stats.distribution.very_good, 1);
    assert_eq!(stats.distribution.good, 1);
    assert_eq!(stats.distribution.fair, 1);
    assert_eq!(stats.distribution.poor, 2);
    assert_eq!(stats.average, Decimal::new(66, 1));

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_votes_and_flags_count_once_per_user() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());
    let reviews = ReviewRepository::new(pool.clone());

    let hotel = hotels.create(&hotel_request(10, 5)).await?;
    let review = reviews
        .create(hotel.id, Uuid::new_v4(), "Guest", &review_request(8), false)
        .await?;
    let reader = Uuid::new_v4();

    match reviews.vote(review.id, reader, true).await? {
        Feedback::Recorded(review) => assert_eq!(review.helpful_count, 1),
        other => panic!("first vote not recorded: {other:?}"),
    }
    assert!(matches!(
        reviews.vote(review.id, reader, false).await?,
        Feedback::AlreadyDone
    ));

    match reviews.flag(review.id, reader).await? {
        Feedback::Recorded(review) => assert_eq!(review.flag_count, 1),
        other => panic!("first flag not recorded: {other:?}"),
    }
    assert!(matches!(
        reviews.flag(review.id, reader).await?,
        Feedback::AlreadyDone
    ));
    assert!(matches!(
        reviews.vote(Uuid::new_v4(), reader, true).await?,
        Feedback::NotFound
    ));

    let stored = reviews.find(review.id).await?.ok_or("review vanished")?;
    assert_eq!(stored.helpful_count, 1);
    assert_eq!(stored.not_helpful_count, 0);
    assert_eq!(stored.flag_count, 1);

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_repricing_reads_the_locked_row() -> TestResult {
    let pool = pool().await?;
    let hotels = HotelRepository::new(pool.clone());

    let hotel = hotels.create(&hotel_request(20, 20)).await?;

    // Rooms sell between the scheduler's read and its write
    sqlx::query("UPDATE hotels SET available_rooms = 1, booking_count_24h = 12 WHERE id = $1")
        .bind(hotel.id)
        .execute(&pool)
        .await?;
    let expected = pricing::dynamic_price(hotel.base_price, 20, 1, 12);

    match hotels.apply_price(hotel.id, "scheduled").await? {
        Some(Repricing::Changed(change)) => {
            assert_eq!(change.hotel.price_per_night, expected.price);
            assert_eq!(change.previous_price, hotel.price_per_night);
        }
        other => panic!("expected a price change, got {other:?}"),
    }
    assert!(matches!(
        hotels.apply_price(hotel.id, "scheduled").await?,
        Some(Repricing::Unchanged(_))
    ));
    assert!(hotels.apply_price(Uuid::new_v4(), "scheduled").await?.is_none());

    hotels.delete(hotel.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_trip_seats_are_held_and_released() -> TestResult {
    let pool = pool().await?;
    let trips = TripRepository::new(pool.clone());
    let user_id = Uuid::new_v4();

    let trip = trips.create(&trip_request(3)).await?;

    let booking = match trips.book(user_id, trip.id, 2).await? {
        SeatReservation::Booked { booking, trip } => {
            assert_eq!(trip.available_seats, 1);
            assert_eq!(booking.total_price, Decimal::new(5000, 2));
            booking
        }
        other => panic!("expected a booking, got {other:?}"),
    };
    assert!(matches!(
        trips.book(user_id, trip.id, 2).await?,
        SeatReservation::NoSeats
    ));
    assert!(matches!(
        trips.book(user_id, Uuid::new_v4(), 1).await?,
        SeatReservation::UnknownTrip
    ));

    let cancelled = trips
        .change_booking_status(booking.id, TripBookingStatus::Pending, TripBookingStatus::Cancelled)
        .await?
        .ok_or("booking was not pending")?;
    assert_eq!(cancelled.status(), Some(TripBookingStatus::Cancelled));
    assert!(
        trips
            .change_booking_status(booking.id, TripBookingStatus::Pending, TripBookingStatus::Cancelled)
            .await?
            .is_none()
    );

    let restored = trips.find(trip.id).await?.ok_or("trip vanished")?;
    assert_eq!(restored.available_seats, 3);

    trips.delete(trip.id).await?;
    Ok(())
}
