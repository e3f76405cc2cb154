//! Recompute a hotel's nightly rate after anything that moves demand

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::info;

use crate::{
    events::HotelEvent,
    models::Hotel,
    repositories::hotel::{PriceChange, Repricing},
    state::AppState,
};

/// Events announcing a stored price change
fn price_events(change: &PriceChange) -> Vec<HotelEvent> {
    let hotel = &change.hotel;
    let mut events = vec![HotelEvent::PriceUpdate {
        hotel_id: hotel.id,
        price: hotel.price_per_night,
        original_price: hotel.original_price,
        discount_percent: hotel.discount_percent,
    }];

    if change.drop_amount > Decimal::ZERO {
        events.push(HotelEvent::PriceDrop {
            hotel_id: hotel.id,
            hotel_name: hotel.name.clone(),
            old_price: hotel.price_per_night + change.drop_amount,
            new_price: hotel.price_per_night,
            drop_amount: change.drop_amount,
        });
    }
    events
}

/// Apply dynamic pricing to `hotel`, announce the change and fire price alerts.
///
/// The rate is computed from the row as stored, not from `hotel`, which
/// may already be stale. Returns the hotel as stored afterwards.
pub async fn reprice(state: &AppState, hotel: Hotel, reason: &str) -> Result<Hotel> {
    let change = match state.hotel_repository.apply_price(hotel.id, reason).await? {
        Some(Repricing::Changed(change)) => change,
        Some(Repricing::Unchanged(current)) => return Ok(current),
        None => return Ok(hotel),
    };

    info!(
        "Hotel {} repriced from {} to {}, trend {} ({})",
        change.hotel.id,
        change.previous_price,
        change.hotel.price_per_night,
        change.trend.as_str(),
        reason
    );
    for event in price_events(&change) {
        state.events.publish(event);
    }

    let triggered = state
        .personalization_repository
        .trigger_alerts(change.hotel.id, change.hotel.price_per_night)
        .await?;
    if !triggered.is_empty() {
        info!(
            "{} price alert(s) triggered for hotel {}",
            triggered.len(),
            change.hotel.id
        );
    }

    Ok(change.hotel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::pricing::PriceTrend;

    fn hotel(price: i64) -> Hotel {
        Hotel {
            id: Uuid::new_v4(),
            name: "Harbour View".to_string(),
            location: "Lisbon".to_string(),
            description: String::new(),
            base_price: Decimal::from(100),
            price_per_night: Decimal::from(price),
            discount_percent: 0,
            original_price: None,
            total_rooms: 10,
            available_rooms: 5,
            last_booked_at: None,
            current_viewers: 0,
            booking_count_24h: 0,
            rating: Decimal::new(85, 1),
            review_count: 12,
            amenities: vec!["wifi".to_string()],
            images: vec![],
            property_type: "hotel".to_string(),
            latitude: None,
            longitude: None,
            address: None,
            city: Some("Lisbon".to_string()),
            country: Some("Portugal".to_string()),
            price_drop_24h: Decimal::ZERO,
            price_trend: "stable".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unchanged_price_is_not_rewritten() {
        let current = hotel(100);
        let price = current.dynamic_price();
        assert!(current.shows(&price));
        assert!(!hotel(130).shows(&price));
    }

    #[test]
    fn test_price_follows_current_rooms() {
        let mut current = hotel(100);
        let before = current.dynamic_price();

        current.available_rooms = 1;
        current.booking_count_24h = 6;
        let after = current.dynamic_price();

        assert!(after.price > before.price);
        assert!(!current.shows(&after));
    }

    #[test]
    fn test_rise_only_announces_update() {
        let change = PriceChange {
            hotel: hotel(130),
            previous_price: Decimal::from(100),
            trend: PriceTrend::Up,
            drop_amount: Decimal::ZERO,
        };
        let events = price_events(&change);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "price-update");
    }

    #[test]
    fn test_drop_announces_old_and_new_price() {
        let change = PriceChange {
            hotel: hotel(85),
            previous_price: Decimal::from(100),
            trend: PriceTrend::Down,
            drop_amount: Decimal::from(15),
        };
        let events = price_events(&change);
        assert_eq!(events.len(), 2);
        match &events[1] {
            HotelEvent::PriceDrop { old_price, new_price, drop_amount, .. } => {
                assert_eq!(*old_price, Decimal::from(100));
                assert_eq!(*new_price, Decimal::from(85));
                assert_eq!(*drop_amount, Decimal::from(15));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
