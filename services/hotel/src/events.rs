//! Live hotel updates pushed to browsers over server-sent events
//!
//! Every change worth showing on an open hotel page goes through one
//! broadcast [`EventBus`]. Clients subscribe with `GET /api/events`, or with
//! `GET /api/hotels/:id/live`, which also counts them as a viewer of that
//! hotel for as long as the stream stays open.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
};

use async_stream::stream;
use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures::Stream;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, warn};
use uuid::Uuid;

use crate::pricing::AvailabilityStatus;

/// Events buffered per subscriber before slow ones start missing updates
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HotelEvent {
    PriceUpdate {
        hotel_id: Uuid,
        price: Decimal,
        original_price: Option<Decimal>,
        discount_percent: i32,
    },
    PriceDrop {
        hotel_id: Uuid,
        hotel_name: String,
        old_price: Decimal,
        new_price: Decimal,
        drop_amount: Decimal,
    },
    BookingCreated {
        hotel_id: Uuid,
        available_rooms: i32,
        availability_status: AvailabilityStatus,
        last_booked_at: Option<DateTime<Utc>>,
    },
    BookingCancelled {
        hotel_id: Uuid,
        available_rooms: i32,
        availability_status: AvailabilityStatus,
    },
    HotelUpdate {
        hotel_id: Uuid,
    },
    NewReview {
        hotel_id: Uuid,
        review_id: Uuid,
        rating: i32,
        hotel_rating: Decimal,
        review_count: i32,
    },
    ViewersUpdate {
        hotel_id: Uuid,
        viewers: usize,
    },
}

impl HotelEvent {
    /// SSE event name, matching the serialized `type`
    pub fn name(&self) -> &'static str {
        match self {
            HotelEvent::PriceUpdate { .. } => "price-update",
            HotelEvent::PriceDrop { .. } => "price-drop",
            HotelEvent::BookingCreated { .. } => "booking-created",
            HotelEvent::BookingCancelled { .. } => "booking-cancelled",
            HotelEvent::HotelUpdate { .. } => "hotel-update",
            HotelEvent::NewReview { .. } => "new-review",
            HotelEvent::ViewersUpdate { .. } => "viewers-update",
        }
    }

    fn to_sse(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_else(|e| {
            error!("Failed to serialize hotel event: {}", e);
            "{}".to_string()
        });
        Event::default().event(self.name()).data(data)
    }
}

/// Fan-out channel for [`HotelEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HotelEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send to every current subscriber; nobody listening is not an error
    pub fn publish(&self, event: HotelEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HotelEvent> {
        self.sender.subscribe()
    }
}

/// Live viewer counts per hotel
#[derive(Clone)]
pub struct ViewerRegistry {
    counts: Arc<Mutex<HashMap<Uuid, usize>>>,
    bus: EventBus,
}

impl ViewerRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            counts: Arc::new(Mutex::new(HashMap::new())),
            bus,
        }
    }

    pub fn count(&self, hotel_id: Uuid) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.get(&hotel_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Count a new viewer; the returned guard removes them again when dropped
    pub fn join(&self, hotel_id: Uuid) -> ViewerGuard {
        self.adjust(hotel_id, |n| n + 1);
        ViewerGuard {
            registry: self.clone(),
            hotel_id,
        }
    }

    fn leave(&self, hotel_id: Uuid) {
        self.adjust(hotel_id, |n| n.saturating_sub(1));
    }

    /// Change the count and announce it before the lock is released, so
    /// announcements go out in the order the counts were taken
    fn adjust(&self, hotel_id: Uuid, change: impl FnOnce(usize) -> usize) {
        let mut counts = match self.counts.lock() {
            Ok(counts) => counts,
            Err(poisoned) => poisoned.into_inner(),
        };
        let viewers = change(counts.get(&hotel_id).copied().unwrap_or(0));
        if viewers == 0 {
            counts.remove(&hotel_id);
        } else {
            counts.insert(hotel_id, viewers);
        }
        self.bus.publish(HotelEvent::ViewersUpdate { hotel_id, viewers });
    }
}

/// Keeps one viewer counted while alive
pub struct ViewerGuard {
    registry: ViewerRegistry,
    hotel_id: Uuid,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.registry.leave(self.hotel_id);
    }
}

/// Turn a bus subscription into an SSE stream.
///
/// A lagging client skips the events it missed instead of being dropped.
/// The optional guard lives exactly as long as the stream.
pub fn event_stream(
    mut receiver: broadcast::Receiver<HotelEvent>,
    guard: Option<ViewerGuard>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        let _guard = guard;
        loop {
            match receiver.recv().await {
                Ok(event) => yield Ok(event.to_sse()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Mirror live viewer counts into `hotels.current_viewers`
pub async fn persist_viewer_counts(pool: PgPool, bus: EventBus) {
    let mut receiver = bus.subscribe();
    loop {
        match receiver.recv().await {
            Ok(HotelEvent::ViewersUpdate { hotel_id, viewers }) => {
                let viewers = i32::try_from(viewers).unwrap_or(i32::MAX);
                if let Err(e) = sqlx::query("UPDATE hotels SET current_viewers = $2 WHERE id = $1")
                    .bind(hotel_id)
                    .bind(viewers)
                    .execute(&pool)
                    .await
                {
                    error!("Failed to store viewer count for hotel {}: {}", hotel_id, e);
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Viewer count writer lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_event_serialization_uses_kebab_case_type() {
        let event = HotelEvent::PriceDrop {
            hotel_id: Uuid::nil(),
            hotel_name: "Sea Breeze".to_string(),
            old_price: Decimal::from(150),
            new_price: Decimal::from(120),
            drop_amount: Decimal::from(30),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "price-drop");
        assert_eq!(json["type"], event.name());
        assert_eq!(json["hotel_name"], "Sea Breeze");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(HotelEvent::HotelUpdate { hotel_id: Uuid::nil() });

        assert_eq!(first.recv().await.unwrap().name(), "hotel-update");
        assert_eq!(second.recv().await.unwrap().name(), "hotel-update");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        EventBus::default().publish(HotelEvent::HotelUpdate { hotel_id: Uuid::nil() });
    }

    #[tokio::test]
    async fn test_viewer_guard_counts_and_announces() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let registry = ViewerRegistry::new(bus);
        let hotel_id = Uuid::new_v4();

        let first = registry.join(hotel_id);
        let second = registry.join(hotel_id);
        assert_eq!(registry.count(hotel_id), 2);

        drop(first);
        assert_eq!(registry.count(hotel_id), 1);
        drop(second);
        assert_eq!(registry.count(hotel_id), 0);

        let mut announced = Vec::new();
        for _ in 0..4 {
            if let HotelEvent::ViewersUpdate { viewers, .. } = receiver.recv().await.unwrap() {
                announced.push(viewers);
            }
        }
        assert_eq!(announced, vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_last_announcement_matches_count_under_contention() {
        let bus = EventBus::new(4096);
        let mut receiver = bus.subscribe();
        let registry = ViewerRegistry::new(bus);
        let hotel_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut guards: Vec<_> = (0..50).map(|_| registry.join(hotel_id)).collect();
                    guards.truncate(25);
                    guards
                })
            })
            .collect();
        let kept: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut last = None;
        while let Ok(event) = receiver.try_recv() {
            if let HotelEvent::ViewersUpdate { viewers, .. } = event {
                last = Some(viewers);
            }
        }
        assert_eq!(registry.count(hotel_id), 200);
        assert_eq!(last, Some(registry.count(hotel_id)));
        drop(kept);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_viewer() {
        let bus = EventBus::default();
        let registry = ViewerRegistry::new(bus.clone());
        let hotel_id = Uuid::new_v4();

        let stream = event_stream(bus.subscribe(), Some(registry.join(hotel_id)));
        assert_eq!(registry.count(hotel_id), 1);

        drop(stream);
        assert_eq!(registry.count(hotel_id), 0);
    }

    #[tokio::test]
    async fn test_stream_yields_published_events() {
        let bus = EventBus::default();
        let stream = event_stream(bus.subscribe(), None);
        futures::pin_mut!(stream);

        bus.publish(HotelEvent::HotelUpdate { hotel_id: Uuid::nil() });

        assert!(stream.next().await.unwrap().is_ok());
    }
}
