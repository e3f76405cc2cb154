//! Hotel service routes

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use serde_json::json;
use tracing::error;

use crate::{
    middleware::{admin_middleware, auth_middleware},
    state::AppState,
};

mod bookings;
mod events;
mod hotels;
mod loyalty;
mod personalization;
mod reviews;
mod trips;

/// Create the router for the hotel service
pub fn create_router(state: AppState) -> Router {
    let auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let public = Router::new()
        .route("/hotels", get(hotels::list))
        .route("/hotels/:id", get(hotels::get))
        .route("/hotels/:id/price-history", get(hotels::price_history))
        .route("/hotels/:id/reviews", get(reviews::list))
        .route("/hotels/:id/similar", get(personalization::similar))
        .route("/hotels/:id/live", get(events::hotel_live))
        .route("/events", get(events::all))
        .route("/reviews/featured", get(reviews::featured))
        .route("/personalization/trending", get(personalization::trending))
        .route("/loyalty/tiers", get(loyalty::tiers))
        .route("/loyalty/achievements", get(loyalty::achievement_catalogue))
        .route("/trips", get(trips::list))
        .route("/trips/:id", get(trips::get));

    let protected = Router::new()
        .route("/bookings/quote", post(bookings::quote))
        .route("/bookings", post(bookings::create).get(bookings::list))
        .route("/bookings/:id", get(bookings::get))
        .route("/bookings/:id/status", patch(bookings::update_status))
        .route("/payments/:booking_id", get(bookings::payment))
        .route("/hotels/:id/reviews", post(reviews::create))
        .route("/reviews/:id/vote", post(reviews::vote))
        .route("/reviews/:id/flag", post(reviews::flag))
        .route("/personalization/track-view", post(personalization::track_view))
        .route("/personalization/track-search", post(personalization::track_search))
        .route("/personalization/recently-viewed", get(personalization::recently_viewed))
        .route(
            "/personalization/wishlist",
            get(personalization::wishlist).post(personalization::add_to_wishlist),
        )
        .route(
            "/personalization/wishlist/:hotel_id",
            delete(personalization::remove_from_wishlist),
        )
        .route(
            "/personalization/price-alerts",
            get(personalization::price_alerts).post(personalization::set_price_alert),
        )
        .route(
            "/personalization/price-alerts/:id",
            delete(personalization::delete_price_alert),
        )
        .route("/personalization/recommendations", get(personalization::recommendations))
        .route("/personalization/preferences", get(personalization::preferences))
        .route("/loyalty/profile", get(loyalty::profile))
        .route("/loyalty/history", get(loyalty::history))
        .route("/loyalty/redeem", post(loyalty::redeem))
        .route("/loyalty/achievements/me", get(loyalty::my_achievements))
        .route("/loyalty/referral/signup", post(loyalty::referral_signup))
        .route("/loyalty/referral/stats", get(loyalty::referral_stats))
        .route("/trip-bookings", post(trips::book).get(trips::my_bookings))
        .route("/trip-bookings/:id", get(trips::get_booking))
        .route("/trip-bookings/:id/status", patch(trips::update_booking_status))
        .route_layer(auth());

    let admin = Router::new()
        .route("/hotels", post(hotels::create))
        .route("/hotels/:id", put(hotels::update).delete(hotels::remove))
        .route("/hotels/:id/reprice", post(hotels::reprice))
        .route("/reviews/:id/respond", post(reviews::respond))
        .route("/loyalty/award", post(loyalty::award))
        .route("/trips", post(trips::create))
        .route("/trips/:id", put(trips::update).delete(trips::remove))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(auth());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public.merge(protected).merge(admin))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "hotel-service"
    }))
}

/// Number of pages needed for `total` items, `limit` per page
pub(crate) fn total_pages(total: i64, limit: u32) -> i64 {
    let limit = i64::from(limit.max(1));
    (total + limit - 1) / limit
}

/// Log a follow-up step that must not fail the request it belongs to
pub(crate) fn best_effort<T>(what: &str, result: anyhow::Result<T>) -> Option<T> {
    result.map_err(|e| error!("Failed to {}: {:#}", what, e)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 20), 1);
        assert_eq!(total_pages(40, 20), 2);
        assert_eq!(total_pages(41, 20), 3);
    }

    #[test]
    fn test_best_effort_keeps_value_and_swallows_error() {
        assert_eq!(best_effort("count", Ok::<_, anyhow::Error>(3)), Some(3));
        assert_eq!(best_effort::<i32>("count", Err(anyhow::anyhow!("boom"))), None);
    }
}
