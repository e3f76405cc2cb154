//! Browsing history, wishlist, price alerts and recommendations

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use super::hotels::find_hotel;
use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    models::{
        Hotel, HotelView,
        personalization::{
            LimitQuery, PriceAlertRequest, PriceAlertView, TrackSearchRequest, TrackViewRequest,
            TrendingQuery, UserPreferences, WishlistRequest,
        },
    },
    repositories::personalization::Saved,
    state::AppState,
};

fn views(hotels: Vec<Hotel>) -> Vec<HotelView> {
    hotels.into_iter().map(HotelView::from).collect()
}

pub async fn track_view(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TrackViewRequest>,
) -> ApiResult<Json<Value>> {
    let record = state
        .personalization_repository
        .track_view(user.id, payload.hotel_id, payload.time_spent_seconds)
        .await?
        .ok_or_else(|| ApiError::not_found("Hotel not found"))?;

    Ok(Json(json!({ "view": record })))
}

pub async fn track_search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<TrackSearchRequest>,
) -> ApiResult<Json<Value>> {
    state
        .personalization_repository
        .track_search(user.id, &payload)
        .await?;

    Ok(Json(json!({ "message": "Search tracked" })))
}

pub async fn recently_viewed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let hotels = state
        .personalization_repository
        .recently_viewed(user.id, query.limit_or(10))
        .await?;

    Ok(Json(json!({ "hotels": hotels })))
}

pub async fn wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let items = state.personalization_repository.wishlist(user.id).await?;
    Ok(Json(json!({ "total": items.len(), "wishlist": items })))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<WishlistRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let saved = state
        .personalization_repository
        .add_to_wishlist(user.id, payload.hotel_id, payload.notify_on_price_drop)
        .await?;

    match saved {
        Saved::Created(entry) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "message": "Hotel added to wishlist",
                "hotel_id": entry.hotel_id,
                "price_when_added": entry.price_when_added,
                "notify_on_price_drop": entry.notify_on_price_drop,
                "added_at": entry.added_at,
            })),
        )),
        Saved::Duplicate => Err(ApiError::conflict("Hotel is already in your wishlist")),
        Saved::UnknownHotel => Err(ApiError::not_found("Hotel not found")),
    }
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(hotel_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state
        .personalization_repository
        .remove_from_wishlist(user.id, hotel_id)
        .await?
    {
        return Err(ApiError::not_found("Hotel is not in your wishlist"));
    }

    Ok(Json(json!({ "message": "Hotel removed from wishlist" })))
}

pub async fn price_alerts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let alerts = state.personalization_repository.alerts(user.id).await?;
    Ok(Json(json!({ "alerts": alerts })))
}

/// Create the caller's alert for a hotel, or move its target
pub async fn set_price_alert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PriceAlertRequest>,
) -> ApiResult<Json<PriceAlertView>> {
    if payload.target_price <= Decimal::ZERO {
        return Err(ApiError::bad_request("Target price must be positive"));
    }
    let hotel = find_hotel(&state, payload.hotel_id).await?;

    let alert = state
        .personalization_repository
        .upsert_alert(user.id, hotel.id, payload.target_price)
        .await?
        .ok_or_else(|| ApiError::not_found("Hotel not found"))?;

    Ok(Json(PriceAlertView::new(alert, hotel.name, hotel.price_per_night)))
}

pub async fn delete_price_alert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if !state.personalization_repository.delete_alert(user.id, id).await? {
        return Err(ApiError::not_found("Price alert not found"));
    }

    Ok(Json(json!({ "message": "Price alert deleted" })))
}

pub async fn recommendations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let hotels = state
        .personalization_repository
        .recommendations(user.id, query.limit_or(10))
        .await?;

    Ok(Json(json!({ "hotels": views(hotels) })))
}

pub async fn preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserPreferences>> {
    Ok(Json(state.personalization_repository.preferences(user.id).await?))
}

/// Alternatives in the same city at a comparable price
pub async fn similar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let hotel = find_hotel(&state, id).await?;
    let hotels = state
        .personalization_repository
        .similar(&hotel, query.limit_or(6))
        .await?;

    Ok(Json(json!({ "hotels": views(hotels) })))
}

pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let hotels = state
        .personalization_repository
        .trending(query.location.as_deref(), limit)
        .await?;

    Ok(Json(json!({ "hotels": views(hotels) })))
}
