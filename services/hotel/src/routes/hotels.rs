//! Hotel catalogue handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::{best_effort, total_pages};
use crate::{
    error::{ApiError, ApiResult},
    events::HotelEvent,
    models::{
        Hotel, HotelView,
        hotel::{
            CreateHotelRequest, DEFAULT_HISTORY_DAYS, HotelQuery, PriceHistoryQuery,
            UpdateHotelRequest,
        },
    },
    repricing,
    state::AppState,
};

pub(crate) async fn find_hotel(state: &AppState, id: Uuid) -> ApiResult<Hotel> {
    state
        .hotel_repository
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Hotel not found"))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<HotelQuery>,
) -> ApiResult<Json<Value>> {
    let (hotels, total) = state.hotel_repository.list(&query).await?;
    let hotels: Vec<HotelView> = hotels.into_iter().map(HotelView::from).collect();

    Ok(Json(json!({
        "hotels": hotels,
        "total": total,
        "page": query.page(),
        "limit": query.limit(),
        "total_pages": total_pages(total, query.limit()),
    })))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let hotel = find_hotel(&state, id).await?;
    let price_history = state
        .hotel_repository
        .price_history(id, DEFAULT_HISTORY_DAYS)
        .await?;
    let bookings_24h = state.hotel_repository.recent_booking_count(id).await?;

    Ok(Json(json!({
        "hotel": HotelView::from(hotel),
        "price_history": price_history,
        "bookings_24h": bookings_24h,
        "live_viewers": state.viewers.count(id),
    })))
}

pub async fn price_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PriceHistoryQuery>,
) -> ApiResult<Json<Value>> {
    find_hotel(&state, id).await?;
    let history = state.hotel_repository.price_history(id, query.days()).await?;

    Ok(Json(json!({
        "hotel_id": id,
        "days": query.days(),
        "history": history,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateHotelRequest>,
) -> ApiResult<(StatusCode, Json<HotelView>)> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let hotel = state.hotel_repository.create(&payload).await?;
    let hotel = repricing::reprice(&state, hotel, "initial pricing").await?;
    state.events.publish(HotelEvent::HotelUpdate { hotel_id: hotel.id });

    Ok((StatusCode::CREATED, Json(hotel.into())))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateHotelRequest>,
) -> ApiResult<Json<HotelView>> {
    let current = find_hotel(&state, id).await?;
    payload.validate(&current).map_err(ApiError::BadRequest)?;

    let hotel = state
        .hotel_repository
        .update(id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Hotel not found"))?;
    let hotel = if payload.affects_pricing() {
        repricing::reprice(&state, hotel, "hotel updated").await?
    } else {
        hotel
    };
    state.events.publish(HotelEvent::HotelUpdate { hotel_id: id });

    Ok(Json(hotel.into()))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    if !state.hotel_repository.delete(id).await? {
        return Err(ApiError::not_found("Hotel not found"));
    }
    state.events.publish(HotelEvent::HotelUpdate { hotel_id: id });

    Ok(Json(json!({ "message": "Hotel deleted" })))
}

/// Recompute the nightly rate on demand
pub async fn reprice(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<HotelView>> {
    let hotel = find_hotel(&state, id).await?;
    let before = hotel.price_per_night;
    let hotel = repricing::reprice(&state, hotel, "manual recompute").await?;

    if hotel.price_per_night == before {
        info!("Hotel {} price unchanged at {}", id, before);
    }
    Ok(Json(hotel.into()))
}

/// Reprice after a booking moved the room count; failures are only logged
pub(crate) async fn reprice_after(state: &AppState, hotel: Hotel, reason: &str) -> Hotel {
    let fallback = hotel.clone();
    best_effort("reprice hotel", repricing::reprice(state, hotel, reason).await).unwrap_or(fallback)
}
