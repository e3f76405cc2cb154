//! Guest review handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{best_effort, hotels::find_hotel, total_pages};
use crate::{
    error::{ApiError, ApiResult},
    events::HotelEvent,
    middleware::AuthUser,
    models::{
        BookingStatus, Review,
        personalization::LimitQuery,
        review::{CreateReviewRequest, RespondRequest, ReviewQuery, VoteRequest, display_name},
    },
    repositories::review::Feedback,
    state::AppState,
};

/// Longest management response accepted
const RESPONSE_MAX: usize = 1000;

/// Recompute the hotel's rating, logging instead of failing the request
async fn refresh_rating(state: &AppState, hotel_id: Uuid) -> Option<(Decimal, i32)> {
    best_effort(
        "refresh hotel rating",
        state.review_repository.refresh_hotel_rating(hotel_id).await,
    )
}

fn feedback_result(feedback: Feedback, repeated: &str) -> ApiResult<Review> {
    match feedback {
        Feedback::Recorded(review) => Ok(review),
        Feedback::AlreadyDone => Err(ApiError::conflict(repeated)),
        Feedback::NotFound => Err(ApiError::not_found("Review not found")),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(hotel_id): Path<Uuid>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<Json<Value>> {
    find_hotel(&state, hotel_id).await?;
    let (reviews, total) = state.review_repository.list(hotel_id, &query).await?;
    let stats = state.review_repository.stats(hotel_id).await?;

    Ok(Json(json!({
        "reviews": reviews,
        "total": total,
        "page": query.page(),
        "limit": query.limit(),
        "total_pages": total_pages(total, query.limit()),
        "stats": stats,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(hotel_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let errors = payload.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation {
            message: "Invalid review".to_string(),
            errors,
        });
    }
    find_hotel(&state, hotel_id).await?;

    if let Some(booking_id) = payload.booking_id {
        let booking = state.booking_repository.find(booking_id).await?;
        let eligible = booking.is_some_and(|b| {
            b.user_id == user.id
                && b.hotel_id == hotel_id
                && b.status() == Some(BookingStatus::Completed)
        });
        if !eligible {
            return Err(ApiError::forbidden(
                "Only your completed stays at this hotel can be reviewed",
            ));
        }
        if state.review_repository.exists_for_booking(booking_id).await? {
            return Err(ApiError::conflict("This stay has already been reviewed"));
        }
    }

    let user_name = payload
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| display_name(&user.email));
    let review = state
        .review_repository
        .create(hotel_id, user.id, &user_name, &payload, payload.booking_id.is_some())
        .await?;

    if let Some((hotel_rating, review_count)) = refresh_rating(&state, hotel_id).await {
        state.events.publish(HotelEvent::NewReview {
            hotel_id,
            review_id: review.id,
            rating: review.rating,
            hotel_rating,
            review_count,
        });
    }
    best_effort(
        "check review achievements",
        state.loyalty_repository.check_achievements(user.id).await,
    );

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn vote(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> ApiResult<Json<Review>> {
    let feedback = state.review_repository.vote(id, user.id, payload.helpful).await?;
    Ok(Json(feedback_result(feedback, "You have already voted on this review")?))
}

/// Report a review; enough reports hide it until moderated
pub async fn flag(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let feedback = state.review_repository.flag(id, user.id).await?;
    let review = feedback_result(feedback, "You have already flagged this review")?;

    refresh_rating(&state, review.hotel_id).await;
    if review.status == "pending" {
        state.events.publish(HotelEvent::HotelUpdate {
            hotel_id: review.hotel_id,
        });
    }

    Ok(Json(json!({
        "message": "Review flagged",
        "flag_count": review.flag_count,
        "status": review.status,
    })))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> ApiResult<Json<Review>> {
    let response = payload.response.trim();
    if response.is_empty() || response.chars().count() > RESPONSE_MAX {
        return Err(ApiError::bad_request(format!(
            "Response must be between 1 and {} characters",
            RESPONSE_MAX
        )));
    }

    let review = state
        .review_repository
        .respond(id, user.id, response)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    Ok(Json(review))
}

/// Testimonials for the landing page
pub async fn featured(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let reviews = state.review_repository.featured(query.limit_or(6)).await?;
    Ok(Json(json!({ "reviews": reviews })))
}
