use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use cosnap_core::reviews::NewReview;
use cosnap_types::api::{Claims, CreateReviewRequest, ReactionRequest};
use cosnap_types::models::{ReviewAuthor, TargetType};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// POST /reviews — the caller is the author.
pub async fn add_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = claims
        .role
        .ok_or_else(|| ApiError::BadRequest("token does not carry a role".into()))?;

    let new = NewReview {
        author: ReviewAuthor {
            id: claims.sub,
            name: claims.name,
            photo_url: claims.picture,
            role,
        },
        target_id: req.target_id,
        target_type: req.target_type,
        rating: req.rating,
        title: req.title,
        comment: req.comment,
        experience_date: req.experience_date,
    };
    let aggregator = state.services.reviews.clone();
    let review = blocking(move || aggregator.add_review(new)).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.services.reviews.clone();
    blocking(move || aggregator.delete_review(&id, &claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn react(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.services.reviews.clone();
    let review = blocking(move || aggregator.update_review_reaction(&id, req.kind, req.add)).await?;
    Ok(Json(review))
}

/// GET /targets/{type}/{id}/reviews — newest first.
pub async fn list_reviews(
    State(state): State<AppState>,
    Path((target_type, target_id)): Path<(TargetType, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.services.reviews.clone();
    let reviews = blocking(move || aggregator.get_reviews(&target_id, target_type)).await?;
    Ok(Json(reviews))
}

pub async fn rating_summary(
    State(state): State<AppState>,
    Path((target_type, target_id)): Path<(TargetType, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let aggregator = state.services.reviews.clone();
    let summary = blocking(move || aggregator.get_rating_summary(&target_id, target_type)).await?;
    Ok(Json(summary))
}
