use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use cosnap_core::bookings::NewBookingRequest;
use cosnap_types::api::{BookingListQuery, Claims, CreateBookingRequestBody};
use cosnap_types::models::UserRole;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// POST /booking-requests — the caller is the requesting cosplayer.
pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateBookingRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewBookingRequest {
        time_slot_id: body.time_slot_id,
        photographer_id: body.photographer_id,
        cosplayer_id: claims.sub,
        message: body.message,
        cosplay_character: body.cosplay_character,
        cosplay_reference: body.cosplay_reference,
    };
    let workflow = state.services.bookings.clone();
    let request = blocking(move || workflow.create_booking_request(new)).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /booking-requests?as=photographer|cosplayer
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<BookingListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.services.bookings.clone();
    let requests = blocking(move || match query.role {
        UserRole::Photographer => workflow.list_for_photographer(&claims.sub),
        UserRole::Cosplayer => workflow.list_for_cosplayer(&claims.sub),
    })
    .await?;
    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.services.bookings.clone();
    let request = blocking(move || workflow.accept_booking_request(&id, &claims.sub)).await?;
    Ok(Json(request))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.services.bookings.clone();
    let request = blocking(move || workflow.reject_booking_request(&id, &claims.sub)).await?;
    Ok(Json(request))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.services.bookings.clone();
    let request = blocking(move || workflow.cancel_booking_request(&id, &claims.sub)).await?;
    Ok(Json(request))
}
