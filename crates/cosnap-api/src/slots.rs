use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use cosnap_core::ServiceError;
use cosnap_core::slots::NewTimeSlot;
use cosnap_db::SlotFilter;
use cosnap_types::api::{Claims, CreateSlotRequest, SlotQuery, SlotSubmission};
use cosnap_types::models::UserRole;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

fn new_slot(photographer_id: &str, req: CreateSlotRequest) -> NewTimeSlot {
    NewTimeSlot {
        photographer_id: photographer_id.to_string(),
        convention_id: req.convention_id,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
        price: req.price,
        location: req.location,
        description: req.description,
    }
}

/// POST /slots — one slot, or a `{"slots": [...]}` batch stored atomically.
pub async fn create_slots(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(submission): Json<SlotSubmission>,
) -> Result<Response, ApiError> {
    if claims.role == Some(UserRole::Cosplayer) {
        return Err(ServiceError::permission("only photographers offer time slots").into());
    }

    let registry = state.services.slots.clone();
    let response = match submission {
        SlotSubmission::Single(req) => {
            let new = new_slot(&claims.sub, req);
            let slot = blocking(move || registry.create_time_slot(new)).await?;
            (StatusCode::CREATED, Json(slot)).into_response()
        }
        SlotSubmission::Batch(batch) => {
            let batch: Vec<NewTimeSlot> = batch
                .slots
                .into_iter()
                .map(|req| new_slot(&claims.sub, req))
                .collect();
            let slots = blocking(move || registry.create_time_slots(batch)).await?;
            (StatusCode::CREATED, Json(slots)).into_response()
        }
    };
    Ok(response)
}

/// GET /photographers/{id}/slots
pub async fn list_slots(
    State(state): State<AppState>,
    Path(photographer_id): Path<String>,
    Query(query): Query<SlotQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = SlotFilter {
        convention_id: query.convention_id,
        from: query.from,
        to: query.to,
        status: query.status,
    };
    let registry = state.services.slots.clone();
    let slots = blocking(move || registry.list_time_slots(&photographer_id, &filter)).await?;
    Ok(Json(slots))
}

pub async fn get_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.services.slots.clone();
    let slot = blocking(move || registry.get_time_slot(&id)).await?;
    Ok(Json(slot))
}

pub async fn delete_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.services.slots.clone();
    blocking(move || registry.delete_time_slot(&id, &claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /slots/{id}/book — direct booking by the caller.
pub async fn book_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.services.slots.clone();
    let slot = blocking(move || registry.book_time_slot(&id, &claims.sub, &claims.name)).await?;
    Ok(Json(slot))
}

pub async fn cancel_slot_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.services.slots.clone();
    let slot = blocking(move || registry.cancel_booking(&id, &claims.sub)).await?;
    Ok(Json(slot))
}
