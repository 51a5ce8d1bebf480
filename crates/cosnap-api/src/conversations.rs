use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use cosnap_core::ServiceError;
use cosnap_types::api::{
    Claims, CreateConversationRequest, CreateConversationResponse, SendMessageRequest, UnreadResponse,
};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// POST /conversations — returns the existing conversation if there is one.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.services.messaging.clone();
    let conversation_id =
        blocking(move || messaging.create_conversation(&claims.sub, &req.other_user_id)).await?;
    Ok(Json(CreateConversationResponse { conversation_id }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.services.messaging.clone();
    let conversations = blocking(move || messaging.list_user_conversations(&claims.sub)).await?;
    Ok(Json(conversations))
}

/// GET /conversations/{id}/messages — participants only, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.services.messaging.clone();
    let messages = blocking(move || {
        let conversation = messaging.get_conversation(&conversation_id)?;
        if !conversation.has_participant(&claims.sub) {
            return Err(ServiceError::permission("not part of this conversation"));
        }
        messaging.list_messages(&conversation_id)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.services.messaging.clone();
    let message = blocking(move || {
        messaging.send_message(&conversation_id, &claims.sub, &req.text, req.image_url.as_deref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /conversations/{id}/read — read receipts never fail the request.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let messaging = state.services.messaging.clone();
    let _ = blocking(move || {
        messaging.mark_messages_as_read_quietly(&conversation_id, &claims.sub);
        Ok(())
    })
    .await;
    StatusCode::NO_CONTENT
}

pub async fn unread_total(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.services.messaging.clone();
    let total = blocking(move || messaging.get_total_unread_messages(&claims.sub)).await?;
    Ok(Json(UnreadResponse { total }))
}
